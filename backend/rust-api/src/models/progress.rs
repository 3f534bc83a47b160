use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::quest::Quest;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Completed,
    Skipped,
    Reviewing,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Completed => "completed",
            AttemptStatus::Skipped => "skipped",
            AttemptStatus::Reviewing => "reviewing",
        }
    }
}

/// One record per (learner, question). Resubmissions mutate it in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub question_id: String,
    pub status: AttemptStatus,
    pub is_correct: bool,
    pub user_answer: String,
    /// Seconds spent on the latest submission
    pub time_spent: i64,
    pub attempts: u32,
    pub last_attempt_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn first_attempt(user_id: &str, question_id: &str, update: &AttemptUpdate) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            question_id: question_id.to_string(),
            status: update.status,
            is_correct: update.is_correct,
            user_answer: update.user_answer.clone(),
            time_spent: update.time_spent,
            attempts: 1,
            last_attempt_at: update.at,
            difficulty: update.difficulty,
            notes: update.notes.clone(),
            created_at: update.at,
        }
    }

    /// Applies a resubmission. `difficulty` and `notes` are only overwritten when supplied.
    pub fn apply(&mut self, update: &AttemptUpdate) {
        self.status = update.status;
        self.is_correct = update.is_correct;
        self.user_answer = update.user_answer.clone();
        self.time_spent = update.time_spent;
        self.attempts += 1;
        self.last_attempt_at = update.at;
        if update.difficulty.is_some() {
            self.difficulty = update.difficulty;
        }
        if update.notes.is_some() {
            self.notes = update.notes.clone();
        }
    }
}

/// Validated submission fields handed to the store.
#[derive(Debug, Clone)]
pub struct AttemptUpdate {
    pub status: AttemptStatus,
    pub is_correct: bool,
    pub user_answer: String,
    pub time_spent: i64,
    pub difficulty: Option<u8>,
    pub notes: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecordAttemptRequest {
    pub status: AttemptStatus,
    #[serde(alias = "isCorrect")]
    pub is_correct: bool,
    #[validate(length(min = 1, message = "user_answer must not be empty"))]
    #[serde(alias = "userAnswer")]
    pub user_answer: String,
    #[validate(range(min = 0, message = "time_spent must be non-negative"))]
    #[serde(alias = "timeSpent")]
    pub time_spent: i64,
    #[validate(range(min = 1, max = 5, message = "difficulty must be between 1 and 5"))]
    pub difficulty: Option<u8>,
    pub notes: Option<String>,
    #[serde(alias = "idempotencyKey")]
    pub idempotency_key: Option<String>,
}

impl RecordAttemptRequest {
    pub fn to_update(&self, at: DateTime<Utc>) -> AttemptUpdate {
        AttemptUpdate {
            status: self.status,
            is_correct: self.is_correct,
            user_answer: self.user_answer.clone(),
            time_spent: self.time_spent,
            difficulty: self.difficulty,
            notes: self.notes.clone(),
            at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordAttemptResponse {
    pub progress: ProgressRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quest: Option<Quest>,
}

#[derive(Debug, Deserialize)]
pub struct ListProgressQuery {
    pub subject: Option<String>,
    pub chapter: Option<String>,
    pub status: Option<AttemptStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ProgressPage {
    pub progress: Vec<ProgressRecord>,
    pub total: usize,
    pub page: u32,
    pub total_pages: u32,
}
