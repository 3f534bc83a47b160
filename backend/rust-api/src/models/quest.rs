use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    Locked,
    Available,
    InProgress,
    Completed,
    Failed,
}

impl QuestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestStatus::Locked => "locked",
            QuestStatus::Available => "available",
            QuestStatus::InProgress => "in_progress",
            QuestStatus::Completed => "completed",
            QuestStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QuestStatus::Completed | QuestStatus::Failed)
    }

    /// Lifecycle edges. `Failed` is reachable but nothing in the default flow drives it.
    pub fn can_transition_to(&self, next: QuestStatus) -> bool {
        matches!(
            (self, next),
            (QuestStatus::Locked, QuestStatus::Available)
                | (QuestStatus::Available, QuestStatus::InProgress)
                | (QuestStatus::InProgress, QuestStatus::Completed)
                | (QuestStatus::Available, QuestStatus::Failed)
                | (QuestStatus::InProgress, QuestStatus::Failed)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuestDifficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl QuestDifficulty {
    /// Maps a self-reported math background onto a difficulty tier.
    pub fn from_background(background: Option<&str>) -> Self {
        match background.map(|value| value.trim().to_ascii_lowercase()) {
            Some(ref value) if value == "advanced" => QuestDifficulty::Advanced,
            Some(ref value) if value == "intermediate" => QuestDifficulty::Intermediate,
            _ => QuestDifficulty::Beginner,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuestKind {
    #[default]
    Main,
    Side,
    Daily,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct QuestRequirements {
    #[serde(alias = "questionsToComplete", default = "default_questions_to_complete")]
    #[validate(range(min = 1, max = 500))]
    pub questions_to_complete: u32,
    #[serde(alias = "minAccuracy", default = "default_min_accuracy")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub min_accuracy: f64,
    /// Hours. Recorded as a hint only, never enforced.
    #[serde(alias = "timeLimit", default = "default_time_limit")]
    pub time_limit: u32,
}

fn default_questions_to_complete() -> u32 {
    5
}

fn default_min_accuracy() -> f64 {
    70.0
}

fn default_time_limit() -> u32 {
    24
}

impl Default for QuestRequirements {
    fn default() -> Self {
        Self {
            questions_to_complete: default_questions_to_complete(),
            min_accuracy: default_min_accuracy(),
            time_limit: default_time_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct QuestRewards {
    #[serde(default = "default_experience")]
    #[validate(range(min = 0, max = 100_000))]
    pub experience: i64,
    #[serde(default = "default_coins")]
    #[validate(range(min = 0, max = 100_000))]
    pub coins: i64,
    #[serde(default)]
    #[validate(length(max = 10))]
    pub badges: Vec<String>,
}

fn default_experience() -> i64 {
    100
}

fn default_coins() -> i64 {
    50
}

impl Default for QuestRewards {
    fn default() -> Self {
        Self {
            experience: default_experience(),
            coins: default_coins(),
            badges: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct QuestProgress {
    pub questions_completed: u32,
    pub current_accuracy: f64,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quest {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub kind: QuestKind,
    pub difficulty: QuestDifficulty,
    pub subject: String,
    pub chapter: String,
    /// 1-based position within the learner's chain
    pub order: u32,
    pub requirements: QuestRequirements,
    pub rewards: QuestRewards,
    pub status: QuestStatus,
    #[serde(default)]
    pub progress: QuestProgress,
    /// Ids of quests that must all be completed before this one unlocks
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default = "default_is_main_quest")]
    pub is_main_quest: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_is_main_quest() -> bool {
    true
}

/// Quest attributes as authored by the text-generation collaborator or the
/// built-in default chain. Untrusted until `validate()` passes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct QuestDescriptor {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 2000))]
    pub description: String,
    pub difficulty: QuestDifficulty,
    #[validate(length(min = 1, max = 100))]
    pub subject: String,
    #[validate(length(min = 1, max = 100))]
    pub chapter: String,
    #[serde(default)]
    #[validate(nested)]
    pub requirements: QuestRequirements,
    #[serde(default)]
    #[validate(nested)]
    pub rewards: QuestRewards,
    #[serde(default)]
    pub kind: QuestKind,
    #[serde(alias = "isMainQuest", default = "default_is_main_quest")]
    pub is_main_quest: bool,
}

#[derive(Debug, Serialize)]
pub struct ChainStatusResponse {
    pub has_quest_chain: bool,
    pub quest_count: usize,
    pub completed_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ChainResponse {
    pub message: String,
    pub created: bool,
    pub quests: Vec<Quest>,
}

#[derive(Debug, Serialize)]
pub struct ChainCompletionResponse {
    pub completed: bool,
    /// "completed/total" over main quests
    pub progress: String,
    pub fraction: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_quest: Option<Quest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_reward: Option<super::reward::Reward>,
}
