use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Experience needed per level step.
pub const EXPERIENCE_PER_LEVEL: i64 = 500;

/// Default mastery target when a learner never set a goal.
pub const DEFAULT_TARGET_MASTERY: f64 = 70.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LearnerStats {
    #[serde(default)]
    pub total_experience: i64,
    #[serde(default)]
    pub total_coins: i64,
    #[serde(default)]
    pub completed_quests: u32,
}

impl LearnerStats {
    pub fn level(&self) -> u32 {
        let steps = self.total_experience.max(0) / EXPERIENCE_PER_LEVEL;
        1 + u32::try_from(steps).unwrap_or(u32::MAX - 1)
    }

    pub fn apply(&mut self, delta: &StatsDelta) {
        self.total_experience += delta.experience;
        self.total_coins += delta.coins;
        self.completed_quests += delta.completed_quests;
    }
}

/// Increment applied to learner stats together with a ledger append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsDelta {
    pub experience: i64,
    pub coins: i64,
    pub completed_quests: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LearningGoal {
    pub target_mastery: f64,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Learner aggregate document. Identity comes from the auth collaborator;
/// the document itself is created on first write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Learner {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub stats: LearnerStats,
    /// Grant keys already applied to `stats`; guards against double issuance
    #[serde(default)]
    pub applied_grants: Vec<String>,
    #[serde(default)]
    pub goal: Option<LearningGoal>,
}

impl Learner {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            stats: LearnerStats::default(),
            applied_grants: Vec::new(),
            goal: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LearnerStatsResponse {
    pub user_id: String,
    pub total_experience: i64,
    pub total_coins: i64,
    pub completed_quests: u32,
    pub level: u32,
}

impl From<&Learner> for LearnerStatsResponse {
    fn from(learner: &Learner) -> Self {
        Self {
            user_id: learner.id.clone(),
            total_experience: learner.stats.total_experience,
            total_coins: learner.stats.total_coins,
            completed_quests: learner.stats.completed_quests,
            level: learner.stats.level(),
        }
    }
}

/// Profile summary used to author a quest chain.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LearnerProfile {
    #[validate(length(min = 1, message = "grade is required"))]
    pub grade: String,
    #[validate(length(min = 1, message = "study_reason is required"))]
    #[serde(alias = "studyReason")]
    pub study_reason: String,
    #[validate(length(min = 1, message = "preferred_guide is required"))]
    #[serde(alias = "preferredGuide")]
    pub preferred_guide: String,
    #[serde(alias = "mathBackground")]
    pub math_background: Option<String>,
    #[serde(alias = "learningGoals")]
    pub learning_goals: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetGoalRequest {
    #[validate(range(min = 0.0, max = 100.0, message = "target_mastery must be between 0 and 100"))]
    #[serde(alias = "targetMastery")]
    pub target_mastery: f64,
    pub deadline: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GoalResponse {
    pub goal: LearningGoal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_is_derived_from_experience() {
        let mut stats = LearnerStats::default();
        assert_eq!(stats.level(), 1);

        stats.apply(&StatsDelta {
            experience: 499,
            coins: 10,
            completed_quests: 1,
        });
        assert_eq!(stats.level(), 1);

        stats.apply(&StatsDelta {
            experience: 1,
            ..Default::default()
        });
        assert_eq!(stats.level(), 2);
        assert_eq!(stats.total_coins, 10);
        assert_eq!(stats.completed_quests, 1);
    }
}
