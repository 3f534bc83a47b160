//! Durable state behind the progression engine.
//!
//! `MongoStore` backs production; `MemoryStore` keeps everything in process
//! for tests and for local runs without a database. Both honour the same
//! guarantees: one progress record per (learner, question), compare-and-set
//! quest writes, and ledger appends applied together with the stats increment.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    learner::{Learner, LearningGoal, StatsDelta},
    progress::{AttemptUpdate, ProgressRecord},
    question::QuestionRef,
    quest::{Quest, QuestStatus},
    reward::Reward,
};

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique constraint hit; the caller retries as an update
    #[error("duplicate {0}")]
    Conflict(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a guarded ledger append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    Granted,
    /// The grant key was already applied; nothing was written
    AlreadyGranted,
}

#[async_trait]
pub trait ProgressionStore: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    // Question bank (read-only)
    async fn find_question(&self, question_id: &str) -> StoreResult<Option<QuestionRef>>;
    async fn find_questions(&self, question_ids: &[String]) -> StoreResult<Vec<QuestionRef>>;

    // Progress store
    /// Mutates the existing (learner, question) record and increments `attempts`.
    /// Returns `None` when no record exists yet.
    async fn apply_attempt(
        &self,
        user_id: &str,
        question_id: &str,
        update: &AttemptUpdate,
    ) -> StoreResult<Option<ProgressRecord>>;
    /// Fails with `StoreError::Conflict` if a record for the pair already exists.
    async fn insert_progress(&self, record: &ProgressRecord) -> StoreResult<()>;
    async fn list_progress(&self, user_id: &str) -> StoreResult<Vec<ProgressRecord>>;

    // Quest graph
    /// Learner quests ordered by `order` ascending.
    async fn list_quests(&self, user_id: &str) -> StoreResult<Vec<Quest>>;
    async fn find_quest(&self, user_id: &str, quest_id: &str) -> StoreResult<Option<Quest>>;
    /// `StoreError::Conflict` when the learner already holds a
    /// quest at one of the orders.
    async fn insert_quests(&self, quests: &[Quest]) -> StoreResult<()>;
    /// Replaces the quest only if its stored status still equals `expected`.
    async fn replace_quest_if_status(
        &self,
        quest: &Quest,
        expected: QuestStatus,
    ) -> StoreResult<bool>;

    // Learners and the reward ledger
    /// Returns a fresh learner when none is stored yet.
    async fn load_learner(&self, user_id: &str) -> StoreResult<Learner>;
    async fn save_goal(&self, user_id: &str, goal: &LearningGoal) -> StoreResult<()>;
    /// Appends `rewards` and applies `delta` as one unit, at most once per `grant_key`.
    async fn append_grant(
        &self,
        user_id: &str,
        grant_key: &str,
        rewards: &[Reward],
        delta: StatsDelta,
    ) -> StoreResult<GrantOutcome>;
    /// Newest first.
    async fn list_rewards(&self, user_id: &str, claimed: Option<bool>)
        -> StoreResult<Vec<Reward>>;
    /// Flips an unclaimed reward owned by `user_id`; `None` otherwise.
    async fn claim_reward(
        &self,
        user_id: &str,
        reward_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Reward>>;
}
