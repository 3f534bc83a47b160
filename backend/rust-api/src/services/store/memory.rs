use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{GrantOutcome, ProgressionStore, StoreError, StoreResult};
use crate::models::{
    learner::{Learner, LearningGoal, StatsDelta},
    progress::{AttemptUpdate, ProgressRecord},
    question::QuestionRef,
    quest::{Quest, QuestStatus},
    reward::Reward,
};

#[derive(Default)]
struct MemoryState {
    questions: HashMap<String, QuestionRef>,
    /// Keyed by (user_id, question_id); the map key is the uniqueness constraint
    progress: HashMap<(String, String), ProgressRecord>,
    quests: HashMap<String, Quest>,
    learners: HashMap<String, Learner>,
    rewards: Vec<Reward>,
}

/// Single-lock in-process store. Every operation is serialized, so each
/// trait method is trivially atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds question-bank reference data.
    pub async fn insert_question(&self, question: QuestionRef) {
        let mut state = self.state.lock().await;
        state.questions.insert(question.id.clone(), question);
    }
}

#[async_trait]
impl ProgressionStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn find_question(&self, question_id: &str) -> StoreResult<Option<QuestionRef>> {
        let state = self.state.lock().await;
        Ok(state.questions.get(question_id).cloned())
    }

    async fn find_questions(&self, question_ids: &[String]) -> StoreResult<Vec<QuestionRef>> {
        let state = self.state.lock().await;
        Ok(question_ids
            .iter()
            .filter_map(|id| state.questions.get(id).cloned())
            .collect())
    }

    async fn apply_attempt(
        &self,
        user_id: &str,
        question_id: &str,
        update: &AttemptUpdate,
    ) -> StoreResult<Option<ProgressRecord>> {
        let mut state = self.state.lock().await;
        let key = (user_id.to_string(), question_id.to_string());
        Ok(state.progress.get_mut(&key).map(|record| {
            record.apply(update);
            record.clone()
        }))
    }

    async fn insert_progress(&self, record: &ProgressRecord) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let key = (record.user_id.clone(), record.question_id.clone());
        if state.progress.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "progress record for user={} question={}",
                record.user_id, record.question_id
            )));
        }
        state.progress.insert(key, record.clone());
        Ok(())
    }

    async fn list_progress(&self, user_id: &str) -> StoreResult<Vec<ProgressRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .progress
            .values()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_quests(&self, user_id: &str) -> StoreResult<Vec<Quest>> {
        let state = self.state.lock().await;
        let mut quests: Vec<Quest> = state
            .quests
            .values()
            .filter(|quest| quest.user_id == user_id)
            .cloned()
            .collect();
        quests.sort_by_key(|quest| quest.order);
        Ok(quests)
    }

    async fn find_quest(&self, user_id: &str, quest_id: &str) -> StoreResult<Option<Quest>> {
        let state = self.state.lock().await;
        Ok(state
            .quests
            .get(quest_id)
            .filter(|quest| quest.user_id == user_id)
            .cloned())
    }

    async fn insert_quests(&self, quests: &[Quest]) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let taken = quests.iter().any(|q| {
            state.quests.contains_key(&q.id)
                || state
                    .quests
                    .values()
                    .any(|stored| stored.user_id == q.user_id && stored.order == q.order)
        });
        if taken {
            return Err(StoreError::Conflict(format!(
                "quest chain for user={}",
                quests.first().map(|q| q.user_id.as_str()).unwrap_or_default()
            )));
        }
        for quest in quests {
            state.quests.insert(quest.id.clone(), quest.clone());
        }
        Ok(())
    }

    async fn replace_quest_if_status(
        &self,
        quest: &Quest,
        expected: QuestStatus,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.quests.get_mut(&quest.id) {
            Some(stored) if stored.status == expected => {
                *stored = quest.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn load_learner(&self, user_id: &str) -> StoreResult<Learner> {
        let state = self.state.lock().await;
        Ok(state
            .learners
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| Learner::new(user_id)))
    }

    async fn save_goal(&self, user_id: &str, goal: &LearningGoal) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state
            .learners
            .entry(user_id.to_string())
            .or_insert_with(|| Learner::new(user_id))
            .goal = Some(goal.clone());
        Ok(())
    }

    async fn append_grant(
        &self,
        user_id: &str,
        grant_key: &str,
        rewards: &[Reward],
        delta: StatsDelta,
    ) -> StoreResult<GrantOutcome> {
        let mut state = self.state.lock().await;
        let learner = state
            .learners
            .entry(user_id.to_string())
            .or_insert_with(|| Learner::new(user_id));

        if learner.applied_grants.iter().any(|key| key == grant_key) {
            return Ok(GrantOutcome::AlreadyGranted);
        }

        learner.applied_grants.push(grant_key.to_string());
        learner.stats.apply(&delta);
        state.rewards.extend(rewards.iter().cloned());
        Ok(GrantOutcome::Granted)
    }

    async fn list_rewards(
        &self,
        user_id: &str,
        claimed: Option<bool>,
    ) -> StoreResult<Vec<Reward>> {
        let state = self.state.lock().await;
        // Appended in chronological order; reverse for newest first
        Ok(state
            .rewards
            .iter()
            .rev()
            .filter(|reward| reward.user_id == user_id)
            .filter(|reward| claimed.map_or(true, |flag| reward.claimed == flag))
            .cloned()
            .collect())
    }

    async fn claim_reward(
        &self,
        user_id: &str,
        reward_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Reward>> {
        let mut state = self.state.lock().await;
        Ok(state
            .rewards
            .iter_mut()
            .find(|reward| reward.id == reward_id && reward.user_id == user_id && !reward.claimed)
            .map(|reward| {
                reward.claimed = true;
                reward.claimed_at = Some(at);
                reward.clone()
            }))
    }
}
