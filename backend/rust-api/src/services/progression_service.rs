//! Attempt recording and everything it triggers.
//!
//! Flow per attempt: upsert the (learner, question) record, find the quest the
//! question counts toward, refresh its scoped snapshot and evaluate it. The
//! request that wins the completion edge grants rewards and unlocks the quests
//! it opens; every other request only sees the stored state.

use std::sync::Arc;

use chrono::Utc;
use validator::Validate;

use crate::error::{ProgressionError, Result};
use crate::metrics::ATTEMPTS_RECORDED_TOTAL;
use crate::models::{
    progress::{AttemptUpdate, ProgressRecord, RecordAttemptRequest, RecordAttemptResponse},
    question::QuestionRef,
    quest::{ChainCompletionResponse, Quest, QuestStatus},
};
use crate::services::{
    cache::{idempotency_key, mastery_key, ResponseCache, IDEMPOTENCY_TTL_SECS},
    quest_graph::{self, QuestGraph},
    reward_ledger::RewardLedger,
    store::{ProgressionStore, StoreError},
};
use crate::utils::retry::{retry_when, RetryConfig};

pub struct ProgressionService {
    store: Arc<dyn ProgressionStore>,
    graph: QuestGraph,
    ledger: RewardLedger,
    cache: ResponseCache,
}

impl ProgressionService {
    pub fn new(store: Arc<dyn ProgressionStore>, cache: ResponseCache) -> Self {
        Self {
            graph: QuestGraph::new(store.clone()),
            ledger: RewardLedger::new(store.clone()),
            store,
            cache,
        }
    }

    pub async fn record_attempt(
        &self,
        user_id: &str,
        question_id: &str,
        request: &RecordAttemptRequest,
    ) -> Result<RecordAttemptResponse> {
        request.validate()?;

        let replay_key = request
            .idempotency_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .map(|key| idempotency_key(user_id, question_id, key));
        if let Some(key) = &replay_key {
            if let Some(previous) = self.cache.get::<RecordAttemptResponse>(key).await {
                tracing::debug!("Replaying attempt for learner {} from idempotency cache", user_id);
                return Ok(previous);
            }
        }

        let question = self
            .store
            .find_question(question_id)
            .await?
            .ok_or_else(|| ProgressionError::not_found(format!("question {}", question_id)))?;

        let update = request.to_update(Utc::now());
        let progress = self.upsert_attempt(user_id, question_id, &update).await?;

        ATTEMPTS_RECORDED_TOTAL
            .with_label_values(&[if update.is_correct { "true" } else { "false" }])
            .inc();
        tracing::info!(
            "Attempt recorded: learner {} question {} ({}, correct={}, attempts={})",
            user_id,
            question_id,
            update.status.as_str(),
            update.is_correct,
            progress.attempts
        );
        self.cache.invalidate(&mastery_key(user_id)).await;

        let quest = self.advance_quest_for(user_id, &question).await?;
        let response = RecordAttemptResponse { progress, quest };

        if let Some(key) = &replay_key {
            self.cache.put(key, &response, IDEMPOTENCY_TTL_SECS).await;
        }

        Ok(response)
    }

    /// Update-then-insert. A lost insert race surfaces as `Conflict` and is
    /// retried, at which point the winner's record is updated instead.
    async fn upsert_attempt(
        &self,
        user_id: &str,
        question_id: &str,
        update: &AttemptUpdate,
    ) -> Result<ProgressRecord> {
        let record = retry_when(
            RetryConfig::upsert_race(),
            |e: &StoreError| matches!(e, StoreError::Conflict(_)),
            || async move {
                if let Some(updated) = self.store.apply_attempt(user_id, question_id, update).await? {
                    return Ok(updated);
                }
                let record = ProgressRecord::first_attempt(user_id, question_id, update);
                self.store.insert_progress(&record).await?;
                Ok::<_, StoreError>(record)
            },
        )
        .await?;

        Ok(record)
    }

    async fn advance_quest_for(&self, user_id: &str, question: &QuestionRef) -> Result<Option<Quest>> {
        let quests = self.store.list_quests(user_id).await?;
        let Some(quest) = quest_graph::active_quest_for(&quests, question).cloned() else {
            return Ok(None);
        };
        self.settle(quest).await.map(Some)
    }

    /// Explicit re-evaluation of one of the learner's quests.
    pub async fn evaluate_quest(&self, user_id: &str, quest_id: &str) -> Result<Quest> {
        let quest = self
            .store
            .find_quest(user_id, quest_id)
            .await?
            .ok_or_else(|| ProgressionError::not_found(format!("quest {}", quest_id)))?;
        self.settle(quest).await
    }

    /// Evaluates the quest; on completion grants and unlocks. Reward failures
    /// after a persisted completion are reported, not rolled back.
    async fn settle(&self, quest: Quest) -> Result<Quest> {
        if quest.status.is_terminal() {
            return Ok(quest);
        }

        let evaluation = self.graph.evaluate(quest).await?;
        if !evaluation.completed {
            return Ok(evaluation.quest);
        }

        let quest = evaluation.quest;
        if let Err(e) = self.ledger.grant(&quest).await {
            tracing::error!(
                "Reward grant failed after quest {} completed for learner {}: {}",
                quest.id,
                quest.user_id,
                e
            );
            return Err(e);
        }
        self.graph.unlock_next(&quest).await?;

        Ok(quest)
    }

    /// Reports main-chain progress and issues the one-time legendary
    /// achievement once every main quest is completed.
    pub async fn check_chain_completion(&self, user_id: &str) -> Result<ChainCompletionResponse> {
        let quests = self.store.list_quests(user_id).await?;
        let (completed, total) = quest_graph::chain_completion(&quests);
        let progress = format!("{}/{}", completed, total);

        if total > 0 && completed == total {
            let reward = self.ledger.grant_chain_completion(user_id).await?;
            return Ok(ChainCompletionResponse {
                completed: true,
                progress,
                fraction: 1.0,
                next_quest: None,
                final_reward: Some(reward),
            });
        }

        let fraction = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64
        };
        let next_quest = quests
            .into_iter()
            .filter(|q| q.is_main_quest)
            .find(|q| matches!(q.status, QuestStatus::Available | QuestStatus::InProgress));

        Ok(ChainCompletionResponse {
            completed: false,
            progress,
            fraction,
            next_quest,
            final_reward: None,
        })
    }
}
