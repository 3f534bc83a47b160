use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, Bson},
    error::{ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT},
    options::{FindOneAndUpdateOptions, IndexOptions, ReturnDocument, UpdateOptions},
    Client, ClientSession, Collection, Database, IndexModel,
};
use serde::Serialize;

use super::{GrantOutcome, ProgressionStore, StoreError, StoreResult};
use crate::metrics::track_db_operation;
use crate::models::{
    learner::{Learner, LearningGoal, StatsDelta},
    progress::{AttemptUpdate, ProgressRecord},
    question::QuestionRef,
    quest::{Quest, QuestStatus},
    reward::Reward,
};
use crate::utils::retry::{retry_when, RetryConfig};

const PROGRESS: &str = "progress";
const QUESTIONS: &str = "questions";
const QUESTS: &str = "quests";
const REWARDS: &str = "rewards";
const LEARNERS: &str = "learners";

const MAX_COMMIT_RETRIES: usize = 3;

pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub fn new(client: Client, database: &str) -> Self {
        let db = client.database(database);
        Self { client, db }
    }

    /// Creates the indexes the engine relies on. The unique (user_id, question_id)
    /// index is the concurrency boundary for attempt upserts.
    pub async fn ensure_indexes(&self) -> anyhow::Result<()> {
        self.progress()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1, "question_id": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await
            .context("Failed to create progress uniqueness index")?;

        // Unique so that two concurrent chain creations cannot both land
        self.quests()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1, "order": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await
            .context("Failed to create quests order index")?;
        self.quests()
            .create_index(IndexModel::builder().keys(doc! { "user_id": 1, "status": 1 }).build())
            .await
            .context("Failed to create quests status index")?;

        self.rewards()
            .create_index(IndexModel::builder().keys(doc! { "user_id": 1, "claimed": 1 }).build())
            .await
            .context("Failed to create rewards claimed index")?;
        self.rewards()
            .create_index(IndexModel::builder().keys(doc! { "user_id": 1, "kind": 1 }).build())
            .await
            .context("Failed to create rewards kind index")?;

        tracing::info!("MongoDB indexes ensured");
        Ok(())
    }

    fn progress(&self) -> Collection<ProgressRecord> {
        self.db.collection(PROGRESS)
    }

    fn questions(&self) -> Collection<QuestionRef> {
        self.db.collection(QUESTIONS)
    }

    fn quests(&self) -> Collection<Quest> {
        self.db.collection(QUESTS)
    }

    fn rewards(&self) -> Collection<Reward> {
        self.db.collection(REWARDS)
    }

    fn learners(&self) -> Collection<Learner> {
        self.db.collection(LEARNERS)
    }
}

impl MongoStore {
    /// One attempt at the grant unit. Dropping the session on error aborts the
    /// open transaction.
    async fn grant_transaction(
        &self,
        user_id: &str,
        grant_key: &str,
        rewards: &[Reward],
        delta: StatsDelta,
    ) -> mongodb::error::Result<GrantOutcome> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        let already = self
            .learners()
            .find_one(doc! { "_id": user_id, "applied_grants": grant_key })
            .session(&mut session)
            .await?;
        if already.is_some() {
            session.abort_transaction().await?;
            return Ok(GrantOutcome::AlreadyGranted);
        }

        if !rewards.is_empty() {
            self.rewards()
                .insert_many(rewards)
                .session(&mut session)
                .await?;
        }

        self.learners()
            .update_one(
                doc! { "_id": user_id },
                doc! {
                    "$inc": {
                        "stats.total_experience": delta.experience,
                        "stats.total_coins": delta.coins,
                        "stats.completed_quests": i64::from(delta.completed_quests),
                    },
                    "$push": { "applied_grants": grant_key },
                },
            )
            .with_options(UpdateOptions::builder().upsert(true).build())
            .session(&mut session)
            .await?;

        commit_with_retry(&mut session).await?;
        Ok(GrantOutcome::Granted)
    }
}

/// A commit whose outcome is unknown may be re-sent; the server deduplicates it.
async fn commit_with_retry(session: &mut ClientSession) -> mongodb::error::Result<()> {
    let mut retries_left = MAX_COMMIT_RETRIES;
    loop {
        match session.commit_transaction().await {
            Err(e) if e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT) && retries_left > 0 => {
                retries_left -= 1;
                tracing::warn!("Grant commit result unknown, retrying: {}", e);
            }
            other => return other,
        }
    }
}

fn is_transient_transaction(err: &mongodb::error::Error) -> bool {
    let transient = err.contains_label(TRANSIENT_TRANSACTION_ERROR);
    if transient {
        tracing::warn!("Grant transaction hit a transient error, retrying: {}", err);
    }
    transient
}

fn to_bson<T: Serialize>(value: &T) -> StoreResult<Bson> {
    bson::to_bson(value)
        .map_err(|e| StoreError::Backend(anyhow!("Failed to encode value as BSON: {}", e)))
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref we)) => we.code == 11000,
        ErrorKind::Command(ref ce) => ce.code == 11000,
        ErrorKind::InsertMany(ref ie) => ie
            .write_errors
            .as_ref()
            .is_some_and(|errors| errors.iter().any(|we| we.code == 11000)),
        _ => false,
    }
}

fn backend(err: mongodb::error::Error, what: &str) -> StoreError {
    StoreError::Backend(anyhow::Error::new(err).context(what.to_string()))
}

#[async_trait]
impl ProgressionStore for MongoStore {
    async fn ping(&self) -> StoreResult<()> {
        self.db
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| backend(e, "MongoDB ping failed"))?;
        Ok(())
    }

    async fn find_question(&self, question_id: &str) -> StoreResult<Option<QuestionRef>> {
        let question = track_db_operation("find_one", QUESTIONS, async {
            self.questions()
                .find_one(doc! { "_id": question_id })
                .await
                .context("Failed to query questions collection")
        })
        .await?;
        Ok(question)
    }

    async fn find_questions(&self, question_ids: &[String]) -> StoreResult<Vec<QuestionRef>> {
        if question_ids.is_empty() {
            return Ok(Vec::new());
        }

        let cursor = self
            .questions()
            .find(doc! { "_id": { "$in": question_ids.to_vec() } })
            .await
            .map_err(|e| backend(e, "Failed to query questions collection"))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| backend(e, "Question cursor error"))
    }

    async fn apply_attempt(
        &self,
        user_id: &str,
        question_id: &str,
        update: &AttemptUpdate,
    ) -> StoreResult<Option<ProgressRecord>> {
        let mut set = doc! {
            "status": update.status.as_str(),
            "is_correct": update.is_correct,
            "user_answer": update.user_answer.as_str(),
            "time_spent": update.time_spent,
            "last_attempt_at": to_bson(&update.at)?,
        };
        if let Some(difficulty) = update.difficulty {
            set.insert("difficulty", i32::from(difficulty));
        }
        if let Some(notes) = &update.notes {
            set.insert("notes", notes.as_str());
        }

        let updated = track_db_operation("find_one_and_update", PROGRESS, async {
            self.progress()
                .find_one_and_update(
                    doc! { "user_id": user_id, "question_id": question_id },
                    doc! { "$set": set, "$inc": { "attempts": 1 } },
                )
                .with_options(
                    FindOneAndUpdateOptions::builder()
                        .return_document(ReturnDocument::After)
                        .build(),
                )
                .await
                .context("Failed to update progress record")
        })
        .await?;

        Ok(updated)
    }

    async fn insert_progress(&self, record: &ProgressRecord) -> StoreResult<()> {
        match self.progress().insert_one(record).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(StoreError::Conflict(format!(
                "progress record for user={} question={}",
                record.user_id, record.question_id
            ))),
            Err(e) => Err(backend(e, "Failed to insert progress record")),
        }
    }

    async fn list_progress(&self, user_id: &str) -> StoreResult<Vec<ProgressRecord>> {
        let cursor = self
            .progress()
            .find(doc! { "user_id": user_id })
            .await
            .map_err(|e| backend(e, "Failed to query progress"))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| backend(e, "Progress cursor error"))
    }

    async fn list_quests(&self, user_id: &str) -> StoreResult<Vec<Quest>> {
        let cursor = self
            .quests()
            .find(doc! { "user_id": user_id })
            .sort(doc! { "order": 1 })
            .await
            .map_err(|e| backend(e, "Failed to query quests"))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| backend(e, "Quest cursor error"))
    }

    async fn find_quest(&self, user_id: &str, quest_id: &str) -> StoreResult<Option<Quest>> {
        self.quests()
            .find_one(doc! { "_id": quest_id, "user_id": user_id })
            .await
            .map_err(|e| backend(e, "Failed to query quest"))
    }

    async fn insert_quests(&self, quests: &[Quest]) -> StoreResult<()> {
        if quests.is_empty() {
            return Ok(());
        }

        match self.quests().insert_many(quests).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => {
                Err(StoreError::Conflict(format!("quest chain for user={}", quests[0].user_id)))
            }
            Err(e) => Err(backend(e, "Failed to insert quest chain")),
        }
    }

    async fn replace_quest_if_status(
        &self,
        quest: &Quest,
        expected: QuestStatus,
    ) -> StoreResult<bool> {
        let result = track_db_operation("replace_one", QUESTS, async {
            self.quests()
                .replace_one(
                    doc! { "_id": quest.id.as_str(), "status": expected.as_str() },
                    quest,
                )
                .await
                .context("Failed to replace quest")
        })
        .await?;

        Ok(result.matched_count == 1)
    }

    async fn load_learner(&self, user_id: &str) -> StoreResult<Learner> {
        let learner = self
            .learners()
            .find_one(doc! { "_id": user_id })
            .await
            .map_err(|e| backend(e, "Failed to query learner"))?;

        Ok(learner.unwrap_or_else(|| Learner::new(user_id)))
    }

    async fn save_goal(&self, user_id: &str, goal: &LearningGoal) -> StoreResult<()> {
        self.learners()
            .update_one(doc! { "_id": user_id }, doc! { "$set": { "goal": to_bson(goal)? } })
            .with_options(UpdateOptions::builder().upsert(true).build())
            .await
            .map_err(|e| backend(e, "Failed to save learning goal"))?;
        Ok(())
    }

    async fn append_grant(
        &self,
        user_id: &str,
        grant_key: &str,
        rewards: &[Reward],
        delta: StatsDelta,
    ) -> StoreResult<GrantOutcome> {
        // Concurrent grants for one learner collide on the learner document;
        // the server labels the loser transient and the whole unit is rerun.
        retry_when(
            RetryConfig::grant_transaction(),
            is_transient_transaction,
            || self.grant_transaction(user_id, grant_key, rewards, delta),
        )
        .await
        .map_err(|e| backend(e, "Grant transaction failed"))
    }

    async fn list_rewards(
        &self,
        user_id: &str,
        claimed: Option<bool>,
    ) -> StoreResult<Vec<Reward>> {
        let mut filter = doc! { "user_id": user_id };
        if let Some(claimed) = claimed {
            filter.insert("claimed", claimed);
        }

        let cursor = self
            .rewards()
            .find(filter)
            .await
            .map_err(|e| backend(e, "Failed to query rewards"))?;
        let mut rewards: Vec<Reward> = cursor
            .try_collect()
            .await
            .map_err(|e| backend(e, "Reward cursor error"))?;

        rewards.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rewards)
    }

    async fn claim_reward(
        &self,
        user_id: &str,
        reward_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Reward>> {
        self.rewards()
            .find_one_and_update(
                doc! { "_id": reward_id, "user_id": user_id, "claimed": false },
                doc! { "$set": { "claimed": true, "claimed_at": to_bson(&at)? } },
            )
            .with_options(
                FindOneAndUpdateOptions::builder()
                    .return_document(ReturnDocument::After)
                    .build(),
            )
            .await
            .map_err(|e| backend(e, "Failed to claim reward"))
    }
}
