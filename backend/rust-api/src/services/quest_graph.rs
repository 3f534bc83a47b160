//! Quest lifecycle and the prerequisite-unlock protocol.
//!
//! The pure functions decide transitions; `QuestGraph` persists them with
//! compare-and-set writes so that exactly one concurrent evaluator observes a
//! given edge.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{ProgressionError, Result};
use crate::metrics::QUEST_TRANSITIONS_TOTAL;
use crate::models::{
    mastery::ScopedAccuracy,
    progress::ProgressRecord,
    question::QuestionRef,
    quest::{Quest, QuestDescriptor, QuestStatus},
};
use crate::services::{mastery, store::ProgressionStore};

/// Status only moves forward, so a quest loses at most three compare-and-sets.
const MAX_EVALUATION_ROUNDS: usize = 4;

/// Edges taken by a single `evaluate` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuestTransition {
    pub started: bool,
    pub completed: bool,
}

/// Refreshes the snapshot and advances the quest as far as the criteria allow.
/// Terminal quests are left untouched; locked quests only get the snapshot.
pub fn evaluate(quest: &mut Quest, scoped: &ScopedAccuracy, now: DateTime<Utc>) -> QuestTransition {
    let mut transition = QuestTransition::default();
    if quest.status.is_terminal() {
        return transition;
    }

    quest.progress.questions_completed = scoped.questions_completed;
    quest.progress.current_accuracy = scoped.accuracy;

    if quest.status == QuestStatus::Available && scoped.questions_completed > 0 {
        quest.status = QuestStatus::InProgress;
        if quest.progress.started_at.is_none() {
            quest.progress.started_at = Some(now);
        }
        transition.started = true;
    }

    if quest.status == QuestStatus::InProgress
        && scoped.questions_completed >= quest.requirements.questions_to_complete
        && scoped.accuracy >= quest.requirements.min_accuracy
    {
        quest.status = QuestStatus::Completed;
        quest.progress.completed_at = Some(now);
        transition.completed = true;
    }

    quest.updated_at = now;
    transition
}

/// The quest an attempt on `question` counts toward. Within a chapter the
/// lowest-order open quest wins, then a locked one, then a finished one.
pub fn active_quest_for<'a>(quests: &'a [Quest], question: &QuestionRef) -> Option<&'a Quest> {
    let rank = |quest: &Quest| match quest.status {
        QuestStatus::Available | QuestStatus::InProgress => 0,
        QuestStatus::Locked => 1,
        QuestStatus::Completed | QuestStatus::Failed => 2,
    };

    quests
        .iter()
        .filter(|q| q.subject == question.subject && q.chapter == question.chapter)
        .min_by_key(|q| (rank(q), q.order))
}

/// True when every prerequisite exists and is completed.
pub fn prerequisites_satisfied(quest: &Quest, quests: &[Quest]) -> bool {
    quest.prerequisites.iter().all(|prerequisite| {
        quests
            .iter()
            .any(|q| &q.id == prerequisite && q.status == QuestStatus::Completed)
    })
}

/// Locked quests that `completed` may open: its chain successor and every
/// quest listing it as a prerequisite, once all of their prerequisites are done.
pub fn unlock_candidates<'a>(quests: &'a [Quest], completed: &Quest) -> Vec<&'a Quest> {
    quests
        .iter()
        .filter(|q| {
            q.status == QuestStatus::Locked
                && (q.order == completed.order + 1 || q.prerequisites.contains(&completed.id))
                && prerequisites_satisfied(q, quests)
        })
        .collect()
}

/// (completed, total) over main quests.
pub fn chain_completion(quests: &[Quest]) -> (usize, usize) {
    let main: Vec<&Quest> = quests.iter().filter(|q| q.is_main_quest).collect();
    let completed = main
        .iter()
        .filter(|q| q.status == QuestStatus::Completed)
        .count();
    (completed, main.len())
}

/// Materializes descriptors as a linear chain: the first quest is available,
/// each later one is locked behind its predecessor.
pub fn build_chain(user_id: &str, descriptors: Vec<QuestDescriptor>, now: DateTime<Utc>) -> Vec<Quest> {
    let mut quests: Vec<Quest> = Vec::with_capacity(descriptors.len());

    for (index, descriptor) in descriptors.into_iter().enumerate() {
        let prerequisites = quests.last().map(|prev| vec![prev.id.clone()]).unwrap_or_default();
        let status = if index == 0 {
            QuestStatus::Available
        } else {
            QuestStatus::Locked
        };

        quests.push(Quest {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: descriptor.title,
            description: descriptor.description,
            kind: descriptor.kind,
            difficulty: descriptor.difficulty,
            subject: descriptor.subject,
            chapter: descriptor.chapter,
            order: u32::try_from(index + 1).unwrap_or(u32::MAX),
            requirements: descriptor.requirements,
            rewards: descriptor.rewards,
            status,
            progress: Default::default(),
            prerequisites,
            is_main_quest: descriptor.is_main_quest,
            created_at: now,
            updated_at: now,
        });
    }

    quests
}

/// Loads a learner's records together with the questions they reference.
pub(crate) async fn load_attempt_history(
    store: &dyn ProgressionStore,
    user_id: &str,
) -> Result<(Vec<ProgressRecord>, Vec<QuestionRef>)> {
    let records = store.list_progress(user_id).await?;
    let ids: Vec<String> = records
        .iter()
        .map(|r| r.question_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let questions = store.find_questions(&ids).await?;
    Ok((records, questions))
}

/// Result of a persisted evaluation.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub quest: Quest,
    /// True only for the caller that won the `in_progress -> completed` write
    pub completed: bool,
}

pub struct QuestGraph {
    store: Arc<dyn ProgressionStore>,
}

impl QuestGraph {
    pub fn new(store: Arc<dyn ProgressionStore>) -> Self {
        Self { store }
    }

    /// Evaluates against the stored attempts and persists. A lost
    /// compare-and-set reloads the quest and evaluates it again with a fresh
    /// snapshot, so the request that observed the qualifying attempt still
    /// takes the completion edge.
    pub async fn evaluate(&self, quest: Quest) -> Result<Evaluation> {
        let mut current = quest;

        for _ in 0..MAX_EVALUATION_ROUNDS {
            if current.status.is_terminal() {
                return Ok(Evaluation {
                    quest: current,
                    completed: false,
                });
            }

            let scoped = self.scoped_accuracy(&current).await?;
            if let Some(evaluation) = self.commit(&current, &scoped).await? {
                return Ok(evaluation);
            }

            tracing::debug!(
                "Quest {} changed concurrently (expected {}), re-evaluating",
                current.id,
                current.status.as_str()
            );
            current = self
                .store
                .find_quest(&current.user_id, &current.id)
                .await?
                .ok_or_else(|| ProgressionError::not_found(format!("quest {}", current.id)))?;
        }

        tracing::warn!(
            "Quest {} still contended after {} evaluation rounds",
            current.id,
            MAX_EVALUATION_ROUNDS
        );
        Ok(Evaluation {
            quest: current,
            completed: false,
        })
    }

    /// Completed attempts inside the quest's subject and chapter.
    pub async fn scoped_accuracy(&self, quest: &Quest) -> Result<ScopedAccuracy> {
        let (records, questions) = load_attempt_history(self.store.as_ref(), &quest.user_id).await?;
        let joined = mastery::join(&records, &questions);
        Ok(mastery::scoped_accuracy(&joined, &quest.subject, &quest.chapter))
    }

    /// One compare-and-set write. `None` when another request moved the quest first.
    async fn commit(&self, quest: &Quest, scoped: &ScopedAccuracy) -> Result<Option<Evaluation>> {
        let expected = quest.status;
        let mut next = quest.clone();
        let transition = evaluate(&mut next, scoped, Utc::now());

        if !self.store.replace_quest_if_status(&next, expected).await? {
            return Ok(None);
        }

        if transition.started {
            QUEST_TRANSITIONS_TOTAL.with_label_values(&["in_progress"]).inc();
            tracing::info!("Quest started: {} for learner {}", next.id, next.user_id);
        }
        if transition.completed {
            QUEST_TRANSITIONS_TOTAL.with_label_values(&["completed"]).inc();
            tracing::info!(
                "Quest completed: {} (order {}) for learner {} with {}/{} at {:.1}%",
                next.id,
                next.order,
                next.user_id,
                scoped.correct,
                scoped.questions_completed,
                scoped.accuracy
            );
        }

        Ok(Some(Evaluation {
            quest: next,
            completed: transition.completed,
        }))
    }

    /// Flips every locked quest that `completed` opens to available. Quests a
    /// concurrent request already unlocked are skipped.
    pub async fn unlock_next(&self, completed: &Quest) -> Result<Vec<Quest>> {
        let quests = self.store.list_quests(&completed.user_id).await?;
        let mut unlocked = Vec::new();

        for candidate in unlock_candidates(&quests, completed) {
            let mut next = candidate.clone();
            debug_assert!(next.status.can_transition_to(QuestStatus::Available));
            next.status = QuestStatus::Available;
            next.updated_at = Utc::now();

            if !self
                .store
                .replace_quest_if_status(&next, QuestStatus::Locked)
                .await?
            {
                continue;
            }

            QUEST_TRANSITIONS_TOTAL.with_label_values(&["available"]).inc();
            tracing::info!(
                "Quest unlocked: {} (order {}) for learner {}",
                next.id,
                next.order,
                next.user_id
            );
            unlocked.push(next);
        }

        Ok(unlocked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::progress::{AttemptStatus, AttemptUpdate};
    use crate::models::quest::{QuestDifficulty, QuestKind, QuestRequirements, QuestRewards};
    use crate::services::store::MemoryStore;

    fn descriptor(chapter: &str) -> QuestDescriptor {
        QuestDescriptor {
            title: format!("{} trial", chapter),
            description: "Solve the set.".to_string(),
            difficulty: QuestDifficulty::Beginner,
            subject: "Calculus".to_string(),
            chapter: chapter.to_string(),
            requirements: QuestRequirements {
                questions_to_complete: 5,
                min_accuracy: 70.0,
                time_limit: 24,
            },
            rewards: QuestRewards::default(),
            kind: QuestKind::Main,
            is_main_quest: true,
        }
    }

    fn chain() -> Vec<Quest> {
        build_chain(
            "u1",
            vec![descriptor("Limits"), descriptor("Derivatives"), descriptor("Integrals")],
            Utc::now(),
        )
    }

    fn scoped(completed: u32, correct: u32) -> ScopedAccuracy {
        ScopedAccuracy {
            questions_completed: completed,
            correct,
            accuracy: crate::services::mastery::percentage(correct, completed),
        }
    }

    #[test]
    fn chain_is_linear() {
        let quests = chain();
        assert_eq!(quests[0].status, QuestStatus::Available);
        assert!(quests[0].prerequisites.is_empty());
        assert_eq!(quests[1].status, QuestStatus::Locked);
        assert_eq!(quests[1].prerequisites, vec![quests[0].id.clone()]);
        assert_eq!(quests[2].order, 3);
    }

    #[test]
    fn first_qualifying_attempt_starts_the_quest() {
        let mut quest = chain().remove(0);
        let t = evaluate(&mut quest, &scoped(1, 1), Utc::now());

        assert_eq!(t, QuestTransition { started: true, completed: false });
        assert_eq!(quest.status, QuestStatus::InProgress);
        assert!(quest.progress.started_at.is_some());
    }

    #[test]
    fn completion_requires_both_thresholds() {
        let mut low = chain().remove(0);
        evaluate(&mut low, &scoped(5, 3), Utc::now());
        assert_eq!(low.status, QuestStatus::InProgress);
        assert_eq!(low.progress.current_accuracy, 60.0);

        let mut enough = chain().remove(0);
        let t = evaluate(&mut enough, &scoped(5, 4), Utc::now());
        assert!(t.started && t.completed);
        assert_eq!(enough.status, QuestStatus::Completed);
        assert!(enough.progress.completed_at.is_some());
    }

    #[test]
    fn terminal_and_locked_quests_do_not_move() {
        let mut quests = chain();
        let mut locked = quests.remove(1);
        let t = evaluate(&mut locked, &scoped(9, 9), Utc::now());
        assert_eq!(t, QuestTransition::default());
        assert_eq!(locked.status, QuestStatus::Locked);
        assert_eq!(locked.progress.questions_completed, 9);

        let mut done = quests.remove(0);
        evaluate(&mut done, &scoped(5, 5), Utc::now());
        let snapshot = done.clone();
        let again = evaluate(&mut done, &scoped(6, 2), Utc::now());
        assert_eq!(again, QuestTransition::default());
        assert_eq!(done, snapshot);
    }

    fn orders(candidates: Vec<&Quest>) -> Vec<u32> {
        candidates.into_iter().map(|q| q.order).collect()
    }

    #[test]
    fn unlock_waits_for_every_prerequisite() {
        let mut quests = chain();
        let first = quests[0].clone();
        assert!(unlock_candidates(&quests, &first).is_empty());

        quests[0].status = QuestStatus::Completed;
        assert_eq!(orders(unlock_candidates(&quests, &first)), vec![2]);

        // A second predecessor that is still open blocks the unlock
        let third = quests[2].id.clone();
        quests[1].prerequisites.push(third);
        assert!(unlock_candidates(&quests, &first).is_empty());
    }

    #[test]
    fn quest_joining_two_branches_unlocks_after_both() {
        let mut quests = chain();
        // Limits and Derivatives are independent; Integrals needs both
        quests[1].prerequisites.clear();
        quests[1].status = QuestStatus::Available;
        quests[2].prerequisites = vec![quests[0].id.clone(), quests[1].id.clone()];

        quests[1].status = QuestStatus::Completed;
        let derivatives = quests[1].clone();
        assert!(unlock_candidates(&quests, &derivatives).is_empty());

        quests[0].status = QuestStatus::Completed;
        let limits = quests[0].clone();
        // Integrals is not the successor of Limits by order, only by prerequisite
        assert_eq!(orders(unlock_candidates(&quests, &limits)), vec![3]);
    }

    #[test]
    fn open_quest_is_preferred_within_a_chapter() {
        let mut quests = chain();
        let mut extra = quests[0].clone();
        extra.id = "side".to_string();
        extra.order = 4;
        extra.status = QuestStatus::Locked;
        quests.push(extra);

        let question = QuestionRef {
            id: "q1".to_string(),
            subject: "Calculus".to_string(),
            chapter: "Limits".to_string(),
            tags: vec![],
        };
        assert_eq!(active_quest_for(&quests, &question).map(|q| q.order), Some(1));

        quests[0].status = QuestStatus::Completed;
        assert_eq!(active_quest_for(&quests, &question).map(|q| q.order), Some(4));
    }

    async fn seeded_store(quests: &[Quest], correct_answers: u32) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.insert_quests(quests).await.unwrap();
        for n in 1..=correct_answers {
            let question_id = format!("lim-{}", n);
            store
                .insert_question(QuestionRef {
                    id: question_id.clone(),
                    subject: "Calculus".to_string(),
                    chapter: "Limits".to_string(),
                    tags: vec![],
                })
                .await;
            let update = AttemptUpdate {
                status: AttemptStatus::Completed,
                is_correct: true,
                user_answer: "1".to_string(),
                time_spent: 30,
                difficulty: None,
                notes: None,
                at: Utc::now(),
            };
            store
                .insert_progress(&ProgressRecord::first_attempt("u1", &question_id, &update))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn lost_compare_and_set_does_not_report_completion() {
        let quests = chain();
        let store = seeded_store(&quests, 5).await;
        let graph = QuestGraph::new(store.clone());

        let stale = quests[0].clone();
        let first = graph.evaluate(stale.clone()).await.unwrap();
        assert!(first.completed);

        // Same stale snapshot evaluated again, as a racing request would
        let second = graph.evaluate(stale).await.unwrap();
        assert!(!second.completed);
        assert_eq!(second.quest.status, QuestStatus::Completed);

        let unlocked = graph.unlock_next(&first.quest).await.unwrap();
        assert_eq!(orders(unlocked.iter().collect()), vec![2]);
        assert!(graph.unlock_next(&first.quest).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn loser_of_the_start_edge_still_completes() {
        let mut quests = build_chain(
            "u1",
            vec![descriptor("Limits"), descriptor("Derivatives")],
            Utc::now(),
        );
        quests[0].requirements.questions_to_complete = 2;
        let store = seeded_store(&quests, 2).await;
        let graph = QuestGraph::new(store.clone());

        // An earlier request saw one answer and took available -> in_progress
        let stale = quests[0].clone();
        let mut started = stale.clone();
        evaluate(&mut started, &scoped(1, 1), Utc::now());
        assert!(store
            .replace_quest_if_status(&started, QuestStatus::Available)
            .await
            .unwrap());

        // This request holds the second answer but loaded the quest before that write
        let evaluation = graph.evaluate(stale).await.unwrap();
        assert!(evaluation.completed);
        assert_eq!(evaluation.quest.progress.questions_completed, 2);

        let stored = store.find_quest("u1", &quests[0].id).await.unwrap().unwrap();
        assert_eq!(stored.status, QuestStatus::Completed);
    }

    #[tokio::test]
    async fn completion_unlocks_every_dependent_quest() {
        let mut quests = chain();
        // Both later quests hang off Limits directly
        quests[2].prerequisites = vec![quests[0].id.clone()];
        let store = seeded_store(&quests, 5).await;
        let graph = QuestGraph::new(store.clone());

        let evaluation = graph.evaluate(quests[0].clone()).await.unwrap();
        assert!(evaluation.completed);

        let unlocked = graph.unlock_next(&evaluation.quest).await.unwrap();
        assert_eq!(orders(unlocked.iter().collect()), vec![2, 3]);
        for quest in &quests[1..] {
            let stored = store.find_quest("u1", &quest.id).await.unwrap().unwrap();
            assert_eq!(stored.status, QuestStatus::Available);
        }
    }
}
