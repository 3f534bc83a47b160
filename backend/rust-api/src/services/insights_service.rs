use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use validator::Validate;

use crate::error::Result;
use crate::models::{
    learner::{GoalResponse, LearnerStatsResponse, LearningGoal, SetGoalRequest, DEFAULT_TARGET_MASTERY},
    mastery::{ConceptMastery, MasteryPoint, MasterySummary, ProgressStats, RecommendationsResponse},
    progress::{ListProgressQuery, ProgressPage, ProgressRecord},
    question::QuestionRef,
};
use crate::services::{
    cache::{mastery_key, ResponseCache, MASTERY_TTL_SECS},
    mastery,
    quest_graph::load_attempt_history,
    recommendation_service::RecommendationService,
    store::ProgressionStore,
};

const HISTORY_DAYS: i64 = 30;
const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;
/// Weak concepts returned alongside recommendations.
const RECOMMENDED_CONCEPTS: usize = 5;

/// Read-only views over progress, plus learner goals and stats.
pub struct InsightsService {
    store: Arc<dyn ProgressionStore>,
    cache: ResponseCache,
    recommender: RecommendationService,
}

impl InsightsService {
    pub fn new(
        store: Arc<dyn ProgressionStore>,
        cache: ResponseCache,
        recommender: RecommendationService,
    ) -> Self {
        Self {
            store,
            cache,
            recommender,
        }
    }

    async fn history(&self, user_id: &str) -> Result<(Vec<ProgressRecord>, Vec<QuestionRef>)> {
        load_attempt_history(self.store.as_ref(), user_id).await
    }

    pub async fn list_progress(&self, user_id: &str, query: &ListProgressQuery) -> Result<ProgressPage> {
        let (records, questions) = self.history(user_id).await?;
        let by_id: HashMap<&str, &QuestionRef> =
            questions.iter().map(|q| (q.id.as_str(), q)).collect();

        let mut matching: Vec<ProgressRecord> = records
            .into_iter()
            .filter(|r| query.status.map_or(true, |status| r.status == status))
            .filter(|r| {
                if query.subject.is_none() && query.chapter.is_none() {
                    return true;
                }
                by_id.get(r.question_id.as_str()).is_some_and(|q| {
                    query.subject.as_deref().map_or(true, |s| q.subject == s)
                        && query.chapter.as_deref().map_or(true, |c| q.chapter == c)
                })
            })
            .collect();
        matching.sort_by(|a, b| b.last_attempt_at.cmp(&a.last_attempt_at));

        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let total = matching.len();
        let total_pages = u32::try_from(total.div_ceil(limit as usize)).unwrap_or(u32::MAX);

        let progress = matching
            .into_iter()
            .skip((page as usize - 1) * limit as usize)
            .take(limit as usize)
            .collect();

        Ok(ProgressPage {
            progress,
            total,
            page,
            total_pages,
        })
    }

    pub async fn progress_stats(&self, user_id: &str) -> Result<ProgressStats> {
        let (records, questions) = self.history(user_id).await?;
        let joined = mastery::join(&records, &questions);
        Ok(mastery::progress_stats(&records, &joined))
    }

    pub async fn concept_breakdown(&self, user_id: &str) -> Result<Vec<ConceptMastery>> {
        let (records, questions) = self.history(user_id).await?;
        Ok(mastery::concept_mastery(&mastery::join(&records, &questions)))
    }

    pub async fn mastery_history(&self, user_id: &str) -> Result<Vec<MasteryPoint>> {
        let (records, questions) = self.history(user_id).await?;
        let since = Utc::now() - Duration::days(HISTORY_DAYS);
        Ok(mastery::mastery_series(&mastery::join(&records, &questions), since))
    }

    /// Cached for a few minutes; every recorded attempt invalidates the entry.
    pub async fn mastery_summary(&self, user_id: &str) -> Result<MasterySummary> {
        let key = mastery_key(user_id);
        if let Some(summary) = self.cache.get::<MasterySummary>(&key).await {
            return Ok(summary);
        }

        let (records, questions) = self.history(user_id).await?;
        let summary = mastery::summarize(&mastery::join(&records, &questions));
        self.cache.put(&key, &summary, MASTERY_TTL_SECS).await;
        Ok(summary)
    }

    pub async fn recommendations(&self, user_id: &str) -> Result<RecommendationsResponse> {
        let summary = self.mastery_summary(user_id).await?;
        let weak_concepts: Vec<_> = summary
            .weak_concepts
            .into_iter()
            .take(RECOMMENDED_CONCEPTS)
            .collect();
        let recommendations = self.recommender.advise(&weak_concepts).await;

        Ok(RecommendationsResponse {
            weak_concepts,
            recommendations,
        })
    }

    pub async fn get_goal(&self, user_id: &str) -> Result<GoalResponse> {
        let learner = self.store.load_learner(user_id).await?;
        let goal = learner.goal.unwrap_or_else(|| LearningGoal {
            target_mastery: DEFAULT_TARGET_MASTERY,
            deadline: None,
            description: String::new(),
            created_at: Utc::now(),
        });
        Ok(GoalResponse { goal })
    }

    pub async fn set_goal(&self, user_id: &str, request: &SetGoalRequest) -> Result<GoalResponse> {
        request.validate()?;

        let goal = LearningGoal {
            target_mastery: request.target_mastery,
            deadline: request.deadline,
            description: request.description.clone().unwrap_or_default(),
            created_at: Utc::now(),
        };
        self.store.save_goal(user_id, &goal).await?;
        tracing::info!(
            "Learning goal set for learner {}: {:.0}%",
            user_id,
            goal.target_mastery
        );

        Ok(GoalResponse { goal })
    }

    pub async fn learner_stats(&self, user_id: &str) -> Result<LearnerStatsResponse> {
        let learner = self.store.load_learner(user_id).await?;
        Ok(LearnerStatsResponse::from(&learner))
    }
}
