use std::sync::Arc;

use chrono::Utc;
use validator::Validate;

use crate::error::{ProgressionError, Result};
use crate::metrics::QUEST_CHAINS_GENERATED_TOTAL;
use crate::models::{
    learner::LearnerProfile,
    quest::{
        ChainResponse, ChainStatusResponse, Quest, QuestDescriptor, QuestDifficulty, QuestKind,
        QuestRequirements, QuestRewards, QuestStatus,
    },
};
use crate::services::{
    quest_graph::build_chain,
    store::ProgressionStore,
    text_generator::{extract_array, TextGenerator},
};

/// Upper bound on generated chain length; longer replies are rejected.
pub const MAX_GENERATED_QUESTS: usize = 12;

const SYSTEM_PROMPT: &str = "You design RPG-style university math learning paths. \
Reply with a JSON array only, no commentary.";

fn chain_prompt(profile: &LearnerProfile) -> String {
    format!(
        r#"Create a learning path of 5 to 8 main quests for this learner.

Learner:
- Grade: {grade}
- Reason for studying: {reason}
- Preferred guidance: {guide}
- Math background: {background}
- Learning goals: {goals}

Return a JSON array where every element has exactly these fields:
{{
  "title": "RPG style quest title",
  "description": "what the learner practices",
  "difficulty": "beginner|intermediate|advanced",
  "subject": "math subject",
  "chapter": "chapter within the subject",
  "requirements": {{"questionsToComplete": 5, "minAccuracy": 70, "timeLimit": 48}},
  "rewards": {{"experience": 100, "coins": 50, "badges": ["badge name"]}},
  "isMainQuest": true
}}
Difficulty must increase along the path."#,
        grade = profile.grade,
        reason = profile.study_reason,
        guide = profile.preferred_guide,
        background = profile.math_background.as_deref().unwrap_or("unknown"),
        goals = profile.learning_goals.as_deref().unwrap_or("unknown"),
    )
}

/// Parses a collaborator reply. Any invalid descriptor rejects the whole reply.
pub fn parse_descriptors(reply: &str) -> Result<Vec<QuestDescriptor>> {
    let descriptors: Vec<QuestDescriptor> = extract_array(reply)?;

    if descriptors.is_empty() {
        return Err(ProgressionError::ExternalService(
            "quest chain reply is empty".to_string(),
        ));
    }
    if descriptors.len() > MAX_GENERATED_QUESTS {
        return Err(ProgressionError::ExternalService(format!(
            "quest chain reply has {} quests (max {})",
            descriptors.len(),
            MAX_GENERATED_QUESTS
        )));
    }

    for (index, descriptor) in descriptors.iter().enumerate() {
        descriptor.validate().map_err(|e| {
            ProgressionError::ExternalService(format!("quest {} is invalid: {}", index + 1, e))
        })?;
    }

    Ok(descriptors)
}

fn descriptor(
    title: &str,
    description: &str,
    difficulty: QuestDifficulty,
    chapter: &str,
    requirements: (u32, f64, u32),
    rewards: (i64, i64, &[&str]),
) -> QuestDescriptor {
    QuestDescriptor {
        title: title.to_string(),
        description: description.to_string(),
        difficulty,
        subject: "Calculus".to_string(),
        chapter: chapter.to_string(),
        requirements: QuestRequirements {
            questions_to_complete: requirements.0,
            min_accuracy: requirements.1,
            time_limit: requirements.2,
        },
        rewards: QuestRewards {
            experience: rewards.0,
            coins: rewards.1,
            badges: rewards.2.iter().map(|b| b.to_string()).collect(),
        },
        kind: QuestKind::Main,
        is_main_quest: true,
    }
}

/// Fixed five-quest calculus chain used whenever generation is unavailable.
pub fn default_chain(profile: &LearnerProfile) -> Vec<QuestDescriptor> {
    let middle = QuestDifficulty::from_background(profile.math_background.as_deref());

    vec![
        descriptor(
            "Foundations Expedition",
            "Start the adventure: functions, notation and the basic operations.",
            QuestDifficulty::Beginner,
            "Functions and Limits",
            (5, 70.0, 48),
            (100, 50, &["Math Novice"]),
        ),
        descriptor(
            "Trial of Limits",
            "Understand limits in depth and master the techniques for computing them.",
            middle,
            "Limits and Continuity",
            (8, 75.0, 72),
            (150, 75, &["Limit Master"]),
        ),
        descriptor(
            "Road of Derivatives",
            "Learn the definition of the derivative, its rules and its geometric meaning.",
            middle,
            "Derivatives and Differentials",
            (10, 80.0, 96),
            (200, 100, &["Derivative Expert"]),
        ),
        descriptor(
            "Integral Frontier",
            "Compute indefinite and definite integrals with confidence.",
            middle,
            "Integration",
            (12, 80.0, 120),
            (250, 125, &["Integral Warrior"]),
        ),
        descriptor(
            "Final Calculus Ordeal",
            "Combine everything to solve complex problems and become a true math hero.",
            QuestDifficulty::Advanced,
            "Applications of Calculus",
            (15, 85.0, 168),
            (500, 250, &["Calculus Master", "Math Hero"]),
        ),
    ]
}

pub struct QuestChainService {
    store: Arc<dyn ProgressionStore>,
    generator: Option<Arc<dyn TextGenerator>>,
}

impl QuestChainService {
    pub fn new(store: Arc<dyn ProgressionStore>, generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self { store, generator }
    }

    /// Creates the learner's chain once. Later calls return the stored chain.
    pub async fn create_chain(&self, user_id: &str, profile: &LearnerProfile) -> Result<ChainResponse> {
        profile.validate()?;

        let existing = self.store.list_quests(user_id).await?;
        if !existing.is_empty() {
            return Ok(existing_chain(existing));
        }

        let (descriptors, source) = self.author_chain(profile).await;
        let quests = build_chain(user_id, descriptors, Utc::now());

        match self.store.insert_quests(&quests).await {
            Ok(()) => {}
            Err(crate::services::store::StoreError::Conflict(_)) => {
                // A concurrent request created the chain first
                tracing::debug!("Quest chain for learner {} created concurrently", user_id);
                return Ok(existing_chain(self.store.list_quests(user_id).await?));
            }
            Err(e) => return Err(e.into()),
        }

        QUEST_CHAINS_GENERATED_TOTAL.with_label_values(&[source]).inc();
        tracing::info!(
            "Quest chain created for learner {}: {} quests ({})",
            user_id,
            quests.len(),
            source
        );

        Ok(ChainResponse {
            message: "Quest chain created".to_string(),
            created: true,
            quests,
        })
    }

    /// Asks the collaborator first; any failure yields the default chain.
    async fn author_chain(&self, profile: &LearnerProfile) -> (Vec<QuestDescriptor>, &'static str) {
        let Some(generator) = &self.generator else {
            return (default_chain(profile), "default");
        };

        let generated = match generator.complete(SYSTEM_PROMPT, &chain_prompt(profile)).await {
            Ok(reply) => parse_descriptors(&reply),
            Err(e) => Err(e),
        };

        match generated {
            Ok(descriptors) => (descriptors, "generated"),
            Err(e) => {
                tracing::warn!("Quest chain generation failed, using default chain: {}", e);
                (default_chain(profile), "fallback")
            }
        }
    }

    pub async fn chain_status(&self, user_id: &str) -> Result<ChainStatusResponse> {
        let quests = self.store.list_quests(user_id).await?;
        Ok(ChainStatusResponse {
            has_quest_chain: !quests.is_empty(),
            quest_count: quests.len(),
            completed_count: quests
                .iter()
                .filter(|q| q.status == QuestStatus::Completed)
                .count(),
        })
    }

    pub async fn list_quests(&self, user_id: &str) -> Result<Vec<Quest>> {
        Ok(self.store.list_quests(user_id).await?)
    }
}

fn existing_chain(quests: Vec<Quest>) -> ChainResponse {
    ChainResponse {
        message: "Quest chain already exists".to_string(),
        created: false,
        quests,
    }
}
