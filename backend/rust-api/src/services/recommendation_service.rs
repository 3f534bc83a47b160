use std::sync::Arc;

use crate::models::mastery::{StudyAdvice, WeakConcept};
use crate::services::text_generator::{extract_object, TextGenerator};

/// How many weak concepts are sent to the collaborator.
const ADVICE_CONCEPTS: usize = 3;

const SYSTEM_PROMPT: &str = "You are a university math tutor. Reply with a single JSON object only.";

fn advice_prompt(concepts: &[&WeakConcept]) -> String {
    let listed = concepts
        .iter()
        .map(|c| format!("- {} (mastery {:.0}%)", c.concept, c.mastery))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"A learner is struggling with these concepts:
{listed}

Return a JSON object with exactly these fields:
{{
  "importance": "why these concepts matter",
  "methods": ["study method"],
  "resources": ["learning resource"],
  "exercises": ["practice exercise"],
  "connections": ["related concept"]
}}"#
    )
}

/// Advice used when the learner has no weak concepts.
pub fn keep_going_advice() -> StudyAdvice {
    StudyAdvice {
        importance: "All tracked concepts are above the mastery threshold. Keep challenging yourself."
            .to_string(),
        methods: vec![
            "Attempt harder problems in your strongest chapters".to_string(),
            "Explain solutions aloud to check your understanding".to_string(),
        ],
        resources: vec!["Competition and olympiad problem sets".to_string()],
        exercises: vec!["Mixed review sets across chapters".to_string()],
        connections: vec!["Look for links between chapters you have already mastered".to_string()],
    }
}

/// Deterministic advice naming the weakest concepts.
pub fn default_advice(concepts: &[&WeakConcept]) -> StudyAdvice {
    let names = concepts
        .iter()
        .map(|c| c.concept.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    StudyAdvice {
        importance: format!("Focus next on: {}. These concepts are below 70% mastery.", names),
        methods: vec![
            "Review the definitions and worked examples before new problems".to_string(),
            "Redo incorrectly answered questions without looking at the solution".to_string(),
        ],
        resources: concepts
            .iter()
            .map(|c| format!("Textbook section on {}", c.concept))
            .collect(),
        exercises: concepts
            .iter()
            .map(|c| format!("Ten practice problems on {}", c.concept))
            .collect(),
        connections: vec!["Revisit prerequisite chapters for each weak concept".to_string()],
    }
}

pub struct RecommendationService {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl RecommendationService {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self { generator }
    }

    /// Never fails: collaborator problems fall back to the default advice.
    pub async fn advise(&self, weak: &[WeakConcept]) -> StudyAdvice {
        if weak.is_empty() {
            return keep_going_advice();
        }

        let top: Vec<&WeakConcept> = weak.iter().take(ADVICE_CONCEPTS).collect();
        let Some(generator) = &self.generator else {
            return default_advice(&top);
        };

        let advice = match generator.complete(SYSTEM_PROMPT, &advice_prompt(&top)).await {
            Ok(reply) => extract_object::<StudyAdvice>(&reply),
            Err(e) => Err(e),
        };

        advice.unwrap_or_else(|e| {
            tracing::warn!("Recommendation generation failed, using defaults: {}", e);
            default_advice(&top)
        })
    }
}
