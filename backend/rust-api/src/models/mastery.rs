use serde::{Deserialize, Serialize};

/// Mastery below this percentage marks a concept as weak.
pub const WEAK_CONCEPT_THRESHOLD: f64 = 70.0;

/// Accuracy of completed attempts inside one subject+chapter scope.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ScopedAccuracy {
    pub questions_completed: u32,
    pub correct: u32,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryBucket {
    pub key: String,
    pub total: u32,
    pub correct: u32,
    pub mastery: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptMastery {
    pub concept: String,
    pub total: u32,
    pub correct: u32,
    /// Sum of submission counters across the concept's records
    pub attempts: u32,
    pub average_time_spent: f64,
    pub mastery: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeakConcept {
    pub concept: String,
    pub mastery: f64,
    pub total: u32,
    pub correct: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryPoint {
    /// Calendar day, `YYYY-MM-DD`
    pub date: String,
    pub correct_count: u32,
    pub total_count: u32,
    pub average_attempts: f64,
    pub mastery: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterySummary {
    pub overall: f64,
    pub by_subject: Vec<MasteryBucket>,
    pub by_chapter: Vec<MasteryBucket>,
    pub by_concept: Vec<ConceptMastery>,
    pub weak_concepts: Vec<WeakConcept>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OverallStats {
    pub total_questions: u32,
    pub correct_answers: u32,
    pub total_attempts: u32,
    pub average_time_spent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressStats {
    pub overall: OverallStats,
    pub by_subject: Vec<MasteryBucket>,
    pub by_chapter: Vec<MasteryBucket>,
}

/// Study advice authored by the text collaborator or the built-in defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyAdvice {
    pub importance: String,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub exercises: Vec<String>,
    #[serde(default)]
    pub connections: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationsResponse {
    pub weak_concepts: Vec<WeakConcept>,
    pub recommendations: StudyAdvice,
}
