use serde::{Deserialize, Serialize};

/// Read-only projection of a question-bank document. Only the fields the
/// progression engine joins on are kept; the rest of the document is ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionRef {
    #[serde(rename = "_id")]
    pub id: String,
    pub subject: String,
    pub chapter: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl QuestionRef {
    pub fn in_scope(&self, subject: &str, chapter: &str) -> bool {
        self.subject == subject && self.chapter == chapter
    }
}
