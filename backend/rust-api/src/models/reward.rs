use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    Badge,
    Achievement,
    Item,
    Title,
    Experience,
    Coins,
}

impl RewardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardKind::Badge => "badge",
            RewardKind::Achievement => "achievement",
            RewardKind::Item => "item",
            RewardKind::Title => "title",
            RewardKind::Experience => "experience",
            RewardKind::Coins => "coins",
        }
    }

    /// Only numeric kinds feed learner stats.
    pub fn is_numeric(&self) -> bool {
        matches!(self, RewardKind::Experience | RewardKind::Coins)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RewardRarity {
    #[default]
    Common,
    Rare,
    Epic,
    Legendary,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RewardSource {
    QuestCompletion,
    Achievement,
    DailyBonus,
    SpecialEvent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceModel {
    Quest,
    Progress,
}

/// Immutable ledger entry. Only `claimed`/`claimed_at` ever change after the append.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reward {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub kind: RewardKind,
    pub name: String,
    pub description: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default)]
    pub rarity: RewardRarity,
    /// 0 for non-numeric kinds
    pub value: i64,
    #[serde(default)]
    pub claimed: bool,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
    pub source: RewardSource,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub source_model: Option<SourceModel>,
    pub created_at: DateTime<Utc>,
}

fn default_icon() -> String {
    "EmojiEvents".to_string()
}

impl Reward {
    pub fn new(
        user_id: &str,
        kind: RewardKind,
        name: impl Into<String>,
        description: impl Into<String>,
        value: i64,
        source: RewardSource,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind,
            name: name.into(),
            description: description.into(),
            icon: default_icon(),
            rarity: RewardRarity::Common,
            value: if kind.is_numeric() { value } else { 0 },
            claimed: false,
            claimed_at: None,
            source,
            source_id: None,
            source_model: None,
            created_at: at,
        }
    }

    pub fn with_rarity(mut self, rarity: RewardRarity) -> Self {
        self.rarity = rarity;
        self
    }

    pub fn from_quest(mut self, quest_id: &str) -> Self {
        self.source_id = Some(quest_id.to_string());
        self.source_model = Some(SourceModel::Quest);
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct ListRewardsQuery {
    pub claimed: Option<bool>,
}
