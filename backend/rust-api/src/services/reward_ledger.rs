use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{ProgressionError, Result};
use crate::metrics::REWARDS_GRANTED_TOTAL;
use crate::models::{
    learner::StatsDelta,
    quest::{Quest, QuestStatus},
    reward::{Reward, RewardKind, RewardRarity, RewardSource},
};
use crate::services::store::{GrantOutcome, ProgressionStore};

/// Applied-grant key for the one-time chain completion achievement.
pub const CHAIN_COMPLETION_GRANT: &str = "chain-completion";

const CHAIN_COMPLETION_NAME: &str = "Learning Master";

pub fn quest_grant_key(quest_id: &str) -> String {
    format!("quest:{}", quest_id)
}

/// Ledger entries and stats increment for one completed quest: one entry per
/// non-zero numeric component plus one per badge.
pub fn quest_rewards(quest: &Quest, at: DateTime<Utc>) -> (Vec<Reward>, StatsDelta) {
    let reason = format!("Completed quest \"{}\"", quest.title);
    let mut rewards = Vec::new();

    if quest.rewards.experience > 0 {
        rewards.push(
            Reward::new(
                &quest.user_id,
                RewardKind::Experience,
                format!("Experience +{}", quest.rewards.experience),
                reason.clone(),
                quest.rewards.experience,
                RewardSource::QuestCompletion,
                at,
            )
            .from_quest(&quest.id),
        );
    }

    if quest.rewards.coins > 0 {
        rewards.push(
            Reward::new(
                &quest.user_id,
                RewardKind::Coins,
                format!("Coins +{}", quest.rewards.coins),
                reason.clone(),
                quest.rewards.coins,
                RewardSource::QuestCompletion,
                at,
            )
            .from_quest(&quest.id),
        );
    }

    for badge in &quest.rewards.badges {
        rewards.push(
            Reward::new(
                &quest.user_id,
                RewardKind::Badge,
                badge.clone(),
                reason.clone(),
                0,
                RewardSource::QuestCompletion,
                at,
            )
            .with_rarity(RewardRarity::Rare)
            .from_quest(&quest.id),
        );
    }

    // Stats move by the sum of numeric entries, never by the raw schedule
    let delta = rewards.iter().fold(
        StatsDelta {
            completed_quests: 1,
            ..Default::default()
        },
        |mut delta, reward| {
            match reward.kind {
                RewardKind::Experience => delta.experience += reward.value,
                RewardKind::Coins => delta.coins += reward.value,
                _ => {}
            }
            delta
        },
    );

    (rewards, delta)
}

fn chain_completion_reward(user_id: &str, at: DateTime<Utc>) -> Reward {
    let mut reward = Reward::new(
        user_id,
        RewardKind::Achievement,
        CHAIN_COMPLETION_NAME,
        "Completed every main quest in the learning chain",
        0,
        RewardSource::SpecialEvent,
        at,
    )
    .with_rarity(RewardRarity::Legendary);
    reward.icon = "MilitaryTech".to_string();
    reward
}

fn record_granted(rewards: &[Reward]) {
    for reward in rewards {
        REWARDS_GRANTED_TOTAL
            .with_label_values(&[reward.kind.as_str()])
            .inc();
    }
}

pub struct RewardLedger {
    store: Arc<dyn ProgressionStore>,
}

impl RewardLedger {
    pub fn new(store: Arc<dyn ProgressionStore>) -> Self {
        Self { store }
    }

    /// Appends the quest's rewards and bumps learner stats in one unit.
    /// A second grant for the same quest is an invariant violation and writes nothing.
    pub async fn grant(&self, quest: &Quest) -> Result<Vec<Reward>> {
        if quest.status != QuestStatus::Completed {
            return Err(ProgressionError::InvariantViolation(format!(
                "grant requested for quest {} in status {}",
                quest.id,
                quest.status.as_str()
            )));
        }

        let (rewards, delta) = quest_rewards(quest, Utc::now());
        let outcome = self
            .store
            .append_grant(&quest.user_id, &quest_grant_key(&quest.id), &rewards, delta)
            .await?;

        match outcome {
            GrantOutcome::Granted => {
                record_granted(&rewards);
                tracing::info!(
                    "Granted {} rewards for quest {} to learner {} (+{} xp, +{} coins)",
                    rewards.len(),
                    quest.id,
                    quest.user_id,
                    delta.experience,
                    delta.coins
                );
                Ok(rewards)
            }
            GrantOutcome::AlreadyGranted => Err(ProgressionError::InvariantViolation(format!(
                "rewards for quest {} already granted to learner {}",
                quest.id, quest.user_id
            ))),
        }
    }

    /// Issues the legendary achievement once per learner. Returns the existing
    /// entry when it was granted before.
    pub async fn grant_chain_completion(&self, user_id: &str) -> Result<Reward> {
        if let Some(existing) = self.find_chain_completion(user_id).await? {
            return Ok(existing);
        }

        let reward = chain_completion_reward(user_id, Utc::now());
        let outcome = self
            .store
            .append_grant(
                user_id,
                CHAIN_COMPLETION_GRANT,
                std::slice::from_ref(&reward),
                StatsDelta::default(),
            )
            .await?;

        match outcome {
            GrantOutcome::Granted => {
                record_granted(std::slice::from_ref(&reward));
                tracing::info!("Legendary achievement granted to learner {}", user_id);
                Ok(reward)
            }
            // Lost a race with a concurrent check
            GrantOutcome::AlreadyGranted => self
                .find_chain_completion(user_id)
                .await?
                .ok_or_else(|| {
                    ProgressionError::InvariantViolation(format!(
                        "chain completion marked as granted but missing for learner {}",
                        user_id
                    ))
                }),
        }
    }

    async fn find_chain_completion(&self, user_id: &str) -> Result<Option<Reward>> {
        let rewards = self.store.list_rewards(user_id, None).await?;
        Ok(rewards.into_iter().find(|r| {
            r.kind == RewardKind::Achievement
                && r.source == RewardSource::SpecialEvent
                && r.rarity == RewardRarity::Legendary
        }))
    }

    pub async fn claim(&self, user_id: &str, reward_id: &str) -> Result<Reward> {
        let reward = self
            .store
            .claim_reward(user_id, reward_id, Utc::now())
            .await?
            .ok_or_else(|| ProgressionError::not_found("unclaimed reward"))?;

        tracing::info!("Reward {} claimed by learner {}", reward.id, user_id);
        Ok(reward)
    }

    pub async fn list(&self, user_id: &str, claimed: Option<bool>) -> Result<Vec<Reward>> {
        Ok(self.store.list_rewards(user_id, claimed).await?)
    }
}
