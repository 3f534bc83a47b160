use anyhow::Context;
use redis::aio::ConnectionManager;
use serde::{de::DeserializeOwned, Serialize};

use crate::metrics::{record_cache_hit, record_cache_miss, track_cache_operation};

/// Idempotent attempt submissions are replayed for a day.
pub const IDEMPOTENCY_TTL_SECS: u64 = 24 * 3600;
pub const MASTERY_TTL_SECS: u64 = 5 * 60;

/// Client keys are only unique per question, so the question id is part of the key.
pub fn idempotency_key(user_id: &str, question_id: &str, key: &str) -> String {
    format!("progress:idempotency:{}:{}:{}", user_id, question_id, key)
}

pub fn mastery_key(user_id: &str) -> String {
    format!("progress:mastery:{}", user_id)
}

/// Best-effort Redis cache. Without a connection every lookup misses and every
/// write is dropped; Redis errors are logged and treated the same way.
#[derive(Clone, Default)]
pub struct ResponseCache {
    redis: Option<ConnectionManager>,
}

impl ResponseCache {
    pub fn new(redis: Option<ConnectionManager>) -> Self {
        Self { redis }
    }

    pub fn disabled() -> Self {
        Self { redis: None }
    }

    pub fn connection(&self) -> Option<ConnectionManager> {
        self.redis.clone()
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.redis.clone()?;

        let cached = track_cache_operation("get", async {
            redis::cmd("GET")
                .arg(key)
                .query_async::<Option<String>>(&mut conn)
                .await
                .context("Failed to read from Redis")
        })
        .await;

        match cached {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(value) => {
                    record_cache_hit();
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!("Discarding undecodable cache entry {}: {}", key, e);
                    record_cache_miss();
                    None
                }
            },
            Ok(None) => {
                record_cache_miss();
                None
            }
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {:#}", key, e);
                None
            }
        }
    }

    pub async fn put<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        let Some(mut conn) = self.redis.clone() else {
            return;
        };

        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Failed to encode cache entry {}: {}", key, e);
                return;
            }
        };

        if let Err(e) = track_cache_operation("setex", async {
            redis::cmd("SETEX")
                .arg(key)
                .arg(ttl_secs)
                .arg(json)
                .query_async::<()>(&mut conn)
                .await
                .context("Failed to write to Redis")
        })
        .await
        {
            tracing::warn!("Cache write failed for {}: {:#}", key, e);
        }
    }

    pub async fn invalidate(&self, key: &str) {
        let Some(mut conn) = self.redis.clone() else {
            return;
        };

        if let Err(e) = track_cache_operation("del", async {
            redis::cmd("DEL")
                .arg(key)
                .query_async::<()>(&mut conn)
                .await
                .context("Failed to delete from Redis")
        })
        .await
        {
            tracing::warn!("Cache invalidation failed for {}: {:#}", key, e);
        }
    }
}
