use std::sync::Arc;

use mongodb::Client as MongoClient;
use redis::aio::ConnectionManager;

use crate::config::Config;
use crate::middlewares::auth::JwtService;

pub mod cache;
pub mod insights_service;
pub mod mastery;
pub mod progression_service;
pub mod quest_chain_service;
pub mod quest_graph;
pub mod recommendation_service;
pub mod reward_ledger;
pub mod store;
pub mod text_generator;

use cache::ResponseCache;
use insights_service::InsightsService;
use progression_service::ProgressionService;
use quest_chain_service::QuestChainService;
use recommendation_service::RecommendationService;
use reward_ledger::RewardLedger;
use store::{MemoryStore, MongoStore, ProgressionStore};
use text_generator::{ChatCompletionsClient, TextGenerator};

pub struct AppState {
    pub config: Config,
    pub jwt: JwtService,
    pub store: Arc<dyn ProgressionStore>,
    pub cache: ResponseCache,
    pub progression: ProgressionService,
    pub insights: InsightsService,
    pub quest_chains: QuestChainService,
    pub rewards: RewardLedger,
}

impl AppState {
    /// Wires production collaborators. Without a Mongo client the in-memory
    /// store is used; without a Redis client caching is off.
    pub async fn new(
        config: Config,
        mongo_client: Option<MongoClient>,
        redis_client: Option<redis::Client>,
    ) -> anyhow::Result<Self> {
        let store: Arc<dyn ProgressionStore> = match mongo_client {
            Some(client) => {
                let store = MongoStore::new(client, &config.mongo_database);
                store.ensure_indexes().await?;
                Arc::new(store)
            }
            None => {
                tracing::warn!("No MongoDB configured, using the in-memory progression store");
                Arc::new(MemoryStore::new())
            }
        };

        let cache = match redis_client {
            Some(client) => ResponseCache::new(Some(connect_redis(client).await?)),
            None => {
                tracing::info!("No Redis configured, response caching disabled");
                ResponseCache::disabled()
            }
        };

        let generator: Option<Arc<dyn TextGenerator>> = if config.text_api.is_configured() {
            tracing::info!("Text generation enabled ({})", config.text_api.model);
            Some(Arc::new(ChatCompletionsClient::new(config.text_api.clone())?))
        } else {
            tracing::info!("Text generation not configured, default quest content will be used");
            None
        };

        Ok(Self::with_store(config, store, cache, generator))
    }

    pub fn with_store(
        config: Config,
        store: Arc<dyn ProgressionStore>,
        cache: ResponseCache,
        generator: Option<Arc<dyn TextGenerator>>,
    ) -> Self {
        Self {
            jwt: JwtService::new(&config.jwt_secret),
            progression: ProgressionService::new(store.clone(), cache.clone()),
            insights: InsightsService::new(
                store.clone(),
                cache.clone(),
                RecommendationService::new(generator.clone()),
            ),
            quest_chains: QuestChainService::new(store.clone(), generator),
            rewards: RewardLedger::new(store.clone()),
            config,
            store,
            cache,
        }
    }
}

async fn connect_redis(client: redis::Client) -> anyhow::Result<ConnectionManager> {
    tracing::info!("Attempting to connect to Redis...");

    let redis = tokio::time::timeout(
        std::time::Duration::from_secs(30),
        ConnectionManager::new(client),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

    let mut conn = redis.clone();
    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

    tracing::info!("Redis connection established successfully");
    Ok(redis)
}
