use serde::Deserialize;
use std::env;

/// Placeholder key shipped in sample `.env` files; treated as "not configured".
const PLACEHOLDER_API_KEY: &str = "your-api-key";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// `None` runs the engine on the in-memory store (local development only).
    pub mongo_uri: Option<String>,
    pub mongo_database: String,
    /// `None` disables the idempotency and mastery caches.
    pub redis_uri: Option<String>,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub text_api: TextApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextApiConfig {
    pub url: String,
    pub key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl TextApiConfig {
    /// The collaborator is only called when a real key is present.
    pub fn is_configured(&self) -> bool {
        self.key
            .as_deref()
            .map(|key| key.len() > 10 && key != PLACEHOLDER_API_KEY)
            .unwrap_or(false)
    }
}

impl Default for TextApiConfig {
    fn default() -> Self {
        Self {
            url: "https://api.deepseek.com".to_string(),
            key: None,
            model: "deepseek-chat".to_string(),
            timeout_secs: 20,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first (two levels up), then the local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml + ENV overrides (prefix: APP_)
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .ok();
        if mongo_uri.is_none() {
            if app_env == "prod" {
                return Err(config::ConfigError::Message(
                    "MONGO_URI must be set in production".to_string(),
                ));
            }
            eprintln!("WARNING: MONGO_URI not set, progression data will be kept in memory");
        }

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "mathquest".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .ok();

        let jwt_secret = match settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
        {
            Ok(secret) => secret,
            Err(_) if app_env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ));
            }
            Err(_) => {
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            }
        };

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        let defaults = TextApiConfig::default();
        let text_api = TextApiConfig {
            url: settings
                .get_string("text_api.url")
                .or_else(|_| env::var("TEXT_API_URL"))
                .unwrap_or(defaults.url),
            key: settings
                .get_string("text_api.key")
                .or_else(|_| env::var("TEXT_API_KEY"))
                .ok(),
            model: settings
                .get_string("text_api.model")
                .or_else(|_| env::var("TEXT_API_MODEL"))
                .unwrap_or(defaults.model),
            timeout_secs: settings
                .get_int("text_api.timeout_secs")
                .ok()
                .and_then(|value| u64::try_from(value).ok())
                .or_else(|| {
                    env::var("TEXT_API_TIMEOUT_SECS")
                        .ok()
                        .and_then(|value| value.parse().ok())
                })
                .unwrap_or(defaults.timeout_secs),
        };

        Ok(Config {
            mongo_uri,
            mongo_database,
            redis_uri,
            jwt_secret,
            bind_addr,
            text_api,
        })
    }
}
