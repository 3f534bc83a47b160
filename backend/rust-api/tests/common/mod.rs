#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use mathquest_api::{
    config::{Config, TextApiConfig},
    create_router,
    error::ProgressionError,
    middlewares::auth::{JwtClaims, JwtService},
    models::question::QuestionRef,
    services::{
        cache::ResponseCache,
        store::{MemoryStore, ProgressionStore},
        text_generator::TextGenerator,
        AppState,
    },
};
use serde_json::Value;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "integration-test-secret";

/// Two-quest chain without badges: Limits then Derivatives, 5 questions at 70%.
pub const TWO_QUEST_CHAIN: &str = r#"Here is the path:
[
  {
    "title": "Trial of Limits",
    "description": "Compute one-sided and two-sided limits.",
    "difficulty": "beginner",
    "subject": "Calculus",
    "chapter": "Limits",
    "requirements": {"questionsToComplete": 5, "minAccuracy": 70, "timeLimit": 48},
    "rewards": {"experience": 100, "coins": 50, "badges": []},
    "isMainQuest": true
  },
  {
    "title": "Road of Derivatives",
    "description": "Differentiate with the product and chain rules.",
    "difficulty": "intermediate",
    "subject": "Calculus",
    "chapter": "Derivatives",
    "requirements": {"questionsToComplete": 5, "minAccuracy": 70, "timeLimit": 72},
    "rewards": {"experience": 200, "coins": 100, "badges": []},
    "isMainQuest": true
  }
]"#;

/// Replies with a fixed text, or fails like an unreachable upstream.
pub struct ScriptedGenerator {
    reply: Option<String>,
}

impl ScriptedGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
        }
    }

    pub fn unavailable() -> Self {
        Self { reply: None }
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, ProgressionError> {
        self.reply
            .clone()
            .ok_or_else(|| ProgressionError::ExternalService("scripted outage".to_string()))
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    jwt: JwtService,
}

pub async fn create_test_app(generator: Option<ScriptedGenerator>) -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let config = Config {
        mongo_uri: None,
        mongo_database: "mathquest_test".to_string(),
        redis_uri: None,
        jwt_secret: JWT_SECRET.to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        text_api: TextApiConfig::default(),
    };

    let store = Arc::new(MemoryStore::new());
    seed_questions(&store).await;

    let generator = generator.map(|g| Arc::new(g) as Arc<dyn TextGenerator>);
    let state = AppState::with_store(
        config,
        store.clone() as Arc<dyn ProgressionStore>,
        ResponseCache::disabled(),
        generator,
    );

    TestApp {
        router: create_router(Arc::new(state)),
        store,
        jwt: JwtService::new(JWT_SECRET),
    }
}

/// `lim-1..=8` in Calculus/Limits, `der-1..=8` in Calculus/Derivatives,
/// `alg-1..=3` in Algebra/Matrices.
async fn seed_questions(store: &MemoryStore) {
    let scopes = [
        ("lim", "Calculus", "Limits", vec!["limits"], 8),
        ("der", "Calculus", "Derivatives", vec!["derivatives", "chain-rule"], 8),
        ("alg", "Algebra", "Matrices", vec!["matrices"], 3),
    ];

    for (prefix, subject, chapter, tags, count) in scopes {
        for n in 1..=count {
            store
                .insert_question(QuestionRef {
                    id: format!("{}-{}", prefix, n),
                    subject: subject.to_string(),
                    chapter: chapter.to_string(),
                    tags: tags.iter().map(|t| t.to_string()).collect(),
                })
                .await;
        }
    }
}

impl TestApp {
    pub fn token(&self, learner_id: &str) -> String {
        self.jwt
            .generate_token(&JwtClaims::for_learner(learner_id, 3600))
            .unwrap()
    }

    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        learner_id: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(learner) = learner_id {
            builder = builder.header("authorization", format!("Bearer {}", self.token(learner)));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, learner_id: &str) -> (StatusCode, Value) {
        self.send("GET", uri, Some(learner_id), None).await
    }

    pub async fn post(&self, uri: &str, learner_id: &str, body: Value) -> (StatusCode, Value) {
        self.send("POST", uri, Some(learner_id), Some(body)).await
    }

    pub async fn generate_chain(&self, learner_id: &str) -> (StatusCode, Value) {
        self.post("/api/v1/quests/generate", learner_id, profile()).await
    }

    pub async fn answer(&self, learner_id: &str, question_id: &str, correct: bool) -> Value {
        let (status, body) = self
            .post(
                &format!("/api/v1/progress/{}", question_id),
                learner_id,
                attempt(correct),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "attempt rejected: {}", body);
        body
    }

    pub async fn quests(&self, learner_id: &str) -> Vec<Value> {
        let (status, body) = self.get("/api/v1/quests/my", learner_id).await;
        assert_eq!(status, StatusCode::OK);
        body.as_array().cloned().unwrap()
    }

    pub async fn rewards(&self, learner_id: &str) -> Vec<Value> {
        let (status, body) = self.get("/api/v1/rewards/my", learner_id).await;
        assert_eq!(status, StatusCode::OK);
        body.as_array().cloned().unwrap()
    }
}

pub fn profile() -> Value {
    serde_json::json!({
        "grade": "sophomore",
        "studyReason": "final exam",
        "preferredGuide": "mentor",
        "mathBackground": "intermediate",
        "learningGoals": "pass calculus"
    })
}

pub fn attempt(correct: bool) -> Value {
    serde_json::json!({
        "status": "completed",
        "is_correct": correct,
        "user_answer": if correct { "42" } else { "41" },
        "time_spent": 30
    })
}

pub fn learner() -> String {
    format!("learner-{}", uuid::Uuid::new_v4())
}
