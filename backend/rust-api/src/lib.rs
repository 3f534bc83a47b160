use std::sync::Arc;

use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::ProgressionError;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    let api = Router::new()
        .nest("/progress", progress_routes())
        .nest("/quests", quest_routes())
        .nest("/rewards", reward_routes())
        .route("/learners/me", get(handlers::learners::my_stats))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/v1", api.layer(cors))
        .with_state(app_state)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn progress_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/my", get(handlers::progress::list_progress))
        .route("/stats", get(handlers::progress::progress_stats))
        .route("/history", get(handlers::progress::mastery_history))
        .route("/concepts", get(handlers::progress::concept_breakdown))
        .route("/mastery", get(handlers::progress::mastery_summary))
        .route("/recommendations", get(handlers::progress::recommendations))
        .route(
            "/goals",
            get(handlers::progress::get_goal).post(handlers::progress::set_goal),
        )
        .route("/{question_id}", post(handlers::progress::record_attempt))
}

fn quest_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/generate", post(handlers::quests::generate_chain))
        .route("/status", get(handlers::quests::chain_status))
        .route("/my", get(handlers::quests::list_quests))
        .route("/check-completion", get(handlers::quests::check_completion))
        .route("/{id}/evaluate", post(handlers::quests::evaluate_quest))
}

fn reward_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/my", get(handlers::rewards::list_rewards))
        .route("/{id}/claim", post(handlers::rewards::claim_reward))
}
