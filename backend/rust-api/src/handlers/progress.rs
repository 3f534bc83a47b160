use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::Result,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::{
        learner::SetGoalRequest,
        progress::{ListProgressQuery, RecordAttemptRequest},
    },
    services::AppState,
};

/// POST /api/v1/progress/{questionId}
pub async fn record_attempt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(question_id): Path<String>,
    AppJson(req): AppJson<RecordAttemptRequest>,
) -> Result<impl IntoResponse> {
    let response = state
        .progression
        .record_attempt(&claims.sub, &question_id, &req)
        .await?;
    Ok((StatusCode::OK, Json(response)))
}

pub async fn list_progress(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Query(query): Query<ListProgressQuery>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.insights.list_progress(&claims.sub, &query).await?))
}

pub async fn progress_stats(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.insights.progress_stats(&claims.sub).await?))
}

pub async fn mastery_history(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.insights.mastery_history(&claims.sub).await?))
}

pub async fn concept_breakdown(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.insights.concept_breakdown(&claims.sub).await?))
}

pub async fn mastery_summary(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.insights.mastery_summary(&claims.sub).await?))
}

pub async fn recommendations(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.insights.recommendations(&claims.sub).await?))
}

pub async fn get_goal(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.insights.get_goal(&claims.sub).await?))
}

pub async fn set_goal(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<SetGoalRequest>,
) -> Result<impl IntoResponse> {
    let goal = state.insights.set_goal(&claims.sub, &req).await?;
    Ok((StatusCode::CREATED, Json(goal)))
}
