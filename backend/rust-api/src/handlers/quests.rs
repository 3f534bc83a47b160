use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::Result, extractors::AppJson, middlewares::auth::JwtClaims,
    models::learner::LearnerProfile, services::AppState,
};

/// POST /api/v1/quests/generate
pub async fn generate_chain(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(profile): AppJson<LearnerProfile>,
) -> Result<impl IntoResponse> {
    tracing::info!("Quest chain requested by learner {}", claims.sub);

    let chain = state.quest_chains.create_chain(&claims.sub, &profile).await?;
    let status = if chain.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(chain)))
}

pub async fn chain_status(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.quest_chains.chain_status(&claims.sub).await?))
}

pub async fn list_quests(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.quest_chains.list_quests(&claims.sub).await?))
}

/// POST /api/v1/quests/{id}/evaluate
pub async fn evaluate_quest(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(quest_id): Path<String>,
) -> Result<impl IntoResponse> {
    Ok(Json(
        state.progression.evaluate_quest(&claims.sub, &quest_id).await?,
    ))
}

pub async fn check_completion(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse> {
    Ok(Json(
        state.progression.check_chain_completion(&claims.sub).await?,
    ))
}
