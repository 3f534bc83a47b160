use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::Result, middlewares::auth::JwtClaims, models::reward::ListRewardsQuery,
    services::AppState,
};

pub async fn list_rewards(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Query(query): Query<ListRewardsQuery>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.rewards.list(&claims.sub, query.claimed).await?))
}

/// POST /api/v1/rewards/{id}/claim
pub async fn claim_reward(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(reward_id): Path<String>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.rewards.claim(&claims.sub, &reward_id).await?))
}
