use axum::{extract::State, response::IntoResponse, Extension, Json};
use std::sync::Arc;

use crate::{error::Result, middlewares::auth::JwtClaims, services::AppState};

/// GET /api/v1/learners/me: aggregate stats and derived level.
pub async fn my_stats(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.insights.learner_stats(&claims.sub).await?))
}
