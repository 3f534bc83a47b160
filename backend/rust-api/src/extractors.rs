use axum::{
    extract::{FromRequest, Request},
    Json,
};

use crate::error::ProgressionError;

/// JSON body extractor whose rejection uses the engine's error body instead of
/// axum's plain-text one. Malformed bodies surface as validation failures.
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: serde::de::DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = ProgressionError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(ProgressionError::Validation(format!(
                "Failed to parse JSON request body: {}",
                rejection.body_text()
            ))),
        }
    }
}
