//! HTTP router and shared application state.
//!
//! Two WebSocket endpoints carry the live traffic; a small REST surface
//! drives token and viewer-entry management. Admin authentication sits in
//! front of this router in deployment and is out of scope here.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use log::error;
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::access::{AccessService, GenerateViewerTokenRequest};
use crate::activity::ActivityStore;
use crate::broadcast::SubtitleBroadcaster;
use crate::error::AccessError;
use crate::pipeline::TranslationPipeline;
use crate::ws::{speaker_ws, viewer_ws};

/// Everything the handlers need, cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    pub access: Arc<AccessService>,
    pub pipeline: Arc<TranslationPipeline>,
    pub broadcaster: Arc<SubtitleBroadcaster>,
    pub activities: Arc<dyn ActivityStore>,
}

/// Build the full application router.
pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    let cors = cors_layer(allowed_origins);

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/ws/speaker", get(speaker_ws))
        .route("/ws/viewer", get(viewer_ws))
        .route("/api/v1/activities/:id", get(get_activity))
        .route(
            "/api/v1/activities/:id/tokens",
            get(list_tokens),
        )
        .route(
            "/api/v1/activities/:id/tokens/speaker",
            post(generate_speaker_token).delete(revoke_speaker_tokens),
        )
        .route(
            "/api/v1/activities/:id/tokens/speaker/:token_id",
            delete(revoke_speaker_token),
        )
        .route(
            "/api/v1/activities/:id/tokens/viewer",
            post(generate_viewer_token),
        )
        .route(
            "/api/v1/activities/:id/viewer-entry",
            get(get_viewer_entry),
        )
        .route(
            "/api/v1/activities/:id/viewer-entry/revoke",
            post(revoke_viewer_entry),
        )
        .route(
            "/api/v1/activities/:id/viewer-entry/activate",
            post(activate_viewer_entry),
        )
        .layer(cors)
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
}

/// Access errors rendered as `{code, message}` with a fitting status.
struct ApiError(AccessError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AccessError::ActivityNotFound(_) | AccessError::TokenNotFound => {
                StatusCode::NOT_FOUND
            }
            AccessError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        if !self.0.is_client_error() {
            error!("Access store failure: {}", self.0);
        }
        let body = json!({
            "code": self.0.code(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<AccessError> for ApiError {
    fn from(e: AccessError) -> Self {
        Self(e)
    }
}

async fn get_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let activity = state.activities.find_by_id(&id)?;
    Ok(Json(activity))
}

async fn generate_speaker_token(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let token = state.access.generate_speaker_token(&id).await?;
    Ok(Json(token))
}

async fn revoke_speaker_tokens(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.access.revoke_speaker_tokens(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn revoke_speaker_token(
    State(state): State<AppState>,
    Path((id, token_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    state.access.revoke_speaker_token(&id, &token_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn generate_viewer_token(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<GenerateViewerTokenRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let token = state.access.generate_viewer_token(&id, &req).await?;
    Ok(Json(token))
}

async fn list_tokens(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tokens = state.access.list_tokens(&id).await?;
    Ok(Json(tokens))
}

async fn get_viewer_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state.access.get_viewer_entry(&id).await?;
    Ok(Json(entry))
}

async fn revoke_viewer_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state.access.revoke_viewer_entry(&id).await?;
    Ok(Json(entry))
}

async fn activate_viewer_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state.access.activate_viewer_entry(&id).await?;
    Ok(Json(entry))
}
