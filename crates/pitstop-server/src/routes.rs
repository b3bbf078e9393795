use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use pitstop_chat::{LiveFeed, RosterAggregator, SessionResolver, ThreadStore};
use pitstop_types::api::{ErrorBody, SendMessageRequest};
use pitstop_types::error::ChatError;
use pitstop_types::models::{Identity, ThreadId};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub store: ThreadStore,
    pub feed: LiveFeed,
    pub roster: RosterAggregator,
    pub resolver: Arc<dyn SessionResolver>,
}

/// Resolve the bearer credential into an Identity and attach it to the
/// request. Anything less than a valid session is a 401; there is no
/// guest identity.
pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorBody>)> {
    let credential = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| error_response(ChatError::Unauthenticated))?;

    let identity = state
        .resolver
        .resolve(credential)
        .map_err(error_response)?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(thread_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorBody>)> {
    let message = state
        .store
        .append(
            ThreadId(thread_id),
            &identity,
            &req.text,
            req.client_token.as_deref(),
        )
        .await
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(thread_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorBody>)> {
    let messages = state
        .store
        .read(&identity, ThreadId(thread_id))
        .await
        .map_err(error_response)?;

    Ok(Json(messages))
}

pub async fn get_roster(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorBody>)> {
    let records = state
        .store
        .list_roster(&identity)
        .await
        .map_err(error_response)?;

    Ok(Json(records))
}

/// Terminal auth failures map to 401/403, bad content to 422 with the
/// reason verbatim, storage trouble to a retryable 503.
fn error_response(err: ChatError) -> (StatusCode, Json<ErrorBody>) {
    let status = match &err {
        ChatError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ChatError::Authorization(_) => StatusCode::FORBIDDEN,
        ChatError::Unauthenticated => StatusCode::UNAUTHORIZED,
        ChatError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
    };

    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}
