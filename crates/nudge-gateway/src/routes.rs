//! API route handlers.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Path, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use nudge_core::error::NudgeError;
use nudge_core::model::{Event, EventFields, EventId, EventKind};
use nudge_scheduler::CycleOutcome;
use serde::{Deserialize, Serialize};

use crate::accounts::{LoginRequest, RegisterRequest};
use crate::gate::Identity;
use crate::server::AppState;

/// Error body: `{"ok": false, "error": "..."}`.
#[derive(Debug)]
pub struct ApiError(pub NudgeError);

impl From<NudgeError> for ApiError {
    fn from(e: NudgeError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            NudgeError::UserNotFound(_) | NudgeError::EventNotFound(_) => StatusCode::NOT_FOUND,
            NudgeError::UnauthorizedAccess => StatusCode::FORBIDDEN,
            NudgeError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            NudgeError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details stay in the log.
        let message = if status.is_server_error() {
            tracing::error!("❌ Request failed: {}", self.0);
            "An internal error occurred. Please try again.".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(serde_json::json!({"ok": false, "error": message}))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// `Json` body whose rejection is a 400 in the service's error shape.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(NudgeError::Validation(rejection.body_text()).into()),
        }
    }
}

/// Event as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub id: Option<EventId>,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub notified: bool,
}

impl From<Event> for EventView {
    fn from(e: Event) -> Self {
        Self {
            id: e.id,
            title: e.title,
            description: e.description,
            kind: e.kind,
            scheduled_for: e.scheduled_for,
            notified: e.notified,
        }
    }
}

fn require_admin(identity: &Identity) -> ApiResult<()> {
    if identity.has_role("ADMIN") {
        Ok(())
    } else {
        Err(NudgeError::UnauthorizedAccess.into())
    }
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    state.accounts.register(req).await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({"ok": true}))))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let token = state.accounts.login(req).await?;
    Ok(Json(serde_json::json!({
        "token": token,
        "expiresIn": state.tokens.ttl_secs(),
    })))
}

pub async fn list_events(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> ApiResult<Json<Vec<EventView>>> {
    let events = state.events.list(&identity.subject).await?;
    Ok(Json(events.into_iter().map(EventView::from).collect()))
}

pub async fn create_event(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    ApiJson(fields): ApiJson<EventFields>,
) -> ApiResult<(StatusCode, Json<EventView>)> {
    let event = state.events.create(&identity.subject, fields).await?;
    Ok((StatusCode::CREATED, Json(event.into())))
}

pub async fn update_event(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<EventId>,
    ApiJson(fields): ApiJson<EventFields>,
) -> ApiResult<Json<EventView>> {
    let event = state.events.update(id, &identity.subject, fields).await?;
    Ok(Json(event.into()))
}

pub async fn delete_event(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<EventId>,
) -> ApiResult<StatusCode> {
    state.events.delete(id, &identity.subject).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

/// GET /admin/scheduler
pub async fn scheduler_status(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> ApiResult<Json<serde_json::Value>> {
    require_admin(&identity)?;
    Ok(Json(serde_json::json!({"enabled": state.scheduler.is_enabled()})))
}

/// PUT /admin/scheduler: live toggle, effective from the next cycle.
pub async fn scheduler_toggle(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    ApiJson(req): ApiJson<ToggleRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    require_admin(&identity)?;
    state.scheduler.set_enabled(req.enabled);
    tracing::info!("Scheduler toggled to {} by {}", req.enabled, identity.subject);
    Ok(Json(serde_json::json!({"enabled": state.scheduler.is_enabled()})))
}

/// POST /admin/scheduler/run: run one cycle now, outside the cron cadence.
pub async fn scheduler_run(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> ApiResult<Json<serde_json::Value>> {
    require_admin(&identity)?;
    let body = match state.scheduler.run_cycle().await? {
        CycleOutcome::Disabled => serde_json::json!({"outcome": "disabled"}),
        CycleOutcome::Overlapping => serde_json::json!({"outcome": "overlapping"}),
        CycleOutcome::Completed {
            found,
            notified,
            skipped,
        } => serde_json::json!({
            "outcome": "completed",
            "found": found,
            "notified": notified,
            "skipped": skipped,
        }),
    };
    Ok(Json(body))
}
