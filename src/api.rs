//! HTTP API handlers for Grievance Insights.
//!
//! The identity gateway in front of this service authenticates the caller and
//! forwards who they are as headers:
//!
//! - `Authorization: Bearer <token>` (required, forwarded to the backend)
//! - `X-User-Id` (required, keys the caller's chat session)
//! - `X-User-Name`
//! - `X-User-Role`: `Employee`, `Manager` or `Admin`
//! - `X-Dept-Id`: department managed by a manager
//!
//! Those headers become a [`Session`] that handlers receive as an argument.
//! Logging never records the bearer token.

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, State},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::IntoResponse,
    routing::{delete, get},
};
use serde::Serialize;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::chat::ChatDesk;
use crate::dashboard::{Dashboard, ReportResponse};
use crate::model::{
    ChatReplyResponse, ChatRequest, ChatTranscriptResponse, Notification, Role, Session,
};
use crate::notifications::NotificationCenter;
use crate::push::ConnectionState;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub dashboard: Dashboard,
    pub notifications: NotificationCenter,
    pub chat: ChatDesk,
    /// State of the hub subscription, when one is running.
    pub push_state: Option<watch::Receiver<ConnectionState>>,
}

/// All routes, with request tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/reports", get(get_report))
        .route("/notifications", get(list_notifications))
        .route("/notifications/connection", get(get_connection_state))
        .route("/notifications/:id", delete(dismiss_notification))
        .route("/chat", get(get_chat).post(post_chat).delete(end_chat))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let token = header(AUTHORIZATION.as_str())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let user_id = header("x-user-id").ok_or(StatusCode::UNAUTHORIZED)?;

        Ok(Session {
            user_id: user_id.to_string(),
            name: header("x-user-name").unwrap_or_default().to_string(),
            role: header("x-user-role").map_or(Role::Employee, Role::parse),
            dept_id: header("x-dept-id").and_then(|v| v.parse().ok()),
            token: token.to_string(),
        })
    }
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// GET /reports - Analytics over the caller's complaint scope.
///
/// Managers see their department, admins see everything. Employees are
/// refused with `403 Forbidden`.
///
/// # Response
///
/// ```json
/// {
///     "generated_at": "2024-03-05T10:00:00Z",
///     "scope": "/Complaint/all",
///     "degraded": false,
///     "stats": {"total": 4, "pending": 2, "in_progress": 1, "resolved": 1, "returned": 0, "unrecognized": 0, "resolution_rate": 25},
///     "status_breakdown": [{"label": "Pending", "count": 2, "color": "#F97316"}],
///     "monthly_trend": [{"name": "Mar 24", "received": 4, "resolved": 1}],
///     "department_efficiency": [{"name": "HR", "pending": 2, "in_progress": 1, "resolved": 1}],
///     "weekly_intensity": [{"day": "Sun", "count": 0, "scale_max": 3}],
///     "leaderboard": [{"name": "Asha", "complaints": 3}]
/// }
/// ```
///
/// A backend failure still answers `200 OK`, with empty views and `"degraded": true`.
#[instrument(skip_all, fields(role = ?session.role))]
pub async fn get_report(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<ReportResponse>, StatusCode> {
    if !session.can_view_reports() {
        warn!(user_id = %session.user_id, "Reports requested without manager or admin role");
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(Json(state.dashboard.report_for(&session).await))
}

/// GET /notifications - Active notifications, most recent first.
pub async fn list_notifications(State(state): State<AppState>) -> Json<Vec<Notification>> {
    Json(state.notifications.active())
}

/// DELETE /notifications/:id - Dismiss a notification.
///
/// Always `204 No Content`, whether or not the notification was still active.
#[instrument(skip(state))]
pub async fn dismiss_notification(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> StatusCode {
    let removed = state.notifications.remove(id);
    info!(id, removed, "Notification dismissed");
    StatusCode::NO_CONTENT
}

/// Response for GET /notifications/connection.
#[derive(Debug, Serialize)]
pub struct ConnectionStatusResponse {
    pub state: ConnectionState,
}

/// GET /notifications/connection - State of the hub subscription.
pub async fn get_connection_state(State(state): State<AppState>) -> Json<ConnectionStatusResponse> {
    let current = state
        .push_state
        .as_ref()
        .map_or(ConnectionState::Disconnected, |rx| *rx.borrow());
    Json(ConnectionStatusResponse { state: current })
}

/// GET /chat - The caller's chat transcript.
pub async fn get_chat(
    State(state): State<AppState>,
    session: Session,
) -> Json<ChatTranscriptResponse> {
    Json(ChatTranscriptResponse {
        transcript: state.chat.transcript(&session.user_id).await,
    })
}

/// POST /chat - Send a message to the assistant.
///
/// # Request Body
///
/// ```json
/// { "message": "How do I escalate a complaint?" }
/// ```
///
/// Returns `400 Bad Request` for a blank message. Remote failures are not
/// errors here: the reply is a fallback text instead.
#[instrument(skip_all)]
pub async fn post_chat(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReplyResponse>, StatusCode> {
    match state.chat.send(&session.user_id, &request.message).await {
        Some((reply, transcript)) => {
            info!(transcript_len = transcript.len(), "Chat message relayed");
            Ok(Json(ChatReplyResponse { reply, transcript }))
        }
        None => Err(StatusCode::BAD_REQUEST),
    }
}

/// DELETE /chat - End the caller's chat session and discard its transcript.
pub async fn end_chat(State(state): State<AppState>, session: Session) -> StatusCode {
    state.chat.end(&session.user_id).await;
    StatusCode::NO_CONTENT
}
