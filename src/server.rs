//! Webhook listener
//!
//! Receives JIRA webhook deliveries and feeds them to the sync handler.
//!
//! # Routes
//!
//! - `GET /health` - Liveness check
//! - `POST /webhooks/jira` - JIRA issue events (optional `?secret=` check)
//!
//! Events are processed one at a time; concurrent deliveries wait on the
//! handler lock. The payload only names the event and the issue: the issue
//! itself is re-read under the lock, so each event sees the fields written
//! while handling the one before it. Once the issue is read the response is
//! 200 whatever the sync outcome, which is reported in the JSON body.

use crate::config::{FieldNames, ServerSettings};
use crate::host::{FieldCatalog, IssueSource, WebhookPayload};
use crate::model::EventKind;
use crate::sync::IssueSyncHandler;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// Server error types
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bind error: {0}")]
    Bind(String),
}

/// Shared state for request handlers
struct AppState {
    handler: Mutex<IssueSyncHandler>,
    issues: Arc<dyn IssueSource>,
    catalog: FieldCatalog,
    field_names: FieldNames,
    secret: Option<String>,
    max_body_size: usize,
    started_at: DateTime<Utc>,
}

/// JIRA webhook listener
pub struct WebhookServer {
    state: Arc<AppState>,
}

impl WebhookServer {
    pub fn new(
        handler: IssueSyncHandler,
        issues: Arc<dyn IssueSource>,
        catalog: FieldCatalog,
        field_names: FieldNames,
        settings: &ServerSettings,
    ) -> Self {
        Self {
            state: Arc::new(AppState {
                handler: Mutex::new(handler),
                issues,
                catalog,
                field_names,
                secret: settings.resolve_secret(),
                max_body_size: settings.max_body_size,
                started_at: Utc::now(),
            }),
        }
    }

    fn router(state: Arc<AppState>) -> Router {
        let max_body_size = state.max_body_size;

        Router::new()
            .route("/health", get(health))
            .route("/webhooks/jira", post(jira_webhook))
            .layer(axum::extract::DefaultBodyLimit::max(max_body_size))
            .with_state(state)
    }

    /// Run the server on the given address
    pub async fn run(self, addr: &str) -> Result<(), ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(format!("{}: {}", addr, e)))?;

        tracing::info!(
            addr = addr,
            secret = self.state.secret.is_some(),
            max_body_size = self.state.max_body_size,
            "Webhook listener started"
        );

        axum::serve(listener, Self::router(self.state))
            .await
            .map_err(ServerError::Io)
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct WebhookQuery {
    #[serde(default)]
    secret: Option<String>,
}

/// Result of a webhook delivery
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    /// "processed" or "ignored"
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<EventKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    /// Sync outcome, or why the delivery was ignored
    pub detail: String,
}

impl WebhookResponse {
    fn ignored(detail: &str) -> Self {
        Self {
            status: "ignored".to_string(),
            event: None,
            issue: None,
            detail: detail.to_string(),
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    started_at: DateTime<Utc>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        started_at: state.started_at,
    })
}

async fn jira_webhook(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WebhookQuery>,
    Json(payload): Json<WebhookPayload>,
) -> Result<Json<WebhookResponse>, (StatusCode, Json<ErrorResponse>)> {
    if let Some(ref expected) = state.secret {
        if query.secret.as_deref() != Some(expected.as_str()) {
            tracing::warn!(event = %payload.webhook_event, "Webhook rejected: bad secret");
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "invalid webhook secret".to_string(),
                }),
            ));
        }
    }

    let Some(kind) = payload.event_kind() else {
        tracing::debug!(event = %payload.webhook_event, "Ignoring webhook event");
        return Ok(Json(WebhookResponse::ignored("unsupported webhook event")));
    };

    let Some(ref issue) = payload.issue else {
        return Ok(Json(WebhookResponse::ignored("payload carries no issue")));
    };

    if kind != EventKind::Created
        && payload.only_touches_managed_fields(&state.field_names, &state.catalog)
    {
        tracing::debug!(issue = %issue.key, "Ignoring update of managed fields");
        return Ok(Json(WebhookResponse::ignored("only managed fields changed")));
    }

    let (snapshot, outcome) = {
        let handler = state.handler.lock().await;
        let snapshot = match state.issues.fetch_snapshot(&issue.key).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(issue = %issue.key, error = %e, "Failed to read issue");
                return Err((
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ErrorResponse {
                        error: format!("could not read issue {}: {}", issue.key, e),
                    }),
                ));
            }
        };
        let outcome = handler.handle(kind, &snapshot).await;
        (snapshot, outcome)
    };

    tracing::info!(issue = %snapshot.key, event = %kind, outcome = %outcome, "Webhook processed");

    Ok(Json(WebhookResponse {
        status: "processed".to_string(),
        event: Some(kind),
        issue: Some(snapshot.key),
        detail: outcome.to_string(),
    }))
}
