//! Webhook ingress.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/webhook` | GitHub `pull_request` deliveries |
//! | `GET`  | `/health` | Liveness check |
//!
//! Deliveries must carry a valid `X-Hub-Signature-256`. Pull requests are
//! reviewed only for the configured actions and, when a review label is
//! configured, only while they carry that label. Accepted deliveries get a
//! `202` straight away; the review runs on its own task so a sender that
//! hangs up cannot cancel it, and its outcome goes to the log.

use crate::config::ServerConfig;
use crate::core::Reviewer;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct AppState {
    pub reviewer: Arc<Reviewer>,
    pub server: Arc<ServerConfig>,
    pub webhook_secret: Option<Arc<str>>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct StatusBody {
    status: &'static str,
    message: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestEvent {
    action: String,
    pull_request: PullRequestInfo,
    repository: RepositoryInfo,
}

#[derive(Debug, Deserialize)]
struct PullRequestInfo {
    number: u64,
    #[serde(default)]
    labels: Vec<LabelInfo>,
}

#[derive(Debug, Deserialize)]
struct LabelInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryInfo {
    full_name: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/health", get(handle_health))
        .with_state(state)
}

pub async fn run_server(state: AppState) -> Result<()> {
    let bind_addr = state.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!(addr = %bind_addr, "Webhook server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let signature = header(&headers, "x-hub-signature-256");
    let verified = match state.webhook_secret.as_deref() {
        Some(secret) => verify_signature(&body, secret, signature),
        None => {
            tracing::error!("Webhook secret is not configured, rejecting delivery");
            false
        }
    };
    if !verified {
        tracing::warn!("Webhook signature verification failed");
        return reply(StatusCode::FORBIDDEN, "error", "Invalid event type or signature");
    }

    let event = header(&headers, "x-github-event");
    if event != "pull_request" {
        tracing::debug!(event, "Ignoring webhook event");
        return ignored();
    }

    let payload: PullRequestEvent = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed pull_request payload");
            return reply(StatusCode::BAD_REQUEST, "error", "Invalid payload");
        }
    };

    if !state.server.actions.iter().any(|a| a == &payload.action) {
        tracing::debug!(action = %payload.action, "Ignoring pull_request action");
        return ignored();
    }

    if let Some(label) = &state.server.review_label {
        if !payload.pull_request.labels.iter().any(|l| &l.name == label) {
            tracing::info!(
                repo = %payload.repository.full_name,
                pr = payload.pull_request.number,
                label = %label,
                "Pull request is not labelled for review"
            );
            return reply(
                StatusCode::OK,
                "skipped",
                format!("Pull request does not have the label \"{}\".", label),
            );
        }
    }

    let repo = payload.repository.full_name;
    let number = payload.pull_request.number;
    tracing::info!(repo = %repo, pr = number, action = %payload.action, "Received pull request event");

    let reviewer = state.reviewer.clone();
    let message = format!("Review started for {}#{}", repo, number);
    tokio::spawn(async move {
        let outcome = reviewer.review_pull_request(&repo, number).await;
        if outcome.is_success() {
            tracing::info!(repo = %repo, pr = number, message = %outcome.message, "Webhook review finished");
        } else {
            tracing::error!(repo = %repo, pr = number, message = %outcome.message, "Webhook review failed");
        }
    });

    reply(StatusCode::ACCEPTED, "accepted", message)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

fn ignored() -> Response {
    reply(StatusCode::OK, "ignored", "Event not processed")
}

fn reply(code: StatusCode, status: &'static str, message: impl Into<String>) -> Response {
    (
        code,
        Json(StatusBody {
            status,
            message: message.into(),
        }),
    )
        .into_response()
}

/// Checks a `sha256=<hex>` header against the HMAC-SHA256 of the raw body.
pub fn verify_signature(body: &[u8], secret: &str, signature_header: &str) -> bool {
    let Some(signature_hex) = signature_header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
