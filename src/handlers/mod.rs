use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::machine::Bot;
use crate::whatsapp::parse_webhook;

#[derive(Clone)]
pub struct AppState {
    pub bot: Arc<Bot>,
    pub verify_token: String,
    pub environment: String,
}

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    timestamp: String,
    environment: String,
}

pub async fn health_check(State(state): State<AppState>) -> Response {
    let payload = HealthPayload {
        status: "ok",
        timestamp: Utc::now().to_rfc3339(),
        environment: state.environment.clone(),
    };
    (StatusCode::OK, Json(payload)).into_response()
}

/// Meta's subscription handshake: echo `hub.challenge` back when the
/// verify token matches, 403 otherwise.
pub async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map(String::as_str);
    let challenge = params.get("hub.challenge");

    match (mode, token, challenge) {
        (Some("subscribe"), Some(token), Some(challenge))
            if token == state.verify_token =>
        {
            tracing::info!("webhook verified");
            (StatusCode::OK, challenge.clone()).into_response()
        }
        _ => {
            tracing::warn!("webhook verification rejected");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// Inbound message delivery. Always 200: Meta retries non-2xx
/// responses, and redelivering a message we already handled would
/// double every reply. Status-update payloads parse to nothing and
/// are acknowledged without dispatch.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    if let Some(message) = parse_webhook(&payload) {
        state.bot.handle(message).await;
    }
    StatusCode::OK.into_response()
}
