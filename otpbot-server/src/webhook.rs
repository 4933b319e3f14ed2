use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{Json, Response},
    routing::post,
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::state_machine::interpreter::InterpreterContext;
use crate::state_machine::repository::{RepositoryError, UpdateClaimResult};
use crate::state_machine::state::ChatId;
use crate::state_machine::store::inbound_message_event;
use crate::AppState;

// Correlation ID type for tracing a webhook through outbound calls
#[derive(Clone, Debug)]
pub struct CorrelationId(pub String);

// Header name for correlation ID propagation
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Completed update claims older than this are purged by the background sweep.
const CLAIM_RETENTION_SECONDS: i64 = 24 * 60 * 60;

/// Interval between sweeps of the update claim table.
const CLAIM_CLEANUP_INTERVAL_SECONDS: u64 = 60 * 60;

#[derive(Debug, Deserialize, Clone)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub my_chat_member: Option<ChatMemberUpdated>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub contact: Option<Contact>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Contact {
    pub phone_number: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatMemberUpdated {
    pub chat: Chat,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub message: String,
}

fn verify_telegram_secret(expected: &str, provided: &str) -> bool {
    // Constant-time comparison so the secret cannot be probed byte by byte
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

async fn verify_webhook_secret(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let correlation_id = CorrelationId(Uuid::new_v4().to_string());

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let provided = parts
        .headers
        .get("X-Telegram-Bot-Api-Secret-Token")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !verify_telegram_secret(&state.webhook_secret, provided) {
        error!("Invalid webhook secret token");
        return Err(StatusCode::UNAUTHORIZED);
    }

    // Add correlation_id to request extensions for use in handlers and HTTP clients
    let mut new_request = Request::from_parts(parts, axum::body::Body::from(bytes));
    new_request.extensions_mut().insert(correlation_id);

    Ok(next.run(new_request).await)
}

pub async fn telegram_webhook_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<WebhookResponse>, StatusCode> {
    info!("Received webhook payload");

    // Extract correlation ID from request extensions for propagation
    let correlation_id = request
        .extensions()
        .get::<CorrelationId>()
        .map(|id| id.0.clone());

    let (_parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let update: Update = serde_json::from_slice(&bytes).map_err(|_| StatusCode::BAD_REQUEST)?;

    let message = process_update(&state, &update, correlation_id).await?;

    Ok(Json(WebhookResponse {
        message: message.to_string(),
    }))
}

/// Claim the update id, process the update, then settle the claim.
///
/// Telegram redelivers an update until it sees a 2xx, so the claim guards
/// against double-processing: a duplicate delivery is acknowledged without
/// running the state machine again. A claim is completed only after
/// processing succeeded; on failure it is released so the redelivery can
/// retry.
async fn process_update(
    state: &AppState,
    update: &Update,
    correlation_id: Option<String>,
) -> Result<&'static str, StatusCode> {
    let update_id = update.update_id;

    match state.repository.try_claim_update_id(update_id).await {
        Ok(UpdateClaimResult::Claimed) => {}
        Ok(UpdateClaimResult::InProgress) => {
            info!("Update {} is already being processed, skipping", update_id);
            return Ok("Update already in progress");
        }
        Ok(UpdateClaimResult::Completed) => {
            info!("Update {} was already processed, skipping", update_id);
            return Ok("Update already processed");
        }
        Err(e) => {
            error!("Failed to claim update {}: {}", update_id, e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    match handle_claimed_update(state, update, correlation_id).await {
        Ok(message) => {
            if let Err(e) = state.repository.complete_update_claim(update_id).await {
                warn!("Failed to mark update {} completed: {}", update_id, e);
            }
            Ok(message)
        }
        Err(e) => {
            error!("Failed to process update {}: {}", update_id, e);
            if let Err(release_err) = state.repository.release_update_claim(update_id).await {
                warn!(
                    "Failed to release claim for update {}: {}",
                    update_id, release_err
                );
            }
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn handle_claimed_update(
    state: &AppState,
    update: &Update,
    correlation_id: Option<String>,
) -> Result<&'static str, RepositoryError> {
    if let Some(member_update) = &update.my_chat_member {
        info!(
            "Ignoring chat member update for chat {}",
            member_update.chat.id
        );
        return Ok("Chat member update ignored");
    }

    let message = match &update.message {
        Some(message) => message,
        None => {
            info!("Ignoring update {} without a message", update.update_id);
            return Ok("Update ignored");
        }
    };

    let chat_id = ChatId(message.chat.id);
    let event = inbound_message_event(
        message.text.as_deref(),
        message.contact.as_ref().map(|c| c.phone_number.as_str()),
        Utc::now(),
    );

    let ctx = InterpreterContext {
        notifier: state.notifier.clone(),
        dispatcher: state.dispatcher.clone(),
        chat_id,
        correlation_id,
    };

    state.state_store.process_event(chat_id, event, &ctx).await?;

    Ok("Update processed")
}

/// Periodically purge old completed update claims so the table stays small.
pub async fn claim_cleanup_loop(state: Arc<AppState>) {
    let mut interval = interval(Duration::from_secs(CLAIM_CLEANUP_INTERVAL_SECONDS));

    loop {
        interval.tick().await;

        match state
            .repository
            .cleanup_expired_update_claims(CLAIM_RETENTION_SECONDS)
            .await
        {
            Ok(0) => {}
            Ok(removed) => info!("Cleaned up {} old update claim(s)", removed),
            Err(e) => warn!("Update claim cleanup failed: {}", e),
        }
    }
}

pub fn webhook_router(middleware_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/bot/webhook", post(telegram_webhook_handler))
        .route_layer(middleware::from_fn_with_state(
            middleware_state,
            verify_webhook_secret,
        ))
}
