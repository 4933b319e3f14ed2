//! Repository abstraction for state machine persistence.
//!
//! This module defines the `SubscriberRepository` trait that abstracts
//! storage operations for per-chat subscriber states and for webhook
//! update-id claims. Implementations can provide different backends
//! (in-memory, SQLite, etc.).

mod memory;
mod sqlite;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use async_trait::async_trait;

use super::state::{ChatId, SubscriberState};

/// Errors from repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The storage backend failed.
    #[error("storage error during {operation}: {detail}")]
    Storage { operation: String, detail: String },

    /// Stored data could not be decoded.
    #[error("corrupt stored data: {what}")]
    Corruption { what: String },
}

impl RepositoryError {
    pub fn storage(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        Self::Corruption { what: what.into() }
    }
}

/// Outcome of attempting to claim a webhook update id for processing.
///
/// Telegram redelivers an update until it gets a 2xx response, so the same
/// update id can arrive more than once. Claims make processing idempotent:
/// exactly one request wins the claim and runs the state machine, the rest
/// observe the claim and skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateClaimResult {
    /// This caller claimed the update and should process it.
    Claimed,
    /// Another request is currently processing this update.
    InProgress,
    /// This update was already fully processed.
    Completed,
}

/// Repository trait for persisting subscriber states.
///
/// Implementations of this trait provide the actual storage backend.
/// The `StateStore` uses this trait to abstract away storage details,
/// so the state machine coordination logic is independent of the backend.
#[async_trait]
pub trait SubscriberRepository: Send + Sync {
    /// Load the state for a chat, creating a `New` record if none exists.
    async fn find_or_create(&self, chat_id: ChatId) -> Result<SubscriberState, RepositoryError>;

    /// Store the state for a chat (upsert semantics).
    async fn update(
        &self,
        chat_id: ChatId,
        state: &SubscriberState,
    ) -> Result<(), RepositoryError>;

    /// Atomically try to claim an update id for processing.
    async fn try_claim_update_id(
        &self,
        update_id: i64,
    ) -> Result<UpdateClaimResult, RepositoryError>;

    /// Mark a claimed update id as successfully processed.
    async fn complete_update_claim(&self, update_id: i64) -> Result<(), RepositoryError>;

    /// Release a claimed update id so a redelivery can retry it.
    async fn release_update_claim(&self, update_id: i64) -> Result<(), RepositoryError>;

    /// Delete completed claims older than `ttl_seconds`.
    ///
    /// In-progress claims are never cleaned up here; the handler that holds
    /// them releases on failure, and stale ones are reclaimed on the next
    /// delivery of the same update.
    async fn cleanup_expired_update_claims(
        &self,
        ttl_seconds: i64,
    ) -> Result<usize, RepositoryError>;
}
