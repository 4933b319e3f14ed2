//! In-memory implementation of `SubscriberRepository`.
//!
//! All state is held in memory and lost on restart. Used in tests and as a
//! fallback when no database path is configured.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{RepositoryError, SubscriberRepository, UpdateClaimResult};
use crate::state_machine::state::{ChatId, SubscriberState};

/// State of an update-id claim for idempotent processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateClaimState {
    /// The update is currently being processed.
    InProgress,
    /// The update was successfully processed.
    Completed,
}

/// In-memory subscriber repository.
///
/// Stores subscriber states in a `HashMap` protected by a `RwLock`.
pub struct InMemoryRepository {
    subscribers: RwLock<HashMap<ChatId, SubscriberState>>,
    /// Update ids with their claim state and recording timestamp (unix
    /// seconds). Used to deduplicate Telegram redeliveries.
    update_claims: RwLock<HashMap<i64, (UpdateClaimState, i64)>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            update_claims: RwLock::new(HashMap::new()),
        }
    }

    /// Get current unix timestamp in seconds.
    fn now_secs() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubscriberRepository for InMemoryRepository {
    async fn find_or_create(&self, chat_id: ChatId) -> Result<SubscriberState, RepositoryError> {
        let mut subscribers = self.subscribers.write().await;
        Ok(subscribers.entry(chat_id).or_default().clone())
    }

    async fn update(
        &self,
        chat_id: ChatId,
        state: &SubscriberState,
    ) -> Result<(), RepositoryError> {
        let mut subscribers = self.subscribers.write().await;
        subscribers.insert(chat_id, state.clone());
        Ok(())
    }

    // =========================================================================
    // Update-id claims
    // =========================================================================

    async fn try_claim_update_id(
        &self,
        update_id: i64,
    ) -> Result<UpdateClaimResult, RepositoryError> {
        use std::collections::hash_map::Entry;

        let mut claims = self.update_claims.write().await;
        match claims.entry(update_id) {
            Entry::Occupied(entry) => match entry.get().0 {
                UpdateClaimState::InProgress => Ok(UpdateClaimResult::InProgress),
                UpdateClaimState::Completed => Ok(UpdateClaimResult::Completed),
            },
            Entry::Vacant(entry) => {
                entry.insert((UpdateClaimState::InProgress, Self::now_secs()));
                Ok(UpdateClaimResult::Claimed)
            }
        }
    }

    async fn complete_update_claim(&self, update_id: i64) -> Result<(), RepositoryError> {
        let mut claims = self.update_claims.write().await;
        if let Some(entry) = claims.get_mut(&update_id) {
            entry.0 = UpdateClaimState::Completed;
        }
        Ok(())
    }

    async fn release_update_claim(&self, update_id: i64) -> Result<(), RepositoryError> {
        let mut claims = self.update_claims.write().await;
        claims.remove(&update_id);
        Ok(())
    }

    async fn cleanup_expired_update_claims(
        &self,
        ttl_seconds: i64,
    ) -> Result<usize, RepositoryError> {
        let cutoff = Self::now_secs() - ttl_seconds;

        let mut claims = self.update_claims.write().await;
        let initial_len = claims.len();
        // Only completed claims expire; in-progress claims are released by
        // their handler on failure.
        claims.retain(|_, (state, timestamp)| {
            *state == UpdateClaimState::InProgress || *timestamp > cutoff
        });
        Ok(initial_len - claims.len())
    }
}
