//! Update-id claim operations for the SQLite repository.
//!
//! This module implements idempotent webhook processing with claim semantics:
//! - First request claims the update id and processes it
//! - Concurrent requests see InProgress and back off without reprocessing
//! - After completion, requests see Completed and ack without reprocessing
//!
//! Stale claims can be reclaimed so a crashed handler does not block an
//! update id forever.

use rusqlite::{params, Connection};

use super::super::{RepositoryError, UpdateClaimResult};
use super::{now_secs, SqliteRepository};

/// TTL for stale InProgress claims.
///
/// A claim still InProgress after this long belongs to a handler that crashed
/// or panicked; the next redelivery of the same update may reclaim it. Normal
/// processing completes in seconds, so ten minutes leaves a wide margin.
pub(super) const STALE_IN_PROGRESS_TTL_SECONDS: i64 = 10 * 60;

/// Atomically try to claim an update id for processing.
pub(super) fn try_claim_update_id_sync(
    conn: &Connection,
    update_id: i64,
    now: i64,
    stale_cutoff: i64,
) -> Result<UpdateClaimResult, String> {
    // Use atomic INSERT OR IGNORE to avoid the read-then-insert race
    // condition. If two requests both see "missing" and try to insert, the
    // loser's insert is silently ignored (no error), and we detect this via
    // changes() == 0.
    conn.execute(
        "INSERT OR IGNORE INTO seen_update_ids (update_id, recorded_at, claim_state)
         VALUES (?1, ?2, 0)",
        params![update_id, now],
    )
    .map_err(|e| e.to_string())?;

    if conn.changes() > 0 {
        // Insert succeeded - we claimed it
        return Ok(UpdateClaimResult::Claimed);
    }

    // Insert was ignored (row already exists) - check the existing state
    let (existing_state, recorded_at): (i64, i64) = conn
        .query_row(
            "SELECT claim_state, recorded_at FROM seen_update_ids WHERE update_id = ?1",
            params![update_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(|e| e.to_string())?;

    match existing_state {
        0 => {
            // InProgress - check if stale (abandoned due to crash/panic)
            if recorded_at <= stale_cutoff {
                // Atomically reclaim only if still stale. The conditional
                // UPDATE guards against a TOCTOU race where two requests both
                // see the entry as stale and both claim it.
                conn.execute(
                    "UPDATE seen_update_ids SET recorded_at = ?1 \
                     WHERE update_id = ?2 AND claim_state = 0 AND recorded_at <= ?3",
                    params![now, update_id, stale_cutoff],
                )
                .map_err(|e| e.to_string())?;

                if conn.changes() > 0 {
                    Ok(UpdateClaimResult::Claimed)
                } else {
                    // Another request won the race
                    Ok(UpdateClaimResult::InProgress)
                }
            } else {
                Ok(UpdateClaimResult::InProgress)
            }
        }
        _ => Ok(UpdateClaimResult::Completed),
    }
}

/// Mark a claimed update id as successfully processed.
pub(super) fn complete_update_claim_sync(
    conn: &Connection,
    update_id: i64,
) -> Result<(), String> {
    // Update claim_state to 1 (completed)
    conn.execute(
        "UPDATE seen_update_ids SET claim_state = 1 WHERE update_id = ?1",
        params![update_id],
    )
    .map_err(|e| e.to_string())?;
    Ok(())
}

/// Release a claimed update id to allow retries.
pub(super) fn release_update_claim_sync(
    conn: &Connection,
    update_id: i64,
) -> Result<(), String> {
    conn.execute(
        "DELETE FROM seen_update_ids WHERE update_id = ?1",
        params![update_id],
    )
    .map_err(|e| e.to_string())?;
    Ok(())
}

/// Clean up expired update ids.
pub(super) fn cleanup_expired_update_claims_sync(
    conn: &Connection,
    cutoff: i64,
) -> Result<usize, String> {
    // Only delete completed claims (claim_state=1), not in-progress claims
    // (claim_state=0). A long-running handler could otherwise be cleaned up
    // and re-claimed, causing duplicate processing if a redelivery lands
    // late. In-progress claims are released by the handler on failure or
    // reclaimed via the stale TTL.
    conn.execute(
        "DELETE FROM seen_update_ids WHERE recorded_at <= ?1 AND claim_state = 1",
        params![cutoff],
    )
    .map_err(|e| e.to_string())
}

// =============================================================================
// Async wrappers
// =============================================================================

impl SqliteRepository {
    pub(super) async fn try_claim_update_id_impl(
        &self,
        update_id: i64,
    ) -> Result<UpdateClaimResult, RepositoryError> {
        let conn = self.conn.clone();
        let now = now_secs();
        let stale_cutoff = now - STALE_IN_PROGRESS_TTL_SECONDS;

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            try_claim_update_id_sync(&conn, update_id, now, stale_cutoff)
                .map_err(|e| RepositoryError::storage("try_claim_update_id", e))
        })
        .await
        .map_err(|e| RepositoryError::storage("try_claim_update_id", e.to_string()))?
    }

    pub(super) async fn complete_update_claim_impl(
        &self,
        update_id: i64,
    ) -> Result<(), RepositoryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            complete_update_claim_sync(&conn, update_id)
                .map_err(|e| RepositoryError::storage("complete_update_claim", e))
        })
        .await
        .map_err(|e| RepositoryError::storage("complete_update_claim", e.to_string()))?
    }

    pub(super) async fn release_update_claim_impl(
        &self,
        update_id: i64,
    ) -> Result<(), RepositoryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            release_update_claim_sync(&conn, update_id)
                .map_err(|e| RepositoryError::storage("release_update_claim", e))
        })
        .await
        .map_err(|e| RepositoryError::storage("release_update_claim", e.to_string()))?
    }

    pub(super) async fn cleanup_expired_update_claims_impl(
        &self,
        ttl_seconds: i64,
    ) -> Result<usize, RepositoryError> {
        let conn = self.conn.clone();
        let cutoff = now_secs() - ttl_seconds;

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            cleanup_expired_update_claims_sync(&conn, cutoff)
                .map_err(|e| RepositoryError::storage("cleanup_expired_update_claims", e))
        })
        .await
        .map_err(|e| RepositoryError::storage("cleanup_expired_update_claims", e.to_string()))?
    }
}
