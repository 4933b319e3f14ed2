//! Issuance policy for the verification machine.
//!
//! The policy is built once from configuration at startup and injected into
//! the store; transitions never read configuration themselves.

use chrono::Duration;

/// Default minimum interval between successive code issuances, in seconds.
pub const DEFAULT_COOLDOWN_SECONDS: i64 = 300;

/// How long an issued code stays valid. Fixed, not configurable.
const CODE_TTL_MINUTES: i64 = 5;

/// Timing rules applied when issuing codes.
#[derive(Debug, Clone)]
pub struct OtpPolicy {
    /// Minimum interval between successive issuances to one subscriber.
    pub cooldown: Duration,
    /// Validity window of an issued code, measured from issuance.
    pub code_ttl: Duration,
}

impl OtpPolicy {
    pub fn with_cooldown_seconds(seconds: i64) -> Self {
        Self {
            cooldown: Duration::seconds(seconds),
            code_ttl: Duration::minutes(CODE_TTL_MINUTES),
        }
    }
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self::with_cooldown_seconds(DEFAULT_COOLDOWN_SECONDS)
    }
}
