//! State types for the subscriber verification state machine.
//!
//! One subscriber record per chat, modeled as an explicit state enum so that
//! invalid combinations (a code without an expiry, a verified subscriber with
//! an outstanding challenge) cannot be represented at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Newtype for a Telegram chat id to prevent mixing with other integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Newtype for a subscriber phone number.
///
/// Use [`PhoneNumber::parse`] for inbound input; the `From` impls exist for
/// code paths (and tests) that already hold a validated value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhoneNumber(pub String);

impl PhoneNumber {
    /// Validate and normalize inbound text as a phone number.
    ///
    /// Accepts an optional leading `+` followed by 10-15 ASCII digits and
    /// nothing else, the same rule for typed text and contact payloads.
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if is_valid_phone(trimmed) {
            Some(Self(trimmed.to_string()))
        } else {
            None
        }
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PhoneNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PhoneNumber {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Returns true if `text` is an acceptable phone number: an optional leading
/// `+`, then 10-15 ASCII digits, nothing else.
pub fn is_valid_phone(text: &str) -> bool {
    let digits = text.strip_prefix('+').unwrap_or(text);
    (10..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Newtype for a one-time passcode.
///
/// Deliberately has no `Display` impl: codes must never end up in logs or
/// error messages by accident. Comparison is an exact string match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OtpCode(pub String);

impl From<String> for OtpCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OtpCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An outstanding OTP challenge: the code and its expiry, always together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpChallenge {
    pub code: OtpCode,
    pub expires_at: DateTime<Utc>,
}

impl OtpChallenge {
    /// A challenge is usable strictly before its expiry instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// The verification lifecycle of one subscriber.
///
/// `New` → `AwaitingOtp` → `Verified`, with `Verified` terminal for this
/// flow. The phone, once recorded, travels forward and is never overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriberState {
    /// No phone recorded yet.
    New,

    /// Phone recorded, verification not yet completed.
    AwaitingOtp {
        phone: PhoneNumber,
        /// The outstanding challenge, if one has been issued and not yet
        /// consumed. Code and expiry live together so they can never drift.
        #[serde(default)]
        challenge: Option<OtpChallenge>,
        /// When the most recent code was issued; drives the resend cooldown.
        #[serde(default)]
        last_sent_at: Option<DateTime<Utc>>,
    },

    /// Phone ownership proven (terminal).
    Verified { phone: PhoneNumber },
}

impl SubscriberState {
    /// Returns the recorded phone number, if any.
    pub fn phone(&self) -> Option<&PhoneNumber> {
        match self {
            Self::New => None,
            Self::AwaitingOtp { phone, .. } => Some(phone),
            Self::Verified { phone } => Some(phone),
        }
    }

    /// Returns the outstanding challenge, if any.
    pub fn challenge(&self) -> Option<&OtpChallenge> {
        match self {
            Self::AwaitingOtp { challenge, .. } => challenge.as_ref(),
            _ => None,
        }
    }

    /// Returns when the most recent code was issued, if ever.
    pub fn last_sent_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::AwaitingOtp { last_sent_at, .. } => *last_sent_at,
            _ => None,
        }
    }

    /// Returns true once the subscriber has completed verification.
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }

    /// The variant name, for logging. Full `Debug` output would include the
    /// phone number and any outstanding code, so logs use this instead.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::AwaitingOtp { .. } => "AwaitingOtp",
            Self::Verified { .. } => "Verified",
        }
    }
}

impl Default for SubscriberState {
    fn default() -> Self {
        Self::New
    }
}
