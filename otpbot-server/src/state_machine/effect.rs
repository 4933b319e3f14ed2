//! Effects (side effects as data).
//!
//! Effects describe what should happen as a result of a state transition.
//! They are pure data - the interpreter executes them against the real
//! Telegram and SMS clients. This separation enables testing the transition
//! logic without mocking HTTP.

use serde::{Deserialize, Serialize};

use super::state::{OtpCode, PhoneNumber};

/// All effects that can be produced by state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    // =========================================================================
    // Reply Effects
    // =========================================================================
    /// Send one reply to the subscriber's chat. The interpreter renders the
    /// content to text (and keyboard, where applicable).
    SendReply { content: ReplyContent },

    // =========================================================================
    // OTP Effects
    // =========================================================================
    /// Generate a fresh 6-digit code. The interpreter draws the code and
    /// stamps the issuance time, then feeds both back as an `OtpIssued` event
    /// so the transition can record the challenge.
    GenerateOtp,

    /// Deliver the code to the subscriber's phone via the SMS gateway,
    /// retrying on transient failures.
    DispatchOtp { phone: PhoneNumber, code: OtpCode },

    // =========================================================================
    // Logging Effects
    // =========================================================================
    /// Log a message (for debugging/tracing).
    Log { level: LogLevel, message: String },
}

/// Every distinct reply the bot can send.
///
/// The user-visible wording lives in the interpreter's rendering function,
/// keeping the transition logic free of presentation text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyContent {
    /// `/start` greeting with the persistent reply keyboard.
    Welcome,
    /// Inbound text or contact was not an acceptable phone number.
    InvalidPhone,
    /// Subscriber is already verified.
    AlreadySubscribed,
    /// Correct code accepted; subscription complete.
    VerificationSuccess,
    /// Code entry did not match the outstanding challenge.
    IncorrectOtp,
    /// No outstanding challenge, or the challenge has expired.
    OtpExpiredOrMissing,
    /// A code was issued too recently to issue another.
    CooldownActive,
    /// Code dispatched; prompt the subscriber to enter it.
    OtpSent,
    /// The SMS gateway could not be reached after retries.
    DispatchFailed,
    /// Usage summary.
    Help,
}

/// Log levels for the Log effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}
