//! Events that trigger state transitions.
//!
//! Events represent things that happened - a classified inbound message, a
//! code generated by the interpreter, an SMS dispatch outcome. They are
//! inputs to the pure transition function.

use chrono::{DateTime, Utc};

use super::state::OtpCode;

/// All events that can trigger state transitions.
///
/// Inbound-message events carry the receipt time `now` when a transition
/// needs the clock (cooldown and expiry checks); the machine never reads the
/// system clock itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // =========================================================================
    // Inbound Message Events
    // =========================================================================
    /// `/start` (greeting) received.
    StartRequested,

    /// `/resend` or the resend keyboard label received.
    ResendRequested { now: DateTime<Utc> },

    /// `/help` or the help keyboard label received.
    HelpRequested,

    /// A contact share arrived. The phone is raw transport input; the
    /// transition validates it like any typed number.
    PhoneSubmitted { phone: String, now: DateTime<Utc> },

    /// Free text that is not a recognized command. Depending on state this is
    /// a phone-number attempt or a code-entry attempt. Messages with no text
    /// at all (stickers, photos) arrive here as an empty string.
    TextEntered { text: String, now: DateTime<Utc> },

    // =========================================================================
    // Code Issuance Results
    // =========================================================================
    /// The interpreter generated a fresh code for this subscriber.
    OtpIssued {
        code: OtpCode,
        issued_at: DateTime<Utc>,
    },

    // =========================================================================
    // Dispatch Results
    // =========================================================================
    /// The SMS gateway accepted the code for delivery.
    OtpDispatchSucceeded,

    /// Delivery failed after all retry attempts were exhausted.
    OtpDispatchFailed { error: String },
}

impl Event {
    /// A log-safe one-line description of the event.
    ///
    /// Never includes codes, phone numbers, or message text - only shapes and
    /// timestamps.
    pub fn log_summary(&self) -> String {
        match self {
            Event::StartRequested => "StartRequested".to_string(),
            Event::ResendRequested { now } => {
                format!("ResendRequested {{ at: {} }}", now.to_rfc3339())
            }
            Event::HelpRequested => "HelpRequested".to_string(),
            Event::PhoneSubmitted { phone, .. } => {
                format!("PhoneSubmitted {{ digits: {} }}", phone.trim().len())
            }
            Event::TextEntered { text, .. } => {
                format!("TextEntered {{ len: {} }}", text.len())
            }
            Event::OtpIssued { issued_at, .. } => {
                format!("OtpIssued {{ at: {} }}", issued_at.to_rfc3339())
            }
            Event::OtpDispatchSucceeded => "OtpDispatchSucceeded".to_string(),
            Event::OtpDispatchFailed { error } => {
                format!("OtpDispatchFailed {{ error: {} }}", error)
            }
        }
    }
}
