//! Transition handling for the `New` state.
//!
//! No phone number is recorded for the chat yet. Everything the subscriber
//! sends is treated as an attempt to hand us one: contact shares and typed
//! text both go through phone validation, and anything that does not
//! validate gets the format prompt.

use super::{begin_issuance, TransitionResult};
use crate::state_machine::effect::{Effect, LogLevel, ReplyContent};
use crate::state_machine::event::Event;
use crate::state_machine::policy::OtpPolicy;
use crate::state_machine::state::{PhoneNumber, SubscriberState};

pub(super) fn handle(
    state: SubscriberState,
    event: Event,
    policy: &OtpPolicy,
) -> TransitionResult {
    match (&state, event) {
        (SubscriberState::New, Event::StartRequested) => TransitionResult::new(
            state.clone(),
            vec![Effect::SendReply {
                content: ReplyContent::Welcome,
            }],
        ),

        (SubscriberState::New, Event::HelpRequested) => TransitionResult::new(
            state.clone(),
            vec![Effect::SendReply {
                content: ReplyContent::Help,
            }],
        ),

        // Nothing to resend without a phone on file; ask for one.
        (SubscriberState::New, Event::ResendRequested { .. }) => TransitionResult::new(
            state.clone(),
            vec![Effect::SendReply {
                content: ReplyContent::InvalidPhone,
            }],
        ),

        (SubscriberState::New, Event::PhoneSubmitted { phone, now }) => {
            match PhoneNumber::parse(&phone) {
                Some(parsed) => begin_issuance(parsed, None, None, now, policy),
                None => TransitionResult::new(
                    state.clone(),
                    vec![Effect::SendReply {
                        content: ReplyContent::InvalidPhone,
                    }],
                ),
            }
        }

        (SubscriberState::New, Event::TextEntered { text, now }) => {
            match PhoneNumber::parse(&text) {
                Some(parsed) => begin_issuance(parsed, None, None, now, policy),
                None => TransitionResult::new(
                    state.clone(),
                    vec![Effect::SendReply {
                        content: ReplyContent::InvalidPhone,
                    }],
                ),
            }
        }

        (
            SubscriberState::New,
            Event::OtpIssued { .. } | Event::OtpDispatchSucceeded | Event::OtpDispatchFailed { .. },
        ) => TransitionResult::new(
            state.clone(),
            vec![Effect::Log {
                level: LogLevel::Info,
                message: "Ignoring stale issuance event in New state".to_string(),
            }],
        ),

        (_, event) => TransitionResult::new(
            state.clone(),
            vec![Effect::Log {
                level: LogLevel::Warn,
                message: format!(
                    "Unhandled event {} in state {}",
                    event.log_summary(),
                    state.variant_name()
                ),
            }],
        ),
    }
}
