//! Transition handling for the `Verified` state.
//!
//! Terminal state. The subscription is complete and nothing the subscriber
//! sends changes it; every interaction except the help command gets the
//! already-subscribed reply.

use super::TransitionResult;
use crate::state_machine::effect::{Effect, LogLevel, ReplyContent};
use crate::state_machine::event::Event;
use crate::state_machine::state::SubscriberState;

pub(super) fn handle(state: SubscriberState, event: Event) -> TransitionResult {
    match (&state, event) {
        (SubscriberState::Verified { .. }, Event::HelpRequested) => TransitionResult::new(
            state.clone(),
            vec![Effect::SendReply {
                content: ReplyContent::Help,
            }],
        ),

        (
            SubscriberState::Verified { .. },
            Event::StartRequested
            | Event::ResendRequested { .. }
            | Event::PhoneSubmitted { .. }
            | Event::TextEntered { .. },
        ) => TransitionResult::new(
            state.clone(),
            vec![Effect::SendReply {
                content: ReplyContent::AlreadySubscribed,
            }],
        ),

        (
            SubscriberState::Verified { .. },
            Event::OtpIssued { .. } | Event::OtpDispatchSucceeded | Event::OtpDispatchFailed { .. },
        ) => TransitionResult::new(
            state.clone(),
            vec![Effect::Log {
                level: LogLevel::Info,
                message: "Ignoring stale issuance event in Verified state".to_string(),
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
