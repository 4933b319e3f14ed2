//! State store: coordinates transitions, persistence, and effect execution.
//!
//! The store owns the event loop around the pure transition function. For
//! each event it runs the transition, persists any state change, executes
//! the resulting effects, and feeds the interpreter's result events back in
//! until the queue drains. Processing is serialized per chat so two updates
//! for the same subscriber can never interleave.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use super::event::Event;
use super::interpreter::{execute_effects, InterpreterContext};
use super::policy::OtpPolicy;
use super::repository::{RepositoryError, SubscriberRepository};
use super::state::{ChatId, SubscriberState};
use super::transition::{transition, TransitionResult};
use crate::command::{parse_command, Command};

/// Coordinates the state machine for all chats.
pub struct StateStore {
    repository: Arc<dyn SubscriberRepository>,
    policy: OtpPolicy,
    /// One async mutex per chat, created on first contact. The outer std
    /// mutex is only held to look up or insert the entry, never across an
    /// await point.
    chat_locks: std::sync::Mutex<HashMap<ChatId, Arc<tokio::sync::Mutex<()>>>>,
}

impl StateStore {
    pub fn with_repository(repository: Arc<dyn SubscriberRepository>, policy: OtpPolicy) -> Self {
        Self {
            repository,
            policy,
            chat_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn chat_lock(&self, chat_id: ChatId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.chat_locks.lock().unwrap();
        locks.entry(chat_id).or_default().clone()
    }

    /// Process an event for a chat: transition the state and execute effects.
    ///
    /// This is the main entry point for handling events. It:
    /// 1. Serializes processing with the chat's lock
    /// 2. Loads (or creates) the current state
    /// 3. Runs the transition function
    /// 4. Persists the new state before executing that transition's effects
    /// 5. Handles result events until the queue drains
    ///
    /// Returns the final state after all transitions.
    pub async fn process_event(
        &self,
        chat_id: ChatId,
        event: Event,
        ctx: &InterpreterContext,
    ) -> Result<SubscriberState, RepositoryError> {
        let lock = self.chat_lock(chat_id);
        let _guard = lock.lock().await;

        let mut current_state = self.repository.find_or_create(chat_id).await?;

        // Event loop: process initial event and any result events from effects
        let mut events_to_process = vec![event];

        while let Some(event) = events_to_process.pop() {
            info!(
                "Processing event {} for chat {} in state {}",
                event.log_summary(),
                chat_id,
                current_state.variant_name()
            );

            let TransitionResult { state, effects } =
                transition(current_state.clone(), event, &self.policy);

            // The new state must be durable before any of its effects run: a
            // code that was dispatched but never recorded could otherwise
            // not be verified after a crash.
            if state != current_state {
                self.repository.update(chat_id, &state).await?;
            }
            current_state = state;

            if !effects.is_empty() {
                info!(
                    "Executing {} effect(s) for chat {}",
                    effects.len(),
                    chat_id
                );

                // Execute effects and collect result events
                let result_events = execute_effects(ctx, effects).await;

                // Add result events to be processed (in reverse order so they're processed in order)
                for result_event in result_events.into_iter().rev() {
                    events_to_process.push(result_event);
                }
            }
        }

        info!(
            "Final state for chat {}: {}",
            chat_id,
            current_state.variant_name()
        );

        Ok(current_state)
    }
}

// =============================================================================
// Webhook-to-Event Conversion Helpers
// =============================================================================

/// Convert an inbound Telegram message to the event it means for the state
/// machine.
///
/// A contact share always wins over message text. Otherwise commands are
/// recognized first (slash commands and the keyboard button labels), and any
/// remaining text is handed over verbatim for the current state to interpret
/// as a phone number or code attempt. Messages without text (stickers,
/// photos) become an empty text entry, which no state accepts.
pub fn inbound_message_event(
    text: Option<&str>,
    contact_phone: Option<&str>,
    now: DateTime<Utc>,
) -> Event {
    if let Some(phone) = contact_phone {
        return Event::PhoneSubmitted {
            phone: phone.to_string(),
            now,
        };
    }

    let text = text.unwrap_or("").trim();
    match parse_command(text) {
        Some(Command::Start) => Event::StartRequested,
        Some(Command::Resend) => Event::ResendRequested { now },
        Some(Command::Help) => Event::HelpRequested,
        None => Event::TextEntered {
            text: text.to_string(),
            now,
        },
    }
}
