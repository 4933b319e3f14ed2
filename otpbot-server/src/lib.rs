pub mod command;
pub mod config;
pub mod sms;
pub mod state_machine;
pub mod telegram;
pub mod webhook;

use std::sync::Arc;

use state_machine::interpreter::{Notifier, OtpDispatcher};
use state_machine::repository::SubscriberRepository;
use state_machine::store::StateStore;

pub use webhook::CorrelationId;

pub struct AppState {
    pub notifier: Arc<dyn Notifier>,
    pub dispatcher: Arc<dyn OtpDispatcher>,
    pub webhook_secret: String,
    pub state_store: Arc<StateStore>,
    pub repository: Arc<dyn SubscriberRepository>,
}
