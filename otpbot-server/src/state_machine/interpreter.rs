//! Effect interpreter that executes effects against real APIs.
//!
//! The interpreter is the boundary between the pure state machine and the
//! impure world of I/O. It takes effects (descriptions of what to do) and
//! executes them, returning result events.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tracing::{error, info, warn};

use super::effect::{Effect, LogLevel, ReplyContent};
use super::event::Event;
use super::state::{ChatId, OtpCode, PhoneNumber};
use crate::sms::DispatchError;
use crate::telegram::{KeyboardButton, NotifyError, ReplyMarkup};

/// Number of delivery attempts against the SMS gateway.
const DISPATCH_ATTEMPTS: u32 = 3;

/// Delay between delivery attempts.
const DISPATCH_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Outbound chat messages.
///
/// Implemented by the Telegram client; tests substitute a recording fake.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_markup: Option<&ReplyMarkup>,
    ) -> Result<(), NotifyError>;
}

/// Outbound OTP delivery.
///
/// Implemented by the SMS gateway client; tests substitute a fake.
#[async_trait]
pub trait OtpDispatcher: Send + Sync {
    async fn send_otp(
        &self,
        correlation_id: Option<&str>,
        phone: &PhoneNumber,
        code: &OtpCode,
    ) -> Result<(), DispatchError>;
}

/// Context needed by the interpreter to execute effects.
pub struct InterpreterContext {
    pub notifier: Arc<dyn Notifier>,
    pub dispatcher: Arc<dyn OtpDispatcher>,
    pub chat_id: ChatId,
    /// Correlation ID for request tracing.
    pub correlation_id: Option<String>,
}

/// Result of executing an effect.
#[derive(Debug)]
pub enum EffectResult {
    /// Effect completed, produced result events.
    Ok(Vec<Event>),
    /// Effect failed with an error.
    Err(String),
}

impl EffectResult {
    pub fn ok(events: Vec<Event>) -> Self {
        Self::Ok(events)
    }

    pub fn single(event: Event) -> Self {
        Self::Ok(vec![event])
    }

    pub fn none() -> Self {
        Self::Ok(vec![])
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self::Err(msg.into())
    }
}

/// Execute a list of effects and collect result events.
///
/// Effects are executed sequentially. If an effect fails, execution continues
/// with remaining effects, and the error is logged.
pub async fn execute_effects(ctx: &InterpreterContext, effects: Vec<Effect>) -> Vec<Event> {
    let mut result_events = Vec::new();

    for effect in effects {
        match execute_effect(ctx, effect).await {
            EffectResult::Ok(events) => result_events.extend(events),
            EffectResult::Err(err) => {
                error!("Effect execution failed: {}", err);
            }
        }
    }

    result_events
}

/// Execute a single effect.
async fn execute_effect(ctx: &InterpreterContext, effect: Effect) -> EffectResult {
    match effect {
        Effect::SendReply { content } => execute_send_reply(ctx, content).await,

        Effect::GenerateOtp => execute_generate_otp(),

        Effect::DispatchOtp { phone, code } => execute_dispatch_otp(ctx, &phone, &code).await,

        Effect::Log { level, message } => {
            match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => info!("{}", message),
                LogLevel::Warn => warn!("{}", message),
                LogLevel::Error => error!("{}", message),
            }
            EffectResult::none()
        }
    }
}

/// Draw a fresh six-digit code.
///
/// The code itself must never reach the logs; only the issuance instant is
/// observable there via the resulting event's summary.
fn execute_generate_otp() -> EffectResult {
    let code = rand::thread_rng().gen_range(100_000..=999_999);

    EffectResult::single(Event::OtpIssued {
        code: OtpCode(code.to_string()),
        issued_at: Utc::now(),
    })
}

/// Deliver the code through the SMS gateway, retrying transient failures.
///
/// Both outcomes are reported as events so the state machine decides what the
/// subscriber hears; exhausted retries are not an interpreter error.
async fn execute_dispatch_otp(
    ctx: &InterpreterContext,
    phone: &PhoneNumber,
    code: &OtpCode,
) -> EffectResult {
    let correlation_id = ctx.correlation_id.as_deref();
    let mut last_error = String::new();

    for attempt in 1..=DISPATCH_ATTEMPTS {
        match ctx.dispatcher.send_otp(correlation_id, phone, code).await {
            Ok(()) => {
                info!("OTP dispatched on attempt {}", attempt);
                return EffectResult::single(Event::OtpDispatchSucceeded);
            }
            Err(e) => {
                warn!("OTP dispatch attempt {} failed: {}", attempt, e);
                last_error = e.to_string();
                if attempt < DISPATCH_ATTEMPTS {
                    tokio::time::sleep(DISPATCH_RETRY_DELAY).await;
                }
            }
        }
    }

    EffectResult::single(Event::OtpDispatchFailed { error: last_error })
}

async fn execute_send_reply(ctx: &InterpreterContext, content: ReplyContent) -> EffectResult {
    let (text, reply_markup) = render_reply(content);

    match ctx
        .notifier
        .send_message(ctx.chat_id, text, reply_markup.as_ref())
        .await
    {
        Ok(()) => EffectResult::none(),
        Err(e) => EffectResult::err(format!("send reply: {}", e)),
    }
}

/// Main menu shown with the welcome message.
fn welcome_keyboard() -> ReplyMarkup {
    ReplyMarkup {
        keyboard: vec![
            vec![KeyboardButton::request_contact("📱 Send Phone Number")],
            vec![KeyboardButton::text("🔁 Resend OTP")],
            vec![KeyboardButton::text("ℹ️ Help")],
        ],
        resize_keyboard: true,
        one_time_keyboard: false,
    }
}

/// Map reply content to the message text (and keyboard, for the welcome
/// prompt) sent to the subscriber.
fn render_reply(content: ReplyContent) -> (&'static str, Option<ReplyMarkup>) {
    match content {
        ReplyContent::Welcome => (
            "👋 Welcome! Please choose an option below:",
            Some(welcome_keyboard()),
        ),
        ReplyContent::InvalidPhone => (
            "Please enter a valid phone number (e.g. +12345678900).",
            None,
        ),
        ReplyContent::AlreadySubscribed => ("You are already subscribed.", None),
        ReplyContent::VerificationSuccess => ("🎉 Your subscription has been successful!", None),
        ReplyContent::IncorrectOtp => (
            "❌ Incorrect OTP. Please try again or type /resend to get a new code.",
            None,
        ),
        ReplyContent::OtpExpiredOrMissing => (
            "⏱ OTP expired or not found. Type /resend to get a new one.",
            None,
        ),
        ReplyContent::CooldownActive => {
            ("🕒 Please wait a bit before requesting a new code.", None)
        }
        ReplyContent::OtpSent => (
            "📲 We've sent you an OTP via SMS. Please enter it to complete your subscription.\nIf you didn't receive it, type /resend.",
            None,
        ),
        ReplyContent::DispatchFailed => (
            "⚠️ We couldn't send your code right now. Please type /resend to try again.",
            None,
        ),
        ReplyContent::Help => (
            "ℹ️ Send your phone number to subscribe, then enter the 6-digit code we text you.\nType /resend to get a new code if yours expired.",
            None,
        ),
    }
}
