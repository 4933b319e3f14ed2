use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

use crate::state_machine::policy::DEFAULT_COOLDOWN_SECONDS;

#[derive(Clone)]
pub struct Config {
    pub telegram_bot_token: String,
    pub telegram_webhook_secret: String,
    pub sms_gateway_url: String,
    pub sms_gateway_token: String,
    /// Minimum interval between successive OTP issuances to one subscriber.
    pub otp_cooldown_seconds: i64,
    pub port: u16,
    /// Path of the SQLite database file. Parent directories are created on
    /// startup. Defaults to `data/otpbot.db`.
    pub database_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let telegram_bot_token = env::var("TELEGRAM_BOT_TOKEN")
            .context("TELEGRAM_BOT_TOKEN environment variable is required")?;

        let telegram_webhook_secret = env::var("TELEGRAM_WEBHOOK_SECRET")
            .context("TELEGRAM_WEBHOOK_SECRET environment variable is required")?;

        let sms_gateway_url = env::var("SMS_GATEWAY_URL")
            .context("SMS_GATEWAY_URL environment variable is required")?;

        let sms_gateway_token = env::var("SMS_GATEWAY_TOKEN")
            .context("SMS_GATEWAY_TOKEN environment variable is required")?;

        let otp_cooldown_seconds = parse_cooldown_seconds(env::var("OTP_COOLDOWN_SECONDS").ok())?;

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let database_path = env::var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/otpbot.db"));

        Ok(Config {
            telegram_bot_token,
            telegram_webhook_secret,
            sms_gateway_url,
            sms_gateway_token,
            otp_cooldown_seconds,
            port,
            database_path,
        })
    }
}

/// Parse OTP_COOLDOWN_SECONDS from an optional string value.
///
/// Returns the default when the variable is unset; a set but malformed or
/// negative value is a startup error rather than a silent fallback.
pub fn parse_cooldown_seconds(value: Option<String>) -> Result<i64> {
    match value {
        None => Ok(DEFAULT_COOLDOWN_SECONDS),
        Some(raw) => {
            let seconds = raw
                .parse::<i64>()
                .context("OTP_COOLDOWN_SECONDS must be a valid number")?;
            if seconds < 0 {
                anyhow::bail!("OTP_COOLDOWN_SECONDS must not be negative");
            }
            Ok(seconds)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cooldown_seconds_unset_uses_default() {
        assert_eq!(parse_cooldown_seconds(None).unwrap(), 300);
    }

    #[test]
    fn test_parse_cooldown_seconds_valid() {
        assert_eq!(
            parse_cooldown_seconds(Some("120".to_string())).unwrap(),
            120
        );
        // Zero disables the cooldown entirely.
        assert_eq!(parse_cooldown_seconds(Some("0".to_string())).unwrap(), 0);
    }

    #[test]
    fn test_parse_cooldown_seconds_rejects_garbage() {
        assert!(parse_cooldown_seconds(Some("soon".to_string())).is_err());
        assert!(parse_cooldown_seconds(Some("".to_string())).is_err());
    }

    #[test]
    fn test_parse_cooldown_seconds_rejects_negative() {
        assert!(parse_cooldown_seconds(Some("-5".to_string())).is_err());
    }
}
