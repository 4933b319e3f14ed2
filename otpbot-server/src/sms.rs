//! SMS gateway client for OTP delivery.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::state_machine::interpreter::OtpDispatcher;
use crate::state_machine::state::{OtpCode, PhoneNumber};
use crate::webhook::CORRELATION_ID_HEADER;

/// Timeout for calls against the SMS gateway.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("sms gateway request failed: {0}")]
    Request(String),
    /// The gateway's error body may echo the recipient number, so only the
    /// status code is carried here.
    #[error("sms gateway returned HTTP {status}")]
    Status { status: u16 },
}

#[derive(Debug, Serialize)]
struct SendSmsRequest {
    to: String,
    body: String,
}

#[derive(Clone)]
pub struct SmsClient {
    client: Client,
    gateway_url: String,
    token: String,
}

impl SmsClient {
    pub fn new(gateway_url: impl Into<String>, token: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            gateway_url: gateway_url.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl OtpDispatcher for SmsClient {
    async fn send_otp(
        &self,
        correlation_id: Option<&str>,
        phone: &PhoneNumber,
        code: &OtpCode,
    ) -> Result<(), DispatchError> {
        let request_body = SendSmsRequest {
            to: phone.0.clone(),
            body: format!("Your OTP is {}", code.0),
        };

        info!("Dispatching OTP via SMS gateway");

        let mut request_builder = self
            .client
            .post(&self.gateway_url)
            .bearer_auth(&self.token)
            .json(&request_body);

        if let Some(cid) = correlation_id {
            request_builder = request_builder.header(CORRELATION_ID_HEADER, cid);
        }

        let response = request_builder
            .send()
            .await
            .map_err(|e| DispatchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Status {
                status: status.as_u16(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sms_request_wire_shape() {
        let request = SendSmsRequest {
            to: "+15551234567".to_string(),
            body: format!("Your OTP is {}", "483920"),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["to"], "+15551234567");
        assert_eq!(json["body"], "Your OTP is 483920");
    }

    #[test]
    fn test_status_error_does_not_carry_the_recipient() {
        let err = DispatchError::Status { status: 503 };
        let message = err.to_string();
        assert_eq!(message, "sms gateway returned HTTP 503");
    }
}
