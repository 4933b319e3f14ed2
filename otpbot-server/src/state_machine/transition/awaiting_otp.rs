//! Transition handling for the `AwaitingOtp` state.
//!
//! A phone number is on file and verification is in progress. Typed text is
//! interpreted as a code attempt against the outstanding challenge; resends
//! and contact re-shares go through the shared issuance path with its
//! cooldown guard. The recorded phone never changes in this state.

use super::{begin_issuance, TransitionResult};
use crate::state_machine::effect::{Effect, LogLevel, ReplyContent};
use crate::state_machine::event::Event;
use crate::state_machine::policy::OtpPolicy;
use crate::state_machine::state::{OtpChallenge, PhoneNumber, SubscriberState};

pub(super) fn handle(
    state: SubscriberState,
    event: Event,
    policy: &OtpPolicy,
) -> TransitionResult {
    match (&state, event) {
        (SubscriberState::AwaitingOtp { .. }, Event::StartRequested) => TransitionResult::new(
            state.clone(),
            vec![Effect::SendReply {
                content: ReplyContent::Welcome,
            }],
        ),

        (SubscriberState::AwaitingOtp { .. }, Event::HelpRequested) => TransitionResult::new(
            state.clone(),
            vec![Effect::SendReply {
                content: ReplyContent::Help,
            }],
        ),

        (
            SubscriberState::AwaitingOtp {
                phone,
                challenge,
                last_sent_at,
            },
            Event::ResendRequested { now },
        ) => begin_issuance(phone.clone(), challenge.clone(), *last_sent_at, now, policy),

        // A contact share while verification is in progress re-issues to the
        // phone already on file; the recorded number is never overwritten.
        (
            SubscriberState::AwaitingOtp {
                phone,
                challenge,
                last_sent_at,
            },
            Event::PhoneSubmitted {
                phone: submitted,
                now,
            },
        ) => match PhoneNumber::parse(&submitted) {
            Some(parsed) => {
                let mut result =
                    begin_issuance(phone.clone(), challenge.clone(), *last_sent_at, now, policy);
                if parsed != *phone {
                    result.effects.push(Effect::Log {
                        level: LogLevel::Info,
                        message: "Contact share differs from the recorded phone; keeping the recorded one"
                            .to_string(),
                    });
                }
                result
            }
            None => TransitionResult::new(
                state.clone(),
                vec![Effect::SendReply {
                    content: ReplyContent::InvalidPhone,
                }],
            ),
        },

        (
            SubscriberState::AwaitingOtp {
                phone, challenge, ..
            },
            Event::TextEntered { text, now },
        ) => match challenge {
            // Expiry is checked before the code itself; a matching code that
            // has expired is still rejected.
            Some(challenge) if !challenge.is_expired(now) => {
                if text == challenge.code.0 {
                    TransitionResult::new(
                        SubscriberState::Verified {
                            phone: phone.clone(),
                        },
                        vec![Effect::SendReply {
                            content: ReplyContent::VerificationSuccess,
                        }],
                    )
                } else {
                    TransitionResult::new(
                        state.clone(),
                        vec![Effect::SendReply {
                            content: ReplyContent::IncorrectOtp,
                        }],
                    )
                }
            }
            _ => TransitionResult::new(
                state.clone(),
                vec![Effect::SendReply {
                    content: ReplyContent::OtpExpiredOrMissing,
                }],
            ),
        },

        (
            SubscriberState::AwaitingOtp { phone, .. },
            Event::OtpIssued { code, issued_at },
        ) => TransitionResult::new(
            SubscriberState::AwaitingOtp {
                phone: phone.clone(),
                challenge: Some(OtpChallenge {
                    code: code.clone(),
                    expires_at: issued_at + policy.code_ttl,
                }),
                last_sent_at: Some(issued_at),
            },
            vec![Effect::DispatchOtp {
                phone: phone.clone(),
                code,
            }],
        ),

        (SubscriberState::AwaitingOtp { .. }, Event::OtpDispatchSucceeded) => {
            TransitionResult::new(
                state.clone(),
                vec![Effect::SendReply {
                    content: ReplyContent::OtpSent,
                }],
            )
        }

        (SubscriberState::AwaitingOtp { .. }, Event::OtpDispatchFailed { error }) => {
            TransitionResult::new(
                state.clone(),
                vec![
                    Effect::Log {
                        level: LogLevel::Error,
                        message: format!("OTP dispatch failed: {error}"),
                    },
                    Effect::SendReply {
                        content: ReplyContent::DispatchFailed,
                    },
                ],
            )
        }

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::state::OtpCode;
    use chrono::{DateTime, Duration, Utc};

    fn policy() -> OtpPolicy {
        OtpPolicy::default()
    }

    fn awaiting(challenge: Option<OtpChallenge>, last_sent_at: Option<DateTime<Utc>>) -> SubscriberState {
        SubscriberState::AwaitingOtp {
            phone: PhoneNumber::from("+15551234567"),
            challenge,
            last_sent_at,
        }
    }

    fn challenge_issued_at(code: &str, issued_at: DateTime<Utc>) -> OtpChallenge {
        OtpChallenge {
            code: OtpCode::from(code),
            expires_at: issued_at + policy().code_ttl,
        }
    }

    #[test]
    fn test_start_repeats_welcome_without_touching_challenge() {
        let t0 = Utc::now();
        let state = awaiting(Some(challenge_issued_at("483920", t0)), Some(t0));
        let result = handle(state.clone(), Event::StartRequested, &policy());
        assert_eq!(result.state, state);
        assert!(matches!(
            result.effects[..],
            [Effect::SendReply {
                content: ReplyContent::Welcome,
            }]
        ));
    }

    #[test]
    fn test_correct_code_before_expiry_verifies() {
        let t0 = Utc::now();
        let state = awaiting(Some(challenge_issued_at("483920", t0)), Some(t0));
        let result = handle(
            state,
            Event::TextEntered {
                text: "483920".to_string(),
                now: t0 + Duration::minutes(3),
            },
            &policy(),
        );
        assert_eq!(
            result.state,
            SubscriberState::Verified {
                phone: PhoneNumber::from("+15551234567"),
            }
        );
        assert!(matches!(
            result.effects[..],
            [Effect::SendReply {
                content: ReplyContent::VerificationSuccess,
            }]
        ));
    }

    #[test]
    fn test_incorrect_code_is_rejected_and_challenge_kept() {
        let t0 = Utc::now();
        let state = awaiting(Some(challenge_issued_at("483920", t0)), Some(t0));
        let result = handle(
            state.clone(),
            Event::TextEntered {
                text: "111111".to_string(),
                now: t0 + Duration::minutes(1),
            },
            &policy(),
        );
        assert_eq!(result.state, state);
        assert!(matches!(
            result.effects[..],
            [Effect::SendReply {
                content: ReplyContent::IncorrectOtp,
            }]
        ));
    }

    /// The comparison is exact: prefixes, suffixes, and padded variants of
    /// the stored code do not verify.
    #[test]
    fn test_code_comparison_is_exact() {
        let t0 = Utc::now();
        let state = awaiting(Some(challenge_issued_at("483920", t0)), Some(t0));
        for text in ["48392", "4839200", " 483920", "483 920"] {
            let result = handle(
                state.clone(),
                Event::TextEntered {
                    text: text.to_string(),
                    now: t0 + Duration::minutes(1),
                },
                &policy(),
            );
            assert_eq!(result.state, state, "input {:?}", text);
            assert!(matches!(
                result.effects[..],
                [Effect::SendReply {
                    content: ReplyContent::IncorrectOtp,
                }]
            ));
        }
    }

    #[test]
    fn test_code_entry_without_outstanding_challenge_reports_expired() {
        let state = awaiting(None, None);
        let result = handle(
            state.clone(),
            Event::TextEntered {
                text: "483920".to_string(),
                now: Utc::now(),
            },
            &policy(),
        );
        assert_eq!(result.state, state);
        assert!(matches!(
            result.effects[..],
            [Effect::SendReply {
                content: ReplyContent::OtpExpiredOrMissing,
            }]
        ));
    }

    #[test]
    fn test_code_entry_after_expiry_reports_expired() {
        let t0 = Utc::now();
        let state = awaiting(Some(challenge_issued_at("483920", t0)), Some(t0));
        let result = handle(
            state.clone(),
            Event::TextEntered {
                text: "483920".to_string(),
                now: t0 + Duration::minutes(10),
            },
            &policy(),
        );
        assert_eq!(result.state, state);
        assert!(matches!(
            result.effects[..],
            [Effect::SendReply {
                content: ReplyContent::OtpExpiredOrMissing,
            }]
        ));
    }

    #[test]
    fn test_contact_reshare_keeps_recorded_phone() {
        let t0 = Utc::now();
        let state = awaiting(Some(challenge_issued_at("483920", t0)), Some(t0));
        let result = handle(
            state,
            Event::PhoneSubmitted {
                phone: "+19998887766".to_string(),
                now: t0 + policy().cooldown + Duration::seconds(1),
            },
            &policy(),
        );
        assert_eq!(
            result.state.phone(),
            Some(&PhoneNumber::from("+15551234567"))
        );
        assert!(result.effects.contains(&Effect::GenerateOtp));
        assert!(result
            .effects
            .iter()
            .any(|e| matches!(e, Effect::Log { level: LogLevel::Info, .. })));
    }

    #[test]
    fn test_contact_reshare_within_cooldown_gets_wait_reply() {
        let t0 = Utc::now();
        let state = awaiting(Some(challenge_issued_at("483920", t0)), Some(t0));
        let result = handle(
            state.clone(),
            Event::PhoneSubmitted {
                phone: "+15551234567".to_string(),
                now: t0 + Duration::seconds(30),
            },
            &policy(),
        );
        assert_eq!(result.state, state);
        assert!(matches!(
            result.effects[..],
            [Effect::SendReply {
                content: ReplyContent::CooldownActive,
            }]
        ));
    }

    #[test]
    fn test_malformed_contact_reshare_prompts_for_phone() {
        let state = awaiting(None, None);
        let result = handle(
            state.clone(),
            Event::PhoneSubmitted {
                phone: "garbage".to_string(),
                now: Utc::now(),
            },
            &policy(),
        );
        assert_eq!(result.state, state);
        assert!(matches!(
            result.effects[..],
            [Effect::SendReply {
                content: ReplyContent::InvalidPhone,
            }]
        ));
    }

    #[test]
    fn test_issued_code_is_recorded_and_dispatched() {
        let t0 = Utc::now();
        let state = awaiting(None, None);
        let result = handle(
            state,
            Event::OtpIssued {
                code: OtpCode::from("654321"),
                issued_at: t0,
            },
            &policy(),
        );
        let challenge = result.state.challenge().expect("challenge recorded");
        assert_eq!(challenge.code, OtpCode::from("654321"));
        assert_eq!(challenge.expires_at, t0 + Duration::minutes(5));
        assert_eq!(result.state.last_sent_at(), Some(t0));
        assert_eq!(
            result.effects,
            vec![Effect::DispatchOtp {
                phone: PhoneNumber::from("+15551234567"),
                code: OtpCode::from("654321"),
            }]
        );
    }

    #[test]
    fn test_dispatch_success_prompts_for_code() {
        let t0 = Utc::now();
        let state = awaiting(Some(challenge_issued_at("483920", t0)), Some(t0));
        let result = handle(state.clone(), Event::OtpDispatchSucceeded, &policy());
        assert_eq!(result.state, state);
        assert!(matches!(
            result.effects[..],
            [Effect::SendReply {
                content: ReplyContent::OtpSent,
            }]
        ));
    }

    #[test]
    fn test_dispatch_failure_logs_and_prompts_retry() {
        let t0 = Utc::now();
        let state = awaiting(Some(challenge_issued_at("483920", t0)), Some(t0));
        let result = handle(
            state.clone(),
            Event::OtpDispatchFailed {
                error: "gateway returned 503".to_string(),
            },
            &policy(),
        );
        assert_eq!(result.state, state);
        assert!(matches!(
            result.effects[..],
            [
                Effect::Log {
                    level: LogLevel::Error,
                    ..
                },
                Effect::SendReply {
                    content: ReplyContent::DispatchFailed,
                },
            ]
        ));
    }
}
