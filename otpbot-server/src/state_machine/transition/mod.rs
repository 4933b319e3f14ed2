//! Pure state transition function.
//!
//! The transition function is the core of the state machine. It takes the
//! current state, an event, and the issuance policy, and returns the new
//! state and a list of effects. This function has NO side effects - it is
//! pure and deterministic.
//!
//! Each state has its own handler module with co-located tests:
//! - `new`: no phone recorded yet
//! - `awaiting_otp`: phone recorded, verification in progress
//! - `verified`: terminal, subscription complete

mod awaiting_otp;
mod new;
mod verified;

use chrono::{DateTime, Utc};

use super::effect::{Effect, ReplyContent};
use super::event::Event;
use super::policy::OtpPolicy;
use super::state::{OtpChallenge, PhoneNumber, SubscriberState};

/// Result of a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    /// The new state after the transition.
    pub state: SubscriberState,
    /// Effects to execute.
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SubscriberState, effects: Vec<Effect>) -> Self {
        Self { state, effects }
    }

    pub fn no_change(state: SubscriberState) -> Self {
        Self {
            state,
            effects: vec![],
        }
    }
}

/// Pure state transition function.
///
/// Given the current state, an event, and the issuance policy, returns the
/// new state and effects to execute. All side effects are returned as data.
pub fn transition(state: SubscriberState, event: Event, policy: &OtpPolicy) -> TransitionResult {
    match &state {
        SubscriberState::New => new::handle(state, event, policy),
        SubscriberState::AwaitingOtp { .. } => awaiting_otp::handle(state, event, policy),
        SubscriberState::Verified { .. } => verified::handle(state, event),
    }
}

/// Shared issuance path for an unverified subscriber with a recorded phone.
///
/// Applies the cooldown guard: if a code went out less than `policy.cooldown`
/// ago, reply with the wait message and change nothing. Otherwise ask the
/// interpreter for a fresh code; the challenge itself is recorded when the
/// resulting `OtpIssued` event comes back, so the previous challenge (if any)
/// stays in place until then.
pub(crate) fn begin_issuance(
    phone: PhoneNumber,
    challenge: Option<OtpChallenge>,
    last_sent_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    policy: &OtpPolicy,
) -> TransitionResult {
    if let Some(last) = last_sent_at {
        if now.signed_duration_since(last) < policy.cooldown {
            return TransitionResult::new(
                SubscriberState::AwaitingOtp {
                    phone,
                    challenge,
                    last_sent_at: Some(last),
                },
                vec![Effect::SendReply {
                    content: ReplyContent::CooldownActive,
                }],
            );
        }
    }

    TransitionResult::new(
        SubscriberState::AwaitingOtp {
            phone,
            challenge,
            last_sent_at,
        },
        vec![Effect::GenerateOtp],
    )
}

#[cfg(test)]
mod tests {
    use super::super::state::OtpCode;
    use super::*;
    use chrono::Duration;

    fn policy() -> OtpPolicy {
        OtpPolicy::default()
    }

    fn phone() -> PhoneNumber {
        PhoneNumber::from("+15551234567")
    }

    fn awaiting_with_challenge(
        code: &str,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> SubscriberState {
        SubscriberState::AwaitingOtp {
            phone: phone(),
            challenge: Some(OtpChallenge {
                code: OtpCode::from(code),
                expires_at: issued_at + ttl,
            }),
            last_sent_at: Some(issued_at),
        }
    }

    fn reply_of(result: &TransitionResult) -> Option<ReplyContent> {
        result.effects.iter().find_map(|e| match e {
            Effect::SendReply { content } => Some(*content),
            _ => None,
        })
    }

    /// The full happy path for a brand-new chat, at the transition level:
    /// greeting, phone entry, code issuance, a wrong guess, the right guess,
    /// and the terminal already-subscribed reply.
    #[test]
    fn test_full_verification_flow() {
        let policy = policy();
        let t0 = Utc::now();

        // /start on a fresh chat: prompt, no mutation.
        let result = transition(SubscriberState::New, Event::StartRequested, &policy);
        assert_eq!(result.state, SubscriberState::New);
        assert_eq!(reply_of(&result), Some(ReplyContent::Welcome));

        // Typed phone number: recorded, code requested.
        let result = transition(
            SubscriberState::New,
            Event::TextEntered {
                text: "+15551234567".to_string(),
                now: t0,
            },
            &policy,
        );
        assert_eq!(result.state.phone(), Some(&phone()));
        assert!(!result.state.is_verified());
        assert_eq!(result.effects, vec![Effect::GenerateOtp]);

        // Code issued: challenge recorded, dispatch requested.
        let result = transition(
            result.state,
            Event::OtpIssued {
                code: OtpCode::from("483920"),
                issued_at: t0,
            },
            &policy,
        );
        let challenge = result.state.challenge().expect("challenge recorded");
        assert_eq!(challenge.code, OtpCode::from("483920"));
        assert_eq!(challenge.expires_at, t0 + Duration::minutes(5));
        assert_eq!(result.state.last_sent_at(), Some(t0));
        assert_eq!(
            result.effects,
            vec![Effect::DispatchOtp {
                phone: phone(),
                code: OtpCode::from("483920"),
            }]
        );

        // Gateway accepted: prompt the subscriber for the code.
        let result = transition(result.state, Event::OtpDispatchSucceeded, &policy);
        assert_eq!(reply_of(&result), Some(ReplyContent::OtpSent));

        // Wrong guess: rejected, challenge intact.
        let before = result.state.clone();
        let result = transition(
            result.state,
            Event::TextEntered {
                text: "000000".to_string(),
                now: t0 + Duration::minutes(1),
            },
            &policy,
        );
        assert_eq!(result.state, before);
        assert_eq!(reply_of(&result), Some(ReplyContent::IncorrectOtp));

        // Right guess inside the window: verified, challenge cleared.
        let result = transition(
            result.state,
            Event::TextEntered {
                text: "483920".to_string(),
                now: t0 + Duration::minutes(2),
            },
            &policy,
        );
        assert!(result.state.is_verified());
        assert!(result.state.challenge().is_none());
        assert_eq!(reply_of(&result), Some(ReplyContent::VerificationSuccess));

        // /start after verification: already subscribed.
        let result = transition(result.state, Event::StartRequested, &policy);
        assert!(result.state.is_verified());
        assert_eq!(reply_of(&result), Some(ReplyContent::AlreadySubscribed));
    }

    /// Regression test: a second issuance inside the cooldown window must not
    /// touch the stored challenge or dispatch anything. Bug class: a user
    /// hammering /resend replacing the code they are about to receive.
    #[test]
    fn test_resend_within_cooldown_is_a_no_op() {
        let policy = policy();
        let t0 = Utc::now();
        let state = awaiting_with_challenge("483920", t0, policy.code_ttl);

        let result = transition(
            state.clone(),
            Event::ResendRequested {
                now: t0 + Duration::seconds(60),
            },
            &policy,
        );

        assert_eq!(result.state, state);
        assert_eq!(
            result.effects,
            vec![Effect::SendReply {
                content: ReplyContent::CooldownActive,
            }]
        );
    }

    #[test]
    fn test_resend_after_cooldown_issues_a_fresh_code() {
        let policy = policy();
        let t0 = Utc::now();
        let state = awaiting_with_challenge("483920", t0, policy.code_ttl);

        let t1 = t0 + policy.cooldown + Duration::seconds(1);
        let result = transition(state, Event::ResendRequested { now: t1 }, &policy);
        assert_eq!(result.effects, vec![Effect::GenerateOtp]);

        let result = transition(
            result.state,
            Event::OtpIssued {
                code: OtpCode::from("112233"),
                issued_at: t1,
            },
            &policy,
        );
        let challenge = result.state.challenge().expect("challenge replaced");
        assert_eq!(challenge.code, OtpCode::from("112233"));
        assert_eq!(challenge.expires_at, t1 + policy.code_ttl);
        assert_eq!(result.state.last_sent_at(), Some(t1));
    }

    /// Regression test: expiry wins over a matching code. A code entered at
    /// or after its expiry instant is rejected even when it compares equal.
    /// Bug class: verifying with a code scavenged from an old SMS.
    #[test]
    fn test_expired_code_is_rejected_even_on_match() {
        let policy = policy();
        let t0 = Utc::now();
        let state = awaiting_with_challenge("483920", t0, policy.code_ttl);

        for entered_at in [t0 + policy.code_ttl, t0 + policy.code_ttl + Duration::minutes(1)] {
            let result = transition(
                state.clone(),
                Event::TextEntered {
                    text: "483920".to_string(),
                    now: entered_at,
                },
                &policy,
            );
            assert_eq!(result.state, state);
            assert_eq!(reply_of(&result), Some(ReplyContent::OtpExpiredOrMissing));
        }
    }

    /// Regression test: replaying the winning message after verification must
    /// not re-verify or issue anything. Bug class: duplicate webhook delivery
    /// of the message that completed verification.
    #[test]
    fn test_correct_code_verifies_exactly_once() {
        let policy = policy();
        let t0 = Utc::now();
        let state = awaiting_with_challenge("483920", t0, policy.code_ttl);

        let entry = Event::TextEntered {
            text: "483920".to_string(),
            now: t0 + Duration::minutes(1),
        };

        let result = transition(state, entry.clone(), &policy);
        assert!(result.state.is_verified());
        assert_eq!(reply_of(&result), Some(ReplyContent::VerificationSuccess));

        let replay = transition(result.state.clone(), entry, &policy);
        assert_eq!(replay.state, result.state);
        assert_eq!(reply_of(&replay), Some(ReplyContent::AlreadySubscribed));
        assert!(!replay.effects.contains(&Effect::GenerateOtp));
    }

    /// Dispatch failure leaves the recorded challenge in place (the code was
    /// committed before the dispatch attempt) and tells the subscriber to
    /// retry; it must not silently claim the code was sent.
    #[test]
    fn test_dispatch_failure_keeps_challenge_and_reports() {
        let policy = policy();
        let t0 = Utc::now();
        let state = awaiting_with_challenge("483920", t0, policy.code_ttl);

        let result = transition(
            state.clone(),
            Event::OtpDispatchFailed {
                error: "gateway returned 503".to_string(),
            },
            &policy,
        );

        assert_eq!(result.state, state);
        assert_eq!(reply_of(&result), Some(ReplyContent::DispatchFailed));
        assert!(result
            .effects
            .iter()
            .any(|e| matches!(e, Effect::Log { .. })));
    }

    #[test]
    fn test_issuance_skips_cooldown_when_nothing_was_sent_yet() {
        let policy = policy();
        let result = begin_issuance(phone(), None, None, Utc::now(), &policy);
        assert_eq!(result.effects, vec![Effect::GenerateOtp]);
    }

    /// The cooldown is measured against the previous issuance even if the
    /// clock reads earlier than it (skewed restarts): a negative elapsed time
    /// still counts as "too soon".
    #[test]
    fn test_cooldown_with_clock_before_last_issuance() {
        let policy = policy();
        let t0 = Utc::now();
        let result = begin_issuance(
            phone(),
            None,
            Some(t0),
            t0 - Duration::seconds(30),
            &policy,
        );
        assert_eq!(
            reply_of(&result),
            Some(ReplyContent::CooldownActive),
            "clock skew must not bypass the cooldown"
        );
    }
}
