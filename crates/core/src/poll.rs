//! Poll state machine for long-running generation jobs.
//!
//! The transition function is pure: it takes the current state and one
//! observation of the provider and yields the next state. Timing lives in
//! the caller, which makes the machine testable without real timers.

use std::time::Duration;

use crate::generation::ProviderJobState;

/// Default delay between poll iterations.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default number of poll iterations before giving up.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 120;

/// Interval and attempt bound for a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

impl PollPolicy {
    /// Upper bound on time spent polling (20 minutes with defaults).
    pub fn ceiling(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Submitted,
    Polling { attempts: u32 },
    Completed { result_url: String },
    Failed { reason: String },
    TimedOut { attempts: u32 },
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::TimedOut { .. }
        )
    }

    /// Number of observations made so far.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Submitted => 0,
            Self::Polling { attempts } | Self::TimedOut { attempts } => *attempts,
            Self::Completed { .. } | Self::Failed { .. } => 0,
        }
    }
}

/// Advance the machine by one provider observation.
///
/// Terminal states absorb further observations.
pub fn transition(state: &PollState, observed: &ProviderJobState, policy: &PollPolicy) -> PollState {
    if state.is_terminal() {
        return state.clone();
    }
    let attempts = state.attempts() + 1;
    match observed {
        ProviderJobState::Completed { result_url } => PollState::Completed {
            result_url: result_url.clone(),
        },
        ProviderJobState::Failed { reason } => PollState::Failed {
            reason: reason.clone(),
        },
        ProviderJobState::Queued | ProviderJobState::InProgress => {
            if attempts >= policy.max_attempts {
                PollState::TimedOut { attempts }
            } else {
                PollState::Polling { attempts }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(1),
            max_attempts,
        }
    }

    #[test]
    fn default_ceiling_is_twenty_minutes() {
        assert_eq!(PollPolicy::default().ceiling(), Duration::from_secs(20 * 60));
    }

    #[test]
    fn pending_observation_counts_attempts() {
        let p = policy(5);
        let s1 = transition(&PollState::Submitted, &ProviderJobState::Queued, &p);
        assert_eq!(s1, PollState::Polling { attempts: 1 });
        let s2 = transition(&s1, &ProviderJobState::InProgress, &p);
        assert_eq!(s2, PollState::Polling { attempts: 2 });
    }

    #[test]
    fn completion_carries_result_url() {
        let s = transition(
            &PollState::Polling { attempts: 3 },
            &ProviderJobState::Completed {
                result_url: "https://cdn/x.mp4".into(),
            },
            &policy(5),
        );
        assert_eq!(
            s,
            PollState::Completed {
                result_url: "https://cdn/x.mp4".into()
            }
        );
    }

    #[test]
    fn failure_carries_reason() {
        let s = transition(
            &PollState::Submitted,
            &ProviderJobState::Failed {
                reason: "content policy".into(),
            },
            &policy(5),
        );
        assert_eq!(
            s,
            PollState::Failed {
                reason: "content policy".into()
            }
        );
    }

    #[test]
    fn exhausting_attempts_times_out() {
        let p = policy(2);
        let s1 = transition(&PollState::Submitted, &ProviderJobState::Queued, &p);
        let s2 = transition(&s1, &ProviderJobState::Queued, &p);
        assert_eq!(s2, PollState::TimedOut { attempts: 2 });
    }

    #[test]
    fn completion_on_last_attempt_wins() {
        let p = policy(2);
        let s = transition(
            &PollState::Polling { attempts: 1 },
            &ProviderJobState::Completed {
                result_url: "u".into(),
            },
            &p,
        );
        assert!(matches!(s, PollState::Completed { .. }));
    }

    #[test]
    fn terminal_states_absorb() {
        let done = PollState::Failed { reason: "x".into() };
        let next = transition(
            &done,
            &ProviderJobState::Completed {
                result_url: "u".into(),
            },
            &policy(5),
        );
        assert_eq!(next, done);
    }
}
