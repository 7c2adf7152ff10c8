//! Backoff policies for the two busy-wait loops
//!
//! The log never blocks on a wait/notify primitive. A producer that finds the
//! log full, and the cleanup thread when it has nothing to apply, both poll.
//! How each poll iteration waits is chosen by a [`BackoffPolicy`].

use std::hint;
use std::thread;

use crossbeam::utils::Backoff as CrossbeamBackoff;
use serde::Deserialize;

/// How a busy-wait loop pauses between polls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// A single CPU pause hint per iteration
    #[default]
    Spin,
    /// Exponentially growing spins, then yielding to the scheduler
    Exponential,
    /// Yield the time slice on every iteration
    Yield,
}

impl BackoffPolicy {
    /// Parse a policy name (`spin`, `exponential`, `yield`)
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "spin" => Some(Self::Spin),
            "exponential" => Some(Self::Exponential),
            "yield" => Some(Self::Yield),
            _ => None,
        }
    }

    /// Start a new wait using this policy
    pub fn waiter(self) -> Waiter {
        Waiter {
            policy: self,
            backoff: CrossbeamBackoff::new(),
        }
    }
}

/// State of one busy-wait loop
pub struct Waiter {
    policy: BackoffPolicy,
    backoff: CrossbeamBackoff,
}

impl Waiter {
    /// Pause once before the next poll
    #[inline]
    pub fn wait(&self) {
        match self.policy {
            BackoffPolicy::Spin => hint::spin_loop(),
            BackoffPolicy::Exponential => self.backoff.snooze(),
            BackoffPolicy::Yield => thread::yield_now(),
        }
    }

    /// Forget accumulated backoff after progress was made
    #[inline]
    pub fn reset(&self) {
        self.backoff.reset();
    }

    /// The policy driving this waiter
    pub fn policy(&self) -> BackoffPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_policy() {
        assert_eq!(BackoffPolicy::parse("spin"), Some(BackoffPolicy::Spin));
        assert_eq!(
            BackoffPolicy::parse(" Exponential "),
            Some(BackoffPolicy::Exponential)
        );
        assert_eq!(BackoffPolicy::parse("yield"), Some(BackoffPolicy::Yield));
        assert_eq!(BackoffPolicy::parse("sleep"), None);
    }

    #[test]
    fn test_waiter_runs_every_policy() {
        for policy in [
            BackoffPolicy::Spin,
            BackoffPolicy::Exponential,
            BackoffPolicy::Yield,
        ] {
            let waiter = policy.waiter();
            for _ in 0..16 {
                waiter.wait();
            }
            waiter.reset();
            assert_eq!(waiter.policy(), policy);
        }
    }

    #[test]
    fn test_deserialize_policy() {
        #[derive(Deserialize)]
        struct Holder {
            policy: BackoffPolicy,
        }
        let holder: Holder = toml::from_str("policy = \"exponential\"").unwrap();
        assert_eq!(holder.policy, BackoffPolicy::Exponential);
    }
}
