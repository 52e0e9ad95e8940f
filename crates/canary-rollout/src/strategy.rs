//! Poll and cleanup policies.

use std::time::Duration;

use canary_core::config::PollSection;
use canary_core::{CoreError, CoreResult};

/// How to wait for an endpoint to settle.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PollPolicy {
    /// Seconds between status checks.
    pub interval_secs: u64,
    /// Give up after this many status checks. `None` waits forever.
    pub max_attempts: Option<u32>,
    /// Give up after this many seconds. `None` waits forever.
    pub timeout_secs: Option<u64>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            max_attempts: Some(120),
            timeout_secs: None,
        }
    }
}

impl PollPolicy {
    /// Overlay a `[poll]` section on the defaults.
    pub fn from_section(section: &PollSection) -> CoreResult<Self> {
        let defaults = PollPolicy::default();
        let interval_secs = section.interval_secs.unwrap_or(defaults.interval_secs);
        if interval_secs == 0 {
            return Err(CoreError::Invalid {
                field: "interval_secs",
                reason: "must be at least 1 second".to_string(),
            });
        }
        let max_attempts = match section.max_attempts {
            Some(0) => None,
            Some(n) => Some(n),
            None => defaults.max_attempts,
        };
        Ok(Self {
            interval_secs,
            max_attempts,
            timeout_secs: section.timeout_secs.filter(|&t| t > 0),
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// What to do with resources a failed run created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CleanupPolicy {
    /// Leave them for the operator and report them.
    #[default]
    Keep,
    /// Delete them, newest first, once the endpoint no longer needs them.
    DeleteCreated,
}

impl CleanupPolicy {
    pub fn from_flag(delete_on_failure: bool) -> Self {
        if delete_on_failure {
            CleanupPolicy::DeleteCreated
        } else {
            CleanupPolicy::Keep
        }
    }
}
