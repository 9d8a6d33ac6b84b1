//! Wall-clock budget for one module run.
//!
//! Modules call [`Deadline::check`] between per-feature and per-segment
//! iterations. An expired deadline never aborts a report; the section in
//! progress becomes "not available" and the report is marked incomplete.

use crate::error::RiskError;
use std::time::{Duration, Instant};

/// Optional time limit measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    /// A deadline that never expires.
    pub fn unlimited() -> Self {
        Self {
            start: Instant::now(),
            limit: None,
        }
    }

    /// Expires `limit` after now.
    pub fn after(limit: Duration) -> Self {
        Self {
            start: Instant::now(),
            limit: Some(limit),
        }
    }

    /// Expires after `ms` milliseconds, or never for `None`.
    pub fn from_millis(ms: Option<u64>) -> Self {
        ms.map_or_else(Self::unlimited, |ms| Self::after(Duration::from_millis(ms)))
    }

    /// Returns `true` once the limit has passed.
    pub fn expired(&self) -> bool {
        self.limit.is_some_and(|l| self.start.elapsed() >= l)
    }

    /// `Err(ComputationTimeout)` once the limit has passed.
    pub fn check(&self) -> Result<(), RiskError> {
        match self.limit {
            Some(limit) if self.start.elapsed() >= limit => Err(RiskError::ComputationTimeout {
                limit_ms: limit.as_millis() as u64,
            }),
            _ => Ok(()),
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::unlimited()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_never_expires() {
        let d = Deadline::from_millis(None);
        assert!(!d.expired());
        assert!(d.check().is_ok());
    }

    #[test]
    fn zero_limit_expires_immediately() {
        let d = Deadline::from_millis(Some(0));
        assert!(d.expired());
        assert_eq!(d.check(), Err(RiskError::ComputationTimeout { limit_ms: 0 }));
    }

    #[test]
    fn generous_limit_is_open() {
        assert!(Deadline::after(Duration::from_secs(3600)).check().is_ok());
    }
}
