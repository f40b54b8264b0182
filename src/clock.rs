//! Time source seam
//!
//! Telemetry bodies carry an ISO-8601 UTC timestamp supplied on demand.
//! Wall-clock synchronization (NTP or otherwise) is the host's problem;
//! the dispatcher only asks for a formatted string.

use chrono::{SecondsFormat, Utc};

pub trait Clock {
    /// Current time as an ISO-8601/RFC-3339 UTC string, e.g.
    /// `2026-08-06T12:30:05Z`
    fn timestamp(&self) -> String;
}

/// System wall clock
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn timestamp(&self) -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

#[cfg(test)]
pub mod testing {
    use super::Clock;

    /// Clock pinned to a fixed instant, for exact-body assertions
    pub struct FixedClock(pub &'static str);

    impl Clock for FixedClock {
        fn timestamp(&self) -> String {
            self.0.to_string()
        }
    }
}
