// crates/narrative-service/src/clock.rs
// ============================================================================
// Module: System Clock
// Description: The one place this workspace calls `SystemTime::now()`.
// Purpose: Give the orchestration layer a real wall-clock `Clock` while
//          keeping `narrative-core` itself free of any time-of-day call.
// Dependencies: narrative-core
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use narrative_core::time::Clock;
use narrative_core::time::Timestamp;

/// A [`Clock`] backed by [`SystemTime::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let seconds = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
        Timestamp::from_unix_seconds(i64::try_from(seconds).unwrap_or(i64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_returns_a_plausible_unix_timestamp() {
        let clock = SystemClock;
        // Any timestamp after 2020-01-01 is plausible for a clock actually
        // reading the wall clock rather than returning a fixed stub.
        assert!(clock.now().as_unix_seconds() > 1_577_836_800);
    }
}
