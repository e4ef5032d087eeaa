// crates/narrative-core/src/time.rs
// ============================================================================
// Module: Narrative Time Model
// Description: Narrative time anchors and the wall-clock seam used for
//              `meta.updated_at` stamping.
// Purpose: Keep the patch applier pure by never reading wall-clock time
//          directly; callers supply it through a `Clock`.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Narrative time (`TimeAnchor.order`) is distinct from the `turn` counter:
//! `turn` counts request cycles, `order` is the story's internal clock. The
//! applier never reads wall-clock time itself; it is handed a [`Clock`] so
//! that `apply`/`apply_many` remain deterministic and testable.

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Narrative Time
// ============================================================================

/// A point on the story's internal timeline.
///
/// # Invariants
/// - `order` is non-negative and, under a PASSing batch, monotonically
///   non-decreasing across committed turns (enforced by gate rule R7).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeAnchor {
    /// Human-readable label for the current moment (e.g. "建安三年春").
    pub label: String,
    /// Monotonic ordering value for the label.
    pub order: u64,
}

/// The story's calendar and current anchor.
///
/// # Invariants
/// - `anchor.order` only advances or holds; it never decreases on a
///   committed turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeState {
    /// Calendar label for the story (e.g. "建安三年春" or "初始时间").
    pub calendar: String,
    /// Current time anchor.
    pub anchor: TimeAnchor,
}

impl TimeState {
    /// Returns the initial time state used when a story is first created.
    #[must_use]
    pub fn initial() -> Self {
        const INITIAL_LABEL: &str = "初始时间";
        Self {
            calendar: INITIAL_LABEL.to_string(),
            anchor: TimeAnchor {
                label: INITIAL_LABEL.to_string(),
                order: 0,
            },
        }
    }
}

// ============================================================================
// SECTION: Wall-Clock Seam
// ============================================================================

/// Wall-clock timestamp used only for `meta.updated_at`/`created_at` stamps.
///
/// # Invariants
/// - Carries no ordering semantics over narrative time; never compared to
///   `TimeAnchor.order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Constructs a timestamp from unix seconds.
    #[must_use]
    pub const fn from_unix_seconds(seconds: i64) -> Self {
        Self(seconds)
    }

    /// Returns the timestamp as unix seconds.
    #[must_use]
    pub const fn as_unix_seconds(self) -> i64 {
        self.0
    }
}

/// Wall-clock source. The core never calls `SystemTime::now()` itself;
/// callers (the orchestration layer, or tests) supply a `Clock`.
pub trait Clock {
    /// Returns the current timestamp.
    fn now(&self) -> Timestamp;
}

/// A [`Clock`] that always returns a fixed timestamp, for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}
