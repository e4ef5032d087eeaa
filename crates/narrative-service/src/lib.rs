// crates/narrative-service/src/lib.rs
// ============================================================================
// Crate: narrative-service
// Description: The orchestration layer and HTTP surface around the pure
//              core: wires `StateStore`, `EventLog`, and the extractor
//              together into the request-cycle pipeline.
// Purpose: Own everything the core deliberately stays ignorant of — I/O,
//          per-story serialization, and the outer `axum` router.
// Dependencies: narrative-core, narrative-extractor, narrative-store-sqlite,
//               axum, tokio
// ============================================================================

//! ## Overview
//! `narrative-service` is the only crate in this workspace that performs
//! I/O against the outside world on the engine's behalf: loading and
//! saving `CanonicalState`, appending to the event log, and invoking the
//! LLM through [`narrative_extractor`]. An `axum::Router` sits over shared
//! state with structured errors mapped to status codes, exposing three
//! plain HTTP routes.

pub mod clock;
pub mod error;
pub mod orchestrator;
pub mod routes;
pub mod state;
pub mod story_lock;

pub use clock::SystemClock;
pub use error::ServiceError;
pub use orchestrator::DraftProcessOutcome;
pub use routes::router;
pub use state::AppState;
