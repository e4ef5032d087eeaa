// crates/narrative-store-sqlite/src/lib.rs
// ============================================================================
// Crate: narrative-store-sqlite
// Description: Durable `StateStore` + `EventLog` over SQLite.
// Purpose: Give the engine a concrete persistence layer without coupling
//          `narrative-core` to any particular storage technology.
// ============================================================================

//! `narrative-store-sqlite` is the only crate in this workspace that speaks
//! to a file on disk for canonical-state/event persistence. Everything it
//! exposes implements the trait contracts defined in
//! `narrative_core::interfaces`.

pub mod store;

pub use store::SqliteJournalMode;
pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
