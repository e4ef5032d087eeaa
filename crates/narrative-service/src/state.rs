// crates/narrative-service/src/state.rs
// ============================================================================
// Module: Shared Application State
// Description: The `axum` handler state: durable store, LLM client, and the
//              per-story lock registry.
// Purpose: One `Clone`-able handle threaded through every route.
// Dependencies: narrative-core, narrative-store-sqlite
// ============================================================================

use std::sync::Arc;

use narrative_core::interfaces::LLMClient;
use narrative_store_sqlite::SqliteStore;

use crate::story_lock::StoryLockRegistry;

/// Shared state handed to every `axum` handler. Cheap to clone — everything
/// behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Durable `StateStore` + `EventLog`.
    pub store: Arc<SqliteStore>,
    /// LLM collaborator driving event extraction.
    pub llm: Arc<dyn LLMClient + Send + Sync>,
    /// Per-story serialization registry.
    pub story_locks: Arc<StoryLockRegistry>,
}

impl AppState {
    /// Builds application state from its collaborators.
    #[must_use]
    pub fn new(store: Arc<SqliteStore>, llm: Arc<dyn LLMClient + Send + Sync>) -> Self {
        Self {
            store,
            llm,
            story_locks: Arc::new(StoryLockRegistry::new()),
        }
    }
}
