// crates/narrative-core/src/interfaces.rs
// ============================================================================
// Module: External Interfaces
// Description: Trait contracts the core relies on but does not implement:
//              persistence, the event log, the LLM, and RAG retrieval.
// Purpose: Let `narrative-store-sqlite`, `narrative-extractor`, and test
//          doubles plug into the core without the core depending on them.
// Dependencies: crate::{state, event, identifiers}, thiserror
// ============================================================================

//! ## Overview
//! Mirrors the shape of a provider contract: one trait, one paired
//! `thiserror` error enum, both owned by `narrative-core` so downstream
//! crates implement rather than define them.

use thiserror::Error;

use crate::event::Event;
use crate::identifiers::EventId;
use crate::identifiers::StoryId;
use crate::state::CanonicalState;

// ============================================================================
// SECTION: StateStore
// ============================================================================

/// Errors raised by a [`StateStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure.
    #[error("state store I/O error: {0}")]
    Io(String),
    /// Persisted state failed to parse or failed referential integrity even
    /// after the location auto-materialiser ran.
    #[error("state store corruption for story {story_id}: {reason}")]
    Corrupt {
        /// Story whose persisted state is unreadable.
        story_id: StoryId,
        /// Diagnostic detail.
        reason: String,
    },
}

/// Durable storage for one [`CanonicalState`] per story.
///
/// # Invariants
/// - `load` never returns a state that fails referential invariants;
///   implementations must run the location auto-materialiser on load
///   before returning, so states persisted before a bug fix remain
///   readable.
pub trait StateStore {
    /// Loads the story's state, if any has been persisted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure or unrecoverable corruption.
    fn load(&self, story_id: &StoryId) -> Result<Option<CanonicalState>, StoreError>;

    /// Overwrites the story's state atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn save(&self, story_id: &StoryId, state: &CanonicalState) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: EventLog
// ============================================================================

/// Errors raised by an [`EventLog`] implementation.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// Underlying I/O failure.
    #[error("event log I/O error: {0}")]
    Io(String),
    /// An event with this id has already been appended.
    #[error("event_id already exists: {0}")]
    DuplicateEventId(EventId),
}

/// Append-only log of committed events, one story's worth at a time.
///
/// # Invariants
/// - `append` never overwrites an existing `event_id`.
/// - The save-and-append pair for one committed turn is atomic with
///   respect to other readers of the same story.
pub trait EventLog {
    /// Appends a committed event to the story's log.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::DuplicateEventId`] if `event.event_id`
    /// already exists for this story.
    fn append(&self, story_id: &StoryId, event: &Event) -> Result<(), EventLogError>;

    /// Returns the `limit` most recent events, offset by `offset`, ordered
    /// by `(time.order desc, turn desc, created_at desc)`.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError`] on I/O failure.
    fn list_recent(&self, story_id: &StoryId, limit: usize, offset: usize) -> Result<Vec<Event>, EventLogError>;

    /// Returns one event by id, if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError`] on I/O failure.
    fn get(&self, event_id: &EventId) -> Result<Option<Event>, EventLogError>;

    /// Returns every event committed during a given turn.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError`] on I/O failure.
    fn by_turn(&self, story_id: &StoryId, turn: u64) -> Result<Vec<Event>, EventLogError>;

    /// Returns every event whose `time.order` falls within `[min, max]`
    /// (either bound optional).
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError`] on I/O failure.
    fn by_time_range(&self, story_id: &StoryId, min: Option<u64>, max: Option<u64>) -> Result<Vec<Event>, EventLogError>;
}

// ============================================================================
// SECTION: LLMClient
// ============================================================================

/// Errors raised while invoking an [`LLMClient`].
#[derive(Debug, Error)]
pub enum LlmError {
    /// Transport-level failure (connection, timeout, non-2xx status).
    #[error("llm transport error: {0}")]
    Transport(String),
    /// The model's response could not be parsed against the expected schema.
    #[error("llm response did not match schema: {0}")]
    SchemaMismatch(String),
}

/// One chat message in an LLM request.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    /// Role: `system`, `user`, or `assistant`.
    pub role: String,
    /// Message content.
    pub content: String,
}

/// The external LLM collaborator the extractor drives. Retry and fallback
/// between the two call modes is the extractor's responsibility, not this
/// trait's.
pub trait LLMClient {
    /// Invokes the model with a forced function/tool call against
    /// `tool_schema`, returning the raw JSON arguments the model produced.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] on transport failure or schema mismatch.
    fn call_with_tool(&self, messages: &[ChatMessage], tool_schema: &serde_json::Value) -> Result<serde_json::Value, LlmError>;

    /// Invokes the model in JSON-object mode against `schema`, returning the
    /// raw JSON body the model produced.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] on transport failure or schema mismatch.
    fn call_with_json(&self, messages: &[ChatMessage], schema: &serde_json::Value) -> Result<serde_json::Value, LlmError>;
}

// ============================================================================
// SECTION: RAGClient
// ============================================================================

/// Errors raised by a [`RagClient`] implementation.
#[derive(Debug, Error)]
pub enum RagError {
    /// Underlying I/O or transport failure.
    #[error("rag client error: {0}")]
    Transport(String),
}

/// One retrieval hit.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RagHit {
    /// Retrieved text.
    pub text: String,
    /// Similarity score.
    pub score: f64,
    /// Free-form source metadata.
    #[serde(default)]
    pub metadata: crate::state::Metadata,
}

/// Optional retrieval collaborator; not consulted by the gate or applier
///.
pub trait RagClient {
    /// Returns the `top_k` most relevant passages for `text` within the
    /// given story's index.
    ///
    /// # Errors
    ///
    /// Returns [`RagError`] on transport failure.
    fn query(&self, story_id: &StoryId, text: &str, top_k: usize) -> Result<Vec<RagHit>, RagError>;
}
