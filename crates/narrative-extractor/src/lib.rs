// crates/narrative-extractor/src/lib.rs
// ============================================================================
// Crate: narrative-extractor
// Description: Turns one draft continuation into a structured event batch
//              by driving an `LLMClient` through the extraction protocol.
// Purpose: Isolate every LLM-specific concern (prompting, schema, retry,
//          fallback) from `narrative-core`, which only ever sees `Event`s.
// ============================================================================

//! `narrative-extractor` implements the extraction protocol: prompt
//! construction, the tool-call/JSON-fallback retry ladder, response
//! validation, and `event_id` assignment. [`llm::HttpLlmClient`] is the
//! concrete [`narrative_core::interfaces::LLMClient`] this workspace ships;
//! tests exercise [`extractor::extract`] against stub clients instead.

pub mod extractor;
pub mod llm;
pub mod prompt;
pub mod schema;

pub use extractor::extract;
pub use extractor::ExtractionOutcome;
pub use llm::HttpLlmClient;
pub use llm::HttpLlmConfig;
