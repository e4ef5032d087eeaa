// crates/narrative-service/src/routes.rs
// ============================================================================
// Module: HTTP Surface
// Description: The three `axum` routes making up the engine's request surface.
// Purpose: Translate HTTP requests into orchestrator calls and domain
//          results into their documented JSON shapes.
// Dependencies: axum, narrative-core, serde, tokio
// ============================================================================

//! ## Overview
//! Three routes:
//! - `GET /state/{story_id}` — read-only snapshot, auto-initialising a new
//!   story on first read just like `POST /draft/process` does.
//! - `POST /draft/process` — the full request cycle, serialized per story
//!   by [`crate::story_lock::StoryLockRegistry`].
//! - `POST /rag/query` — always `503`, since this deployment ships no
//!   concrete [`narrative_core::interfaces::RagClient`].

use axum::extract::Path;
use axum::extract::State;
use axum::routing::get;
use axum::routing::post;
use axum::Json;
use axum::Router;
use narrative_core::event::Event;
use narrative_core::gate::Action;
use narrative_core::gate::RuleViolation;
use narrative_core::identifiers::StoryId;
use narrative_core::interfaces::StateStore;
use narrative_core::state::CanonicalState;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ServiceError;
use crate::orchestrator;
use crate::state::AppState;
use crate::SystemClock;

/// Builds the service's `axum::Router` over `state`.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/state/{story_id}", get(get_state))
        .route("/draft/process", post(post_draft_process))
        .route("/rag/query", post(post_rag_query))
        .with_state(state)
}

/// Request body for `POST /draft/process`.
#[derive(Debug, Deserialize)]
pub struct DraftProcessRequest {
    /// Story this draft belongs to.
    pub story_id: String,
    /// The player's message that prompted this continuation.
    pub user_message: String,
    /// The candidate LLM-authored continuation to validate.
    pub assistant_draft: String,
}

/// Response body for `POST /draft/process`.
#[derive(Debug, Serialize)]
pub struct DraftProcessResponse {
    /// One of `pass`, `auto_fix`, `rewrite`, `ask_user`.
    pub final_action: &'static str,
    /// The story's state after this request (unchanged unless committed).
    pub state: CanonicalState,
    /// Events committed this request; empty unless `final_action` is `pass`
    /// or `auto_fix`.
    pub recent_events: Vec<Event>,
    /// Rewrite instructions, populated only for `rewrite`.
    pub rewrite_instructions: Vec<String>,
    /// Clarification questions, populated only for `ask_user`.
    pub questions: Vec<String>,
    /// Every violation the gate gathered this request.
    pub violations: Vec<RuleViolation>,
}

impl From<orchestrator::DraftProcessOutcome> for DraftProcessResponse {
    fn from(outcome: orchestrator::DraftProcessOutcome) -> Self {
        Self {
            final_action: action_label(outcome.action),
            state: outcome.state,
            recent_events: outcome.recent_events,
            rewrite_instructions: outcome.rewrite_instructions,
            questions: outcome.questions,
            violations: outcome.violations,
        }
    }
}

/// Request body for `POST /rag/query`. Accepted but unused while no
/// `RagClient` is configured — see [`ServiceError::RagUnavailable`].
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct RagQueryRequest {
    /// Story whose retrieval index to search.
    pub story_id: String,
    /// Query text.
    pub query: String,
    /// Number of hits to return.
    pub top_k: usize,
}

fn action_label(action: Action) -> &'static str {
    match action {
        Action::Pass => "pass",
        Action::AutoFix => "auto_fix",
        Action::Rewrite => "rewrite",
        Action::AskUser => "ask_user",
    }
}

async fn get_state(State(state): State<AppState>, Path(story_id): Path<String>) -> Result<Json<CanonicalState>, ServiceError> {
    let story_id = StoryId::new(story_id);
    let current = tokio::task::spawn_blocking(move || load_or_init(&state, &story_id))
        .await
        .map_err(|e| ServiceError::BadRequest(e.to_string()))??;
    Ok(Json(current))
}

fn load_or_init(state: &AppState, story_id: &StoryId) -> Result<CanonicalState, ServiceError> {
    use narrative_core::time::Clock;

    if let Some(existing) = state.store.load(story_id)? {
        return Ok(existing);
    }
    let initial = CanonicalState::initial(story_id.clone(), SystemClock.now());
    state.store.save(story_id, &initial)?;
    Ok(initial)
}

async fn post_draft_process(State(state): State<AppState>, Json(body): Json<DraftProcessRequest>) -> Result<Json<DraftProcessResponse>, ServiceError> {
    let story_id = StoryId::new(body.story_id);
    let lock = state.story_locks.lock_for(&story_id);
    let _guard = lock.lock().await;

    let store = state.store.clone();
    let llm = state.llm.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let clock = SystemClock;
        orchestrator::process_draft(&store, llm.as_ref(), &clock, &story_id, &body.user_message, &body.assistant_draft)
    })
    .await
    .map_err(|e| ServiceError::BadRequest(e.to_string()))??;

    Ok(Json(outcome.into()))
}

async fn post_rag_query(Json(_body): Json<RagQueryRequest>) -> ServiceError {
    ServiceError::RagUnavailable
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_label_matches_the_documented_names() {
        assert_eq!(action_label(Action::Pass), "pass");
        assert_eq!(action_label(Action::AutoFix), "auto_fix");
        assert_eq!(action_label(Action::Rewrite), "rewrite");
        assert_eq!(action_label(Action::AskUser), "ask_user");
    }
}
