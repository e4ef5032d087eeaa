// crates/narrative-config/src/lib.rs
// ============================================================================
// Crate: narrative-config
// Description: Environment-variable configuration loader for the narrative
//              consistency engine.
// Purpose: Give `narrative-cli` a single, fail-closed place to resolve LLM
//          credentials, storage paths, and RAG index location.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! A small configuration surface: there is no config file, only
//! environment variables, and no policy/schema/docs generation. The loader
//! is still fail-closed — [`EngineConfig::from_env`] refuses to return a
//! config with missing credentials rather than defaulting to an unusable
//! client.

use std::env;

use thiserror::Error;

// ============================================================================
// SECTION: Environment Variable Names
// ============================================================================

/// LLM API key (required).
pub const ENV_LLM_API_KEY: &str = "NARRATIVE_LLM_API_KEY";
/// LLM base URL (optional, defaults to the OpenAI API).
pub const ENV_LLM_BASE_URL: &str = "NARRATIVE_LLM_BASE_URL";
/// LLM model name (optional).
pub const ENV_LLM_MODEL: &str = "NARRATIVE_LLM_MODEL";
/// `SQLite` database path (optional).
pub const ENV_STATE_DB_PATH: &str = "NARRATIVE_STATE_DB_PATH";
/// RAG index directory (optional).
pub const ENV_RAG_INDEX_DIR: &str = "NARRATIVE_RAG_INDEX_DIR";

const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
const DEFAULT_STATE_DB_PATH: &str = "./data/narrative.db";
const DEFAULT_RAG_INDEX_DIR: &str = "./data/indices";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while resolving [`EngineConfig`] from the environment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable was not set.
    #[error("missing required environment variable: {0}")]
    MissingCredentials(&'static str),
    /// An environment variable was set but not valid UTF-8.
    #[error("environment variable {0} is not valid UTF-8")]
    InvalidEncoding(&'static str),
}

// ============================================================================
// SECTION: Engine Config
// ============================================================================

/// Recognised environment configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// LLM API key.
    pub llm_api_key: String,
    /// LLM base URL.
    pub llm_base_url: String,
    /// LLM model name.
    pub llm_model: String,
    /// `SQLite` state store path.
    pub state_db_path: String,
    /// RAG index directory.
    pub rag_index_dir: String,
}

impl EngineConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredentials`] when
    /// [`ENV_LLM_API_KEY`] is unset, or [`ConfigError::InvalidEncoding`]
    /// when any recognised variable is set but not valid UTF-8.
    pub fn from_env() -> Result<Self, ConfigError> {
        let llm_api_key = required_var(ENV_LLM_API_KEY)?;
        let llm_base_url = optional_var(ENV_LLM_BASE_URL, DEFAULT_LLM_BASE_URL)?;
        let llm_model = optional_var(ENV_LLM_MODEL, DEFAULT_LLM_MODEL)?;
        let state_db_path = optional_var(ENV_STATE_DB_PATH, DEFAULT_STATE_DB_PATH)?;
        let rag_index_dir = optional_var(ENV_RAG_INDEX_DIR, DEFAULT_RAG_INDEX_DIR)?;

        Ok(Self {
            llm_api_key,
            llm_base_url,
            llm_model,
            state_db_path,
            rag_index_dir,
        })
    }
}

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        Ok(_) => Err(ConfigError::MissingCredentials(name)),
        Err(env::VarError::NotPresent) => Err(ConfigError::MissingCredentials(name)),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidEncoding(name)),
    }
}

fn optional_var(name: &'static str, default: &str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        Ok(_) => Ok(default.to_string()),
        Err(env::VarError::NotPresent) => Ok(default.to_string()),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidEncoding(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that mutate
    // them so they don't race each other under the default test harness.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_all() {
        for key in [ENV_LLM_API_KEY, ENV_LLM_BASE_URL, ENV_LLM_MODEL, ENV_STATE_DB_PATH, ENV_RAG_INDEX_DIR] {
            env::remove_var(key);
        }
    }

    #[test]
    fn missing_api_key_fails_closed() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        clear_all();
        let err = EngineConfig::from_env().unwrap_err();
        assert_eq!(err, ConfigError::MissingCredentials(ENV_LLM_API_KEY));
    }

    #[test]
    fn defaults_apply_when_optional_vars_unset() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        clear_all();
        env::set_var(ENV_LLM_API_KEY, "sk-test-key");
        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.llm_api_key, "sk-test-key");
        assert_eq!(config.llm_base_url, DEFAULT_LLM_BASE_URL);
        assert_eq!(config.llm_model, DEFAULT_LLM_MODEL);
        assert_eq!(config.state_db_path, DEFAULT_STATE_DB_PATH);
        assert_eq!(config.rag_index_dir, DEFAULT_RAG_INDEX_DIR);
        clear_all();
    }

    #[test]
    fn explicit_overrides_win_over_defaults() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        clear_all();
        env::set_var(ENV_LLM_API_KEY, "sk-test-key");
        env::set_var(ENV_LLM_MODEL, "gpt-4o");
        env::set_var(ENV_STATE_DB_PATH, "/tmp/custom.db");
        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.llm_model, "gpt-4o");
        assert_eq!(config.state_db_path, "/tmp/custom.db");
        clear_all();
    }
}
