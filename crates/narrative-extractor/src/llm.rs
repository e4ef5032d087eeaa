// crates/narrative-extractor/src/llm.rs
// ============================================================================
// Module: HTTP LLM Client
// Description: An `LLMClient` implementation backed by an OpenAI-compatible
//              chat-completions endpoint.
// Purpose: Give the extractor a concrete transport without coupling the
//          core's `LLMClient` trait to any particular provider.
// Dependencies: narrative-core, reqwest
// ============================================================================

//! ## Overview
//! One blocking [`reqwest::blocking::Client`], built once and reused,
//! mirroring the bounded-client-with-fixed-policy shape used elsewhere in
//! this codebase for outbound HTTP. `call_with_tool` requests a forced
//! function call; `call_with_json` requests `json_object` mode. Both run at
//! `temperature = 0.3` — low enough for consistent extraction without
//! collapsing to a single deterministic completion.

use std::time::Duration;

use narrative_core::interfaces::ChatMessage;
use narrative_core::interfaces::LLMClient;
use narrative_core::interfaces::LlmError;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use serde_json::json;

/// Temperature used for every extraction call.
const EXTRACTION_TEMPERATURE: f64 = 0.3;

/// Configuration for [`HttpLlmClient`].
#[derive(Debug, Clone)]
pub struct HttpLlmConfig {
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Base URL of the OpenAI-compatible endpoint, e.g.
    /// `https://api.openai.com/v1`.
    pub base_url: String,
    /// Model name passed in the request body.
    pub model: String,
    /// Request timeout.
    pub timeout_ms: u64,
}

impl Default for HttpLlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_ms: 30_000,
        }
    }
}

/// Blocking HTTP-backed [`LLMClient`].
pub struct HttpLlmClient {
    config: HttpLlmConfig,
    client: Client,
}

/// Parses `raw` as JSON, falling back to stripping a surrounding markdown
/// code fence (`` ```json `` or plain `` ``` ``) when the first parse fails
///.
pub fn parse_json_with_fence_fallback(raw: &str) -> Result<serde_json::Value, LlmError> {
    if let Ok(value) = serde_json::from_str(raw) {
        return Ok(value);
    }

    let trimmed = raw.trim();
    let cleaned = if let Some(start) = trimmed.find("```json") {
        let body_start = start + "```json".len();
        trimmed[body_start..].find("```").map(|end| trimmed[body_start..body_start + end].trim())
    } else if let Some(start) = trimmed.find("```") {
        let body_start = start + "```".len();
        trimmed[body_start..].find("```").map(|end| trimmed[body_start..body_start + end].trim())
    } else {
        None
    };

    let Some(cleaned) = cleaned else {
        return Err(LlmError::SchemaMismatch(format!(
            "content was not valid JSON and carried no recognisable fence: {}",
            raw.chars().take(200).collect::<String>()
        )));
    };

    serde_json::from_str(cleaned).map_err(|e| {
        LlmError::SchemaMismatch(format!(
            "content was not valid JSON after fence stripping: {e}. content: {}",
            raw.chars().take(200).collect::<String>()
        ))
    })
}

impl HttpLlmClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Transport`] when the HTTP client cannot be built.
    pub fn new(config: HttpLlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent("narrative-consistency-engine/0.1")
            .redirect(Policy::none())
            .build()
            .map_err(|e| LlmError::Transport(format!("http client build failed: {e}")))?;
        Ok(Self { config, client })
    }

    fn messages_json(messages: &[ChatMessage]) -> serde_json::Value {
        json!(messages
            .iter()
            .map(|m| json!({"role": m.role, "content": m.content}))
            .collect::<Vec<_>>())
    }

    fn post_chat(&self, body: serde_json::Value) -> Result<serde_json::Value, LlmError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .map_err(|e| LlmError::Transport(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(LlmError::Transport(format!("non-success status: {}", response.status())));
        }

        let payload: serde_json::Value = response
            .json()
            .map_err(|e| LlmError::Transport(format!("response body was not JSON: {e}")))?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::SchemaMismatch("response had no message content".to_string()))?;

        parse_json_with_fence_fallback(content)
    }
}

impl LLMClient for HttpLlmClient {
    fn call_with_tool(&self, messages: &[ChatMessage], tool_schema: &serde_json::Value) -> Result<serde_json::Value, LlmError> {
        let body = json!({
            "model": self.config.model,
            "messages": Self::messages_json(messages),
            "temperature": EXTRACTION_TEMPERATURE,
            "tools": [{
                "type": "function",
                "function": {
                    "name": "event_extraction",
                    "parameters": tool_schema,
                }
            }],
            "tool_choice": {"type": "function", "function": {"name": "event_extraction"}},
        });

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .map_err(|e| LlmError::Transport(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(LlmError::Transport(format!("non-success status: {}", response.status())));
        }

        let payload: serde_json::Value = response
            .json()
            .map_err(|e| LlmError::Transport(format!("response body was not JSON: {e}")))?;

        let arguments = payload["choices"][0]["message"]["tool_calls"][0]["function"]["arguments"]
            .as_str()
            .ok_or_else(|| LlmError::SchemaMismatch("response had no tool call arguments".to_string()))?;

        parse_json_with_fence_fallback(arguments)
    }

    fn call_with_json(&self, messages: &[ChatMessage], _schema: &serde_json::Value) -> Result<serde_json::Value, LlmError> {
        let body = json!({
            "model": self.config.model,
            "messages": Self::messages_json(messages),
            "temperature": EXTRACTION_TEMPERATURE,
            "response_format": {"type": "json_object"},
        });
        self.post_chat(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_json() {
        let value = parse_json_with_fence_fallback(r#"{"events": []}"#).unwrap();
        assert_eq!(value["events"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn strips_json_fence() {
        let raw = "```json\n{\"events\": []}\n```";
        let value = parse_json_with_fence_fallback(raw).unwrap();
        assert!(value["events"].as_array().is_some());
    }

    #[test]
    fn strips_bare_fence() {
        let raw = "```\n{\"events\": []}\n```";
        let value = parse_json_with_fence_fallback(raw).unwrap();
        assert!(value["events"].as_array().is_some());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_json_with_fence_fallback("not json at all").is_err());
    }
}
