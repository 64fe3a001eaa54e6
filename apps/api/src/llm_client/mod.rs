//! LLM client: the single point of entry for all generative model calls in examgen.
//!
//! ARCHITECTURAL RULE: No other module may call the model API directly.
//! All model interactions MUST go through the `TextModel` trait defined here.
//!
//! Speaks the OpenAI-compatible chat completions protocol. One call per invocation:
//! no retries, no backoff, no client-side timeout.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
/// Output budget used when configuration does not override it.
pub const DEFAULT_MAX_TOKENS: u32 = 4000;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

// ────────────────────────────────────────────────────────────────────────────
// Model allow-list
// ────────────────────────────────────────────────────────────────────────────

/// The closed set of models a request may select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelId {
    #[serde(rename = "gpt-4o")]
    Gpt4o,
    #[serde(rename = "gpt-4-turbo")]
    Gpt4Turbo,
    #[serde(rename = "gpt-4")]
    Gpt4,
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,
}

impl ModelId {
    pub const ALL: [ModelId; 4] = [
        ModelId::Gpt4o,
        ModelId::Gpt4Turbo,
        ModelId::Gpt4,
        ModelId::Gpt35Turbo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Gpt4o => "gpt-4o",
            ModelId::Gpt4Turbo => "gpt-4-turbo",
            ModelId::Gpt4 => "gpt-4",
            ModelId::Gpt35Turbo => "gpt-3.5-turbo",
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("model '{0}' is not in the allow-list")]
pub struct UnknownModel(pub String);

impl FromStr for ModelId {
    type Err = UnknownModel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ModelId::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownModel(s.to_string()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Call contract
// ────────────────────────────────────────────────────────────────────────────

/// One model invocation. Borrowed so the caller keeps ownership of the prompt.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub model: ModelId,
    pub credential: &'a str,
    pub prompt: &'a str,
    pub max_tokens: u32,
}

/// The model's reply. `text` is `None` when the API returned no content at all.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: Option<String>,
}

impl Completion {
    /// Returns the reply text if it contains anything besides whitespace.
    pub fn non_empty_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// The model trait. Implement this to swap backends without touching the pipeline.
///
/// Carried in `AppState` as `Arc<dyn TextModel>`.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, LlmError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// HTTP client
// ────────────────────────────────────────────────────────────────────────────

/// The production model client. Credentials travel with each request,
/// so a single client serves every caller.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
}

impl LlmClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl TextModel for LlmClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, LlmError> {
        let body = ChatRequest {
            model: request.model.as_str(),
            messages: vec![ChatMessage {
                role: "user",
                content: request.prompt,
            }],
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(request.credential)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: extract_api_error(&body),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        if let Some(usage) = &parsed.usage {
            debug!(
                model = %request.model,
                prompt_tokens = ?usage.prompt_tokens,
                completion_tokens = ?usage.completion_tokens,
                "model call succeeded"
            );
        }

        Ok(Completion {
            text: parsed
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content),
        })
    }
}

/// Pulls `error.message` out of an API error body, falling back to the raw body.
fn extract_api_error(body: &str) -> String {
    serde_json::from_str::<ApiErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}

/// Returns the body of the first ``` fenced block, or the whole reply trimmed when
/// there is none. Prose before or after the block is dropped. An unterminated
/// fence runs to the end of the reply.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let rest = &trimmed[open + 3..];
    // Drop an info string ("latex", "tex", ...) on the opening fence line.
    let body = match rest.find('\n') {
        Some(idx) if is_info_string(&rest[..idx]) => &rest[idx + 1..],
        _ => rest,
    };
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

fn is_info_string(s: &str) -> bool {
    s.trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '_'))
}

// ────────────────────────────────────────────────────────────────────────────
// Test double
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// A recorded model call.
    #[derive(Debug, Clone)]
    pub struct RecordedCall {
        pub model: ModelId,
        pub credential: String,
        pub prompt: String,
        pub max_tokens: u32,
    }

    /// Scripted reply for the next call.
    pub enum Scripted {
        Text(String),
        Empty,
        Fail(u16, String),
    }

    /// In-memory `TextModel` that replays scripted replies in order and records
    /// every call it receives. Unscripted calls return an empty completion.
    #[derive(Default)]
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<Scripted>>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl ScriptedModel {
        pub fn new(replies: Vec<Scripted>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn replying(texts: &[&str]) -> Self {
            Self::new(texts.iter().map(|t| Scripted::Text(t.to_string())).collect())
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TextModel for ScriptedModel {
        async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, LlmError> {
            self.calls.lock().unwrap().push(RecordedCall {
                model: request.model,
                credential: request.credential.to_string(),
                prompt: request.prompt.to_string(),
                max_tokens: request.max_tokens,
            });
            match self.replies.lock().unwrap().pop_front() {
                Some(Scripted::Text(text)) => Ok(Completion { text: Some(text) }),
                Some(Scripted::Empty) | None => Ok(Completion { text: None }),
                Some(Scripted::Fail(status, message)) => Err(LlmError::Api { status, message }),
            }
        }
    }
}
