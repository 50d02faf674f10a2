//! OpenAI-compatible request and response types
//!
//! These types follow the OpenAI Chat Completions API. Requests are
//! translated into the upstream's single-prompt format by
//! [`ChatCompletionRequest::to_upstream_prompt`].

use crate::models::ModelAlias;
use serde::{Deserialize, Serialize};

// =============================================================================
// OpenAI API Object Type Constants
// =============================================================================

/// Object type for non-streaming chat completion responses
pub const OBJECT_CHAT_COMPLETION: &str = "chat.completion";
/// Object type for streaming chat completion chunks
pub const OBJECT_CHAT_COMPLETION_CHUNK: &str = "chat.completion.chunk";
/// Object type for list responses (e.g., model list)
pub const OBJECT_LIST: &str = "list";
/// Object type for individual model entries
pub const OBJECT_MODEL: &str = "model";

// =============================================================================
// Message Types
// =============================================================================

/// Message role in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    /// Role label used in the upstream prompt
    ///
    /// The upstream has no system role, so system messages are sent as user.
    pub fn upstream_role(&self) -> &'static str {
        match self {
            MessageRole::System | MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// One element of a structured content list
///
/// Only a string `text` field is meaningful; images and other part types
/// deserialize with `text: None` and contribute nothing to the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value")]
pub struct ContentFragment {
    pub text: Option<String>,
}

impl From<serde_json::Value> for ContentFragment {
    fn from(value: serde_json::Value) -> Self {
        Self {
            text: value
                .get("text")
                .and_then(|t| t.as_str())
                .map(str::to_string),
        }
    }
}

/// Message content: a plain string or a list of fragments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Fragments(Vec<ContentFragment>),
    /// Any other JSON shape, rendered as its JSON text
    Other(serde_json::Value),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl MessageContent {
    /// Normalize to plain text
    pub fn to_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Fragments(fragments) => fragments
                .iter()
                .filter_map(|f| f.text.as_deref())
                .collect(),
            MessageContent::Other(serde_json::Value::Null) => String::new(),
            MessageContent::Other(value) => value.to_string(),
        }
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

/// A single message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    role: MessageRole,
    #[serde(default)]
    content: MessageContent,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Get the role
    pub fn role(&self) -> MessageRole {
        self.role
    }

    /// Get the raw content
    pub fn content(&self) -> &MessageContent {
        &self.content
    }

    /// Render as one upstream prompt line: `<role>:<content>;\r\n`
    pub fn to_prompt_line(&self) -> String {
        format!(
            "{}:{};\r\n",
            self.role.upstream_role(),
            self.content.to_text()
        )
    }
}

// =============================================================================
// Chat Completion Request
// =============================================================================

/// OpenAI-compatible chat completion request
///
/// Only `model`, `messages` and `stream` are interpreted; sampling parameters
/// are accepted and ignored because the upstream does not take them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    model: String,
    #[serde(default)]
    messages: Vec<ChatMessage>,
    #[serde(default)]
    stream: bool,
}

impl ChatCompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>, stream: bool) -> Self {
        Self {
            model: model.into(),
            messages,
            stream,
        }
    }

    /// Model name as sent by the client
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Resolved model alias
    pub fn model_alias(&self) -> ModelAlias {
        ModelAlias::resolve(&self.model)
    }

    /// Get the messages
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Check if streaming is enabled
    pub fn stream(&self) -> bool {
        self.stream
    }

    /// Flatten every message into the upstream's single prompt
    ///
    /// Order is preserved and nothing is truncated. The result is always sent
    /// upstream as one user message.
    pub fn to_upstream_prompt(&self) -> String {
        self.messages.iter().map(ChatMessage::to_prompt_line).collect()
    }
}

// =============================================================================
// Upstream Request Body
// =============================================================================

/// Message in the body sent to the upstream chat endpoint
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

/// Body sent to the upstream chat endpoint
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<UpstreamMessage<'a>>,
}

impl<'a> UpstreamChatRequest<'a> {
    /// Wrap a flattened prompt as a single user message
    pub fn new(model: &'a str, prompt: &'a str) -> Self {
        Self {
            model,
            messages: vec![UpstreamMessage {
                role: "user",
                content: prompt,
            }],
        }
    }
}

// =============================================================================
// Chat Completion Response (Non-Streaming)
// =============================================================================

/// Finish reason for a completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
}

/// Usage statistics for a chat completion response.
///
/// Token counts are not computed; every field is reported as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Assistant message in response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub role: MessageRole,
    pub content: String,
}

impl AssistantMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// A single choice in the response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: FinishReason,
}

/// OpenAI-compatible chat completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

impl ChatCompletion {
    /// Create the aggregate response for a finished upstream reply
    pub fn new(id: &str, model: &str, created: i64, content: String) -> Self {
        Self {
            id: id.to_string(),
            object: OBJECT_CHAT_COMPLETION.to_string(),
            created,
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message: AssistantMessage::new(content),
                finish_reason: FinishReason::Stop,
            }],
            usage: Usage::default(),
        }
    }
}

/// Generate a completion id in OpenAI's `chatcmpl-...` format
pub fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

/// Identity shared by every object emitted for one completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionMeta {
    pub id: String,
    pub model: String,
    pub created: i64,
}

impl CompletionMeta {
    /// Fresh id and creation time for a completion served by `model`
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: completion_id(),
            model: model.into(),
            created: current_timestamp(),
        }
    }

    pub fn content_chunk(&self, content: &str) -> ChatCompletionChunk {
        ChatCompletionChunk::content(&self.id, &self.model, self.created, content)
    }

    pub fn finish_chunk(&self) -> ChatCompletionChunk {
        ChatCompletionChunk::finish(&self.id, &self.model, self.created)
    }

    pub fn completion(&self, content: String) -> ChatCompletion {
        ChatCompletion::new(&self.id, &self.model, self.created, content)
    }
}

/// Get the current Unix timestamp for response creation.
///
/// Returns 0 and logs a warning if the system clock is before the epoch.
pub fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_else(|e| {
            tracing::warn!(
                error = %e,
                "System clock appears to be before UNIX epoch - using 0 as timestamp"
            );
            0
        })
}

// =============================================================================
// Chat Completion Chunk (Streaming)
// =============================================================================

/// Delta content in a streaming chunk
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// A single choice in a streaming chunk
///
/// `finish_reason` is always serialized, as `null` on content chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<FinishReason>,
}

/// OpenAI-compatible streaming chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

impl ChatCompletionChunk {
    /// Create a content chunk
    pub fn content(id: &str, model: &str, created: i64, content: &str) -> Self {
        Self::with_choice(
            id,
            model,
            created,
            ChunkChoice {
                index: 0,
                delta: Delta {
                    content: Some(content.to_string()),
                },
                finish_reason: None,
            },
        )
    }

    /// Create the terminal chunk: empty delta, `finish_reason: "stop"`
    pub fn finish(id: &str, model: &str, created: i64) -> Self {
        Self::with_choice(
            id,
            model,
            created,
            ChunkChoice {
                index: 0,
                delta: Delta::default(),
                finish_reason: Some(FinishReason::Stop),
            },
        )
    }

    fn with_choice(id: &str, model: &str, created: i64, choice: ChunkChoice) -> Self {
        Self {
            id: id.to_string(),
            object: OBJECT_CHAT_COMPLETION_CHUNK.to_string(),
            created,
            model: model.to_string(),
            choices: vec![choice],
        }
    }
}

// =============================================================================
// Models List Response
// =============================================================================

/// A model object for the models list endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelObject {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

impl ModelObject {
    /// Create a new model object
    pub fn new(id: impl Into<String>, owned_by: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object: OBJECT_MODEL.to_string(),
            created: 0,
            owned_by: owned_by.into(),
        }
    }
}

/// Response for GET /v1/models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsListResponse {
    pub object: String,
    pub data: Vec<ModelObject>,
}

impl ModelsListResponse {
    /// Create a models list response
    pub fn new(models: Vec<ModelObject>) -> Self {
        Self {
            object: OBJECT_LIST.to_string(),
            data: models,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
