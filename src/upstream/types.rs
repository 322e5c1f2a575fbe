//! Request and response types for the generative Messages endpoint.
//!
//! All structs derive `Serialize` and `Deserialize` for JSON conversion in
//! the shape expected by the `v1/messages` endpoint.

use serde::{Deserialize, Serialize};

/// Request body for the Messages endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model identifier (e.g. "claude-sonnet-4-5-20250929").
    pub model: String,
    /// Maximum number of tokens in the generated response.
    pub max_tokens: u32,
    /// Messages composing the conversation.
    pub messages: Vec<Message>,
}

impl GenerateRequest {
    /// Build a single-turn user request, the only call shape this engine uses.
    pub fn user(model: impl Into<String>, max_tokens: u32, content: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            messages: vec![Message {
                role: "user".into(),
                content: content.into(),
            }],
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Sender role: "user" or "assistant".
    pub role: String,
    /// Text content of the message.
    pub content: String,
}

/// Response returned by the Messages endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Unique identifier assigned by the API.
    pub id: String,
    /// Content blocks in the response (normally text).
    pub content: Vec<ContentBlock>,
    /// Model that produced the response.
    pub model: String,
    /// Why generation stopped (e.g. "end_turn", "max_tokens").
    pub stop_reason: Option<String>,
    /// Token usage counters, input to cost accounting.
    pub usage: Usage,
}

impl GenerateResponse {
    /// Text of the first content block, trimmed. Empty when the response
    /// carried no text.
    pub fn text(&self) -> String {
        self.content
            .first()
            .map(|b| b.text.trim().to_string())
            .unwrap_or_default()
    }
}

/// A content block within the response — currently only text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
    /// Block type ("text"). Serialized as "type" in JSON.
    #[serde(rename = "type")]
    pub content_type: String,
    /// Text content of this block.
    pub text: String,
}

/// Token consumption for one API call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt.
    pub input_tokens: u32,
    /// Tokens produced in the response.
    pub output_tokens: u32,
}
