use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /v1/chat/completions`. Only the fields the gateway reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub messages: Option<Value>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
}

impl ChatCompletionRequest {
    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    /// Text of the last `user` message, if it carries any text.
    pub fn last_user_text(&self) -> Option<String> {
        let messages = self.messages.as_ref()?.as_array()?;
        let last_user = messages
            .iter()
            .filter(|m| m.get("role").and_then(Value::as_str) == Some("user"))
            .last()?;
        content_text(last_user.get("content")?)
    }
}

/// String content as-is; content-part arrays contribute their `text` parts.
fn content_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.join(" "))
            }
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    /// Rough token estimate from the reply length in characters.
    pub fn estimate(content: &str) -> Self {
        let len = content.chars().count() as f64;
        Self {
            prompt_tokens: (len / 4.0).ceil() as u64,
            completion_tokens: (len / 2.0).ceil() as u64,
            total_tokens: (len * 0.75).ceil() as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

/// One step of an assistant reply; streams and full messages are built from these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatFragment {
    Role,
    Content(String),
    Finish(String),
}

impl ChatFragment {
    pub fn into_choice(self) -> ChunkChoice {
        let (delta, finish_reason) = match self {
            ChatFragment::Role => (
                ChunkDelta {
                    role: Some("assistant".to_string()),
                    content: None,
                },
                None,
            ),
            ChatFragment::Content(text) => (
                ChunkDelta {
                    role: None,
                    content: Some(text),
                },
                None,
            ),
            ChatFragment::Finish(reason) => (ChunkDelta::default(), Some(reason)),
        };
        ChunkChoice {
            index: 0,
            delta,
            finish_reason,
        }
    }
}
