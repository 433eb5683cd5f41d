//! Stream chunks emitted by `stream_generate`.

use serde::{Deserialize, Serialize};

use super::output::Usage;
use super::tool::ToolCall;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Partial text.
    Delta {
        #[serde(rename = "textDelta")]
        text_delta: String,
    },

    /// A complete tool call.
    ToolCall { call: ToolCall },

    /// Terminal chunk; always last.
    MessageEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
        #[serde(
            default,
            rename = "finishReason",
            skip_serializing_if = "Option::is_none"
        )]
        finish_reason: Option<String>,
    },
}

impl StreamChunk {
    pub fn delta(text: impl Into<String>) -> Self {
        StreamChunk::Delta {
            text_delta: text.into(),
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, StreamChunk::MessageEnd { .. })
    }
}
