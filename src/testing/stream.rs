use crate::types::{GenerateOutput, StreamChunk};

pub const DEFAULT_CHUNK_SIZE: i64 = 24;

/// Splits `text` into pieces of `chunk_size` characters. Empty text gives no
/// pieces; a non-positive size gives the whole text as one piece.
fn chunk_text(text: &str, chunk_size: i64) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    if chunk_size <= 0 {
        return vec![text.to_string()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_size as usize)
        .map(|c| c.iter().collect())
        .collect()
}

/// Synthesizes the chunk sequence a streaming call would have produced:
/// text deltas, then tool calls in order, then exactly one `message_end`.
pub fn build_stream_chunks(output: &GenerateOutput, chunk_size: i64) -> Vec<StreamChunk> {
    let mut chunks: Vec<StreamChunk> = output
        .text
        .as_deref()
        .map(|t| chunk_text(t, chunk_size))
        .unwrap_or_default()
        .into_iter()
        .map(StreamChunk::delta)
        .collect();
    chunks.extend(
        output
            .tool_calls
            .iter()
            .cloned()
            .map(|call| StreamChunk::ToolCall { call }),
    );
    chunks.push(StreamChunk::MessageEnd {
        usage: output.usage.clone(),
        finish_reason: output.finish_reason.clone(),
    });
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ToolCall, Usage};
    use serde_json::json;

    fn deltas(chunks: &[StreamChunk]) -> Vec<String> {
        chunks
            .iter()
            .filter_map(|c| match c {
                StreamChunk::Delta { text_delta } => Some(text_delta.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_chunk_count_and_concatenation() {
        let text = "a".repeat(50);
        let chunks = build_stream_chunks(&GenerateOutput::text(text.clone()), 24);
        let d = deltas(&chunks);
        assert_eq!(d.len(), 3);
        assert_eq!(d.concat(), text);
        assert!(chunks.last().unwrap().is_end());
    }

    #[test]
    fn test_multibyte_chars_split_by_char() {
        let d = deltas(&build_stream_chunks(&GenerateOutput::text("héllo wörld"), 4));
        assert_eq!(d, vec!["héll", "o wö", "rld"]);
    }

    #[test]
    fn test_nonpositive_size_is_single_chunk() {
        let d = deltas(&build_stream_chunks(&GenerateOutput::text("abcdef"), 0));
        assert_eq!(d, vec!["abcdef"]);
        let d = deltas(&build_stream_chunks(&GenerateOutput::text("abcdef"), -3));
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn test_empty_text_tool_calls_and_end() {
        let output = GenerateOutput {
            text: Some(String::new()),
            tool_calls: vec![
                ToolCall::new("1", "search", json!({"q": "rust"})),
                ToolCall::new("2", "open", json!({})),
            ],
            usage: Some(Usage {
                input_tokens: 3,
                output_tokens: 4,
                total_tokens: 7,
            }),
            finish_reason: Some("tool_calls".into()),
            raw: None,
        };
        let chunks = build_stream_chunks(&output, 24);
        assert_eq!(chunks.len(), 3);
        assert!(matches!(&chunks[0], StreamChunk::ToolCall { call } if call.id == "1"));
        assert!(matches!(&chunks[1], StreamChunk::ToolCall { call } if call.id == "2"));
        match &chunks[2] {
            StreamChunk::MessageEnd { usage, finish_reason } => {
                assert_eq!(usage.as_ref().map(|u| u.total_tokens), Some(7));
                assert_eq!(finish_reason.as_deref(), Some("tool_calls"));
            }
            other => panic!("unexpected chunk {:?}", other),
        }
    }
}
