//! 类型模块：请求、输出、流式块与模型元数据。
//!
//! # Types Module
//!
//! Shared request/response shapes used by every adapter.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`request`] | Per-operation inputs (generate, image, mesh, transcribe) |
//! | [`output`] | Normalized outputs and transcript segments |
//! | [`stream`] | Stream chunks (`delta`, `tool_call`, `message_end`) |
//! | [`message`] | Chat messages |
//! | [`tool`] | Tool definitions and calls |
//! | [`model`] | Model listing metadata |

pub mod message;
pub mod model;
pub mod output;
pub mod request;
pub mod stream;
pub mod tool;

pub use message::{Message, MessageRole};
pub use model::ModelMetadata;
pub use output::{
    GenerateOutput, ImageArtifact, ImageGenerateOutput, MeshGenerateOutput, TranscribeOutput,
    TranscriptSegment, Usage,
};
pub use request::{
    AudioInput, GenerateInput, ImageGenerateInput, ImageInput, MeshGenerateInput, Parameters,
    TranscribeInput,
};
pub use stream::StreamChunk;
pub use tool::{ToolCall, ToolDefinition};
