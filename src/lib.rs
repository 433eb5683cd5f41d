//! # ai-kit
//!
//! 多厂商生成式 AI 客户端工具包：统一的请求/响应类型、重试与错误分类、以及夹具测试替身。
//!
//! Multi-provider client toolkit for generative-AI backends. Callers build a
//! uniform request, hand it to a provider adapter, and get back a normalized
//! output or a classified [`Error`].
//!
//! ## Providers
//!
//! | Provider | Adapter | Operations |
//! |----------|---------|------------|
//! | Replicate | [`providers::ReplicateClient`] | image generation, background removal, multi-view, depth |
//! | Gemini | [`providers::GeminiImageClient`] | image editing |
//! | Meshy | [`providers::MeshyClient`] | image-to-3D mesh |
//! | Local Whisper | [`local::LocalWhisperAdapter`] | speech transcription |
//! | Fixtures | [`testing::FixtureAdapter`] | deterministic replay for tests |
//!
//! ## Cross-cutting behavior
//!
//! - **Retry**: vendor calls run inside a [`resilience::Retrier`] with
//!   exponential backoff, jitter and provider-specific classification.
//! - **Errors**: every failure carries an [`ErrorPayload`] with a closed
//!   [`ErrorKind`]; upstream HTTP statuses map through [`classify_status`].
//! - **Output coercion**: heterogeneous vendor results go through
//!   [`output::OutputCoercer`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_kit::{ImageGenerateInput, ImageInput, Kit, KitConfig};
//!
//! #[tokio::main]
//! async fn main() -> ai_kit::Result<()> {
//!     let kit = Kit::from_config(&KitConfig::from_env())?;
//!     let input = ImageGenerateInput::new("gemini", "gemini-2.5-flash-image", "make the sky purple")
//!         .with_image(ImageInput::from_path("photo.png"));
//!     let out = kit.generate_image(&input).await?;
//!     println!("{} image(s)", out.images.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapter`] | The [`ProviderAdapter`] trait |
//! | [`kit`] | Provider routing hub and kit cache |
//! | [`cache`] | Per-key instance registry |
//! | [`config`] | Configuration from defaults, env and YAML |
//! | [`credentials`] | API key resolution |
//! | [`transport`] | HTTP helpers with classified errors |
//! | [`resilience`] | Backoff, retry classification, retry executor |
//! | [`output`] | Output coercion and grid splitting |
//! | [`providers`] | Replicate, Gemini and Meshy clients |
//! | [`local`] | Local Whisper transcription |
//! | [`testing`] | Fixture harness |
//! | [`types`] | Requests, outputs, stream chunks |

pub mod adapter;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod error;
pub mod error_kind;
pub mod kit;
pub mod local;
pub mod output;
pub mod providers;
pub mod resilience;
pub mod testing;
pub mod transport;
pub mod types;

pub use adapter::ProviderAdapter;
pub use config::KitConfig;
pub use error::{Error, ErrorPayload};
pub use error_kind::{classify_status, ErrorKind};
pub use kit::{get_cached_kit, invalidate_cached_kit, list_provider_models, Kit};
pub use types::{
    AudioInput, GenerateInput, GenerateOutput, ImageArtifact, ImageGenerateInput,
    ImageGenerateOutput, ImageInput, MeshGenerateInput, MeshGenerateOutput, Message, MessageRole,
    ModelMetadata, StreamChunk, ToolCall, ToolDefinition, TranscribeInput, TranscribeOutput,
    TranscriptSegment, Usage,
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A pinned, boxed, one-shot stream of `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;
