//! 适配器抽象层：通过 trait 统一各厂商的调用接口
//!
//! Provider adapter abstraction. Every backend (Replicate, Gemini, Meshy,
//! local Whisper, the fixture test double) implements [`ProviderAdapter`];
//! callers hold `Arc<dyn ProviderAdapter>` and invoke the same operations
//! regardless of provider.
//!
//! Operations a provider does not offer keep the default implementation,
//! which fails with a `Validation` error naming the provider and operation.

use async_trait::async_trait;

use crate::error::ErrorPayload;
use crate::error_kind::ErrorKind;
use crate::types::{
    GenerateInput, GenerateOutput, ImageGenerateInput, ImageGenerateOutput, MeshGenerateInput,
    MeshGenerateOutput, ModelMetadata, StreamChunk, TranscribeInput, TranscribeOutput,
};
use crate::{BoxStream, Error, Result};

/// Operation names used in errors, fixture keys and model capabilities.
pub mod operation {
    pub const GENERATE: &str = "generate";
    pub const STREAM: &str = "stream";
    pub const IMAGE: &str = "image";
    pub const MESH: &str = "mesh";
    pub const TRANSCRIBE: &str = "transcribe";
}

pub(crate) fn unsupported(provider: &str, op: &str) -> Error {
    Error::Kit(
        ErrorPayload::new(
            ErrorKind::Validation,
            format!("Provider '{}' does not support {}", provider, op),
        )
        .with_provider(provider),
    )
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider identifier, e.g. `"replicate"`.
    fn provider(&self) -> &str;

    async fn list_models(&self) -> Result<Vec<ModelMetadata>> {
        Ok(Vec::new())
    }

    async fn generate(&self, _input: &GenerateInput) -> Result<GenerateOutput> {
        Err(unsupported(self.provider(), operation::GENERATE))
    }

    /// Lazily produced, one-shot chunk stream.
    async fn stream_generate(
        &self,
        _input: &GenerateInput,
    ) -> Result<BoxStream<'static, StreamChunk>> {
        Err(unsupported(self.provider(), operation::STREAM))
    }

    async fn generate_image(&self, _input: &ImageGenerateInput) -> Result<ImageGenerateOutput> {
        Err(unsupported(self.provider(), operation::IMAGE))
    }

    async fn generate_mesh(&self, _input: &MeshGenerateInput) -> Result<MeshGenerateOutput> {
        Err(unsupported(self.provider(), operation::MESH))
    }

    async fn transcribe(&self, _input: &TranscribeInput) -> Result<TranscribeOutput> {
        Err(unsupported(self.provider(), operation::TRANSCRIBE))
    }
}
