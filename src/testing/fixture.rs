use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::key::{fixture_key, FixtureInput, FixtureKeyInput};
use super::stream::{build_stream_chunks, DEFAULT_CHUNK_SIZE};
use crate::adapter::{operation, ProviderAdapter};
use crate::types::{
    GenerateInput, GenerateOutput, ImageGenerateInput, ImageGenerateOutput, MeshGenerateInput,
    MeshGenerateOutput, ModelMetadata, StreamChunk,
};
use crate::{BoxStream, Error, Result};

/// Canned outputs for one fixture key. `stream` wins over synthesizing chunks
/// from `generate`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate: Option<GenerateOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<Vec<StreamChunk>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageGenerateOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<MeshGenerateOutput>,
}

/// Inputs received by a [`FixtureAdapter`], per operation, in call order.
#[derive(Debug, Clone, Default)]
pub struct FixtureCalls {
    pub generate: Vec<GenerateInput>,
    pub stream_generate: Vec<GenerateInput>,
    pub generate_image: Vec<ImageGenerateInput>,
    pub generate_mesh: Vec<MeshGenerateInput>,
}

pub type KeyFn = Arc<dyn Fn(&FixtureKeyInput) -> String + Send + Sync>;

/// Loads a fixture table from a JSON file (`{key: FixtureEntry}`).
pub fn load_fixtures(path: impl AsRef<Path>) -> Result<HashMap<String, FixtureEntry>> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&raw)?)
}

/// Deterministic adapter replaying canned outputs by fixture key.
pub struct FixtureAdapter {
    provider: String,
    fixtures: HashMap<String, FixtureEntry>,
    models: Vec<ModelMetadata>,
    key_fn: KeyFn,
    default_chunk_size: i64,
    calls: Mutex<FixtureCalls>,
}

impl FixtureAdapter {
    pub fn new(provider: impl Into<String>, fixtures: HashMap<String, FixtureEntry>) -> Self {
        Self {
            provider: provider.into(),
            fixtures,
            models: Vec::new(),
            key_fn: Arc::new(fixture_key),
            default_chunk_size: DEFAULT_CHUNK_SIZE,
            calls: Mutex::new(FixtureCalls::default()),
        }
    }

    pub fn with_models(mut self, models: Vec<ModelMetadata>) -> Self {
        self.models = models;
        self
    }

    pub fn with_key_fn(mut self, key_fn: impl Fn(&FixtureKeyInput) -> String + Send + Sync + 'static) -> Self {
        self.key_fn = Arc::new(key_fn);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: i64) -> Self {
        self.default_chunk_size = chunk_size;
        self
    }

    /// Snapshot of the recorded calls.
    pub fn calls(&self) -> FixtureCalls {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, f: impl FnOnce(&mut FixtureCalls)) {
        if let Ok(mut calls) = self.calls.lock() {
            f(&mut calls);
        }
    }

    fn key<I: FixtureInput>(&self, kind: &str, input: &I) -> Result<String> {
        Ok((self.key_fn)(&FixtureKeyInput::new(kind, input)?))
    }

    fn entry<I: FixtureInput>(&self, kind: &str, input: &I) -> Result<(&FixtureEntry, String)> {
        let key = self.key(kind, input)?;
        match self.fixtures.get(&key) {
            Some(entry) => Ok((entry, key)),
            None => Err(
                Error::validation(format!("Fixture not found (key: {}).", key))
                    .with_provider(&self.provider),
            ),
        }
    }

    fn missing(&self, kind: &str, key: &str) -> Error {
        Error::validation(format!("Fixture for {} is missing (key: {}).", kind, key))
            .with_provider(&self.provider)
    }
}

#[async_trait]
impl ProviderAdapter for FixtureAdapter {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn list_models(&self) -> Result<Vec<ModelMetadata>> {
        Ok(self.models.clone())
    }

    async fn generate(&self, input: &GenerateInput) -> Result<GenerateOutput> {
        self.record(|c| c.generate.push(input.clone()));
        let (entry, key) = self.entry(operation::GENERATE, input)?;
        entry
            .generate
            .clone()
            .ok_or_else(|| self.missing(operation::GENERATE, &key))
    }

    async fn stream_generate(
        &self,
        input: &GenerateInput,
    ) -> Result<BoxStream<'static, StreamChunk>> {
        self.record(|c| c.stream_generate.push(input.clone()));
        let (entry, key) = self.entry(operation::STREAM, input)?;
        let chunks = match (&entry.stream, &entry.generate) {
            (Some(chunks), _) => chunks.clone(),
            (None, Some(output)) => build_stream_chunks(output, self.default_chunk_size),
            (None, None) => return Err(self.missing(operation::STREAM, &key)),
        };
        Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))))
    }

    async fn generate_image(&self, input: &ImageGenerateInput) -> Result<ImageGenerateOutput> {
        self.record(|c| c.generate_image.push(input.clone()));
        let (entry, key) = self.entry(operation::IMAGE, input)?;
        entry
            .image
            .clone()
            .ok_or_else(|| self.missing(operation::IMAGE, &key))
    }

    async fn generate_mesh(&self, input: &MeshGenerateInput) -> Result<MeshGenerateOutput> {
        self.record(|c| c.generate_mesh.push(input.clone()));
        let (entry, key) = self.entry(operation::MESH, input)?;
        entry
            .mesh
            .clone()
            .ok_or_else(|| self.missing(operation::MESH, &key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_kind::ErrorKind;
    use crate::types::{ImageArtifact, ImageInput, Message};
    use futures::StreamExt;

    fn input(text: &str) -> GenerateInput {
        GenerateInput::new("fixture", "m", vec![Message::user(text)])
    }

    fn key(kind: &str, input: &GenerateInput) -> String {
        fixture_key(&FixtureKeyInput::new(kind, input).unwrap())
    }

    #[tokio::test]
    async fn test_generate_replays_and_records() {
        let req = input("hi");
        let mut fixtures = HashMap::new();
        fixtures.insert(
            key("generate", &req),
            FixtureEntry {
                generate: Some(GenerateOutput::text("hello")),
                ..Default::default()
            },
        );
        let adapter = FixtureAdapter::new("fixture", fixtures);
        let out = adapter.generate(&req).await.unwrap();
        assert_eq!(out.text.as_deref(), Some("hello"));
        assert_eq!(adapter.calls().generate, vec![req]);
    }

    #[tokio::test]
    async fn test_missing_fixture_still_records_call() {
        let adapter = FixtureAdapter::new("fixture", HashMap::new());
        let req = input("unknown");
        let err = adapter.generate(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.provider(), Some("fixture"));
        assert_eq!(
            err.message(),
            format!("Fixture not found (key: {}).", key("generate", &req))
        );
        assert_eq!(adapter.calls().generate.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_slot_message() {
        let req = ImageGenerateInput::new("fixture", "img", "cat").with_image(ImageInput::from_url("https://x/y.png"));
        let k = fixture_key(&FixtureKeyInput::new("image", &req).unwrap());
        let mut fixtures = HashMap::new();
        fixtures.insert(k.clone(), FixtureEntry::default());
        let adapter = FixtureAdapter::new("fixture", fixtures);
        let err = adapter.generate_image(&req).await.unwrap_err();
        assert_eq!(err.message(), format!("Fixture for image is missing (key: {}).", k));
    }

    #[tokio::test]
    async fn test_stream_synthesized_from_generate() {
        let req = input("stream me");
        let mut fixtures = HashMap::new();
        fixtures.insert(
            key("stream", &req),
            FixtureEntry {
                generate: Some(GenerateOutput::text("abcdefghij")),
                ..Default::default()
            },
        );
        let adapter = FixtureAdapter::new("fixture", fixtures).with_chunk_size(4);
        let chunks: Vec<StreamChunk> = adapter
            .stream_generate(&req)
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0], StreamChunk::delta("abcd"));
        assert!(chunks[3].is_end());
        assert_eq!(adapter.calls().stream_generate.len(), 1);
    }

    #[tokio::test]
    async fn test_custom_key_fn() {
        let mut fixtures = HashMap::new();
        fixtures.insert(
            "image:fixed".to_string(),
            FixtureEntry {
                image: Some(ImageGenerateOutput {
                    images: vec![ImageArtifact::from_bytes(b"png", "image/png")],
                    raw: None,
                }),
                ..Default::default()
            },
        );
        let adapter = FixtureAdapter::new("fixture", fixtures)
            .with_key_fn(|k: &FixtureKeyInput| format!("{}:fixed", k.kind));
        let out = adapter
            .generate_image(&ImageGenerateInput::new("fixture", "any", "prompt"))
            .await
            .unwrap();
        assert_eq!(out.images[0].decode().unwrap(), b"png");
    }

    #[test]
    fn test_load_fixtures_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixtures.json");
        std::fs::write(
            &path,
            r#"{"generate:p:m:abc": {"generate": {"text": "ok", "finishReason": "stop"}}}"#,
        )
        .unwrap();
        let fixtures = load_fixtures(&path).unwrap();
        let entry = &fixtures["generate:p:m:abc"];
        assert_eq!(entry.generate.as_ref().unwrap().finish_reason.as_deref(), Some("stop"));
    }
}
