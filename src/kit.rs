//! Kit hub: routes uniform requests to the adapter registered for
//! `input.provider`, and caches provider model listings.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::adapter::ProviderAdapter;
use crate::cache::KitRegistry;
use crate::config::KitConfig;
use crate::error_kind::ErrorKind;
use crate::local::LocalWhisperAdapter;
use crate::providers::{GeminiImageClient, MeshyClient, ReplicateClient};
use crate::types::{
    GenerateInput, GenerateOutput, ImageGenerateInput, ImageGenerateOutput, MeshGenerateInput,
    MeshGenerateOutput, ModelMetadata, StreamChunk, TranscribeInput, TranscribeOutput,
};
use crate::{BoxStream, Error, Result};

#[derive(Default)]
pub struct Kit {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    models: Mutex<HashMap<String, Vec<ModelMetadata>>>,
}

impl Kit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every provider whose dependencies are available; providers
    /// failing their capability check are skipped with a warning.
    pub fn from_config(cfg: &KitConfig) -> Result<Self> {
        let mut kit = Self::new();
        kit.try_register(ReplicateClient::new(cfg))?;
        kit.try_register(GeminiImageClient::new(cfg))?;
        kit.try_register(MeshyClient::new(cfg))?;
        kit.try_register(LocalWhisperAdapter::new(cfg))?;
        Ok(kit)
    }

    fn try_register<A: ProviderAdapter + 'static>(&mut self, adapter: Result<A>) -> Result<()> {
        match adapter {
            Ok(adapter) => {
                self.register(Arc::new(adapter));
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::DependencyUnavailable => {
                warn!(provider = e.provider().unwrap_or("unknown"), error = %e, "provider unavailable");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Adds or replaces the adapter for its provider id.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider().to_string(), adapter);
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Registered provider ids, sorted.
    pub fn providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.adapters.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn adapter(&self, provider: &str) -> Result<&Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider).ok_or_else(|| {
            Error::validation(format!("Provider '{}' is not configured", provider))
                .with_provider(provider)
        })
    }

    pub async fn generate(&self, input: &GenerateInput) -> Result<GenerateOutput> {
        self.adapter(&input.provider)?.generate(input).await
    }

    pub async fn stream_generate(
        &self,
        input: &GenerateInput,
    ) -> Result<BoxStream<'static, StreamChunk>> {
        self.adapter(&input.provider)?.stream_generate(input).await
    }

    pub async fn generate_image(&self, input: &ImageGenerateInput) -> Result<ImageGenerateOutput> {
        self.adapter(&input.provider)?.generate_image(input).await
    }

    pub async fn generate_mesh(&self, input: &MeshGenerateInput) -> Result<MeshGenerateOutput> {
        self.adapter(&input.provider)?.generate_mesh(input).await
    }

    pub async fn transcribe(&self, input: &TranscribeInput) -> Result<TranscribeOutput> {
        self.adapter(&input.provider)?.transcribe(input).await
    }

    /// Model listings for `providers` (all registered when `None`), in provider
    /// order. Listings are cached per provider; `refresh` refetches them.
    pub async fn list_models(
        &self,
        providers: Option<&[String]>,
        refresh: bool,
    ) -> Result<Vec<ModelMetadata>> {
        let ids = match providers {
            Some(ids) => ids.to_vec(),
            None => self.providers(),
        };
        let mut out = Vec::new();
        for id in &ids {
            let cached = if refresh {
                None
            } else {
                self.cached_models(id)?
            };
            let models = match cached {
                Some(models) => {
                    debug!(provider = id.as_str(), "model listing cache hit");
                    models
                }
                None => {
                    let models = self.adapter(id)?.list_models().await?;
                    self.models
                        .lock()
                        .map_err(|e| Error::internal(format!("model cache lock poisoned: {}", e)))?
                        .insert(id.clone(), models.clone());
                    models
                }
            };
            out.extend(models);
        }
        Ok(out)
    }

    fn cached_models(&self, provider: &str) -> Result<Option<Vec<ModelMetadata>>> {
        let models = self
            .models
            .lock()
            .map_err(|e| Error::internal(format!("model cache lock poisoned: {}", e)))?;
        Ok(models.get(provider).cloned())
    }
}

/// Model ids for one provider, de-duplicated, first occurrence order kept.
/// Entries with an empty id are skipped.
pub async fn list_provider_models(kit: &Kit, provider: &str, refresh: bool) -> Result<Vec<String>> {
    let models = kit
        .list_models(Some(&[provider.to_string()]), refresh)
        .await?;
    let mut seen = HashSet::new();
    Ok(models
        .into_iter()
        .map(|m| m.id)
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect())
}

static KITS: Lazy<KitRegistry<String, Kit>> = Lazy::new(KitRegistry::new);

/// Process-wide kit cache keyed by `cache_key`.
pub async fn get_cached_kit<F, Fut>(cache_key: &str, factory: F) -> Result<Arc<Kit>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Kit>>,
{
    KITS.get_or_init(cache_key.to_string(), factory).await
}

pub fn invalidate_cached_kit(cache_key: &str) -> bool {
    KITS.invalidate(&cache_key.to_string())
}
