//! Gemini image editing via `generateContent` with the image response modality.
//!
//! TLS-level transport failures are retried; each retry drops the cached HTTP
//! client so the next attempt starts on a fresh connection pool.

use async_trait::async_trait;
use base64::Engine as _;
use bytes::Bytes;
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info};

use super::common::{image_bytes, sniff_image_mime};
use crate::adapter::ProviderAdapter;
use crate::config::{GeminiConfig, HttpConfig, KitConfig};
use crate::credentials::{resolve_api_key, GEMINI_ENV};
use crate::resilience::{Retrier, TransientTlsClassifier};
use crate::transport::HttpClient;
use crate::types::{ImageArtifact, ImageGenerateInput, ImageGenerateOutput, ImageInput};
use crate::{Error, Result};

pub const PROVIDER: &str = "gemini";

const DEFAULT_MODALITIES: &[&str] = &["IMAGE"];

pub struct GeminiImageClient {
    http_config: HttpConfig,
    client: Mutex<Option<HttpClient>>,
    retrier: Retrier<TransientTlsClassifier>,
    base_url: String,
    api_key: String,
}

/// `aspect_ratio` → `aspectRatio`; keys already in camelCase pass through.
fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for ch in key.chars() {
        if ch == '_' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

impl GeminiImageClient {
    pub fn new(cfg: &KitConfig) -> Result<Self> {
        let api_key = resolve_api_key(PROVIDER, cfg.gemini.api_key.as_deref(), GEMINI_ENV)
            .ok_or_else(|| {
                Error::dependency_unavailable(
                    "Gemini API key not found; set AI_KIT_GOOGLE_API_KEY, GEMINI_API_KEY or GOOGLE_API_KEY",
                )
                .with_provider(PROVIDER)
            })?;
        Ok(Self::with_key(&cfg.http, &cfg.gemini, api_key))
    }

    pub fn with_key(http: &HttpConfig, cfg: &GeminiConfig, api_key: impl Into<String>) -> Self {
        Self {
            http_config: http.clone(),
            client: Mutex::new(None),
            retrier: Retrier::new(
                PROVIDER,
                cfg.retry.to_retry_config().normalized(),
                TransientTlsClassifier,
            ),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Cached client, built on first use and after each invalidation.
    fn client(&self) -> Result<HttpClient> {
        let mut guard = self
            .client
            .lock()
            .map_err(|_| Error::internal("Gemini client lock poisoned"))?;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let client = HttpClient::new(&self.http_config)?;
        *guard = Some(client.clone());
        Ok(client)
    }

    fn invalidate_client(&self) {
        if let Ok(mut guard) = self.client.lock() {
            *guard = None;
        }
    }

    fn request_body(
        prompt: &str,
        images: &[(Bytes, String)],
        response_modalities: &[String],
        image_config: Option<&Map<String, Value>>,
    ) -> Value {
        let mut parts = vec![json!({ "text": prompt })];
        for (bytes, mime) in images {
            parts.push(json!({
                "inlineData": {
                    "mimeType": mime,
                    "data": base64::engine::general_purpose::STANDARD.encode(bytes),
                }
            }));
        }

        let mut generation_config = Map::new();
        if !response_modalities.is_empty() {
            generation_config.insert("responseModalities".into(), json!(response_modalities));
        }
        if let Some(cfg) = image_config.filter(|c| !c.is_empty()) {
            let converted: Map<String, Value> = cfg
                .iter()
                .map(|(k, v)| (camel_case(k), v.clone()))
                .collect();
            generation_config.insert("imageConfig".into(), Value::Object(converted));
        }

        let mut body = json!({ "contents": [{ "role": "user", "parts": parts }] });
        if !generation_config.is_empty() {
            body["generationConfig"] = Value::Object(generation_config);
        }
        body
    }

    /// Edits or generates images from `prompt` plus the given input images.
    ///
    /// `response_modalities` defaults to `["IMAGE"]`; `image_config` keys may be
    /// given in snake_case (`aspect_ratio`).
    pub async fn generate_images(
        &self,
        model: &str,
        prompt: &str,
        input_images: &[ImageInput],
        response_modalities: Option<&[String]>,
        image_config: Option<&Map<String, Value>>,
    ) -> Result<Vec<Bytes>> {
        if prompt.trim().is_empty() {
            return Err(
                Error::validation("Prompt is required for Gemini image generation")
                    .with_provider(PROVIDER),
            );
        }

        let probe = self.client()?;
        let mut images = Vec::with_capacity(input_images.len());
        for input in input_images {
            images.push(image_bytes(input, &probe).await?);
        }
        let modalities: Vec<String> = match response_modalities {
            Some(m) if !m.is_empty() => m.to_vec(),
            _ => DEFAULT_MODALITIES.iter().map(|s| s.to_string()).collect(),
        };
        let body = Self::request_body(prompt, &images, &modalities, image_config);
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        let mut headers = HashMap::new();
        headers.insert("x-goog-api-key".to_string(), self.api_key.clone());

        let (body, url, headers) = (&body, url.as_str(), &headers);
        let response = self
            .retrier
            .run_with_hook(
                move |attempt| async move {
                    debug!(model, attempt, "gemini generateContent");
                    let client = self.client()?;
                    client
                        .request_json(Method::POST, url, headers, Some(body))
                        .await
                },
                |_| self.invalidate_client(),
            )
            .await
            .map_err(|e| e.with_provider(PROVIDER))?;

        let out = extract_images(&response)?;
        if out.is_empty() {
            return Err(
                Error::no_output("Gemini response did not include image data").with_provider(PROVIDER),
            );
        }
        info!(model, images = out.len(), "gemini image generation finished");
        Ok(out)
    }
}

/// Collects inline image data from `candidates[].content.parts[]`, accepting
/// both `inlineData` and `inline_data` spellings.
pub(crate) fn extract_images(response: &Value) -> Result<Vec<Bytes>> {
    let mut images = Vec::new();
    let candidates = response
        .get("candidates")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for candidate in candidates {
        let parts = candidate
            .pointer("/content/parts")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for part in parts {
            let inline = part.get("inlineData").or_else(|| part.get("inline_data"));
            let Some(data) = inline.and_then(|i| i.get("data")).and_then(Value::as_str) else {
                continue;
            };
            // Undecodable payloads are skipped, not fatal.
            if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(data.as_bytes()) {
                if !bytes.is_empty() {
                    images.push(Bytes::from(bytes));
                }
            }
        }
    }
    Ok(images)
}

#[async_trait]
impl ProviderAdapter for GeminiImageClient {
    fn provider(&self) -> &str {
        PROVIDER
    }

    /// Recognized parameters: `response_modalities` (list of strings) and
    /// `image_config` (object).
    async fn generate_image(&self, input: &ImageGenerateInput) -> Result<ImageGenerateOutput> {
        let params = input.parameters.as_ref();
        let modalities: Option<Vec<String>> = params
            .and_then(|p| p.get("response_modalities"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            });
        let image_config = params
            .and_then(|p| p.get("image_config"))
            .and_then(Value::as_object);

        let blobs = self
            .generate_images(
                &input.model,
                &input.prompt,
                &input.input_images,
                modalities.as_deref(),
                image_config,
            )
            .await?;
        let images = blobs
            .iter()
            .map(|b| ImageArtifact::from_bytes(b, sniff_image_mime(b)))
            .collect();
        Ok(ImageGenerateOutput { images, raw: None })
    }
}
