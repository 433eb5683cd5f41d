//! Replicate prediction API client.
//!
//! - Models are addressed as `owner/name` (latest version, model-scoped
//!   endpoint) or `owner/name:version` (version-scoped endpoint).
//! - Predictions are created with `Prefer: wait` and polled via `urls.get`
//!   until they reach a terminal status.
//! - Rate limiting (429 / "throttled") is retried with backoff, honoring a
//!   "resets in ~Ns" hint in the error body.
//! - Outputs are arbitrary JSON (URL strings, lists, named maps) and go
//!   through [`OutputCoercer`].

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::common::{image_reference, sniff_image_mime};
use crate::adapter::ProviderAdapter;
use crate::config::{KitConfig, ReplicateConfig};
use crate::credentials::{resolve_api_key, REPLICATE_ENV};
use crate::error::ErrorPayload;
use crate::error_kind::ErrorKind;
use crate::output::{OutputCoercer, RawOutput};
use crate::resilience::{RateLimitClassifier, Retrier};
use crate::transport::HttpClient;
use crate::types::{ImageArtifact, ImageGenerateInput, ImageGenerateOutput, ImageInput, Parameters};
use crate::{Error, Result};

pub const PROVIDER: &str = "replicate";

#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub urls: Option<PredictionUrls>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictionUrls {
    #[serde(default)]
    pub get: Option<String>,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }
}

/// Options for [`ReplicateClient::remove_background`].
#[derive(Debug, Clone, Copy)]
pub struct RemoveBackgroundOptions {
    pub preserve_partial_alpha: bool,
    pub content_moderation: bool,
}

impl Default for RemoveBackgroundOptions {
    fn default() -> Self {
        Self {
            preserve_partial_alpha: true,
            content_moderation: false,
        }
    }
}

pub struct ReplicateClient {
    http: HttpClient,
    coercer: OutputCoercer,
    retrier: Retrier<RateLimitClassifier>,
    base_url: String,
    api_token: String,
    wait_secs: u64,
    poll_interval: Duration,
    poll_timeout: Duration,
}

/// Upper bound the API accepts for `Prefer: wait`.
const MAX_WAIT_SECS: u64 = 60;
/// Headroom left between the server-side wait and the client timeout.
const WAIT_MARGIN_SECS: u64 = 5;

/// Keeps the server-side wait below the client timeout so slow predictions
/// fall through to polling.
fn clamp_wait_secs(requested: u64, http_timeout: Option<Duration>) -> u64 {
    let cap = http_timeout
        .map(|t| t.as_secs().saturating_sub(WAIT_MARGIN_SECS))
        .unwrap_or(MAX_WAIT_SECS);
    requested.min(MAX_WAIT_SECS).min(cap)
}

impl ReplicateClient {
    /// Fails fast with `DependencyUnavailable` when no API token resolves.
    pub fn new(cfg: &KitConfig) -> Result<Self> {
        let token = resolve_api_key(PROVIDER, cfg.replicate.api_token.as_deref(), REPLICATE_ENV)
            .ok_or_else(|| {
                Error::dependency_unavailable(
                    "Replicate API token not found; set REPLICATE_API_TOKEN",
                )
                .with_provider(PROVIDER)
            })?;
        let http = HttpClient::new(&cfg.http)?;
        Ok(Self::with_http(&cfg.replicate, http, token))
    }

    pub fn with_http(cfg: &ReplicateConfig, http: HttpClient, api_token: impl Into<String>) -> Self {
        let wait_secs = clamp_wait_secs(cfg.wait_secs, http.timeout());
        Self {
            coercer: OutputCoercer::new(PROVIDER, http.clone()),
            retrier: Retrier::new(
                PROVIDER,
                cfg.retry.to_retry_config().normalized(),
                RateLimitClassifier,
            ),
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_token: api_token.into(),
            wait_secs,
            poll_interval: Duration::from_millis(cfg.poll_interval_ms),
            poll_timeout: Duration::from_secs(cfg.poll_timeout_secs),
        }
    }

    fn headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), format!("Bearer {}", self.api_token));
        if self.wait_secs > 0 {
            headers.insert("Prefer".to_string(), format!("wait={}", self.wait_secs));
        }
        headers
    }

    fn create_request(&self, model: &str, inputs: &Map<String, Value>) -> (String, Value) {
        match model.split_once(':') {
            Some((_, version)) => (
                format!("{}/v1/predictions", self.base_url),
                json!({ "version": version, "input": inputs }),
            ),
            None => (
                format!("{}/v1/models/{}/predictions", self.base_url, model),
                json!({ "input": inputs }),
            ),
        }
    }

    /// Runs a model to completion and returns its raw output, retrying rate
    /// limits.
    pub async fn run(&self, model: &str, inputs: Map<String, Value>) -> Result<RawOutput> {
        let inputs = &inputs;
        let output = self
            .retrier
            .run(move |_| async move { self.run_once(model, inputs).await })
            .await
            .map_err(|e| e.with_provider(PROVIDER))?;
        Ok(RawOutput::from_json(output))
    }

    async fn run_once(&self, model: &str, inputs: &Map<String, Value>) -> Result<Value> {
        let start = Instant::now();
        let (url, body) = self.create_request(model, inputs);
        let headers = self.headers();
        let created = self
            .http
            .request_json(Method::POST, &url, &headers, Some(&body))
            .await?;
        let mut prediction: Prediction = serde_json::from_value(created)?;

        while !prediction.is_terminal() {
            if start.elapsed() >= self.poll_timeout {
                return Err(Error::Kit(
                    ErrorPayload::new(
                        ErrorKind::Timeout,
                        format!(
                            "Replicate prediction {} still {} after {}s",
                            prediction.id,
                            prediction.status,
                            self.poll_timeout.as_secs()
                        ),
                    )
                    .with_provider(PROVIDER),
                ));
            }
            tokio::time::sleep(self.poll_interval).await;
            let get_url = prediction
                .urls
                .as_ref()
                .and_then(|u| u.get.clone())
                .unwrap_or_else(|| format!("{}/v1/predictions/{}", self.base_url, prediction.id));
            let polled = self
                .http
                .request_json(Method::GET, &get_url, &headers, None)
                .await?;
            prediction = serde_json::from_value(polled)?;
            debug!(prediction_id = prediction.id.as_str(), status = prediction.status.as_str(), "replicate poll");
        }

        match prediction.status.as_str() {
            "succeeded" => {
                info!(
                    model,
                    prediction_id = prediction.id.as_str(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "replicate prediction succeeded"
                );
                Ok(prediction.output)
            }
            status => {
                let detail = match prediction.error {
                    Some(Value::String(s)) => s,
                    Some(other) if !other.is_null() => other.to_string(),
                    _ => format!("prediction {}", status),
                };
                Err(Error::Kit(
                    ErrorPayload::new(
                        ErrorKind::TaskFailed,
                        format!("Replicate prediction {} {}: {}", prediction.id, status, detail),
                    )
                    .with_provider(PROVIDER),
                ))
            }
        }
    }

    async fn inputs_with_image(
        &self,
        mut inputs: Map<String, Value>,
        image: &ImageInput,
        parameters: Option<&Parameters>,
    ) -> Result<Map<String, Value>> {
        if let Some(params) = parameters {
            inputs.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        inputs.insert("image".to_string(), Value::String(image_reference(image).await?));
        Ok(inputs)
    }

    pub async fn remove_background(
        &self,
        model: &str,
        image: &ImageInput,
        options: RemoveBackgroundOptions,
        parameters: Option<&Parameters>,
    ) -> Result<Bytes> {
        let mut base = Map::new();
        base.insert("preserve_partial_alpha".into(), options.preserve_partial_alpha.into());
        base.insert("content_moderation".into(), options.content_moderation.into());
        let inputs = self.inputs_with_image(base, image, parameters).await?;
        let out = self.run(model, inputs).await?;
        self.coercer.single(out).await
    }

    /// Multi-view generation (e.g. zero123++). Returns views in model order.
    pub async fn multiview(
        &self,
        model: &str,
        image: &ImageInput,
        remove_background: bool,
        return_intermediate_images: bool,
        parameters: Option<&Parameters>,
    ) -> Result<Vec<Bytes>> {
        let mut base = Map::new();
        base.insert("remove_background".into(), remove_background.into());
        base.insert("return_intermediate_images".into(), return_intermediate_images.into());
        let inputs = self.inputs_with_image(base, image, parameters).await?;
        let out = self.run(model, inputs).await?;
        self.coercer.many(out).await
    }

    /// Depth estimation; named outputs such as `grey_depth` and `color_depth`.
    /// A single unnamed output is stored as `grey_depth`.
    pub async fn depth_anything_v2(
        &self,
        model: &str,
        image: &ImageInput,
        parameters: Option<&Parameters>,
    ) -> Result<BTreeMap<String, Bytes>> {
        let inputs = self.inputs_with_image(Map::new(), image, parameters).await?;
        let out = self.run(model, inputs).await?;
        self.coercer.named(out, "grey_depth").await
    }
}

#[async_trait]
impl ProviderAdapter for ReplicateClient {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn generate_image(&self, input: &ImageGenerateInput) -> Result<ImageGenerateOutput> {
        let mut inputs = Map::new();
        if !input.prompt.is_empty() {
            inputs.insert("prompt".into(), Value::String(input.prompt.clone()));
        }
        if let Some(params) = &input.parameters {
            inputs.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        match input.input_images.as_slice() {
            [] => {}
            [single] => {
                inputs.insert("image".into(), Value::String(image_reference(single).await?));
            }
            many => {
                let mut refs = Vec::with_capacity(many.len());
                for img in many {
                    refs.push(Value::String(image_reference(img).await?));
                }
                inputs.insert("images".into(), Value::Array(refs));
            }
        }

        let out = self.run(&input.model, inputs).await?;
        let blobs = self.coercer.many(out).await?;
        let images = blobs
            .iter()
            .map(|b| ImageArtifact::from_bytes(b, sniff_image_mime(b)))
            .collect();
        Ok(ImageGenerateOutput { images, raw: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use crate::config::RetrySettings;

    fn client(base_url: &str) -> ReplicateClient {
        let cfg = ReplicateConfig {
            base_url: base_url.to_string(),
            retry: RetrySettings {
                max_retries: 2,
                base_delay_s: 0.1,
                max_delay_s: 0.2,
            },
            poll_interval_ms: 1,
            ..Default::default()
        };
        ReplicateClient::with_http(&cfg, HttpClient::new(&HttpConfig::default()).unwrap(), "r8_test")
    }

    #[test]
    fn test_create_request_routes_by_version() {
        let c = client("https://api.replicate.com/");
        let (url, body) = c.create_request("owner/model:abc123", &Map::new());
        assert_eq!(url, "https://api.replicate.com/v1/predictions");
        assert_eq!(body["version"], "abc123");

        let (url, body) = c.create_request("owner/model", &Map::new());
        assert_eq!(url, "https://api.replicate.com/v1/models/owner/model/predictions");
        assert!(body.get("version").is_none());
    }

    #[test]
    fn test_wait_stays_below_http_timeout() {
        assert_eq!(clamp_wait_secs(60, Some(Duration::from_secs(60))), 55);
        assert_eq!(clamp_wait_secs(60, Some(Duration::from_secs(300))), 60);
        assert_eq!(clamp_wait_secs(10, Some(Duration::from_secs(60))), 10);
        assert_eq!(clamp_wait_secs(60, Some(Duration::from_secs(3))), 0);
        assert_eq!(clamp_wait_secs(90, None), 60);

        let c = client("https://api.replicate.com");
        assert_eq!(c.headers().get("Prefer").map(String::as_str), Some("wait=55"));
        let short = ReplicateClient::with_http(
            &ReplicateConfig::default(),
            HttpClient::new(&HttpConfig {
                timeout_secs: 4,
                ..Default::default()
            })
            .unwrap(),
            "r8_test",
        );
        assert!(!short.headers().contains_key("Prefer"));
    }

    #[tokio::test]
    async fn test_remove_background_downloads_output() {
        let mut server = mockito::Server::new_async().await;
        let file_url = format!("{}/files/out.png", server.url());
        let _create = server
            .mock("POST", "/v1/models/owner/rembg/predictions")
            .match_header("authorization", "Bearer r8_test")
            .with_status(201)
            .with_body(json!({"id": "p1", "status": "succeeded", "output": file_url}).to_string())
            .create_async()
            .await;
        let _file = server
            .mock("GET", "/files/out.png")
            .with_status(200)
            .with_body("\u{89}PNG-bytes")
            .create_async()
            .await;

        let c = client(&server.url());
        let out = c
            .remove_background(
                "owner/rembg",
                &ImageInput::from_bytes(b"img", "image/png"),
                RemoveBackgroundOptions::default(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(out, Bytes::from("\u{89}PNG-bytes"));
    }

    #[tokio::test]
    async fn test_run_polls_until_terminal() {
        let mut server = mockito::Server::new_async().await;
        let get_url = format!("{}/v1/predictions/p2", server.url());
        let _create = server
            .mock("POST", "/v1/predictions")
            .with_status(201)
            .with_body(json!({"id": "p2", "status": "starting", "urls": {"get": get_url}}).to_string())
            .create_async()
            .await;
        let _poll = server
            .mock("GET", "/v1/predictions/p2")
            .with_status(200)
            .with_body(json!({"id": "p2", "status": "succeeded", "output": ["a", "b"]}).to_string())
            .create_async()
            .await;

        let c = client(&server.url());
        let out = c.run("owner/model:v1", Map::new()).await.unwrap();
        assert!(matches!(out, RawOutput::List(ref l) if l.len() == 2));
    }

    #[tokio::test]
    async fn test_failed_prediction_is_task_failed() {
        let mut server = mockito::Server::new_async().await;
        let _create = server
            .mock("POST", "/v1/models/owner/m/predictions")
            .with_status(201)
            .with_body(json!({"id": "p3", "status": "failed", "error": "CUDA out of memory"}).to_string())
            .create_async()
            .await;

        let err = client(&server.url()).run("owner/m", Map::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TaskFailed);
        assert_eq!(err.provider(), Some(PROVIDER));
        assert!(err.message().contains("CUDA out of memory"));
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried_then_surfaces() {
        let mut server = mockito::Server::new_async().await;
        let create = server
            .mock("POST", "/v1/models/owner/m/predictions")
            .with_status(429)
            .with_body(r#"{"detail":"Request was throttled."}"#)
            .expect(3)
            .create_async()
            .await;

        let err = client(&server.url()).run("owner/m", Map::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.upstream_status(), Some(429));
        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_depth_map_named_outputs() {
        let mut server = mockito::Server::new_async().await;
        let grey = format!("{}/files/grey.png", server.url());
        let color = format!("{}/files/color.png", server.url());
        let _create = server
            .mock("POST", "/v1/models/owner/depth/predictions")
            .with_status(201)
            .with_body(
                json!({"id": "p4", "status": "succeeded", "output": {"grey_depth": grey, "color_depth": color}})
                    .to_string(),
            )
            .create_async()
            .await;
        let _g = server.mock("GET", "/files/grey.png").with_body("G").create_async().await;
        let _c = server.mock("GET", "/files/color.png").with_body("C").create_async().await;

        let out = client(&server.url())
            .depth_anything_v2("owner/depth", &ImageInput::from_url("https://in/x.png"), None)
            .await
            .unwrap();
        assert_eq!(&out["grey_depth"][..], b"G");
        assert_eq!(&out["color_depth"][..], b"C");
    }
}
