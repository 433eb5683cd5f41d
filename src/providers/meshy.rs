//! Meshy image-to-3D client.
//!
//! A task is created with `POST /openapi/v1/image-to-3d`, then polled until it
//! leaves `PENDING`/`IN_PROGRESS`. The finished model is downloaded from
//! `model_urls[format]`; the thumbnail is fetched as a preview when present.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::common::{image_reference, sniff_image_mime};
use crate::adapter::ProviderAdapter;
use crate::config::{KitConfig, MeshyConfig};
use crate::credentials::{resolve_api_key, MESHY_ENV};
use crate::error::ErrorPayload;
use crate::error_kind::ErrorKind;
use crate::resilience::{RateLimitClassifier, Retrier};
use crate::transport::HttpClient;
use crate::types::{ImageArtifact, ImageInput, MeshGenerateInput, MeshGenerateOutput};
use crate::{Error, Result};

pub const PROVIDER: &str = "meshy";

const DEFAULT_FORMAT: &str = "glb";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    Canceled,
    Expired,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Pending | TaskStatus::InProgress)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshyTask {
    pub id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub model_urls: BTreeMap<String, String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub task_error: Option<TaskError>,
}

pub struct MeshyClient {
    http: HttpClient,
    retrier: Retrier<RateLimitClassifier>,
    base_url: String,
    api_key: String,
    poll_interval: Duration,
    poll_timeout: Duration,
}

fn task_failure(kind: ErrorKind, msg: String) -> Error {
    Error::Kit(ErrorPayload::new(kind, msg).with_provider(PROVIDER))
}

impl MeshyClient {
    pub fn new(cfg: &KitConfig) -> Result<Self> {
        let api_key = resolve_api_key(PROVIDER, cfg.meshy.api_key.as_deref(), MESHY_ENV)
            .ok_or_else(|| {
                Error::dependency_unavailable("Meshy API key not found; set MESHY_API_KEY")
                    .with_provider(PROVIDER)
            })?;
        Ok(Self::with_http(&cfg.meshy, HttpClient::new(&cfg.http)?, api_key))
    }

    pub fn with_http(cfg: &MeshyConfig, http: HttpClient, api_key: impl Into<String>) -> Self {
        Self {
            http,
            retrier: Retrier::new(
                PROVIDER,
                cfg.retry.to_retry_config().normalized(),
                RateLimitClassifier,
            ),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            poll_interval: Duration::from_millis(cfg.poll_interval_ms),
            poll_timeout: Duration::from_secs(cfg.poll_timeout_secs),
        }
    }

    fn headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), format!("Bearer {}", self.api_key));
        headers
    }

    async fn call(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
        let headers = self.headers();
        let headers = &headers;
        self.retrier
            .run(move |_| {
                let method = method.clone();
                async move { self.http.request_json(method, url, headers, body).await }
            })
            .await
            .map_err(|e| e.with_provider(PROVIDER))
    }

    /// Creates an image-to-3D task and returns its id.
    pub async fn create_task(
        &self,
        image: &ImageInput,
        ai_model: Option<&str>,
        parameters: Option<&Map<String, Value>>,
    ) -> Result<String> {
        let mut body = Map::new();
        if let Some(params) = parameters {
            body.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        body.insert("image_url".into(), Value::String(image_reference(image).await?));
        if let Some(model) = ai_model.filter(|m| !m.is_empty()) {
            body.insert("ai_model".into(), Value::String(model.to_string()));
        }

        let url = format!("{}/openapi/v1/image-to-3d", self.base_url);
        let resp = self.call(Method::POST, &url, Some(&Value::Object(body))).await?;
        resp.get("result")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| {
                Error::unsupported_output("Meshy create response did not include a task id")
                    .with_provider(PROVIDER)
            })
    }

    pub async fn get_task(&self, task_id: &str) -> Result<MeshyTask> {
        let url = format!("{}/openapi/v1/image-to-3d/{}", self.base_url, task_id);
        let resp = self.call(Method::GET, &url, None).await?;
        Ok(serde_json::from_value(resp)?)
    }

    /// Polls until the task is terminal. Non-success terminal states become
    /// `TaskFailed`; exceeding the poll timeout is a `Timeout`.
    pub async fn wait_for_task(&self, task_id: &str) -> Result<MeshyTask> {
        let start = Instant::now();
        loop {
            let task = self.get_task(task_id).await?;
            debug!(task_id, status = ?task.status, progress = task.progress, "meshy poll");
            match task.status {
                TaskStatus::Succeeded => return Ok(task),
                status if status.is_terminal() => {
                    let reason = task
                        .task_error
                        .as_ref()
                        .map(|e| e.message.as_str())
                        .filter(|m| !m.is_empty())
                        .unwrap_or("no error message");
                    return Err(task_failure(
                        ErrorKind::TaskFailed,
                        format!("Meshy task {} ended as {:?}: {}", task_id, status, reason),
                    ));
                }
                _ => {}
            }
            if start.elapsed() >= self.poll_timeout {
                return Err(task_failure(
                    ErrorKind::Timeout,
                    format!(
                        "Meshy task {} not finished after {}s",
                        task_id,
                        self.poll_timeout.as_secs()
                    ),
                ));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl ProviderAdapter for MeshyClient {
    fn provider(&self) -> &str {
        PROVIDER
    }

    /// Parameter `format` selects the model file (default `glb`); all other
    /// parameters are forwarded to the task request.
    async fn generate_mesh(&self, input: &MeshGenerateInput) -> Result<MeshGenerateOutput> {
        let start = Instant::now();
        let mut params = input.parameters.clone().unwrap_or_default();
        let format = match params.remove("format") {
            Some(Value::String(f)) if !f.is_empty() => f.to_ascii_lowercase(),
            _ => DEFAULT_FORMAT.to_string(),
        };

        let task_id = self
            .create_task(&input.input_image, Some(&input.model), Some(&params))
            .await?;
        let task = self.wait_for_task(&task_id).await?;

        let model_url = task.model_urls.get(&format).ok_or_else(|| {
            Error::no_output(format!("Meshy task {} has no {} model", task_id, format))
                .with_provider(PROVIDER)
        })?;
        let mesh = self
            .http
            .download(model_url)
            .await
            .map_err(|e| e.with_provider(PROVIDER))?;

        let mut output = MeshGenerateOutput::from_bytes(&mesh.bytes, format);
        if let Some(thumb) = task.thumbnail_url.as_deref() {
            match self.http.download(thumb).await {
                Ok(preview) => {
                    let mime = preview
                        .content_type
                        .clone()
                        .unwrap_or_else(|| sniff_image_mime(&preview.bytes).to_string());
                    output.preview_image = Some(ImageArtifact::from_bytes(&preview.bytes, mime));
                }
                Err(e) => warn!(task_id = task_id.as_str(), error = %e, "meshy thumbnail download failed"),
            }
        }
        output.raw = Some(serde_json::to_value(&task)?);

        info!(
            task_id = task_id.as_str(),
            size = mesh.bytes.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "meshy mesh generation finished"
        );
        Ok(output)
    }
}
