use crate::config::HttpConfig;
use crate::{BoxStream, Error, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use reqwest::{Method, Proxy};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// One named file part of a multipart upload.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field_name: String,
    pub file_name: String,
    pub data: Bytes,
    pub mime_type: String,
}

/// Downloaded body plus the upstream content type, if any.
#[derive(Debug, Clone)]
pub struct Downloaded {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// Thin wrapper over `reqwest::Client` that turns failure statuses into
/// classified errors.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl HttpClient {
    pub fn new(cfg: &HttpConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Some(proxy_url) = cfg.proxy_url.as_deref() {
            let proxy = Proxy::all(proxy_url).map_err(|e| {
                Error::validation(format!("Invalid proxy url {}: {}", proxy_url, e))
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;
        Ok(Self {
            client,
            timeout: Some(cfg.timeout()),
        })
    }

    /// Wraps a prebuilt client; its timeout is unknown to [`HttpClient::timeout`].
    pub fn from_client(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    /// Total per-request timeout configured on this client.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn request(
        &self,
        method: Method,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> reqwest::RequestBuilder {
        let mut req = self.client.request(method, url);
        for (k, v) in headers {
            req = req.header(k, v);
        }
        req
    }

    /// JSON request/response. An empty success body yields `Value::Null`.
    pub async fn request_json(
        &self,
        method: Method,
        url: &str,
        headers: &HashMap<String, String>,
        body: Option<&Value>,
    ) -> Result<Value> {
        let mut req = self.request(method.clone(), url, headers);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.map_err(TransportError::Http)?;
        let resp = ensure_success(resp, url).await?;
        debug!(method = %method, url, status = resp.status().as_u16(), "ai-kit http json response");
        let text = resp.text().await.map_err(TransportError::Http)?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Streaming request; the body is pulled chunk by chunk as the caller polls.
    pub async fn request_stream(
        &self,
        method: Method,
        url: &str,
        headers: &HashMap<String, String>,
        body: Option<&Value>,
    ) -> Result<BoxStream<'static, Bytes>> {
        let mut req = self.request(method, url, headers);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.map_err(TransportError::Http)?;
        let resp = ensure_success(resp, url).await?;
        let stream = resp
            .bytes_stream()
            .map_err(|e| Error::Transport(TransportError::Http(e)));
        Ok(Box::pin(stream))
    }

    /// Multipart upload: named text fields plus at most one file part.
    pub async fn request_multipart(
        &self,
        method: Method,
        url: &str,
        headers: &HashMap<String, String>,
        fields: &[(String, String)],
        file: Option<FilePart>,
    ) -> Result<Value> {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in fields {
            form = form.text(name.clone(), value.clone());
        }
        if let Some(file) = file {
            let part = reqwest::multipart::Part::bytes(file.data.to_vec())
                .file_name(file.file_name)
                .mime_str(&file.mime_type)
                .map_err(|e| Error::validation(format!("Invalid mime {}: {}", file.mime_type, e)))?;
            form = form.part(file.field_name, part);
        }
        let resp = self
            .request(method, url, headers)
            .multipart(form)
            .send()
            .await
            .map_err(TransportError::Http)?;
        let resp = ensure_success(resp, url).await?;
        let text = resp.text().await.map_err(TransportError::Http)?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Plain GET of a binary resource.
    pub async fn download(&self, url: &str) -> Result<Downloaded> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(TransportError::Http)?;
        let resp = ensure_success(resp, url).await?;
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let bytes = resp.bytes().await.map_err(TransportError::Http)?;
        debug!(url, size = bytes.len(), "ai-kit download finished");
        Ok(Downloaded {
            bytes,
            content_type,
        })
    }
}

/// Passes successful responses through; statuses >= 400 become classified
/// errors carrying the trimmed body (or a generated message when empty).
pub async fn ensure_success(resp: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = resp.status().as_u16();
    if status < 400 {
        return Ok(resp);
    }
    let body = match resp.text().await {
        Ok(body) => body,
        Err(e) => {
            debug!(status, url, error = %e, "failed to read error response body");
            String::new()
        }
    };
    Err(Error::upstream(status, error_message(status, url, &body)))
}

pub(crate) fn error_message(status: u16, url: &str, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("Upstream HTTP {} for {}", status, url)
    } else {
        body.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Display text of this error and all of its sources, joined by `": "`.
    pub fn chain_text(&self) -> String {
        let mut parts = vec![self.to_string()];
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            parts.push(err.to_string());
            source = err.source();
        }
        parts.join(": ")
    }
}
