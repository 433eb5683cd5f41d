use base64::Engine as _;
use bytes::Bytes;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::providers::common::parse_data_url;
use crate::transport::HttpClient;
use crate::{Error, Result};

/// Raw adapter result before normalization.
pub enum RawOutput {
    Null,
    Bytes(Bytes),
    /// Readable handle (e.g. an open file or response body reader).
    Reader(Box<dyn AsyncRead + Send + Unpin>),
    Text(String),
    Map(BTreeMap<String, RawOutput>),
    List(Vec<RawOutput>),
    /// Any other value; carries its type name for the error message.
    Unsupported(&'static str),
}

impl fmt::Debug for RawOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawOutput::Null => write!(f, "Null"),
            RawOutput::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            RawOutput::Reader(_) => write!(f, "Reader(..)"),
            RawOutput::Text(s) => f.debug_tuple("Text").field(s).finish(),
            RawOutput::Map(m) => f.debug_tuple("Map").field(m).finish(),
            RawOutput::List(l) => f.debug_tuple("List").field(l).finish(),
            RawOutput::Unsupported(t) => f.debug_tuple("Unsupported").field(t).finish(),
        }
    }
}

impl RawOutput {
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => RawOutput::Null,
            Value::Bool(_) => RawOutput::Unsupported("boolean"),
            Value::Number(_) => RawOutput::Unsupported("number"),
            Value::String(s) => RawOutput::Text(s),
            Value::Array(items) => RawOutput::List(items.into_iter().map(Self::from_json).collect()),
            Value::Object(map) => RawOutput::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RawOutput::Null => "null",
            RawOutput::Bytes(_) => "bytes",
            RawOutput::Reader(_) => "reader",
            RawOutput::Text(_) => "string",
            RawOutput::Map(_) => "map",
            RawOutput::List(_) => "list",
            RawOutput::Unsupported(t) => t,
        }
    }

    fn url_entry(&self) -> Option<&str> {
        match self {
            RawOutput::Map(m) => match m.get("url") {
                Some(RawOutput::Text(url)) => Some(url.as_str()),
                _ => None,
            },
            _ => None,
        }
    }
}

impl From<Value> for RawOutput {
    fn from(value: Value) -> Self {
        RawOutput::from_json(value)
    }
}

/// Normalizes [`RawOutput`] values into bytes, downloading URLs as needed.
#[derive(Debug, Clone)]
pub struct OutputCoercer {
    http: HttpClient,
    provider: String,
}

impl OutputCoercer {
    pub fn new(provider: impl Into<String>, http: HttpClient) -> Self {
        Self {
            http,
            provider: provider.into(),
        }
    }

    /// Resolution order: bytes, readable handle, `http` string, inline `data:`
    /// URL, mapping with a string `url`. `Null` is a no-output error; anything else is unsupported.
    pub async fn single(&self, raw: RawOutput) -> Result<Bytes> {
        if let Some(url) = raw.url_entry() {
            return self.download(url).await;
        }
        match raw {
            RawOutput::Null => Err(Error::no_output(format!(
                "{} returned no output",
                self.provider
            ))
            .with_provider(&self.provider)),
            RawOutput::Bytes(b) => Ok(b),
            RawOutput::Reader(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
            RawOutput::Text(ref s) if s.starts_with("http") => self.download(s).await,
            RawOutput::Text(ref s) if s.starts_with("data:") => self.decode_data_url(s),
            other => Err(Error::unsupported_output(format!(
                "Unsupported {} output type: {}",
                self.provider,
                other.type_name()
            ))
            .with_provider(&self.provider)),
        }
    }

    /// Ordered blobs: a list is coerced element-wise, anything else becomes a
    /// one-element list.
    pub async fn many(&self, raw: RawOutput) -> Result<Vec<Bytes>> {
        match raw {
            RawOutput::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.single(item).await?);
                }
                Ok(out)
            }
            other => Ok(vec![self.single(other).await?]),
        }
    }

    /// Named blobs: a mapping (without a `url` key) is coerced entry by entry;
    /// any other value is stored under `default_name`.
    pub async fn named(&self, raw: RawOutput, default_name: &str) -> Result<BTreeMap<String, Bytes>> {
        let mut out = BTreeMap::new();
        match raw {
            RawOutput::Map(entries) if !entries.contains_key("url") => {
                for (name, value) in entries {
                    let bytes = self.single(value).await?;
                    out.insert(name, bytes);
                }
            }
            other => {
                out.insert(default_name.to_string(), self.single(other).await?);
            }
        }
        Ok(out)
    }

    fn decode_data_url(&self, raw: &str) -> Result<Bytes> {
        let invalid = |detail: String| {
            Error::unsupported_output(format!("Invalid {} data URL output: {}", self.provider, detail))
                .with_provider(&self.provider)
        };
        let (_, payload) = parse_data_url(raw).ok_or_else(|| invalid("missing payload".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim().as_bytes())
            .map(Bytes::from)
            .map_err(|e| invalid(e.to_string()))
    }

    async fn download(&self, url: &str) -> Result<Bytes> {
        self.http
            .download(url)
            .await
            .map(|d| d.bytes)
            .map_err(|e| e.with_provider(&self.provider))
    }
}
