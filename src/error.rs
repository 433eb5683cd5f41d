use crate::error_kind::ErrorKind;
use crate::transport::TransportError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured error payload surfaced to callers.
///
/// Constructed at the failure site and propagated unchanged; callers branch on
/// `kind` and may inspect `provider` and `upstream_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
}

impl ErrorPayload {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            provider: None,
            upstream_status: None,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_upstream_status(mut self, status: u16) -> Self {
        self.upstream_status = Some(status);
        self
    }
}

impl std::fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        let mut parts = Vec::new();
        if let Some(ref provider) = self.provider {
            parts.push(format!("provider: {}", provider));
        }
        if let Some(status) = self.upstream_status {
            parts.push(format!("upstream status: {}", status));
        }
        if !parts.is_empty() {
            write!(f, " ({})", parts.join(", "))?;
        }
        Ok(())
    }
}

/// Unified error type for ai-kit.
///
/// Every variant can be viewed as an [`ErrorPayload`] via [`Error::to_payload`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Kit(ErrorPayload),

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration file error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<ErrorPayload> for Error {
    fn from(payload: ErrorPayload) -> Self {
        Error::Kit(payload)
    }
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Kit(ErrorPayload::new(ErrorKind::Validation, msg))
    }

    pub fn no_output(msg: impl Into<String>) -> Self {
        Error::Kit(ErrorPayload::new(ErrorKind::NoOutput, msg))
    }

    pub fn unsupported_output(msg: impl Into<String>) -> Self {
        Error::Kit(ErrorPayload::new(ErrorKind::UnsupportedOutput, msg))
    }

    pub fn dependency_unavailable(msg: impl Into<String>) -> Self {
        Error::Kit(ErrorPayload::new(ErrorKind::DependencyUnavailable, msg))
    }

    /// Failure inside the kit itself, such as a poisoned lock.
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Kit(ErrorPayload::new(ErrorKind::Unknown, msg))
    }

    /// Classified upstream HTTP failure.
    pub fn upstream(status: u16, msg: impl Into<String>) -> Self {
        Error::Kit(
            ErrorPayload::new(crate::error_kind::classify_status(status), msg)
                .with_upstream_status(status),
        )
    }

    /// Attach a provider name. Non-payload variants are converted first.
    pub fn with_provider(self, provider: impl Into<String>) -> Self {
        Error::Kit(self.to_payload().with_provider(provider))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Kit(p) => p.kind,
            Error::Transport(TransportError::Http(e)) if e.is_timeout() => ErrorKind::Timeout,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Serialization(_) => ErrorKind::UnsupportedOutput,
            Error::Yaml(_) => ErrorKind::Validation,
            Error::Io(_) => ErrorKind::Unknown,
        }
    }

    pub fn provider(&self) -> Option<&str> {
        match self {
            Error::Kit(p) => p.provider.as_deref(),
            _ => None,
        }
    }

    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Error::Kit(p) => p.upstream_status,
            Error::Transport(TransportError::Http(e)) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Message without the kind/provider decoration.
    pub fn message(&self) -> String {
        match self {
            Error::Kit(p) => p.message.clone(),
            other => other.to_string(),
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            Error::Kit(p) => p.clone(),
            other => {
                let mut payload = ErrorPayload::new(other.kind(), other.message());
                payload.upstream_status = other.upstream_status();
                payload
            }
        }
    }
}
