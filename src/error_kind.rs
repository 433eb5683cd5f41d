//! 错误类别：封闭的错误种类集合及 HTTP 状态码映射。
//!
//! Closed error-kind enumeration shared by every adapter.
//!
//! Each kind carries a stable code, a snake_case name, a category and a
//! default retryability flag. Upstream HTTP failures are mapped onto kinds with
//! [`classify_status`].
//!
//! | Prefix | Category    | Description                                  |
//! |--------|-------------|----------------------------------------------|
//! | K1xxx  | client      | Request-side errors (validation, auth, 4xx)  |
//! | K2xxx  | rate        | Rate limiting                                |
//! | K3xxx  | server      | Provider-side errors                         |
//! | K4xxx  | output      | Vendor result could not be normalized        |
//! | K5xxx  | runtime     | Local dependencies, transport, task failures |
//! | K9xxx  | unknown     | Catch-all                                    |
//!
//! ```rust
//! use ai_kit::error_kind::{classify_status, ErrorKind};
//!
//! let kind = classify_status(429);
//! assert_eq!(kind, ErrorKind::RateLimited);
//! assert!(kind.retryable());
//! assert_eq!(kind.category(), "rate");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// K1001: Malformed or missing input, or no matching fixture
    Validation,
    /// K1002: Upstream rejected the request payload
    InvalidRequest,
    /// K1003: Invalid, expired, or missing credential
    Authentication,
    /// K1004: Credential lacks permission
    PermissionDenied,
    /// K1005: Model or resource does not exist
    NotFound,
    /// K1006: Payload too large for the upstream API
    RequestTooLarge,
    /// K2001: Request rate limit exceeded
    RateLimited,
    /// K3001: Internal server error on provider side
    ServerError,
    /// K3002: Provider temporarily overloaded
    Overloaded,
    /// K3003: Request timed out
    Timeout,
    /// K4001: Vendor returned a shape the coercion logic cannot interpret
    UnsupportedOutput,
    /// K4002: Vendor returned no output where content was expected
    NoOutput,
    /// K5001: A required local dependency or credential is unavailable
    DependencyUnavailable,
    /// K5002: Connection-level failure before an HTTP status was received
    Transport,
    /// K5003: An asynchronous provider task finished in a failed state
    TaskFailed,
    /// K9999: Could not be classified
    Unknown,
}

impl ErrorKind {
    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation => "K1001",
            Self::InvalidRequest => "K1002",
            Self::Authentication => "K1003",
            Self::PermissionDenied => "K1004",
            Self::NotFound => "K1005",
            Self::RequestTooLarge => "K1006",
            Self::RateLimited => "K2001",
            Self::ServerError => "K3001",
            Self::Overloaded => "K3002",
            Self::Timeout => "K3003",
            Self::UnsupportedOutput => "K4001",
            Self::NoOutput => "K4002",
            Self::DependencyUnavailable => "K5001",
            Self::Transport => "K5002",
            Self::TaskFailed => "K5003",
            Self::Unknown => "K9999",
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::InvalidRequest => "invalid_request",
            Self::Authentication => "authentication",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::RequestTooLarge => "request_too_large",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::Overloaded => "overloaded",
            Self::Timeout => "timeout",
            Self::UnsupportedOutput => "unsupported_output",
            Self::NoOutput => "no_output",
            Self::DependencyUnavailable => "dependency_unavailable",
            Self::Transport => "transport",
            Self::TaskFailed => "task_failed",
            Self::Unknown => "unknown",
        }
    }

    /// Whether a failure of this kind is transient by default.
    ///
    /// Adapters still decide per provider through their retry classifier;
    /// this is only the generic default.
    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServerError | Self::Overloaded | Self::Timeout
        )
    }

    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation
            | Self::InvalidRequest
            | Self::Authentication
            | Self::PermissionDenied
            | Self::NotFound
            | Self::RequestTooLarge => "client",
            Self::RateLimited => "rate",
            Self::ServerError | Self::Overloaded | Self::Timeout => "server",
            Self::UnsupportedOutput | Self::NoOutput => "output",
            Self::DependencyUnavailable | Self::Transport | Self::TaskFailed => "runtime",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a snake_case kind name (as produced by [`ErrorKind::name`]).
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "validation" => Self::Validation,
            "invalid_request" => Self::InvalidRequest,
            "authentication" => Self::Authentication,
            "permission_denied" => Self::PermissionDenied,
            "not_found" => Self::NotFound,
            "request_too_large" => Self::RequestTooLarge,
            "rate_limited" => Self::RateLimited,
            "server_error" => Self::ServerError,
            "overloaded" => Self::Overloaded,
            "timeout" => Self::Timeout,
            "unsupported_output" => Self::UnsupportedOutput,
            "no_output" => Self::NoOutput,
            "dependency_unavailable" => Self::DependencyUnavailable,
            "transport" => Self::Transport,
            "task_failed" => Self::TaskFailed,
            "unknown" => Self::Unknown,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Maps an upstream HTTP status code onto an [`ErrorKind`].
///
/// Specific codes are matched first; the remaining 4xx and 5xx ranges fall back
/// to `InvalidRequest` and `ServerError`.
pub fn classify_status(status: u16) -> ErrorKind {
    match status {
        400 | 422 => ErrorKind::InvalidRequest,
        401 => ErrorKind::Authentication,
        403 => ErrorKind::PermissionDenied,
        404 => ErrorKind::NotFound,
        408 | 504 => ErrorKind::Timeout,
        413 => ErrorKind::RequestTooLarge,
        429 => ErrorKind::RateLimited,
        503 | 529 => ErrorKind::Overloaded,
        500..=599 => ErrorKind::ServerError,
        400..=499 => ErrorKind::InvalidRequest,
        _ => ErrorKind::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_specific_statuses() {
        assert_eq!(classify_status(401), ErrorKind::Authentication);
        assert_eq!(classify_status(404), ErrorKind::NotFound);
        assert_eq!(classify_status(429), ErrorKind::RateLimited);
        assert_eq!(classify_status(503), ErrorKind::Overloaded);
        assert_eq!(classify_status(504), ErrorKind::Timeout);
    }

    #[test]
    fn test_classify_ranges() {
        assert_eq!(classify_status(418), ErrorKind::InvalidRequest);
        assert_eq!(classify_status(502), ErrorKind::ServerError);
        assert_eq!(classify_status(302), ErrorKind::Unknown);
    }

    #[test]
    fn test_name_roundtrip_and_categories() {
        for kind in [
            ErrorKind::Validation,
            ErrorKind::RateLimited,
            ErrorKind::ServerError,
            ErrorKind::UnsupportedOutput,
            ErrorKind::NoOutput,
            ErrorKind::TaskFailed,
        ] {
            assert_eq!(ErrorKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ErrorKind::Validation.category(), "client");
        assert_eq!(ErrorKind::NoOutput.category(), "output");
        assert!(!ErrorKind::Validation.retryable());
        assert!(ErrorKind::Timeout.retryable());
    }
}
