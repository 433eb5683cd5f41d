use once_cell::sync::Lazy;
use regex::Regex;

use crate::error_kind::ErrorKind;
use crate::transport::TransportError;
use crate::Error;

/// Outcome of classifying a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retryability {
    /// Transient; `reset_hint_secs` carries a vendor-supplied wait, if any.
    Retry { reset_hint_secs: Option<u64> },
    Fatal,
}

/// Provider-specific "is this failure transient" predicate.
pub trait RetryClassifier: Send + Sync {
    fn classify(&self, err: &Error) -> Retryability;
}

static RESET_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)reset(?:s)? in ~?(\d+)s").unwrap());

/// Extracts `N` from vendor messages such as `"Request throttled, resets in ~12s"`.
///
/// Accepted forms (case-insensitive): `reset in Ns`, `resets in Ns`,
/// `resets in ~Ns`. Returns `None` when absent or not a valid integer.
pub fn parse_reset_hint(message: &str) -> Option<u64> {
    RESET_HINT
        .captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
}

/// Lower-cased text used for hint matching: transport errors include their
/// full source chain.
fn error_text(err: &Error) -> String {
    match err {
        Error::Transport(t) => t.chain_text(),
        other => other.to_string(),
    }
    .to_lowercase()
}

/// Retries rate limiting: upstream 429, or messages mentioning `429`,
/// `throttl` or `rate limit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimitClassifier;

impl RetryClassifier for RateLimitClassifier {
    fn classify(&self, err: &Error) -> Retryability {
        let text = error_text(err);
        let limited = err.upstream_status() == Some(429)
            || err.kind() == ErrorKind::RateLimited
            || text.contains("429")
            || text.contains("throttl")
            || text.contains("rate limit");
        if limited {
            Retryability::Retry {
                reset_hint_secs: parse_reset_hint(&err.message()),
            }
        } else {
            Retryability::Fatal
        }
    }
}

const TLS_HINTS: &[&str] = &[
    "ssl",
    "tls",
    "bad record mac",
    "eof occurred in violation of protocol",
    "connection reset",
];

/// Retries broken TLS sessions and reset connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransientTlsClassifier;

impl TransientTlsClassifier {
    fn io_reset(err: &TransportError) -> bool {
        let mut source = std::error::Error::source(err);
        while let Some(e) = source {
            if let Some(io) = e.downcast_ref::<std::io::Error>() {
                if matches!(
                    io.kind(),
                    std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::UnexpectedEof
                ) {
                    return true;
                }
            }
            source = e.source();
        }
        false
    }
}

impl RetryClassifier for TransientTlsClassifier {
    fn classify(&self, err: &Error) -> Retryability {
        if let Error::Transport(t) = err {
            if Self::io_reset(t) {
                return Retryability::Retry {
                    reset_hint_secs: None,
                };
            }
        }
        let text = error_text(err);
        if TLS_HINTS.iter().any(|hint| text.contains(hint)) {
            Retryability::Retry {
                reset_hint_secs: None,
            }
        } else {
            Retryability::Fatal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorPayload;

    #[test]
    fn test_parse_reset_hint_forms() {
        assert_eq!(parse_reset_hint("Rate limit resets in ~12s"), Some(12));
        assert_eq!(parse_reset_hint("quota RESET IN 3s"), Some(3));
        assert_eq!(parse_reset_hint("resets in 40s, retry later"), Some(40));
        assert_eq!(parse_reset_hint("resets in a while"), None);
        assert_eq!(parse_reset_hint(""), None);
    }

    #[test]
    fn test_rate_limit_by_status() {
        let err = Error::upstream(429, "Request was throttled.");
        assert_eq!(
            RateLimitClassifier.classify(&err),
            Retryability::Retry {
                reset_hint_secs: None
            }
        );
    }

    #[test]
    fn test_rate_limit_by_message_with_hint() {
        let err: Error = ErrorPayload::new(
            ErrorKind::Unknown,
            "You have hit the rate limit; it resets in ~7s",
        )
        .into();
        assert_eq!(
            RateLimitClassifier.classify(&err),
            Retryability::Retry {
                reset_hint_secs: Some(7)
            }
        );
    }

    #[test]
    fn test_rate_limit_ignores_other_failures() {
        assert_eq!(
            RateLimitClassifier.classify(&Error::upstream(500, "boom")),
            Retryability::Fatal
        );
        assert_eq!(
            RateLimitClassifier.classify(&Error::validation("bad prompt")),
            Retryability::Fatal
        );
    }

    #[test]
    fn test_tls_hints() {
        for msg in [
            "SSL: DECRYPTION_FAILED_OR_BAD_RECORD_MAC",
            "tls handshake eof",
            "EOF occurred in violation of protocol (_ssl.c:2427)",
            "Connection reset by peer",
        ] {
            let err = Error::Transport(TransportError::Other(msg.to_string()));
            assert!(
                matches!(TransientTlsClassifier.classify(&err), Retryability::Retry { .. }),
                "{msg} should be retryable"
            );
        }
        assert_eq!(
            TransientTlsClassifier.classify(&Error::upstream(400, "invalid image")),
            Retryability::Fatal
        );
    }
}
