//! 弹性模块：指数退避、抖动与按厂商区分的重试判定。
//!
//! # Retry and backoff
//!
//! Provider adapters wrap each vendor call in a [`Retrier`]. Every attempt
//! returns a plain `Result`; on failure the retrier asks the provider's
//! [`RetryClassifier`] whether the error is transient and, if so, waits before
//! trying again.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`RetryConfig`] | Attempt ceiling, base and max delay; delay computation |
//! | [`RateLimitClassifier`] | Retries HTTP 429 / throttling (Replicate, Meshy) |
//! | [`TransientTlsClassifier`] | Retries broken TLS connections (Gemini) |
//! | [`parse_reset_hint`] | Reads the vendor "resets in ~Ns" hint |
//!
//! Delay for attempt `n` (0-based) is `min(max_delay, base_delay * 2^n)` plus
//! uniform jitter in `[0, min(1s, 10%))`. A vendor reset hint of `N` seconds
//! replaces that with `min(max_delay, N + 1)`.
//!
//! ```rust
//! use ai_kit::resilience::RetryConfig;
//! use std::time::Duration;
//!
//! let cfg = RetryConfig::new(3, Duration::from_secs(2), Duration::from_secs(30));
//! assert_eq!(cfg.backoff_delay(0), Duration::from_secs(2));
//! assert_eq!(cfg.backoff_delay(4), Duration::from_secs(30));
//! ```

mod backoff;
mod classify;
mod retry;

pub use backoff::RetryConfig;
pub use classify::{
    parse_reset_hint, RateLimitClassifier, RetryClassifier, Retryability, TransientTlsClassifier,
};
pub use retry::Retrier;
