//! 实例缓存模块：按缓存键复用已构建的 Kit 与适配器。
//!
//! # Instance Registry
//!
//! [`KitRegistry`] memoizes expensive-to-build values (kits, provider clients)
//! per cache key. Construction is compute-if-absent: the first caller for a
//! key runs the factory, concurrent callers for the same key wait on the same
//! per-key cell, and all of them observe the same `Arc`.
//!
//! Entries live until [`KitRegistry::invalidate`] or [`KitRegistry::clear`];
//! a failed factory leaves the key empty so the next call retries.
//!
//! ```rust
//! use ai_kit::cache::KitRegistry;
//!
//! # async fn demo() -> ai_kit::Result<()> {
//! let registry: KitRegistry<String, Vec<String>> = KitRegistry::new();
//! let models = registry
//!     .get_or_init("replicate".to_string(), || async { Ok(vec!["owner/model".to_string()]) })
//!     .await?;
//! assert_eq!(models.len(), 1);
//! # Ok(())
//! # }
//! ```

mod registry;

pub use registry::KitRegistry;
