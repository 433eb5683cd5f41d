//! 夹具测试替身：按请求哈希回放预置输出。
//!
//! # Fixture Test Harness
//!
//! [`FixtureAdapter`] is a deterministic stand-in for a real provider. Each
//! request is reduced to a key by [`fixture_key`] (or a custom key function);
//! the adapter records the call, looks the key up in its fixture table and
//! replays the canned output.
//!
//! Streaming calls replay `stream` chunks when present, otherwise chunks are
//! synthesized from the `generate` output by [`build_stream_chunks`].

mod fixture;
mod key;
mod stream;

pub use fixture::{load_fixtures, FixtureAdapter, FixtureCalls, FixtureEntry, KeyFn};
pub use key::{fixture_key, FixtureInput, FixtureKeyInput};
pub use stream::{build_stream_chunks, DEFAULT_CHUNK_SIZE};
