//! 远程厂商适配器
//!
//! Remote provider adapters. Each client resolves its credential at
//! construction and fails with `DependencyUnavailable` when none is found.
//!
//! | Provider | Client | Operations |
//! |----------|--------|------------|
//! | Replicate | [`ReplicateClient`] | `generate_image`, background removal, multi-view, depth |
//! | Gemini | [`GeminiImageClient`] | `generate_image` (image editing) |
//! | Meshy | [`MeshyClient`] | `generate_mesh` |

pub(crate) mod common;
pub mod gemini;
pub mod meshy;
pub mod replicate;

pub use gemini::GeminiImageClient;
pub use meshy::{MeshyClient, MeshyTask, TaskStatus};
pub use replicate::{Prediction, RemoveBackgroundOptions, ReplicateClient};
