//! 输出归一化：将厂商返回的异构结果转换为固定的输出形状。
//!
//! # Output coercion
//!
//! Vendor calls return bytes, readable handles, URLs, mappings or lists of
//! any of those. Each adapter first translates its response into the closed
//! [`RawOutput`] union, then [`OutputCoercer`] normalizes it into a single
//! blob, an ordered list of blobs, or a mapping of named blobs.
//!
//! [`split_grid_image`] handles models that pack several views into one image.

mod coerce;
mod grid;

pub use coerce::{OutputCoercer, RawOutput};
pub use grid::split_grid_image;
