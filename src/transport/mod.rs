//! HTTP boundary: JSON, streaming, multipart and download helpers.

mod http;

pub use http::{ensure_success, Downloaded, FilePart, HttpClient, TransportError};
