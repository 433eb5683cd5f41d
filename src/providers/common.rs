//! Input helpers shared by the image and mesh adapters.

use base64::Engine as _;
use bytes::Bytes;
use std::path::Path;

use crate::transport::HttpClient;
use crate::types::ImageInput;
use crate::{Error, Result};

const DEFAULT_IMAGE_MIME: &str = "image/png";

/// Splits a `data:<mime>;base64,<payload>` URL. The mime defaults to
/// `image/png` when the header omits it.
pub(crate) fn parse_data_url(raw: &str) -> Option<(String, String)> {
    let rest = raw.strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    let mime = meta.split(';').next().unwrap_or_default();
    let mime = if mime.is_empty() { DEFAULT_IMAGE_MIME } else { mime };
    Some((mime.to_string(), data.to_string()))
}

pub(crate) fn is_http_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
        .unwrap_or(false)
}

pub(crate) fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => DEFAULT_IMAGE_MIME,
    }
}

/// Best-effort mime detection from magic bytes.
pub(crate) fn sniff_image_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"\x89PNG") {
        "image/png"
    } else if bytes.starts_with(b"\xFF\xD8\xFF") {
        "image/jpeg"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else {
        "application/octet-stream"
    }
}

fn decode_base64(data: &str) -> Result<Bytes> {
    base64::engine::general_purpose::STANDARD
        .decode(data.trim().as_bytes())
        .map(Bytes::from)
        .map_err(|e| Error::validation(format!("Invalid base64 image payload: {}", e)))
}

fn missing_image() -> Error {
    Error::validation("Image input requires url, base64, or path")
}

/// Reference usable directly in a vendor JSON payload: remote URLs pass
/// through; everything else becomes a base64 data URL.
pub(crate) async fn image_reference(input: &ImageInput) -> Result<String> {
    if let Some(url) = input.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        return Ok(url.to_string());
    }
    if let Some(b64) = input.base64.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
        if b64.starts_with("data:") {
            return Ok(b64.to_string());
        }
        let mime = input.media_type.as_deref().unwrap_or(DEFAULT_IMAGE_MIME);
        return Ok(format!("data:{};base64,{}", mime, b64));
    }
    if let Some(path) = input.path.as_deref() {
        let path = Path::new(path);
        let data = tokio::fs::read(path).await?;
        let mime = input.media_type.as_deref().unwrap_or_else(|| mime_for_path(path));
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        return Ok(format!("data:{};base64,{}", mime, encoded));
    }
    Err(missing_image())
}

/// Raw bytes plus mime type, downloading remote URLs.
pub(crate) async fn image_bytes(input: &ImageInput, http: &HttpClient) -> Result<(Bytes, String)> {
    if let Some(url) = input.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        if let Some((mime, data)) = parse_data_url(url) {
            return Ok((decode_base64(&data)?, mime));
        }
        if !is_http_url(url) {
            return Err(Error::validation(format!("Unsupported image url: {}", url)));
        }
        let downloaded = http.download(url).await?;
        let mime = input
            .media_type
            .clone()
            .or(downloaded.content_type)
            .unwrap_or_else(|| sniff_image_mime(&downloaded.bytes).to_string());
        return Ok((downloaded.bytes, mime));
    }
    if let Some(b64) = input.base64.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
        let (mime, data) = match parse_data_url(b64) {
            Some((mime, data)) => (input.media_type.clone().unwrap_or(mime), data),
            None => (
                input
                    .media_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string()),
                b64.to_string(),
            ),
        };
        return Ok((decode_base64(&data)?, mime));
    }
    if let Some(path) = input.path.as_deref() {
        let path = Path::new(path);
        let data = tokio::fs::read(path).await?;
        let mime = input
            .media_type
            .clone()
            .unwrap_or_else(|| mime_for_path(path).to_string());
        return Ok((Bytes::from(data), mime));
    }
    Err(missing_image())
}
