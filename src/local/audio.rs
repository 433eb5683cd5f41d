//! Audio input materialization for local engines that need a file path.

use base64::Engine as _;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::transport::HttpClient;
use crate::types::AudioInput;
use crate::{Error, Result};

const TEMP_PREFIX: &str = "ai_kit_audio_";

/// An audio file on disk. Temporary files are removed when dropped; caller
/// supplied paths are left alone.
#[derive(Debug)]
pub struct MaterializedAudio {
    path: PathBuf,
    temporary: bool,
}

impl MaterializedAudio {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }
}

impl Drop for MaterializedAudio {
    fn drop(&mut self) {
        if !self.temporary {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove temp audio");
            }
        }
    }
}

/// Temp-file suffix from a media type; matching is by substring.
pub fn suffix_for_media(media_type: Option<&str>) -> &'static str {
    let Some(media) = media_type.map(str::to_ascii_lowercase) else {
        return ".audio";
    };
    if media.contains("wav") {
        ".wav"
    } else if media.contains("mpeg") {
        ".mp3"
    } else if media.contains("mp4") {
        ".mp4"
    } else if media.contains("webm") {
        ".webm"
    } else if media.contains("ogg") {
        ".ogg"
    } else {
        ".audio"
    }
}

/// Decodes plain base64 or a `data:` URL. An explicit media type wins over
/// the data URL header; the fallback is `application/octet-stream`.
pub(crate) fn decode_base64_audio(raw: &str, explicit: Option<&str>) -> Result<(Vec<u8>, String)> {
    let mut media_type = explicit.unwrap_or_default().to_string();
    let payload = match raw.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest.split_once(',').unwrap_or((rest, ""));
            if media_type.is_empty() && header.contains(';') {
                media_type = header.split(';').next().unwrap_or_default().to_string();
            }
            payload
        }
        None => raw,
    };
    if media_type.is_empty() {
        media_type = "application/octet-stream".to_string();
    }
    let data = base64::engine::general_purpose::STANDARD
        .decode(payload.trim().as_bytes())
        .map_err(|e| {
            Error::validation(format!("Invalid base64 audio payload: {}", e)).with_provider("local")
        })?;
    Ok((data, media_type))
}

async fn write_temp_audio(data: &[u8], media_type: Option<&str>) -> Result<MaterializedAudio> {
    let name = format!(
        "{}{}{}",
        TEMP_PREFIX,
        uuid::Uuid::new_v4().simple(),
        suffix_for_media(media_type)
    );
    let path = std::env::temp_dir().join(name);
    // Guard first so a failed write still cleans up.
    let audio = MaterializedAudio {
        path,
        temporary: true,
    };
    tokio::fs::write(&audio.path, data).await?;
    debug!(path = %audio.path.display(), size = data.len(), "wrote temp audio");
    Ok(audio)
}

/// Resolves `audio` to a file: `path` is used as-is, `base64` and `url` are
/// written to a temporary file.
pub async fn materialize_audio(audio: &AudioInput, http: &HttpClient) -> Result<MaterializedAudio> {
    if let Some(path) = audio.path.as_deref().filter(|p| !p.is_empty()) {
        return Ok(MaterializedAudio {
            path: PathBuf::from(path),
            temporary: false,
        });
    }
    if let Some(b64) = audio.base64.as_deref().filter(|b| !b.is_empty()) {
        let (data, media_type) = decode_base64_audio(b64, audio.media_type.as_deref())?;
        return write_temp_audio(&data, Some(&media_type)).await;
    }
    if let Some(url) = audio.url.as_deref().filter(|u| !u.is_empty()) {
        let downloaded = http.download(url).await.map_err(|e| e.with_provider("local"))?;
        let media_type = audio.media_type.clone().or(downloaded.content_type);
        return write_temp_audio(&downloaded.bytes, media_type.as_deref()).await;
    }
    Err(
        Error::validation("Transcribe input requires audio.url, audio.base64, or audio.path")
            .with_provider("local"),
    )
}
