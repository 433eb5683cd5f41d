use async_trait::async_trait;
use lru::LruCache;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info};

use super::audio::materialize_audio;
use crate::adapter::ProviderAdapter;
use crate::config::{HttpConfig, KitConfig, WhisperConfig};
use crate::error::ErrorPayload;
use crate::error_kind::ErrorKind;
use crate::transport::HttpClient;
use crate::types::{TranscribeInput, TranscribeOutput, TranscriptSegment};
use crate::{Error, Result};

pub const PROVIDER: &str = "local";

const MODEL_CACHE_SIZE: usize = 4;
const DEVICE_ENV: &str = "AI_KIT_WHISPER_DEVICE";

/// Decoding options passed to a loaded model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeOptions {
    pub language: Option<String>,
    pub prompt: Option<String>,
    pub temperature: Option<f32>,
    pub fp16: bool,
}

/// A loaded transcription model. The result is Whisper-shaped JSON:
/// `{text, language, duration?, segments: [{start, end, text}]}`.
#[async_trait]
pub trait WhisperModel: Send + Sync {
    async fn transcribe(&self, audio: &Path, options: &DecodeOptions) -> Result<Value>;
}

/// Loads models by `(name, device, download_root)`.
pub trait WhisperBackend: Send + Sync {
    fn load_model(
        &self,
        name: &str,
        device: &str,
        download_root: Option<&str>,
    ) -> Result<Arc<dyn WhisperModel>>;
}

/// Device from explicit configuration, then `AI_KIT_WHISPER_DEVICE`, then `cpu`.
pub fn resolve_device(explicit: Option<&str>) -> String {
    explicit
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(String::from)
        .or_else(|| {
            std::env::var(DEVICE_ENV)
                .ok()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
        })
        .unwrap_or_else(|| "cpu".to_string())
}

/// Looks up `program` on `PATH`; a value containing a path separator is
/// checked directly.
fn find_executable(program: &str) -> Option<PathBuf> {
    let direct = Path::new(program);
    if direct.components().count() > 1 {
        return direct.is_file().then(|| direct.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Engine backed by the `whisper` command-line tool.
#[derive(Debug, Clone)]
pub struct CliWhisperBackend {
    executable: PathBuf,
}

impl CliWhisperBackend {
    /// Fails with `DependencyUnavailable` when the executable cannot be found.
    pub fn new(executable: &str) -> Result<Self> {
        let executable = find_executable(executable).ok_or_else(|| {
            Error::dependency_unavailable(format!(
                "Whisper executable '{}' not found on PATH; install openai-whisper",
                executable
            ))
            .with_provider(PROVIDER)
        })?;
        Ok(Self { executable })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

impl WhisperBackend for CliWhisperBackend {
    fn load_model(
        &self,
        name: &str,
        device: &str,
        download_root: Option<&str>,
    ) -> Result<Arc<dyn WhisperModel>> {
        Ok(Arc::new(CliWhisperModel {
            executable: self.executable.clone(),
            model: name.to_string(),
            device: device.to_string(),
            download_root: download_root.map(String::from),
        }))
    }
}

struct CliWhisperModel {
    executable: PathBuf,
    model: String,
    device: String,
    download_root: Option<String>,
}

/// Scratch directory for CLI output, removed on drop.
struct OutputDir(PathBuf);

impl Drop for OutputDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

impl CliWhisperModel {
    fn args(&self, audio: &Path, out_dir: &Path, options: &DecodeOptions) -> Vec<String> {
        let mut args = vec![
            audio.to_string_lossy().into_owned(),
            "--model".to_string(),
            self.model.clone(),
            "--device".to_string(),
            self.device.clone(),
            "--output_format".to_string(),
            "json".to_string(),
            "--output_dir".to_string(),
            out_dir.to_string_lossy().into_owned(),
            "--fp16".to_string(),
            if options.fp16 { "True" } else { "False" }.to_string(),
            "--verbose".to_string(),
            "False".to_string(),
        ];
        if let Some(root) = &self.download_root {
            args.extend(["--model_dir".to_string(), root.clone()]);
        }
        if let Some(language) = &options.language {
            args.extend(["--language".to_string(), language.clone()]);
        }
        if let Some(prompt) = &options.prompt {
            args.extend(["--initial_prompt".to_string(), prompt.clone()]);
        }
        if let Some(temperature) = options.temperature {
            args.extend(["--temperature".to_string(), temperature.to_string()]);
        }
        args
    }
}

#[async_trait]
impl WhisperModel for CliWhisperModel {
    async fn transcribe(&self, audio: &Path, options: &DecodeOptions) -> Result<Value> {
        let out_dir = OutputDir(
            std::env::temp_dir().join(format!("ai_kit_whisper_{}", uuid::Uuid::new_v4().simple())),
        );
        tokio::fs::create_dir_all(&out_dir.0).await?;

        let output = Command::new(&self.executable)
            .args(self.args(audio, &out_dir.0, options))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Kit(
                ErrorPayload::new(
                    ErrorKind::TaskFailed,
                    format!("whisper exited with {}: {}", output.status, stderr.trim()),
                )
                .with_provider(PROVIDER),
            ));
        }

        let stem = audio
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        let raw = tokio::fs::read_to_string(out_dir.0.join(format!("{}.json", stem))).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

type ModelKey = (String, String, Option<String>);

/// Local transcription adapter (provider `local`).
pub struct LocalWhisperAdapter {
    backend: Arc<dyn WhisperBackend>,
    http: HttpClient,
    default_model: String,
    device: Option<String>,
    download_root: Option<String>,
    models: Mutex<LruCache<ModelKey, Arc<dyn WhisperModel>>>,
}

impl LocalWhisperAdapter {
    /// Uses the CLI engine; fails when the `whisper` executable is missing.
    pub fn new(cfg: &KitConfig) -> Result<Self> {
        let backend = CliWhisperBackend::new(&cfg.whisper.executable)?;
        Self::with_backend(Arc::new(backend), &cfg.whisper, &cfg.http)
    }

    pub fn with_backend(
        backend: Arc<dyn WhisperBackend>,
        cfg: &WhisperConfig,
        http: &HttpConfig,
    ) -> Result<Self> {
        let capacity = NonZeroUsize::new(MODEL_CACHE_SIZE)
            .ok_or_else(|| Error::validation("model cache size must be non-zero"))?;
        Ok(Self {
            backend,
            http: HttpClient::new(http)?,
            default_model: cfg.default_model.clone(),
            device: cfg.device.clone(),
            download_root: cfg.download_root.clone(),
            models: Mutex::new(LruCache::new(capacity)),
        })
    }

    fn model(&self, name: &str, device: &str) -> Result<Arc<dyn WhisperModel>> {
        let key = (name.to_string(), device.to_string(), self.download_root.clone());
        let mut models = self
            .models
            .lock()
            .map_err(|e| Error::internal(format!("Whisper model cache lock poisoned: {}", e)))?;
        if let Some(model) = models.get(&key) {
            debug!(model = name, device, "whisper model cache hit");
            return Ok(model.clone());
        }
        let model = self
            .backend
            .load_model(name, device, self.download_root.as_deref())
            .map_err(|e| e.with_provider(PROVIDER))?;
        models.put(key, model.clone());
        Ok(model)
    }
}

/// Builds the normalized output; malformed segments are skipped and an empty
/// list becomes `None`.
pub(crate) fn normalize_result(result: Value) -> TranscribeOutput {
    let segments: Vec<TranscriptSegment> = result
        .get("segments")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|s| s.is_object())
                .map(|s| TranscriptSegment {
                    start: s.get("start").and_then(Value::as_f64).unwrap_or(0.0),
                    end: s.get("end").and_then(Value::as_f64).unwrap_or(0.0),
                    text: match s.get("text") {
                        Some(Value::String(t)) => t.clone(),
                        Some(Value::Null) | None => String::new(),
                        Some(other) => other.to_string(),
                    },
                })
                .collect()
        })
        .unwrap_or_default();

    TranscribeOutput {
        text: result.get("text").and_then(Value::as_str).map(String::from),
        language: result.get("language").and_then(Value::as_str).map(String::from),
        duration: result.get("duration").and_then(Value::as_f64),
        segments: (!segments.is_empty()).then_some(segments),
        raw: Some(result),
    }
}

#[async_trait]
impl ProviderAdapter for LocalWhisperAdapter {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn transcribe(&self, input: &TranscribeInput) -> Result<TranscribeOutput> {
        let start = Instant::now();
        let model_name = input
            .model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(self.default_model.as_str());
        let device = resolve_device(self.device.as_deref());
        let model = self.model(model_name, &device)?;

        let audio = materialize_audio(&input.audio, &self.http).await?;
        let options = DecodeOptions {
            language: input.language.clone().filter(|l| !l.is_empty()),
            prompt: input.prompt.clone().filter(|p| !p.is_empty()),
            temperature: input.temperature,
            fp16: device != "cpu",
        };
        let result = model
            .transcribe(audio.path(), &options)
            .await
            .map_err(|e| e.with_provider(PROVIDER))?;
        drop(audio);

        let output = normalize_result(result);
        info!(
            model = model_name,
            device = device.as_str(),
            segments = output.segments.as_ref().map_or(0, Vec::len),
            duration_ms = start.elapsed().as_millis() as u64,
            "local transcription finished"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AudioInput;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeModel {
        seen: Mutex<Vec<(PathBuf, DecodeOptions)>>,
        fail: bool,
    }

    #[async_trait]
    impl WhisperModel for FakeModel {
        async fn transcribe(&self, audio: &Path, options: &DecodeOptions) -> Result<Value> {
            assert!(audio.exists());
            self.seen
                .lock()
                .unwrap()
                .push((audio.to_path_buf(), options.clone()));
            if self.fail {
                return Err(Error::validation("decoder crashed"));
            }
            Ok(json!({
                "text": " hello world",
                "language": "en",
                "segments": [
                    {"start": 0, "end": 1.5, "text": " hello"},
                    "garbage",
                    {"start": 1.5, "end": 3.0, "text": " world"}
                ]
            }))
        }
    }

    struct FakeBackend {
        model: Arc<FakeModel>,
        loads: AtomicUsize,
    }

    impl WhisperBackend for FakeBackend {
        fn load_model(&self, _: &str, _: &str, _: Option<&str>) -> Result<Arc<dyn WhisperModel>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.model.clone())
        }
    }

    fn adapter(fail: bool, device: Option<&str>) -> (LocalWhisperAdapter, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend {
            model: Arc::new(FakeModel {
                seen: Mutex::new(Vec::new()),
                fail,
            }),
            loads: AtomicUsize::new(0),
        });
        let cfg = WhisperConfig {
            device: device.map(String::from),
            ..Default::default()
        };
        let adapter =
            LocalWhisperAdapter::with_backend(backend.clone(), &cfg, &HttpConfig::default()).unwrap();
        (adapter, backend)
    }

    #[tokio::test]
    async fn test_transcribe_normalizes_segments_and_caches_model() {
        let (adapter, backend) = adapter(false, Some("cuda"));
        let input = TranscribeInput::new("local", AudioInput::from_base64("aGk=", Some("audio/wav".into())))
            .with_language("en");

        let out = adapter.transcribe(&input).await.unwrap();
        assert_eq!(out.text.as_deref(), Some(" hello world"));
        let segments = out.segments.unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start, 0.0);
        assert_eq!(segments[1].text, " world");

        adapter.transcribe(&input).await.unwrap();
        assert_eq!(backend.loads.load(Ordering::SeqCst), 1);

        let seen = backend.model.seen.lock().unwrap();
        assert!(seen[0].1.fp16);
        assert_eq!(seen[0].1.language.as_deref(), Some("en"));
        // Temp file removed after each call.
        assert!(!seen[0].0.exists());
    }

    #[tokio::test]
    async fn test_temp_audio_removed_after_failure() {
        let (adapter, backend) = adapter(true, Some("cpu"));
        let input = TranscribeInput::new("local", AudioInput::from_base64("aGk=", None));
        let err = adapter.transcribe(&input).await.unwrap_err();
        assert_eq!(err.provider(), Some(PROVIDER));

        let seen = backend.model.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].1.fp16);
        assert!(!seen[0].0.exists());
    }

    #[test]
    fn test_normalize_empty_segments_is_none() {
        let out = normalize_result(json!({"text": "x", "segments": []}));
        assert!(out.segments.is_none());
        assert_eq!(out.text.as_deref(), Some("x"));
    }

    #[test]
    fn test_explicit_device_wins() {
        assert_eq!(resolve_device(Some("mps")), "mps");
    }

    #[test]
    fn test_missing_executable_is_dependency_unavailable() {
        let err = CliWhisperBackend::new("ai-kit-no-such-whisper-binary").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyUnavailable);
    }

    #[test]
    fn test_cli_args() {
        let model = CliWhisperModel {
            executable: PathBuf::from("whisper"),
            model: "small".into(),
            device: "cpu".into(),
            download_root: Some("/models".into()),
        };
        let options = DecodeOptions {
            language: Some("de".into()),
            ..Default::default()
        };
        let args = model.args(Path::new("/tmp/a.wav"), Path::new("/tmp/out"), &options);
        assert_eq!(args[0], "/tmp/a.wav");
        assert!(args.windows(2).any(|w| w[0] == "--model" && w[1] == "small"));
        assert!(args.windows(2).any(|w| w[0] == "--fp16" && w[1] == "False"));
        assert!(args.windows(2).any(|w| w[0] == "--model_dir" && w[1] == "/models"));
        assert!(args.windows(2).any(|w| w[0] == "--language" && w[1] == "de"));
    }
}
