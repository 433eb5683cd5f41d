//! 本地转写模块
//!
//! Local speech transcription. [`LocalWhisperAdapter`] materializes the audio
//! input to a file, loads (and caches) a Whisper model through a pluggable
//! [`WhisperBackend`], and normalizes the engine result.
//!
//! The default backend drives the `whisper` command-line tool and checks at
//! construction that the executable exists.

mod audio;
mod transcriber;

pub use audio::{materialize_audio, suffix_for_media, MaterializedAudio};
pub use transcriber::{
    resolve_device, CliWhisperBackend, DecodeOptions, LocalWhisperAdapter, WhisperBackend,
    WhisperModel, PROVIDER,
};
