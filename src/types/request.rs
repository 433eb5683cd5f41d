//! Request types, one per operation.
//!
//! Requests are plain data: built by the caller, never mutated by adapters, and
//! serializable so the fixture harness can derive stable keys from them.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::message::Message;
use super::tool::ToolDefinition;

/// Free-form provider parameters merged into the vendor payload.
pub type Parameters = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateInput {
    pub provider: String,
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
}

impl GenerateInput {
    pub fn new(provider: impl Into<String>, model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            messages,
            tools: None,
            temperature: None,
            max_tokens: None,
            parameters: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }
}

/// Reference to an input image. Exactly one of `url`, `base64` or `path`
/// is expected; `url` wins when several are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ImageInput {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn from_bytes(data: &[u8], media_type: impl Into<String>) -> Self {
        Self {
            base64: Some(base64::engine::general_purpose::STANDARD.encode(data)),
            media_type: Some(media_type.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageGenerateInput {
    pub provider: String,
    pub model: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_images: Vec<ImageInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
}

impl ImageGenerateInput {
    pub fn new(provider: impl Into<String>, model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            prompt: prompt.into(),
            input_images: Vec::new(),
            parameters: None,
        }
    }

    pub fn with_image(mut self, image: ImageInput) -> Self {
        self.input_images.push(image);
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshGenerateInput {
    pub provider: String,
    pub model: String,
    pub input_image: ImageInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
}

impl MeshGenerateInput {
    pub fn new(provider: impl Into<String>, model: impl Into<String>, input_image: ImageInput) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            input_image,
            parameters: None,
        }
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

/// Audio source for transcription: one of a local path, base64 payload
/// (optionally a `data:` URL) or remote URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl AudioInput {
    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn from_base64(data: impl Into<String>, media_type: Option<String>) -> Self {
        Self {
            base64: Some(data.into()),
            media_type,
            ..Default::default()
        }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscribeInput {
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub audio: AudioInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl TranscribeInput {
    pub fn new(provider: impl Into<String>, audio: AudioInput) -> Self {
        Self {
            provider: provider.into(),
            model: None,
            audio,
            language: None,
            prompt: None,
            temperature: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_omits_unset_fields() {
        let input = ImageGenerateInput::new("replicate", "owner/model", "a cat");
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["prompt"], "a cat");
        assert!(json.get("parameters").is_none());
        assert!(json.get("inputImages").is_none());
    }

    #[test]
    fn test_image_from_bytes_encodes_base64() {
        let img = ImageInput::from_bytes(b"png", "image/png");
        assert_eq!(img.base64.as_deref(), Some("cG5n"));
        assert_eq!(img.media_type.as_deref(), Some("image/png"));
    }
}
