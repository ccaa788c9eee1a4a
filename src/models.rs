//! Data models and structures
//!
//! Defines requests, results, operation handles and configuration shared by
//! the remote client, the job tracker and the tool controller.

use crate::ai::gemini::client::DEFAULT_BASE_URL;
use crate::codec::SampleBuffer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// One tool per remote capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    ImageCreate,
    ImageEdit,
    IdeaSearch,
    SpeechSynthesis,
    VideoCreate,
}

impl Tool {
    pub const ALL: [Tool; 5] = [
        Tool::ImageCreate,
        Tool::ImageEdit,
        Tool::IdeaSearch,
        Tool::SpeechSynthesis,
        Tool::VideoCreate,
    ];
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tool::ImageCreate => "image",
            Tool::ImageEdit => "edit",
            Tool::IdeaSearch => "ideas",
            Tool::SpeechSynthesis => "speech",
            Tool::VideoCreate => "video",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
        }
    }
}

/// Prebuilt speech voices offered by the TTS model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Voice {
    #[default]
    Kore,
    Puck,
    Charon,
    Fenrir,
    Zephyr,
}

impl Voice {
    pub const ALL: [Voice; 5] = [
        Voice::Kore,
        Voice::Puck,
        Voice::Charon,
        Voice::Fenrir,
        Voice::Zephyr,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Voice::Kore => "Kore",
            Voice::Puck => "Puck",
            Voice::Charon => "Charon",
            Voice::Fenrir => "Fenrir",
            Voice::Zephyr => "Zephyr",
        }
    }
}

/// A user's request, fixed at submission time.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationRequest {
    ImageCreate {
        prompt: String,
    },
    ImageEdit {
        prompt: String,
        attachments: Vec<PathBuf>,
    },
    IdeaSearch {
        topic: String,
    },
    SpeechSynthesis {
        text: String,
        voice: Voice,
    },
    VideoCreate {
        prompt: String,
        aspect_ratio: AspectRatio,
        image: Option<PathBuf>,
    },
}

impl GenerationRequest {
    pub fn tool(&self) -> Tool {
        match self {
            GenerationRequest::ImageCreate { .. } => Tool::ImageCreate,
            GenerationRequest::ImageEdit { .. } => Tool::ImageEdit,
            GenerationRequest::IdeaSearch { .. } => Tool::IdeaSearch,
            GenerationRequest::SpeechSynthesis { .. } => Tool::SpeechSynthesis,
            GenerationRequest::VideoCreate { .. } => Tool::VideoCreate,
        }
    }

    /// The free-text input every tool requires.
    pub fn text(&self) -> &str {
        match self {
            GenerationRequest::ImageCreate { prompt }
            | GenerationRequest::ImageEdit { prompt, .. }
            | GenerationRequest::VideoCreate { prompt, .. } => prompt,
            GenerationRequest::IdeaSearch { topic } => topic,
            GenerationRequest::SpeechSynthesis { text, .. } => text,
        }
    }
}

/// Base64 payload ready to be embedded in a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAsset {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

impl GeneratedImage {
    /// Renders the image as a `data:` URL suitable for direct display.
    pub fn data_url(&self) -> String {
        use base64::Engine as _;
        format!(
            "data:{};base64,{}",
            self.mime_type,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// A web source the service attributes as support for generated text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Citation {
    pub uri: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdeaResult {
    pub text: String,
    pub citations: Vec<Citation>,
}

/// A displayable link for a citation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSource {
    pub uri: String,
    pub label: String,
}

impl IdeaResult {
    /// Citations that can be linked to, in order. Entries without a URI are
    /// dropped and a missing title falls back to the URI.
    pub fn web_sources(&self) -> Vec<WebSource> {
        self.citations
            .iter()
            .filter_map(|c| {
                let uri = c.uri.as_deref().filter(|u| !u.is_empty())?;
                let label = c
                    .title
                    .as_deref()
                    .filter(|t| !t.is_empty())
                    .unwrap_or(uri);
                Some(WebSource {
                    uri: uri.to_string(),
                    label: label.to_string(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedVideo {
    pub locator: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationResult {
    Image(GeneratedImage),
    Ideas(IdeaResult),
    Speech(SampleBuffer),
    Video(GeneratedVideo),
}

/// A long-running job on the remote service.
///
/// The handle is a snapshot: refreshing it returns a new handle for the same
/// `name`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OperationHandle {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<VideoOperationResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

impl OperationHandle {
    /// The download locator of the first generated video, if any.
    pub fn video_locator(&self) -> Option<&str> {
        self.response
            .as_ref()?
            .generate_video_response
            .as_ref()?
            .generated_samples
            .first()?
            .video
            .as_ref()?
            .uri
            .as_deref()
            .filter(|uri| !uri.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoOperationResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVideoResponse {
    #[serde(default)]
    pub generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeneratedSample {
    #[serde(default)]
    pub video: Option<VideoRef>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VideoRef {
    #[serde(default)]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub image_model: String,
    pub edit_model: String,
    pub idea_model: String,
    pub tts_model: String,
    pub video_model: String,
    pub video_poll_interval: Duration,
    pub video_max_polls: u32,
    pub output_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> crate::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            api_key: std::env::var("GEMINI_API_KEY")
                .map_err(|_| crate::Error::Config("GEMINI_API_KEY not set".to_string()))?,
            base_url: env_or("GEMINI_BASE_URL", DEFAULT_BASE_URL),
            image_model: env_or("IMAGE_MODEL", "imagen-4.0-generate-001"),
            edit_model: env_or("EDIT_MODEL", "gemini-2.5-flash-image"),
            idea_model: env_or("IDEA_MODEL", "gemini-2.5-flash"),
            tts_model: env_or("TTS_MODEL", "gemini-2.5-flash-preview-tts"),
            video_model: env_or("VIDEO_MODEL", "veo-3.1-fast-generate-preview"),
            video_poll_interval: Duration::from_secs(parse_nonzero_env(
                "VIDEO_POLL_INTERVAL_SECS",
                10,
            )?),
            video_max_polls: parse_nonzero_env("VIDEO_MAX_POLLS", 60)?,
            output_dir: PathBuf::from(env_or("OUTPUT_DIR", "output")),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> crate::Result<T>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| crate::Error::Config(format!("Invalid {} '{}': {}", key, raw, e))),
        _ => Ok(default),
    }
}

fn parse_nonzero_env<T>(key: &str, default: T) -> crate::Result<T>
where
    T: std::str::FromStr + Default + PartialEq,
    T::Err: fmt::Display,
{
    let value = parse_env(key, default)?;
    if value == T::default() {
        return Err(crate::Error::Config(format!(
            "{} must be greater than zero",
            key
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_operation_handle_pending_defaults() {
        let handle: OperationHandle =
            serde_json::from_str(r#"{"name": "models/veo/operations/abc"}"#).unwrap();
        assert!(!handle.done);
        assert!(handle.response.is_none());
        assert!(handle.video_locator().is_none());
    }

    #[test]
    fn test_operation_handle_extracts_locator() {
        let handle: OperationHandle = serde_json::from_value(serde_json::json!({
            "name": "models/veo/operations/abc",
            "done": true,
            "response": {
                "@type": "type.googleapis.com/google.ai.generativelanguage.v1beta.PredictLongRunningResponse",
                "generateVideoResponse": {
                    "generatedSamples": [
                        { "video": { "uri": "https://example.com/files/v1:download?alt=media" } }
                    ]
                }
            }
        }))
        .unwrap();

        assert_eq!(
            handle.video_locator(),
            Some("https://example.com/files/v1:download?alt=media")
        );
    }

    #[test]
    fn test_operation_handle_response_without_samples() {
        let handle: OperationHandle = serde_json::from_value(serde_json::json!({
            "name": "op",
            "done": true,
            "response": { "generateVideoResponse": {} }
        }))
        .unwrap();
        assert!(handle.response.is_some());
        assert!(handle.video_locator().is_none());
    }

    #[test]
    fn test_operation_handle_error() {
        let handle: OperationHandle = serde_json::from_value(serde_json::json!({
            "name": "op",
            "done": true,
            "error": { "code": 3, "message": "prompt rejected" }
        }))
        .unwrap();
        assert_eq!(
            handle.error,
            Some(OperationError {
                code: 3,
                message: "prompt rejected".to_string()
            })
        );
    }

    #[test]
    fn test_web_sources_drop_citations_without_uri() {
        let ideas = IdeaResult {
            text: "ideas".to_string(),
            citations: vec![
                Citation {
                    uri: Some("https://a.example".to_string()),
                    title: Some("A".to_string()),
                },
                Citation {
                    uri: None,
                    title: Some("orphan".to_string()),
                },
                Citation {
                    uri: Some("https://b.example".to_string()),
                    title: None,
                },
            ],
        };

        assert_eq!(
            ideas.web_sources(),
            vec![
                WebSource {
                    uri: "https://a.example".to_string(),
                    label: "A".to_string()
                },
                WebSource {
                    uri: "https://b.example".to_string(),
                    label: "https://b.example".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_request_text_and_tool() {
        let request = GenerationRequest::SpeechSynthesis {
            text: "hello".to_string(),
            voice: Voice::Puck,
        };
        assert_eq!(request.tool(), Tool::SpeechSynthesis);
        assert_eq!(request.text(), "hello");
    }

    #[test]
    fn test_data_url() {
        let image = GeneratedImage {
            bytes: vec![1, 2, 3],
            mime_type: "image/png".to_string(),
            width: 1,
            height: 1,
        };
        assert_eq!(image.data_url(), "data:image/png;base64,AQID");
    }

    #[test]
    fn test_aspect_ratio_serializes_as_ratio() {
        assert_eq!(
            serde_json::to_string(&AspectRatio::Portrait).unwrap(),
            "\"9:16\""
        );
    }

    #[test]
    fn test_env_helpers() {
        std::env::remove_var("MEDIAFORGE_TEST_UNSET");
        assert_eq!(parse_env::<u32>("MEDIAFORGE_TEST_UNSET", 60).unwrap(), 60);

        std::env::set_var("MEDIAFORGE_TEST_POLLS", " 12 ");
        assert_eq!(parse_env::<u32>("MEDIAFORGE_TEST_POLLS", 60).unwrap(), 12);

        std::env::set_var("MEDIAFORGE_TEST_BAD_POLLS", "often");
        assert!(matches!(
            parse_env::<u32>("MEDIAFORGE_TEST_BAD_POLLS", 60),
            Err(crate::Error::Config(_))
        ));

        std::env::set_var("MEDIAFORGE_TEST_BLANK", "  ");
        assert_eq!(env_or("MEDIAFORGE_TEST_BLANK", "fallback"), "fallback");
    }

    #[test]
    fn test_zero_poll_settings_are_rejected() {
        std::env::set_var("MEDIAFORGE_TEST_ZERO_INTERVAL", "0");
        let err = parse_nonzero_env::<u64>("MEDIAFORGE_TEST_ZERO_INTERVAL", 10).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: MEDIAFORGE_TEST_ZERO_INTERVAL must be greater than zero"
        );

        std::env::remove_var("MEDIAFORGE_TEST_UNSET_POLLS");
        assert_eq!(
            parse_nonzero_env::<u32>("MEDIAFORGE_TEST_UNSET_POLLS", 60).unwrap(),
            60
        );
    }
}
