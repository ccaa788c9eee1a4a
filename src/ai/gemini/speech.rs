use super::client::GeminiHttpClient;
use super::types::{Content, GenerateContentResponse, Part};
use crate::ai::{require_text, SpeechService};
use crate::models::Voice;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct SpeechRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: SpeechGenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechGenerationConfig {
    response_modalities: Vec<String>,
    speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

/// Text-to-speech client. Returns raw 24 kHz PCM as base64.
pub struct GeminiSpeechClient {
    http: GeminiHttpClient,
}

impl GeminiSpeechClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::new_with_client(api_key, model, reqwest::Client::new())
    }

    pub fn new_with_client(api_key: String, model: String, client: reqwest::Client) -> Self {
        Self {
            http: GeminiHttpClient::new_with_client(
                api_key,
                model,
                Duration::from_secs(120),
                client,
            ),
        }
    }
}

super::impl_with_gemini_base_url!(GeminiSpeechClient);

#[async_trait]
impl SpeechService for GeminiSpeechClient {
    async fn synthesize_speech(&self, text: &str, voice: Voice) -> Result<String> {
        require_text(text, "Text")?;

        let request = SpeechRequest {
            contents: vec![Content::user(vec![Part::text(text)])],
            generation_config: SpeechGenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: voice.as_str().to_string(),
                        },
                    },
                },
            },
        };

        let response: GenerateContentResponse = self.http.generate_content(&request).await?;

        let audio = response
            .first_parts()
            .iter()
            .find_map(|p| match p {
                Part::InlineData { inline_data } if !inline_data.data.is_empty() => {
                    Some(inline_data)
                }
                _ => None,
            })
            .ok_or_else(|| Error::NoResult("No audio was returned".to_string()))?;

        tracing::debug!(
            "Speech synthesis returned {} base64 chars ({})",
            audio.data.len(),
            audio.mime_type
        );
        Ok(audio.data.clone())
    }
}
