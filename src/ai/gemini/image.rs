use super::client::GeminiHttpClient;
use crate::ai::{decode_image, require_text, ImageGenerationService};
use crate::models::GeneratedImage;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OUTPUT_MIME: &str = "image/png";

#[derive(Debug, Serialize)]
struct PredictRequest {
    instances: Vec<PromptInstance>,
    parameters: ImageParameters,
}

#[derive(Debug, Serialize)]
struct PromptInstance {
    prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageParameters {
    sample_count: u32,
    aspect_ratio: String,
    output_options: OutputOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputOptions {
    mime_type: String,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

/// Text-to-image client backed by an Imagen model.
pub struct GeminiImageClient {
    http: GeminiHttpClient,
}

impl GeminiImageClient {
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

super::impl_with_gemini_base_url!(GeminiImageClient);

#[async_trait]
impl ImageGenerationService for GeminiImageClient {
    async fn create_image(&self, prompt: &str) -> Result<GeneratedImage> {
        require_text(prompt, "Prompt")?;

        let request = PredictRequest {
            instances: vec![PromptInstance {
                prompt: prompt.to_string(),
            }],
            parameters: ImageParameters {
                sample_count: 1,
                aspect_ratio: "1:1".to_string(),
                output_options: OutputOptions {
                    mime_type: OUTPUT_MIME.to_string(),
                },
            },
        };

        tracing::debug!("Requesting image from {}", self.http.model());
        let response: PredictResponse = self.http.predict(&request).await?;

        let prediction = response
            .predictions
            .into_iter()
            .find(|p| p.bytes_base64_encoded.is_some())
            .ok_or_else(|| Error::NoResult("No image was generated".to_string()))?;

        use base64::Engine as _;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(prediction.bytes_base64_encoded.unwrap_or_default())
            .map_err(|e| Error::NoResult(format!("Failed to decode Imagen base64 image: {}", e)))?;

        decode_image(
            bytes,
            Some(prediction.mime_type.as_deref().unwrap_or(OUTPUT_MIME)),
        )
        .ok_or_else(|| Error::NoResult("Imagen returned an undecodable image".to_string()))
    }
}
