use super::client::GeminiHttpClient;
use super::types::InstanceImage;
use crate::ai::{accept_submitted_operation, require_text, VideoService};
use crate::models::{AspectRatio, EncodedAsset, OperationHandle};
use crate::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

const RESOLUTION: &str = "720p";

#[derive(Debug, Serialize)]
struct VideoRequest {
    instances: Vec<VideoInstance>,
    parameters: VideoParameters,
}

#[derive(Debug, Serialize)]
struct VideoInstance {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<InstanceImage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoParameters {
    aspect_ratio: String,
    resolution: String,
    sample_count: u32,
}

/// Veo client: submits long-running video jobs, refreshes them and downloads
/// the finished media.
pub struct GeminiVideoClient {
    http: GeminiHttpClient,
    download: GeminiHttpClient,
}

impl GeminiVideoClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::new_with_client(api_key, model, reqwest::Client::new())
    }

    pub fn new_with_client(api_key: String, model: String, client: reqwest::Client) -> Self {
        Self {
            http: GeminiHttpClient::new_with_client(
                api_key.clone(),
                model.clone(),
                Duration::from_secs(60),
                client.clone(),
            ),
            download: GeminiHttpClient::new_with_client(
                api_key,
                model,
                Duration::from_secs(300),
                client,
            ),
        }
    }
}

super::impl_with_gemini_base_url!(GeminiVideoClient);

#[async_trait]
impl VideoService for GeminiVideoClient {
    async fn start_video(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        image: Option<&EncodedAsset>,
    ) -> Result<OperationHandle> {
        require_text(prompt, "Prompt")?;

        let request = VideoRequest {
            instances: vec![VideoInstance {
                prompt: prompt.to_string(),
                image: image.map(InstanceImage::from),
            }],
            parameters: VideoParameters {
                aspect_ratio: aspect_ratio.as_str().to_string(),
                resolution: RESOLUTION.to_string(),
                sample_count: 1,
            },
        };

        let handle: OperationHandle = self.http.predict_long_running(&request).await?;
        tracing::info!(
            "Submitted video job {} (done: {})",
            handle.name,
            handle.done
        );

        accept_submitted_operation(handle)
    }

    async fn refresh_operation(&self, handle: &OperationHandle) -> Result<OperationHandle> {
        let refreshed: OperationHandle = self.http.get_operation(&handle.name).await?;
        tracing::debug!(
            "Operation {} refreshed (done: {})",
            refreshed.name,
            refreshed.done
        );
        Ok(refreshed)
    }

    async fn fetch_video(&self, locator: &str) -> Result<Vec<u8>> {
        let bytes = self.download.download(locator).await?;
        tracing::info!("Downloaded {} bytes of video", bytes.len());
        Ok(bytes)
    }
}
