//! Remote generation service integration
//!
//! One trait per capability of the hosted generative service. The Gemini
//! implementations live in [`gemini`]; [`mock`] provides scripted doubles for
//! tests and harnesses.

pub mod gemini;
pub mod mock;

pub use gemini::{
    GeminiEditClient, GeminiIdeaClient, GeminiImageClient, GeminiSpeechClient, GeminiVideoClient,
};
pub use mock::{MockGenerationClient, MockVideoClient};

use crate::codec::detect_image_mime;
use crate::models::{AspectRatio, EncodedAsset, GeneratedImage, IdeaResult, OperationHandle, Voice};
use crate::{Error, Result};
use async_trait::async_trait;

#[async_trait]
pub trait ImageGenerationService: Send + Sync {
    /// Generates one square PNG image from a text prompt.
    async fn create_image(&self, prompt: &str) -> Result<GeneratedImage>;
}

#[async_trait]
pub trait ImageEditService: Send + Sync {
    /// Edits or combines the given images according to the prompt.
    async fn edit_image(&self, prompt: &str, assets: &[EncodedAsset]) -> Result<GeneratedImage>;
}

#[async_trait]
pub trait IdeaService: Send + Sync {
    /// Generates web-grounded prompt ideas about a topic.
    async fn search_ideas(&self, topic: &str) -> Result<IdeaResult>;
}

#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Synthesizes speech, returning the raw PCM payload still base64-encoded.
    async fn synthesize_speech(&self, text: &str, voice: Voice) -> Result<String>;
}

#[async_trait]
pub trait VideoService: Send + Sync {
    /// Submits a video job. A job that is already done without a result is an
    /// error here and never reaches the job tracker.
    async fn start_video(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        image: Option<&EncodedAsset>,
    ) -> Result<OperationHandle>;

    /// Re-fetches the current state of a submitted job.
    async fn refresh_operation(&self, handle: &OperationHandle) -> Result<OperationHandle>;

    /// Downloads finished video bytes from the locator of a completed job.
    async fn fetch_video(&self, locator: &str) -> Result<Vec<u8>>;
}

/// Rejects blank text input before anything is sent.
pub(crate) fn require_text(text: &str, what: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::Validation(format!("{} must not be empty", what)));
    }
    Ok(())
}

/// Checks a freshly submitted operation handle.
///
/// A handle that is already `done` must carry either a result or an error;
/// `done` with neither is an immediate empty completion.
pub(crate) fn accept_submitted_operation(handle: OperationHandle) -> Result<OperationHandle> {
    if handle.done {
        if let Some(error) = &handle.error {
            return Err(Error::OperationFailed {
                operation: handle.name.clone(),
                code: error.code,
                message: error.message.clone(),
            });
        }
        if handle.response.is_none() {
            tracing::warn!("Operation {} completed immediately without a result", handle.name);
            return Err(Error::EmptyImmediateCompletion);
        }
    }
    Ok(handle)
}

/// Builds a [`GeneratedImage`] if the bytes decode as an image.
pub(crate) fn decode_image(bytes: Vec<u8>, declared_mime: Option<&str>) -> Option<GeneratedImage> {
    let (width, height) = match image::load_from_memory(&bytes) {
        Ok(img) => (img.width(), img.height()),
        Err(e) => {
            tracing::debug!("Skipping undecodable image payload: {}", e);
            return None;
        }
    };

    let mime_type = declared_mime
        .filter(|m| m.starts_with("image/"))
        .or_else(|| detect_image_mime(&bytes))
        .unwrap_or("image/png")
        .to_string();

    Some(GeneratedImage {
        bytes,
        mime_type,
        width,
        height,
    })
}

#[cfg(test)]
pub(crate) fn test_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([255, 0, 0, 255]));
    let mut bytes = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut bytes),
        image::ImageFormat::Png,
    )
    .unwrap();
    bytes
}
