use super::{
    accept_submitted_operation, require_text, IdeaService, ImageEditService,
    ImageGenerationService, SpeechService, VideoService,
};
use crate::error::RemoteErrorKind;
use crate::models::{
    AspectRatio, EncodedAsset, GenerateVideoResponse, GeneratedImage, GeneratedSample, IdeaResult,
    OperationHandle, VideoOperationResponse, VideoRef, Voice,
};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Tiny 1x1 PNG returned when no image response was scripted.
fn default_png() -> Vec<u8> {
    vec![
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // PNG signature
        0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, // IHDR chunk
        0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, // 1x1 pixel
        0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, 0xDE, 0x00, 0x00, 0x00, 0x0C, 0x49,
        0x44, 0x41, // IDAT chunk
        0x54, 0x08, 0x99, 0x63, 0xF8, 0xCF, 0xC0, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0xE2,
        0x25, 0x00, 0xBC, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, // IEND chunk
        0x44, 0xAE, 0x42, 0x60, 0x82,
    ]
}

/// Scripted failure for a mocked remote call.
#[derive(Debug, Clone)]
pub struct MockFailure {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl MockFailure {
    pub fn new(kind: RemoteErrorKind, message: &str) -> Self {
        Self {
            kind,
            message: message.to_string(),
        }
    }

    fn to_error(&self) -> Error {
        Error::remote(self.kind, self.message.clone())
    }
}

/// Mock for the immediate (single request/response) capabilities.
#[derive(Clone, Default)]
pub struct MockGenerationClient {
    image_responses: Arc<Mutex<Vec<GeneratedImage>>>,
    idea_responses: Arc<Mutex<Vec<IdeaResult>>>,
    speech_responses: Arc<Mutex<Vec<String>>>,
    failure: Arc<Mutex<Option<MockFailure>>>,
    call_count: Arc<Mutex<usize>>,
    edit_asset_counts: Arc<Mutex<Vec<usize>>>,
}

impl MockGenerationClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image_response(self, response: GeneratedImage) -> Self {
        self.image_responses.lock().unwrap().push(response);
        self
    }

    pub fn with_idea_response(self, response: IdeaResult) -> Self {
        self.idea_responses.lock().unwrap().push(response);
        self
    }

    pub fn with_speech_response(self, base64_pcm: String) -> Self {
        self.speech_responses.lock().unwrap().push(base64_pcm);
        self
    }

    /// Makes every call fail with the given remote error.
    pub fn with_failure(self, failure: MockFailure) -> Self {
        *self.failure.lock().unwrap() = Some(failure);
        self
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    /// Number of assets received by each `edit_image` call.
    pub fn get_edit_asset_counts(&self) -> Vec<usize> {
        self.edit_asset_counts.lock().unwrap().clone()
    }

    fn begin_call(&self) -> Result<usize> {
        let mut count = self.call_count.lock().unwrap();
        *count += 1;
        match self.failure.lock().unwrap().as_ref() {
            Some(failure) => Err(failure.to_error()),
            None => Ok(*count),
        }
    }

    fn next_image(&self, count: usize) -> GeneratedImage {
        let responses = self.image_responses.lock().unwrap();
        if responses.is_empty() {
            GeneratedImage {
                bytes: default_png(),
                mime_type: "image/png".to_string(),
                width: 1,
                height: 1,
            }
        } else {
            responses[(count - 1) % responses.len()].clone()
        }
    }
}

#[async_trait]
impl ImageGenerationService for MockGenerationClient {
    async fn create_image(&self, prompt: &str) -> Result<GeneratedImage> {
        require_text(prompt, "Prompt")?;
        let count = self.begin_call()?;
        Ok(self.next_image(count))
    }
}

#[async_trait]
impl ImageEditService for MockGenerationClient {
    async fn edit_image(&self, prompt: &str, assets: &[EncodedAsset]) -> Result<GeneratedImage> {
        require_text(prompt, "Prompt")?;
        if assets.is_empty() {
            return Err(Error::Validation(
                "At least one image is required for editing".to_string(),
            ));
        }
        let count = self.begin_call()?;
        self.edit_asset_counts.lock().unwrap().push(assets.len());
        Ok(self.next_image(count))
    }
}

#[async_trait]
impl IdeaService for MockGenerationClient {
    async fn search_ideas(&self, topic: &str) -> Result<IdeaResult> {
        require_text(topic, "Topic")?;
        let count = self.begin_call()?;

        let responses = self.idea_responses.lock().unwrap();
        if responses.is_empty() {
            Ok(IdeaResult {
                text: format!("Five ideas about {}", topic),
                citations: Vec::new(),
            })
        } else {
            Ok(responses[(count - 1) % responses.len()].clone())
        }
    }
}

#[async_trait]
impl SpeechService for MockGenerationClient {
    async fn synthesize_speech(&self, text: &str, _voice: Voice) -> Result<String> {
        require_text(text, "Text")?;
        let count = self.begin_call()?;

        let responses = self.speech_responses.lock().unwrap();
        if responses.is_empty() {
            // Four samples of silence
            Ok("AAAAAAAAAAA=".to_string())
        } else {
            Ok(responses[(count - 1) % responses.len()].clone())
        }
    }
}

/// Scripted refresh outcome for [`MockVideoClient`].
#[derive(Debug, Clone)]
pub enum MockRefresh {
    Handle(OperationHandle),
    Fail(MockFailure),
}

/// Scripted download outcome for [`MockVideoClient`].
#[derive(Debug, Clone)]
pub enum MockDownload {
    Bytes(Vec<u8>),
    Status(u16),
}

/// Mock for the long-running video capability.
///
/// Refreshes pop from a script; once the script is exhausted the job stays
/// pending.
#[derive(Clone)]
pub struct MockVideoClient {
    start_response: Arc<Mutex<std::result::Result<OperationHandle, MockFailure>>>,
    refreshes: Arc<Mutex<VecDeque<MockRefresh>>>,
    download: Arc<Mutex<MockDownload>>,
    start_count: Arc<Mutex<usize>>,
    refresh_count: Arc<Mutex<usize>>,
    fetched: Arc<Mutex<Vec<String>>>,
}

impl MockVideoClient {
    pub const OPERATION_NAME: &'static str = "models/mock-veo/operations/mock";

    pub fn new() -> Self {
        Self {
            start_response: Arc::new(Mutex::new(Ok(Self::pending()))),
            refreshes: Arc::new(Mutex::new(VecDeque::new())),
            download: Arc::new(Mutex::new(MockDownload::Bytes(b"mock video".to_vec()))),
            start_count: Arc::new(Mutex::new(0)),
            refresh_count: Arc::new(Mutex::new(0)),
            fetched: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A handle for the mock operation that is not yet done.
    pub fn pending() -> OperationHandle {
        OperationHandle {
            name: Self::OPERATION_NAME.to_string(),
            ..Default::default()
        }
    }

    /// A done handle whose first sample points at `locator`.
    pub fn completed(locator: &str) -> OperationHandle {
        OperationHandle {
            name: Self::OPERATION_NAME.to_string(),
            done: true,
            response: Some(VideoOperationResponse {
                generate_video_response: Some(GenerateVideoResponse {
                    generated_samples: vec![GeneratedSample {
                        video: Some(VideoRef {
                            uri: Some(locator.to_string()),
                        }),
                    }],
                }),
            }),
            error: None,
        }
    }

    pub fn with_start_response(self, handle: OperationHandle) -> Self {
        *self.start_response.lock().unwrap() = Ok(handle);
        self
    }

    pub fn with_start_failure(self, failure: MockFailure) -> Self {
        *self.start_response.lock().unwrap() = Err(failure);
        self
    }

    pub fn with_refresh(self, refresh: MockRefresh) -> Self {
        self.refreshes.lock().unwrap().push_back(refresh);
        self
    }

    /// Queues `count` refreshes that report the job as still running.
    pub fn with_pending_refreshes(self, count: usize) -> Self {
        for _ in 0..count {
            self.refreshes
                .lock()
                .unwrap()
                .push_back(MockRefresh::Handle(Self::pending()));
        }
        self
    }

    pub fn with_download(self, download: MockDownload) -> Self {
        *self.download.lock().unwrap() = download;
        self
    }

    pub fn get_start_count(&self) -> usize {
        *self.start_count.lock().unwrap()
    }

    pub fn get_refresh_count(&self) -> usize {
        *self.refresh_count.lock().unwrap()
    }

    pub fn get_fetched_locators(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

impl Default for MockVideoClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VideoService for MockVideoClient {
    async fn start_video(
        &self,
        prompt: &str,
        _aspect_ratio: AspectRatio,
        _image: Option<&EncodedAsset>,
    ) -> Result<OperationHandle> {
        require_text(prompt, "Prompt")?;
        *self.start_count.lock().unwrap() += 1;

        let response = self.start_response.lock().unwrap().clone();
        match response {
            Ok(handle) => accept_submitted_operation(handle),
            Err(failure) => Err(failure.to_error()),
        }
    }

    async fn refresh_operation(&self, _handle: &OperationHandle) -> Result<OperationHandle> {
        *self.refresh_count.lock().unwrap() += 1;

        let next = self.refreshes.lock().unwrap().pop_front();
        match next {
            Some(MockRefresh::Handle(handle)) => Ok(handle),
            Some(MockRefresh::Fail(failure)) => Err(failure.to_error()),
            None => Ok(Self::pending()),
        }
    }

    async fn fetch_video(&self, locator: &str) -> Result<Vec<u8>> {
        self.fetched.lock().unwrap().push(locator.to_string());

        let download = self.download.lock().unwrap().clone();
        match download {
            MockDownload::Bytes(bytes) => Ok(bytes),
            MockDownload::Status(status) => Err(Error::ResultFetchFailure {
                status,
                message: format!("mock status {}", status),
            }),
        }
    }
}
