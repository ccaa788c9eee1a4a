//! Tool controller: validates user requests, dispatches them to the
//! generation services and publishes per-tool state.

use crate::ai::{
    GeminiEditClient, GeminiIdeaClient, GeminiImageClient, GeminiSpeechClient, GeminiVideoClient,
    IdeaService, ImageEditService, ImageGenerationService, SpeechService, VideoService,
};
use crate::codec::{decode_audio_base64, encode, encode_all};
use crate::jobs::{JobOutcome, JobState, PollConfig, PollSession};
use crate::models::{AspectRatio, Config, GenerationRequest, GenerationResult, Tool, Voice};
use crate::{Error, ErrorClass, Result};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub const MISSING_CREDENTIAL_MESSAGE: &str =
    "API key not found. Please configure the API key again.";
pub const UNRESOLVABLE_REFERENCE_MESSAGE: &str =
    "Invalid or missing API key. Please configure the API key again.";
pub const EMPTY_VIDEO_MESSAGE: &str = "The operation completed, but no video was found.";

/// A failure as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserFacingError {
    pub message: String,
    pub class: ErrorClass,
}

impl UserFacingError {
    pub fn from_error(err: &Error) -> Self {
        let class = err.class();
        let message = match (class, err) {
            (ErrorClass::MissingCredential, _) => MISSING_CREDENTIAL_MESSAGE.to_string(),
            (ErrorClass::UnresolvableReference, _) => UNRESOLVABLE_REFERENCE_MESSAGE.to_string(),
            (_, Error::Validation(message)) => message.clone(),
            (_, Error::PollFailure(inner)) => format!("Error while checking the video job: {}", inner),
            _ => format!("An error occurred: {}", err),
        };
        Self { message, class }
    }
}

/// What a front end shows for one tool.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ToolState {
    #[default]
    Idle,
    Loading,
    Ready(GenerationResult),
    Failed(UserFacingError),
}

impl ToolState {
    pub fn is_loading(&self) -> bool {
        matches!(self, ToolState::Loading)
    }
}

/// Notified when a failure suggests the access credential needs attention.
pub trait CredentialObserver: Send + Sync {
    fn recheck(&self);
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub image: Box<dyn ImageGenerationService>,
    pub edit: Box<dyn ImageEditService>,
    pub ideas: Box<dyn IdeaService>,
    pub speech: Box<dyn SpeechService>,
    pub video: Arc<dyn VideoService>,
    pub credentials: Arc<dyn CredentialObserver>,
}

type StateSender = Arc<watch::Sender<ToolState>>;

struct ToolStates {
    image: StateSender,
    edit: StateSender,
    ideas: StateSender,
    speech: StateSender,
    video: StateSender,
}

impl ToolStates {
    fn new() -> Self {
        let channel = || Arc::new(watch::Sender::new(ToolState::Idle));
        Self {
            image: channel(),
            edit: channel(),
            ideas: channel(),
            speech: channel(),
            video: channel(),
        }
    }

    fn get(&self, tool: Tool) -> &StateSender {
        match tool {
            Tool::ImageCreate => &self.image,
            Tool::ImageEdit => &self.edit,
            Tool::IdeaSearch => &self.ideas,
            Tool::SpeechSynthesis => &self.speech,
            Tool::VideoCreate => &self.video,
        }
    }
}

/// Coordinates validation, generation and video job tracking for every tool.
///
/// At most one video [`PollSession`] is alive per app. Submitting a new video
/// request, calling [`App::cancel_video`] or [`App::shutdown`], or dropping the
/// app cancels it. Each of those also supersedes a submission still waiting on
/// the service, so only the newest video request can publish state.
pub struct App {
    image: Box<dyn ImageGenerationService>,
    edit: Box<dyn ImageEditService>,
    ideas: Box<dyn IdeaService>,
    speech: Box<dyn SpeechService>,
    video: Arc<dyn VideoService>,
    credentials: Arc<dyn CredentialObserver>,
    poll_config: PollConfig,
    states: ToolStates,
    video_session: Mutex<Option<PollSession>>,
    // Bumped by every video submission and cancellation.
    video_generation: Arc<AtomicU64>,
}

impl App {
    /// Build an app from concrete service dependencies.
    ///
    /// This is primarily useful for integration tests and local harnesses that
    /// need to inject mocks.
    pub fn with_services(services: AppServices, poll_config: PollConfig) -> Self {
        Self {
            image: services.image,
            edit: services.edit,
            ideas: services.ideas,
            speech: services.speech,
            video: services.video,
            credentials: services.credentials,
            poll_config,
            states: ToolStates::new(),
            video_session: Mutex::new(None),
            video_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Construct an app backed by the Gemini API.
    pub fn new(config: &Config, credentials: Arc<dyn CredentialObserver>) -> Self {
        // Reuse one HTTP connection pool across capability clients.
        let http_client = reqwest::Client::new();
        let api_key = config.api_key.clone();
        let base_url = config.base_url.clone();

        info!(
            "Models: image={}, edit={}, ideas={}, speech={}, video={}",
            config.image_model,
            config.edit_model,
            config.idea_model,
            config.tts_model,
            config.video_model
        );

        let services = AppServices {
            image: Box::new(
                GeminiImageClient::new_with_client(
                    api_key.clone(),
                    config.image_model.clone(),
                    http_client.clone(),
                )
                .with_base_url(base_url.clone()),
            ),
            edit: Box::new(
                GeminiEditClient::new_with_client(
                    api_key.clone(),
                    config.edit_model.clone(),
                    http_client.clone(),
                )
                .with_base_url(base_url.clone()),
            ),
            ideas: Box::new(
                GeminiIdeaClient::new_with_client(
                    api_key.clone(),
                    config.idea_model.clone(),
                    http_client.clone(),
                )
                .with_base_url(base_url.clone()),
            ),
            speech: Box::new(
                GeminiSpeechClient::new_with_client(
                    api_key.clone(),
                    config.tts_model.clone(),
                    http_client.clone(),
                )
                .with_base_url(base_url.clone()),
            ),
            video: Arc::new(
                GeminiVideoClient::new_with_client(
                    api_key,
                    config.video_model.clone(),
                    http_client,
                )
                .with_base_url(base_url),
            ),
            credentials,
        };

        Self::with_services(services, PollConfig::from(config))
    }

    pub fn state(&self, tool: Tool) -> ToolState {
        self.states.get(tool).borrow().clone()
    }

    pub fn subscribe(&self, tool: Tool) -> watch::Receiver<ToolState> {
        self.states.get(tool).subscribe()
    }

    /// State of the current video job, if one was started.
    pub fn video_job_state(&self) -> Option<JobState> {
        self.lock_session().as_ref().map(PollSession::state)
    }

    /// Validates and runs one request, returning the state it leaves the tool
    /// in. Video requests return `Loading` while the job is tracked; watch
    /// [`App::subscribe`] for the outcome.
    pub async fn submit(&self, request: GenerationRequest) -> ToolState {
        let tool = request.tool();

        let generation = if tool == Tool::VideoCreate {
            self.supersede_video().0
        } else {
            0
        };

        if let Err(e) = validate(&request) {
            let state = fail(tool, e, self.credentials.as_ref());
            return self.publish(tool, state);
        }

        match request {
            GenerationRequest::ImageCreate { prompt } => {
                self.run_immediate(tool, async {
                    self.image
                        .create_image(&prompt)
                        .await
                        .map(GenerationResult::Image)
                })
                .await
            }
            GenerationRequest::ImageEdit {
                prompt,
                attachments,
            } => {
                self.run_immediate(tool, async {
                    let assets = encode_all(&attachments).await?;
                    self.edit
                        .edit_image(&prompt, &assets)
                        .await
                        .map(GenerationResult::Image)
                })
                .await
            }
            GenerationRequest::IdeaSearch { topic } => {
                self.run_immediate(tool, async {
                    self.ideas
                        .search_ideas(&topic)
                        .await
                        .map(GenerationResult::Ideas)
                })
                .await
            }
            GenerationRequest::SpeechSynthesis { text, voice } => {
                self.run_immediate(tool, async {
                    let payload = self.speech.synthesize_speech(&text, voice).await?;
                    decode_audio_base64(&payload).map(GenerationResult::Speech)
                })
                .await
            }
            GenerationRequest::VideoCreate {
                prompt,
                aspect_ratio,
                image,
            } => self.start_video(generation, prompt, aspect_ratio, image).await,
        }
    }

    pub async fn create_image(&self, prompt: &str) -> ToolState {
        self.submit(GenerationRequest::ImageCreate {
            prompt: prompt.to_string(),
        })
        .await
    }

    pub async fn edit_image(&self, prompt: &str, attachments: Vec<PathBuf>) -> ToolState {
        self.submit(GenerationRequest::ImageEdit {
            prompt: prompt.to_string(),
            attachments,
        })
        .await
    }

    pub async fn search_ideas(&self, topic: &str) -> ToolState {
        self.submit(GenerationRequest::IdeaSearch {
            topic: topic.to_string(),
        })
        .await
    }

    pub async fn synthesize_speech(&self, text: &str, voice: Voice) -> ToolState {
        self.submit(GenerationRequest::SpeechSynthesis {
            text: text.to_string(),
            voice,
        })
        .await
    }

    pub async fn create_video(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        image: Option<PathBuf>,
    ) -> ToolState {
        self.submit(GenerationRequest::VideoCreate {
            prompt: prompt.to_string(),
            aspect_ratio,
            image,
        })
        .await
    }

    /// Cancels the active video job, including one still being submitted.
    /// Returns whether a job was still running.
    pub fn cancel_video(&self) -> bool {
        let was_loading = self.state(Tool::VideoCreate).is_loading();
        let (_, stopped) = self.supersede_video();
        let cancelled = stopped || was_loading;
        if cancelled {
            self.publish(Tool::VideoCreate, ToolState::Idle);
        }
        cancelled
    }

    /// Tears down background work. Safe to call more than once.
    pub fn shutdown(&self) {
        if self.cancel_video() {
            info!("Cancelled in-flight video job on shutdown");
        }
    }

    async fn run_immediate<F>(&self, tool: Tool, work: F) -> ToolState
    where
        F: Future<Output = Result<GenerationResult>>,
    {
        self.publish(tool, ToolState::Loading);
        let state = match work.await {
            Ok(result) => {
                info!("{} request completed", tool);
                ToolState::Ready(result)
            }
            Err(e) => fail(tool, e, self.credentials.as_ref()),
        };
        self.publish(tool, state)
    }

    async fn start_video(
        &self,
        generation: u64,
        prompt: String,
        aspect_ratio: AspectRatio,
        image: Option<PathBuf>,
    ) -> ToolState {
        let tool = Tool::VideoCreate;
        self.publish(tool, ToolState::Loading);

        let submitted = async {
            let asset = match &image {
                Some(path) => Some(encode(path).await?),
                None => None,
            };
            self.video
                .start_video(&prompt, aspect_ratio, asset.as_ref())
                .await
        }
        .await;

        if !self.is_current_video(generation) {
            debug!(generation, "Dropping superseded video submission");
            return ToolState::Idle;
        }

        let handle = match submitted {
            Ok(handle) => handle,
            Err(e) => {
                let state = fail(tool, e, self.credentials.as_ref());
                return self.publish_video(generation, state);
            }
        };

        // Checked again under the slot lock: a newer submission bumps the
        // generation before it takes the lock to cancel the tracked session.
        let mut slot = self.lock_session();
        if !self.is_current_video(generation) {
            debug!(generation, "Dropping superseded video operation {}", handle.name);
            return ToolState::Idle;
        }

        let sender = self.states.get(tool).clone();
        let credentials = self.credentials.clone();
        let current = self.video_generation.clone();
        let session = PollSession::start(
            self.video.clone(),
            handle,
            self.poll_config,
            move |outcome| {
                if current.load(Ordering::SeqCst) != generation {
                    debug!(generation, "Ignoring outcome of superseded video job");
                    return;
                }
                let state = match outcome {
                    JobOutcome::Completed(video) => {
                        info!("Video ready ({} bytes)", video.bytes.len());
                        ToolState::Ready(GenerationResult::Video(video))
                    }
                    JobOutcome::CompletedEmpty => ToolState::Failed(UserFacingError {
                        message: EMPTY_VIDEO_MESSAGE.to_string(),
                        class: ErrorClass::Other,
                    }),
                    JobOutcome::Failed(e) => fail(tool, e, credentials.as_ref()),
                };
                // The generation is compared under the channel's write lock,
                // so a newer submission's `Loading` is never overwritten.
                sender.send_if_modified(|published| {
                    if current.load(Ordering::SeqCst) != generation {
                        return false;
                    }
                    *published = state;
                    true
                });
            },
        );

        info!(
            session = %session.id(),
            generation,
            "Tracking video operation {}",
            session.operation()
        );
        *slot = Some(session);
        ToolState::Loading
    }

    /// Starts a new video generation and cancels the tracked session. Returns
    /// the new generation and whether a session was still active.
    fn supersede_video(&self) -> (u64, bool) {
        let generation = self.video_generation.fetch_add(1, Ordering::SeqCst) + 1;
        (generation, self.stop_video_session())
    }

    fn is_current_video(&self, generation: u64) -> bool {
        self.video_generation.load(Ordering::SeqCst) == generation
    }

    /// Publishes video state unless a newer submission has taken over.
    fn publish_video(&self, generation: u64, state: ToolState) -> ToolState {
        let published = self
            .states
            .get(Tool::VideoCreate)
            .send_if_modified(|current| {
                if !self.is_current_video(generation) {
                    return false;
                }
                *current = state.clone();
                true
            });
        if published {
            state
        } else {
            ToolState::Idle
        }
    }

    fn stop_video_session(&self) -> bool {
        let session = self.lock_session().take();
        session.map(|s| s.cancel()).unwrap_or(false)
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<PollSession>> {
        self.video_session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, tool: Tool, state: ToolState) -> ToolState {
        self.states.get(tool).send_replace(state.clone());
        state
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.supersede_video();
    }
}

/// Input checks that run before anything is encoded or sent.
fn validate(request: &GenerationRequest) -> Result<()> {
    if request.text().trim().is_empty() {
        let message = match request.tool() {
            Tool::IdeaSearch => "Please enter a topic.",
            Tool::SpeechSynthesis => "Please enter some text.",
            _ => "Please enter a prompt.",
        };
        return Err(Error::Validation(message.to_string()));
    }

    if let GenerationRequest::ImageEdit { attachments, .. } = request {
        if attachments.is_empty() {
            return Err(Error::Validation(
                "Please upload at least one image.".to_string(),
            ));
        }
    }

    Ok(())
}

fn fail(tool: Tool, err: Error, credentials: &dyn CredentialObserver) -> ToolState {
    let class = err.class();
    if class.requires_credential_recheck() {
        warn!("{} request failed ({:?}): {}", tool, class, err);
        credentials.recheck();
    } else if matches!(err, Error::Validation(_)) {
        info!("{} request rejected: {}", tool, err);
    } else {
        error!("{} request failed: {}", tool, err);
    }
    ToolState::Failed(UserFacingError::from_error(&err))
}
