use crate::ai::VideoService;
use crate::models::{Config, GeneratedVideo, OperationHandle};
use crate::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Poll cadence and ceiling for one session.
///
/// A zero interval is raised to one millisecond and a zero ceiling to a single
/// refresh when the session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// Refreshes allowed before the session gives up on the job.
    pub max_attempts: u32,
}

impl PollConfig {
    fn normalized(self) -> Self {
        let normalized = Self {
            interval: self.interval.max(MIN_INTERVAL),
            max_attempts: self.max_attempts.max(1),
        };
        if normalized != self {
            warn!(requested = ?self, ?normalized, "Adjusted poll settings");
        }
        normalized
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 60,
        }
    }
}

impl From<&Config> for PollConfig {
    fn from(config: &Config) -> Self {
        Self {
            interval: config.video_poll_interval,
            max_attempts: config.video_max_polls,
        }
    }
}

/// Observable lifecycle of a poll session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Submitted,
    Polling { attempts: u32 },
    Completed,
    CompletedEmpty,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobState::Submitted | JobState::Polling { .. })
    }
}

/// Final result handed to the completion callback, at most once.
#[derive(Debug)]
pub enum JobOutcome {
    Completed(GeneratedVideo),
    /// The job finished without an error but produced no video.
    CompletedEmpty,
    Failed(Error),
}

impl JobOutcome {
    fn state(&self) -> JobState {
        match self {
            JobOutcome::Completed(_) => JobState::Completed,
            JobOutcome::CompletedEmpty => JobState::CompletedEmpty,
            JobOutcome::Failed(_) => JobState::Failed,
        }
    }
}

type Callback = Box<dyn FnOnce(JobOutcome) + Send>;

/// State shared between the session owner and its poll task.
struct Shared {
    cancel: CancellationToken,
    // Taken exactly once, by whichever of completion or cancellation gets the
    // lock first.
    callback: Mutex<Option<Callback>>,
    state: watch::Sender<JobState>,
}

impl Shared {
    fn finish(&self, outcome: JobOutcome) {
        let callback = {
            let mut slot = self.callback.lock().unwrap_or_else(|e| e.into_inner());
            if self.cancel.is_cancelled() {
                return;
            }
            // Once the state is terminal a later cancel reports the session as
            // inactive, so the callback is committed.
            self.state.send_replace(outcome.state());
            slot.take()
        };
        if let Some(callback) = callback {
            callback(outcome);
        }
    }

    fn cancel(&self) -> bool {
        let mut slot = self.callback.lock().unwrap_or_else(|e| e.into_inner());
        let was_active = !self.cancel.is_cancelled() && !self.state.borrow().is_terminal();
        self.cancel.cancel();
        slot.take();
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = JobState::Cancelled;
                true
            }
        });
        was_active
    }
}

/// Tracks one in-flight video job.
///
/// The session owns its poll task. Dropping the session cancels it. The
/// completion callback runs on the poll task, outside any session lock, so it
/// may cancel its own session.
pub struct PollSession {
    id: Uuid,
    operation: String,
    shared: Arc<Shared>,
    state: watch::Receiver<JobState>,
    task: JoinHandle<()>,
}

impl PollSession {
    /// Starts polling `handle` on the current tokio runtime.
    ///
    /// The first refresh happens one interval after the call. A handle that is
    /// already done is resolved without polling.
    pub fn start<F>(
        service: Arc<dyn VideoService>,
        handle: OperationHandle,
        config: PollConfig,
        on_finish: F,
    ) -> Self
    where
        F: FnOnce(JobOutcome) + Send + 'static,
    {
        let config = config.normalized();
        let id = Uuid::new_v4();
        let operation = handle.name.clone();
        let (state_tx, state_rx) = watch::channel(JobState::Submitted);
        let shared = Arc::new(Shared {
            cancel: CancellationToken::new(),
            callback: Mutex::new(Some(Box::new(on_finish))),
            state: state_tx,
        });

        info!(
            session = %id,
            operation = %operation,
            interval_secs = config.interval.as_secs_f64(),
            max_attempts = config.max_attempts,
            "Starting poll session"
        );

        let task = tokio::spawn(run(id, service, handle, config, shared.clone()));

        Self {
            id,
            operation,
            shared,
            state: state_rx,
            task,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Waits until the session reaches a terminal state.
    pub async fn wait(&self) -> JobState {
        let mut rx = self.state.clone();
        let state = match rx.wait_for(|s| s.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        state
    }

    /// Stops polling. Idempotent. Returns whether the session was still
    /// active; when it was, the completion callback will never run.
    pub fn cancel(&self) -> bool {
        let was_active = self.shared.cancel();
        self.task.abort();
        if was_active {
            info!(session = %self.id, operation = %self.operation, "Poll session cancelled");
        }
        was_active
    }
}

impl Drop for PollSession {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run(
    id: Uuid,
    service: Arc<dyn VideoService>,
    handle: OperationHandle,
    config: PollConfig,
    shared: Arc<Shared>,
) {
    if handle.done {
        debug!(session = %id, "Operation already done at submission");
        let outcome = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => return,
            outcome = resolve(service.as_ref(), &handle) => outcome,
        };
        shared.finish(outcome);
        return;
    }

    shared.state.send_replace(JobState::Polling { attempts: 0 });

    let mut ticker = tokio::time::interval_at(Instant::now() + config.interval, config.interval);
    // A refresh that outlives the interval skips the missed ticks rather than
    // firing them back to back.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut current = handle;
    let mut attempts = 0u32;

    loop {
        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        attempts += 1;
        let refreshed = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => return,
            result = service.refresh_operation(&current) => result,
        };

        let mut refreshed = match refreshed {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!(session = %id, attempt = attempts, "Refresh failed: {}", e);
                shared.finish(JobOutcome::Failed(Error::PollFailure(Box::new(e))));
                return;
            }
        };
        if refreshed.name.is_empty() {
            refreshed.name = current.name.clone();
        }

        if refreshed.done {
            info!(session = %id, attempts, "Operation {} is done", refreshed.name);
            let outcome = tokio::select! {
                biased;
                _ = shared.cancel.cancelled() => return,
                outcome = resolve(service.as_ref(), &refreshed) => outcome,
            };
            shared.finish(outcome);
            return;
        }

        debug!(session = %id, attempt = attempts, "Operation still running");
        if attempts >= config.max_attempts {
            warn!(session = %id, attempts, "Giving up on operation {}", refreshed.name);
            shared.finish(JobOutcome::Failed(Error::PollTimeout { attempts }));
            return;
        }
        shared.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = JobState::Polling { attempts };
                true
            }
        });
        current = refreshed;
    }
}

/// Turns a done handle into an outcome, downloading the video when the job
/// produced one.
async fn resolve(service: &dyn VideoService, handle: &OperationHandle) -> JobOutcome {
    if let Some(error) = &handle.error {
        return JobOutcome::Failed(Error::OperationFailed {
            operation: handle.name.clone(),
            code: error.code,
            message: error.message.clone(),
        });
    }

    let Some(locator) = handle.video_locator() else {
        warn!(
            "Operation {} completed without a video (response present: {})",
            handle.name,
            handle.response.is_some()
        );
        return JobOutcome::CompletedEmpty;
    };

    match service.fetch_video(locator).await {
        Ok(bytes) => JobOutcome::Completed(GeneratedVideo {
            locator: locator.to_string(),
            bytes,
        }),
        Err(e @ Error::ResultFetchFailure { .. }) => {
            warn!("Video download failed: {}", e);
            JobOutcome::Failed(e)
        }
        Err(e) => {
            warn!("Video download failed: {}", e);
            JobOutcome::Failed(Error::ResultFetchFailure {
                status: 0,
                message: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::mock::{MockDownload, MockFailure, MockRefresh, MockVideoClient};
    use crate::error::RemoteErrorKind;
    use crate::models::{AspectRatio, EncodedAsset, OperationError, VideoOperationResponse};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    const LOCATOR: &str = "https://example.com/files/video:download?alt=media";

    type Outcomes = Arc<Mutex<Vec<JobOutcome>>>;

    fn start(client: &MockVideoClient, config: PollConfig) -> (PollSession, Outcomes) {
        let outcomes: Outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = outcomes.clone();
        let session = PollSession::start(
            Arc::new(client.clone()),
            MockVideoClient::pending(),
            config,
            move |outcome| sink.lock().unwrap().push(outcome),
        );
        (session, outcomes)
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_once_after_three_pending_refreshes() {
        let client = MockVideoClient::new()
            .with_pending_refreshes(3)
            .with_refresh(MockRefresh::Handle(MockVideoClient::completed(LOCATOR)));
        let (session, outcomes) = start(&client, PollConfig::default());

        sleep(Duration::from_secs(35)).await;
        assert_eq!(client.get_refresh_count(), 3);
        assert_eq!(session.state(), JobState::Polling { attempts: 3 });
        assert!(outcomes.lock().unwrap().is_empty());

        sleep(Duration::from_secs(10)).await;
        assert_eq!(session.state(), JobState::Completed);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(client.get_refresh_count(), 4);
        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            JobOutcome::Completed(video) => {
                assert_eq!(video.locator, LOCATOR);
                assert_eq!(video.bytes, b"mock video".to_vec());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(client.get_fetched_locators(), vec![LOCATOR.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_refresh_waits_one_interval() {
        let client = MockVideoClient::new();
        let (session, _outcomes) = start(&client, PollConfig::default());

        sleep(Duration::from_secs(9)).await;
        assert_eq!(client.get_refresh_count(), 0);
        assert_eq!(session.state(), JobState::Polling { attempts: 0 });

        sleep(Duration::from_secs(2)).await;
        assert_eq!(client.get_refresh_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_session_never_calls_back() {
        let client = MockVideoClient::new()
            .with_refresh(MockRefresh::Handle(MockVideoClient::completed(LOCATOR)));
        let (session, outcomes) = start(&client, PollConfig::default());

        tokio::task::yield_now().await;
        assert!(session.cancel());
        assert_eq!(session.state(), JobState::Cancelled);

        // Let the already-scheduled tick come due.
        sleep(Duration::from_secs(30)).await;
        assert_eq!(client.get_refresh_count(), 0);
        assert!(outcomes.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let client = MockVideoClient::new();
        let (session, _outcomes) = start(&client, PollConfig::default());

        assert!(session.cancel());
        assert!(!session.cancel());
        assert_eq!(session.state(), JobState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_completion_keeps_terminal_state() {
        let client = MockVideoClient::new()
            .with_refresh(MockRefresh::Handle(MockVideoClient::completed(LOCATOR)));
        let (session, outcomes) = start(&client, PollConfig::default());

        assert_eq!(session.wait().await, JobState::Completed);
        assert!(!session.cancel());
        assert_eq!(session.state(), JobState::Completed);
        assert_eq!(outcomes.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_error_fails_and_stops_polling() {
        let client = MockVideoClient::new()
            .with_pending_refreshes(1)
            .with_refresh(MockRefresh::Fail(MockFailure::new(
                RemoteErrorKind::Other,
                "connection reset",
            )));
        let (session, outcomes) = start(&client, PollConfig::default());

        assert_eq!(session.wait().await, JobState::Failed);
        sleep(Duration::from_secs(120)).await;

        assert_eq!(client.get_refresh_count(), 2);
        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            &outcomes[0],
            JobOutcome::Failed(Error::PollFailure(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forbidden_download_is_result_fetch_failure() {
        let client = MockVideoClient::new()
            .with_pending_refreshes(2)
            .with_refresh(MockRefresh::Handle(MockVideoClient::completed(LOCATOR)))
            .with_download(MockDownload::Status(403));
        let (session, outcomes) = start(&client, PollConfig::default());

        assert_eq!(session.wait().await, JobState::Failed);
        let outcomes = outcomes.lock().unwrap();
        assert!(matches!(
            &outcomes[0],
            JobOutcome::Failed(Error::ResultFetchFailure { status: 403, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_without_video_is_completed_empty() {
        let done_without_video = OperationHandle {
            name: MockVideoClient::OPERATION_NAME.to_string(),
            done: true,
            response: Some(VideoOperationResponse::default()),
            error: None,
        };
        let client = MockVideoClient::new().with_refresh(MockRefresh::Handle(done_without_video));
        let (session, outcomes) = start(&client, PollConfig::default());

        assert_eq!(session.wait().await, JobState::CompletedEmpty);
        assert!(matches!(
            outcomes.lock().unwrap()[0],
            JobOutcome::CompletedEmpty
        ));
        assert!(client.get_fetched_locators().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_with_error_is_failed() {
        let failed = OperationHandle {
            name: MockVideoClient::OPERATION_NAME.to_string(),
            done: true,
            response: None,
            error: Some(OperationError {
                code: 13,
                message: "internal".to_string(),
            }),
        };
        let client = MockVideoClient::new().with_refresh(MockRefresh::Handle(failed));
        let (session, outcomes) = start(&client, PollConfig::default());

        assert_eq!(session.wait().await, JobState::Failed);
        assert!(matches!(
            &outcomes.lock().unwrap()[0],
            JobOutcome::Failed(Error::OperationFailed { code: 13, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let client = MockVideoClient::new();
        let config = PollConfig {
            interval: Duration::from_secs(10),
            max_attempts: 3,
        };
        let (session, outcomes) = start(&client, config);

        assert_eq!(session.wait().await, JobState::Failed);
        sleep(Duration::from_secs(60)).await;

        assert_eq!(client.get_refresh_count(), 3);
        assert!(matches!(
            &outcomes.lock().unwrap()[0],
            JobOutcome::Failed(Error::PollTimeout { attempts: 3 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_settings_still_reach_a_terminal_state() {
        let client = MockVideoClient::new();
        let config = PollConfig {
            interval: Duration::ZERO,
            max_attempts: 0,
        };
        let (session, outcomes) = start(&client, config);

        assert_eq!(session.wait().await, JobState::Failed);
        assert_eq!(client.get_refresh_count(), 1);
        assert!(matches!(
            &outcomes.lock().unwrap()[0],
            JobOutcome::Failed(Error::PollTimeout { attempts: 1 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_may_cancel_its_own_session() {
        let client = MockVideoClient::new()
            .with_refresh(MockRefresh::Handle(MockVideoClient::completed(LOCATOR)));
        let slot: Arc<Mutex<Option<Arc<PollSession>>>> = Arc::new(Mutex::new(None));
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let own = slot.clone();
        let session = Arc::new(PollSession::start(
            Arc::new(client.clone()),
            MockVideoClient::pending(),
            PollConfig::default(),
            move |outcome| {
                let session = own.lock().unwrap().take().unwrap();
                let completed = matches!(outcome, JobOutcome::Completed(_));
                let _ = done_tx.send((session.cancel(), completed));
            },
        ));
        *slot.lock().unwrap() = Some(session.clone());

        let (was_active, completed) = done_rx.await.unwrap();
        assert!(!was_active);
        assert!(completed);
        assert_eq!(session.state(), JobState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_handle_resolves_without_polling() {
        let client = MockVideoClient::new();
        let outcomes: Outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = outcomes.clone();
        let session = PollSession::start(
            Arc::new(client.clone()),
            MockVideoClient::completed(LOCATOR),
            PollConfig::default(),
            move |outcome| sink.lock().unwrap().push(outcome),
        );

        assert_eq!(session.wait().await, JobState::Completed);
        assert_eq!(client.get_refresh_count(), 0);
        assert_eq!(outcomes.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_session_cancels_it() {
        let client = MockVideoClient::new()
            .with_refresh(MockRefresh::Handle(MockVideoClient::completed(LOCATOR)));
        let (session, outcomes) = start(&client, PollConfig::default());
        let mut state = session.subscribe();

        drop(session);
        sleep(Duration::from_secs(30)).await;

        assert_eq!(*state.borrow_and_update(), JobState::Cancelled);
        assert_eq!(client.get_refresh_count(), 0);
        assert!(outcomes.lock().unwrap().is_empty());
    }

    /// Refreshes take longer than the poll interval.
    struct SlowVideo {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VideoService for SlowVideo {
        async fn start_video(
            &self,
            _prompt: &str,
            _aspect_ratio: AspectRatio,
            _image: Option<&EncodedAsset>,
        ) -> crate::Result<OperationHandle> {
            Ok(MockVideoClient::pending())
        }

        async fn refresh_operation(
            &self,
            _handle: &OperationHandle,
        ) -> crate::Result<OperationHandle> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            sleep(Duration::from_secs(25)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if call == 3 {
                Ok(MockVideoClient::completed(LOCATOR))
            } else {
                Ok(MockVideoClient::pending())
            }
        }

        async fn fetch_video(&self, _locator: &str) -> crate::Result<Vec<u8>> {
            Ok(vec![7])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_refreshes_never_overlap() {
        let service = Arc::new(SlowVideo {
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let session = PollSession::start(
            service.clone(),
            MockVideoClient::pending(),
            PollConfig::default(),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        assert_eq!(session.wait().await, JobState::Completed);
        sleep(Duration::from_secs(120)).await;

        assert_eq!(service.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
