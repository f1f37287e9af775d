use super::dto::{DownloadLink, JobAccepted, SelectFileResponse, UiSnapshot};
use super::errors::JobError;
use super::events::{DeviceCapabilities, FromWorker, ToWorker, WorkerEvent};
use super::model::{Job, JobKind, JobState, SourceFile};
use super::progress::{ProgressTracker, TICK_INTERVAL};
use super::readiness::ReadinessReport;
use super::ui::UiState;
use crate::config::settings::AppConfig;
use crate::infrastructure::encoder::EncoderFactory;
use crate::infrastructure::storage::artifacts::{DOWNLOAD_FILE_NAME, DownloadStore};
use crate::workers::compressor::WorkerHandle;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const UPDATES_CAPACITY: usize = 64;

pub fn estimate_compressed_mb(size: u64) -> f64 {
    size as f64 * 0.5 / (1024.0 * 1024.0)
}

pub fn format_estimation(size: u64) -> String {
    format!(
        "Estimated Compression Size: {:.2} MB",
        estimate_compressed_mb(size)
    )
}

/// Everything that belongs to the one active job.
struct JobContext {
    job: Job,
    progress: ProgressTracker,
    ticker: Option<AbortHandle>,
    // Disposable worker of a performance test; dropping it ends that worker.
    _worker: Option<WorkerHandle>,
}

impl JobContext {
    fn new(job: Job) -> Self {
        Self {
            job,
            progress: ProgressTracker::default(),
            ticker: None,
            _worker: None,
        }
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

impl Drop for JobContext {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

struct CoordinatorState {
    ui: UiState,
    selected: Option<SourceFile>,
    active: Option<JobContext>,
    last_job: Option<Job>,
    readiness: Option<ReadinessReport>,
    encoder_loaded: bool,
    tool_enabled: bool,
}

impl CoordinatorState {
    fn snapshot(&self) -> UiSnapshot {
        let (state, percent) = match &self.active {
            Some(ctx) => (ctx.job.state(), ctx.progress.percent()),
            None => (JobState::Idle, 0.0),
        };
        self.ui.snapshot(state, percent)
    }

    fn active_mut(&mut self, job_id: Uuid) -> Option<&mut JobContext> {
        self.active.as_mut().filter(|ctx| ctx.job.id == job_id)
    }
}

struct Shared {
    config: AppConfig,
    factory: EncoderFactory,
    downloads: DownloadStore,
    worker: WorkerHandle,
    events: mpsc::UnboundedSender<WorkerEvent>,
    state: Mutex<CoordinatorState>,
    updates: broadcast::Sender<UiSnapshot>,
}

/// Owns the UI state and the job lifecycle; talks to workers only through messages.
#[derive(Clone)]
pub struct Coordinator {
    shared: Arc<Shared>,
}

impl Coordinator {
    /// Spawns the long-lived compression worker and the loop that consumes worker events.
    pub fn new(config: AppConfig, factory: EncoderFactory, downloads: DownloadStore) -> Self {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let worker = WorkerHandle::spawn(
            "compression",
            factory(),
            config.results_dir(),
            events_tx.clone(),
        );
        let (updates, _) = broadcast::channel(UPDATES_CAPACITY);
        let ui = UiState::new(config.status_display());

        let coordinator = Self {
            shared: Arc::new(Shared {
                config,
                factory,
                downloads,
                worker,
                events: events_tx,
                state: Mutex::new(CoordinatorState {
                    ui,
                    selected: None,
                    active: None,
                    last_job: None,
                    readiness: None,
                    encoder_loaded: false,
                    tool_enabled: true,
                }),
                updates,
            }),
        };

        let pump = coordinator.clone();
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                pump.handle_event(event).await;
            }
        });

        coordinator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiSnapshot> {
        self.shared.updates.subscribe()
    }

    pub async fn snapshot(&self) -> UiSnapshot {
        self.shared.state.lock().await.snapshot()
    }

    pub async fn last_job(&self) -> Option<Job> {
        self.shared.state.lock().await.last_job.clone()
    }

    fn publish(&self, state: &CoordinatorState) {
        // No subscribers is fine.
        let _ = self.shared.updates.send(state.snapshot());
    }

    fn capabilities(&self) -> DeviceCapabilities {
        let cpu_cores = self.shared.config.cpu_cores.or_else(|| {
            std::thread::available_parallelism()
                .ok()
                .and_then(|n| u32::try_from(n.get()).ok())
        });
        DeviceCapabilities { cpu_cores }
    }

    pub async fn apply_readiness(&self, report: &ReadinessReport) {
        let mut state = self.shared.state.lock().await;
        state.tool_enabled = report.tool_enabled();
        if !state.tool_enabled {
            state.ui.disable_tool();
        }
        state.ui.set_readiness(report.message.clone());
        state.readiness = Some(report.clone());
        self.publish(&state);
    }

    pub async fn readiness(&self) -> Option<ReadinessReport> {
        self.shared.state.lock().await.readiness.clone()
    }

    pub async fn select_file(&self, file: SourceFile) -> Result<SelectFileResponse, JobError> {
        let mut state = self.shared.state.lock().await;
        if !state.tool_enabled {
            return Err(JobError::ToolDisabled);
        }

        let estimation = format_estimation(file.size);
        info!("Selected {} ({} bytes)", file.name, file.size);
        let response = SelectFileResponse {
            name: file.name.clone(),
            size: file.size,
            estimation: estimation.clone(),
        };
        state.ui.estimation = Some(estimation);
        state.selected = Some(file);
        self.publish(&state);
        Ok(response)
    }

    pub async fn start_compression(&self) -> Result<JobAccepted, JobError> {
        let mut state = self.shared.state.lock().await;
        if !state.tool_enabled {
            return Err(JobError::ToolDisabled);
        }
        let file = state.selected.clone().ok_or(JobError::NoFileSelected)?;
        if state.active.is_some() {
            return Err(JobError::JobAlreadyActive);
        }

        let device_capabilities = self.capabilities();
        let mut job = Job::new(
            JobKind::Compression,
            Some(file.name.clone()),
            device_capabilities.cpu_cores,
        );
        job.advance(JobState::Initializing)?;
        let job_id = job.id;
        info!("Starting compression job {} for {}", job_id, file.name);

        state.ui.begin_compression();
        state.ui.set_status("Initializing compression...");
        state.active = Some(JobContext::new(job));

        let ffmpeg_loaded = state.encoder_loaded;
        let dispatched = self.shared.worker.send(ToWorker::Start {
            job_id,
            file,
            ffmpeg_loaded,
            device_capabilities,
        });
        if let Err(e) = dispatched {
            self.finish(&mut state, JobState::Failed, format!("Error: {e}"));
            self.publish(&state);
            return Err(e);
        }

        let ticker = self.spawn_ticker(job_id);
        let next = if ffmpeg_loaded {
            JobState::Encoding
        } else {
            JobState::LoadingEncoder
        };
        let ctx = state
            .active
            .as_mut()
            .ok_or(JobError::NoActiveJob)?;
        ctx.job.advance(next)?;
        ctx.ticker = Some(ticker);

        let accepted = JobAccepted {
            job_id,
            kind: JobKind::Compression,
            state: next,
        };
        self.publish(&state);
        Ok(accepted)
    }

    pub async fn cancel(&self) -> Result<(), JobError> {
        let mut state = self.shared.state.lock().await;
        let cancellable = state.active.as_ref().is_some_and(|ctx| {
            ctx.job.kind == JobKind::Compression && ctx.job.state().is_cancellable()
        });
        if !cancellable {
            return Err(JobError::NoActiveJob);
        }

        // The token in the worker is authoritative; anything it still emits
        // for this job is dropped by `handle_event`.
        if self.shared.worker.send(ToWorker::Cancel).is_err() {
            warn!("Cancel could not reach the compression worker");
        }
        self.finish(&mut state, JobState::Canceled, "Compression canceled.".to_string());
        self.publish(&state);
        Ok(())
    }

    pub async fn run_performance_test(&self) -> Result<JobAccepted, JobError> {
        let mut state = self.shared.state.lock().await;
        if !state.tool_enabled {
            return Err(JobError::ToolDisabled);
        }
        if state.active.is_some() {
            return Err(JobError::JobAlreadyActive);
        }

        let device_capabilities = self.capabilities();
        let mut job = Job::new(JobKind::PerformanceTest, None, device_capabilities.cpu_cores);
        job.advance(JobState::Initializing)?;
        let job_id = job.id;
        info!("Starting performance test {}", job_id);

        let worker = WorkerHandle::spawn(
            "performance",
            (self.shared.factory)(),
            self.shared.config.results_dir(),
            self.shared.events.clone(),
        );

        state.ui.begin_performance_test();
        state.ui.set_status("Running performance test...");
        let mut ctx = JobContext::new(job);

        if let Err(e) = worker.send(ToWorker::PerformanceTest {
            job_id,
            ffmpeg_loaded: false,
            device_capabilities,
        }) {
            state.active = Some(ctx);
            self.finish(&mut state, JobState::Failed, format!("Error: {e}"));
            self.publish(&state);
            return Err(e);
        }

        ctx.job.advance(JobState::LoadingEncoder)?;
        ctx._worker = Some(worker);
        state.active = Some(ctx);

        self.publish(&state);
        Ok(JobAccepted {
            job_id,
            kind: JobKind::PerformanceTest,
            state: JobState::LoadingEncoder,
        })
    }

    /// Clears the page's download link once its blob has been handed off.
    pub async fn download_claimed(&self, id: Uuid) {
        let mut state = self.shared.state.lock().await;
        if state.ui.download.as_ref().is_some_and(|link| link.id == id) {
            state.ui.download = None;
            self.publish(&state);
        }
    }

    pub async fn handle_event(&self, event: WorkerEvent) {
        let WorkerEvent { job_id, message } = event;
        let mut guard = self.shared.state.lock().await;
        let state = &mut *guard;

        let Some(ctx) = state.active_mut(job_id) else {
            debug!("Dropping {} for inactive job {}", message.kind(), job_id);
            return;
        };
        let kind = ctx.job.kind;

        match message {
            FromWorker::Loaded => {
                if let Err(e) = ctx.job.advance(JobState::Encoding) {
                    warn!("Ignoring loaded for job {}: {}", job_id, e);
                    return;
                }
                match kind {
                    JobKind::Compression => {
                        state.encoder_loaded = true;
                        state.ui.set_status("Encoder loaded. Starting compression...");
                    }
                    JobKind::PerformanceTest => {
                        state.ui.set_status("Encoder loaded. Running performance test...");
                    }
                }
            }
            FromWorker::Progress { progress } => {
                if !ctx.progress.has_real_progress() {
                    debug!("Job {} reports real progress", job_id);
                }
                ctx.progress.report(progress);
                if ctx.progress.is_finished() {
                    ctx.stop_ticker();
                }
            }
            FromWorker::Completed { blob } => {
                if let Err(e) = ctx.job.advance(JobState::Finalizing) {
                    warn!("Ignoring completed for job {}: {}", job_id, e);
                    return;
                }
                ctx.progress.complete();
                ctx.stop_ticker();

                let size = blob.size;
                let download_id = self.shared.downloads.register(blob).await;
                state.ui.download = Some(DownloadLink {
                    id: download_id,
                    url: format!("/api/v1/downloads/{download_id}"),
                    file_name: DOWNLOAD_FILE_NAME.to_string(),
                    size,
                });
                self.finish(state, JobState::Completed, "Compression complete.".to_string());
            }
            FromWorker::TestCompleted { time } => {
                if let Err(e) = ctx.job.advance(JobState::Finalizing) {
                    warn!("Ignoring testCompleted for job {}: {}", job_id, e);
                    return;
                }
                state.ui.last_performance_test = Some(time);
                self.finish(
                    state,
                    JobState::Completed,
                    format!("Performance test completed in {time:.2} seconds."),
                );
            }
            FromWorker::Error { error } => {
                error!("Job {} failed: {}", job_id, error);
                self.finish(state, JobState::Failed, format!("Error: {error}"));
            }
        }

        self.publish(state);
    }

    /// Ends the active job and returns the controls to idle.
    fn finish(&self, state: &mut CoordinatorState, outcome: JobState, status: String) {
        if let Some(mut ctx) = state.active.take() {
            let job = &mut ctx.job;
            if let Err(e) = job.advance(outcome) {
                warn!("Job {} could not end as {:?}: {}", job.id, outcome, e);
            }
            let elapsed = OffsetDateTime::now_utc() - job.created_at;
            info!(
                job_id = %job.id,
                kind = ?job.kind,
                file = job.file_name.as_deref().unwrap_or("-"),
                cpu_cores = ?job.cpu_cores,
                terminal = job.state().is_terminal(),
                "Job finished as {:?} after {:.2}s",
                job.state(),
                elapsed.as_seconds_f64()
            );
            state.last_job = Some(job.clone());
        }
        // Workers tear their session down after every job.
        state.encoder_loaded = false;
        state.ui.reset(state.tool_enabled);
        state.ui.set_status(status);
    }

    fn spawn_ticker(&self, job_id: Uuid) -> AbortHandle {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                if !coordinator.tick_simulated(job_id).await {
                    break;
                }
            }
        })
        .abort_handle()
    }

    /// One step of the simulated ramp. Returns whether the ticker should keep running.
    async fn tick_simulated(&self, job_id: Uuid) -> bool {
        let mut state = self.shared.state.lock().await;
        let Some(ctx) = state.active_mut(job_id) else {
            return false;
        };
        if ctx.progress.is_finished() {
            return false;
        }
        if ctx.progress.tick() {
            self.publish(&state);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::encoder::stub::{Journal, StubBehavior, StubEncoder};
    use crate::infrastructure::storage::artifacts::TempArtifact;
    use crate::modules::job::errors::INVALID_DATA_GUIDANCE;
    use std::time::Duration;

    struct Fixture {
        coordinator: Coordinator,
        downloads: DownloadStore,
        journal: Journal,
        dir: tempfile::TempDir,
    }

    fn fixture(behavior: StubBehavior) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::for_tests(dir.path());
        std::fs::create_dir_all(config.results_dir()).unwrap();
        let journal = Journal::default();
        let downloads = DownloadStore::new(config.download_ttl());
        let coordinator = Coordinator::new(
            config,
            StubEncoder::factory(behavior, journal.clone()),
            downloads.clone(),
        );
        Fixture {
            coordinator,
            downloads,
            journal,
            dir,
        }
    }

    impl Fixture {
        async fn select(&self) {
            let artifact = TempArtifact::in_dir(self.dir.path(), "mp4");
            std::fs::write(artifact.path(), vec![0u8; 4 * 1024 * 1024]).unwrap();
            let file = SourceFile::new("clip.mp4", 4 * 1024 * 1024, artifact);
            self.coordinator.select_file(file).await.unwrap();
        }

        async fn wait_until_idle(&self) -> UiSnapshot {
            for _ in 0..500 {
                let snapshot = self.coordinator.snapshot().await;
                if snapshot.job_state == JobState::Idle {
                    return snapshot;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("job never finished");
        }
    }

    fn assert_idle_controls(snapshot: &UiSnapshot) {
        assert!(snapshot.start_enabled);
        assert!(snapshot.performance_test_enabled);
        assert!(!snapshot.cancel_visible);
        assert_eq!(snapshot.progress_percent, 0.0);
        assert_eq!(snapshot.job_state, JobState::Idle);
    }

    #[test]
    fn estimation_is_half_the_input_size() {
        assert_eq!(estimate_compressed_mb(4 * 1024 * 1024), 2.0);
        assert_eq!(
            format_estimation(3 * 1024 * 1024),
            "Estimated Compression Size: 1.50 MB"
        );
    }

    #[tokio::test]
    async fn start_without_file_is_rejected() {
        let f = fixture(StubBehavior::default());
        let err = f.coordinator.start_compression().await.unwrap_err();
        assert!(matches!(err, JobError::NoFileSelected));
        assert_idle_controls(&f.coordinator.snapshot().await);
    }

    #[tokio::test]
    async fn selecting_a_file_shows_the_estimation() {
        let f = fixture(StubBehavior::default());
        f.select().await;
        let snapshot = f.coordinator.snapshot().await;
        assert_eq!(
            snapshot.estimation.as_deref(),
            Some("Estimated Compression Size: 2.00 MB")
        );
    }

    #[tokio::test]
    async fn successful_job_visits_every_state_and_offers_a_download() {
        let f = fixture(StubBehavior {
            ratios: vec![0.5, 1.3],
            ..Default::default()
        });
        f.select().await;

        let accepted = f.coordinator.start_compression().await.unwrap();
        assert_eq!(accepted.state, JobState::LoadingEncoder);
        let running = f.coordinator.snapshot().await;
        assert!(!running.start_enabled);
        assert!(!running.performance_test_enabled);
        assert!(running.cancel_visible);

        let snapshot = f.wait_until_idle().await;
        assert_idle_controls(&snapshot);
        assert_eq!(
            snapshot.status.map(|s| s.text).as_deref(),
            Some("Compression complete.")
        );

        let job = f.coordinator.last_job().await.unwrap();
        assert_eq!(job.id, accepted.job_id);
        assert_eq!(
            job.history(),
            &[
                JobState::Idle,
                JobState::Initializing,
                JobState::LoadingEncoder,
                JobState::Encoding,
                JobState::Finalizing,
                JobState::Completed
            ]
        );

        let link = snapshot.download.expect("download link");
        assert_eq!(link.file_name, "compressed_video.mp4");
        assert!(f.downloads.take(link.id).await.is_some());
        assert!(f.journal.contains(&format!(
            "run {}",
            crate::infrastructure::encoder::profile::compression_args(8).join(" ")
        )));
    }

    #[tokio::test]
    async fn encoder_errors_fail_the_job_and_reset_controls() {
        let f = fixture(StubBehavior {
            run_error: Some("Invalid data found when processing input".to_string()),
            ..Default::default()
        });
        f.select().await;
        f.coordinator.start_compression().await.unwrap();

        let snapshot = f.wait_until_idle().await;
        assert_idle_controls(&snapshot);
        assert_eq!(
            snapshot.status.map(|s| s.text),
            Some(format!("Error: {INVALID_DATA_GUIDANCE}"))
        );
        assert!(snapshot.download.is_none());
        assert_eq!(
            f.coordinator.last_job().await.unwrap().state(),
            JobState::Failed
        );
    }

    #[tokio::test]
    async fn second_start_while_active_is_rejected() {
        let f = fixture(StubBehavior {
            run_delay: Duration::from_secs(60),
            ..Default::default()
        });
        f.select().await;
        f.coordinator.start_compression().await.unwrap();

        let err = f.coordinator.start_compression().await.unwrap_err();
        assert!(matches!(err, JobError::JobAlreadyActive));
        let err = f.coordinator.run_performance_test().await.unwrap_err();
        assert!(matches!(err, JobError::JobAlreadyActive));

        f.coordinator.cancel().await.unwrap();
    }

    #[tokio::test]
    async fn cancel_resets_controls_and_drops_late_events() {
        let f = fixture(StubBehavior {
            run_delay: Duration::from_secs(60),
            ..Default::default()
        });
        f.select().await;
        let accepted = f.coordinator.start_compression().await.unwrap();

        f.coordinator.cancel().await.unwrap();

        let snapshot = f.coordinator.snapshot().await;
        assert_idle_controls(&snapshot);
        assert_eq!(
            snapshot.status.map(|s| s.text).as_deref(),
            Some("Compression canceled.")
        );
        assert_eq!(
            f.coordinator.last_job().await.unwrap().state(),
            JobState::Canceled
        );

        f.coordinator
            .handle_event(WorkerEvent {
                job_id: accepted.job_id,
                message: FromWorker::Progress { progress: 0.7 },
            })
            .await;
        assert_eq!(f.coordinator.snapshot().await.progress_percent, 0.0);

        assert!(matches!(
            f.coordinator.cancel().await.unwrap_err(),
            JobError::NoActiveJob
        ));
    }

    #[tokio::test]
    async fn restart_right_after_cancel_completes() {
        let f = fixture(StubBehavior {
            run_delay: Duration::from_millis(100),
            ..Default::default()
        });
        f.select().await;

        for _ in 0..5 {
            f.coordinator.start_compression().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            f.coordinator.cancel().await.unwrap();

            let restarted = f.coordinator.start_compression().await.unwrap();
            let snapshot = f.wait_until_idle().await;
            assert_eq!(
                snapshot.status.map(|s| s.text).as_deref(),
                Some("Compression complete.")
            );
            let job = f.coordinator.last_job().await.unwrap();
            assert_eq!(job.id, restarted.job_id);
            assert_eq!(job.state(), JobState::Completed);
        }
    }

    #[tokio::test]
    async fn real_progress_is_clamped_for_display() {
        let f = fixture(StubBehavior {
            run_delay: Duration::from_secs(60),
            ..Default::default()
        });
        f.select().await;
        let accepted = f.coordinator.start_compression().await.unwrap();

        f.coordinator
            .handle_event(WorkerEvent {
                job_id: accepted.job_id,
                message: FromWorker::Progress { progress: 1.3 },
            })
            .await;

        assert_eq!(f.coordinator.snapshot().await.progress_percent, 100.0);
        f.coordinator.cancel().await.unwrap();
    }

    #[tokio::test]
    async fn performance_test_reenables_controls() {
        let f = fixture(StubBehavior::default());
        f.coordinator.run_performance_test().await.unwrap();

        let snapshot = f.wait_until_idle().await;
        assert_idle_controls(&snapshot);
        assert!(snapshot.last_performance_test.is_some());
        assert!(
            snapshot
                .status
                .unwrap()
                .text
                .starts_with("Performance test completed in")
        );
    }

    #[tokio::test]
    async fn failed_performance_test_reenables_controls() {
        let f = fixture(StubBehavior {
            load_error: Some("core module missing".to_string()),
            ..Default::default()
        });
        f.coordinator.run_performance_test().await.unwrap();

        let snapshot = f.wait_until_idle().await;
        assert_idle_controls(&snapshot);
        assert_eq!(
            snapshot.status.map(|s| s.text),
            Some("Error: failed to load encoder: core module missing".to_string())
        );
        assert!(snapshot.last_performance_test.is_none());
    }

    #[tokio::test]
    async fn missing_encoder_disables_the_tool() {
        let f = fixture(StubBehavior::default());
        let report = ReadinessReport::from_capabilities(false, Vec::new());
        f.coordinator.apply_readiness(&report).await;

        let snapshot = f.coordinator.snapshot().await;
        assert!(!snapshot.start_enabled);
        assert!(!snapshot.input_enabled);
        assert!(snapshot.readiness.is_some());
        assert!(!f.coordinator.readiness().await.unwrap().encoder_available);
        assert!(matches!(
            f.coordinator.start_compression().await.unwrap_err(),
            JobError::ToolDisabled
        ));
    }

    #[tokio::test]
    async fn events_for_unknown_jobs_are_ignored() {
        let f = fixture(StubBehavior::default());
        f.coordinator
            .handle_event(WorkerEvent {
                job_id: Uuid::new_v4(),
                message: FromWorker::Error {
                    error: "stale".to_string(),
                },
            })
            .await;
        let snapshot = f.coordinator.snapshot().await;
        assert_idle_controls(&snapshot);
        assert!(snapshot.status.is_none());
    }
}
