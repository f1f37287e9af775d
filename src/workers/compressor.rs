use crate::infrastructure::encoder::profile::{
    INPUT_FILE, OUTPUT_FILE, compression_args, synthetic_clip_args, thread_count,
};
use crate::infrastructure::encoder::{Encoder, EncoderError};
use crate::infrastructure::storage::artifacts::{ResultBlob, TempArtifact};
use crate::modules::job::errors::{JobError, classify_error};
use crate::modules::job::events::{DeviceCapabilities, FromWorker, ToWorker, WorkerEvent};
use crate::modules::job::model::SourceFile;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const WORKER_CRASHED: &str = "The background worker stopped unexpectedly.";

/// The coordinator's end of a worker.
///
/// Dropping the handle closes the worker's inbox; the worker finishes its
/// current job, tears down its encoder session and exits.
pub struct WorkerHandle {
    name: &'static str,
    tx: mpsc::UnboundedSender<ToWorker>,
}

impl WorkerHandle {
    pub fn spawn(
        name: &'static str,
        encoder: Box<dyn Encoder>,
        output_dir: PathBuf,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Self {
        let (tx, inbox) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(name, encoder, output_dir, inbox, events));
        Self { name, tx }
    }

    pub fn send(&self, message: ToWorker) -> Result<(), JobError> {
        self.tx.send(message).map_err(|_| {
            error!("{} worker is gone", self.name);
            JobError::WorkerUnavailable
        })
    }
}

/// Tags everything a job emits with its id.
#[derive(Clone)]
struct Outbox {
    job_id: Uuid,
    events: mpsc::UnboundedSender<WorkerEvent>,
}

impl Outbox {
    fn send(&self, message: FromWorker) {
        let kind = message.kind();
        if self
            .events
            .send(WorkerEvent {
                job_id: self.job_id,
                message,
            })
            .is_err()
        {
            debug!("Coordinator gone; dropped {} for job {}", kind, self.job_id);
        }
    }
}

async fn run_worker(
    name: &'static str,
    mut encoder: Box<dyn Encoder>,
    output_dir: PathBuf,
    mut inbox: mpsc::UnboundedReceiver<ToWorker>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    info!("🎥 {} worker started", name);

    let mut queued: Option<ToWorker> = None;
    loop {
        let message = match queued.take() {
            Some(message) => message,
            None => match inbox.recv().await {
                Some(message) => message,
                None => break,
            },
        };
        match message {
            ToWorker::Cancel => debug!("{} worker: cancel with no active job", name),
            ToWorker::Start {
                job_id,
                file,
                ffmpeg_loaded,
                device_capabilities,
            } => {
                info!("📦 Received compression job {} ({})", job_id, file.name);
                let outbox = Outbox {
                    job_id,
                    events: events.clone(),
                };
                let token = CancellationToken::new();
                let job = process_compression(
                    encoder.as_mut(),
                    &file,
                    ffmpeg_loaded,
                    device_capabilities,
                    &output_dir,
                    &outbox,
                    &token,
                );
                queued = supervise(job, &mut inbox, &events, &outbox, &token).await;
                encoder.exit();
            }
            ToWorker::PerformanceTest {
                job_id,
                ffmpeg_loaded,
                device_capabilities,
            } => {
                info!("📦 Received performance test {}", job_id);
                let outbox = Outbox {
                    job_id,
                    events: events.clone(),
                };
                let token = CancellationToken::new();
                let job = process_benchmark(
                    encoder.as_mut(),
                    ffmpeg_loaded,
                    device_capabilities,
                    &outbox,
                    &token,
                );
                queued = supervise(job, &mut inbox, &events, &outbox, &token).await;
                encoder.exit();
            }
        }
    }

    encoder.exit();
    info!("{} worker stopped", name);
}

/// Drives one job while still serving the inbox: `Cancel` trips the job's
/// token and new jobs are rejected until this one is done.
///
/// Once the job is canceled the coordinator already considers the worker
/// idle, so the next job is held back and returned to run after teardown.
async fn supervise<F>(
    job: F,
    inbox: &mut mpsc::UnboundedReceiver<ToWorker>,
    events: &mpsc::UnboundedSender<WorkerEvent>,
    outbox: &Outbox,
    token: &CancellationToken,
) -> Option<ToWorker>
where
    F: Future<Output = ()>,
{
    let job = AssertUnwindSafe(job).catch_unwind();
    tokio::pin!(job);
    let mut queued: Option<ToWorker> = None;

    loop {
        tokio::select! {
            result = &mut job => {
                if result.is_err() {
                    error!("❌ Job {} panicked", outbox.job_id);
                    if !token.is_cancelled() {
                        outbox.send(FromWorker::Error { error: WORKER_CRASHED.to_string() });
                    }
                }
                return queued;
            }
            Some(message) = inbox.recv() => match message {
                ToWorker::Cancel => match queued.take() {
                    // The held job was canceled before it could start.
                    Some(held) => info!("Dropping queued job {:?}", held.job_id()),
                    None => {
                        info!("Cancel requested for job {}", outbox.job_id);
                        token.cancel();
                    }
                },
                next if token.is_cancelled() && queued.is_none() => {
                    info!(
                        "Queueing job {:?} until canceled job {} winds down",
                        next.job_id(),
                        outbox.job_id
                    );
                    queued = Some(next);
                }
                ToWorker::Start { job_id, .. } | ToWorker::PerformanceTest { job_id, .. } => {
                    warn!("Rejecting job {}: job {} is still running", job_id, outbox.job_id);
                    let rejected = Outbox {
                        job_id,
                        events: events.clone(),
                    };
                    rejected.send(FromWorker::Error {
                        error: JobError::JobAlreadyActive.to_string(),
                    });
                }
            },
        }
    }
}

async fn process_compression(
    encoder: &mut dyn Encoder,
    file: &SourceFile,
    ffmpeg_loaded: bool,
    capabilities: DeviceCapabilities,
    output_dir: &Path,
    outbox: &Outbox,
    token: &CancellationToken,
) {
    match compress(encoder, file, ffmpeg_loaded, capabilities, output_dir, outbox, token).await {
        Ok(Some(blob)) => {
            info!("✅ Job {} produced {} bytes", outbox.job_id, blob.size);
            outbox.send(FromWorker::Completed { blob });
        }
        Ok(None) => info!("Job {} canceled", outbox.job_id),
        Err(e) => report_failure(outbox, token, &e),
    }
}

async fn process_benchmark(
    encoder: &mut dyn Encoder,
    ffmpeg_loaded: bool,
    capabilities: DeviceCapabilities,
    outbox: &Outbox,
    token: &CancellationToken,
) {
    match benchmark(encoder, ffmpeg_loaded, capabilities, outbox, token).await {
        Ok(Some(time)) => {
            info!("✅ Performance test {} took {:.3}s", outbox.job_id, time);
            outbox.send(FromWorker::TestCompleted { time });
        }
        Ok(None) => info!("Performance test {} canceled", outbox.job_id),
        Err(e) => report_failure(outbox, token, &e),
    }
}

fn report_failure(outbox: &Outbox, token: &CancellationToken, e: &EncoderError) {
    if token.is_cancelled() {
        info!("Job {} failed after cancel: {}", outbox.job_id, e);
        return;
    }
    error!("❌ Job {} failed: {}", outbox.job_id, e);
    outbox.send(FromWorker::Error {
        error: classify_error(&e.to_string()),
    });
}

/// Loads the session unless the coordinator says it already is.
/// Returns `false` when the job was canceled while loading.
async fn ensure_loaded(
    encoder: &mut dyn Encoder,
    ffmpeg_loaded: bool,
    outbox: &Outbox,
    token: &CancellationToken,
) -> Result<bool, EncoderError> {
    if ffmpeg_loaded && encoder.is_loaded() {
        return Ok(true);
    }
    match token.run_until_cancelled(encoder.load()).await {
        Some(result) => result?,
        None => return Ok(false),
    }
    if !ffmpeg_loaded {
        outbox.send(FromWorker::Loaded);
    }
    Ok(true)
}

async fn compress(
    encoder: &mut dyn Encoder,
    file: &SourceFile,
    ffmpeg_loaded: bool,
    capabilities: DeviceCapabilities,
    output_dir: &Path,
    outbox: &Outbox,
    token: &CancellationToken,
) -> Result<Option<ResultBlob>, EncoderError> {
    if !ensure_loaded(encoder, ffmpeg_loaded, outbox, token).await? || token.is_cancelled() {
        return Ok(None);
    }

    match token
        .run_until_cancelled(encoder.write_file(INPUT_FILE, file.path()))
        .await
    {
        Some(result) => result?,
        None => return Ok(None),
    }
    if token.is_cancelled() {
        return Ok(None);
    }

    let threads = thread_count(capabilities.cpu_cores);
    let progress_outbox = outbox.clone();
    let progress_token = token.clone();
    encoder.set_progress(Arc::new(move |ratio| {
        if !progress_token.is_cancelled() {
            progress_outbox.send(FromWorker::Progress { progress: ratio });
        }
    }));

    info!("Encoding job {} with {} threads", outbox.job_id, threads);
    let args = compression_args(threads);
    match token.run_until_cancelled(encoder.run(&args)).await {
        Some(result) => result?,
        None => return Ok(None),
    }
    if token.is_cancelled() {
        return Ok(None);
    }

    let artifact = TempArtifact::in_dir(output_dir, "mp4");
    let size = match token
        .run_until_cancelled(encoder.read_file(OUTPUT_FILE, artifact.path()))
        .await
    {
        Some(result) => result?,
        None => return Ok(None),
    };
    encoder.unlink(INPUT_FILE)?;
    encoder.unlink(OUTPUT_FILE)?;

    Ok(Some(ResultBlob::mp4(artifact, size)))
}

async fn benchmark(
    encoder: &mut dyn Encoder,
    ffmpeg_loaded: bool,
    capabilities: DeviceCapabilities,
    outbox: &Outbox,
    token: &CancellationToken,
) -> Result<Option<f64>, EncoderError> {
    if !ensure_loaded(encoder, ffmpeg_loaded, outbox, token).await? {
        return Ok(None);
    }

    let clip = synthetic_clip_args();
    match token.run_until_cancelled(encoder.run(&clip)).await {
        Some(result) => result?,
        None => return Ok(None),
    }

    let args = compression_args(thread_count(capabilities.cpu_cores));
    let started = Instant::now();
    match token.run_until_cancelled(encoder.run(&args)).await {
        Some(result) => result?,
        None => return Ok(None),
    }
    let elapsed = started.elapsed().as_secs_f64();

    encoder.unlink(INPUT_FILE)?;
    encoder.unlink(OUTPUT_FILE)?;

    Ok(Some(elapsed))
}
