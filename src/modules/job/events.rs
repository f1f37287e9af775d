use super::model::SourceFile;
use crate::infrastructure::storage::artifacts::ResultBlob;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCapabilities {
    pub cpu_cores: Option<u32>,
}

/// Coordinator → worker.
#[derive(Debug)]
pub enum ToWorker {
    Start {
        job_id: Uuid,
        file: SourceFile,
        ffmpeg_loaded: bool,
        device_capabilities: DeviceCapabilities,
    },
    /// Applies to whichever job the worker is running; ignored when idle.
    Cancel,
    PerformanceTest {
        job_id: Uuid,
        ffmpeg_loaded: bool,
        device_capabilities: DeviceCapabilities,
    },
}

impl ToWorker {
    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            ToWorker::Start { job_id, .. } | ToWorker::PerformanceTest { job_id, .. } => {
                Some(*job_id)
            }
            ToWorker::Cancel => None,
        }
    }
}

/// Worker → coordinator.
#[derive(Debug)]
pub enum FromWorker {
    Loaded,
    Progress { progress: f64 },
    Completed { blob: ResultBlob },
    /// Wall-clock seconds spent in the encode.
    TestCompleted { time: f64 },
    Error { error: String },
}

impl FromWorker {
    pub fn kind(&self) -> &'static str {
        match self {
            FromWorker::Loaded => "loaded",
            FromWorker::Progress { .. } => "progress",
            FromWorker::Completed { .. } => "completed",
            FromWorker::TestCompleted { .. } => "testCompleted",
            FromWorker::Error { .. } => "error",
        }
    }
}

#[derive(Debug)]
pub struct WorkerEvent {
    pub job_id: Uuid,
    pub message: FromWorker,
}
