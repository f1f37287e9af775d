use super::errors::JobError;
use crate::infrastructure::storage::artifacts::TempArtifact;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Initializing,
    LoadingEncoder,
    Encoding,
    Finalizing,
    Completed,
    Canceled,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Canceled | JobState::Failed)
    }

    /// States in which a cancel request is honoured.
    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            JobState::Initializing | JobState::LoadingEncoder | JobState::Encoding
        )
    }

    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Idle, Initializing)
                | (Initializing, LoadingEncoder)
                // session already loaded
                | (Initializing, Encoding)
                | (LoadingEncoder, Encoding)
                | (Encoding, Finalizing)
                | (Finalizing, Completed)
                | (Initializing | LoadingEncoder | Encoding, Canceled)
                | (Initializing | LoadingEncoder | Encoding | Finalizing, Failed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Compression,
    PerformanceTest,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub file_name: Option<String>,
    pub cpu_cores: Option<u32>,
    pub created_at: OffsetDateTime,
    state: JobState,
    history: Vec<JobState>,
}

impl Job {
    pub fn new(kind: JobKind, file_name: Option<String>, cpu_cores: Option<u32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            file_name,
            cpu_cores,
            created_at: OffsetDateTime::now_utc(),
            state: JobState::Idle,
            history: vec![JobState::Idle],
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Every state the job has been in, oldest first.
    pub fn history(&self) -> &[JobState] {
        &self.history
    }

    pub fn advance(&mut self, next: JobState) -> Result<(), JobError> {
        if !self.state.can_transition_to(next) || self.history.contains(&next) {
            return Err(JobError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.history.push(next);
        Ok(())
    }
}

/// An uploaded input video. Clones share the file; it is deleted with the last clone.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub size: u64,
    artifact: Arc<TempArtifact>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, size: u64, artifact: TempArtifact) -> Self {
        Self {
            name: name.into(),
            size,
            artifact: Arc::new(artifact),
        }
    }

    pub fn path(&self) -> &Path {
        self.artifact.path()
    }
}
