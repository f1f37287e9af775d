use super::model::{JobKind, JobState};
use serde::Serialize;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Text that is shown for a limited time.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatusMessage {
    pub text: String,
    #[serde(with = "time::serde::iso8601")]
    #[schema(value_type = String)]
    pub visible_until: OffsetDateTime,
}

impl StatusMessage {
    pub fn transient(text: impl Into<String>, display: std::time::Duration) -> Self {
        Self {
            text: text.into(),
            visible_until: OffsetDateTime::now_utc() + display,
        }
    }

    pub fn is_visible(&self, now: OffsetDateTime) -> bool {
        now < self.visible_until
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DownloadLink {
    pub id: Uuid,
    pub url: String,
    pub file_name: String,
    pub size: u64,
}

/// Everything a client needs to render the page.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UiSnapshot {
    pub start_enabled: bool,
    pub cancel_visible: bool,
    pub performance_test_enabled: bool,
    pub input_enabled: bool,
    pub progress_percent: f64,
    pub job_state: JobState,
    pub status: Option<StatusMessage>,
    pub estimation: Option<String>,
    pub readiness: Option<StatusMessage>,
    pub download: Option<DownloadLink>,
    /// Seconds taken by the last successful performance test.
    pub last_performance_test: Option<f64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SelectFileResponse {
    pub name: String,
    pub size: u64,
    pub estimation: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobAccepted {
    pub job_id: Uuid,
    pub kind: JobKind,
    pub state: JobState,
}
