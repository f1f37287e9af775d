use super::dto::{DownloadLink, StatusMessage, UiSnapshot};
use super::model::JobState;
use std::time::Duration;
use time::OffsetDateTime;

/// Control state of the page, independent of any job.
#[derive(Debug, Clone)]
pub struct UiState {
    pub start_enabled: bool,
    pub cancel_visible: bool,
    pub performance_test_enabled: bool,
    pub input_enabled: bool,
    pub status: Option<StatusMessage>,
    pub estimation: Option<String>,
    pub readiness: Option<StatusMessage>,
    pub download: Option<DownloadLink>,
    pub last_performance_test: Option<f64>,
    display: Duration,
}

impl UiState {
    pub fn new(display: Duration) -> Self {
        Self {
            start_enabled: true,
            cancel_visible: false,
            performance_test_enabled: true,
            input_enabled: true,
            status: None,
            estimation: None,
            readiness: None,
            download: None,
            last_performance_test: None,
            display,
        }
    }

    pub fn begin_compression(&mut self) {
        self.start_enabled = false;
        self.performance_test_enabled = false;
        self.cancel_visible = true;
        self.download = None;
    }

    pub fn begin_performance_test(&mut self) {
        self.start_enabled = false;
        self.performance_test_enabled = false;
        self.cancel_visible = false;
    }

    /// Back to the idle configuration. A disabled tool keeps its actions disabled.
    pub fn reset(&mut self, tool_enabled: bool) {
        self.start_enabled = tool_enabled;
        self.performance_test_enabled = tool_enabled;
        self.cancel_visible = false;
    }

    pub fn disable_tool(&mut self) {
        self.input_enabled = false;
        self.start_enabled = false;
        self.performance_test_enabled = false;
    }

    pub fn set_status(&mut self, text: impl Into<String>) {
        self.status = Some(StatusMessage::transient(text, self.display));
    }

    pub fn set_readiness(&mut self, text: impl Into<String>) {
        self.readiness = Some(StatusMessage::transient(text, self.display));
    }

    pub fn snapshot(&self, job_state: JobState, progress_percent: f64) -> UiSnapshot {
        let now = OffsetDateTime::now_utc();
        let visible = |message: &Option<StatusMessage>| {
            message.as_ref().filter(|m| m.is_visible(now)).cloned()
        };

        UiSnapshot {
            start_enabled: self.start_enabled,
            cancel_visible: self.cancel_visible,
            performance_test_enabled: self.performance_test_enabled,
            input_enabled: self.input_enabled,
            progress_percent,
            job_state,
            status: visible(&self.status),
            estimation: self.estimation.clone(),
            readiness: visible(&self.readiness),
            download: self.download.clone(),
            last_performance_test: self.last_performance_test,
        }
    }
}
