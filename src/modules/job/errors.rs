use super::model::JobState;
use crate::common::response::ApiError;
use axum::http::StatusCode;
use thiserror::Error;

pub const OUT_OF_MEMORY_GUIDANCE: &str =
    "The encoder ran out of memory during compression. Try using a smaller file.";
pub const INVALID_DATA_GUIDANCE: &str = "The selected file is not a valid video or is corrupted.";

/// Maps a raw encoder failure to the text shown to the user.
pub fn classify_error(message: &str) -> String {
    if message.contains("Out of memory") {
        OUT_OF_MEMORY_GUIDANCE.to_string()
    } else if message.contains("Invalid data") {
        INVALID_DATA_GUIDANCE.to_string()
    } else {
        message.to_string()
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Please select a video file first.")]
    NoFileSelected,
    #[error("A job is already active.")]
    JobAlreadyActive,
    #[error("No compression job is active.")]
    NoActiveJob,
    #[error("The tool is disabled because the video encoder is unavailable.")]
    ToolDisabled,
    #[error("The background worker is unavailable.")]
    WorkerUnavailable,
    #[error("illegal job transition from {from:?} to {to:?}")]
    IllegalTransition { from: JobState, to: JobState },
}

impl JobError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            JobError::NoFileSelected => StatusCode::BAD_REQUEST,
            JobError::JobAlreadyActive | JobError::NoActiveJob => StatusCode::CONFLICT,
            JobError::ToolDisabled | JobError::WorkerUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            JobError::IllegalTransition { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JobError> for ApiError {
    fn from(e: JobError) -> Self {
        let status = e.status_code();
        ApiError(e.to_string(), status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_memory_gets_memory_guidance() {
        assert_eq!(
            classify_error("ffmpeg: Out of memory at frame 12"),
            OUT_OF_MEMORY_GUIDANCE
        );
    }

    #[test]
    fn invalid_data_gets_corrupt_input_guidance() {
        assert_eq!(
            classify_error("Invalid data found when processing input"),
            INVALID_DATA_GUIDANCE
        );
    }

    #[test]
    fn unknown_errors_pass_through_verbatim() {
        assert_eq!(classify_error("disk full"), "disk full");
        assert_eq!(classify_error(""), "");
    }

    #[test]
    fn rejections_map_to_http_status() {
        assert_eq!(JobError::NoFileSelected.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(JobError::JobAlreadyActive.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            JobError::ToolDisabled.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
