use crate::config::env::{self, EnvKey};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024 * 1024;

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    pub encoder_path: String,
    pub work_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub download_ttl_secs: u64,
    pub status_display_secs: u64,
    /// Overrides the detected CPU parallelism when set.
    pub cpu_cores: Option<u32>,
}

impl AppConfig {
    pub fn new() -> Self {
        let default_work_dir = std::env::temp_dir().join("compressor");

        Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            encoder_path: env::get_or(EnvKey::EncoderPath, "ffmpeg"),
            work_dir: env::get(EnvKey::WorkDir)
                .map(PathBuf::from)
                .unwrap_or(default_work_dir),
            max_upload_bytes: env::get_parsed(EnvKey::MaxUploadBytes, DEFAULT_MAX_UPLOAD_BYTES),
            download_ttl_secs: env::get_parsed(EnvKey::DownloadTtlSecs, 600),
            status_display_secs: env::get_parsed(EnvKey::StatusDisplaySecs, 5),
            cpu_cores: env::get_optional(EnvKey::CpuCores),
        }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.work_dir.join("uploads")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.work_dir.join("results")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.work_dir.join("sessions")
    }

    pub fn download_ttl(&self) -> Duration {
        Duration::from_secs(self.download_ttl_secs)
    }

    pub fn status_display(&self) -> Duration {
        Duration::from_secs(self.status_display_secs)
    }

    #[cfg(test)]
    pub fn for_tests(work_dir: &std::path::Path) -> Self {
        Self {
            server_port: 0,
            encoder_path: "ffmpeg".to_string(),
            work_dir: work_dir.to_path_buf(),
            max_upload_bytes: 16 * 1024 * 1024,
            download_ttl_secs: 600,
            status_display_secs: 5,
            cpu_cores: Some(16),
        }
    }
}
