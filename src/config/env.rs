use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    EncoderPath,
    WorkDir,
    MaxUploadBytes,
    DownloadTtlSecs,
    StatusDisplaySecs,
    CpuCores,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::EncoderPath => "ENCODER_PATH",
            EnvKey::WorkDir => "WORK_DIR",
            EnvKey::MaxUploadBytes => "MAX_UPLOAD_BYTES",
            EnvKey::DownloadTtlSecs => "DOWNLOAD_TTL_SECS",
            EnvKey::StatusDisplaySecs => "STATUS_DISPLAY_SECS",
            EnvKey::CpuCores => "CPU_CORES",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Like [`get_parsed`] but without a fallback: unset or unparsable values are `None`.
pub fn get_optional<T: FromStr>(key: EnvKey) -> Option<T> {
    get(key).ok().and_then(|val| val.parse::<T>().ok())
}
