use serde::Serialize;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReadinessReport {
    /// Hard requirement: without it the tool is disabled.
    pub encoder_available: bool,
    /// Informational only.
    pub hardware_acceleration: bool,
    pub hwaccels: Vec<String>,
    pub message: String,
}

impl ReadinessReport {
    pub fn from_capabilities(encoder_available: bool, hwaccels: Vec<String>) -> Self {
        if !encoder_available {
            return Self {
                encoder_available,
                hardware_acceleration: false,
                hwaccels: Vec::new(),
                message: "The video encoder was not found. The tool may not work.".to_string(),
            };
        }

        let hardware_acceleration = !hwaccels.is_empty();
        let acceleration_line = if hardware_acceleration {
            format!("Hardware acceleration is available ({}).", hwaccels.join(", "))
        } else {
            "Hardware acceleration is not available. Performance may be degraded.".to_string()
        };

        Self {
            encoder_available,
            hardware_acceleration,
            hwaccels,
            message: format!("The video encoder is available.\n{acceleration_line}"),
        }
    }

    pub fn tool_enabled(&self) -> bool {
        self.encoder_available
    }
}

/// Checks the encoder binary once at startup.
pub async fn probe(encoder_path: &str) -> ReadinessReport {
    let encoder_available = Command::new(encoder_path)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false);

    let hwaccels = if encoder_available {
        probe_hwaccels(encoder_path).await
    } else {
        warn!("Encoder '{}' is not runnable; disabling the tool", encoder_path);
        Vec::new()
    };

    let report = ReadinessReport::from_capabilities(encoder_available, hwaccels);
    info!(
        encoder_available = report.encoder_available,
        hardware_acceleration = report.hardware_acceleration,
        "Readiness check finished"
    );
    report
}

async fn probe_hwaccels(encoder_path: &str) -> Vec<String> {
    match Command::new(encoder_path)
        .args(["-hide_banner", "-hwaccels"])
        .stdin(Stdio::null())
        .output()
        .await
    {
        Ok(output) if output.status.success() => {
            parse_hwaccels(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(output) => {
            warn!("'{} -hwaccels' exited with {}", encoder_path, output.status);
            Vec::new()
        }
        Err(e) => {
            warn!("Failed to list hardware accelerators: {}", e);
            Vec::new()
        }
    }
}

fn parse_hwaccels(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip_while(|line| !line.starts_with("Hardware acceleration methods"))
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}
