use super::{Encoder, EncoderError, EncoderFactory, ProgressCallback};
use futures_util::future::BoxFuture;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

// Lines of stderr kept for the error message of a failed run.
const STDERR_TAIL: usize = 8;

/// Encoder session backed by the system `ffmpeg` binary.
///
/// The session workspace is a scratch directory created on `load` and removed
/// on `exit`; every `run` executes with that directory as its working
/// directory so relative names like `input.mp4` resolve inside it.
pub struct FfmpegEncoder {
    binary: String,
    root: PathBuf,
    scratch: Option<PathBuf>,
    progress: Option<ProgressCallback>,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            root: root.into(),
            scratch: None,
            progress: None,
        }
    }

    pub fn factory(binary: String, root: PathBuf) -> EncoderFactory {
        Arc::new(move || Box::new(FfmpegEncoder::new(binary.clone(), root.clone())))
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, EncoderError> {
        let scratch = self.scratch.as_deref().ok_or(EncoderError::NotLoaded)?;
        let is_plain = Path::new(name)
            .file_name()
            .is_some_and(|file_name| file_name == name);
        if !is_plain {
            return Err(EncoderError::InvalidName(name.to_string()));
        }
        Ok(scratch.join(name))
    }

    async fn load_session(&mut self) -> Result<(), EncoderError> {
        if self.scratch.is_some() {
            return Ok(());
        }

        let status = Command::new(&self.binary)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| EncoderError::Load(format!("failed to spawn {}: {e}", self.binary)))?;
        if !status.success() {
            return Err(EncoderError::Load(format!(
                "{} -version exited with {status}",
                self.binary
            )));
        }

        let dir = self.root.join(format!("session-{}", Uuid::new_v4().simple()));
        tokio::fs::create_dir_all(&dir).await?;
        info!("Encoder session loaded in {}", dir.display());
        self.scratch = Some(dir);
        Ok(())
    }

    async fn copy_in(&mut self, name: &str, source: &Path) -> Result<(), EncoderError> {
        let target = self.resolve(name)?;
        tokio::fs::copy(source, &target).await?;
        Ok(())
    }

    async fn copy_out(&mut self, name: &str, dest: &Path) -> Result<u64, EncoderError> {
        let source = self.resolve(name)?;
        if !tokio::fs::try_exists(&source).await? {
            return Err(EncoderError::FileNotFound(name.to_string()));
        }
        Ok(tokio::fs::copy(&source, dest).await?)
    }

    async fn run_command(&mut self, args: &[String]) -> Result<(), EncoderError> {
        let dir = self.scratch.clone().ok_or(EncoderError::NotLoaded)?;

        let mut child = Command::new(&self.binary)
            .args(["-nostdin", "-y"])
            .args(args)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EncoderError::Run(format!("failed to spawn {}: {e}", self.binary)))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EncoderError::Run("failed to open encoder stderr".to_string()))?;
        let mut reader = BufReader::new(stderr);
        let mut meter = ProgressMeter::default();
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL);
        let mut segment = Vec::new();

        loop {
            segment.clear();
            if read_segment(&mut reader, &mut segment).await? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&segment).trim().to_string();
            if line.is_empty() {
                continue;
            }
            if let (Some(ratio), Some(callback)) = (meter.observe(&line), self.progress.as_ref()) {
                callback(ratio);
            }
            debug!(target: "encoder", "{}", line);
            if tail.len() == STDERR_TAIL {
                tail.pop_front();
            }
            tail.push_back(line);
        }

        let status = child.wait().await?;
        if !status.success() {
            let detail = Vec::from(tail).join("\n");
            return Err(EncoderError::Run(if detail.is_empty() {
                format!("encoder exited with {status}")
            } else {
                detail
            }));
        }

        if let Some(callback) = self.progress.as_ref() {
            callback(1.0);
        }
        Ok(())
    }
}

impl Encoder for FfmpegEncoder {
    fn load(&mut self) -> BoxFuture<'_, Result<(), EncoderError>> {
        Box::pin(self.load_session())
    }

    fn is_loaded(&self) -> bool {
        self.scratch.is_some()
    }

    fn write_file<'a>(
        &'a mut self,
        name: &'a str,
        source: &'a Path,
    ) -> BoxFuture<'a, Result<(), EncoderError>> {
        Box::pin(self.copy_in(name, source))
    }

    fn read_file<'a>(
        &'a mut self,
        name: &'a str,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<u64, EncoderError>> {
        Box::pin(self.copy_out(name, dest))
    }

    fn unlink(&mut self, name: &str) -> Result<(), EncoderError> {
        let path = self.resolve(name)?;
        std::fs::remove_file(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EncoderError::FileNotFound(name.to_string()),
            _ => EncoderError::Io(e),
        })
    }

    fn set_progress(&mut self, callback: ProgressCallback) {
        self.progress = Some(callback);
    }

    fn run<'a>(&'a mut self, args: &'a [String]) -> BoxFuture<'a, Result<(), EncoderError>> {
        Box::pin(self.run_command(args))
    }

    fn exit(&mut self) {
        self.progress = None;
        if let Some(dir) = self.scratch.take() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!("Failed to remove encoder session {}: {}", dir.display(), e);
            } else {
                info!("Encoder session released");
            }
        }
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        self.exit();
    }
}

/// Turns ffmpeg's `Duration:` banner and `time=` status lines into a ratio.
#[derive(Debug, Default)]
struct ProgressMeter {
    duration: Option<f64>,
}

impl ProgressMeter {
    fn observe(&mut self, line: &str) -> Option<f64> {
        if let Some(rest) = line.trim_start().strip_prefix("Duration:") {
            if self.duration.is_none() {
                self.duration = rest
                    .split(',')
                    .next()
                    .and_then(|stamp| parse_timestamp(stamp.trim()))
                    .filter(|seconds| *seconds > 0.0);
            }
            return None;
        }

        let total = self.duration?;
        let start = line.find("time=")? + "time=".len();
        let stamp = line[start..].split_whitespace().next()?;
        let elapsed = parse_timestamp(stamp)?;
        Some((elapsed / total).max(0.0))
    }
}

fn parse_timestamp(stamp: &str) -> Option<f64> {
    let mut parts = stamp.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Reads up to the next `\n` or `\r` (ffmpeg rewrites its status line with `\r`).
/// Returns the number of bytes consumed, 0 at end of stream.
async fn read_segment<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    out: &mut Vec<u8>,
) -> std::io::Result<usize> {
    let mut consumed = 0;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(consumed);
        }
        match available.iter().position(|b| *b == b'\n' || *b == b'\r') {
            Some(end) => {
                out.extend_from_slice(&available[..end]);
                reader.consume(end + 1);
                return Ok(consumed + end + 1);
            }
            None => {
                let len = available.len();
                out.extend_from_slice(available);
                reader.consume(len);
                consumed += len;
            }
        }
    }
}
