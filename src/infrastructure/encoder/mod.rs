//! The video encoder contract.
//!
//! An [`Encoder`] is one encoder session: it is loaded lazily, exposes a small
//! named-file workspace (`write_file` / `read_file` / `unlink`), runs CLI-style
//! argument lists and is torn down with [`Encoder::exit`] after every job.

use futures_util::future::BoxFuture;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub mod ffmpeg;
pub mod profile;
#[cfg(test)]
pub mod stub;

pub use ffmpeg::FfmpegEncoder;

#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("encoder is not loaded")]
    NotLoaded,
    #[error("failed to load encoder: {0}")]
    Load(String),
    #[error("no such file in encoder workspace: {0}")]
    FileNotFound(String),
    #[error("invalid encoder file name: {0}")]
    InvalidName(String),
    #[error("{0}")]
    Run(String),
    #[error("encoder I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Receives the encoder-reported completion ratio. Values may repeat and are not clamped.
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

pub trait Encoder: Send {
    /// Loads the session. Calling it on a loaded session is a no-op.
    fn load(&mut self) -> BoxFuture<'_, Result<(), EncoderError>>;

    fn is_loaded(&self) -> bool;

    /// Copies `source` into the session workspace under `name`.
    fn write_file<'a>(
        &'a mut self,
        name: &'a str,
        source: &'a Path,
    ) -> BoxFuture<'a, Result<(), EncoderError>>;

    /// Copies the workspace file `name` out to `dest`, returning its size in bytes.
    fn read_file<'a>(
        &'a mut self,
        name: &'a str,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<u64, EncoderError>>;

    fn unlink(&mut self, name: &str) -> Result<(), EncoderError>;

    fn set_progress(&mut self, callback: ProgressCallback);

    fn run<'a>(&'a mut self, args: &'a [String]) -> BoxFuture<'a, Result<(), EncoderError>>;

    /// Releases the session and everything in its workspace.
    fn exit(&mut self);
}

/// Builds a fresh, unloaded encoder. Each worker owns the one it was given.
pub type EncoderFactory = Arc<dyn Fn() -> Box<dyn Encoder> + Send + Sync>;
