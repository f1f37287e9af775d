//! Scriptable in-memory encoder for tests.

use super::{Encoder, EncoderError, EncoderFactory, ProgressCallback};
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const STUB_OUTPUT: &[u8] = b"encoded-video";

#[derive(Clone, Debug, Default)]
pub struct StubBehavior {
    pub load_error: Option<String>,
    pub run_error: Option<String>,
    pub load_delay: Duration,
    pub run_delay: Duration,
    /// Ratios reported through the progress callback on every run.
    pub ratios: Vec<f64>,
}

/// Every call the stub saw, in order, e.g. `"load"`, `"run -i input.mp4 ..."`, `"exit"`.
#[derive(Clone, Debug, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.lock().unwrap().iter().any(|e| e == entry)
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

pub struct StubEncoder {
    behavior: StubBehavior,
    journal: Journal,
    loaded: bool,
    files: HashMap<String, Vec<u8>>,
    progress: Option<ProgressCallback>,
}

impl StubEncoder {
    pub fn new(behavior: StubBehavior, journal: Journal) -> Self {
        Self {
            behavior,
            journal,
            loaded: false,
            files: HashMap::new(),
            progress: None,
        }
    }

    pub fn factory(behavior: StubBehavior, journal: Journal) -> EncoderFactory {
        Arc::new(move || Box::new(StubEncoder::new(behavior.clone(), journal.clone())))
    }
}

impl Encoder for StubEncoder {
    fn load(&mut self) -> BoxFuture<'_, Result<(), EncoderError>> {
        Box::pin(async move {
            self.journal.record("load");
            tokio::time::sleep(self.behavior.load_delay).await;
            if let Some(message) = &self.behavior.load_error {
                return Err(EncoderError::Load(message.clone()));
            }
            self.loaded = true;
            Ok(())
        })
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn write_file<'a>(
        &'a mut self,
        name: &'a str,
        source: &'a Path,
    ) -> BoxFuture<'a, Result<(), EncoderError>> {
        Box::pin(async move {
            if !self.loaded {
                return Err(EncoderError::NotLoaded);
            }
            let data = tokio::fs::read(source).await?;
            self.journal.record(format!("write {name}"));
            self.files.insert(name.to_string(), data);
            Ok(())
        })
    }

    fn read_file<'a>(
        &'a mut self,
        name: &'a str,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<u64, EncoderError>> {
        Box::pin(async move {
            self.journal.record(format!("read {name}"));
            let data = self
                .files
                .get(name)
                .ok_or_else(|| EncoderError::FileNotFound(name.to_string()))?;
            tokio::fs::write(dest, data).await?;
            Ok(data.len() as u64)
        })
    }

    fn unlink(&mut self, name: &str) -> Result<(), EncoderError> {
        self.journal.record(format!("unlink {name}"));
        self.files
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EncoderError::FileNotFound(name.to_string()))
    }

    fn set_progress(&mut self, callback: ProgressCallback) {
        self.progress = Some(callback);
    }

    fn run<'a>(&'a mut self, args: &'a [String]) -> BoxFuture<'a, Result<(), EncoderError>> {
        Box::pin(async move {
            if !self.loaded {
                return Err(EncoderError::NotLoaded);
            }
            self.journal.record(format!("run {}", args.join(" ")));
            tokio::time::sleep(self.behavior.run_delay).await;
            if let Some(callback) = &self.progress {
                for ratio in &self.behavior.ratios {
                    callback(*ratio);
                }
            }
            if let Some(message) = &self.behavior.run_error {
                return Err(EncoderError::Run(message.clone()));
            }
            if let Some(output) = args.last() {
                self.files.insert(output.clone(), STUB_OUTPUT.to_vec());
            }
            Ok(())
        })
    }

    fn exit(&mut self) {
        self.journal.record("exit");
        self.loaded = false;
        self.files.clear();
        self.progress = None;
    }
}
