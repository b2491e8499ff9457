use super::capture::{AudioCapture, CaptureThread};
use super::facade::{RecorderService, RecorderStreams};
use super::format::AudioFormat;
use super::sink::AudioSink;
use super::wav_sink::WavSink;
use crate::failure::{Failure, Outcome};
use crate::state::{RecorderState, RecordingDetails};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct ActiveRecording {
    capture: CaptureThread,
    writer: JoinHandle<Outcome<u64>>,
    file: NamedTempFile,
}

/// Records the default input device into WAV files
///
/// This service:
/// - Captures audio on a dedicated thread and streams chunks to a `WavSink`
/// - Keeps each finished recording as a temp file under `<dir>/.pending`
/// - Persists a temp file under its final name on save, removes it on delete
/// - Pushes elapsed time while recording, and `Stopped` once nothing is
///   recording any more (write failure, failed stop)
pub struct WavRecorder {
    dir: PathBuf,
    format: AudioFormat,
    states: Option<mpsc::UnboundedSender<RecorderState>>,
    elapsed: Option<mpsc::UnboundedSender<Duration>>,
    active: Option<ActiveRecording>,
    pending: HashMap<PathBuf, NamedTempFile>,
}

/// Subdirectory of the recordings directory holding unsaved takes
const PENDING_DIR: &str = ".pending";

async fn stop_and_finalize(
    capture: CaptureThread,
    writer: JoinHandle<Outcome<u64>>,
) -> Outcome<u64> {
    tokio::task::spawn_blocking(move || capture.stop())
        .await
        .map_err(|e| Failure::new(format!("Failed to stop capture: {}", e)))?;

    writer
        .await
        .map_err(|e| Failure::new(format!("Recording writer failed: {}", e)))?
}

impl WavRecorder {
    pub fn new(dir: impl Into<PathBuf>, format: AudioFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
            states: None,
            elapsed: None,
            active: None,
            pending: HashMap::new(),
        }
    }

    /// Receive chunks until capture ends, then finalize the sink
    async fn write_chunks(
        mut sink: Box<dyn AudioSink>,
        mut chunk_rx: mpsc::Receiver<Vec<f32>>,
        format: AudioFormat,
        elapsed: Option<mpsc::UnboundedSender<Duration>>,
        states: Option<mpsc::UnboundedSender<RecorderState>>,
    ) -> Outcome<u64> {
        let mut samples: u64 = 0;

        while let Some(chunk) = chunk_rx.recv().await {
            samples += chunk.len() as u64;
            if let Err(e) = sink.write_chunk(chunk) {
                tracing::error!("Failed to write audio chunk: {}", e);
                if let Some(states) = &states {
                    let _ = states.send(RecorderState::Stopped);
                }
                break;
            }
            if let Some(elapsed) = &elapsed {
                let _ = elapsed.send(format.duration_of(samples));
            }
        }

        sink.finalize().await
    }

    fn pending_dir(&self) -> PathBuf {
        self.dir.join(PENDING_DIR)
    }

    fn push_stopped(&self) {
        if let Some(states) = &self.states {
            let _ = states.send(RecorderState::Stopped);
        }
    }

    /// Stop capture and finalize the active take.
    ///
    /// On failure the take's temp file is discarded and nothing stays active.
    async fn finish_active(&mut self) -> Outcome<RecordingDetails> {
        let ActiveRecording {
            capture,
            writer,
            file,
        } = self
            .active
            .take()
            .ok_or_else(|| Failure::new("No recording in progress"))?;

        match stop_and_finalize(capture, writer).await {
            Ok(samples) => {
                let details = RecordingDetails::new(file.path(), self.format.duration_of(samples));
                self.pending.insert(details.path.clone(), file);
                Ok(details)
            }
            Err(e) => {
                tracing::warn!("Discarding unfinished recording {}: {}", file.path().display(), e);
                Err(e)
            }
        }
    }

    /// Finish and drop a take nobody will claim
    async fn discard_active(&mut self, reason: &str) {
        if self.active.is_none() {
            return;
        }

        tracing::warn!("Discarding the active recording: {}", reason);
        match self.finish_active().await {
            Ok(details) => {
                self.pending.remove(&details.path);
            }
            Err(e) => tracing::warn!("Failed to finish discarded recording: {}", e),
        }
    }

    fn take_pending(&mut self, recording: &RecordingDetails) -> Outcome<NamedTempFile> {
        self.pending.remove(&recording.path).ok_or_else(|| {
            Failure::new(format!(
                "{} is not a pending recording",
                recording.path.display()
            ))
        })
    }
}

#[async_trait]
impl RecorderService for WavRecorder {
    async fn initialize(&mut self) -> Outcome<RecorderStreams> {
        let pending_dir = self.pending_dir();
        tokio::fs::create_dir_all(&pending_dir).await.map_err(|e| {
            Failure::new(format!(
                "Failed to create recordings directory {}: {}",
                pending_dir.display(),
                e
            ))
        })?;

        let (states_tx, states) = mpsc::unbounded_channel();
        let (elapsed_tx, elapsed) = mpsc::unbounded_channel();
        self.states = Some(states_tx);
        self.elapsed = Some(elapsed_tx);

        tracing::info!("Recording into {}", self.dir.display());
        Ok(RecorderStreams { states, elapsed })
    }

    async fn dispose(&mut self) -> Outcome<()> {
        self.discard_active("recorder disposed").await;
        self.pending.clear();
        self.states = None;
        self.elapsed = None;
        Ok(())
    }

    async fn start_recording(&mut self) -> Outcome<()> {
        self.discard_active("it was stopped by a write failure").await;

        let file = tempfile::Builder::new()
            .prefix("recording-")
            .suffix(".wav")
            .tempfile_in(self.pending_dir())
            .map_err(|e| Failure::new(format!("Failed to create temp file: {}", e)))?;

        let sink: Box<dyn AudioSink> = Box::new(WavSink::new(file.path(), self.format)?);

        let (chunk_tx, chunk_rx) = mpsc::channel(100);
        let capture = AudioCapture::start(self.format, chunk_tx)?;

        let writer = tokio::spawn(Self::write_chunks(
            sink,
            chunk_rx,
            self.format,
            self.elapsed.clone(),
            self.states.clone(),
        ));

        self.active = Some(ActiveRecording {
            capture,
            writer,
            file,
        });
        Ok(())
    }

    async fn stop_recording(&mut self) -> Outcome<RecordingDetails> {
        let result = self.finish_active().await;
        if result.is_err() {
            // Nothing is active any more; let the machine follow
            self.push_stopped();
        }
        result
    }

    async fn save(&mut self, recording: &RecordingDetails, name: &str) -> Outcome<RecordingDetails> {
        let file = self.take_pending(recording)?;
        let target = self.dir.join(format!("{}.wav", name));

        match file.persist_noclobber(&target) {
            Ok(_) => Ok(RecordingDetails {
                path: target,
                name: name.to_string(),
                duration: recording.duration,
            }),
            Err(e) => {
                let message = if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                    format!("A recording named {:?} already exists", name)
                } else {
                    format!("Failed to save recording as {}: {}", target.display(), e.error)
                };
                // Keep it pending so the caller can retry with another name
                self.pending.insert(recording.path.clone(), e.file);
                Err(Failure::new(message))
            }
        }
    }

    async fn delete(&mut self, recording: &RecordingDetails) -> Outcome<()> {
        let file = self.take_pending(recording)?;
        file.close().map_err(|e| {
            Failure::new(format!(
                "Failed to delete {}: {}",
                recording.path.display(),
                e
            ))
        })
    }
}
