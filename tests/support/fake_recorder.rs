use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use voicememo::audio::{RecorderService, RecorderStreams};
use voicememo::{Failure, Outcome, RecorderState, RecordingDetails};

#[derive(Default)]
struct Inner {
    calls: Vec<String>,
    failures: HashMap<&'static str, String>,
    takes: usize,
    save_delay: Option<Duration>,
    states: Option<mpsc::UnboundedSender<RecorderState>>,
    elapsed: Option<mpsc::UnboundedSender<Duration>>,
}

/// Scripted recorder service writing small placeholder files into `dir`.
///
/// The n-th take is written as `rec<n>.wav` and lasts n seconds. A failing
/// `stop_recording` pushes `Stopped`, the way the device recorder does.
#[derive(Clone)]
pub struct FakeRecorder {
    dir: PathBuf,
    inner: Arc<Mutex<Inner>>,
}

impl FakeRecorder {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            inner: Arc::default(),
        }
    }

    pub fn fail_next(&self, op: &'static str, message: &str) {
        self.inner
            .lock()
            .unwrap()
            .failures
            .insert(op, message.to_string());
    }

    pub fn delay_saves(&self, delay: Duration) {
        self.inner.lock().unwrap().save_delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|call| *call == op).count()
    }

    pub fn push_state(&self, state: RecorderState) {
        let inner = self.inner.lock().unwrap();
        inner
            .states
            .as_ref()
            .expect("recorder service not initialized")
            .send(state)
            .unwrap();
    }

    pub fn push_elapsed(&self, elapsed: Duration) {
        let inner = self.inner.lock().unwrap();
        inner
            .elapsed
            .as_ref()
            .expect("recorder service not initialized")
            .send(elapsed)
            .unwrap();
    }

    fn record(&self, op: &'static str) -> Outcome<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(op.to_string());
        match inner.failures.remove(op) {
            Some(message) => Err(Failure::new(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RecorderService for FakeRecorder {
    async fn initialize(&mut self) -> Outcome<RecorderStreams> {
        self.record("initialize")?;
        let (states_tx, states) = mpsc::unbounded_channel();
        let (elapsed_tx, elapsed) = mpsc::unbounded_channel();

        let mut inner = self.inner.lock().unwrap();
        inner.states = Some(states_tx);
        inner.elapsed = Some(elapsed_tx);
        Ok(RecorderStreams { states, elapsed })
    }

    async fn dispose(&mut self) -> Outcome<()> {
        self.record("dispose")?;
        let mut inner = self.inner.lock().unwrap();
        inner.states = None;
        inner.elapsed = None;
        Ok(())
    }

    async fn start_recording(&mut self) -> Outcome<()> {
        self.record("start_recording")
    }

    async fn stop_recording(&mut self) -> Outcome<RecordingDetails> {
        if let Err(e) = self.record("stop_recording") {
            // Like the WAV recorder: a failed stop leaves nothing recording
            self.push_state(RecorderState::Stopped);
            return Err(e);
        }
        let take = {
            let mut inner = self.inner.lock().unwrap();
            inner.takes += 1;
            inner.takes
        };

        let path = self.dir.join(format!("rec{}.wav", take));
        std::fs::write(&path, b"RIFF")?;
        Ok(RecordingDetails::new(path, Duration::from_secs(take as u64)))
    }

    async fn save(&mut self, recording: &RecordingDetails, name: &str) -> Outcome<RecordingDetails> {
        let delay = self.inner.lock().unwrap().save_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record("save")?;

        let target = self.dir.join(format!("{}.wav", name));
        std::fs::rename(&recording.path, &target)?;
        Ok(RecordingDetails {
            path: target,
            name: name.to_string(),
            duration: recording.duration,
        })
    }

    async fn delete(&mut self, recording: &RecordingDetails) -> Outcome<()> {
        self.record("delete")?;
        std::fs::remove_file(&recording.path)?;
        Ok(())
    }
}
