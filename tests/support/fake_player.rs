use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use voicememo::audio::{PlayerService, PlayerStreams};
use voicememo::{Failure, Outcome, PlaybackProgress, PlayerState};

#[derive(Default)]
struct Inner {
    calls: Vec<String>,
    failures: HashMap<&'static str, String>,
    started: Vec<PathBuf>,
    seeks: Vec<Duration>,
    states: Option<mpsc::UnboundedSender<PlayerState>>,
    positions: Option<mpsc::UnboundedSender<PlaybackProgress>>,
}

/// Scripted player service. Clones share the same script and call log.
#[derive(Clone, Default)]
pub struct FakePlayer {
    inner: Arc<Mutex<Inner>>,
}

impl FakePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call to `op` fail with `message`
    pub fn fail_next(&self, op: &'static str, message: &str) {
        self.inner
            .lock()
            .unwrap()
            .failures
            .insert(op, message.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|call| *call == op).count()
    }

    pub fn started(&self) -> Vec<PathBuf> {
        self.inner.lock().unwrap().started.clone()
    }

    pub fn seeks(&self) -> Vec<Duration> {
        self.inner.lock().unwrap().seeks.clone()
    }

    pub fn push_state(&self, state: PlayerState) {
        let inner = self.inner.lock().unwrap();
        inner
            .states
            .as_ref()
            .expect("player service not initialized")
            .send(state)
            .unwrap();
    }

    pub fn push_position(&self, position: Duration, duration: Duration) {
        let inner = self.inner.lock().unwrap();
        inner
            .positions
            .as_ref()
            .expect("player service not initialized")
            .send(PlaybackProgress { position, duration })
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
impl PlayerService for FakePlayer {
    async fn initialize(&mut self) -> Outcome<PlayerStreams> {
        self.record("initialize")?;
        let (states_tx, states) = mpsc::unbounded_channel();
        let (positions_tx, positions) = mpsc::unbounded_channel();

        let mut inner = self.inner.lock().unwrap();
        inner.states = Some(states_tx);
        inner.positions = Some(positions_tx);
        Ok(PlayerStreams { states, positions })
    }

    async fn dispose(&mut self) -> Outcome<()> {
        self.record("dispose")?;
        let mut inner = self.inner.lock().unwrap();
        inner.states = None;
        inner.positions = None;
        Ok(())
    }

    async fn start(&mut self, path: &Path) -> Outcome<()> {
        self.record("start")?;
        self.inner.lock().unwrap().started.push(path.to_path_buf());
        Ok(())
    }

    async fn pause(&mut self) -> Outcome<()> {
        self.record("pause")
    }

    async fn resume(&mut self) -> Outcome<()> {
        self.record("resume")
    }

    async fn stop(&mut self) -> Outcome<()> {
        self.record("stop")
    }

    async fn seek(&mut self, position: Duration) -> Outcome<()> {
        self.record("seek")?;
        self.inner.lock().unwrap().seeks.push(position);
        Ok(())
    }
}
