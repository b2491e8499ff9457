use crate::audio::{RecorderService, RecorderStreams};
use crate::failure::{Failure, Outcome};
use crate::messages::{RecorderCommand, Reply};
use crate::naming::validate_file_name;
use crate::state::{RecorderControlState, RecorderState, RecordingDetails};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

/// Control operations the recorder validates before touching the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderOp {
    Initialize,
    Dispose,
    Start,
    Stop,
    Save,
    Delete,
}

/// Outcome of validating an operation against the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Unchanged,
    Transition(RecorderState),
}

/// Pure transition table for the recorder. Start, save and delete also
/// depend on whether a recording is waiting for a decision.
pub fn plan(current: &RecorderControlState, op: RecorderOp) -> Outcome<Plan> {
    use RecorderState::*;

    let has_pending = current.pending.is_some();

    match (op, current.state) {
        (RecorderOp::Initialize, Uninitialized) => Ok(Plan::Transition(Stopped)),
        (RecorderOp::Initialize, _) => Ok(Plan::Unchanged),

        (RecorderOp::Dispose, Uninitialized) => Ok(Plan::Unchanged),
        (RecorderOp::Dispose, _) => Ok(Plan::Transition(Uninitialized)),

        (_, Uninitialized) => Err(Failure::new("Recorder is not initialized")),

        (RecorderOp::Start, Recording) => Err(Failure::new("Recorder is already recording")),
        (RecorderOp::Start, Stopped) if has_pending => Err(Failure::new(
            "Save or delete the pending recording before starting a new one",
        )),
        (RecorderOp::Start, Stopped) => Ok(Plan::Transition(Recording)),

        (RecorderOp::Stop, Recording) => Ok(Plan::Transition(Stopped)),
        (RecorderOp::Stop, Stopped) => Ok(Plan::Unchanged),

        (RecorderOp::Save | RecorderOp::Delete, Recording) => {
            Err(Failure::new("Stop the recording first"))
        }
        (RecorderOp::Save | RecorderOp::Delete, Stopped) if !has_pending => {
            Err(Failure::new("There is no pending recording"))
        }
        (RecorderOp::Save | RecorderOp::Delete, Stopped) => Ok(Plan::Transition(Stopped)),
    }
}

async fn ensure_exists(recording: &RecordingDetails) -> Outcome<()> {
    match tokio::fs::try_exists(&recording.path).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(Failure::new(format!(
            "Recording file {} no longer exists",
            recording.path.display()
        ))),
        Err(e) => Err(e.into()),
    }
}

enum RecorderEvent {
    State(RecorderState),
    Elapsed(Duration),
}

async fn next_event(streams: &mut Option<RecorderStreams>) -> Option<RecorderEvent> {
    let Some(streams) = streams else {
        return std::future::pending().await;
    };

    tokio::select! {
        Some(state) = streams.states.recv() => Some(RecorderEvent::State(state)),
        Some(elapsed) = streams.elapsed.recv() => Some(RecorderEvent::Elapsed(elapsed)),
        else => None,
    }
}

/// Recorder control state machine
///
/// This service:
/// - Owns the published `RecorderControlState`, including the pending recording
/// - Validates commands and file names before calling the service
/// - Forces recording to stop when the app goes inactive
/// - Processes one command at a time, in arrival order
pub struct Recorder {
    service: Box<dyn RecorderService>,
    cmd_rx: mpsc::Receiver<RecorderCommand>,
    state_tx: watch::Sender<RecorderControlState>,
    failures: broadcast::Sender<Failure>,
    streams: Option<RecorderStreams>,
    max_file_name_len: usize,
}

impl Recorder {
    pub fn new(
        service: Box<dyn RecorderService>,
        capacity: usize,
        max_file_name_len: usize,
    ) -> (Self, RecorderHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(capacity.max(1));
        let (state_tx, state_rx) = watch::channel(RecorderControlState::default());
        let (failures, _) = broadcast::channel(16);

        let handle = RecorderHandle {
            tx: cmd_tx,
            state_rx,
            failures: failures.clone(),
        };

        let recorder = Self {
            service,
            cmd_rx,
            state_tx,
            failures,
            streams: None,
            max_file_name_len,
        };

        (recorder, handle)
    }

    /// Create a recorder and run it on the current runtime
    pub fn spawn(
        service: Box<dyn RecorderService>,
        capacity: usize,
        max_file_name_len: usize,
    ) -> RecorderHandle {
        let (recorder, handle) = Self::new(service, capacity, max_file_name_len);
        tokio::spawn(recorder.run());
        handle
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                event = next_event(&mut self.streams) => match event {
                    Some(event) => self.apply_event(event),
                    None => {
                        tracing::warn!("Recorder service streams closed");
                        self.streams = None;
                    }
                },

                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
            }
        }

        self.teardown().await;
    }

    async fn handle_command(&mut self, cmd: RecorderCommand) {
        let op = cmd.name();
        tracing::debug!("Recorder: handling {}", op);

        match cmd {
            RecorderCommand::Initialize(reply) => {
                let result = self.initialize().await;
                self.finish(op, result, reply).await;
            }
            RecorderCommand::Dispose(reply) => {
                let result = self.dispose().await;
                self.finish(op, result, reply).await;
            }
            RecorderCommand::Start(reply) => {
                let result = self.start().await;
                self.finish(op, result, reply).await;
            }
            RecorderCommand::Stop(reply) => {
                let result = self.stop().await;
                self.finish(op, result, reply).await;
            }
            RecorderCommand::Save(name, reply) => {
                let result = self.save(&name).await;
                self.finish(op, result, reply).await;
            }
            RecorderCommand::Delete(reply) => {
                let result = self.delete().await;
                self.finish(op, result, reply).await;
            }
            RecorderCommand::AppGoInactive(reply) => {
                let result = self.app_go_inactive().await;
                self.finish(op, result, reply).await;
            }
        }
    }

    async fn finish<T>(&mut self, op: &str, result: Outcome<T>, reply: Reply<T>) {
        if let Err(e) = &result {
            tracing::warn!("Recorder {} failed: {}", op, e);
            self.show_error(e).await;
            let _ = self.failures.send(e.clone());
        }
        let _ = reply.send(result);
    }

    /// Publish the failure for display, then settle back on the current state
    async fn show_error(&mut self, e: &Failure) {
        let settled = self.snapshot();
        self.publish(settled.with_error(Some(e.clone())));
        tokio::task::yield_now().await;
        self.publish(settled);
    }

    fn snapshot(&self) -> RecorderControlState {
        self.state_tx.borrow().clone()
    }

    fn publish(&self, next: RecorderControlState) {
        self.state_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn rollback(&self, before: RecorderControlState, e: Failure) -> Failure {
        self.publish(before);
        e
    }

    async fn initialize(&mut self) -> Outcome<()> {
        let before = self.snapshot();
        let Plan::Transition(target) = plan(&before, RecorderOp::Initialize)? else {
            return Ok(());
        };

        self.publish(before.with_processing(true));
        let streams = match self.service.initialize().await {
            Ok(streams) => streams,
            Err(e) => return Err(self.rollback(before, e)),
        };

        self.streams = Some(streams);
        self.publish(before.with_state(target));
        tracing::info!("Recorder initialized");
        Ok(())
    }

    async fn dispose(&mut self) -> Outcome<()> {
        let before = self.snapshot();
        let Plan::Transition(_) = plan(&before, RecorderOp::Dispose)? else {
            return Ok(());
        };

        self.publish(before.with_processing(true));
        if let Err(e) = self.service.dispose().await {
            return Err(self.rollback(before, e));
        }

        self.streams = None;
        self.publish(RecorderControlState::default());
        tracing::info!("Recorder disposed");
        Ok(())
    }

    async fn start(&mut self) -> Outcome<()> {
        let before = self.snapshot();
        let Plan::Transition(target) = plan(&before, RecorderOp::Start)? else {
            return Ok(());
        };

        self.publish(before.with_processing(true));
        if let Err(e) = self.service.start_recording().await {
            return Err(self.rollback(before, e));
        }

        tracing::info!("Recording started");
        self.publish(before.with_state(target).with_elapsed(Duration::ZERO));
        Ok(())
    }

    /// Stop the active recording. Returns the pending recording, if any.
    async fn stop(&mut self) -> Outcome<Option<RecordingDetails>> {
        let before = self.snapshot();
        let Plan::Transition(target) = plan(&before, RecorderOp::Stop)? else {
            return Ok(before.pending);
        };

        self.publish(before.with_processing(true));
        let recording = match self.service.stop_recording().await {
            Ok(recording) => recording,
            Err(e) => return Err(self.rollback(before, e)),
        };

        tracing::info!("Recording stopped: {}", recording.path.display());
        self.publish(
            before
                .with_state(target)
                .with_elapsed(recording.duration)
                .with_pending(Some(recording.clone())),
        );
        Ok(Some(recording))
    }

    async fn save(&mut self, name: &str) -> Outcome<RecordingDetails> {
        let before = self.snapshot();
        let Plan::Transition(target) = plan(&before, RecorderOp::Save)? else {
            return Err(Failure::new("There is no pending recording"));
        };
        let name = validate_file_name(name, self.max_file_name_len)?;
        let pending = before
            .pending
            .clone()
            .ok_or_else(|| Failure::new("There is no pending recording"))?;
        ensure_exists(&pending).await?;

        self.publish(before.with_processing(true));
        let saved = match self.service.save(&pending, name).await {
            Ok(saved) => saved,
            Err(e) => return Err(self.rollback(before, e)),
        };

        tracing::info!("Recording saved to {}", saved.path.display());
        self.publish(before.with_state(target).with_pending(None).with_elapsed(Duration::ZERO));
        Ok(saved)
    }

    async fn delete(&mut self) -> Outcome<()> {
        let before = self.snapshot();
        let Plan::Transition(target) = plan(&before, RecorderOp::Delete)? else {
            return Err(Failure::new("There is no pending recording"));
        };
        let pending = before
            .pending
            .clone()
            .ok_or_else(|| Failure::new("There is no pending recording"))?;
        ensure_exists(&pending).await?;

        self.publish(before.with_processing(true));
        if let Err(e) = self.service.delete(&pending).await {
            return Err(self.rollback(before, e));
        }

        tracing::info!("Recording deleted: {}", pending.path.display());
        self.publish(before.with_state(target).with_pending(None).with_elapsed(Duration::ZERO));
        Ok(())
    }

    /// Forced stop before the host process is suspended.
    ///
    /// Skips the usual precondition checks. If the service cannot stop
    /// cleanly the recorder still ends up stopped, without a pending recording.
    async fn app_go_inactive(&mut self) -> Outcome<()> {
        let before = self.snapshot();
        if before.state != RecorderState::Recording {
            tracing::debug!("App going inactive while {:?}, nothing to stop", before.state);
            return Ok(());
        }

        tracing::info!("App going inactive, forcing recording to stop");
        self.publish(before.with_processing(true));
        match self.service.stop_recording().await {
            Ok(recording) => {
                self.publish(
                    before
                        .with_state(RecorderState::Stopped)
                        .with_elapsed(recording.duration)
                        .with_pending(Some(recording)),
                );
                Ok(())
            }
            Err(e) => {
                self.publish(before.with_state(RecorderState::Stopped).with_pending(None));
                Err(e)
            }
        }
    }

    fn apply_event(&mut self, event: RecorderEvent) {
        let current = self.snapshot();

        match event {
            RecorderEvent::Elapsed(elapsed) => {
                if current.state == RecorderState::Recording {
                    self.publish(current.with_elapsed(elapsed));
                }
            }
            RecorderEvent::State(RecorderState::Stopped)
                if current.state == RecorderState::Recording =>
            {
                tracing::warn!("Recording stopped by the service");
                self.publish(current.with_state(RecorderState::Stopped));
            }
            RecorderEvent::State(state) => {
                tracing::debug!("Ignoring service state {:?} while {:?}", state, current.state);
            }
        }
    }

    async fn teardown(&mut self) {
        if !self.snapshot().state.is_initialized() {
            return;
        }

        tracing::debug!("Recorder handles dropped, disposing service");
        self.streams = None;
        if let Err(e) = self.service.dispose().await {
            tracing::error!("Failed to dispose recorder service: {}", e);
        }
        self.publish(RecorderControlState::default());
    }
}

/// Handle for communicating with the Recorder
#[derive(Clone)]
pub struct RecorderHandle {
    tx: mpsc::Sender<RecorderCommand>,
    state_rx: watch::Receiver<RecorderControlState>,
    failures: broadcast::Sender<Failure>,
}

impl RecorderHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> RecorderCommand) -> Outcome<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|e| Failure::new(format!("Failed to send recorder command: {}", e)))?;

        rx.await
            .map_err(|e| Failure::new(format!("Failed to receive recorder response: {}", e)))?
    }

    pub async fn initialize(&self) -> Outcome<()> {
        self.request(RecorderCommand::Initialize).await
    }

    pub async fn dispose(&self) -> Outcome<()> {
        self.request(RecorderCommand::Dispose).await
    }

    pub async fn start(&self) -> Outcome<()> {
        self.request(RecorderCommand::Start).await
    }

    pub async fn stop(&self) -> Outcome<Option<RecordingDetails>> {
        self.request(RecorderCommand::Stop).await
    }

    pub async fn save_recording(&self, name: impl Into<String>) -> Outcome<RecordingDetails> {
        let name = name.into();
        self.request(|reply| RecorderCommand::Save(name, reply)).await
    }

    pub async fn delete_recording(&self) -> Outcome<()> {
        self.request(RecorderCommand::Delete).await
    }

    pub async fn app_go_inactive(&self) -> Outcome<()> {
        self.request(RecorderCommand::AppGoInactive).await
    }

    /// Latest published state
    pub fn state(&self) -> RecorderControlState {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RecorderControlState> {
        self.state_rx.clone()
    }

    pub fn failures(&self) -> broadcast::Receiver<Failure> {
        self.failures.subscribe()
    }
}
