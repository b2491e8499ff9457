use crate::audio::{PlayerService, PlayerStreams};
use crate::failure::{Failure, Outcome};
use crate::messages::{OnDone, PlayerCommand, Reply};
use crate::state::{PlaybackProgress, PlayerControlState, PlayerState, RecordingDetails};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

/// Control operations the player validates before touching the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerOp {
    Initialize,
    Dispose,
    Start,
    Pause,
    Resume,
    Stop,
    Seek,
    AppGoInactive,
}

/// Outcome of validating an operation against the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Valid, but there is nothing to do
    Unchanged,
    /// Call the service, then move to this state
    Transition(PlayerState),
}

/// Pure transition table for the player.
pub fn plan(current: PlayerState, op: PlayerOp) -> Outcome<Plan> {
    use PlayerState::*;

    match (op, current) {
        (PlayerOp::Initialize, Uninitialized) => Ok(Plan::Transition(Stopped)),
        (PlayerOp::Initialize, _) => Ok(Plan::Unchanged),

        (PlayerOp::Dispose, Uninitialized) => Ok(Plan::Unchanged),
        (PlayerOp::Dispose, _) => Ok(Plan::Transition(Uninitialized)),

        (PlayerOp::AppGoInactive, Playing) => Ok(Plan::Transition(Paused)),
        (PlayerOp::AppGoInactive, _) => Ok(Plan::Unchanged),

        (_, Uninitialized) => Err(Failure::new("Player is not initialized")),

        (PlayerOp::Start, Stopped) => Ok(Plan::Transition(Playing)),
        (PlayerOp::Start, Playing) => Err(Failure::new("Player is already playing")),
        (PlayerOp::Start, Paused) => Err(Failure::new("Player is paused, stop it before starting")),

        (PlayerOp::Pause, Playing) => Ok(Plan::Transition(Paused)),
        (PlayerOp::Pause, Paused) => Ok(Plan::Unchanged),

        (PlayerOp::Resume, Paused) => Ok(Plan::Transition(Playing)),
        (PlayerOp::Resume, Playing) => Ok(Plan::Unchanged),

        (PlayerOp::Stop, Playing | Paused) => Ok(Plan::Transition(Stopped)),
        (PlayerOp::Stop, Stopped) => Ok(Plan::Unchanged),

        (PlayerOp::Seek, Playing | Paused) => Ok(Plan::Transition(current)),

        (PlayerOp::Pause | PlayerOp::Resume | PlayerOp::Seek, Stopped) => {
            Err(Failure::new("Player is stopped"))
        }
    }
}

enum PlayerEvent {
    State(PlayerState),
    Position(PlaybackProgress),
}

async fn next_event(streams: &mut Option<PlayerStreams>) -> Option<PlayerEvent> {
    let Some(streams) = streams else {
        return std::future::pending().await;
    };

    tokio::select! {
        Some(state) = streams.states.recv() => Some(PlayerEvent::State(state)),
        Some(progress) = streams.positions.recv() => Some(PlayerEvent::Position(progress)),
        else => None,
    }
}

/// Player control state machine
///
/// This service:
/// - Owns the published `PlayerControlState`
/// - Validates every command against the current state before calling the service
/// - Folds the service's state and position streams into the published state
/// - Processes one command at a time, in arrival order
pub struct Player {
    service: Box<dyn PlayerService>,
    cmd_rx: mpsc::Receiver<PlayerCommand>,
    state_tx: watch::Sender<PlayerControlState>,
    failures: broadcast::Sender<Failure>,
    streams: Option<PlayerStreams>,
    on_done: Option<OnDone>,
}

impl Player {
    pub fn new(service: Box<dyn PlayerService>, capacity: usize) -> (Self, PlayerHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(capacity.max(1));
        let (state_tx, state_rx) = watch::channel(PlayerControlState::default());
        let (failures, _) = broadcast::channel(16);

        let handle = PlayerHandle {
            tx: cmd_tx,
            state_rx,
            failures: failures.clone(),
        };

        let player = Self {
            service,
            cmd_rx,
            state_tx,
            failures,
            streams: None,
            on_done: None,
        };

        (player, handle)
    }

    /// Create a player and run it on the current runtime
    pub fn spawn(service: Box<dyn PlayerService>, capacity: usize) -> PlayerHandle {
        let (player, handle) = Self::new(service, capacity);
        tokio::spawn(player.run());
        handle
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                // Drain pushed updates first so a command never races a stale event
                event = next_event(&mut self.streams) => match event {
                    Some(event) => self.apply_event(event),
                    None => {
                        tracing::warn!("Player service streams closed");
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

    async fn handle_command(&mut self, cmd: PlayerCommand) {
        let op = cmd.name();
        tracing::debug!("Player: handling {}", op);

        match cmd {
            PlayerCommand::Initialize(reply) => {
                let result = self.initialize().await;
                self.finish(op, result, reply).await;
            }
            PlayerCommand::Dispose(reply) => {
                let result = self.dispose().await;
                self.finish(op, result, reply).await;
            }
            PlayerCommand::Start {
                recording,
                on_done,
                reply,
            } => {
                let result = self.start(recording, on_done).await;
                self.finish(op, result, reply).await;
            }
            PlayerCommand::Pause(reply) => {
                let result = self.pause(PlayerOp::Pause).await;
                self.finish(op, result, reply).await;
            }
            PlayerCommand::Resume(reply) => {
                let result = self.resume().await;
                self.finish(op, result, reply).await;
            }
            PlayerCommand::Stop(reply) => {
                let result = self.stop().await;
                self.finish(op, result, reply).await;
            }
            PlayerCommand::Seek(position, reply) => {
                let result = self.seek(position).await;
                self.finish(op, result, reply).await;
            }
            PlayerCommand::AppGoInactive(reply) => {
                let result = self.pause(PlayerOp::AppGoInactive).await;
                self.finish(op, result, reply).await;
            }
        }
    }

    async fn finish<T>(&mut self, op: &str, result: Outcome<T>, reply: Reply<T>) {
        if let Err(e) = &result {
            tracing::warn!("Player {} failed: {}", op, e);
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

    fn snapshot(&self) -> PlayerControlState {
        self.state_tx.borrow().clone()
    }

    fn publish(&self, next: PlayerControlState) {
        self.state_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    /// Validate `op` and mark the state as processing.
    ///
    /// Returns the state to restore on failure together with the target state,
    /// or `None` when the operation is a valid no-op.
    fn begin(&self, op: PlayerOp) -> Outcome<Option<(PlayerControlState, PlayerState)>> {
        let before = self.snapshot();
        match plan(before.state, op)? {
            Plan::Unchanged => {
                tracing::debug!("Player: {:?} is a no-op in {:?}", op, before.state);
                Ok(None)
            }
            Plan::Transition(target) => {
                self.publish(before.with_processing(true));
                Ok(Some((before, target)))
            }
        }
    }

    /// Restore the pre-operation state and hand the failure back
    fn rollback(&self, before: PlayerControlState, e: Failure) -> Failure {
        self.publish(before);
        e
    }

    async fn initialize(&mut self) -> Outcome<()> {
        let Some((before, target)) = self.begin(PlayerOp::Initialize)? else {
            return Ok(());
        };

        let streams = match self.service.initialize().await {
            Ok(streams) => streams,
            Err(e) => return Err(self.rollback(before, e)),
        };

        self.streams = Some(streams);
        self.publish(before.with_state(target));
        tracing::info!("Player initialized");
        Ok(())
    }

    async fn dispose(&mut self) -> Outcome<()> {
        let Some((before, _)) = self.begin(PlayerOp::Dispose)? else {
            return Ok(());
        };

        if let Err(e) = self.service.dispose().await {
            return Err(self.rollback(before, e));
        }

        self.streams = None;
        self.on_done = None;
        self.publish(PlayerControlState::default());
        tracing::info!("Player disposed");
        Ok(())
    }

    async fn start(&mut self, recording: RecordingDetails, on_done: Option<OnDone>) -> Outcome<()> {
        let Some((before, target)) = self.begin(PlayerOp::Start)? else {
            return Ok(());
        };

        if let Err(e) = self.service.start(&recording.path).await {
            return Err(self.rollback(before, e));
        }

        tracing::info!("Playback started: {}", recording.path.display());
        let progress = PlaybackProgress {
            position: Duration::ZERO,
            duration: recording.duration,
        };
        self.on_done = on_done;
        self.publish(
            before
                .with_state(target)
                .with_progress(progress)
                .with_recording(Some(recording)),
        );
        Ok(())
    }

    async fn pause(&mut self, op: PlayerOp) -> Outcome<()> {
        let Some((before, target)) = self.begin(op)? else {
            return Ok(());
        };

        if let Err(e) = self.service.pause().await {
            return Err(self.rollback(before, e));
        }

        tracing::info!("Playback paused");
        self.publish(before.with_state(target));
        Ok(())
    }

    async fn resume(&mut self) -> Outcome<()> {
        let Some((before, target)) = self.begin(PlayerOp::Resume)? else {
            return Ok(());
        };

        if let Err(e) = self.service.resume().await {
            return Err(self.rollback(before, e));
        }

        tracing::info!("Playback resumed");
        self.publish(before.with_state(target));
        Ok(())
    }

    async fn stop(&mut self) -> Outcome<()> {
        let Some((before, target)) = self.begin(PlayerOp::Stop)? else {
            return Ok(());
        };

        if let Err(e) = self.service.stop().await {
            return Err(self.rollback(before, e));
        }

        tracing::info!("Playback stopped");
        self.publish(before.with_state(target));
        self.fire_on_done();
        Ok(())
    }

    async fn seek(&mut self, position: Duration) -> Outcome<()> {
        let Some((before, target)) = self.begin(PlayerOp::Seek)? else {
            return Ok(());
        };

        if let Err(e) = self.service.seek(position).await {
            return Err(self.rollback(before, e));
        }

        tracing::debug!("Seek requested to {:?}", position);
        self.publish(before.with_state(target));
        Ok(())
    }

    fn apply_event(&mut self, event: PlayerEvent) {
        let current = self.snapshot();

        match event {
            PlayerEvent::Position(progress) => {
                if current.state.is_initialized() {
                    self.publish(current.with_progress(progress));
                }
            }
            PlayerEvent::State(state) => match (current.state, state) {
                (PlayerState::Playing | PlayerState::Paused, PlayerState::Stopped) => {
                    tracing::info!("Playback finished");
                    self.publish(current.with_state(PlayerState::Stopped));
                    self.fire_on_done();
                }
                (PlayerState::Playing, PlayerState::Paused)
                | (PlayerState::Paused, PlayerState::Playing) => {
                    tracing::debug!("Service moved playback to {:?}", state);
                    self.publish(current.with_state(state));
                }
                (from, to) => {
                    tracing::debug!("Ignoring service state {:?} while {:?}", to, from);
                }
            },
        }
    }

    fn fire_on_done(&mut self) {
        if let Some(on_done) = self.on_done.take() {
            on_done();
        }
    }

    async fn teardown(&mut self) {
        if !self.snapshot().state.is_initialized() {
            return;
        }

        tracing::debug!("Player handles dropped, disposing service");
        self.streams = None;
        self.on_done = None;
        if let Err(e) = self.service.dispose().await {
            tracing::error!("Failed to dispose player service: {}", e);
        }
        self.publish(PlayerControlState::default());
    }
}

/// Handle for communicating with the Player
#[derive(Clone)]
pub struct PlayerHandle {
    tx: mpsc::Sender<PlayerCommand>,
    state_rx: watch::Receiver<PlayerControlState>,
    failures: broadcast::Sender<Failure>,
}

impl PlayerHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> PlayerCommand) -> Outcome<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|e| Failure::new(format!("Failed to send player command: {}", e)))?;

        rx.await
            .map_err(|e| Failure::new(format!("Failed to receive player response: {}", e)))?
    }

    pub async fn initialize(&self) -> Outcome<()> {
        self.request(PlayerCommand::Initialize).await
    }

    pub async fn dispose(&self) -> Outcome<()> {
        self.request(PlayerCommand::Dispose).await
    }

    pub async fn start(&self, recording: RecordingDetails, on_done: Option<OnDone>) -> Outcome<()> {
        self.request(|reply| PlayerCommand::Start {
            recording,
            on_done,
            reply,
        })
        .await
    }

    pub async fn pause(&self) -> Outcome<()> {
        self.request(PlayerCommand::Pause).await
    }

    pub async fn resume(&self) -> Outcome<()> {
        self.request(PlayerCommand::Resume).await
    }

    pub async fn stop(&self) -> Outcome<()> {
        self.request(PlayerCommand::Stop).await
    }

    pub async fn seek_to_position(&self, position: Duration) -> Outcome<()> {
        self.request(|reply| PlayerCommand::Seek(position, reply)).await
    }

    pub async fn app_go_inactive(&self) -> Outcome<()> {
        self.request(PlayerCommand::AppGoInactive).await
    }

    /// Latest published state
    pub fn state(&self) -> PlayerControlState {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerControlState> {
        self.state_rx.clone()
    }

    /// Failures as they happen, for transient display
    pub fn failures(&self) -> broadcast::Receiver<Failure> {
        self.failures.subscribe()
    }
}
