use super::facade::{PlayerService, PlayerStreams};
use crate::failure::{Failure, Outcome};
use crate::state::{PlaybackProgress, PlayerState};
use async_trait::async_trait;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

enum PlaybackOp {
    Start(PathBuf),
    Pause,
    Resume,
    Stop,
    Seek(Duration),
    Shutdown,
}

struct PlaybackRequest {
    op: PlaybackOp,
    reply: oneshot::Sender<Outcome<()>>,
}

struct Playback {
    sink: Sink,
    duration: Duration,
}

/// Plays files on the default output device
///
/// The rodio output stream lives on a dedicated thread, which also ticks the
/// position stream and notices when a file has played to the end.
pub struct RodioPlayer {
    interval: Duration,
    tx: Option<std_mpsc::Sender<PlaybackRequest>>,
    thread: Option<JoinHandle<()>>,
}

impl RodioPlayer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            tx: None,
            thread: None,
        }
    }

    async fn request(&self, op: PlaybackOp) -> Outcome<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| Failure::new("Playback device is not open"))?;

        let (reply, rx) = oneshot::channel();
        tx.send(PlaybackRequest { op, reply })
            .map_err(|e| Failure::new(format!("Failed to send playback command: {}", e)))?;

        rx.await
            .map_err(|e| Failure::new(format!("Failed to receive playback response: {}", e)))?
    }
}

fn active(playback: &Option<Playback>) -> Outcome<&Sink> {
    playback
        .as_ref()
        .map(|p| &p.sink)
        .ok_or_else(|| Failure::new("Nothing is playing"))
}

fn open(stream: &OutputStream, path: &Path) -> Outcome<Playback> {
    let file = File::open(path)
        .map_err(|e| Failure::new(format!("Failed to open {}: {}", path.display(), e)))?;
    let source = Decoder::new(BufReader::new(file))
        .map_err(|e| Failure::new(format!("Failed to decode {}: {}", path.display(), e)))?;
    let duration = source.total_duration().unwrap_or_default();

    let sink = Sink::connect_new(stream.mixer());
    sink.append(source);
    Ok(Playback { sink, duration })
}

fn apply(stream: &OutputStream, playback: &mut Option<Playback>, op: PlaybackOp) -> Outcome<()> {
    match op {
        PlaybackOp::Start(path) => {
            if let Some(previous) = playback.take() {
                previous.sink.stop();
            }
            *playback = Some(open(stream, &path)?);
            Ok(())
        }
        PlaybackOp::Pause => {
            active(playback)?.pause();
            Ok(())
        }
        PlaybackOp::Resume => {
            active(playback)?.play();
            Ok(())
        }
        PlaybackOp::Seek(position) => active(playback)?
            .try_seek(position)
            .map_err(|e| Failure::new(format!("Seek failed: {}", e))),
        PlaybackOp::Stop | PlaybackOp::Shutdown => {
            if let Some(previous) = playback.take() {
                previous.sink.stop();
            }
            Ok(())
        }
    }
}

fn playback_thread(
    rx: std_mpsc::Receiver<PlaybackRequest>,
    ready: oneshot::Sender<Outcome<()>>,
    states: mpsc::UnboundedSender<PlayerState>,
    positions: mpsc::UnboundedSender<PlaybackProgress>,
    interval: Duration,
) {
    let stream = match OutputStreamBuilder::open_default_stream() {
        Ok(stream) => {
            let _ = ready.send(Ok(()));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(Failure::new(format!("Failed to open output stream: {}", e))));
            return;
        }
    };

    let mut playback: Option<Playback> = None;

    loop {
        match rx.recv_timeout(interval) {
            Ok(PlaybackRequest { op, reply }) => {
                let shutdown = matches!(op, PlaybackOp::Shutdown);
                let _ = reply.send(apply(&stream, &mut playback, op));
                if shutdown {
                    break;
                }
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {}
            Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        }

        if let Some(current) = &playback {
            if current.sink.empty() {
                playback = None;
                let _ = states.send(PlayerState::Stopped);
            } else {
                let _ = positions.send(PlaybackProgress {
                    position: current.sink.get_pos(),
                    duration: current.duration,
                });
            }
        }
    }

    tracing::debug!("Playback thread exiting");
}

#[async_trait]
impl PlayerService for RodioPlayer {
    async fn initialize(&mut self) -> Outcome<PlayerStreams> {
        let (tx, rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (states_tx, states) = mpsc::unbounded_channel();
        let (positions_tx, positions) = mpsc::unbounded_channel();
        let interval = self.interval;

        let thread = std::thread::spawn(move || {
            playback_thread(rx, ready_tx, states_tx, positions_tx, interval)
        });

        ready_rx
            .await
            .map_err(|e| Failure::new(format!("Playback thread exited during startup: {}", e)))??;

        self.tx = Some(tx);
        self.thread = Some(thread);
        tracing::info!("Playback device opened");
        Ok(PlayerStreams { states, positions })
    }

    async fn dispose(&mut self) -> Outcome<()> {
        let result = self.request(PlaybackOp::Shutdown).await;
        self.tx = None;

        if let Some(thread) = self.thread.take() {
            tokio::task::spawn_blocking(move || thread.join())
                .await
                .map_err(|e| Failure::new(format!("Failed to join playback thread: {}", e)))?
                .map_err(|_| Failure::new("Playback thread panicked"))?;
        }

        result
    }

    async fn start(&mut self, path: &Path) -> Outcome<()> {
        self.request(PlaybackOp::Start(path.to_path_buf())).await
    }

    async fn pause(&mut self) -> Outcome<()> {
        self.request(PlaybackOp::Pause).await
    }

    async fn resume(&mut self) -> Outcome<()> {
        self.request(PlaybackOp::Resume).await
    }

    async fn stop(&mut self) -> Outcome<()> {
        self.request(PlaybackOp::Stop).await
    }

    async fn seek(&mut self, position: Duration) -> Outcome<()> {
        self.request(PlaybackOp::Seek(position)).await
    }
}
