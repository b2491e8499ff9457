use crate::audio::{RodioPlayer, WavRecorder};
use crate::config::Config;
use crate::library;
use crate::services::{Player, PlayerHandle, Recorder, RecorderHandle};

use anyhow::{Context, Result};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, BufReader};

/// A line typed at the prompt
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Record,
    StopRecording,
    Save(String),
    Delete,
    Play(String),
    Pause,
    Resume,
    Stop,
    Seek(Duration),
    List,
    Status,
    Quit,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match (word, rest) {
        ("record", "") => Command::Record,
        ("stop-recording", "") => Command::StopRecording,
        ("save", name) if !name.is_empty() => Command::Save(name.to_string()),
        ("delete", "") => Command::Delete,
        ("play", target) if !target.is_empty() => Command::Play(target.to_string()),
        ("pause", "") => Command::Pause,
        ("resume", "") => Command::Resume,
        ("stop", "") => Command::Stop,
        ("seek", seconds) if !seconds.is_empty() => {
            let seconds: f64 = seconds
                .parse()
                .with_context(|| format!("Invalid seek position: {}", seconds))?;
            let position = Duration::try_from_secs_f64(seconds)
                .with_context(|| format!("Invalid seek position: {}", seconds))?;
            Command::Seek(position)
        }
        ("list", "") => Command::List,
        ("status", "") => Command::Status,
        ("quit" | "exit", "") => Command::Quit,
        _ => anyhow::bail!("Unknown command: {}", line),
    };

    Ok(Some(command))
}

pub struct App {
    config: Config,
    player: PlayerHandle,
    recorder: RecorderHandle,
}

impl App {
    pub async fn new(config: Config) -> Result<Self> {
        let player = Player::spawn(
            Box::new(RodioPlayer::new(config.position_interval())),
            config.command_queue,
        );
        let recorder = Recorder::spawn(
            Box::new(WavRecorder::new(
                config.recordings_dir.clone(),
                config.audio_format(),
            )),
            config.command_queue,
            config.max_file_name_len,
        );

        player.initialize().await.context("Failed to initialize player")?;
        recorder
            .initialize()
            .await
            .context("Failed to initialize recorder")?;

        tracing::info!(
            "Ready! Commands: record, stop-recording, save <name>, delete, play <name>, pause, resume, stop, seek <secs>, list, status, quit"
        );

        Ok(Self {
            config,
            player,
            recorder,
        })
    }

    pub async fn run(self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            tracing::debug!("Main loop: waiting for input");
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.context("Failed to read input")? else {
                        break;
                    };
                    match parse_command(&line) {
                        Ok(Some(Command::Quit)) => break,
                        Ok(Some(command)) => {
                            if let Err(e) = self.handle_command(command).await {
                                tracing::error!("{:#}", e);
                            }
                        }
                        Ok(None) => {}
                        Err(e) => tracing::error!("{:#}", e),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received Ctrl+C, shutting down");
                    break;
                }
            }
        }

        self.shutdown().await
    }

    async fn handle_command(&self, command: Command) -> Result<()> {
        tracing::debug!("handle_command: {:?}", command);

        match command {
            Command::Record => {
                self.recorder.start().await?;
                println!("Recording...");
            }
            Command::StopRecording => match self.recorder.stop().await? {
                Some(recording) => println!(
                    "Stopped after {:.1}s. Use `save <name>` or `delete`.",
                    recording.duration.as_secs_f64()
                ),
                None => println!("Nothing to stop"),
            },
            Command::Save(name) => {
                let saved = self.recorder.save_recording(name).await?;
                println!("Saved {}", saved.path.display());
            }
            Command::Delete => {
                self.recorder.delete_recording().await?;
                println!("Recording deleted");
            }
            Command::Play(target) => {
                let recording = library::resolve(&self.config.recordings_dir, &target)?;
                let name = recording.name.clone();
                self.player
                    .start(
                        recording,
                        Some(Box::new(move || tracing::info!("Finished playing {}", name))),
                    )
                    .await?;
            }
            Command::Pause => self.player.pause().await?,
            Command::Resume => self.player.resume().await?,
            Command::Stop => self.player.stop().await?,
            Command::Seek(position) => self.player.seek_to_position(position).await?,
            Command::List => {
                for recording in library::list_recordings(&self.config.recordings_dir)? {
                    println!(
                        "{:<40} {:>7.1}s",
                        recording.name,
                        recording.duration.as_secs_f64()
                    );
                }
            }
            Command::Status => {
                let status = serde_json::json!({
                    "player": self.player.state(),
                    "recorder": self.recorder.state(),
                });
                println!("{}", serde_json::to_string_pretty(&status)?);
            }
            Command::Quit => {}
        }

        Ok(())
    }

    /// Force the recorder to stop and keep whatever it captured before exiting
    async fn shutdown(self) -> Result<()> {
        if let Err(e) = self.recorder.app_go_inactive().await {
            tracing::error!("Failed to stop recording on shutdown: {}", e);
        }

        if self.recorder.state().pending.is_some() {
            let secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            let name = format!("memo-{}", secs);
            match self.recorder.save_recording(name).await {
                Ok(saved) => tracing::info!("Unsaved recording kept as {}", saved.path.display()),
                Err(e) => tracing::error!("Failed to keep unsaved recording: {}", e),
            }
        }

        self.player.dispose().await?;
        self.recorder.dispose().await?;

        tracing::info!("voicememo shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command("record").unwrap(), Some(Command::Record));
        assert_eq!(parse_command("  stop  ").unwrap(), Some(Command::Stop));
        assert_eq!(parse_command("exit").unwrap(), Some(Command::Quit));
        assert_eq!(parse_command("").unwrap(), None);
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(
            parse_command("save Team standup").unwrap(),
            Some(Command::Save("Team standup".to_string()))
        );
        assert_eq!(
            parse_command("seek 1.5").unwrap(),
            Some(Command::Seek(Duration::from_millis(1500)))
        );
        assert_eq!(
            parse_command("play memo-1").unwrap(),
            Some(Command::Play("memo-1".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_command("save").is_err());
        assert!(parse_command("seek soon").is_err());
        assert!(parse_command("seek -3").is_err());
        assert!(parse_command("record now").is_err());
        assert!(parse_command("dance").is_err());
    }
}
