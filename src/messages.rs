use crate::failure::Outcome;
use crate::state::RecordingDetails;
use std::time::Duration;
use tokio::sync::oneshot;

pub type Reply<T> = oneshot::Sender<Outcome<T>>;

/// Fired once when playback ends, either naturally or through `stop`
pub type OnDone = Box<dyn FnOnce() + Send + 'static>;

/// Commands for the player machine
pub enum PlayerCommand {
    Initialize(Reply<()>),
    Dispose(Reply<()>),
    Start {
        recording: RecordingDetails,
        on_done: Option<OnDone>,
        reply: Reply<()>,
    },
    Pause(Reply<()>),
    Resume(Reply<()>),
    Stop(Reply<()>),
    Seek(Duration, Reply<()>),
    AppGoInactive(Reply<()>),
}

/// Commands for the recorder machine
pub enum RecorderCommand {
    Initialize(Reply<()>),
    Dispose(Reply<()>),
    Start(Reply<()>),
    Stop(Reply<Option<RecordingDetails>>),
    Save(String, Reply<RecordingDetails>),
    Delete(Reply<()>),
    AppGoInactive(Reply<()>),
}

impl PlayerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            PlayerCommand::Initialize(_) => "initialize",
            PlayerCommand::Dispose(_) => "dispose",
            PlayerCommand::Start { .. } => "start",
            PlayerCommand::Pause(_) => "pause",
            PlayerCommand::Resume(_) => "resume",
            PlayerCommand::Stop(_) => "stop",
            PlayerCommand::Seek(..) => "seek",
            PlayerCommand::AppGoInactive(_) => "app_go_inactive",
        }
    }
}

impl RecorderCommand {
    pub fn name(&self) -> &'static str {
        match self {
            RecorderCommand::Initialize(_) => "initialize",
            RecorderCommand::Dispose(_) => "dispose",
            RecorderCommand::Start(_) => "start",
            RecorderCommand::Stop(_) => "stop",
            RecorderCommand::Save(..) => "save",
            RecorderCommand::Delete(_) => "delete",
            RecorderCommand::AppGoInactive(_) => "app_go_inactive",
        }
    }
}
