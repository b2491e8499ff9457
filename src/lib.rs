pub mod app;
pub mod audio;
pub mod config;
pub mod failure;
pub mod library;
pub mod messages;
pub mod naming;
pub mod services;
pub mod state;

pub use failure::{Failure, Outcome};
pub use messages::OnDone;
pub use services::{Player, PlayerHandle, Recorder, RecorderHandle};
pub use state::{
    PlaybackProgress, PlayerControlState, PlayerState, RecorderControlState, RecorderState,
    RecordingDetails,
};
