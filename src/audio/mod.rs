pub mod capture;
pub mod facade;
pub mod format;
pub mod playback;
pub mod sink;
pub mod wav_recorder;
pub mod wav_sink;

pub use capture::{AudioCapture, CaptureThread};
pub use facade::{PlayerService, PlayerStreams, RecorderService, RecorderStreams};
pub use format::AudioFormat;
pub use playback::RodioPlayer;
pub use sink::AudioSink;
pub use wav_recorder::WavRecorder;
pub use wav_sink::WavSink;
