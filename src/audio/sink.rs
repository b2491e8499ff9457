use crate::failure::Outcome;
use async_trait::async_trait;

/// Trait for streaming audio encoding
///
/// Implementations write samples as they arrive rather than buffering the
/// whole recording.
#[async_trait]
pub trait AudioSink: Send {
    /// Write interleaved samples (called repeatedly during recording)
    fn write_chunk(&mut self, samples: Vec<f32>) -> Outcome<()>;

    /// Finalize and close the sink, returning the number of samples written
    async fn finalize(&mut self) -> Outcome<u64>;
}
