use super::format::AudioFormat;
use super::sink::AudioSink;
use crate::failure::{Failure, Outcome};
use async_trait::async_trait;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

enum WavCommand {
    WriteChunk(Vec<f32>),
    Finalize { reply: oneshot::Sender<Outcome<u64>> },
}

/// WAV encoder using a dedicated blocking thread for I/O
///
/// Audio chunks are sent to the thread via a channel and written sequentially.
/// The first write error is kept; later writes and `finalize` report it.
pub struct WavSink {
    tx: mpsc::UnboundedSender<WavCommand>,
    write_error: Arc<Mutex<Option<Failure>>>,
}

impl WavSink {
    pub fn new(path: &Path, format: AudioFormat) -> Outcome<Self> {
        let spec = WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: AudioFormat::BITS_PER_SAMPLE,
            sample_format: SampleFormat::Int,
        };

        let mut writer = WavWriter::create(path, spec)
            .map_err(|e| Failure::new(format!("Failed to create WAV writer: {}", e)))?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let write_error = Arc::new(Mutex::new(None));
        let thread_error = Arc::clone(&write_error);

        std::thread::spawn(move || {
            let mut written: u64 = 0;
            let mut first_error: Option<Failure> = None;

            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    WavCommand::WriteChunk(samples) => {
                        if first_error.is_some() {
                            continue;
                        }
                        for sample in samples {
                            // Convert f32 (-1.0 to 1.0) to i16
                            let amplitude = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                            if let Err(e) = writer.write_sample(amplitude) {
                                tracing::error!("Failed to write sample: {}", e);
                                let failure = Failure::new(format!("Failed to write sample: {}", e));
                                if let Ok(mut shared) = thread_error.lock() {
                                    *shared = Some(failure.clone());
                                }
                                first_error = Some(failure);
                                break;
                            }
                            written += 1;
                        }
                    }
                    WavCommand::Finalize { reply } => {
                        let result = match first_error {
                            Some(e) => Err(e),
                            None => writer
                                .finalize()
                                .map(|_| written)
                                .map_err(|e| Failure::new(format!("Failed to finalize WAV: {}", e))),
                        };
                        let _ = reply.send(result);
                        break;
                    }
                }
            }
        });

        Ok(Self { tx, write_error })
    }
}

#[async_trait]
impl AudioSink for WavSink {
    fn write_chunk(&mut self, samples: Vec<f32>) -> Outcome<()> {
        if let Some(e) = self.write_error.lock().ok().and_then(|shared| shared.clone()) {
            return Err(e);
        }

        self.tx
            .send(WavCommand::WriteChunk(samples))
            .map_err(|e| Failure::new(format!("Failed to send write command: {}", e)))
    }

    async fn finalize(&mut self) -> Outcome<u64> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WavCommand::Finalize { reply })
            .map_err(|e| Failure::new(format!("Failed to send finalize command: {}", e)))?;

        rx.await
            .map_err(|e| Failure::new(format!("Failed to receive finalize response: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writes_readable_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let format = AudioFormat::default();

        let mut sink = WavSink::new(&path, format).unwrap();
        sink.write_chunk(vec![0.0; 8000]).unwrap();
        sink.write_chunk(vec![0.5; 8000]).unwrap();
        let written = sink.finalize().await.unwrap();

        assert_eq!(written, 16000);
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.duration(), 16000);
        assert_eq!(reader.spec().sample_rate, 16000);
    }
}
