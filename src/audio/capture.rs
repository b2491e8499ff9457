use super::format::AudioFormat;
use crate::failure::{Failure, Outcome};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use ringbuf::{HeapRb, traits::*};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;

const DRAIN_INTERVAL: Duration = Duration::from_millis(50);

pub struct AudioCapture;

/// A running capture thread.
///
/// The cpal stream is `!Send`, so it is created and kept on its own thread.
/// Stopping drains what is left in the ring buffer and drops the chunk
/// sender, which closes the receiving side.
pub struct CaptureThread {
    stop_tx: std_mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

impl CaptureThread {
    /// Stop capturing and wait for the thread to exit. Blocks briefly.
    pub fn stop(self) {
        let _ = self.stop_tx.send(());
        if self.thread.join().is_err() {
            tracing::error!("Audio capture thread panicked");
        }
    }
}

impl AudioCapture {
    /// Start audio capture on the default input device
    ///
    /// Audio chunks are sent via chunk_tx until the returned thread is stopped.
    pub fn start(format: AudioFormat, chunk_tx: mpsc::Sender<Vec<f32>>) -> Outcome<CaptureThread> {
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);

        let thread = std::thread::spawn(move || {
            let ring = HeapRb::<f32>::new(format.samples_for_duration(60.0));
            let (producer, mut consumer) = ring.split();

            let stream = match open_input_stream(format, producer) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            let chunk_size = format.samples_for_duration(0.1).max(1);
            loop {
                let stopping = !matches!(
                    stop_rx.recv_timeout(DRAIN_INTERVAL),
                    Err(std_mpsc::RecvTimeoutError::Timeout)
                );

                while consumer.occupied_len() >= chunk_size || (stopping && consumer.occupied_len() > 0) {
                    let mut chunk = vec![0.0f32; chunk_size];
                    let n = consumer.pop_slice(&mut chunk);
                    chunk.truncate(n);

                    if chunk_tx.blocking_send(chunk).is_err() {
                        return;
                    }
                }

                if stopping {
                    break;
                }
            }

            drop(stream);
            tracing::info!("Audio capture stopped");
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {
                tracing::info!("Audio capture started");
                Ok(CaptureThread { stop_tx, thread })
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(Failure::new("Audio capture thread exited during startup")),
        }
    }
}

fn open_input_stream(
    format: AudioFormat,
    mut producer: impl Producer<Item = f32> + Send + 'static,
) -> Outcome<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Failure::new("No input audio device available"))?;

    let config = StreamConfig {
        channels: format.channels,
        sample_rate: SampleRate(format.sample_rate),
        buffer_size: BufferSize::Default,
    };

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                producer.push_slice(data);
            },
            move |err| {
                tracing::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| Failure::new(format!("Failed to build input stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| Failure::new(format!("Failed to start audio stream: {}", e)))?;

    Ok(stream)
}
