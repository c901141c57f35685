use std::thread::{self, JoinHandle};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::domain::{AudioChunk, DomainError};
use crate::ports::{CaptureDevice, CaptureStream};

/// Audio processing utilities.
mod audio_processing {
    use super::*;

    pub fn get_device(selected_device_id: Option<&str>) -> Result<Device, DomainError> {
        let host = cpal::default_host();

        if let Some(id) = selected_device_id {
            let devices = host.input_devices().map_err(|e| DomainError::DeviceDenied {
                message: format!("Failed to enumerate devices: {}", e),
            })?;

            for device in devices {
                if let Ok(name) = device.name() {
                    if name == id {
                        return Ok(device);
                    }
                }
            }
            warn!(device_id = %id, "Selected device not found, falling back to default");
        }

        host.default_input_device()
            .ok_or_else(|| DomainError::DeviceDenied {
                message: "No default input device available".to_string(),
            })
    }

    pub fn build_stream_config(device: &Device) -> Result<StreamConfig, DomainError> {
        let supported = device
            .default_input_config()
            .map_err(|e| DomainError::DeviceDenied {
                message: format!("Failed to get default config: {}", e),
            })?;

        debug!(
            sample_rate = ?supported.sample_rate(),
            channels = supported.channels(),
            format = ?supported.sample_format(),
            "Device default config"
        );

        Ok(StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        })
    }

    pub fn build_stream(
        device: &Device,
        config: &StreamConfig,
        sample_format: SampleFormat,
        target_sample_rate: u32,
        chunk_tx: mpsc::Sender<AudioChunk>,
    ) -> Result<Stream, DomainError> {
        let channels = config.channels as usize;
        let device_sample_rate = config.sample_rate.0;

        let stream = match sample_format {
            SampleFormat::I16 => {
                let tx = chunk_tx;
                device.build_input_stream(
                    config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        deliver_chunk(data, channels, device_sample_rate, target_sample_rate, &tx);
                    },
                    move |err| {
                        error!(?err, "Audio input stream error");
                    },
                    None,
                )
            }
            SampleFormat::F32 => {
                let tx = chunk_tx;
                device.build_input_stream(
                    config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let i16_data: Vec<i16> = data
                            .iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
                            .collect();
                        deliver_chunk(
                            &i16_data,
                            channels,
                            device_sample_rate,
                            target_sample_rate,
                            &tx,
                        );
                    },
                    move |err| {
                        error!(?err, "Audio input stream error");
                    },
                    None,
                )
            }
            _ => {
                return Err(DomainError::DeviceDenied {
                    message: format!("Unsupported sample format: {:?}", sample_format),
                });
            }
        }
        .map_err(|e| DomainError::DeviceDenied {
            message: format!("Failed to build stream: {}", e),
        })?;

        Ok(stream)
    }

    fn deliver_chunk(
        data: &[i16],
        channels: usize,
        device_sample_rate: u32,
        target_sample_rate: u32,
        chunk_tx: &mpsc::Sender<AudioChunk>,
    ) {
        // Convert stereo to mono
        let mono_samples: Vec<i16> = if channels > 1 {
            data.chunks(channels)
                .map(|chunk| {
                    let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
                    (sum / channels as i32) as i16
                })
                .collect()
        } else {
            data.to_vec()
        };

        // Resample if needed
        let resampled = if device_sample_rate != target_sample_rate {
            resample(&mono_samples, device_sample_rate, target_sample_rate)
        } else {
            mono_samples
        };

        // The consumer is the capture pump; dropping a chunk under
        // backpressure is preferable to blocking the audio callback.
        let _ = chunk_tx.try_send(AudioChunk::new(resampled));
    }

    pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
        if from_rate == to_rate || samples.is_empty() {
            return samples.to_vec();
        }

        let ratio = from_rate as f64 / to_rate as f64;
        let output_len = (samples.len() as f64 / ratio).ceil() as usize;
        let mut output = Vec::with_capacity(output_len);

        for i in 0..output_len {
            let src_pos = i as f64 * ratio;
            let src_idx = src_pos.floor() as usize;
            let frac = src_pos.fract();

            let sample = if src_idx + 1 < samples.len() {
                let s0 = samples[src_idx] as f64;
                let s1 = samples[src_idx + 1] as f64;
                (s0 + (s1 - s0) * frac) as i16
            } else if src_idx < samples.len() {
                samples[src_idx]
            } else {
                0
            };
            output.push(sample);
        }
        output
    }
}

/// Capture thread runner - the cpal Stream is created and kept here
/// because it is not Send.
fn capture_thread_main(
    selected_device_id: Option<String>,
    target_sample_rate: u32,
    chunk_tx: mpsc::Sender<AudioChunk>,
    ready_tx: oneshot::Sender<Result<(), DomainError>>,
    close_rx: std::sync::mpsc::Receiver<()>,
) {
    let setup = (|| -> Result<(Stream, String), DomainError> {
        let device = audio_processing::get_device(selected_device_id.as_deref())?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let stream_config = audio_processing::build_stream_config(&device)?;
        let sample_format = device
            .default_input_config()
            .map_err(|e| DomainError::DeviceDenied {
                message: format!("Failed to get config: {}", e),
            })?
            .sample_format();

        let stream = audio_processing::build_stream(
            &device,
            &stream_config,
            sample_format,
            target_sample_rate,
            chunk_tx,
        )?;

        stream.play().map_err(|e| DomainError::DeviceDenied {
            message: format!("Failed to start stream: {}", e),
        })?;

        Ok((stream, device_name))
    })();

    match setup {
        Ok((stream, device_name)) => {
            info!(device = %device_name, "Capture stream opened");
            let _ = ready_tx.send(Ok(()));
            // Park until the stream is released; dropping the Stream stops
            // capture and frees the device.
            let _ = close_rx.recv();
            drop(stream);
            debug!(device = %device_name, "Capture stream released");
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
        }
    }
}

/// cpal-based capture device.
///
/// Each `open` spawns a dedicated audio thread owning the non-Send Stream;
/// chunks flow back over a bounded channel, and closing the stream joins
/// the thread so the device is fully released before the next acquisition.
pub struct CpalCaptureDevice {
    target_sample_rate: u32,
    selected_device_id: RwLock<Option<String>>,
}

impl CpalCaptureDevice {
    pub fn new(target_sample_rate: u32) -> Self {
        Self {
            target_sample_rate,
            selected_device_id: RwLock::new(None),
        }
    }

    /// Select an input device by name, or use the system default if None.
    pub fn select_input_device(&self, device_id: Option<&str>) {
        *self.selected_device_id.write() = device_id.map(String::from);
        info!(device_id = ?device_id, "Input device selected");
    }
}

#[async_trait]
impl CaptureDevice for CpalCaptureDevice {
    async fn open(&self) -> Result<Box<dyn CaptureStream>, DomainError> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (chunk_tx, chunk_rx) = mpsc::channel(64);
        let (close_tx, close_rx) = std::sync::mpsc::channel();

        let device_id = self.selected_device_id.read().clone();
        let target_sample_rate = self.target_sample_rate;

        let handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                capture_thread_main(device_id, target_sample_rate, chunk_tx, ready_tx, close_rx)
            })
            .map_err(|e| DomainError::Capture(format!("Failed to spawn audio thread: {}", e)))?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(Box::new(CpalCaptureStream {
                chunks: chunk_rx,
                close_tx: Some(close_tx),
                thread: Some(handle),
            })),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(DomainError::Capture(
                    "Audio thread did not respond".to_string(),
                ))
            }
        }
    }
}

struct CpalCaptureStream {
    chunks: mpsc::Receiver<AudioChunk>,
    close_tx: Option<std::sync::mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

#[async_trait]
impl CaptureStream for CpalCaptureStream {
    async fn next_chunk(&mut self) -> Option<AudioChunk> {
        self.chunks.recv().await
    }

    async fn close(&mut self) {
        if let Some(close_tx) = self.close_tx.take() {
            let _ = close_tx.send(());
        }
        if let Some(handle) = self.thread.take() {
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
        }
        self.chunks.close();
    }
}

impl Drop for CpalCaptureStream {
    fn drop(&mut self) {
        // Closing through the channel is enough to release the device even
        // if close() was never awaited.
        if let Some(close_tx) = self.close_tx.take() {
            let _ = close_tx.send(());
        }
    }
}
