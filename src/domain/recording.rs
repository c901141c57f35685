use tokio::time::Instant;
use zeroize::Zeroize;

/// Audio buffer that is securely zeroed on drop.
/// Raw voice audio never touches disk and is cleared from memory once the
/// transcription hand-off succeeds.
#[derive(Debug, Zeroize)]
#[zeroize(drop)]
pub struct AudioBuffer {
    /// PCM audio samples (16-bit mono).
    samples: Vec<i16>,
    /// Sample rate in Hz.
    sample_rate: u32,
}

impl AudioBuffer {
    /// Create a new empty audio buffer.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
        }
    }

    /// Create an audio buffer with pre-allocated capacity.
    pub fn with_capacity(sample_rate: u32, capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            sample_rate,
        }
    }

    /// Append samples to the buffer.
    pub fn push_samples(&mut self, samples: &[i16]) {
        self.samples.extend_from_slice(samples);
    }

    /// Get the samples as a slice.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Get the sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the duration in seconds.
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Check if the buffer is empty. A zero-length buffer is a valid
    /// capture outcome, not a failure.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get the number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A timestamped run of samples delivered by a capture stream.
#[derive(Debug)]
pub struct AudioChunk {
    pub samples: Vec<i16>,
    /// Monotonic arrival time of the chunk.
    pub captured_at: Instant,
}

impl AudioChunk {
    pub fn new(samples: Vec<i16>) -> Self {
        Self {
            samples,
            captured_at: Instant::now(),
        }
    }
}

/// An encoded reference audio clip, opaque to the engine. Decoding is the
/// playback collaborator's concern.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub data: Vec<u8>,
}

impl AudioClip {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

/// One finished capture attempt for a turn. Owned exclusively by the
/// session until handed to transcription; never persisted.
#[derive(Debug)]
pub struct Recording {
    pub turn_id: i64,
    pub audio: AudioBuffer,
    /// Monotonic time at which the capture attempt finished.
    pub captured_at: Instant,
}
