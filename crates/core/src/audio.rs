//! Audio frame types and utilities

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Supported audio sample rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SampleRate {
    /// 8kHz - Telephony
    Hz8000,
    /// 16kHz - Speech recognition input
    #[default]
    Hz16000,
    /// 24kHz - Common synthesis output
    Hz24000,
    /// 48kHz - Device native
    Hz48000,
}

impl SampleRate {
    /// Get sample rate as u32
    pub fn as_u32(&self) -> u32 {
        match self {
            SampleRate::Hz8000 => 8000,
            SampleRate::Hz16000 => 16000,
            SampleRate::Hz24000 => 24000,
            SampleRate::Hz48000 => 48000,
        }
    }

    /// Parse from a raw rate in Hz
    pub fn from_hz(hz: u32) -> Option<Self> {
        match hz {
            8000 => Some(SampleRate::Hz8000),
            16000 => Some(SampleRate::Hz16000),
            24000 => Some(SampleRate::Hz24000),
            48000 => Some(SampleRate::Hz48000),
            _ => None,
        }
    }

    /// Number of samples in a frame of `frame_ms` milliseconds
    pub fn samples_for_ms(&self, frame_ms: u32) -> usize {
        (self.as_u32() as usize * frame_ms as usize) / 1000
    }
}

/// Mono PCM frame with capture metadata
///
/// Samples are stored as f32 normalized to [-1.0, 1.0]. The frame duration is
/// derived from the sample count with integer arithmetic so that timers driven
/// by frame durations stay exact.
#[derive(Clone)]
pub struct AudioFrame {
    /// Raw audio samples
    pub samples: Arc<[f32]>,
    /// Sample rate
    pub sample_rate: SampleRate,
    /// Frame sequence number for ordering
    pub sequence: u64,
    /// Timestamp when the frame was captured
    pub timestamp: Instant,
    /// Duration of this frame
    pub duration: Duration,
    /// Energy level in dB
    pub energy_db: f32,
}

impl std::fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFrame")
            .field("samples_len", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .field("sequence", &self.sequence)
            .field("duration", &self.duration)
            .field("energy_db", &self.energy_db)
            .finish()
    }
}

impl AudioFrame {
    /// Create a new mono frame from f32 samples
    pub fn new(samples: Vec<f32>, sample_rate: SampleRate, sequence: u64) -> Self {
        let nanos = samples.len() as u64 * 1_000_000_000 / sample_rate.as_u32() as u64;
        let energy_db = Self::calculate_energy_db(&samples);

        Self {
            samples: samples.into(),
            sample_rate,
            sequence,
            timestamp: Instant::now(),
            duration: Duration::from_nanos(nanos),
            energy_db,
        }
    }

    /// A frame of digital silence lasting `frame_ms`
    pub fn silence(sample_rate: SampleRate, frame_ms: u32, sequence: u64) -> Self {
        Self::new(
            vec![0.0; sample_rate.samples_for_ms(frame_ms)],
            sample_rate,
            sequence,
        )
    }

    /// Calculate RMS energy in decibels
    fn calculate_energy_db(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return -96.0;
        }

        let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
        let rms = (sum_squares / samples.len() as f32).sqrt();

        if rms > 0.0 {
            20.0 * rms.log10()
        } else {
            -96.0
        }
    }

    /// Convert from PCM16 bytes (little-endian)
    pub fn from_pcm16(bytes: &[u8], sample_rate: SampleRate, sequence: u64) -> Self {
        const PCM16_NORMALIZE: f32 = 32768.0;

        let samples: Vec<f32> = bytes
            .chunks_exact(2)
            .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / PCM16_NORMALIZE)
            .collect();

        Self::new(samples, sample_rate, sequence)
    }

    /// Convert to PCM16 bytes (little-endian)
    pub fn to_pcm16(&self) -> Vec<u8> {
        self.samples
            .iter()
            .flat_map(|&s| ((s.clamp(-1.0, 1.0) * 32767.0) as i16).to_le_bytes())
            .collect()
    }

    /// Frame duration in whole milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }
}

/// Synthesized audio emitted by a synthesizer stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Encoded audio bytes, ready for the playback sink
    pub audio_bytes: Vec<u8>,
    /// Last chunk of the synthesis request
    pub is_last: bool,
}

impl AudioChunk {
    pub fn new(audio_bytes: Vec<u8>, is_last: bool) -> Self {
        Self {
            audio_bytes,
            is_last,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_duration_is_exact() {
        let frame = AudioFrame::silence(SampleRate::Hz16000, 10, 0);
        assert_eq!(frame.samples.len(), 160);
        assert_eq!(frame.duration, Duration::from_millis(10));

        let total: Duration = (0..150)
            .map(|i| AudioFrame::silence(SampleRate::Hz16000, 10, i).duration)
            .sum();
        assert_eq!(total, Duration::from_millis(1500));
    }

    #[test]
    fn test_energy() {
        let silent = AudioFrame::new(vec![0.0; 160], SampleRate::Hz16000, 0);
        assert_eq!(silent.energy_db, -96.0);

        let loud = AudioFrame::new(vec![0.5; 160], SampleRate::Hz16000, 1);
        assert!(loud.energy_db > -10.0);
    }

    #[test]
    fn test_pcm16_conversion() {
        let frame = AudioFrame::new(vec![0.0, 0.5, -0.5], SampleRate::Hz16000, 0);
        let bytes = frame.to_pcm16();
        assert_eq!(bytes.len(), 6);

        let back = AudioFrame::from_pcm16(&bytes, SampleRate::Hz16000, 0);
        assert!((back.samples[1] - 0.5).abs() < 0.001);
        assert!((back.samples[2] + 0.5).abs() < 0.001);
    }

    #[test]
    fn test_sample_rate_parse() {
        assert_eq!(SampleRate::from_hz(16000), Some(SampleRate::Hz16000));
        assert_eq!(SampleRate::from_hz(44100), None);
        assert_eq!(SampleRate::Hz16000.samples_for_ms(20), 320);
    }
}
