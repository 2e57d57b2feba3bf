//! Energy-based voice activity detection
//!
//! Smooths frame RMS energy over a short window and maps it linearly from a
//! noise floor to a speech ceiling. Cheap and dependency free; used when no
//! model-based detector is supplied.

use std::collections::VecDeque;

use voice_orchestrator_core::{AudioFrame, VadDecision, VoiceActivityDetector};

/// Energy VAD configuration
#[derive(Debug, Clone)]
pub struct EnergyVadConfig {
    /// Energy at or below this maps to confidence 0.0
    pub floor_db: f32,
    /// Energy at or above this maps to confidence 1.0
    pub ceiling_db: f32,
    /// Frames averaged per decision
    pub window_frames: usize,
    /// Confidence at which a frame counts as speech
    pub threshold: f32,
}

impl Default for EnergyVadConfig {
    fn default() -> Self {
        Self {
            floor_db: -50.0,
            ceiling_db: -20.0,
            window_frames: 3,
            threshold: 0.5,
        }
    }
}

/// RMS energy detector
#[derive(Debug, Clone)]
pub struct EnergyVad {
    config: EnergyVadConfig,
    window: VecDeque<f32>,
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(EnergyVadConfig::default())
    }
}

impl EnergyVad {
    pub fn new(config: EnergyVadConfig) -> Self {
        let window_frames = config.window_frames.max(1);
        Self {
            config: EnergyVadConfig {
                window_frames,
                ..config
            },
            window: VecDeque::with_capacity(window_frames),
        }
    }

    fn confidence(&self, energy_db: f32) -> f32 {
        let span = self.config.ceiling_db - self.config.floor_db;
        if span <= 0.0 {
            return if energy_db > self.config.floor_db { 1.0 } else { 0.0 };
        }
        ((energy_db - self.config.floor_db) / span).clamp(0.0, 1.0)
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn classify(&mut self, frame: &AudioFrame) -> VadDecision {
        if self.window.len() == self.config.window_frames {
            self.window.pop_front();
        }
        self.window.push_back(frame.energy_db);

        let mean = self.window.iter().sum::<f32>() / self.window.len() as f32;
        let confidence = self.confidence(mean);

        VadDecision {
            is_speech: confidence >= self.config.threshold,
            confidence,
        }
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_orchestrator_core::SampleRate;

    fn tone(amplitude: f32) -> AudioFrame {
        AudioFrame::new(vec![amplitude; 160], SampleRate::Hz16000, 0)
    }

    #[test]
    fn test_silence_and_speech() {
        let mut vad = EnergyVad::default();
        let silent = vad.classify(&tone(0.0));
        assert!(!silent.is_speech);
        assert_eq!(silent.confidence, 0.0);

        vad.reset();
        let loud = vad.classify(&tone(0.5));
        assert!(loud.is_speech);
        assert_eq!(loud.confidence, 1.0);
    }

    #[test]
    fn test_window_smooths_single_spike() {
        let mut vad = EnergyVad::default();
        vad.classify(&tone(0.0));
        vad.classify(&tone(0.0));
        // One loud frame averaged with two silent ones stays below threshold
        assert!(!vad.classify(&tone(0.5)).is_speech);
    }

    #[test]
    fn test_reset_clears_window() {
        let mut vad = EnergyVad::default();
        vad.classify(&tone(0.0));
        vad.classify(&tone(0.0));
        vad.reset();
        assert!(vad.classify(&tone(0.5)).is_speech);
    }
}
