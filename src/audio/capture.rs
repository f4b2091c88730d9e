//! Microphone capture using cpal
//!
//! Each listen call opens the input stream, waits for speech onset with an
//! energy gate, records until trailing silence or the phrase limit, then
//! releases the device. Blocking throughout; the controller invokes this
//! through `spawn_blocking`.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, info};

/// Default RMS energy above which a frame counts as speech
const DEFAULT_SPEECH_THRESHOLD: f32 = 0.015;

/// Calibration margin over measured ambient energy
const AMBIENT_RATIO: f32 = 1.5;

/// Trailing silence that ends a phrase
const PAUSE_THRESHOLD: Duration = Duration::from_millis(1000);

/// Interval between buffer polls while a stream is open
const POLL_INTERVAL: Duration = Duration::from_millis(30);

/// Frame size in samples for energy measurement
const FRAME_SAMPLES: usize = 512;

/// A captured utterance: mono f32 samples at the device's native rate
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Errors from microphone capture
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// No speech started within the listen window. Recoverable; the
    /// listen loop just polls again.
    #[error("no speech within the listen window")]
    Timeout,

    #[error("no input device available")]
    NoDevice,

    #[error("audio device error: {0}")]
    Device(String),
}

/// Handle on the default input device with a calibrated speech threshold.
/// Cheap to clone; the device itself is acquired per listen call.
#[derive(Debug, Clone)]
pub struct Microphone {
    speech_threshold: f32,
}

impl Microphone {
    /// Open the default input device. Fails early if none exists so the
    /// daemon reports a missing microphone at startup, not mid-session.
    pub fn open() -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;

        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        info!(device = %name, "microphone opened");

        Ok(Self {
            speech_threshold: DEFAULT_SPEECH_THRESHOLD,
        })
    }

    /// Measure ambient energy for `duration` and raise the speech
    /// threshold above it.
    pub fn calibrate(&mut self, duration: Duration) -> Result<(), CaptureError> {
        let session = CaptureSession::start()?;
        std::thread::sleep(duration);
        let samples = session.take_samples();

        if samples.is_empty() {
            debug!("calibration captured no samples, keeping threshold");
            return Ok(());
        }

        let ambient = rms(&samples);
        self.speech_threshold = (ambient * AMBIENT_RATIO).max(DEFAULT_SPEECH_THRESHOLD);

        debug!(
            ambient,
            threshold = self.speech_threshold,
            "microphone calibrated"
        );
        Ok(())
    }

    /// Block until a phrase is captured.
    ///
    /// Waits up to `timeout` for speech onset; once speech starts, records
    /// until [`PAUSE_THRESHOLD`] of trailing silence or `phrase_time_limit`
    /// of speech, whichever comes first.
    pub fn listen(
        &self,
        timeout: Duration,
        phrase_time_limit: Duration,
    ) -> Result<AudioClip, CaptureError> {
        let session = CaptureSession::start()?;
        let started = Instant::now();

        let mut processed = 0usize;
        let mut onset: Option<usize> = None;
        let mut speech_started_at: Option<Instant> = None;
        let mut last_speech_at = Instant::now();

        loop {
            std::thread::sleep(POLL_INTERVAL);
            let buffered = session.snapshot();

            // Walk the new frames through the energy gate
            while processed + FRAME_SAMPLES <= buffered.len() {
                let frame = &buffered[processed..processed + FRAME_SAMPLES];
                let is_speech = rms(frame) > self.speech_threshold;

                if is_speech {
                    last_speech_at = Instant::now();
                    if onset.is_none() {
                        // Keep one frame of pre-roll so the phrase start
                        // is not clipped
                        onset = Some(processed.saturating_sub(FRAME_SAMPLES));
                        speech_started_at = Some(Instant::now());
                        debug!("speech onset");
                    }
                }
                processed += FRAME_SAMPLES;
            }

            match speech_started_at {
                None => {
                    if started.elapsed() >= timeout {
                        return Err(CaptureError::Timeout);
                    }
                }
                Some(speech_start) => {
                    let phrase_done = last_speech_at.elapsed() >= PAUSE_THRESHOLD
                        || speech_start.elapsed() >= phrase_time_limit;

                    if phrase_done {
                        let samples = session.take_samples();
                        let start = onset.unwrap_or(0).min(samples.len());
                        let clip = AudioClip {
                            samples: samples[start..].to_vec(),
                            sample_rate: session.sample_rate,
                        };
                        debug!(
                            samples = clip.samples.len(),
                            sample_rate = clip.sample_rate,
                            "phrase captured"
                        );
                        return Ok(clip);
                    }
                }
            }
        }
    }
}

/// An open cpal input stream accumulating mono samples
struct CaptureSession {
    // Held only to keep the stream alive; dropped on release
    _stream: cpal::Stream,
    buffer: Arc<Mutex<Vec<f32>>>,
    sample_rate: u32,
}

impl CaptureSession {
    fn start() -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;

        let config = device
            .default_input_config()
            .map_err(|e| CaptureError::Device(e.to_string()))?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        let buffer = Arc::new(Mutex::new(Vec::new()));

        let err_fn = |err| {
            tracing::error!("audio input error: {}", err);
        };

        // cpal delivers interleaved frames; downmix to mono f32
        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                let buffer = Arc::clone(&buffer);
                device
                    .build_input_stream(
                        &config.into(),
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            let mut buffer = buffer.lock().unwrap();
                            for frame in data.chunks(channels) {
                                let mono: f32 = frame.iter().sum::<f32>() / channels as f32;
                                buffer.push(mono);
                            }
                        },
                        err_fn,
                        None,
                    )
                    .map_err(|e| CaptureError::Device(e.to_string()))?
            }
            cpal::SampleFormat::I16 => {
                let buffer = Arc::clone(&buffer);
                device
                    .build_input_stream(
                        &config.into(),
                        move |data: &[i16], _: &cpal::InputCallbackInfo| {
                            let mut buffer = buffer.lock().unwrap();
                            for frame in data.chunks(channels) {
                                let mono: f32 = frame
                                    .iter()
                                    .map(|&s| s as f32 / 32768.0)
                                    .sum::<f32>()
                                    / channels as f32;
                                buffer.push(mono);
                            }
                        },
                        err_fn,
                        None,
                    )
                    .map_err(|e| CaptureError::Device(e.to_string()))?
            }
            cpal::SampleFormat::U16 => {
                let buffer = Arc::clone(&buffer);
                device
                    .build_input_stream(
                        &config.into(),
                        move |data: &[u16], _: &cpal::InputCallbackInfo| {
                            let mut buffer = buffer.lock().unwrap();
                            for frame in data.chunks(channels) {
                                let mono: f32 = frame
                                    .iter()
                                    .map(|&s| (s as f32 - 32768.0) / 32768.0)
                                    .sum::<f32>()
                                    / channels as f32;
                                buffer.push(mono);
                            }
                        },
                        err_fn,
                        None,
                    )
                    .map_err(|e| CaptureError::Device(e.to_string()))?
            }
            other => {
                return Err(CaptureError::Device(format!(
                    "unsupported sample format: {other:?}"
                )))
            }
        };

        stream
            .play()
            .map_err(|e| CaptureError::Device(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            buffer,
            sample_rate,
        })
    }

    fn snapshot(&self) -> Vec<f32> {
        self.buffer.lock().unwrap().clone()
    }

    fn take_samples(&self) -> Vec<f32> {
        std::mem::take(&mut *self.buffer.lock().unwrap())
    }
}

/// Root-mean-square energy of a sample block
fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_of_silence() {
        assert_eq!(rms(&[0.0; 512]), 0.0);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn test_rms_of_constant_signal() {
        let samples = vec![0.5; 512];
        assert!((rms(&samples) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_rms_detects_speech_over_threshold() {
        let quiet = vec![0.001; 512];
        let loud = vec![0.2; 512];
        assert!(rms(&quiet) < DEFAULT_SPEECH_THRESHOLD);
        assert!(rms(&loud) > DEFAULT_SPEECH_THRESHOLD);
    }
}
