//! Cloud speech-to-text via the OpenAI Whisper transcription API
//!
//! Captured clips are resampled to 16 kHz, encoded as 16-bit mono WAV,
//! and posted as multipart form data. Failures map onto the two
//! recoverable outcomes the listen loop cares about: speech the service
//! could not decode, and the service being unreachable.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use crate::audio::AudioClip;

const WHISPER_API_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Whisper expects 16 kHz input
const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Hard deadline on each transcription request. A stalled connection must
/// resolve to a service failure, never wedge the listen loop.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from transcription
#[derive(Debug, thiserror::Error)]
pub enum SttError {
    /// Speech was present but the service decoded nothing usable.
    /// Recoverable; the loop polls again.
    #[error("could not understand the audio")]
    Unintelligible,

    /// Network or service failure. Recoverable; reported to the operator.
    #[error("speech service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("failed to encode audio: {0}")]
    Encode(#[from] hound::Error),

    #[error("failed to build speech client: {0}")]
    Client(String),
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Whisper API client
pub struct Transcriber {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl Transcriber {
    /// Create a client with the given API key and model name. Every
    /// request carries [`REQUEST_TIMEOUT`] so a hung server surfaces as
    /// [`SttError::ServiceUnavailable`] and the caller polls on.
    pub fn new(api_key: String, model: String) -> Result<Self, SttError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SttError::Client(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            model,
        })
    }

    /// Transcribe a captured clip to text.
    pub async fn transcribe(&self, clip: &AudioClip) -> Result<String, SttError> {
        let samples = if clip.sample_rate == TARGET_SAMPLE_RATE {
            clip.samples.clone()
        } else {
            resample(&clip.samples, clip.sample_rate, TARGET_SAMPLE_RATE)
        };

        let wav_data = encode_wav(&samples, TARGET_SAMPLE_RATE)?;
        debug!(bytes = wav_data.len(), model = %self.model, "posting audio for transcription");

        let part = Part::bytes(wav_data)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| SttError::ServiceUnavailable(e.to_string()))?;

        let form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", "en");

        let response = self
            .client
            .post(WHISPER_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| SttError::ServiceUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SttError::ServiceUnavailable(format!(
                "{status}: {body}"
            )));
        }

        let result: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| SttError::ServiceUnavailable(e.to_string()))?;

        let text = result.text.trim().to_string();
        if text.is_empty() {
            return Err(SttError::Unintelligible);
        }

        debug!(%text, "transcription complete");
        Ok(text)
    }
}

/// Linear resampling, good enough for speech
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let new_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_idx = i as f64 * ratio;
        let idx = src_idx as usize;
        let frac = (src_idx - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

/// Encode mono f32 samples as 16-bit WAV
fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    use std::io::Cursor;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            let amplitude = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
            writer.write_sample(amplitude)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_carries_request_timeout() {
        // Builder with a deadline must construct; without one a stalled
        // connection would block the listen loop indefinitely
        let transcriber = Transcriber::new("key".to_string(), "whisper-1".to_string());
        assert!(transcriber.is_ok());
    }

    #[test]
    fn test_resample_halves_length() {
        let samples = vec![0.0; 32000];
        let out = resample(&samples, 32000, 16000);
        assert_eq!(out.len(), 16000);
    }

    #[test]
    fn test_resample_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn test_encode_wav_header() {
        let samples = vec![0.0f32; 160];
        let wav = encode_wav(&samples, 16000).unwrap();
        // RIFF header plus 16-bit payload
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert!(wav.len() > 44);
    }

    #[test]
    fn test_encode_wav_clamps_overdriven_samples() {
        let samples = vec![2.0f32, -2.0];
        let wav = encode_wav(&samples, 16000).unwrap();
        assert!(!wav.is_empty());
    }
}
