//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

/// Daemon configuration, read from the environment with defaults
#[derive(Debug, Clone)]
pub struct Config {
    /// Trigger phrase that opens a command session
    pub wake_word: String,

    /// Idle window before an active session closes
    pub session_duration: Duration,

    /// Whether a voice password must be spoken before use
    pub require_password: bool,

    /// Unlock attempts allowed per lock cycle
    pub max_unlock_attempts: u32,

    /// Delay between listen-loop iterations
    pub poll_interval: Duration,

    /// OpenAI API key for Whisper transcription
    pub api_key: String,

    /// Whisper model name
    pub stt_model: String,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Path of the credential file
    pub credential_path: PathBuf,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let data_dir = dirs::data_dir()
            .context("could not determine data directory")?
            .join("voicedeck");

        let wake_word = env_or("VOICEDECK_WAKE_WORD", "computer").to_lowercase();

        let session_duration =
            Duration::from_secs(env_parsed("VOICEDECK_SESSION_SECS", 60));

        let require_password = std::env::var("VOICEDECK_REQUIRE_PASSWORD")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let max_unlock_attempts = env_parsed("VOICEDECK_UNLOCK_ATTEMPTS", 3);

        let poll_interval =
            Duration::from_millis(env_parsed("VOICEDECK_POLL_MS", 200));

        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY not set (required for transcription)")?;

        let stt_model = env_or("VOICEDECK_STT_MODEL", "whisper-1");

        let credential_path = data_dir.join("voice_password.json");

        Ok(Self {
            wake_word,
            session_duration,
            require_password,
            max_unlock_attempts,
            poll_interval,
            api_key,
            stt_model,
            data_dir,
            credential_path,
        })
    }

    /// Ensure the data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "malformed value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_default() {
        assert_eq!(env_or("VOICEDECK_TEST_UNSET_VAR", "fallback"), "fallback");
    }

    #[test]
    fn test_env_parsed_default() {
        let v: u64 = env_parsed("VOICEDECK_TEST_UNSET_NUM", 60);
        assert_eq!(v, 60);
    }

    #[test]
    fn test_env_parsed_malformed_falls_back() {
        std::env::set_var("VOICEDECK_TEST_MALFORMED_NUM", "abc");
        let v: u64 = env_parsed("VOICEDECK_TEST_MALFORMED_NUM", 60);
        assert_eq!(v, 60);
        std::env::remove_var("VOICEDECK_TEST_MALFORMED_NUM");
    }

    #[test]
    fn test_env_parsed_valid_value() {
        std::env::set_var("VOICEDECK_TEST_VALID_NUM", "90");
        let v: u64 = env_parsed("VOICEDECK_TEST_VALID_NUM", 60);
        assert_eq!(v, 90);
        std::env::remove_var("VOICEDECK_TEST_VALID_NUM");
    }
}
