//! The listen loop
//!
//! Orchestrates one blocking poll at a time: re-evaluate session expiry,
//! then listen for whichever input the current phase wants (password,
//! wake word, or command) and route the transcript to the session
//! machine, matcher, and actuator. Recoverable listen failures surface
//! as log lines and the loop moves on; only an exhausted unlock budget
//! ends the run.

use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::actuator::{MediaActuator, MediaKey};
use crate::audio::{CaptureError, Microphone};
use crate::command::{match_command, MediaCommand};
use crate::config::Config;
use crate::credential::{Credential, CredentialError, CredentialStore};
use crate::events::SessionEvent;
use crate::session::{Phase, SessionMachine, UnlockOutcome};
use crate::stt::{SttError, Transcriber};

/// Listen window for the wake word: short, so expiry and shutdown are
/// re-evaluated often while idle
const WAKE_TIMEOUT: Duration = Duration::from_secs(1);
const WAKE_PHRASE_LIMIT: Duration = Duration::from_secs(2);

/// Listen window for commands during an active session
const COMMAND_TIMEOUT: Duration = Duration::from_secs(3);
const COMMAND_PHRASE_LIMIT: Duration = Duration::from_secs(2);

/// Listen window for password capture (setup and unlock)
const PASSWORD_TIMEOUT: Duration = Duration::from_secs(5);
const PASSWORD_PHRASE_LIMIT: Duration = Duration::from_secs(3);

/// Ambient-noise calibration length at startup
const CALIBRATION_DURATION: Duration = Duration::from_secs(1);

/// Fatal errors from the listen loop
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// The unlock attempt budget was spent. Terminal for the run.
    #[error("unlock attempt budget exhausted")]
    UnlockExhausted,

    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// The microphone could not be opened at startup
    #[error("microphone unavailable: {0}")]
    Microphone(#[from] CaptureError),

    #[error("input injection unavailable: {0}")]
    Actuator(String),

    #[error("speech client unavailable: {0}")]
    Stt(String),

    #[error("audio worker failed: {0}")]
    AudioWorker(String),
}

/// One poll's outcome, with every recoverable failure an explicit value
#[derive(Debug)]
enum ListenOutcome {
    /// Speech captured and transcribed
    Heard(String),
    /// No speech started within the window
    Timeout,
    /// Speech present but not decodable
    Unintelligible,
    /// Network or speech-service failure
    ServiceUnavailable,
}

/// Owns the collaborators and drives the poll loop
pub struct Controller {
    config: Config,
    session: SessionMachine,
    store: CredentialStore,
    credential: Option<Credential>,
    microphone: Microphone,
    transcriber: Transcriber,
    actuator: MediaActuator,
}

impl Controller {
    /// Wire up the collaborators. Fails fast when the microphone or the
    /// input injection backend is missing.
    pub fn new(
        config: Config,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Result<Self, ControllerError> {
        let session = SessionMachine::new(
            config.require_password,
            config.session_duration,
            config.max_unlock_attempts,
            event_tx,
        );
        let store = CredentialStore::new(&config.credential_path);
        let microphone = Microphone::open()?;
        let transcriber = Transcriber::new(config.api_key.clone(), config.stt_model.clone())
            .map_err(|e| ControllerError::Stt(e.to_string()))?;
        let actuator = MediaActuator::new().map_err(|e| ControllerError::Actuator(e.to_string()))?;

        Ok(Self {
            config,
            session,
            store,
            credential: None,
            microphone,
            transcriber,
            actuator,
        })
    }

    /// Whether a password gate is configured
    pub fn is_gated(&self) -> bool {
        self.session.is_gated()
    }

    /// Run the listen loop until shutdown or a fatal error.
    pub async fn run(&mut self) -> Result<(), ControllerError> {
        self.calibrate().await;

        if self.session.is_gated() {
            self.ensure_credential().await?;
        }

        info!(
            wake_word = %self.config.wake_word,
            session_secs = self.config.session_duration.as_secs(),
            gated = self.session.is_gated(),
            "listen loop started"
        );

        loop {
            let now = Instant::now();
            self.session.check_expiry(now);

            match self.session.phase() {
                Phase::Locked => self.poll_unlock().await?,
                Phase::Idle => self.poll_wake_word().await,
                Phase::Active => self.poll_command().await,
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// One-time ambient noise calibration. Failure keeps the default
    /// threshold rather than aborting the run.
    async fn calibrate(&mut self) {
        let mut mic = self.microphone.clone();
        let result = tokio::task::spawn_blocking(move || {
            mic.calibrate(CALIBRATION_DURATION).map(|()| mic)
        })
        .await;

        match result {
            Ok(Ok(mic)) => self.microphone = mic,
            Ok(Err(e)) => warn!(?e, "calibration failed, using default threshold"),
            Err(e) => warn!(?e, "calibration task failed, using default threshold"),
        }
    }

    /// Load the stored credential, falling back to voice setup when the
    /// file is absent or corrupt.
    async fn ensure_credential(&mut self) -> Result<(), ControllerError> {
        let credential = match self.store.load() {
            Ok(Some(credential)) => {
                info!(hint = %credential.password_hint, "credential loaded");
                credential
            }
            Ok(None) => {
                info!("no credential found, running first-time setup");
                self.run_setup().await?
            }
            Err(CredentialError::Corrupt(_)) => {
                warn!("credential file corrupt, running setup again");
                self.run_setup().await?
            }
            Err(e) => return Err(e.into()),
        };

        self.credential = Some(credential);
        Ok(())
    }

    /// Voice password setup: capture the phrase twice, require a
    /// case-insensitive match, re-prompt on mismatch or any capture
    /// failure. No retry limit; only the operator interrupt exits.
    async fn run_setup(&mut self) -> Result<Credential, ControllerError> {
        info!("choose a short password phrase, two or three words");

        loop {
            info!("say your new password...");
            let first = match self.listen(PASSWORD_TIMEOUT, PASSWORD_PHRASE_LIMIT).await {
                ListenOutcome::Heard(text) => text,
                outcome => {
                    report_recoverable(&outcome);
                    continue;
                }
            };
            info!(heard = %first, "say it again to confirm...");

            let second = match self.listen(PASSWORD_TIMEOUT, PASSWORD_PHRASE_LIMIT).await {
                ListenOutcome::Heard(text) => text,
                outcome => {
                    report_recoverable(&outcome);
                    continue;
                }
            };

            let Some(stored) = confirm_and_store(&self.store, &first, &second) else {
                warn!(first = %first, second = %second, "passwords do not match, try again");
                continue;
            };

            let credential = stored?;
            info!(hint = %credential.password_hint, "password set");
            return Ok(credential);
        }
    }

    /// One unlock attempt. Only a transcribed phrase that fails
    /// verification consumes budget; no-speech and service failures
    /// just re-prompt.
    async fn poll_unlock(&mut self) -> Result<(), ControllerError> {
        let Some(credential) = self.credential.clone() else {
            // Gated runs load or create the credential before the loop
            self.ensure_credential().await?;
            return Ok(());
        };

        info!(hint = %credential.password_hint, "locked, say the password");

        match self.listen(PASSWORD_TIMEOUT, PASSWORD_PHRASE_LIMIT).await {
            ListenOutcome::Heard(spoken) => {
                let verified = self.store.verify(&spoken, &credential);
                match self.session.record_unlock_attempt(verified) {
                    UnlockOutcome::Unlocked => {
                        info!(wake_word = %self.config.wake_word, "access granted");
                    }
                    UnlockOutcome::Retry { remaining } => {
                        warn!(remaining, "incorrect password");
                    }
                    UnlockOutcome::Exhausted => {
                        return Err(ControllerError::UnlockExhausted);
                    }
                }
            }
            outcome => report_recoverable(&outcome),
        }

        Ok(())
    }

    /// Short idle listen for the wake word. A bare "lock" substring in
    /// idle speech locks a gated run (carried behavior, false positives
    /// included).
    async fn poll_wake_word(&mut self) {
        match self.listen(WAKE_TIMEOUT, WAKE_PHRASE_LIMIT).await {
            ListenOutcome::Heard(text) => {
                if contains_wake_word(&text, &self.config.wake_word) {
                    info!(heard = %text, "wake word detected");
                    self.session.activate(Instant::now());
                } else if self.session.is_gated() && contains_lock_keyword(&text) {
                    info!(heard = %text, "lock requested");
                    self.session.lock();
                } else {
                    debug!(heard = %text, "not the wake word");
                }
            }
            ListenOutcome::Timeout | ListenOutcome::Unintelligible => {}
            outcome => report_recoverable(&outcome),
        }
    }

    /// Command listen during an active session.
    async fn poll_command(&mut self) {
        let remaining = self.session.remaining(Instant::now());
        debug!(remaining_secs = remaining.as_secs(), "listening for command");

        match self.listen(COMMAND_TIMEOUT, COMMAND_PHRASE_LIMIT).await {
            ListenOutcome::Heard(text) => match match_command(&text) {
                MediaCommand::Unknown => {
                    info!(heard = %text, "unknown command");
                }
                MediaCommand::Lock => {
                    if self.session.is_gated() {
                        info!("lock command");
                        self.session.lock();
                    } else {
                        debug!(heard = %text, "lock command ignored, no password gate");
                    }
                }
                command => {
                    if let Some(key) = MediaKey::for_command(command) {
                        self.actuator.send(key).await;
                    }
                    self.session.refresh(Instant::now(), &command.to_string());
                }
            },
            ListenOutcome::Timeout | ListenOutcome::Unintelligible => {}
            outcome => report_recoverable(&outcome),
        }
    }

    /// One blocking capture plus transcription, folded into an explicit
    /// outcome value. Device failures mid-run are treated like silence so
    /// a flaky microphone cannot kill the loop.
    async fn listen(&self, timeout: Duration, phrase_time_limit: Duration) -> ListenOutcome {
        let mic = self.microphone.clone();
        let captured =
            tokio::task::spawn_blocking(move || mic.listen(timeout, phrase_time_limit)).await;

        let clip = match captured {
            Ok(Ok(clip)) => clip,
            Ok(Err(CaptureError::Timeout)) => return ListenOutcome::Timeout,
            Ok(Err(e)) => {
                warn!(?e, "capture failed");
                return ListenOutcome::Timeout;
            }
            Err(e) => {
                warn!(?e, "capture task failed");
                return ListenOutcome::Timeout;
            }
        };

        match self.transcriber.transcribe(&clip).await {
            Ok(text) => ListenOutcome::Heard(text),
            Err(SttError::Unintelligible) => ListenOutcome::Unintelligible,
            Err(e) => {
                debug!(?e, "transcription failed");
                ListenOutcome::ServiceUnavailable
            }
        }
    }
}

/// Setup confirmation: the two captures must agree, case aside. Nothing
/// is written until they do.
fn phrases_match(first: &str, second: &str) -> bool {
    first.to_lowercase() == second.to_lowercase()
}

/// The confirm-then-store step of setup. `None` on mismatch, so the
/// caller re-prompts; the durable write happens only after the captures
/// agree.
fn confirm_and_store(
    store: &CredentialStore,
    first: &str,
    second: &str,
) -> Option<Result<Credential, CredentialError>> {
    if !phrases_match(first, second) {
        return None;
    }
    Some(store.store(first))
}

/// Wake word matches as a case-insensitive substring
fn contains_wake_word(text: &str, wake_word: &str) -> bool {
    text.to_lowercase().contains(wake_word)
}

/// Idle-phase lock trigger: any utterance containing "lock"
fn contains_lock_keyword(text: &str) -> bool {
    text.to_lowercase().contains("lock")
}

fn report_recoverable(outcome: &ListenOutcome) {
    match outcome {
        ListenOutcome::Timeout => debug!("no speech detected"),
        ListenOutcome::Unintelligible => info!("could not understand, try again"),
        ListenOutcome::ServiceUnavailable => {
            warn!("speech service unreachable, check network");
        }
        ListenOutcome::Heard(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_confirmation_matching() {
        assert!(phrases_match("open sesame", "Open Sesame"));
        // A near-miss confirmation must not be accepted
        assert!(!phrases_match("open sesame", "open seasame"));
    }

    #[test]
    fn test_setup_mismatch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("voice_password.json"));

        let outcome = confirm_and_store(&store, "open sesame", "open seasame");
        assert!(outcome.is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_setup_match_stores_credential() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("voice_password.json"));

        let credential = confirm_and_store(&store, "open sesame", "Open Sesame")
            .expect("matching phrases must store")
            .unwrap();
        assert!(store.path().exists());
        assert!(store.verify("open sesame", &credential));
    }

    #[test]
    fn test_wake_word_substring_match() {
        assert!(contains_wake_word("hey computer", "computer"));
        assert!(contains_wake_word("Computer, play music", "computer"));
        assert!(!contains_wake_word("hey there", "computer"));
    }

    #[test]
    fn test_idle_lock_keyword_is_greedy() {
        // Carried behavior: any "lock" substring triggers, even when the
        // intent is clearly not a lock request
        assert!(contains_lock_keyword("lock"));
        assert!(contains_lock_keyword("unlock the door"));
        assert!(!contains_lock_keyword("pause the music"));
    }
}
