//! Core session state machine implementation
//!
//! Handles transitions between Locked, Idle, and Active phases driven by
//! unlock attempts, wake-word detections, accepted commands, and elapsed
//! time. All time-sensitive operations take `now` as a parameter so the
//! sliding-expiry behavior is testable without a real clock.

use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::events::SessionEvent;

/// The three possible phases of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the voice password
    Locked,
    /// Unlocked, waiting for the wake word
    Idle,
    /// Command window open
    Active,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Locked => write!(f, "Locked"),
            Phase::Idle => write!(f, "Idle"),
            Phase::Active => write!(f, "Active"),
        }
    }
}

/// Result of recording one unlock attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// Password verified, now Idle
    Unlocked,
    /// Wrong password, attempts remain
    Retry {
        /// Attempts left in the budget
        remaining: u32,
    },
    /// Budget spent. Terminal for the run.
    Exhausted,
}

/// The state machine governing when commands are accepted
pub struct SessionMachine {
    phase: Phase,
    /// Whether a password gate is configured (controls initial phase and
    /// whether lock commands mean anything)
    gated: bool,
    /// Idle window length for the command session
    session_duration: Duration,
    /// Unlock attempt budget per lock cycle
    max_attempts: u32,
    attempts_remaining: u32,
    /// Time of the last wake event or accepted command
    last_command_time: Option<Instant>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionMachine {
    /// Create a new session machine. Starts Locked when `gated`, Idle
    /// otherwise.
    pub fn new(
        gated: bool,
        session_duration: Duration,
        max_attempts: u32,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            phase: if gated { Phase::Locked } else { Phase::Idle },
            gated,
            session_duration,
            max_attempts,
            attempts_remaining: max_attempts,
            last_command_time: None,
            event_tx,
        }
    }

    /// Get the current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether a password gate is configured
    pub fn is_gated(&self) -> bool {
        self.gated
    }

    /// Record the result of one unlock attempt while Locked.
    ///
    /// A verified attempt transitions to Idle and restores the full budget
    /// for the next lock cycle without consuming the remaining attempts. A
    /// failed attempt consumes one; spending the last one is terminal.
    pub fn record_unlock_attempt(&mut self, verified: bool) -> UnlockOutcome {
        debug_assert_eq!(self.phase, Phase::Locked);

        if verified {
            self.attempts_remaining = self.max_attempts;
            self.transition_to(Phase::Idle);
            self.emit(SessionEvent::Unlocked);
            return UnlockOutcome::Unlocked;
        }

        self.attempts_remaining = self.attempts_remaining.saturating_sub(1);

        if self.attempts_remaining == 0 {
            warn!("unlock attempt budget exhausted");
            UnlockOutcome::Exhausted
        } else {
            self.emit(SessionEvent::UnlockFailed {
                attempts_remaining: self.attempts_remaining,
            });
            UnlockOutcome::Retry {
                remaining: self.attempts_remaining,
            }
        }
    }

    /// Open the command window on wake-word detection. No-op unless Idle.
    pub fn activate(&mut self, now: Instant) {
        if self.phase != Phase::Idle {
            debug!(phase = %self.phase, "activate ignored");
            return;
        }

        self.last_command_time = Some(now);
        self.transition_to(Phase::Active);
        self.emit(SessionEvent::SessionActivated {
            duration_secs: self.session_duration.as_secs(),
        });
    }

    /// Reset the window timer after an accepted command. The expiry slides:
    /// every command pushes the deadline out by a full `session_duration`.
    pub fn refresh(&mut self, now: Instant, command: &str) {
        if self.phase != Phase::Active {
            debug!(phase = %self.phase, "refresh ignored");
            return;
        }

        self.last_command_time = Some(now);
        self.emit(SessionEvent::CommandAccepted {
            command: command.to_string(),
        });
    }

    /// Close the command window if the idle deadline has passed.
    ///
    /// Returns true only on the poll where the transition happens; calling
    /// again without an intervening command is a no-op, so an expiry never
    /// double-fires.
    pub fn check_expiry(&mut self, now: Instant) -> bool {
        if self.phase != Phase::Active {
            return false;
        }

        let Some(last) = self.last_command_time else {
            return false;
        };

        if now.saturating_duration_since(last) >= self.session_duration {
            self.transition_to(Phase::Idle);
            self.emit(SessionEvent::SessionExpired);
            return true;
        }

        false
    }

    /// Remaining time in the command window, zero when not Active
    pub fn remaining(&self, now: Instant) -> Duration {
        match (self.phase, self.last_command_time) {
            (Phase::Active, Some(last)) => self
                .session_duration
                .saturating_sub(now.saturating_duration_since(last)),
            _ => Duration::ZERO,
        }
    }

    /// Re-lock the daemon. Immediate, no grace period; restores the unlock
    /// attempt budget for the next cycle. Ignored in ungated runs, where
    /// Locked would be unrecoverable.
    pub fn lock(&mut self) {
        if !self.gated {
            debug!("lock ignored, no password gate configured");
            return;
        }
        if self.phase == Phase::Locked {
            return;
        }

        self.last_command_time = None;
        self.attempts_remaining = self.max_attempts;
        self.transition_to(Phase::Locked);
        self.emit(SessionEvent::Locked);
    }

    /// Perform a phase transition
    fn transition_to(&mut self, new_phase: Phase) {
        let old_phase = self.phase;
        self.phase = new_phase;

        info!(from = %old_phase, to = %new_phase, "session transition");
    }

    fn emit(&self, event: SessionEvent) {
        debug!(?event, "emitting session event");
        // Nobody listening is fine (e.g. in tests)
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    fn gated_machine() -> (SessionMachine, broadcast::Receiver<SessionEvent>) {
        let (tx, rx) = broadcast::channel(16);
        (SessionMachine::new(true, WINDOW, 3, tx), rx)
    }

    fn open_machine() -> SessionMachine {
        let (tx, _) = broadcast::channel(16);
        SessionMachine::new(false, WINDOW, 3, tx)
    }

    #[test]
    fn test_initial_phase() {
        let (sm, _) = gated_machine();
        assert_eq!(sm.phase(), Phase::Locked);

        let sm = open_machine();
        assert_eq!(sm.phase(), Phase::Idle);
    }

    #[test]
    fn test_unlock_success() {
        let (mut sm, _) = gated_machine();
        assert_eq!(sm.record_unlock_attempt(true), UnlockOutcome::Unlocked);
        assert_eq!(sm.phase(), Phase::Idle);
    }

    #[test]
    fn test_unlock_budget_exhaustion() {
        let (mut sm, _) = gated_machine();
        assert_eq!(
            sm.record_unlock_attempt(false),
            UnlockOutcome::Retry { remaining: 2 }
        );
        assert_eq!(
            sm.record_unlock_attempt(false),
            UnlockOutcome::Retry { remaining: 1 }
        );
        assert_eq!(sm.record_unlock_attempt(false), UnlockOutcome::Exhausted);
        assert_eq!(sm.phase(), Phase::Locked);
    }

    #[test]
    fn test_unlock_on_second_attempt_keeps_third() {
        let (mut sm, _) = gated_machine();
        assert_eq!(
            sm.record_unlock_attempt(false),
            UnlockOutcome::Retry { remaining: 2 }
        );
        assert_eq!(sm.record_unlock_attempt(true), UnlockOutcome::Unlocked);
        assert_eq!(sm.phase(), Phase::Idle);

        // Budget is whole again for the next lock cycle
        sm.lock();
        assert_eq!(
            sm.record_unlock_attempt(false),
            UnlockOutcome::Retry { remaining: 2 }
        );
    }

    #[test]
    fn test_wake_word_activation() {
        let mut sm = open_machine();
        let t0 = Instant::now();

        sm.activate(t0);
        assert_eq!(sm.phase(), Phase::Active);
        assert_eq!(sm.remaining(t0), WINDOW);
    }

    #[test]
    fn test_never_active_while_locked() {
        let (mut sm, _) = gated_machine();
        sm.activate(Instant::now());
        assert_eq!(sm.phase(), Phase::Locked);
    }

    #[test]
    fn test_fixed_deadline_expiry() {
        let mut sm = open_machine();
        let t0 = Instant::now();

        sm.activate(t0);
        assert!(!sm.check_expiry(t0 + Duration::from_secs(59)));
        assert_eq!(sm.phase(), Phase::Active);

        assert!(sm.check_expiry(t0 + Duration::from_secs(60)));
        assert_eq!(sm.phase(), Phase::Idle);
    }

    #[test]
    fn test_sliding_expiry() {
        let mut sm = open_machine();
        let t0 = Instant::now();

        // Commands at t=0 and t=59 keep the window open through t=118
        sm.activate(t0);
        sm.refresh(t0 + Duration::from_secs(59), "next");

        assert!(!sm.check_expiry(t0 + Duration::from_secs(118)));
        assert_eq!(sm.phase(), Phase::Active);

        assert!(sm.check_expiry(t0 + Duration::from_secs(119)));
        assert_eq!(sm.phase(), Phase::Idle);
    }

    #[test]
    fn test_expiry_is_idempotent() {
        let mut sm = open_machine();
        let t0 = Instant::now();

        sm.activate(t0);
        let late = t0 + Duration::from_secs(120);

        assert!(sm.check_expiry(late));
        // Second call without an intervening command must not fire again
        assert!(!sm.check_expiry(late));
        assert_eq!(sm.phase(), Phase::Idle);
    }

    #[test]
    fn test_lock_from_active() {
        let (mut sm, _) = gated_machine();
        sm.record_unlock_attempt(true);
        sm.activate(Instant::now());
        assert_eq!(sm.phase(), Phase::Active);

        sm.lock();
        assert_eq!(sm.phase(), Phase::Locked);
        assert_eq!(sm.remaining(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn test_lock_from_idle() {
        let (mut sm, _) = gated_machine();
        sm.record_unlock_attempt(true);
        assert_eq!(sm.phase(), Phase::Idle);

        sm.lock();
        assert_eq!(sm.phase(), Phase::Locked);
    }

    #[test]
    fn test_lock_ignored_when_ungated() {
        let mut sm = open_machine();
        sm.lock();
        assert_eq!(sm.phase(), Phase::Idle);
    }

    #[test]
    fn test_refresh_emits_command_event() {
        let (mut sm, mut rx) = gated_machine();
        let t0 = Instant::now();

        sm.record_unlock_attempt(true);
        sm.activate(t0);
        sm.refresh(t0 + Duration::from_secs(1), "mute");

        let mut saw_command = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(&event, SessionEvent::CommandAccepted { command } if command == "mute") {
                saw_command = true;
            }
        }
        assert!(saw_command);
    }

    #[test]
    fn test_remaining_counts_down() {
        let mut sm = open_machine();
        let t0 = Instant::now();

        sm.activate(t0);
        assert_eq!(
            sm.remaining(t0 + Duration::from_secs(15)),
            Duration::from_secs(45)
        );
    }
}
