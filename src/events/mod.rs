//! Events emitted by the session state machine
//!
//! Broadcast to the operator status renderer in `main`, which turns them
//! into console status lines.

use serde::{Deserialize, Serialize};

/// Events emitted on session state transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Password accepted, daemon unlocked
    Unlocked,

    /// An unlock attempt failed
    UnlockFailed {
        /// Attempts left before the run terminates
        attempts_remaining: u32,
    },

    /// Wake word heard, command window opened
    SessionActivated {
        /// Window length in seconds
        duration_secs: u64,
    },

    /// A command was accepted, window timer reset
    CommandAccepted {
        /// Matched command, display form
        command: String,
    },

    /// Idle window elapsed with no command
    SessionExpired,

    /// Daemon re-locked (lock command or shutdown)
    Locked,
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::Unlocked => write!(f, "UNLOCKED"),
            SessionEvent::UnlockFailed { attempts_remaining } => {
                write!(f, "UNLOCK_FAILED ({} attempts left)", attempts_remaining)
            }
            SessionEvent::SessionActivated { duration_secs } => {
                write!(f, "SESSION_ACTIVATED ({}s window)", duration_secs)
            }
            SessionEvent::CommandAccepted { command } => {
                write!(f, "COMMAND_ACCEPTED ({})", command)
            }
            SessionEvent::SessionExpired => write!(f, "SESSION_EXPIRED"),
            SessionEvent::Locked => write!(f, "LOCKED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = SessionEvent::SessionActivated { duration_secs: 60 };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("session_activated"));
        assert!(json.contains("60"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"session_expired"}"#;
        let event: SessionEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, SessionEvent::SessionExpired));
    }
}
