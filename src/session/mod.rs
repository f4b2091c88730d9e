//! Session state machine for the command lifecycle
//!
//! Provides an explicit state machine with three phases:
//! - Locked: waiting for the voice password (gated runs only)
//! - Idle: unlocked, waiting for the wake word
//! - Active: command window open, sliding expiry

mod machine;

pub use machine::{Phase, SessionMachine, UnlockOutcome};
