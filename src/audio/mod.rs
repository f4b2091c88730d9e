//! Microphone capture

mod capture;

pub use capture::{AudioClip, CaptureError, Microphone};
