//! voicedeck-daemon: voice-activated media remote control
//!
//! Listens to the microphone, transcribes speech through a cloud speech
//! API, and turns recognized phrases into OS media-key presses:
//! - Optional voice-password gate at startup
//! - Wake-word activated command sessions with sliding expiry
//! - Fixed keyword table mapping phrases to media commands

mod actuator;
mod audio;
mod command;
mod config;
mod controller;
mod credential;
mod events;
mod lifecycle;
mod session;
mod stt;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::controller::{Controller, ControllerError};
use crate::events::SessionEvent;
use crate::lifecycle::wait_for_shutdown;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "voicedeck-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        wake_word = %config.wake_word,
        require_password = config.require_password,
        "configuration loaded"
    );
    log_available_commands();

    // Session events feed the operator status renderer
    let (event_tx, _event_rx) = broadcast::channel::<SessionEvent>(64);
    let mut status_rx = event_tx.subscribe();

    // Build the listen loop with its collaborators
    let mut controller = Controller::new(config, event_tx)?;
    let gated = controller.is_gated();

    info!("daemon initialized, entering listen loop");

    tokio::select! {
        // Run the listen loop
        result = controller.run() => {
            match result {
                Ok(()) => info!("listen loop exited"),
                Err(ControllerError::UnlockExhausted) => {
                    error!("too many failed unlock attempts, terminating");
                    return Err(ControllerError::UnlockExhausted.into());
                }
                Err(e) => {
                    error!(?e, "listen loop error");
                    return Err(e.into());
                }
            }
        }

        // Render session events as operator status lines
        _ = async {
            loop {
                match status_rx.recv().await {
                    Ok(event) => render_status(&event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "status renderer lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("status renderer exited");
        }

        // Wait for shutdown signal
        _ = wait_for_shutdown() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup: a gated run ends locked
    if gated {
        info!("re-locked for shutdown");
    }
    info!("voicedeck-daemon stopped");

    Ok(())
}

/// Render one session event as an operator-facing status line
fn render_status(event: &SessionEvent) {
    match event {
        SessionEvent::Unlocked => info!("status: UNLOCKED, say the wake word to start"),
        SessionEvent::UnlockFailed { attempts_remaining } => {
            warn!(attempts_remaining, "status: LOCKED, incorrect password");
        }
        SessionEvent::SessionActivated { duration_secs } => {
            info!(duration_secs, "status: session ACTIVE, give commands");
        }
        SessionEvent::CommandAccepted { command } => {
            info!(%command, "status: command executed, timer reset");
        }
        SessionEvent::SessionExpired => {
            info!("status: session expired, say the wake word to resume");
        }
        SessionEvent::Locked => info!("status: LOCKED"),
    }
}

/// Startup listing of everything the matcher understands
fn log_available_commands() {
    info!("playback: play, pause, stop, resume, next, skip, previous, back");
    info!("volume: volume up, louder, volume down, quieter, mute");
    info!("system: lock program, lock system (password-gated runs)");
}
