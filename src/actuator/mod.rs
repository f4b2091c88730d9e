//! Media-key emission via synthetic input events

use std::time::Duration;

use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use tracing::{info, warn};

use crate::command::MediaCommand;

/// Gap between the two presses of a volume command
const VOLUME_REPEAT_GAP: Duration = Duration::from_millis(50);

/// Media keys the daemon can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKey {
    PlayPause,
    Next,
    Previous,
    VolumeUp,
    VolumeDown,
    Mute,
}

impl MediaKey {
    /// The media key for a command, if it has one. `Lock` and `Unknown`
    /// are handled by the session machine, not the keyboard.
    pub fn for_command(command: MediaCommand) -> Option<Self> {
        match command {
            MediaCommand::PlayPause => Some(MediaKey::PlayPause),
            MediaCommand::Next => Some(MediaKey::Next),
            MediaCommand::Previous => Some(MediaKey::Previous),
            MediaCommand::VolumeUp => Some(MediaKey::VolumeUp),
            MediaCommand::VolumeDown => Some(MediaKey::VolumeDown),
            MediaCommand::Mute => Some(MediaKey::Mute),
            MediaCommand::Lock | MediaCommand::Unknown => None,
        }
    }

    fn to_key(self) -> Key {
        match self {
            MediaKey::PlayPause => Key::MediaPlayPause,
            MediaKey::Next => Key::MediaNextTrack,
            MediaKey::Previous => Key::MediaPrevTrack,
            MediaKey::VolumeUp => Key::VolumeUp,
            MediaKey::VolumeDown => Key::VolumeDown,
            MediaKey::Mute => Key::VolumeMute,
        }
    }
}

/// Emits OS media-key events
pub struct MediaActuator {
    enigo: Enigo,
}

impl MediaActuator {
    /// Connect to the OS input injection backend
    pub fn new() -> Result<Self, enigo::NewConError> {
        let enigo = Enigo::new(&Settings::default())?;
        Ok(Self { enigo })
    }

    /// Send the key press for a media key. Fire-and-forget: injection
    /// errors are logged, never propagated to the listen loop. Volume
    /// keys are pressed twice so one spoken command makes an audible
    /// step (carried behavior); the gap between presses yields to the
    /// runtime rather than blocking its thread.
    pub async fn send(&mut self, key: MediaKey) {
        for i in 0..press_count(key) {
            if i > 0 {
                tokio::time::sleep(VOLUME_REPEAT_GAP).await;
            }
            if let Err(e) = self.enigo.key(key.to_key(), Direction::Click) {
                warn!(?key, ?e, "failed to inject media key");
                return;
            }
        }

        info!(?key, "media key sent");
    }
}

/// Volume keys repeat once; everything else is a single press
fn press_count(key: MediaKey) -> u32 {
    match key {
        MediaKey::VolumeUp | MediaKey::VolumeDown => 2,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_to_key_mapping() {
        assert_eq!(
            MediaKey::for_command(MediaCommand::PlayPause),
            Some(MediaKey::PlayPause)
        );
        assert_eq!(
            MediaKey::for_command(MediaCommand::VolumeUp),
            Some(MediaKey::VolumeUp)
        );
        assert_eq!(MediaKey::for_command(MediaCommand::Lock), None);
        assert_eq!(MediaKey::for_command(MediaCommand::Unknown), None);
    }

    #[test]
    fn test_volume_keys_double_press() {
        assert_eq!(press_count(MediaKey::VolumeUp), 2);
        assert_eq!(press_count(MediaKey::VolumeDown), 2);
        assert_eq!(press_count(MediaKey::PlayPause), 1);
        assert_eq!(press_count(MediaKey::Mute), 1);
    }
}
