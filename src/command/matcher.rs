//! Keyword-table command matcher
//!
//! Maps free-text utterances to a fixed set of media commands via
//! ordered substring matching. First matching group wins, so the table
//! order is load-bearing: "volume up" must be tested before "up" could
//! ever be claimed by another group.

/// The closed set of commands the daemon understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCommand {
    /// Toggle play/pause
    PlayPause,
    /// Next track
    Next,
    /// Previous track
    Previous,
    /// Raise volume
    VolumeUp,
    /// Lower volume
    VolumeDown,
    /// Toggle mute
    Mute,
    /// Lock the daemon (password-gated runs)
    Lock,
    /// No keyword matched
    Unknown,
}

impl std::fmt::Display for MediaCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaCommand::PlayPause => write!(f, "play/pause"),
            MediaCommand::Next => write!(f, "next"),
            MediaCommand::Previous => write!(f, "previous"),
            MediaCommand::VolumeUp => write!(f, "volume up"),
            MediaCommand::VolumeDown => write!(f, "volume down"),
            MediaCommand::Mute => write!(f, "mute"),
            MediaCommand::Lock => write!(f, "lock"),
            MediaCommand::Unknown => write!(f, "unknown"),
        }
    }
}

/// Ordered keyword groups. Checked top to bottom; volume phrases come
/// first so "turn up the volume" never falls through to a shorter match.
const KEYWORD_TABLE: &[(&[&str], MediaCommand)] = &[
    (
        &["volume up", "increase volume", "louder", "turn up"],
        MediaCommand::VolumeUp,
    ),
    (
        &[
            "volume down",
            "decrease volume",
            "quieter",
            "turn down",
            "lower volume",
        ],
        MediaCommand::VolumeDown,
    ),
    (&["mute", "unmute", "silence"], MediaCommand::Mute),
    (
        &["play", "pause", "stop", "resume"],
        MediaCommand::PlayPause,
    ),
    (&["next", "skip"], MediaCommand::Next),
    (&["previous", "back"], MediaCommand::Previous),
    (&["lock program", "lock system"], MediaCommand::Lock),
];

/// Match an utterance against the keyword table.
///
/// Input is lowercased before matching; keywords match as substrings.
/// Returns [`MediaCommand::Unknown`] when no group matches. Pure
/// function, no I/O.
pub fn match_command(text: &str) -> MediaCommand {
    let text = text.to_lowercase();

    for (keywords, command) in KEYWORD_TABLE {
        if keywords.iter().any(|kw| text.contains(kw)) {
            return *command;
        }
    }

    MediaCommand::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_up_phrases() {
        assert_eq!(match_command("volume up please"), MediaCommand::VolumeUp);
        assert_eq!(match_command("make it louder"), MediaCommand::VolumeUp);
        assert_eq!(match_command("turn up the music"), MediaCommand::VolumeUp);
    }

    #[test]
    fn test_volume_down_phrases() {
        assert_eq!(match_command("volume down"), MediaCommand::VolumeDown);
        assert_eq!(match_command("a bit quieter"), MediaCommand::VolumeDown);
        assert_eq!(match_command("lower volume now"), MediaCommand::VolumeDown);
    }

    #[test]
    fn test_playback_phrases() {
        assert_eq!(match_command("pause"), MediaCommand::PlayPause);
        assert_eq!(match_command("resume the song"), MediaCommand::PlayPause);
        assert_eq!(match_command("skip this one"), MediaCommand::Next);
        assert_eq!(match_command("please go back"), MediaCommand::Previous);
    }

    #[test]
    fn test_mute() {
        assert_eq!(match_command("mute"), MediaCommand::Mute);
        assert_eq!(match_command("unmute it"), MediaCommand::Mute);
    }

    #[test]
    fn test_lock_phrases() {
        assert_eq!(match_command("lock program"), MediaCommand::Lock);
        assert_eq!(match_command("lock system"), MediaCommand::Lock);
        // Bare "lock" is not in the command table
        assert_eq!(match_command("lock"), MediaCommand::Unknown);
    }

    #[test]
    fn test_unknown() {
        assert_eq!(match_command("xyz"), MediaCommand::Unknown);
        assert_eq!(match_command(""), MediaCommand::Unknown);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(match_command("VOLUME UP"), MediaCommand::VolumeUp);
        assert_eq!(match_command("Next Track"), MediaCommand::Next);
    }

    #[test]
    fn test_table_order_breaks_ties() {
        // "turn up" (volume up) is checked before "turn down" could ever
        // see the text; overlapping phrases resolve by table position.
        assert_eq!(match_command("turn up"), MediaCommand::VolumeUp);
        // "stop" belongs to the play/pause group, not an alias of mute
        assert_eq!(match_command("stop"), MediaCommand::PlayPause);
    }

    #[test]
    fn test_deterministic() {
        for _ in 0..3 {
            assert_eq!(match_command("volume up please"), MediaCommand::VolumeUp);
        }
    }
}
