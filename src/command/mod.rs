//! Command matching for recognized speech

mod matcher;

pub use matcher::{match_command, MediaCommand};
