//! Daemon lifecycle helpers

mod shutdown;

pub use shutdown::wait_for_shutdown;
