//! Shared utilities for campus-notify (logging and clock helpers).

pub mod logger;
pub mod time;
