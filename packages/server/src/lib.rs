//! Real-time notification broadcast hub.
//!
//! Keeps one live WebSocket per (college, user), fans notifications, typing
//! indicators and presence changes out through a bounded dispatch queue, and
//! pings every connection on a heartbeat.

pub mod config;
pub mod domain;
pub mod error;
pub mod hub;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

// Re-export entry points
pub use config::{HubConfig, OverflowPolicy, ServerArgs};
pub use error::{HubError, ServerError};
pub use hub::NotificationHub;
pub use ui::run;
