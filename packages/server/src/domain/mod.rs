//! Domain layer for the notification hub.
//!
//! This module contains the hub's core types and ports, independent of the
//! wire format and the transport.

pub mod entity;
pub mod error;
pub mod repository;
pub mod sink;
pub mod value_object;

pub use entity::{
    Connection, ConnectionHealth, ConnectionStats, DEFAULT_MAX_WRITE_FAILURES, Notification,
};
pub use error::{SinkError, ValueObjectError};
pub use repository::ConnectionRepository;
pub use sink::ConnectionSink;
pub use value_object::{ConnectionId, TenantId, UserId};
