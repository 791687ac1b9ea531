//! Infrastructure layer: wire DTOs, registry storage, socket adapter and the
//! background machinery (dispatcher workers, heartbeat monitor).

pub mod dispatcher;
pub mod dto;
pub mod heartbeat;
pub mod repository;
pub mod socket;
