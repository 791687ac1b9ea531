//! Domain layer error definitions.

use thiserror::Error;

/// Errors related to Value Objects validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueObjectError {
    /// TenantId (college id) is empty
    #[error("TenantId cannot be empty")]
    TenantIdEmpty,

    /// TenantId is not an integer
    #[error("TenantId must be an integer (got: {0})")]
    TenantIdInvalidFormat(String),

    /// TenantId is zero or negative
    #[error("TenantId must be positive (got: {0})")]
    TenantIdNotPositive(i64),

    /// UserId is empty
    #[error("UserId cannot be empty")]
    UserIdEmpty,

    /// UserId is not an integer
    #[error("UserId must be an integer (got: {0})")]
    UserIdInvalidFormat(String),

    /// UserId is zero or negative
    #[error("UserId must be positive (got: {0})")]
    UserIdNotPositive(i64),
}

/// Errors raised by a connection sink when writing to the socket
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The socket was already closed
    #[error("connection is closed")]
    Closed,

    /// The write did not finish within the allotted time
    #[error("write timed out after {0} ms")]
    Timeout(u128),

    /// Transport level failure
    #[error("transport error: {0}")]
    Transport(String),
}
