//! InMemory repository implementations.

pub mod connection;

pub use connection::InMemoryConnectionRepository;
