//! axum transport for the notification hub.

pub mod auth;
mod handler;
mod runner;
mod signal;
pub mod state;

pub use runner::{build_router, run, serve};
