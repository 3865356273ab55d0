//! HTTP handlers.

pub mod health;
pub mod jobs;

pub use health::{health, ready};
