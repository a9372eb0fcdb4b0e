//! API clients for the learning platform
//!
//! - Learning: progress, lectures, enrollment and telemetry over REST

pub mod learning;

pub use learning::{ApiError, LearningClient, SyncClient, DEFAULT_API_URL};
