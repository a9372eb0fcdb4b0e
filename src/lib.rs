//! Lectern - learning-session engine
//!
//! Streams a course's video lectures, tracks how far the learner got,
//! keeps that position in sync with the learning platform, and only lets
//! the learner move on once the previous lecture is done.
//!
//! # Modules
//!
//! - `models` - Lectures, progress, ticks, playback rates
//! - `api` - Learning platform REST client
//! - `stream` - Source resolution, playback engine, progress tracking
//! - `sequencer` - Lecture ordering, unlock policy, focus cursor
//! - `app` - Learning session orchestration and key handling
//! - `ui` - ratatui watch screen
//! - `cli` / `commands` - Command line surface
//! - `config` - Config file and credential lookup

pub mod api;
pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod models;
pub mod sequencer;
pub mod stream;
pub mod ui;

// Re-export commonly used types
pub use models::{
    CourseProgress, Lecture, LectureId, LectureProgress, LectureState, PlaybackRate,
    ProgressSummary, ProgressUpdate, SessionId, Tick,
};

pub use api::{LearningClient, SyncClient};
pub use app::LearningSession;
pub use sequencer::{LectureSequencer, SwitchDecision};
