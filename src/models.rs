//! Data structures and types for Lectern
//!
//! Contains the shared models used across the application organized by domain:
//! - **Course**: lectures and their ordering
//! - **Progress**: per-lecture progress, course summary, save payloads
//! - **Playback**: ticks, playback rates, session identity, telemetry

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

// =============================================================================
// Course Models
// =============================================================================

/// Opaque lecture identifier as issued by the server
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LectureId(String);

impl LectureId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the id is empty or only whitespace
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for LectureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LectureId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for LectureId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One orderable unit of video content within a course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lecture {
    pub lecture_id: LectureId,
    pub title: String,
    /// 1-based position within the course
    pub order_index: u32,
    /// Raw source URL or path the server associated with the lecture
    pub source_ref: Option<String>,
    /// Video identifier forwarded with progress saves
    pub video_ref: Option<String>,
    pub is_preview: bool,
    /// Duration hint in seconds (0 when unknown)
    pub duration: f64,
}

impl fmt::Display for Lecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.order_index, self.title)
    }
}

// =============================================================================
// Progress Models
// =============================================================================

/// Learner progress on a single lecture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LectureProgress {
    pub lecture_id: LectureId,
    /// Seconds watched
    #[serde(default)]
    pub position: f64,
    /// Seconds, 0 when unknown
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub is_complete: bool,
}

impl LectureProgress {
    pub fn new(lecture_id: LectureId) -> Self {
        Self {
            lecture_id,
            position: 0.0,
            duration: 0.0,
            is_complete: false,
        }
    }

    /// Watched fraction in 0.0-1.0, 0.0 when the duration is unknown
    pub fn fraction(&self) -> f64 {
        if self.duration <= 0.0 {
            0.0
        } else {
            (self.position / self.duration).clamp(0.0, 1.0)
        }
    }

    /// Merge a newer observation. Completion is sticky.
    pub fn merge(&mut self, newer: &LectureProgress) {
        self.position = newer.position;
        if newer.duration > 0.0 {
            self.duration = newer.duration;
        }
        self.is_complete = self.is_complete || newer.is_complete;
    }
}

/// Aggregate course progress, derived server-side
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProgressSummary {
    pub total_lectures: u32,
    pub known_durations: u32,
    pub total_duration: f64,
    pub total_watched: f64,
    /// Fraction in 0.0-1.0
    pub percent: f64,
    pub remaining_seconds: f64,
}

impl ProgressSummary {
    /// Percent rounded for display (0-100)
    pub fn percent_rounded(&self) -> u8 {
        (self.percent.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

impl fmt::Display for ProgressSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}% complete - {} watched, {} remaining",
            self.percent_rounded(),
            format_duration(Duration::from_secs_f64(self.total_watched.max(0.0))),
            format_duration(Duration::from_secs_f64(self.remaining_seconds.max(0.0)))
        )
    }
}

/// Response of the course progress endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseProgress {
    #[serde(default)]
    pub summary: ProgressSummary,
    #[serde(default)]
    pub items: Vec<LectureProgress>,
}

/// Payload of a progress save
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub course_id: String,
    pub lecture_id: LectureId,
    #[serde(rename = "videoId", skip_serializing_if = "Option::is_none")]
    pub video_ref: Option<String>,
    pub position: f64,
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_complete: Option<bool>,
}

impl ProgressUpdate {
    pub fn marks_complete(&self) -> bool {
        self.is_complete == Some(true)
    }
}

/// Server acknowledgement of a progress save
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistAck {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub completed: bool,
}

// =============================================================================
// Sequencing Models
// =============================================================================

/// Playability of a lecture under the sequential unlock policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LectureState {
    Locked,
    NotStarted,
    InProgress,
    Completed,
}

impl LectureState {
    pub fn is_playable(&self) -> bool {
        !matches!(self, LectureState::Locked)
    }
}

impl fmt::Display for LectureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LectureState::Locked => write!(f, "Locked"),
            LectureState::NotStarted => write!(f, "Not started"),
            LectureState::InProgress => write!(f, "In progress"),
            LectureState::Completed => write!(f, "Completed"),
        }
    }
}

// =============================================================================
// Playback Models
// =============================================================================

/// Identity of one decoding/tracking session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position/duration sample emitted by the playback engine
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Tick {
    pub position: f64,
    pub duration: f64,
}

impl Tick {
    pub fn new(position: f64, duration: f64) -> Self {
        Self { position, duration }
    }

    /// Watched fraction, `None` when the duration is unknown
    pub fn fraction(&self) -> Option<f64> {
        if self.duration > 0.0 {
            Some(self.position / self.duration)
        } else {
            None
        }
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {}",
            format_duration(Duration::from_secs_f64(self.position.max(0.0))),
            format_duration(Duration::from_secs_f64(self.duration.max(0.0)))
        )
    }
}

/// Playback speed multiplier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlaybackRate {
    #[serde(rename = "0.75")]
    Slow,
    #[default]
    #[serde(rename = "1")]
    Normal,
    #[serde(rename = "1.25")]
    Quick,
    #[serde(rename = "1.5")]
    Fast,
    #[serde(rename = "2")]
    Double,
}

impl PlaybackRate {
    pub const ALL: [PlaybackRate; 5] = [
        PlaybackRate::Slow,
        PlaybackRate::Normal,
        PlaybackRate::Quick,
        PlaybackRate::Fast,
        PlaybackRate::Double,
    ];

    pub fn multiplier(&self) -> f64 {
        match self {
            PlaybackRate::Slow => 0.75,
            PlaybackRate::Normal => 1.0,
            PlaybackRate::Quick => 1.25,
            PlaybackRate::Fast => 1.5,
            PlaybackRate::Double => 2.0,
        }
    }

    /// Exact match against the supported multipliers
    pub fn from_multiplier(value: f64) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|r| (r.multiplier() - value).abs() < f64::EPSILON)
    }
}

impl fmt::Display for PlaybackRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.multiplier())
    }
}

impl std::str::FromStr for PlaybackRate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f64 = s
            .trim()
            .trim_end_matches('x')
            .parse()
            .map_err(|_| format!("invalid playback rate: {}", s))?;
        Self::from_multiplier(value)
            .ok_or_else(|| format!("unsupported playback rate: {} (use 0.75, 1, 1.25, 1.5 or 2)", s))
    }
}

/// Kind of best-effort playback telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryKind {
    Play,
    Pause,
    Complete,
}

/// Playback telemetry event sent to the logging endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackTelemetry {
    pub event: TelemetryKind,
    pub position: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Format a Duration as HH:MM:SS or MM:SS
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}", mins, secs)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
