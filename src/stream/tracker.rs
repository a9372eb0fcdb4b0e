//! Progress tracker
//!
//! Pure state machine over the ticks of the active lecture. It never does
//! I/O itself: every transition returns the [`SaveRequest`] the caller should
//! persist, if any. Time comes from a [`Clock`] so the periodic rule can be
//! driven deterministically.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::clock::Clock;
use crate::models::{LectureId, ProgressUpdate, SessionId, Tick};

/// Thresholds deciding when a tick is worth persisting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SavePolicy {
    /// Position (seconds) that triggers the first save of a session
    pub first_contact_secs: f64,
    /// Minimum spacing between periodic saves
    pub periodic_interval: Duration,
    /// Watched fraction that counts as complete
    pub completion_ratio: f64,
}

impl Default for SavePolicy {
    fn default() -> Self {
        Self {
            first_contact_secs: 60.0,
            periodic_interval: Duration::from_secs(5 * 60),
            completion_ratio: 0.9,
        }
    }
}

/// Why a save was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTrigger {
    FirstContact,
    Periodic,
    NearCompletion,
    Terminal,
    SwitchFlush,
}

impl SaveTrigger {
    /// Terminal saves drive auto-advance once they settle
    pub fn is_terminal(&self) -> bool {
        matches!(self, SaveTrigger::Terminal)
    }
}

impl fmt::Display for SaveTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveTrigger::FirstContact => write!(f, "first-contact"),
            SaveTrigger::Periodic => write!(f, "periodic"),
            SaveTrigger::NearCompletion => write!(f, "near-completion"),
            SaveTrigger::Terminal => write!(f, "terminal"),
            SaveTrigger::SwitchFlush => write!(f, "switch-flush"),
        }
    }
}

/// A save the caller should issue
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub session: SessionId,
    pub trigger: SaveTrigger,
    pub update: ProgressUpdate,
}

/// Tracking state of the live lecture view
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedSession {
    pub id: SessionId,
    pub course_id: String,
    pub lecture_id: LectureId,
    pub video_ref: Option<String>,
    pub last_tick: Option<Tick>,
    pub last_save_at: Option<Instant>,
    pub first_save_done: bool,
    pub near_complete_saved: bool,
}

/// Decides which playback samples get persisted
pub struct ProgressTracker {
    policy: SavePolicy,
    clock: Arc<dyn Clock>,
    session: Option<TrackedSession>,
}

impl ProgressTracker {
    pub fn new(policy: SavePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            clock,
            session: None,
        }
    }

    pub fn policy(&self) -> &SavePolicy {
        &self.policy
    }

    pub fn session(&self) -> Option<&TrackedSession> {
        self.session.as_ref()
    }

    /// Start tracking a lecture under `id`, replacing any previous session
    pub fn begin(
        &mut self,
        id: SessionId,
        course_id: impl Into<String>,
        lecture_id: LectureId,
        video_ref: Option<String>,
    ) {
        debug!(session = %id, lecture = %lecture_id, "tracking session started");
        self.session = Some(TrackedSession {
            id,
            course_id: course_id.into(),
            lecture_id,
            video_ref,
            last_tick: None,
            last_save_at: None,
            first_save_done: false,
            near_complete_saved: false,
        });
    }

    /// Feed a tick; returns the save it warrants, if any
    pub fn on_tick(&mut self, session: SessionId, tick: Tick) -> Option<SaveRequest> {
        let now = self.clock.now();
        let policy = self.policy;
        let tracked = self.live(session)?;
        tracked.last_tick = Some(tick);

        let complete = tick
            .fraction()
            .map(|f| f >= policy.completion_ratio)
            .unwrap_or(false);

        let trigger = if complete && !tracked.near_complete_saved {
            tracked.near_complete_saved = true;
            SaveTrigger::NearCompletion
        } else if !tracked.first_save_done {
            if tick.position < policy.first_contact_secs {
                return None;
            }
            SaveTrigger::FirstContact
        } else {
            let due = tracked
                .last_save_at
                .map(|at| now.saturating_duration_since(at) >= policy.periodic_interval)
                .unwrap_or(true);
            if !due {
                return None;
            }
            SaveTrigger::Periodic
        };

        tracked.first_save_done = true;
        tracked.last_save_at = Some(now);
        let update = build_update(tracked, tick, complete.then_some(true));
        debug!(session = %session, %trigger, position = tick.position, "save requested");
        Some(SaveRequest {
            session,
            trigger,
            update,
        })
    }

    /// Media ended; always yields a completing save for the live session
    pub fn on_ended(&mut self, session: SessionId, tick: Tick) -> Option<SaveRequest> {
        let now = self.clock.now();
        let tracked = self.live(session)?;
        tracked.last_tick = Some(tick);
        tracked.first_save_done = true;
        tracked.near_complete_saved = true;
        tracked.last_save_at = Some(now);

        debug!(session = %session, position = tick.position, "terminal save requested");
        Some(SaveRequest {
            session,
            trigger: SaveTrigger::Terminal,
            update: build_update(tracked, tick, Some(true)),
        })
    }

    /// Save the last known tick before the session goes away
    pub fn flush(&mut self) -> Option<SaveRequest> {
        let now = self.clock.now();
        let tracked = self.session.as_mut()?;
        let tick = tracked.last_tick?;
        tracked.last_save_at = Some(now);

        debug!(session = %tracked.id, position = tick.position, "flush save requested");
        Some(SaveRequest {
            session: tracked.id,
            trigger: SaveTrigger::SwitchFlush,
            update: build_update(tracked, tick, None),
        })
    }

    /// Stop tracking, returning the retired session
    pub fn end(&mut self) -> Option<TrackedSession> {
        self.session.take()
    }

    fn live(&mut self, session: SessionId) -> Option<&mut TrackedSession> {
        match self.session.as_mut() {
            Some(tracked) if tracked.id == session => Some(tracked),
            _ => {
                trace!(%session, "sample for retired session ignored");
                None
            }
        }
    }
}

fn build_update(tracked: &TrackedSession, tick: Tick, is_complete: Option<bool>) -> ProgressUpdate {
    ProgressUpdate {
        course_id: tracked.course_id.clone(),
        lecture_id: tracked.lecture_id.clone(),
        video_ref: tracked.video_ref.clone(),
        position: tick.position,
        duration: tick.duration,
        is_complete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::clock::ManualClock;

    fn tracker() -> (ProgressTracker, Arc<ManualClock>, SessionId) {
        let clock = Arc::new(ManualClock::new());
        let mut tracker = ProgressTracker::new(SavePolicy::default(), clock.clone());
        let id = SessionId::new();
        tracker.begin(id, "c1", "l1".into(), Some("v1".to_string()));
        (tracker, clock, id)
    }

    #[test]
    fn test_no_save_before_first_contact() {
        let (mut tracker, _clock, id) = tracker();
        assert!(tracker.on_tick(id, Tick::new(10.0, 600.0)).is_none());
        assert!(tracker.on_tick(id, Tick::new(54.0, 600.0)).is_none());

        let save = tracker.on_tick(id, Tick::new(61.0, 600.0)).unwrap();
        assert_eq!(save.trigger, SaveTrigger::FirstContact);
        assert_eq!(save.update.position, 61.0);
        assert_eq!(save.update.is_complete, None);
        assert_eq!(save.update.video_ref.as_deref(), Some("v1"));

        assert!(tracker.on_tick(id, Tick::new(62.0, 600.0)).is_none());
    }

    #[test]
    fn test_periodic_save_every_interval() {
        let (mut tracker, clock, id) = tracker();
        tracker.on_tick(id, Tick::new(60.0, 3600.0)).unwrap();

        clock.advance(Duration::from_secs(299));
        assert!(tracker.on_tick(id, Tick::new(359.0, 3600.0)).is_none());

        clock.advance(Duration::from_secs(1));
        let save = tracker.on_tick(id, Tick::new(360.0, 3600.0)).unwrap();
        assert_eq!(save.trigger, SaveTrigger::Periodic);

        assert!(tracker.on_tick(id, Tick::new(361.0, 3600.0)).is_none());
    }

    #[test]
    fn test_periodic_does_not_bypass_first_contact() {
        let (mut tracker, clock, id) = tracker();
        clock.advance(Duration::from_secs(600));
        assert!(tracker.on_tick(id, Tick::new(30.0, 3600.0)).is_none());
    }

    #[test]
    fn test_near_completion_saves_once() {
        let (mut tracker, clock, id) = tracker();
        let save = tracker.on_tick(id, Tick::new(540.0, 600.0)).unwrap();
        assert_eq!(save.trigger, SaveTrigger::NearCompletion);
        assert!(save.update.marks_complete());

        assert!(tracker.on_tick(id, Tick::new(545.0, 600.0)).is_none());
        clock.advance(Duration::from_secs(10));
        assert!(tracker.on_tick(id, Tick::new(555.0, 600.0)).is_none());
    }

    #[test]
    fn test_periodic_save_past_threshold_keeps_complete_flag() {
        let (mut tracker, clock, id) = tracker();
        tracker.on_tick(id, Tick::new(3300.0, 3600.0)).unwrap();
        clock.advance(Duration::from_secs(300));
        let save = tracker.on_tick(id, Tick::new(3400.0, 3600.0)).unwrap();
        assert_eq!(save.trigger, SaveTrigger::Periodic);
        assert_eq!(save.update.is_complete, Some(true));
    }

    #[test]
    fn test_unknown_duration_never_completes() {
        let (mut tracker, _clock, id) = tracker();
        let save = tracker.on_tick(id, Tick::new(61.0, 0.0)).unwrap();
        assert_eq!(save.trigger, SaveTrigger::FirstContact);
        assert_eq!(save.update.is_complete, None);
    }

    #[test]
    fn test_ended_always_saves_complete() {
        let (mut tracker, _clock, id) = tracker();
        tracker.on_tick(id, Tick::new(540.0, 600.0)).unwrap();

        let save = tracker.on_ended(id, Tick::new(598.0, 600.0)).unwrap();
        assert_eq!(save.trigger, SaveTrigger::Terminal);
        assert_eq!(save.update.is_complete, Some(true));
        assert_eq!(save.update.position, 598.0);
    }

    #[test]
    fn test_stale_session_ignored() {
        let (mut tracker, _clock, _id) = tracker();
        let stale = SessionId::new();
        assert!(tracker.on_tick(stale, Tick::new(120.0, 600.0)).is_none());
        assert!(tracker.on_ended(stale, Tick::new(600.0, 600.0)).is_none());
        assert!(tracker.session().unwrap().last_tick.is_none());
    }

    #[test]
    fn test_flush_saves_last_tick_without_override() {
        let (mut tracker, _clock, id) = tracker();
        tracker.on_tick(id, Tick::new(20.0, 600.0));

        let save = tracker.flush().unwrap();
        assert_eq!(save.trigger, SaveTrigger::SwitchFlush);
        assert_eq!(save.update.position, 20.0);
        assert_eq!(save.update.is_complete, None);
    }

    #[test]
    fn test_flush_without_ticks_is_noop() {
        let (mut tracker, _clock, _id) = tracker();
        assert!(tracker.flush().is_none());
        assert!(tracker.end().is_some());
        assert!(tracker.flush().is_none());
    }
}
