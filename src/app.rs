//! Learning session orchestration
//!
//! Wires the sequencer, resolver, playback engine and progress tracker
//! together on one event loop. Network I/O never blocks the loop: saves,
//! summary refreshes and telemetry run as spawned tasks and report back
//! over a channel, tagged with the session that issued them.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::HashMap;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::{ApiError, SyncClient};
use crate::models::*;
use crate::sequencer::{LectureSequencer, SwitchDecision};
use crate::stream::{
    Clock, EngineConfig, EngineEvent, EngineState, EventReceiver, PlaybackDevice, PlaybackEngine,
    ProgressTracker, SavePolicy, SaveRequest, SaveTrigger, SourceResolver, SystemClock, TaggedEvent,
};

/// Seek step for the arrow keys, in seconds
pub const SEEK_STEP_SECS: f64 = 10.0;

/// How long shutdown waits for the final flush
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// =============================================================================
// Errors and options
// =============================================================================

/// Reasons a learning session cannot be opened
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Not enrolled in course {0}")]
    NotEnrolled(String),
    #[error("Course {0} has no lectures")]
    NoLectures(String),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Knobs for opening a session
#[derive(Clone)]
pub struct SessionOptions {
    pub engine: EngineConfig,
    pub policy: SavePolicy,
    pub rate: PlaybackRate,
    /// Lecture to open instead of the first incomplete one
    pub initial_lecture: Option<LectureId>,
    pub clock: Arc<dyn Clock>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            policy: SavePolicy::default(),
            rate: PlaybackRate::Normal,
            initial_lecture: None,
            clock: Arc::new(SystemClock),
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

/// Something the learner asked for
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    TogglePlay,
    Seek(f64),
    FocusNext,
    FocusPrev,
    ActivateFocused,
    NextLecture,
    FocusActive,
    SetRate(PlaybackRate),
    Retry,
    Filter(String),
    Quit,
}

/// Message fed into the session loop
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Key(KeyEvent),
    Command(UserCommand),
}

/// Current input mode for keyboard handling
#[derive(Debug, Clone, PartialEq, Default)]
pub enum InputMode {
    /// Normal navigation mode
    #[default]
    Normal,
    /// Typing a lecture title filter
    Filtering,
}

/// Result of a background sync call
#[derive(Debug)]
enum SyncOutcome {
    Saved {
        seq: u64,
        session: SessionId,
        trigger: SaveTrigger,
        update: ProgressUpdate,
        result: Result<PersistAck, String>,
        refreshed: Option<CourseProgress>,
    },
}

// =============================================================================
// Learning Session
// =============================================================================

/// One learner working through one course
pub struct LearningSession<D: PlaybackDevice> {
    course_id: String,
    client: Arc<dyn SyncClient>,
    resolver: SourceResolver,
    engine: PlaybackEngine<D>,
    tracker: ProgressTracker,
    sequencer: LectureSequencer,
    summary: ProgressSummary,
    events: EventReceiver,
    outcomes_tx: mpsc::UnboundedSender<SyncOutcome>,
    outcomes_rx: mpsc::UnboundedReceiver<SyncOutcome>,
    in_flight: usize,
    /// Number handed to the next spawned save
    next_save_seq: u64,
    /// Newest save whose refreshed summary has been applied
    applied_refresh_seq: u64,
    /// Newest applied save per lecture
    applied_save_seq: HashMap<LectureId, u64>,
    input_mode: InputMode,
    filter_input: String,
    status: Option<String>,
    error: Option<String>,
    buffering: bool,
    should_quit: bool,
}

impl<D: PlaybackDevice> LearningSession<D> {
    /// Load the course and pick the lecture to start on. No device work
    /// happens until the learner asks to play.
    pub async fn open(
        course_id: impl Into<String>,
        client: Arc<dyn SyncClient>,
        resolver: SourceResolver,
        device: D,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let course_id = course_id.into();

        let enrolled = match client.is_enrolled(&course_id).await {
            Ok(enrolled) => enrolled,
            Err(e) => {
                warn!(course = %course_id, error = %e, "enrollment check failed");
                false
            }
        };
        if !enrolled {
            return Err(SessionError::NotEnrolled(course_id));
        }

        let lectures = client.fetch_lectures(&course_id).await?;
        if lectures.is_empty() {
            return Err(SessionError::NoLectures(course_id));
        }
        let progress = match client.fetch_progress(&course_id).await {
            Ok(progress) => progress,
            Err(e) => {
                warn!(course = %course_id, error = %e, "progress unavailable, starting fresh");
                CourseProgress::default()
            }
        };

        let mut sequencer = LectureSequencer::new(lectures);
        sequencer.select_initial(&progress.items);
        if let Some(target) = &options.initial_lecture {
            match sequencer.request_switch(target, false) {
                SwitchDecision::Switched { .. } | SwitchDecision::AlreadyActive => {}
                other => warn!(lecture = %target, decision = ?other, "requested lecture not opened"),
            }
        }

        let (events_tx, events) = crate::stream::event_channel();
        let mut engine =
            PlaybackEngine::new(device, options.engine, options.clock.clone(), events_tx);
        if let Err(e) = engine.set_rate(options.rate) {
            debug!(error = %e, "initial rate not applied");
        }
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();

        info!(
            course = %course_id,
            lectures = sequencer.lectures().len(),
            active = ?sequencer.active_id().map(|l| l.as_str()),
            "learning session opened"
        );

        Ok(Self {
            course_id,
            client,
            resolver,
            engine,
            tracker: ProgressTracker::new(options.policy, options.clock),
            sequencer,
            summary: progress.summary,
            events,
            outcomes_tx,
            outcomes_rx,
            in_flight: 0,
            next_save_seq: 1,
            applied_refresh_seq: 0,
            applied_save_seq: HashMap::new(),
            input_mode: InputMode::Normal,
            filter_input: String::new(),
            status: None,
            error: None,
            buffering: false,
            should_quit: false,
        })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn course_id(&self) -> &str {
        &self.course_id
    }

    pub fn engine(&self) -> &PlaybackEngine<D> {
        &self.engine
    }

    pub fn sequencer(&self) -> &LectureSequencer {
        &self.sequencer
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn summary(&self) -> &ProgressSummary {
        &self.summary
    }

    pub fn input_mode(&self) -> &InputMode {
        &self.input_mode
    }

    /// Filter text typed so far
    pub fn filter_input(&self) -> &str {
        &self.filter_input
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Saves and refreshes still running
    pub fn pending_syncs(&self) -> usize {
        self.in_flight
    }

    // -------------------------------------------------------------------------
    // Event loop
    // -------------------------------------------------------------------------

    /// Drive the session until quit or the input stream ends, calling
    /// `on_update` after every processed message
    pub async fn run<F>(&mut self, mut input: mpsc::UnboundedReceiver<Input>, mut on_update: F)
    where
        F: FnMut(&Self),
    {
        on_update(self);
        while !self.should_quit {
            let deadline = self.engine.start_deadline();
            tokio::select! {
                Some(tagged) = self.events.recv() => self.on_device_event(tagged),
                Some(outcome) = self.outcomes_rx.recv() => self.on_sync_outcome(outcome),
                _ = async {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => pending::<()>().await,
                    }
                } => self.on_watchdog(),
                message = input.recv() => match message {
                    Some(Input::Key(key)) => {
                        self.handle_key(key);
                    }
                    Some(Input::Command(command)) => self.apply(command),
                    None => self.should_quit = true,
                },
            }
            on_update(self);
        }
        self.shutdown().await;
    }

    /// Apply every device event already queued
    pub fn drain_device_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(tagged) = self.events.try_recv() {
            self.on_device_event(tagged);
            applied += 1;
        }
        applied
    }

    /// Wait for every outstanding save to report back and apply it
    pub async fn settle(&mut self) {
        while self.in_flight > 0 {
            match self.outcomes_rx.recv().await {
                Some(outcome) => self.on_sync_outcome(outcome),
                None => break,
            }
        }
    }

    /// Fire the start watchdog if it is due
    pub fn on_watchdog(&mut self) {
        if let Some(EngineEvent::Error(e)) = self.engine.check_start_timeout() {
            self.buffering = false;
            self.error = Some(e.to_string());
        }
    }

    /// Flush the live lecture and release the device
    pub async fn shutdown(&mut self) {
        self.retire_lecture(true);
        if tokio::time::timeout(SHUTDOWN_GRACE, self.settle()).await.is_err() {
            warn!(pending = self.in_flight, "shutdown with saves still in flight");
        }
    }

    // -------------------------------------------------------------------------
    // Keyboard
    // -------------------------------------------------------------------------

    /// Handle a key press; returns whether it was consumed
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.apply(UserCommand::Quit);
            return true;
        }

        match self.input_mode {
            InputMode::Filtering => self.handle_filter_key(key),
            InputMode::Normal => match command_for_key(key) {
                Some(command) => {
                    self.apply(command);
                    true
                }
                None if key.code == KeyCode::Char('/') => {
                    self.input_mode = InputMode::Filtering;
                    true
                }
                None => false,
            },
        }
    }

    fn handle_filter_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => {
                self.filter_input.clear();
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Enter => self.input_mode = InputMode::Normal,
            KeyCode::Backspace => {
                self.filter_input.pop();
            }
            KeyCode::Char(c) => self.filter_input.push(c),
            _ => return false,
        }
        let query = self.filter_input.clone();
        self.apply(UserCommand::Filter(query));
        true
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    /// Apply a learner command
    pub fn apply(&mut self, command: UserCommand) {
        self.error = None;
        match command {
            UserCommand::TogglePlay => self.toggle_play(),
            UserCommand::Seek(delta) => match self.engine.seek_relative(delta) {
                Ok(Some(target)) => debug!(target, "seeked"),
                Ok(None) => {}
                Err(e) => self.status = Some(e.to_string()),
            },
            UserCommand::FocusNext => self.sequencer.focus_next(),
            UserCommand::FocusPrev => self.sequencer.focus_prev(),
            UserCommand::FocusActive => {
                self.sequencer.focus_active();
            }
            UserCommand::ActivateFocused => {
                if let Some(decision) = self.sequencer.activate_focused() {
                    self.after_switch(decision, true);
                }
            }
            UserCommand::NextLecture => {
                if let Some(next) = self.sequencer.next_lecture().map(|l| l.lecture_id.clone()) {
                    let decision = self.sequencer.request_switch(&next, false);
                    self.after_switch(decision, true);
                }
            }
            UserCommand::SetRate(rate) => match self.engine.set_rate(rate) {
                Ok(()) => self.status = Some(format!("Speed {}", rate)),
                Err(e) => self.status = Some(e.to_string()),
            },
            UserCommand::Retry => self.retry(),
            UserCommand::Filter(query) => self.sequencer.set_filter(&query),
            UserCommand::Quit => self.should_quit = true,
        }
    }

    fn toggle_play(&mut self) {
        match self.engine.state() {
            EngineState::Idle | EngineState::Ended | EngineState::Errored(_) => {
                self.activate_current()
            }
            _ => {
                if let Err(e) = self.engine.toggle() {
                    self.status = Some(e.to_string());
                }
            }
        }
    }

    /// Manual retry: reset the engine and start the active lecture again
    fn retry(&mut self) {
        info!("manual retry");
        self.engine.reset();
        self.activate_current();
    }

    /// Start playing the active lecture
    fn activate_current(&mut self) {
        let Some(lecture) = self.sequencer.active().cloned() else {
            self.error = Some("No lecture selected".to_string());
            return;
        };

        let source = match self.resolver.resolve(&lecture.lecture_id, lecture.source_ref.as_deref()) {
            Ok(source) => source,
            Err(e) => {
                self.error = Some(e.to_string());
                return;
            }
        };

        let resume_at = self.resume_position(&lecture);
        if let Some(flush) = self.tracker.flush() {
            self.spawn_save(flush);
        }
        match self.engine.activate(source, resume_at) {
            Ok(session) => {
                self.tracker.begin(
                    session,
                    self.course_id.clone(),
                    lecture.lecture_id.clone(),
                    lecture.video_ref.clone(),
                );
                self.buffering = true;
                self.status = Some(format!("Loading {}", lecture));
            }
            Err(e) => {
                self.tracker.end();
                self.error = Some(e.to_string());
            }
        }
    }

    /// Where to start the active lecture: the last tick of this view,
    /// else the saved position. Completed lectures replay from the start.
    fn resume_position(&self, lecture: &Lecture) -> f64 {
        if let Some(tick) = self
            .tracker
            .session()
            .filter(|s| s.lecture_id == lecture.lecture_id)
            .and_then(|s| s.last_tick)
        {
            if self.engine.state() != &EngineState::Ended {
                return tick.position;
            }
        }
        if self.sequencer.is_complete(&lecture.lecture_id) {
            return 0.0;
        }
        self.sequencer.resume_position(&lecture.lecture_id)
    }

    fn after_switch(&mut self, decision: SwitchDecision, flush: bool) {
        match decision {
            SwitchDecision::Switched { to, .. } => {
                self.retire_lecture(flush);
                let title = self
                    .sequencer
                    .lecture(&to)
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| to.to_string());
                self.status = Some(format!("Up next: {}", title));
            }
            SwitchDecision::Denied { lecture } => {
                let title = self
                    .sequencer
                    .lecture(&lecture)
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| lecture.to_string());
                self.error = Some(format!("{} is locked. Finish the previous lecture first.", title));
            }
            SwitchDecision::Unknown { lecture } => {
                self.error = Some(format!("Unknown lecture {}", lecture));
            }
            SwitchDecision::AlreadyActive => {}
        }
    }

    /// Tear down the playing lecture, saving its last tick first
    fn retire_lecture(&mut self, flush: bool) {
        if flush {
            if let Some(save) = self.tracker.flush() {
                self.spawn_save(save);
            }
        }
        self.tracker.end();
        self.engine.dispose();
        self.buffering = false;
    }

    // -------------------------------------------------------------------------
    // Engine and sync events
    // -------------------------------------------------------------------------

    /// Route a device event through the engine and act on what comes out
    pub fn on_device_event(&mut self, tagged: TaggedEvent) {
        let session = tagged.session;
        for event in self.engine.handle(tagged) {
            match event {
                EngineEvent::Ready => {
                    self.error = None;
                    self.status = self.sequencer.active().map(|l| format!("Playing {}", l));
                }
                EngineEvent::Buffering(buffering) => self.buffering = buffering,
                EngineEvent::Tick(tick) => {
                    if let Some(save) = self.tracker.on_tick(session, tick) {
                        self.spawn_save(save);
                    }
                }
                EngineEvent::Ended(tick) => {
                    if let Some(save) = self.tracker.on_ended(session, tick) {
                        self.spawn_save(save);
                    }
                }
                EngineEvent::Error(e) => {
                    self.buffering = false;
                    self.error = Some(e.to_string());
                }
                EngineEvent::Telemetry(event) => self.spawn_telemetry(event),
            }
        }
    }

    fn on_sync_outcome(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Saved {
                seq,
                session,
                trigger,
                update,
                result,
                refreshed,
            } => {
                self.in_flight = self.in_flight.saturating_sub(1);

                // Saves finish out of order; never let an older one win
                if result.is_ok() {
                    let newest = self.applied_save_seq.entry(update.lecture_id.clone()).or_default();
                    if seq > *newest {
                        *newest = seq;
                        self.sequencer.record_progress(&update);
                    } else {
                        debug!(seq, lecture = %update.lecture_id, "stale save outcome");
                    }
                }
                if let Some(progress) = refreshed {
                    if seq > self.applied_refresh_seq {
                        self.applied_refresh_seq = seq;
                        self.sequencer.apply_progress(&progress.items);
                        self.summary = progress.summary;
                    } else {
                        debug!(seq, applied = self.applied_refresh_seq, "stale summary refresh");
                    }
                }

                let live = self.tracker.session().map(|s| s.id) == Some(session);
                if trigger.is_terminal() && live {
                    self.advance_after_completion();
                }
            }
        }
    }

    fn advance_after_completion(&mut self) {
        match self.sequencer.advance_after_completion() {
            Some(decision) => self.after_switch(decision, false),
            None => {
                self.status = Some("Course complete".to_string());
            }
        }
    }

    fn spawn_save(&mut self, save: SaveRequest) {
        let SaveRequest {
            session,
            trigger,
            update,
        } = save;
        let client = self.client.clone();
        let tx = self.outcomes_tx.clone();
        let course_id = self.course_id.clone();
        let seq = self.next_save_seq;
        self.next_save_seq += 1;
        self.in_flight += 1;

        tokio::spawn(async move {
            let result = client.persist_progress(&update).await;
            let refreshed = match &result {
                Ok(_) => match client.fetch_progress(&course_id).await {
                    Ok(progress) => Some(progress),
                    Err(e) => {
                        debug!(error = %e, "summary refresh failed");
                        None
                    }
                },
                Err(e) => {
                    warn!(%trigger, lecture = %update.lecture_id, error = %e, "progress save failed");
                    None
                }
            };
            let _ = tx.send(SyncOutcome::Saved {
                seq,
                session,
                trigger,
                update,
                result: result.map_err(|e| e.to_string()),
                refreshed,
            });
        });
    }

    fn spawn_telemetry(&self, event: PlaybackTelemetry) {
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.log_event(&event).await {
                debug!(error = %e, "telemetry dropped");
            }
        });
    }
}

/// Map a key press in normal mode to a command
pub fn command_for_key(key: KeyEvent) -> Option<UserCommand> {
    let command = match key.code {
        KeyCode::Char(' ') => UserCommand::TogglePlay,
        KeyCode::Left => UserCommand::Seek(-SEEK_STEP_SECS),
        KeyCode::Right => UserCommand::Seek(SEEK_STEP_SECS),
        KeyCode::Up | KeyCode::Char('k') => UserCommand::FocusPrev,
        KeyCode::Down | KeyCode::Char('j') => UserCommand::FocusNext,
        KeyCode::Enter => UserCommand::ActivateFocused,
        KeyCode::Char('n') => UserCommand::NextLecture,
        KeyCode::Char('c') => UserCommand::FocusActive,
        KeyCode::Char('r') => UserCommand::Retry,
        KeyCode::Char('q') | KeyCode::Esc => UserCommand::Quit,
        KeyCode::Char(c @ '1'..='5') => {
            let index = c as usize - '1' as usize;
            UserCommand::SetRate(PlaybackRate::ALL[index])
        }
        _ => return None,
    };
    Some(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_key_bindings() {
        assert_eq!(command_for_key(key(KeyCode::Char(' '))), Some(UserCommand::TogglePlay));
        assert_eq!(command_for_key(key(KeyCode::Left)), Some(UserCommand::Seek(-10.0)));
        assert_eq!(command_for_key(key(KeyCode::Right)), Some(UserCommand::Seek(10.0)));
        assert_eq!(command_for_key(key(KeyCode::Enter)), Some(UserCommand::ActivateFocused));
        assert_eq!(command_for_key(key(KeyCode::Char('c'))), Some(UserCommand::FocusActive));
        assert_eq!(command_for_key(key(KeyCode::Char('x'))), None);
    }

    #[test]
    fn test_rate_keys() {
        assert_eq!(
            command_for_key(key(KeyCode::Char('1'))),
            Some(UserCommand::SetRate(PlaybackRate::Slow))
        );
        assert_eq!(
            command_for_key(key(KeyCode::Char('5'))),
            Some(UserCommand::SetRate(PlaybackRate::Double))
        );
        assert_eq!(command_for_key(key(KeyCode::Char('6'))), None);
    }
}
