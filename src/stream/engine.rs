//! Playback engine
//!
//! Owns the playback device and at most one decoding session. Device events
//! come in tagged with the session that produced them; anything tagged with
//! a retired session is dropped before it can touch state. The engine turns
//! raw device events into [`EngineEvent`]s for the learning session.
//!
//! ```text
//! Idle -> Initializing -> Attaching -> Ready -> Playing <-> Paused -> Ended
//!                                  \-> Errored(SlowStart) -> Ready (late start)
//!           any fatal fault -> Errored(Fatal)        reset() -> Idle
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::backend::{backend_for, FaultOutcome, MediaBackend, StartRequest};
use super::clock::Clock;
use super::device::{BufferLimits, DeviceError, DeviceEvent, EventSender, EventSink, PlaybackDevice, TaggedEvent};
use super::resolver::PlayableSource;
use crate::models::{PlaybackRate, PlaybackTelemetry, SessionId, TelemetryKind, Tick};

/// Engine tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub buffer: BufferLimits,
    /// How long to wait for readiness before reporting a slow start
    pub start_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer: BufferLimits::default(),
            start_timeout: Duration::from_secs(30),
        }
    }
}

/// User-visible playback failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// No readiness signal within the start timeout; the source may be fine
    SlowStart,
    /// Session destroyed
    Fatal(String),
}

impl fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackError::SlowStart => {
                write!(f, "Video is taking longer than expected. Please try again.")
            }
            PlaybackError::Fatal(msg) => write!(f, "Playback error: {}", msg),
        }
    }
}

/// Engine lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Idle,
    Initializing,
    Attaching,
    Ready,
    Playing,
    Paused,
    Ended,
    Errored(PlaybackError),
}

impl EngineState {
    /// Waiting for the device to become ready
    pub fn is_starting(&self) -> bool {
        matches!(
            self,
            EngineState::Initializing
                | EngineState::Attaching
                | EngineState::Errored(PlaybackError::SlowStart)
        )
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Idle => write!(f, "Idle"),
            EngineState::Initializing => write!(f, "Initializing..."),
            EngineState::Attaching => write!(f, "Loading..."),
            EngineState::Ready => write!(f, "Ready"),
            EngineState::Playing => write!(f, "▶ Playing"),
            EngineState::Paused => write!(f, "⏸ Paused"),
            EngineState::Ended => write!(f, "Ended"),
            EngineState::Errored(e) => write!(f, "{}", e),
        }
    }
}

/// What the engine reports to its consumer
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Ready,
    Tick(Tick),
    Buffering(bool),
    Ended(Tick),
    Error(PlaybackError),
    Telemetry(PlaybackTelemetry),
}

/// Errors from transport calls
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No active playback session")]
    NotActive,
    #[error(transparent)]
    Device(#[from] DeviceError),
}

struct ActiveStream {
    session: SessionId,
    source: PlayableSource,
    backend: Box<dyn MediaBackend>,
    start_deadline: Option<Instant>,
}

/// Single-session playback engine over a device
pub struct PlaybackEngine<D: PlaybackDevice> {
    device: D,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    events: EventSender,
    state: EngineState,
    active: Option<ActiveStream>,
    rate: PlaybackRate,
    last_tick: Tick,
    buffering: bool,
}

impl<D: PlaybackDevice> PlaybackEngine<D> {
    /// Create an idle engine; device events must be sent on `events`
    pub fn new(device: D, config: EngineConfig, clock: Arc<dyn Clock>, events: EventSender) -> Self {
        Self {
            device,
            config,
            clock,
            events,
            state: EngineState::Idle,
            active: None,
            rate: PlaybackRate::Normal,
            last_tick: Tick::default(),
            buffering: false,
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Id of the live decoding session
    pub fn session(&self) -> Option<SessionId> {
        self.active.as_ref().map(|a| a.session)
    }

    pub fn source(&self) -> Option<&PlayableSource> {
        self.active.as_ref().map(|a| &a.source)
    }

    pub fn last_tick(&self) -> Tick {
        self.last_tick
    }

    pub fn rate(&self) -> PlaybackRate {
        self.rate
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// When the slow-start watchdog fires, if armed
    pub fn start_deadline(&self) -> Option<Instant> {
        self.active.as_ref().and_then(|a| a.start_deadline)
    }

    /// Start a new decoding session, tearing down the previous one first
    pub fn activate(&mut self, source: PlayableSource, resume_at: f64) -> Result<SessionId, EngineError> {
        self.dispose();

        self.state = EngineState::Initializing;
        let session = SessionId::new();
        let mut backend = backend_for(&source, self.config.buffer);
        info!(%session, segmented = source.is_segmented, resume_at, "activating playback");

        let request = StartRequest {
            url: source.url.clone(),
            resume_at: resume_at.max(0.0),
            rate: self.rate.multiplier(),
            sink: EventSink::new(session, self.events.clone()),
        };
        if let Err(e) = backend.start(&mut self.device, request) {
            warn!(%session, error = %e, "device refused source");
            self.device.unload();
            self.state = EngineState::Errored(PlaybackError::Fatal(e.to_string()));
            return Err(e.into());
        }

        self.last_tick = Tick::new(resume_at.max(0.0), 0.0);
        self.buffering = true;
        self.state = EngineState::Attaching;
        self.active = Some(ActiveStream {
            session,
            source,
            backend,
            start_deadline: Some(self.clock.now() + self.config.start_timeout),
        });
        Ok(session)
    }

    /// Apply a device event, returning what the consumer should see
    pub fn handle(&mut self, tagged: TaggedEvent) -> Vec<EngineEvent> {
        let mut out = Vec::new();
        let Some(active) = self.active.as_mut() else {
            trace!(session = %tagged.session, "event with no active session dropped");
            return out;
        };
        if active.session != tagged.session {
            trace!(session = %tagged.session, "stale event dropped");
            return out;
        }

        match tagged.event {
            DeviceEvent::SourceLoaded | DeviceEvent::CanPlay => {
                active.backend.on_recovered();
                if self.buffering {
                    self.buffering = false;
                    out.push(EngineEvent::Buffering(false));
                }
                if self.state.is_starting() {
                    active.start_deadline = None;
                    self.state = EngineState::Ready;
                    debug!(session = %active.session, "ready");
                    out.push(EngineEvent::Ready);
                    if let Err(e) = self.device.play() {
                        debug!(error = %e, "autoplay refused");
                    }
                }
            }
            DeviceEvent::Playing => {
                active.backend.on_recovered();
                if self.state.is_starting() {
                    active.start_deadline = None;
                    out.push(EngineEvent::Ready);
                }
                if self.buffering {
                    self.buffering = false;
                    out.push(EngineEvent::Buffering(false));
                }
                if self.state != EngineState::Playing {
                    self.state = EngineState::Playing;
                    out.push(EngineEvent::Telemetry(PlaybackTelemetry {
                        event: TelemetryKind::Play,
                        position: self.last_tick.position,
                        duration: None,
                    }));
                }
            }
            DeviceEvent::Paused => {
                if self.state == EngineState::Playing {
                    self.state = EngineState::Paused;
                    out.push(EngineEvent::Telemetry(PlaybackTelemetry {
                        event: TelemetryKind::Pause,
                        position: self.last_tick.position,
                        duration: None,
                    }));
                }
            }
            DeviceEvent::Waiting => {
                if !self.buffering {
                    self.buffering = true;
                    out.push(EngineEvent::Buffering(true));
                }
            }
            DeviceEvent::TimeUpdate { position, duration } => {
                self.last_tick.position = position.max(0.0);
                if let Some(d) = duration.filter(|d| *d > 0.0) {
                    self.last_tick.duration = d;
                }
                if self.last_tick.duration > 0.0 {
                    out.push(EngineEvent::Tick(self.last_tick));
                }
            }
            DeviceEvent::Ended { position, duration } => {
                if duration > 0.0 {
                    self.last_tick.duration = duration;
                }
                self.last_tick.position = position.max(0.0);
                self.state = EngineState::Ended;
                self.buffering = false;
                out.push(EngineEvent::Telemetry(PlaybackTelemetry {
                    event: TelemetryKind::Complete,
                    position: self.last_tick.position,
                    duration: Some(self.last_tick.duration),
                }));
                out.push(EngineEvent::Ended(self.last_tick));
            }
            DeviceEvent::Fault(fault) => {
                let position = self.last_tick.position;
                match active.backend.on_fault(&mut self.device, &fault, position) {
                    FaultOutcome::Recovering(class) => {
                        warn!(session = %active.session, %class, message = %fault.message, "recovering from fault");
                        if !self.buffering {
                            self.buffering = true;
                            out.push(EngineEvent::Buffering(true));
                        }
                    }
                    FaultOutcome::Fatal => {
                        warn!(session = %active.session, class = %fault.class, message = %fault.message, "fatal playback fault");
                        self.teardown();
                        let error = PlaybackError::Fatal(fault.message);
                        self.state = EngineState::Errored(error.clone());
                        out.push(EngineEvent::Error(error));
                    }
                }
            }
        }
        out
    }

    /// Fire the slow-start watchdog if its deadline has passed
    pub fn check_start_timeout(&mut self) -> Option<EngineEvent> {
        let now = self.clock.now();
        let active = self.active.as_mut()?;
        let deadline = active.start_deadline?;
        if now < deadline {
            return None;
        }
        active.start_deadline = None;
        if !matches!(self.state, EngineState::Initializing | EngineState::Attaching) {
            return None;
        }
        warn!(session = %active.session, "no readiness signal before start timeout");
        self.buffering = false;
        self.state = EngineState::Errored(PlaybackError::SlowStart);
        Some(EngineEvent::Error(PlaybackError::SlowStart))
    }

    pub fn play(&mut self) -> Result<(), EngineError> {
        self.require_active()?;
        self.device.play()?;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), EngineError> {
        self.require_active()?;
        self.device.pause()?;
        Ok(())
    }

    /// Toggle between playing and paused
    pub fn toggle(&mut self) -> Result<(), EngineError> {
        if self.state == EngineState::Playing {
            self.pause()
        } else {
            self.play()
        }
    }

    /// Seek by `delta` seconds, clamped to the media; `None` when the duration is unknown
    pub fn seek_relative(&mut self, delta: f64) -> Result<Option<f64>, EngineError> {
        self.require_active()?;
        let duration = self.last_tick.duration;
        if duration <= 0.0 {
            return Ok(None);
        }
        let target = (self.last_tick.position + delta).clamp(0.0, duration);
        self.device.seek(target)?;
        self.last_tick.position = target;
        Ok(Some(target))
    }

    /// Change the playback rate; remembered for later sessions
    pub fn set_rate(&mut self, rate: PlaybackRate) -> Result<(), EngineError> {
        self.rate = rate;
        if self.active.is_some() {
            self.device.set_rate(rate.multiplier())?;
        }
        Ok(())
    }

    /// Release the decoding session. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        self.teardown();
        self.state = EngineState::Idle;
        self.buffering = false;
    }

    /// Dispose and forget the last position (manual retry path)
    pub fn reset(&mut self) {
        self.dispose();
        self.last_tick = Tick::default();
    }

    fn teardown(&mut self) {
        if let Some(mut active) = self.active.take() {
            debug!(session = %active.session, "tearing down playback session");
            active.backend.stop(&mut self.device);
        }
    }

    fn require_active(&self) -> Result<(), EngineError> {
        if self.active.is_some() {
            Ok(())
        } else {
            Err(EngineError::NotActive)
        }
    }
}

impl<D: PlaybackDevice> Drop for PlaybackEngine<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}
