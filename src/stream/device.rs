//! Playback device capability interface
//!
//! A device is anything that can decode a URL and report what it is doing:
//! mpv over IPC in the binary, a recording fake in tests. Transport calls are
//! synchronous and non-blocking; everything the device observes comes back
//! as [`DeviceEvent`]s on the [`EventSink`] handed over at load time, tagged
//! with the session that requested the load.

use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::SessionId;

/// Coarse classification of a device fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// Transport/network failure while fetching media
    Network,
    /// Demux or decode failure
    Decode,
    /// Anything else
    Other,
}

impl FaultClass {
    /// Classify a free-form device error message
    pub fn classify(message: &str) -> Self {
        let m = message.to_lowercase();
        if ["network", "http", "tcp", "timeout", "timed out", "connection", "loading failed"]
            .iter()
            .any(|k| m.contains(k))
        {
            FaultClass::Network
        } else if ["decod", "demux", "codec", "unrecognized file format", "corrupt"]
            .iter()
            .any(|k| m.contains(k))
        {
            FaultClass::Decode
        } else {
            FaultClass::Other
        }
    }
}

impl fmt::Display for FaultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultClass::Network => write!(f, "network"),
            FaultClass::Decode => write!(f, "decode"),
            FaultClass::Other => write!(f, "other"),
        }
    }
}

/// A fault reported by the device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceFault {
    pub class: FaultClass,
    pub message: String,
}

impl DeviceFault {
    pub fn new(class: FaultClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }
}

/// Something the device observed
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// Source opened (manifest parsed / metadata loaded)
    SourceLoaded,
    /// Enough data buffered to play
    CanPlay,
    /// Playback position advanced
    TimeUpdate {
        position: f64,
        duration: Option<f64>,
    },
    /// Playback started or resumed
    Playing,
    /// Playback paused
    Paused,
    /// Playback stalled waiting for data
    Waiting,
    /// Reached the end of the media
    Ended { position: f64, duration: f64 },
    /// Device fault
    Fault(DeviceFault),
}

/// Device event tagged with the session that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub session: SessionId,
    pub event: DeviceEvent,
}

pub type EventSender = mpsc::UnboundedSender<TaggedEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TaggedEvent>;

/// Create the channel device events travel on
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Per-session event subscription handed to a device at load time
#[derive(Debug, Clone)]
pub struct EventSink {
    session: SessionId,
    tx: EventSender,
}

impl EventSink {
    pub fn new(session: SessionId, tx: EventSender) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Deliver an event, returns false once the receiver is gone
    pub fn emit(&self, event: DeviceEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                session: self.session,
                event,
            })
            .is_ok()
    }
}

/// Buffer budget for segmented sessions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferLimits {
    pub max_bytes: u64,
    pub max_secs: f64,
    pub max_max_secs: f64,
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            max_secs: 30.0,
            max_max_secs: 60.0,
        }
    }
}

/// Everything a device needs to open a source
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub url: String,
    /// Seconds to start from, `None` to start at the beginning
    pub start_position: Option<f64>,
    /// Buffer budget, `None` for native buffering
    pub buffer: Option<BufferLimits>,
    pub rate: f64,
    pub sink: EventSink,
}

/// Errors from device commands
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Playback device is not running")]
    NotRunning,
    #[error("No source loaded")]
    NoSource,
    #[error("Device I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device rejected command: {0}")]
    Rejected(String),
}

/// Capability set of a playback device
pub trait PlaybackDevice: Send {
    /// Open a source, replacing whatever was loaded
    fn load(&mut self, request: LoadRequest) -> Result<(), DeviceError>;

    /// Restart loading the current source from `position`
    fn reload(&mut self, position: f64) -> Result<(), DeviceError>;

    /// Reinitialize the decoder for the current source and continue from
    /// `position`
    fn recover_decoder(&mut self, position: f64) -> Result<(), DeviceError>;

    fn play(&mut self) -> Result<(), DeviceError>;

    fn pause(&mut self) -> Result<(), DeviceError>;

    /// Seek to an absolute position in seconds
    fn seek(&mut self, position: f64) -> Result<(), DeviceError>;

    fn set_rate(&mut self, rate: f64) -> Result<(), DeviceError>;

    /// Stop playback and drop the event subscription
    fn unload(&mut self);
}
