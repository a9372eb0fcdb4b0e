//! Playback infrastructure
//!
//! - Resolver: lecture to credentialed stream URL
//! - Device: playback device capability trait and its event channel
//! - Backend: segmented vs direct source handling and fault recovery
//! - Engine: single-session playback state machine
//! - Tracker: decides which playback samples get persisted
//! - Mpv: mpv over JSON IPC (unix only)

pub mod backend;
pub mod clock;
pub mod device;
pub mod engine;
#[cfg(unix)]
pub mod mpv;
pub mod resolver;
pub mod tracker;

pub use backend::{backend_for, DirectBackend, FaultOutcome, MediaBackend, SegmentedBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use device::{
    event_channel, BufferLimits, DeviceError, DeviceEvent, DeviceFault, EventReceiver,
    EventSender, EventSink, FaultClass, LoadRequest, PlaybackDevice, TaggedEvent,
};
pub use engine::{EngineConfig, EngineError, EngineEvent, EngineState, PlaybackEngine, PlaybackError};
#[cfg(unix)]
pub use mpv::MpvDevice;
pub use resolver::{PlayableSource, ResolveError, SourceResolver};
pub use tracker::{ProgressTracker, SavePolicy, SaveRequest, SaveTrigger, TrackedSession};
