//! Media backends
//!
//! A backend decides how a source is put onto the device and what happens
//! when the device faults. Segmented (manifest) sources get a bounded buffer
//! and one internal recovery attempt per fault; direct sources are handed to
//! the device as-is and every fault is fatal.

use tracing::{debug, warn};

use super::device::{BufferLimits, DeviceError, DeviceFault, EventSink, FaultClass, LoadRequest, PlaybackDevice};
use super::resolver::PlayableSource;

/// What the engine should do after a backend saw a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// Recovery issued, keep the session
    Recovering(FaultClass),
    /// Destroy the session
    Fatal,
}

/// Parameters for starting a source on the device
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub url: String,
    /// Resume offset in seconds (0 = from the start)
    pub resume_at: f64,
    pub rate: f64,
    pub sink: EventSink,
}

/// Strategy for driving one source on a playback device
pub trait MediaBackend: Send {
    fn is_segmented(&self) -> bool;

    /// Put the source onto the device
    fn start(
        &mut self,
        device: &mut dyn PlaybackDevice,
        request: StartRequest,
    ) -> Result<(), DeviceError>;

    /// React to a device fault; `position` is the last known playback position
    fn on_fault(
        &mut self,
        device: &mut dyn PlaybackDevice,
        fault: &DeviceFault,
        position: f64,
    ) -> FaultOutcome;

    /// The device signalled readiness or playback again
    fn on_recovered(&mut self) {}

    /// True while a recovery is outstanding
    fn is_recovering(&self) -> bool {
        false
    }

    /// Release the source
    fn stop(&mut self, device: &mut dyn PlaybackDevice) {
        device.unload();
    }
}

/// Pick the backend for a resolved source
pub fn backend_for(source: &PlayableSource, limits: BufferLimits) -> Box<dyn MediaBackend> {
    if source.is_segmented {
        Box::new(SegmentedBackend::new(limits))
    } else {
        Box::new(DirectBackend)
    }
}

// =============================================================================
// Segmented
// =============================================================================

/// Manifest-based streaming with bounded buffering and internal recovery
#[derive(Debug)]
pub struct SegmentedBackend {
    limits: BufferLimits,
    recovering: Option<FaultClass>,
}

impl SegmentedBackend {
    pub fn new(limits: BufferLimits) -> Self {
        Self {
            limits,
            recovering: None,
        }
    }
}

impl MediaBackend for SegmentedBackend {
    fn is_segmented(&self) -> bool {
        true
    }

    fn start(
        &mut self,
        device: &mut dyn PlaybackDevice,
        request: StartRequest,
    ) -> Result<(), DeviceError> {
        self.recovering = None;
        device.load(LoadRequest {
            url: request.url,
            start_position: (request.resume_at > 0.0).then_some(request.resume_at),
            buffer: Some(self.limits),
            rate: request.rate,
            sink: request.sink,
        })
    }

    fn on_fault(
        &mut self,
        device: &mut dyn PlaybackDevice,
        fault: &DeviceFault,
        position: f64,
    ) -> FaultOutcome {
        if let Some(pending) = self.recovering {
            warn!(%pending, class = %fault.class, "fault during recovery");
            return FaultOutcome::Fatal;
        }

        let attempt = match fault.class {
            FaultClass::Network => device.reload(position),
            FaultClass::Decode => device.recover_decoder(position),
            FaultClass::Other => return FaultOutcome::Fatal,
        };

        match attempt {
            Ok(()) => {
                debug!(class = %fault.class, position, "recovery issued");
                self.recovering = Some(fault.class);
                FaultOutcome::Recovering(fault.class)
            }
            Err(e) => {
                warn!(class = %fault.class, error = %e, "recovery could not be issued");
                FaultOutcome::Fatal
            }
        }
    }

    fn on_recovered(&mut self) {
        if let Some(class) = self.recovering.take() {
            debug!(%class, "recovered");
        }
    }

    fn is_recovering(&self) -> bool {
        self.recovering.is_some()
    }
}

// =============================================================================
// Direct
// =============================================================================

/// Native playback of a single media URL
#[derive(Debug, Default)]
pub struct DirectBackend;

impl MediaBackend for DirectBackend {
    fn is_segmented(&self) -> bool {
        false
    }

    fn start(
        &mut self,
        device: &mut dyn PlaybackDevice,
        request: StartRequest,
    ) -> Result<(), DeviceError> {
        device.load(LoadRequest {
            url: request.url,
            start_position: (request.resume_at > 0.0).then_some(request.resume_at),
            buffer: None,
            rate: request.rate,
            sink: request.sink,
        })
    }

    fn on_fault(
        &mut self,
        _device: &mut dyn PlaybackDevice,
        _fault: &DeviceFault,
        _position: f64,
    ) -> FaultOutcome {
        FaultOutcome::Fatal
    }
}
