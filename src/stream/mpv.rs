//! mpv playback device
//!
//! Drives a local mpv process over its JSON IPC socket. mpv is started idle
//! and paused; sources are loaded with `loadfile` and observed properties
//! (`time-pos`, `duration`, `pause`, `paused-for-cache`) are translated into
//! [`DeviceEvent`]s for whichever session currently owns the device.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::device::{
    BufferLimits, DeviceError, DeviceEvent, DeviceFault, EventSink, FaultClass, LoadRequest,
    PlaybackDevice,
};

/// Default player binary
pub const DEFAULT_MPV: &str = "mpv";

const OBSERVE_TIME_POS: u64 = 1;
const OBSERVE_DURATION: u64 = 2;
const OBSERVE_PAUSE: u64 = 3;
const OBSERVE_CACHE_PAUSE: u64 = 4;

/// mpv defaults restored for natively buffered sources
const NATIVE_MAX_BYTES: &str = "150MiB";
const NATIVE_READAHEAD_SECS: &str = "1";

type Subscription = Arc<Mutex<Option<EventSink>>>;

/// `loadfile` commands sent whose `start-file` has not been read back yet
type PendingLoads = Arc<AtomicUsize>;

/// Playback device backed by an mpv child process
pub struct MpvDevice {
    binary: String,
    socket_path: PathBuf,
    child: Option<Child>,
    commands: mpsc::UnboundedSender<Value>,
    subscription: Subscription,
    pending_loads: PendingLoads,
    current_url: Option<String>,
}

impl MpvDevice {
    /// Check whether the binary can be found
    pub async fn is_available(binary: &str) -> bool {
        if binary.contains('/') {
            return Path::new(binary).exists();
        }
        Command::new("which")
            .arg(binary)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Start mpv and connect to its IPC socket
    pub async fn spawn(binary: &str) -> Result<Self, DeviceError> {
        let socket_path =
            std::env::temp_dir().join(format!("lectern-mpv-{}.sock", uuid::Uuid::new_v4()));

        let child = Command::new(binary)
            .arg("--idle=yes")
            .arg("--pause=yes")
            .arg("--keep-open=no")
            .arg("--force-window=immediate")
            .arg("--no-terminal")
            .arg(format!("--input-ipc-server={}", socket_path.display()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    DeviceError::Rejected(format!("Player '{}' not found. Install it first.", binary))
                } else {
                    DeviceError::Io(e)
                }
            })?;

        let stream = connect(&socket_path).await?;
        let (read_half, mut write_half) = stream.into_split();

        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                let mut line = command.to_string();
                line.push('\n');
                if let Err(e) = write_half.write_all(line.as_bytes()).await {
                    warn!(error = %e, "mpv ipc write failed");
                    break;
                }
            }
        });

        let subscription: Subscription = Arc::new(Mutex::new(None));
        let reader_sub = subscription.clone();
        let pending_loads: PendingLoads = Arc::new(AtomicUsize::new(0));
        let reader_pending = pending_loads.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            let mut observed = Observed::default();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let Ok(message) = serde_json::from_str::<Value>(&line) else {
                            continue;
                        };
                        if superseded(&reader_pending, &message) {
                            trace!(%message, "dropped message from replaced file");
                            continue;
                        }
                        if let Some(event) = observed.translate(&message) {
                            deliver(&reader_sub, event);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "mpv ipc read failed");
                        break;
                    }
                }
            }
            debug!("mpv ipc closed");
            deliver(
                &reader_sub,
                DeviceEvent::Fault(DeviceFault::new(FaultClass::Other, "player exited")),
            );
        });

        let device = Self {
            binary: binary.to_string(),
            socket_path,
            child: Some(child),
            commands: tx,
            subscription,
            pending_loads,
            current_url: None,
        };
        for (id, name) in [
            (OBSERVE_TIME_POS, "time-pos"),
            (OBSERVE_DURATION, "duration"),
            (OBSERVE_PAUSE, "pause"),
            (OBSERVE_CACHE_PAUSE, "paused-for-cache"),
        ] {
            device.command(json!(["observe_property", id, name]))?;
        }
        debug!(binary, socket = %device.socket_path.display(), "mpv started");
        Ok(device)
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// OS process id of the player, if still running
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    fn command(&self, args: Value) -> Result<(), DeviceError> {
        trace!(%args, "mpv command");
        self.commands
            .send(json!({ "command": args }))
            .map_err(|_| DeviceError::NotRunning)
    }

    fn set_property(&self, name: &str, value: Value) -> Result<(), DeviceError> {
        self.command(json!(["set_property", name, value]))
    }

    fn require_source(&self) -> Result<&str, DeviceError> {
        self.current_url.as_deref().ok_or(DeviceError::NoSource)
    }

    fn subscribe(&self, sink: Option<EventSink>) {
        let mut current = self.subscription.lock().unwrap_or_else(|e| e.into_inner());
        *current = sink;
    }

    fn open(&self, url: &str, start: Option<f64>) -> Result<(), DeviceError> {
        let start = match start {
            Some(secs) if secs > 0.0 => json!(format!("{:.3}", secs)),
            _ => json!("none"),
        };
        self.set_property("start", start)?;
        self.pending_loads.fetch_add(1, Ordering::SeqCst);
        let sent = self.command(json!(["loadfile", url, "replace"]));
        if sent.is_err() {
            self.pending_loads.fetch_sub(1, Ordering::SeqCst);
        }
        sent
    }
}

impl PlaybackDevice for MpvDevice {
    fn load(&mut self, request: LoadRequest) -> Result<(), DeviceError> {
        self.subscribe(Some(request.sink));
        self.set_property("pause", json!(true))?;

        match request.buffer {
            Some(BufferLimits {
                max_bytes,
                max_secs,
                max_max_secs,
            }) => {
                self.set_property("demuxer-max-bytes", json!(max_bytes.to_string()))?;
                self.set_property("demuxer-readahead-secs", json!(max_secs.to_string()))?;
                self.set_property("cache-secs", json!(max_max_secs.to_string()))?;
            }
            None => {
                self.set_property("demuxer-max-bytes", json!(NATIVE_MAX_BYTES))?;
                self.set_property("demuxer-readahead-secs", json!(NATIVE_READAHEAD_SECS))?;
            }
        }
        self.set_property("speed", json!(request.rate))?;

        self.open(&request.url, request.start_position)?;
        self.current_url = Some(request.url);
        Ok(())
    }

    fn reload(&mut self, position: f64) -> Result<(), DeviceError> {
        let url = self.require_source()?.to_string();
        self.open(&url, Some(position))
    }

    fn recover_decoder(&mut self, position: f64) -> Result<(), DeviceError> {
        // Software decoding; `start` persists across loads so it must be reset
        let url = self.require_source()?.to_string();
        self.set_property("hwdec", json!("no"))?;
        self.open(&url, Some(position))
    }

    fn play(&mut self) -> Result<(), DeviceError> {
        self.require_source()?;
        self.set_property("pause", json!(false))
    }

    fn pause(&mut self) -> Result<(), DeviceError> {
        self.require_source()?;
        self.set_property("pause", json!(true))
    }

    fn seek(&mut self, position: f64) -> Result<(), DeviceError> {
        self.require_source()?;
        self.command(json!(["seek", position, "absolute"]))
    }

    fn set_rate(&mut self, rate: f64) -> Result<(), DeviceError> {
        self.set_property("speed", json!(rate))
    }

    fn unload(&mut self) {
        self.subscribe(None);
        if self.current_url.take().is_some() {
            let _ = self.command(json!(["stop"]));
        }
    }
}

impl Drop for MpvDevice {
    fn drop(&mut self) {
        let _ = self.command(json!(["quit"]));
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

async fn connect(path: &Path) -> Result<UnixStream, DeviceError> {
    let mut last_err = None;
    for _ in 0..50 {
        match UnixStream::connect(path).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Err(last_err.map(DeviceError::Io).unwrap_or(DeviceError::NotRunning))
}

fn deliver(subscription: &Subscription, event: DeviceEvent) {
    let sink = subscription
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone();
    if let Some(sink) = sink {
        sink.emit(event);
    }
}

/// Whether a message still belongs to a file that a newer `loadfile`
/// replaced. Every `start-file` settles one outstanding load.
fn superseded(pending: &AtomicUsize, message: &Value) -> bool {
    if message.get("event").and_then(Value::as_str) == Some("start-file") {
        let _ = pending.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        return false;
    }
    message.get("event").is_some() && pending.load(Ordering::SeqCst) > 0
}

/// Property values remembered between IPC messages
#[derive(Debug, Default)]
struct Observed {
    position: f64,
    duration: Option<f64>,
    file_open: bool,
}

impl Observed {
    fn translate(&mut self, message: &Value) -> Option<DeviceEvent> {
        match message.get("event").and_then(Value::as_str)? {
            "start-file" => {
                self.file_open = false;
                self.duration = None;
                None
            }
            "file-loaded" => {
                self.file_open = true;
                Some(DeviceEvent::SourceLoaded)
            }
            "playback-restart" => Some(DeviceEvent::CanPlay),
            "end-file" => self.end_file(message),
            "property-change" => self.property_change(message),
            _ => None,
        }
    }

    fn end_file(&mut self, message: &Value) -> Option<DeviceEvent> {
        self.file_open = false;
        match message.get("reason").and_then(Value::as_str)? {
            "eof" => Some(DeviceEvent::Ended {
                position: self.duration.unwrap_or(self.position),
                duration: self.duration.unwrap_or(0.0),
            }),
            "error" => {
                let detail = message
                    .get("file_error")
                    .and_then(Value::as_str)
                    .unwrap_or("playback failed");
                Some(DeviceEvent::Fault(DeviceFault::new(
                    FaultClass::classify(detail),
                    detail,
                )))
            }
            _ => None,
        }
    }

    fn property_change(&mut self, message: &Value) -> Option<DeviceEvent> {
        let data = message.get("data");
        match message.get("id").and_then(Value::as_u64)? {
            OBSERVE_TIME_POS => {
                self.position = data.and_then(Value::as_f64)?;
                Some(DeviceEvent::TimeUpdate {
                    position: self.position,
                    duration: self.duration,
                })
            }
            OBSERVE_DURATION => {
                self.duration = data.and_then(Value::as_f64).filter(|d| *d > 0.0);
                None
            }
            OBSERVE_PAUSE if self.file_open => match data.and_then(Value::as_bool)? {
                true => Some(DeviceEvent::Paused),
                false => Some(DeviceEvent::Playing),
            },
            OBSERVE_CACHE_PAUSE if self.file_open => match data.and_then(Value::as_bool)? {
                true => Some(DeviceEvent::Waiting),
                false => Some(DeviceEvent::CanPlay),
            },
            _ => None,
        }
    }
}
