//! Shared fakes for integration tests: a recording playback device and an
//! in-memory learning platform.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lectern::api::{ApiError, SyncClient};
use lectern::models::{
    CourseProgress, Lecture, LectureId, LectureProgress, PersistAck, PlaybackTelemetry,
    ProgressSummary, ProgressUpdate,
};
use lectern::stream::{DeviceError, DeviceEvent, EventSink, LoadRequest, PlaybackDevice};

// =============================================================================
// Fake device
// =============================================================================

/// One call made on the fake device
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    Load {
        url: String,
        start_position: Option<f64>,
        buffered: bool,
        rate: f64,
    },
    Reload(f64),
    RecoverDecoder(f64),
    Play,
    Pause,
    Seek(f64),
    SetRate(f64),
    Unload,
}

#[derive(Default)]
struct DeviceLog {
    calls: Vec<DeviceCall>,
    sink: Option<EventSink>,
    refuse_load: bool,
}

/// Playback device that records calls and lets tests emit events
#[derive(Clone, Default)]
pub struct FakeDevice {
    log: Arc<Mutex<DeviceLog>>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `load` fail
    pub fn refuse_loads(&self) {
        self.log.lock().unwrap().refuse_load = true;
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.log.lock().unwrap().calls.clone()
    }

    pub fn loads(&self) -> Vec<DeviceCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, DeviceCall::Load { .. }))
            .collect()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().calls.clear();
    }

    /// Sink handed over by the most recent load
    pub fn sink(&self) -> Option<EventSink> {
        self.log.lock().unwrap().sink.clone()
    }

    /// Emit an event on the current subscription
    pub fn emit(&self, event: DeviceEvent) -> bool {
        match self.sink() {
            Some(sink) => sink.emit(event),
            None => false,
        }
    }

    fn record(&self, call: DeviceCall) {
        self.log.lock().unwrap().calls.push(call);
    }
}

impl PlaybackDevice for FakeDevice {
    fn load(&mut self, request: LoadRequest) -> Result<(), DeviceError> {
        self.record(DeviceCall::Load {
            url: request.url.clone(),
            start_position: request.start_position,
            buffered: request.buffer.is_some(),
            rate: request.rate,
        });
        let mut log = self.log.lock().unwrap();
        if log.refuse_load {
            return Err(DeviceError::Rejected("unsupported source".to_string()));
        }
        log.sink = Some(request.sink);
        Ok(())
    }

    fn reload(&mut self, position: f64) -> Result<(), DeviceError> {
        self.record(DeviceCall::Reload(position));
        Ok(())
    }

    fn recover_decoder(&mut self, position: f64) -> Result<(), DeviceError> {
        self.record(DeviceCall::RecoverDecoder(position));
        Ok(())
    }

    fn play(&mut self) -> Result<(), DeviceError> {
        self.record(DeviceCall::Play);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), DeviceError> {
        self.record(DeviceCall::Pause);
        Ok(())
    }

    fn seek(&mut self, position: f64) -> Result<(), DeviceError> {
        self.record(DeviceCall::Seek(position));
        Ok(())
    }

    fn set_rate(&mut self, rate: f64) -> Result<(), DeviceError> {
        self.record(DeviceCall::SetRate(rate));
        Ok(())
    }

    fn unload(&mut self) {
        self.record(DeviceCall::Unload);
        self.log.lock().unwrap().sink = None;
    }
}

// =============================================================================
// Fake learning platform
// =============================================================================

#[derive(Default)]
struct PlatformState {
    lectures: Vec<Lecture>,
    progress: Vec<LectureProgress>,
    enrolled: bool,
    fail_persist: bool,
    fail_progress: bool,
    persisted: Vec<ProgressUpdate>,
    telemetry: Vec<PlaybackTelemetry>,
    refresh_delays: VecDeque<Duration>,
}

/// In-memory progress store that behaves like the real endpoints
#[derive(Clone, Default)]
pub struct FakePlatform {
    state: Arc<Mutex<PlatformState>>,
}

impl FakePlatform {
    pub fn new(lectures: Vec<Lecture>) -> Self {
        let platform = Self::default();
        {
            let mut state = platform.state.lock().unwrap();
            state.lectures = lectures;
            state.enrolled = true;
        }
        platform
    }

    pub fn with_progress(self, progress: Vec<LectureProgress>) -> Self {
        self.state.lock().unwrap().progress = progress;
        self
    }

    pub fn not_enrolled(self) -> Self {
        self.state.lock().unwrap().enrolled = false;
        self
    }

    pub fn fail_persist(&self, fail: bool) {
        self.state.lock().unwrap().fail_persist = fail;
    }

    pub fn fail_progress(&self, fail: bool) {
        self.state.lock().unwrap().fail_progress = fail;
    }

    /// Hold the next progress reply for `delay`; it still reports the
    /// state at the time of the request
    pub fn delay_next_refresh(&self, delay: Duration) {
        self.state.lock().unwrap().refresh_delays.push_back(delay);
    }

    pub fn persisted(&self) -> Vec<ProgressUpdate> {
        self.state.lock().unwrap().persisted.clone()
    }

    pub fn telemetry(&self) -> Vec<PlaybackTelemetry> {
        self.state.lock().unwrap().telemetry.clone()
    }

    pub fn client(&self) -> Arc<dyn SyncClient> {
        Arc::new(self.clone())
    }

    fn summary(state: &PlatformState) -> ProgressSummary {
        let total = state.lectures.len() as u32;
        let total_duration: f64 = state.lectures.iter().map(|l| l.duration).sum();
        let watched: f64 = state
            .progress
            .iter()
            .map(|p| if p.is_complete { p.duration } else { p.position })
            .sum();
        ProgressSummary {
            total_lectures: total,
            known_durations: state.lectures.iter().filter(|l| l.duration > 0.0).count() as u32,
            total_duration,
            total_watched: watched,
            percent: if total_duration > 0.0 {
                (watched / total_duration).min(1.0)
            } else {
                0.0
            },
            remaining_seconds: (total_duration - watched).max(0.0),
        }
    }
}

#[async_trait]
impl SyncClient for FakePlatform {
    async fn fetch_progress(&self, _course_id: &str) -> Result<CourseProgress, ApiError> {
        let (reply, delay) = {
            let mut state = self.state.lock().unwrap();
            if state.fail_progress {
                return Err(ApiError::Server(503, "unavailable".to_string()));
            }
            let reply = CourseProgress {
                summary: Self::summary(&state),
                items: state.progress.clone(),
            };
            (reply, state.refresh_delays.pop_front())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(reply)
    }

    async fn persist_progress(&self, update: &ProgressUpdate) -> Result<PersistAck, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.persisted.push(update.clone());
        if state.fail_persist {
            return Err(ApiError::Server(500, "write failed".to_string()));
        }

        let completed = update.marks_complete();
        let entry = LectureProgress {
            lecture_id: update.lecture_id.clone(),
            position: update.position,
            duration: update.duration,
            is_complete: completed,
        };
        match state
            .progress
            .iter_mut()
            .find(|p| p.lecture_id == update.lecture_id)
        {
            Some(existing) => existing.merge(&entry),
            None => state.progress.push(entry),
        }
        Ok(PersistAck {
            ok: true,
            completed,
        })
    }

    async fn fetch_lectures(&self, _course_id: &str) -> Result<Vec<Lecture>, ApiError> {
        Ok(self.state.lock().unwrap().lectures.clone())
    }

    async fn log_event(&self, event: &PlaybackTelemetry) -> Result<(), ApiError> {
        self.state.lock().unwrap().telemetry.push(event.clone());
        Ok(())
    }

    async fn is_enrolled(&self, _course_id: &str) -> Result<bool, ApiError> {
        Ok(self.state.lock().unwrap().enrolled)
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn lecture(id: &str, order: u32, duration: f64) -> Lecture {
    Lecture {
        lecture_id: LectureId::new(id),
        title: format!("Lecture {}", order),
        order_index: order,
        source_ref: None,
        video_ref: Some(format!("vid-{}", id)),
        is_preview: false,
        duration,
    }
}

pub fn progress(id: &str, position: f64, duration: f64, is_complete: bool) -> LectureProgress {
    LectureProgress {
        lecture_id: LectureId::new(id),
        position,
        duration,
        is_complete,
    }
}

/// Three lectures of ten minutes each
pub fn three_lectures() -> Vec<Lecture> {
    vec![
        lecture("l1", 1, 600.0),
        lecture("l2", 2, 600.0),
        lecture("l3", 3, 600.0),
    ]
}
