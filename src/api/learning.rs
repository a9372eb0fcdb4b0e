//! Learning platform REST client
//!
//! Progress, lecture metadata, enrollment and playback telemetry.
//! Every request carries the learner's bearer token when one is configured.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::models::{CourseProgress, Lecture, LectureId, PersistAck, PlaybackTelemetry, ProgressUpdate};
use crate::stream::SourceResolver;

/// Default API endpoint for local development servers
pub const DEFAULT_API_URL: &str = "http://localhost:4000";

/// REST API error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not authorized (401), sign in again")]
    Unauthorized,

    #[error("Resource not found (404)")]
    NotFound,

    #[error("Server error ({0}): {1}")]
    Server(u16, String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
}

/// Remote progress store and course metadata, as seen by a learning session
#[async_trait]
pub trait SyncClient: Send + Sync {
    async fn fetch_progress(&self, course_id: &str) -> Result<CourseProgress, ApiError>;

    async fn persist_progress(&self, update: &ProgressUpdate) -> Result<PersistAck, ApiError>;

    async fn fetch_lectures(&self, course_id: &str) -> Result<Vec<Lecture>, ApiError>;

    /// Best-effort telemetry; callers ignore failures
    async fn log_event(&self, event: &PlaybackTelemetry) -> Result<(), ApiError>;

    async fn is_enrolled(&self, course_id: &str) -> Result<bool, ApiError>;
}

/// HTTP client for the learning platform API
#[derive(Debug, Clone)]
pub struct LearningClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl LearningClient {
    /// Create a client for the given API base URL
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Create a client against a custom base URL (for testing)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self::new(base_url, None)
    }

    /// Attach a bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = (!token.trim().is_empty()).then_some(token);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Stream source resolver sharing this client's base URL and credential
    pub fn resolver(&self) -> SourceResolver {
        SourceResolver::new(self.base_url.clone()).with_credential(self.token.clone())
    }

    fn request(&self, method: reqwest::Method, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, endpoint);
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder) -> Result<T, ApiError> {
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            return serde_json::from_str(&body)
                .map_err(|e| ApiError::InvalidResponse(format!("JSON parse error: {}", e)));
        }

        match status {
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ApiError::Server(status.as_u16(), error_message(&body, status)))
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.send(self.request(reqwest::Method::GET, endpoint)).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(self.request(reqwest::Method::POST, endpoint).json(body))
            .await
    }
}

/// Pull a human message out of an error body
fn error_message(body: &str, status: StatusCode) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = match &parsed {
        Some(Value::Object(map)) => map
            .get("error")
            .or_else(|| map.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string),
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    };

    match message {
        Some(m) if !m.trim().is_empty() => m,
        _ if status.is_server_error() => {
            "Server is currently unavailable. Please try again later.".to_string()
        }
        _ => format!(
            "Request failed ({}: {})",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        ),
    }
}

#[async_trait]
impl SyncClient for LearningClient {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn fetch_progress(&self, course_id: &str) -> Result<CourseProgress, ApiError> {
        let endpoint = format!("/api/progress/course/{}", urlencoding::encode(course_id));
        self.get(&endpoint).await
    }

    #[tracing::instrument(level = "debug", skip(self, update), fields(lecture = %update.lecture_id))]
    async fn persist_progress(&self, update: &ProgressUpdate) -> Result<PersistAck, ApiError> {
        self.post("/api/progress/upsert", update).await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn fetch_lectures(&self, course_id: &str) -> Result<Vec<Lecture>, ApiError> {
        let endpoint = format!("/api/courses/{}/lectures", urlencoding::encode(course_id));
        let raw: Value = self.get(&endpoint).await?;
        let items = match raw {
            Value::Array(items) => items,
            _ => Vec::new(),
        };

        let mut lectures: Vec<Lecture> = items
            .into_iter()
            .filter_map(|v| serde_json::from_value::<LectureResponse>(v).ok())
            .map(LectureResponse::into_lecture)
            .collect();
        lectures.sort_by_key(|l| l.order_index);
        Ok(lectures)
    }

    #[tracing::instrument(level = "debug", skip(self, event), fields(event = ?event.event))]
    async fn log_event(&self, event: &PlaybackTelemetry) -> Result<(), ApiError> {
        let _: Value = self.post("/api/logs", event).await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn is_enrolled(&self, course_id: &str) -> Result<bool, ApiError> {
        let endpoint = format!("/api/courses/{}/purchased", urlencoding::encode(course_id));
        let response: PurchasedResponse = self.get(&endpoint).await?;
        Ok(response.purchased)
    }
}

// =============================================================================
// API Response Types (internal)
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LectureResponse {
    #[serde(rename = "_id")]
    id: Option<Value>,
    lecture_id: Option<Value>,
    title: Option<String>,
    order_index: Option<Value>,
    video_id: Option<String>,
    video_url: Option<String>,
    preview_url: Option<String>,
    #[serde(default)]
    is_preview: bool,
    duration: Option<Value>,
}

impl LectureResponse {
    fn into_lecture(self) -> Lecture {
        let lecture_id = self
            .id
            .as_ref()
            .and_then(id_string)
            .or_else(|| self.lecture_id.as_ref().and_then(id_string))
            .unwrap_or_default();

        Lecture {
            lecture_id: LectureId::new(lecture_id),
            title: self
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Lecture".to_string()),
            order_index: self
                .order_index
                .as_ref()
                .and_then(Value::as_f64)
                .filter(|n| *n >= 0.0)
                .map(|n| n as u32)
                .unwrap_or(1),
            source_ref: non_empty(self.video_url).or_else(|| non_empty(self.preview_url)),
            video_ref: non_empty(self.video_id),
            is_preview: self.is_preview,
            duration: self.duration.as_ref().and_then(Value::as_f64).unwrap_or(0.0),
        }
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[derive(Debug, Deserialize)]
struct PurchasedResponse {
    #[serde(default)]
    purchased: bool,
}
