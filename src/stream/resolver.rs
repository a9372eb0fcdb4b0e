//! Stream source resolution
//!
//! Maps a lecture to the endpoint the player should open: the segmented
//! manifest endpoint for HLS-style sources, the direct media endpoint
//! otherwise. The learner's credential rides along as a `token` query
//! parameter because media requests cannot always carry headers.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

use crate::models::LectureId;

/// Query parameter carrying the credential on media URLs
pub const CREDENTIAL_PARAM: &str = "token";

/// Errors from source resolution (caller contract violations)
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Invalid lecture ID: {0:?}")]
    InvalidLectureId(String),
}

/// A URL the playback engine can open
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayableSource {
    pub url: String,
    pub is_segmented: bool,
}

fn segmented_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)\.(m3u8|ts)(\?|$)").ok())
        .as_ref()
}

/// True when the raw source looks like a segmented playlist or segment
pub fn is_segmented_hint(raw: &str) -> bool {
    segmented_pattern()
        .map(|re| re.is_match(raw.trim()))
        .unwrap_or(false)
}

/// Resolves lectures to credentialed stream URLs
#[derive(Debug, Clone)]
pub struct SourceResolver {
    base_url: String,
    credential: Option<String>,
}

impl SourceResolver {
    /// Create a resolver for the given API base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential: None,
        }
    }

    /// Attach the learner's bearer credential
    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a lecture to a playable source
    ///
    /// The raw hint only decides between the manifest and the direct
    /// endpoint; the returned URL always points at our own stream API.
    pub fn resolve(
        &self,
        lecture_id: &LectureId,
        raw_hint: Option<&str>,
    ) -> Result<PlayableSource, ResolveError> {
        let is_segmented = raw_hint.map(is_segmented_hint).unwrap_or(false);
        let url = if is_segmented {
            self.manifest_url(lecture_id)?
        } else {
            self.stream_url(lecture_id)?
        };

        debug!(lecture = %lecture_id, is_segmented, "resolved stream source");
        Ok(PlayableSource { url, is_segmented })
    }

    /// Direct media endpoint for a lecture
    pub fn stream_url(&self, lecture_id: &LectureId) -> Result<String, ResolveError> {
        let id = validate(lecture_id)?;
        Ok(self.credentialed(format!(
            "{}/api/stream/{}",
            self.base_url,
            urlencoding::encode(id)
        )))
    }

    /// Segmented manifest endpoint for a lecture
    pub fn manifest_url(&self, lecture_id: &LectureId) -> Result<String, ResolveError> {
        let id = validate(lecture_id)?;
        Ok(self.credentialed(format!(
            "{}/api/stream/{}/manifest",
            self.base_url,
            urlencoding::encode(id)
        )))
    }

    /// Append the credential to an arbitrary URL unless it already has one
    pub fn credentialed(&self, url: String) -> String {
        match &self.credential {
            Some(token) => append_credential(&url, token),
            None => url,
        }
    }
}

fn validate(lecture_id: &LectureId) -> Result<&str, ResolveError> {
    if lecture_id.is_blank() {
        return Err(ResolveError::InvalidLectureId(lecture_id.to_string()));
    }
    Ok(lecture_id.as_str().trim())
}

/// Check whether a URL's query string already carries the credential
pub fn has_credential_param(url: &str) -> bool {
    let query = match url.split_once('?') {
        Some((_, q)) => q.split('#').next().unwrap_or(""),
        None => return false,
    };
    query
        .split('&')
        .filter_map(|pair| pair.split('=').next())
        .any(|key| key == CREDENTIAL_PARAM)
}

/// Append `token=<credential>` to a URL, never duplicating it
pub fn append_credential(url: &str, credential: &str) -> String {
    if has_credential_param(url) {
        return url.to_string();
    }

    let (base, fragment) = match url.split_once('#') {
        Some((b, f)) => (b, Some(f)),
        None => (url, None),
    };
    let separator = if !base.contains('?') {
        "?"
    } else if base.ends_with('?') || base.ends_with('&') {
        ""
    } else {
        "&"
    };

    let mut out = format!(
        "{}{}{}={}",
        base,
        separator,
        CREDENTIAL_PARAM,
        urlencoding::encode(credential)
    );
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}
