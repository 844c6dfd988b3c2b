//! Wire format exchanged with the persistence API.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error_handling::types::PersistenceError;

/// Identifier assigned by the backend to a persisted recording or screenshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BackendId(String);

fn backend_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("backend id pattern is valid")
    })
}

impl BackendId {
    pub fn parse(raw: &str) -> Result<BackendId, PersistenceError> {
        if backend_id_pattern().is_match(raw) {
            Ok(BackendId(raw.to_string()))
        } else {
            Err(PersistenceError::InvalidIdFormat(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BackendId {
    type Error = PersistenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        BackendId::parse(&value)
    }
}

impl From<BackendId> for String {
    fn from(id: BackendId) -> Self {
        id.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Form fields owned by the surrounding UI; transported verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormMetadata(pub Map<String, Value>);

impl FormMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingUpload {
    /// Local id, echoed back by backends that support exact correlation.
    pub client_ref: Uuid,
    /// `data:` URI of the recording bytes.
    pub data: String,
    pub timestamp: String,
    pub duration_seconds: f64,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotUpload {
    pub client_ref: Uuid,
    pub data: String,
    /// Position in the live screenshot sequence when the save started.
    pub original_index: usize,
    pub has_drawings: bool,
}

/// The single request body of one save attempt. Built fresh every time, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRequestBatch {
    pub session_id: String,
    pub disconnect: bool,
    pub form: FormMetadata,
    pub recordings: Vec<RecordingUpload>,
    pub screenshots: Vec<ScreenshotUpload>,
}

impl SaveRequestBatch {
    pub fn new(session_id: &str, form: FormMetadata, disconnect: bool) -> Self {
        Self {
            session_id: session_id.to_string(),
            disconnect,
            form,
            recordings: Vec::new(),
            screenshots: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.recordings.is_empty() && self.screenshots.is_empty()
    }
}

/// Aggregate upload counts. The backend reports nothing per item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOutcomeSummary {
    #[serde(default)]
    pub recordings_attempted: u32,
    #[serde(default)]
    pub recordings_uploaded: u32,
    #[serde(default)]
    pub screenshots_attempted: u32,
    #[serde(default)]
    pub screenshots_uploaded: u32,
}

/// Counts come straight off the wire, so totals saturate instead of overflowing.
impl SaveOutcomeSummary {
    pub fn attempted(&self) -> u32 {
        self.recordings_attempted.saturating_add(self.screenshots_attempted)
    }

    pub fn uploaded(&self) -> u32 {
        self.recordings_uploaded.saturating_add(self.screenshots_uploaded)
    }

    pub fn failed(&self) -> u32 {
        self.attempted().saturating_sub(self.uploaded())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub upload_summary: SaveOutcomeSummary,
    #[serde(default, rename = "persistedScreenshots", alias = "persisted_screenshots")]
    pub persisted_screenshots: Vec<PersistedRecord>,
    #[serde(default, rename = "persistedRecordings", alias = "persisted_recordings")]
    pub persisted_recordings: Vec<PersistedRecord>,
}
