use std::fmt;

use uuid::Uuid;

use crate::capture_registry::types::LifecycleState;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    InvalidUrl(String),
    MissingField(String),
    NotInRange(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::InvalidUrl(e) => write!(f, "Invalid URL: {}", e),
            ConfigError::MissingField(e) => write!(f, "Missing configuration field: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Errors raised by the capture registry transition functions.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// No recording or screenshot carries this local id.
    NotFound(Uuid),
    /// The requested lifecycle transition is not legal from the current state.
    InvalidTransition {
        id: Uuid,
        from: LifecycleState,
        to: LifecycleState,
    },
    /// The recording's transient blob was already released.
    MissingPayload(Uuid),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::NotFound(id) => write!(f, "Captured item not found: {}", id),
            RegistryError::InvalidTransition { id, from, to } => {
                write!(f, "Illegal transition for {}: {:?} -> {:?}", id, from, to)
            }
            RegistryError::MissingPayload(id) => write!(f, "Recording payload missing: {}", id),
        }
    }
}

impl std::error::Error for RegistryError {}

#[derive(Debug, Clone, PartialEq)]
pub enum MergeError {
    InvalidDataUri,
    InvalidColor(String),
    Decode(String),
    Encode(String),
    EmptyImage,
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeError::InvalidDataUri => write!(f, "Base image is not a base64 data URI"),
            MergeError::InvalidColor(c) => write!(f, "Unparseable stroke color: {}", c),
            MergeError::Decode(e) => write!(f, "Image decode failed: {}", e),
            MergeError::Encode(e) => write!(f, "Image encode failed: {}", e),
            MergeError::EmptyImage => write!(f, "Base image has no pixels"),
        }
    }
}

impl std::error::Error for MergeError {}

/// Batch-level failures while talking to the persistence API.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    Timeout,
    Connection(String),
    Status { code: u16, body: String },
    InvalidResponse(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "Request timed out"),
            TransportError::Connection(e) => write!(f, "Connection failed: {}", e),
            TransportError::Status { code, body } => {
                write!(f, "Persistence API returned {}: {}", code, body)
            }
            TransportError::InvalidResponse(e) => write!(f, "Invalid response body: {}", e),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_decode() {
            TransportError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            TransportError::Status {
                code: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            TransportError::Connection(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PersistenceError {
    Transport(TransportError),
    InvalidIdFormat(String),
    NotFound(String),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::Transport(e) => write!(f, "Transport error: {}", e),
            PersistenceError::InvalidIdFormat(e) => write!(f, "Invalid id format: {}", e),
            PersistenceError::NotFound(e) => write!(f, "Backend record not found: {}", e),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<TransportError> for PersistenceError {
    fn from(err: TransportError) -> Self {
        PersistenceError::Transport(err)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveError {
    Transport(TransportError),
    Registry(RegistryError),
}

impl fmt::Display for SaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveError::Transport(e) => write!(f, "Save failed: {}", e),
            SaveError::Registry(e) => write!(f, "Save aborted: {}", e),
        }
    }
}

impl std::error::Error for SaveError {}

impl From<TransportError> for SaveError {
    fn from(err: TransportError) -> Self {
        SaveError::Transport(err)
    }
}

impl From<RegistryError> for SaveError {
    fn from(err: RegistryError) -> Self {
        SaveError::Registry(err)
    }
}

#[derive(Debug)]
pub enum SessionError {
    NotFound(Uuid),
    NoScreenshotAt(usize),
    InvalidIdFormat(Uuid),
    Registry(RegistryError),
    Save(SaveError),
    SessionEnded,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NotFound(id) => write!(f, "Item not found in session: {}", id),
            SessionError::NoScreenshotAt(index) => write!(f, "No screenshot at index {}", index),
            SessionError::InvalidIdFormat(id) => {
                write!(f, "Item {} has no backend id; cannot delete remotely", id)
            }
            SessionError::Registry(e) => write!(f, "Registry error: {}", e),
            SessionError::Save(e) => write!(f, "Save error: {}", e),
            SessionError::SessionEnded => write!(f, "Session already ended"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<RegistryError> for SessionError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => SessionError::NotFound(id),
            other => SessionError::Registry(other),
        }
    }
}

impl From<SaveError> for SessionError {
    fn from(err: SaveError) -> Self {
        SessionError::Save(err)
    }
}
