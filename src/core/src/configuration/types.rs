use serde::{Deserialize, Serialize};

pub const MIB: u64 = 1024 * 1024;

fn default_request_timeout_secs() -> u64 {
    30
}

/// `[persistence]`: where saves are sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub base_url: String,
    pub session_id: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// `[limits]`: per-item size ceilings. Items above them are still sent; the
/// backend is expected to reject them and they are counted as failures first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_recording_bytes: u64,
    pub max_screenshot_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_recording_bytes: 10 * MIB,
            max_screenshot_bytes: 10 * MIB,
        }
    }
}

/// `[save]`: debounce and reconciliation timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    pub debounce_ms: u64,
    pub reconciliation_window_secs: u64,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            reconciliation_window_secs: 60,
        }
    }
}
