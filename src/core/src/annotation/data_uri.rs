//! `data:` URI encoding used for every image and blob sent over the wire.

use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use regex::Regex;

use crate::error_handling::types::MergeError;

#[derive(Debug, Clone, PartialEq)]
pub struct DataUri {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

fn data_uri_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"^data:(?P<mime>[\w.+-]+/[\w.+-]+)",
            r"(?:;[\w.+-]+=[^;,]*)*",
            r";base64,(?P<data>[A-Za-z0-9+/=\s]*)$",
        ))
        .expect("data URI pattern is valid")
    })
}

impl DataUri {
    pub fn parse(raw: &str) -> Result<DataUri, MergeError> {
        let caps = data_uri_pattern()
            .captures(raw.trim())
            .ok_or(MergeError::InvalidDataUri)?;
        let payload: String = caps["data"].chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| MergeError::Decode(e.to_string()))?;
        Ok(DataUri {
            mime_type: caps["mime"].to_string(),
            bytes,
        })
    }
}

pub fn encode(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

/// Approximate decoded size of a base64 `data:` URI without decoding it.
pub fn decoded_len(raw: &str) -> u64 {
    let encoded = raw
        .split_once(',')
        .map(|(_, data)| data.len())
        .unwrap_or(raw.len());
    (encoded as u64 / 4) * 3
}
