//! Post-normalization format checks.
//!
//! Best-effort validation of recognized model formats. A failed check is
//! reported to the caller but never discards the artifact: a parser quirk
//! or unsupported format variant must not throw away a finished download.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use thiserror::Error;

// safetensors caps the JSON header at 100MB; anything larger is corrupt
const MAX_HEADER_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("file too short for a safetensors header")]
    TooShort,

    #[error("declared header size {0} is not plausible")]
    HeaderSize(u64),

    #[error("header is not valid JSON: {0}")]
    MalformedHeader(#[from] serde_json::Error),

    #[error("header JSON is not an object")]
    NotAnObject,
}

/// Run the format check matching the target's extension, if any.
///
/// Returns `None` for unrecognized extensions, `Some(result)` otherwise.
pub fn validate_target(path: &Path) -> Option<std::result::Result<(), ValidationError>> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("safetensors") => Some(validate_safetensors(path)),
        _ => None,
    }
}

/// Parse the safetensors preamble: an 8-byte little-endian header length
/// followed by that many bytes of JSON describing the tensors.
fn validate_safetensors(path: &Path) -> std::result::Result<(), ValidationError> {
    let mut file = File::open(path)?;
    let total = file.metadata()?.len();
    if total < 8 {
        return Err(ValidationError::TooShort);
    }

    let mut len_bytes = [0u8; 8];
    file.read_exact(&mut len_bytes)?;
    let header_len = u64::from_le_bytes(len_bytes);

    if header_len == 0 || header_len > MAX_HEADER_BYTES || header_len + 8 > total {
        return Err(ValidationError::HeaderSize(header_len));
    }

    let mut header = vec![0u8; header_len as usize];
    file.read_exact(&mut header)?;

    let value: serde_json::Value = serde_json::from_slice(&header)?;
    if !value.is_object() {
        return Err(ValidationError::NotAnObject);
    }

    Ok(())
}
