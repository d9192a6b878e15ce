//! Out-of-band commands to a drive process, one JSON object per line.
//!
//! Commands travel on the drive's stdin, replies on its stdout. Disk images
//! are carried as base64.

use std::io::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use format_d64::D64;
use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    InsertDisk { image: String },
    EjectDisk,
    SetWriteProtect { protect: bool },
    Reset,
    /// No reply; the process exits.
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum Reply {
    Ok,
    /// Answer to `InsertDisk` and `EjectDisk`: the disk that left the drive.
    Disk { image: Option<String> },
    Error { message: String },
}

#[must_use]
pub fn encode_image(image: &D64) -> String {
    STANDARD.encode(image.to_bytes())
}

pub fn decode_image(text: &str) -> Result<D64> {
    let bytes = STANDARD
        .decode(text)
        .map_err(|err| crate::BusError::Config(format!("disk image payload: {err}")))?;
    Ok(D64::from_bytes(&bytes)?)
}

/// Write one message and flush.
pub fn send<T: Serialize>(out: &mut impl Write, message: &T) -> Result<()> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    out.write_all(line.as_bytes())?;
    out.flush()?;
    Ok(())
}
