//! Wire format for "a recording finished" events.
//!
//! A descriptor is serialized to JSON by the producer hook and decoded by the
//! consumer. It is never mutated once it has been put on the queue.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upstream status marker for a recording that completed normally
pub const STATUS_OK: &str = "OK";

/// Errors building or decoding a descriptor
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("Recording path is empty")]
    EmptyPath,

    #[error("Recording path has no file name: {0}")]
    NoFileName(String),

    #[error("Malformed job payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A completed recording, as put on the transcoding queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Absolute path to the recorded file
    pub path: String,

    /// Base file name of `path`
    pub fname: String,

    /// Channel the programme was recorded from
    pub channel: String,

    /// Programme title
    pub title: String,

    /// `"OK"` or the upstream error description
    pub status: String,
}

impl JobDescriptor {
    /// Build a descriptor from the raw recording hook arguments.
    ///
    /// `fname` is always derived from `path` here; callers never supply it.
    pub fn from_recording(
        path: impl Into<String>,
        channel: impl Into<String>,
        title: impl Into<String>,
        status: impl Into<String>,
    ) -> Result<Self, DescriptorError> {
        let path = path.into();
        if path.trim().is_empty() {
            return Err(DescriptorError::EmptyPath);
        }

        let fname = file_name_of(&path)?;

        Ok(Self {
            path,
            fname,
            channel: channel.into(),
            title: title.into(),
            status: status.into(),
        })
    }

    /// Whether the upstream recorder reported success
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    /// Encode as a queue payload
    pub fn to_payload(&self) -> Result<Vec<u8>, DescriptorError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a queue payload.
    ///
    /// `fname` is re-derived from `path`; whatever the payload carried is
    /// discarded.
    pub fn from_payload(payload: &[u8]) -> Result<Self, DescriptorError> {
        let mut descriptor: Self = serde_json::from_slice(payload)?;
        if descriptor.path.trim().is_empty() {
            return Err(DescriptorError::EmptyPath);
        }
        descriptor.fname = file_name_of(&descriptor.path)?;
        Ok(descriptor)
    }
}

fn file_name_of(path: &str) -> Result<String, DescriptorError> {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| DescriptorError::NoFileName(path.to_string()))
}
