//! Media classification and job lifecycle states.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Container extension for transcoded video
pub const VIDEO_OUTPUT_EXTENSION: &str = "mkv";

/// Extension for transcoded audio
pub const AUDIO_OUTPUT_EXTENSION: &str = "mp3";

/// Suffix of the diagnostic file written after a failed transcode
pub const DIAGNOSTIC_SUFFIX: &str = "tc_err";

/// Kind of media a recording holds, decided from its file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Audio,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of file extensions, normalized to lowercase without the leading dot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionSet(Vec<String>);

impl ExtensionSet {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
        )
    }

    /// Whether `file_name` ends in one of the extensions
    pub fn matches(&self, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_lowercase();
                self.0.iter().any(|known| *known == ext)
            })
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Where a transcode writes its result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    /// File name of the transcoder output
    pub name: String,

    /// Sibling of the input path
    pub path: PathBuf,

    /// Output is a temporary name to be swapped onto the input path
    pub is_rename: bool,
}

/// Lifecycle of a single media job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Created, nothing done yet
    Pending,

    /// Upstream recording failed, transcode skipped
    Skipped,

    /// Transcoder is running
    Running,

    /// Transcoder exited zero
    Succeeded,

    /// Transcoder exited non-zero, or the input could not be classified
    Failed,

    /// Post-transcode rename/delete has been applied
    Reconciled,

    /// Notification step finished (terminal)
    Notified,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Notified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_set_normalizes_entries() {
        let set = ExtensionSet::new([".MKV", "ts", " .m2ts "]);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["mkv", "ts", "m2ts"]);
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let set = ExtensionSet::new([".ts"]);
        assert!(set.matches("movie.ts"));
        assert!(set.matches("MOVIE.TS"));
        assert!(!set.matches("movie.mts"));
        assert!(!set.matches("ts"));
    }

    #[test]
    fn test_media_type_display() {
        assert_eq!(MediaType::Audio.to_string(), "audio");
        assert_eq!(MediaType::Video.to_string(), "video");
    }
}
