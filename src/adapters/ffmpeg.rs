//! ffmpeg transcoder backend.
//!
//! Shells out to the ffmpeg binary and collects everything it prints.

use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{TranscodeOutput, Transcoder};

/// Transcoder that spawns an ffmpeg-compatible binary
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    /// Path to the binary (default: "ffmpeg", resolved through PATH)
    binary_path: String,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self::with_binary_path("ffmpeg")
    }

    /// Create a transcoder with a custom binary path
    pub fn with_binary_path(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    pub fn binary_path(&self) -> &str {
        &self.binary_path
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn run(&self, args: &[String]) -> Result<TranscodeOutput> {
        debug!(binary = %self.binary_path, ?args, "Spawning transcoder");

        let output = Command::new(&self.binary_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run transcoder '{}'", self.binary_path))?;

        // ffmpeg logs to stderr; stdout is normally empty
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(TranscodeOutput {
            exit_code: output.status.code().unwrap_or(-1),
            output: combined,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_binary() {
        let transcoder = FfmpegTranscoder::default();
        assert_eq!(transcoder.binary_path(), "ffmpeg");
        assert_eq!(transcoder.name(), "ffmpeg");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_exit_code_and_output() {
        let transcoder = FfmpegTranscoder::with_binary_path("sh");
        let args = vec![
            "-c".to_string(),
            "echo out; echo err >&2; exit 3".to_string(),
        ];

        let result = transcoder.run(&args).await.unwrap();

        assert_eq!(result.exit_code, 3);
        assert!(!result.success());
        assert!(result.output.contains("out"));
        assert!(result.output.contains("err"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_error() {
        let transcoder = FfmpegTranscoder::with_binary_path("/nonexistent/tvhpp-ffmpeg");
        assert!(transcoder.run(&[]).await.is_err());
    }
}
