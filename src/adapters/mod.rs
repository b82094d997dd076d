//! Adapter interfaces for external systems.
//!
//! The job state machine only talks to the outside world through these
//! traits: a transcoder process and a mail transport.

pub mod ffmpeg;
pub mod sendmail;

use anyhow::Result;
use async_trait::async_trait;

pub use ffmpeg::FfmpegTranscoder;
pub use sendmail::SendmailMailer;

/// Result of running the transcoder to completion
#[derive(Debug, Clone)]
pub struct TranscodeOutput {
    /// Process exit code (-1 when terminated by a signal)
    pub exit_code: i32,

    /// Combined stdout and stderr
    pub output: String,
}

impl TranscodeOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Trait for the external transcoding process
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Human-readable transcoder name
    fn name(&self) -> &str;

    /// Run the transcoder with `args` and wait for it to exit.
    ///
    /// A non-zero exit is reported through `TranscodeOutput`, not as an error.
    /// Errors mean the process could not be started at all.
    async fn run(&self, args: &[String]) -> Result<TranscodeOutput>;
}

/// A plain-text notification email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Trait for outbound mail delivery
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<()>;
}
