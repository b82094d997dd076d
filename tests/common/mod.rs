//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use tvhpp::adapters::{MailMessage, Mailer, TranscodeOutput, Transcoder};
use tvhpp::core::{NotificationRouter, NotifyRules, RecipientRule};
use tvhpp::JobDescriptor;

/// Transcoder that follows a fixed script instead of running ffmpeg
#[derive(Default)]
pub struct ScriptedTranscoder {
    exit_code: i32,
    output: String,
    /// Bytes written to the output path (last argument) before exiting
    writes: Option<Vec<u8>>,
    unstartable: bool,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedTranscoder {
    /// Exits 0 after writing `content` to the output path
    pub fn succeeding(content: &[u8]) -> Self {
        Self {
            writes: Some(content.to_vec()),
            ..Default::default()
        }
    }

    /// Exits 0 without producing any output file
    pub fn succeeding_without_output() -> Self {
        Self::default()
    }

    /// Exits non-zero, optionally leaving a partial output file
    pub fn failing(exit_code: i32, output: &str, partial: Option<&[u8]>) -> Self {
        Self {
            exit_code,
            output: output.to_string(),
            writes: partial.map(|p| p.to_vec()),
            ..Default::default()
        }
    }

    /// Cannot be spawned at all
    pub fn unstartable() -> Self {
        Self {
            unstartable: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcoder for ScriptedTranscoder {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn run(&self, args: &[String]) -> Result<TranscodeOutput> {
        self.calls.lock().unwrap().push(args.to_vec());

        if self.unstartable {
            anyhow::bail!("No such file or directory (os error 2)");
        }

        if let (Some(content), Some(output_path)) = (&self.writes, args.last()) {
            tokio::fs::write(output_path, content).await?;
        }

        Ok(TranscodeOutput {
            exit_code: self.exit_code,
            output: self.output.clone(),
        })
    }
}

/// Mailer that keeps every message it is asked to send
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<MailMessage>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.to).collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        if self.fail {
            anyhow::bail!("Connection refused");
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// `ops@example.com` subscribes to news; everything else goes to the fallback
pub fn rules() -> NotifyRules {
    let ops = RecipientRule::new("ops@example.com", &["News.*".to_string()]).unwrap();
    NotifyRules::new(vec![ops], "fallback@example.com", "tvheadend@example.com")
}

pub fn router(mailer: Arc<RecordingMailer>) -> NotificationRouter {
    NotificationRouter::new(rules(), mailer)
}

/// Write a fake recording into `dir` and describe it
pub fn recording(dir: &Path, file_name: &str, title: &str, status: &str) -> JobDescriptor {
    let path: PathBuf = dir.join(file_name);
    std::fs::write(&path, b"raw recording").unwrap();
    JobDescriptor::from_recording(path.to_string_lossy(), "BBC One", title, status).unwrap()
}

/// File names in `dir`, sorted
pub fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
