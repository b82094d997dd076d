//! Mail delivery through the local sendmail binary.
//!
//! The message is rendered as a plain-text RFC 5322 document and piped to
//! `sendmail -i -f <from> <to>`, leaving queueing and relaying to the MTA.

use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{MailMessage, Mailer};

/// Mailer that hands messages to a sendmail-compatible binary
#[derive(Debug, Clone)]
pub struct SendmailMailer {
    binary_path: String,
}

impl Default for SendmailMailer {
    fn default() -> Self {
        Self::new()
    }
}

impl SendmailMailer {
    pub fn new() -> Self {
        Self::with_binary_path("/usr/sbin/sendmail")
    }

    pub fn with_binary_path(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    pub fn binary_path(&self) -> &str {
        &self.binary_path
    }
}

/// Strip line breaks so a header value cannot start a new header
fn header_value(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect()
}

/// Longest UTF-8 run per encoded word; keeps each word within 75 characters
const ENCODED_WORD_BYTES: usize = 45;

/// RFC 2047 `B` encoding for non-ASCII header text, folded one word per line
fn encode_header(value: &str) -> String {
    let value = header_value(value);
    if value.is_ascii() {
        return value;
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for c in value.chars() {
        if chunk.len() + c.len_utf8() > ENCODED_WORD_BYTES {
            words.push(format!("=?utf-8?B?{}?=", STANDARD.encode(&chunk)));
            chunk.clear();
        }
        chunk.push(c);
    }
    if !chunk.is_empty() {
        words.push(format!("=?utf-8?B?{}?=", STANDARD.encode(&chunk)));
    }

    words.join("\n ")
}

/// `-i -f <from> -- <to>`; the terminator keeps a recipient from being read as an option
fn sendmail_args(message: &MailMessage) -> [&str; 5] {
    ["-i", "-f", &message.from, "--", &message.to]
}

/// Render the message as sendmail expects it on stdin
pub fn render_message(message: &MailMessage) -> String {
    format!(
        "From: {}\nTo: {}\nSubject: {}\nDate: {}\nMIME-Version: 1.0\nContent-Type: text/plain; charset=utf-8\nContent-Transfer-Encoding: 8bit\n\n{}",
        header_value(&message.from),
        header_value(&message.to),
        encode_header(&message.subject),
        Utc::now().to_rfc2822(),
        message.body,
    )
}

#[async_trait]
impl Mailer for SendmailMailer {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        let mut child = Command::new(&self.binary_path)
            .args(sendmail_args(message))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn '{}'", self.binary_path))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(render_message(message).as_bytes())
                .await
                .context("Failed to write message to sendmail")?;
            // Drop stdin to signal EOF
        }

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for sendmail")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "sendmail exited with code {} delivering to '{}': {}",
                output.status.code().unwrap_or(-1),
                message.to,
                stderr.trim()
            );
        }

        Ok(())
    }
}
