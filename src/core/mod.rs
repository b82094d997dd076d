//! Core job-processing logic.
//!
//! This module contains:
//! - Notifier: Title-based notification routing and templates
//! - Job: The per-recording transcode state machine
//! - Consumer: Queue-draining loop
//! - Producer: Recorder hook that enqueues finished recordings

pub mod consumer;
pub mod job;
pub mod notifier;
pub mod producer;

// Re-export commonly used types
pub use consumer::{JobConsumer, Processed};
pub use job::{JobError, JobOutcome, JobSettings, MediaJob};
pub use notifier::{NotificationRouter, Notice, NotifyError, NotifyRules, RecipientRule, Template};
pub use producer::{JobProducer, SubmitOutcome};
