//! Work queue between the recording hook and the transcoding consumer.
//!
//! The job pipeline only needs three operations from a queue: put a payload
//! with a time-to-run, reserve the oldest ready payload, and delete a reserved
//! payload to acknowledge it. `WorkQueue` captures exactly that, so the
//! consumer can be driven by beanstalkd in production and by `MemoryQueue`
//! in tests.

pub mod beanstalk;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use beanstalk::BeanstalkClient;
pub use memory::MemoryQueue;

/// Default beanstalkd address
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:11300";

/// Tube shared by producer and consumer
pub const DEFAULT_TUBE: &str = "transcoding";

/// Time-to-run for enqueued recordings (4 hours).
///
/// Must exceed the longest transcode, or the server would hand the job out a
/// second time while it is still running.
pub const RECORDING_TTR: Duration = Duration::from_secs(14_400);

/// Errors that can occur talking to a queue
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Failed to connect to queue at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed by queue server")]
    Closed,

    #[error("Queue server error: {0}")]
    Server(String),

    #[error("Unexpected reply to '{command}': {reply}")]
    UnexpectedReply { command: String, reply: String },

    #[error("Invalid tube name: {0}")]
    InvalidTube(String),

    #[error("Job not found: {0}")]
    NotFound(u64),

    #[error("Job {0} was buried by the server")]
    Buried(u64),

    #[error("Job payload too big")]
    JobTooBig,

    #[error("Queue server is draining")]
    Draining,
}

/// A job handed out by `reserve`, owned by the caller until deleted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedJob {
    pub id: u64,
    pub body: Vec<u8>,
}

/// Connection parameters shared by producer and consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    /// host:port of the queue server
    pub address: String,

    /// Tube (named channel) for transcoding jobs
    pub tube: String,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            tube: DEFAULT_TUBE.to_string(),
        }
    }
}

/// Minimal work-queue capability
#[async_trait]
pub trait WorkQueue: Send {
    /// Enqueue a payload; returns the job id
    async fn put(&mut self, payload: &[u8], ttr: Duration) -> Result<u64, QueueError>;

    /// Block until a job is available and reserve it
    async fn reserve(&mut self) -> Result<ReservedJob, QueueError>;

    /// Acknowledge a reserved job by removing it
    async fn delete(&mut self, id: u64) -> Result<(), QueueError>;
}
