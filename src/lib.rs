//! tvhpp - post-processing pipeline for tvheadend recordings
//!
//! A recorder hook puts "recording finished" events on a beanstalkd tube;
//! a long-running consumer drains the tube, transcodes each recording with
//! ffmpeg, tidies up the filesystem and emails whoever asked to hear about
//! that programme.
//!
//! # Architecture
//!
//! ```text
//! tvheadend → tvhpp enqueue → beanstalkd → tvhpp consume → MediaJob
//!                                                          ├─ ffmpeg
//!                                                          ├─ rename / delete
//!                                                          └─ NotificationRouter → sendmail
//! ```
//!
//! # Modules
//!
//! - `adapters`: External processes (ffmpeg, sendmail)
//! - `core`: Job state machine, notification routing, consumer and producer
//! - `domain`: Data structures (JobDescriptor, MediaType, JobState)
//! - `queue`: Work-queue trait, beanstalkd client, in-memory queue
//! - `config`: Consumer configuration file
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # tvheadend post-processor command
//! tvhpp enqueue "%f" "%c" "%t" "%e"
//!
//! # Run the consumer
//! tvhpp consume --config /etc/tvhpp.conf
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod queue;

// Re-export main types at crate root for convenience
pub use config::Settings;
pub use core::{JobConsumer, JobProducer, MediaJob, NotificationRouter};
pub use domain::{JobDescriptor, JobState, MediaType};
pub use queue::{BeanstalkClient, MemoryQueue, WorkQueue};
