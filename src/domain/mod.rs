//! Domain types for the post-processor.
//!
//! This module contains the core data structures:
//! - JobDescriptor: Wire record for a finished recording
//! - MediaType / OutputTarget: Classification and output naming
//! - JobState: Media job lifecycle

pub mod descriptor;
pub mod media;

// Re-export commonly used types
pub use descriptor::{DescriptorError, JobDescriptor, STATUS_OK};
pub use media::{ExtensionSet, JobState, MediaType, OutputTarget};
