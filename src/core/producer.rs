//! Producer hook: put a finished recording on the transcoding queue.
//!
//! The hook is run synchronously by the recorder, so it must never fail
//! loudly. Every problem is logged and reported as an outcome instead.

use std::time::Duration;

use tracing::{error, info};

use crate::domain::JobDescriptor;
use crate::queue::{BeanstalkClient, QueueError, QueueSettings, WorkQueue, RECORDING_TTR};

/// Result of submitting a recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Job is on the queue with this id
    Queued(u64),

    /// The hook arguments did not describe a recording
    Rejected(String),

    /// Queue could not be reached or refused the job
    Unavailable(String),
}

impl SubmitOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued(_))
    }
}

/// Enqueues recordings for the consumer
#[derive(Debug, Clone)]
pub struct JobProducer {
    settings: QueueSettings,
    ttr: Duration,
}

impl JobProducer {
    pub fn new(settings: QueueSettings) -> Self {
        Self {
            settings,
            ttr: RECORDING_TTR,
        }
    }

    /// Override the time-to-run given to each job
    pub fn with_ttr(mut self, ttr: Duration) -> Self {
        self.ttr = ttr;
        self
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    /// Build a descriptor from hook arguments and enqueue it on beanstalkd
    pub async fn submit_recording(
        &self,
        path: &str,
        channel: &str,
        title: &str,
        status: &str,
    ) -> SubmitOutcome {
        let descriptor = match JobDescriptor::from_recording(path, channel, title, status) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                error!(%path, error = %e, "Not a valid recording");
                return SubmitOutcome::Rejected(e.to_string());
            }
        };

        let mut client = match BeanstalkClient::open_producer(&self.settings).await {
            Ok(client) => client,
            Err(e) => {
                error!(address = %self.settings.address, "Error connecting to beanstalkd: {}", e);
                return SubmitOutcome::Unavailable(e.to_string());
            }
        };

        self.submit_to(&mut client, &descriptor).await
    }

    /// Enqueue a descriptor on an already connected queue
    pub async fn submit_to<Q>(&self, queue: &mut Q, descriptor: &JobDescriptor) -> SubmitOutcome
    where
        Q: WorkQueue + ?Sized,
    {
        match self.enqueue(queue, descriptor).await {
            Ok(id) => {
                if descriptor.is_ok() {
                    info!(job_id = id, "Queued postprocess for file: {}", descriptor.fname);
                } else {
                    info!(
                        job_id = id,
                        "Error '{}' for recording: {}. Queuing notification.",
                        descriptor.status,
                        descriptor.fname
                    );
                }
                SubmitOutcome::Queued(id)
            }
            Err(e) => {
                error!(fname = %descriptor.fname, "Unable to queue recording: {}", e);
                SubmitOutcome::Unavailable(e.to_string())
            }
        }
    }

    async fn enqueue<Q>(&self, queue: &mut Q, descriptor: &JobDescriptor) -> Result<u64, QueueError>
    where
        Q: WorkQueue + ?Sized,
    {
        let payload = descriptor
            .to_payload()
            .map_err(|e| QueueError::Server(format!("cannot encode job: {}", e)))?;
        queue.put(&payload, self.ttr).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;

    #[tokio::test]
    async fn test_enqueues_with_long_ttr() {
        let producer = JobProducer::new(QueueSettings::default());
        let mut queue = MemoryQueue::new();
        let descriptor =
            JobDescriptor::from_recording("/rec/news.ts", "BBC One", "News", "OK").unwrap();

        let outcome = producer.submit_to(&mut queue, &descriptor).await;
        assert_eq!(outcome, SubmitOutcome::Queued(1));

        let jobs = queue.ready_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].1, Duration::from_secs(14_400));
        assert_eq!(JobDescriptor::from_payload(&jobs[0].0).unwrap(), descriptor);
    }

    #[tokio::test]
    async fn test_failed_recordings_are_queued_too() {
        let producer = JobProducer::new(QueueSettings::default());
        let mut queue = MemoryQueue::new();
        let descriptor =
            JobDescriptor::from_recording("/rec/news.ts", "BBC One", "News", "Aborted by user")
                .unwrap();

        assert!(producer.submit_to(&mut queue, &descriptor).await.is_queued());
    }

    #[tokio::test]
    async fn test_unreachable_queue_is_not_fatal() {
        let producer = JobProducer::new(QueueSettings {
            address: "127.0.0.1:1".to_string(),
            ..Default::default()
        });

        let outcome = producer
            .submit_recording("/rec/news.ts", "BBC One", "News", "OK")
            .await;
        assert!(matches!(outcome, SubmitOutcome::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_path_is_rejected_before_connecting() {
        let producer = JobProducer::new(QueueSettings {
            address: "127.0.0.1:1".to_string(),
            ..Default::default()
        });

        let outcome = producer.submit_recording("", "BBC One", "News", "OK").await;
        assert!(matches!(outcome, SubmitOutcome::Rejected(_)));
    }
}
