//! Consumer loop: reserve, acknowledge, process, repeat.
//!
//! Jobs are deleted from the queue before any work starts (at-most-once).
//! A crash mid-transcode loses that job rather than replaying it, since a
//! replay would leave the first attempt's temporary output behind.

use std::future::Future;
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::adapters::Transcoder;
use crate::domain::JobDescriptor;
use crate::queue::{QueueError, ReservedJob, WorkQueue};

use super::job::{JobError, JobOutcome, JobSettings, MediaJob};
use super::notifier::NotificationRouter;

/// What happened to one reserved queue entry
#[derive(Debug)]
pub enum Processed {
    /// Job ran through to notification
    Completed { job_id: u64, outcome: JobOutcome },

    /// Payload could not be decoded; it was acknowledged and dropped
    Rejected { job_id: u64, reason: String },

    /// Job stopped early (unusable input or notification failure)
    Failed { job_id: u64, error: JobError },
}

impl Processed {
    pub fn job_id(&self) -> u64 {
        match self {
            Self::Completed { job_id, .. }
            | Self::Rejected { job_id, .. }
            | Self::Failed { job_id, .. } => *job_id,
        }
    }
}

/// Single-threaded, strictly sequential job consumer
pub struct JobConsumer<Q> {
    queue: Q,
    settings: Arc<JobSettings>,
    transcoder: Arc<dyn Transcoder>,
    router: NotificationRouter,
}

impl<Q: WorkQueue> JobConsumer<Q> {
    pub fn new(
        queue: Q,
        settings: JobSettings,
        transcoder: Arc<dyn Transcoder>,
        router: NotificationRouter,
    ) -> Self {
        Self {
            queue,
            settings: Arc::new(settings),
            transcoder,
            router,
        }
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Wait for the next job and process it
    pub async fn process_next(&mut self) -> Result<Processed, QueueError> {
        let job = self.queue.reserve().await?;
        self.handle(job).await
    }

    /// Process jobs forever. Returns only on a queue error.
    pub async fn run(&mut self) -> Result<(), QueueError> {
        self.run_until(std::future::pending()).await.map(|_| ())
    }

    /// Process jobs until `shutdown` resolves; returns the number processed.
    ///
    /// Shutdown is only observed while waiting for a job. A job that has
    /// been reserved always runs to completion first.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<usize, QueueError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut processed = 0;

        loop {
            let job = tokio::select! {
                _ = &mut shutdown => {
                    info!(processed, "Shutdown requested, leaving consumer loop");
                    return Ok(processed);
                }
                job = self.queue.reserve() => job?,
            };

            self.handle(job).await?;
            processed += 1;
        }
    }

    #[instrument(skip_all, fields(job_id = job.id))]
    async fn handle(&mut self, job: ReservedJob) -> Result<Processed, QueueError> {
        let decoded = JobDescriptor::from_payload(&job.body);

        match self.queue.delete(job.id).await {
            Ok(()) => {}
            // Already gone (ttr expired and someone else took it); we still own this copy
            Err(QueueError::NotFound(id)) => warn!(job_id = id, "Job vanished before it could be deleted"),
            Err(e) => return Err(e),
        }

        let descriptor = match decoded {
            Ok(descriptor) => descriptor,
            Err(e) => {
                error!(error = %e, "Discarding undecodable job");
                return Ok(Processed::Rejected {
                    job_id: job.id,
                    reason: e.to_string(),
                });
            }
        };

        let mut media = MediaJob::new(descriptor, Arc::clone(&self.settings));
        match media.transcode(self.transcoder.as_ref(), &self.router).await {
            Ok(outcome) => {
                info!(
                    fname = media.fname(),
                    result = ?outcome.result,
                    recipients = outcome.recipients.len(),
                    "Job complete"
                );
                Ok(Processed::Completed {
                    job_id: job.id,
                    outcome,
                })
            }
            Err(e) => {
                error!(
                    fname = media.fname(),
                    title = media.title(),
                    error = %e,
                    "Job failed"
                );
                Ok(Processed::Failed {
                    job_id: job.id,
                    error: e,
                })
            }
        }
    }
}
