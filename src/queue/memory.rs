//! In-process FIFO queue.
//!
//! Cloned handles share one queue, so a test can act as producer on one
//! handle and consumer on another.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use super::{QueueError, ReservedJob, WorkQueue};

#[derive(Debug)]
struct QueuedJob {
    id: u64,
    body: Vec<u8>,
    ttr: Duration,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    ready: VecDeque<QueuedJob>,
    reserved: HashMap<u64, QueuedJob>,
    deleted: usize,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    available: Notify,
}

/// Counts of jobs in each queue state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryQueueStats {
    pub ready: usize,
    pub reserved: usize,
    pub deleted: usize,
}

/// Shared in-memory work queue
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    shared: Arc<Shared>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn stats(&self) -> MemoryQueueStats {
        let state = self.shared.state.lock().await;
        MemoryQueueStats {
            ready: state.ready.len(),
            reserved: state.reserved.len(),
            deleted: state.deleted,
        }
    }

    /// Payloads and time-to-run of ready jobs, oldest first
    pub async fn ready_jobs(&self) -> Vec<(Vec<u8>, Duration)> {
        let state = self.shared.state.lock().await;
        state
            .ready
            .iter()
            .map(|job| (job.body.clone(), job.ttr))
            .collect()
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn put(&mut self, payload: &[u8], ttr: Duration) -> Result<u64, QueueError> {
        let id = {
            let mut state = self.shared.state.lock().await;
            state.next_id += 1;
            let id = state.next_id;
            state.ready.push_back(QueuedJob {
                id,
                body: payload.to_vec(),
                ttr,
            });
            id
        };

        self.shared.available.notify_one();
        Ok(id)
    }

    async fn reserve(&mut self) -> Result<ReservedJob, QueueError> {
        loop {
            {
                let mut state = self.shared.state.lock().await;
                if let Some(job) = state.ready.pop_front() {
                    let reserved = ReservedJob {
                        id: job.id,
                        body: job.body.clone(),
                    };
                    state.reserved.insert(job.id, job);
                    return Ok(reserved);
                }
            }

            self.shared.available.notified().await;
        }
    }

    async fn delete(&mut self, id: u64) -> Result<(), QueueError> {
        let mut state = self.shared.state.lock().await;

        if state.reserved.remove(&id).is_none() {
            let position = state
                .ready
                .iter()
                .position(|job| job.id == id)
                .ok_or(QueueError::NotFound(id))?;
            state.ready.remove(position);
        }

        state.deleted += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_order_and_ack() {
        let mut producer = MemoryQueue::new();
        let mut consumer = producer.clone();

        producer.put(b"first", Duration::from_secs(10)).await.unwrap();
        producer.put(b"second", Duration::from_secs(10)).await.unwrap();

        let job = consumer.reserve().await.unwrap();
        assert_eq!(job.body, b"first");
        assert_eq!(
            consumer.stats().await,
            MemoryQueueStats {
                ready: 1,
                reserved: 1,
                deleted: 0
            }
        );

        consumer.delete(job.id).await.unwrap();
        assert_eq!(consumer.stats().await.reserved, 0);
        assert_eq!(consumer.stats().await.deleted, 1);
    }

    #[tokio::test]
    async fn test_reserve_waits_for_put() {
        let mut producer = MemoryQueue::new();
        let mut consumer = producer.clone();

        let waiter = tokio::spawn(async move { consumer.reserve().await.unwrap() });
        tokio::task::yield_now().await;

        producer.put(b"late", Duration::from_secs(1)).await.unwrap();
        let job = waiter.await.unwrap();
        assert_eq!(job.body, b"late");
    }

    #[tokio::test]
    async fn test_delete_unknown_job() {
        let mut queue = MemoryQueue::new();
        assert!(matches!(queue.delete(99).await, Err(QueueError::NotFound(99))));
    }
}
