//! Delivery workers.
//!
//! Each bot is pinned to one worker by hashing its id, so deliveries to the
//! same bot leave in publish order while different bots proceed in
//! parallel.

use crate::dispatcher::Dispatcher;
use crate::error::BotError;
use crate::Result;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use traq_types::BotEventType;
use uuid::Uuid;

/// Queue length of each worker.
pub const WORKER_QUEUE: usize = 256;

/// A pending delivery.
#[derive(Debug, Clone)]
pub struct Job {
    pub bot_id: Uuid,
    pub event: BotEventType,
    pub body: Bytes,
}

pub struct WorkerPool {
    queues: Vec<mpsc::Sender<Job>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Start `workers` workers. Must be called inside a Tokio runtime.
    pub fn spawn(workers: usize, dispatcher: Arc<Dispatcher>, shutdown: CancellationToken) -> Self {
        let workers = workers.max(1);
        let mut queues = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for index in 0..workers {
            let (tx, mut rx) = mpsc::channel::<Job>(WORKER_QUEUE);
            let dispatcher = dispatcher.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        job = rx.recv() => match job {
                            Some(job) => {
                                dispatcher.deliver(job.bot_id, job.event, job.body).await;
                            }
                            None => break,
                        },
                    }
                }
                debug!(worker = index, "Bot worker stopped");
            }));
            queues.push(tx);
        }

        Self {
            queues,
            handles: Mutex::new(handles),
        }
    }

    pub fn workers(&self) -> usize {
        self.queues.len()
    }

    /// Index of the worker that owns `bot_id`.
    pub fn worker_for(&self, bot_id: Uuid) -> usize {
        (bot_id.as_u128() % self.queues.len() as u128) as usize
    }

    /// Queue a job on its bot's worker, waiting if that queue is full.
    pub async fn submit(&self, job: Job) -> Result<()> {
        let index = self.worker_for(job.bot_id);
        self.queues[index]
            .send(job)
            .await
            .map_err(|_| BotError::Closed)
    }

    /// Wait for every worker to exit.
    pub async fn join(&self) {
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}
