//! Worker threads for packet handlers.
//!
//! Each worker owns one queue. A job is routed by key (the connection id) to
//! `key % workers`, so every job for one connection lands on the same queue
//! and runs in submission order, while different connections spread across
//! the pool.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::{ProtocolError, Result};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug)]
struct Worker {
    queue: mpsc::UnboundedSender<Job>,
    thread: Option<JoinHandle<()>>,
}

/// Fixed-size pool of named OS threads with keyed queues.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    /// Starts `size` workers. `size` must be at least one.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(ProtocolError::ConfigError(
                "worker pool needs at least one thread".to_string(),
            ));
        }

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
            let thread = thread::Builder::new()
                .name(format!("mcproto-worker-{index}"))
                .spawn(move || {
                    while let Some(job) = rx.blocking_recv() {
                        // a panicking handler must not take the worker down
                        if catch_unwind(AssertUnwindSafe(job)).is_err() {
                            error!(worker = index, "Packet handler panicked");
                        }
                    }
                    debug!(worker = index, "Worker stopped");
                })?;
            workers.push(Worker {
                queue: tx,
                thread: Some(thread),
            });
        }

        debug!(workers = size, "Worker pool started");
        Ok(Self { workers })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Index of the worker that runs jobs for `key`.
    pub fn worker_for(&self, key: u64) -> usize {
        (key % self.workers.len() as u64) as usize
    }

    /// Queues `job` behind every earlier job with the same key.
    pub fn submit<F>(&self, key: u64, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let worker = &self.workers[self.worker_for(key)];
        worker
            .queue
            .send(Box::new(job))
            .map_err(|_| ProtocolError::Custom("worker pool is shut down".to_string()))
    }

    /// Lets queued jobs finish, then joins every thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // closing the queues ends each worker loop once it is drained
        let threads: Vec<_> = self
            .workers
            .drain(..)
            .filter_map(|worker| {
                drop(worker.queue);
                worker.thread
            })
            .collect();
        for thread in threads {
            if thread.join().is_err() {
                error!("Worker thread exited abnormally");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(
            WorkerPool::new(0),
            Err(ProtocolError::ConfigError(_))
        ));
    }

    #[test]
    fn test_same_key_preserves_order() {
        let pool = WorkerPool::new(4).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..200 {
            let seen = Arc::clone(&seen);
            pool.submit(7, move || seen.lock().push(i)).unwrap();
        }
        pool.shutdown();

        let seen = seen.lock();
        assert_eq!(*seen, (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn test_keys_spread_over_workers() {
        let pool = WorkerPool::new(3).unwrap();
        assert_eq!(pool.size(), 3);
        assert_eq!(pool.worker_for(3), 0);
        assert_eq!(pool.worker_for(4), 1);
        assert_eq!(pool.worker_for(5), 2);
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let pool = WorkerPool::new(1).unwrap();
        let ran = Arc::new(Mutex::new(false));

        pool.submit(1, || panic!("handler bug")).unwrap();
        let flag = Arc::clone(&ran);
        pool.submit(1, move || *flag.lock() = true).unwrap();
        pool.shutdown();

        assert!(*ran.lock());
    }
}
