//! Bounded blocking worker pool.
//!
//! Provides a `BlockingPool` of named OS threads that execute jobs from a
//! bounded mpsc queue, keeping potentially blocking method implementations off
//! the non-blocking request-handling threads.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error};

use super::config::DispatcherConfig;

/// A unit of work executed on a pool thread.
type Job = Box<dyn FnOnce() + Send + 'static>;

// ---------------------------------------------------------------------------
// PoolError
// ---------------------------------------------------------------------------

/// Errors returned when a job cannot be scheduled.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("blocking queue is full ({capacity} pending jobs)")]
    Saturated { capacity: usize },
    #[error("blocking pool is shut down")]
    Closed,
}

// ---------------------------------------------------------------------------
// BlockingPool
// ---------------------------------------------------------------------------

/// Fixed-size pool of worker threads fed by a bounded queue.
///
/// Each worker thread:
/// 1. Takes the next job from the shared queue
/// 2. Runs it, catching any panic so the thread keeps serving
/// 3. Exits once the queue is closed and drained
pub struct BlockingPool {
    tx: Mutex<Option<mpsc::Sender<Job>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    capacity: usize,
    size: usize,
}

impl BlockingPool {
    /// Start `threads` workers named `{name_prefix}-{index}` sharing a queue of
    /// `queue_capacity` jobs. Both counts are raised to at least 1.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to spawn a worker thread.
    pub fn start(threads: usize, queue_capacity: usize, name_prefix: &str) -> std::io::Result<Self> {
        let size = threads.max(1);
        let capacity = queue_capacity.max(1);
        let (tx, rx) = mpsc::channel::<Job>(capacity);
        let rx = Arc::new(Mutex::new(rx));

        let mut handles = Vec::with_capacity(size);
        for index in 0..size {
            let rx = Arc::clone(&rx);
            let handle = thread::Builder::new()
                .name(format!("{name_prefix}-{index}"))
                .spawn(move || worker_loop(&rx))?;
            handles.push(handle);
        }
        debug!(threads = size, queue_capacity = capacity, "blocking pool started");

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            threads: Mutex::new(handles),
            capacity,
            size,
        })
    }

    /// Start a pool sized by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to spawn a worker thread.
    pub fn from_config(config: &DispatcherConfig) -> std::io::Result<Self> {
        Self::start(
            config.blocking_threads,
            config.blocking_queue_capacity,
            &config.thread_name_prefix,
        )
    }

    /// Number of worker threads.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Queue a job. Never runs the job on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Saturated` if the queue is full and
    /// `PoolError::Closed` after `shutdown`.
    pub fn execute<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(PoolError::Closed);
        };
        tx.try_send(Box::new(job)).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => PoolError::Saturated {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => PoolError::Closed,
        })
    }

    /// Close the queue, let queued jobs finish, and join the worker threads.
    ///
    /// Calling this from a worker thread skips joining that thread.
    pub fn shutdown(&self) {
        self.tx.lock().take();
        let handles = std::mem::take(&mut *self.threads.lock());
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
        debug!("blocking pool stopped");
    }
}

impl Drop for BlockingPool {
    fn drop(&mut self) {
        // Workers exit on their own once the queue drains.
        self.tx.lock().take();
    }
}

fn worker_loop(rx: &Mutex<mpsc::Receiver<Job>>) {
    loop {
        // Idle workers queue on the mutex; only one waits on the channel at a time.
        let job = rx.lock().blocking_recv();
        let Some(job) = job else {
            break; // Queue closed and drained.
        };
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("blocking job panicked");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
