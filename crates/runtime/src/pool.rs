//! Fixed-size worker pool
//!
//! A static pool of named OS threads draining a shared task channel. The
//! scheduler thread dispatches one closure per transaction; workers run
//! them to completion in arrival order.
//!
//! Shutdown stops intake first (so `run_task` starts failing), lets the
//! workers drain whatever is already queued, and joins them.

use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use strand_core::{StrandError, StrandResult};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// A fixed-size pool of worker threads.
pub struct StaticThreadPool {
    sender: Mutex<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    active: AtomicBool,
}

impl StaticThreadPool {
    /// Spawn a pool of `threads` workers, named `strand-worker-N`.
    pub fn new(threads: usize) -> Self {
        let (sender, receiver) = unbounded::<Task>();
        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let receiver = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("strand-worker-{i}"))
                .spawn(move || {
                    // Exits when the channel is drained and every sender
                    // has been dropped.
                    while let Ok(task) = receiver.recv() {
                        task();
                    }
                })
                .expect("failed to spawn worker thread");
            workers.push(handle);
        }
        StaticThreadPool {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            active: AtomicBool::new(true),
        }
    }

    /// Enqueue a task for execution on some worker.
    ///
    /// # Errors
    /// Returns [`StrandError::Shutdown`] once the pool has been shut down.
    pub fn run_task(&self, task: impl FnOnce() + Send + 'static) -> StrandResult<()> {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(tx) => tx.send(Box::new(task)).map_err(|_| StrandError::Shutdown),
            None => Err(StrandError::Shutdown),
        }
    }

    /// True while the pool accepts work. Scheduler loops poll this as
    /// their run condition.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop intake, drain queued tasks, and join every worker.
    ///
    /// Idempotent; the second call is a no-op.
    pub fn shutdown(&self) {
        self.active.store(false, Ordering::Release);
        // Dropping the sender closes the channel; workers exit once the
        // backlog is drained.
        drop(self.sender.lock().take());
        for handle in self.workers.lock().drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for StaticThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
