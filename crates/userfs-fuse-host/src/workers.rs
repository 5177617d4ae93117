// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Worker threads for offloading blocking backend calls
//!
//! The kernel session loop is single-threaded; content operations are
//! queued here so a slow backend round-trip does not stall lookups.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Condvar, Mutex, PoisonError,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_queue::SegQueue;
use tracing::debug;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    queue: Arc<SegQueue<Job>>,
    signal: Arc<(Mutex<bool>, Condvar)>,
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(thread_count: usize) -> Self {
        let queue = Arc::new(SegQueue::<Job>::new());
        let signal = Arc::new((Mutex::new(false), Condvar::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(thread_count);

        for _ in 0..thread_count {
            let queue = Arc::clone(&queue);
            let signal = Arc::clone(&signal);
            let shutdown = Arc::clone(&shutdown);
            handles.push(thread::spawn(move || loop {
                match queue.pop() {
                    Some(job) => job(),
                    None if shutdown.load(Ordering::Acquire) => break,
                    None => {
                        let (lock, cvar) = &*signal;
                        let mut pending = lock.lock().unwrap_or_else(PoisonError::into_inner);
                        if !*pending {
                            pending = cvar
                                .wait_timeout(pending, Duration::from_millis(5))
                                .unwrap_or_else(PoisonError::into_inner)
                                .0;
                        }
                        *pending = false;
                    }
                }
            }));
        }

        debug!(target: "userfs::fuse", threads = thread_count, "worker pool started");
        Self {
            queue,
            signal,
            shutdown,
            handles,
        }
    }

    pub fn thread_count(&self) -> usize {
        self.handles.len()
    }

    /// Queue `job`; with no worker threads it runs on the caller.
    pub fn execute(&self, job: Job) {
        if self.handles.is_empty() {
            job();
            return;
        }
        self.queue.push(job);
        let (lock, cvar) = &*self.signal;
        let mut pending = lock.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = true;
        cvar.notify_one();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        {
            let (lock, cvar) = &*self.signal;
            let mut pending = lock.lock().unwrap_or_else(PoisonError::into_inner);
            *pending = true;
            cvar.notify_all();
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Worker threads to start; `USERFS_FUSE_WORKERS` overrides the CPU count.
pub fn worker_count(single_threaded: bool) -> usize {
    if single_threaded {
        return 0;
    }
    let available = thread::available_parallelism().map(|p| p.get()).unwrap_or(1);
    std::env::var("USERFS_FUSE_WORKERS")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or_else(|| available.max(2))
}
