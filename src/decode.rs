//! Bounded background worker pool for CPU-side image decode.
//!
//! Jobs queue on a fixed-capacity channel and are served by at most
//! `DECODE_WORKERS` threads. Workers are spawned on demand and exit after
//! `DECODE_KEEP_ALIVE` of idle time, so the pool shrinks to zero threads
//! between bursts. Shutdown stops the pool as a unit; queued jobs that
//! never ran are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, sync_channel};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::constants::{DECODE_KEEP_ALIVE, DECODE_QUEUE_CAP, DECODE_WORKERS};
use crate::error::{GalleryError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Workers {
    alive: usize,
    idle: usize,
    next_id: usize,
    handles: Vec<JoinHandle<()>>,
}

struct PoolInner {
    receiver: Mutex<Receiver<Job>>,
    workers: Mutex<Workers>,
    shut_down: AtomicBool,
}

pub struct DecodePool {
    sender: Mutex<Option<SyncSender<Job>>>,
    inner: Arc<PoolInner>,
}

impl DecodePool {
    pub fn new() -> Self {
        let (sender, receiver) = sync_channel::<Job>(DECODE_QUEUE_CAP);
        Self {
            sender: Mutex::new(Some(sender)),
            inner: Arc::new(PoolInner {
                receiver: Mutex::new(receiver),
                workers: Mutex::new(Workers {
                    alive: 0,
                    idle: 0,
                    next_id: 0,
                    handles: Vec::new(),
                }),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Queue a job. Blocks when the queue is full rather than growing it.
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(GalleryError::PoolShutDown);
        }
        let sender = self.sender.lock().unwrap();
        let Some(sender) = sender.as_ref() else {
            return Err(GalleryError::PoolShutDown);
        };
        self.spawn_worker_if_needed();
        sender
            .send(Box::new(job))
            .map_err(|_| GalleryError::PoolShutDown)
    }

    fn spawn_worker_if_needed(&self) {
        let mut workers = self.inner.workers.lock().unwrap();
        if workers.idle > 0 || workers.alive >= DECODE_WORKERS {
            return;
        }
        let id = workers.next_id;
        workers.next_id += 1;
        let inner = Arc::clone(&self.inner);
        match thread::Builder::new()
            .name(format!("decode-{id}"))
            .spawn(move || worker_loop(inner))
        {
            Ok(handle) => {
                workers.alive += 1;
                workers.handles.push(handle);
                log::debug!("spawned decode worker {id}");
            }
            Err(e) => log::error!("failed to spawn decode worker: {e}"),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.inner.workers.lock().unwrap().alive
    }

    /// Stop the pool: no further submissions are accepted, in-flight jobs
    /// finish, queued jobs are dropped, workers are joined. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        log::info!("shutting down decode pool");
        // Dropping the sender wakes every waiting worker with a recv error.
        self.sender.lock().unwrap().take();
        let handles = {
            let mut workers = self.inner.workers.lock().unwrap();
            std::mem::take(&mut workers.handles)
        };
        for handle in handles {
            if handle.join().is_err() {
                log::warn!("decode worker panicked during shutdown");
            }
        }
    }
}

impl Default for DecodePool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DecodePool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(inner: Arc<PoolInner>) {
    loop {
        {
            let mut workers = inner.workers.lock().unwrap();
            workers.idle += 1;
        }
        let job = {
            let receiver = inner.receiver.lock().unwrap();
            receiver.recv_timeout(DECODE_KEEP_ALIVE)
        };
        {
            let mut workers = inner.workers.lock().unwrap();
            workers.idle -= 1;
        }
        match job {
            Ok(job) => {
                if inner.shut_down.load(Ordering::Acquire) {
                    // Racing with shutdown; drop the job instead of running it.
                    continue;
                }
                job();
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    let mut workers = inner.workers.lock().unwrap();
    workers.alive -= 1;
    log::debug!("decode worker exiting ({} alive)", workers.alive);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn jobs_run_on_background_threads() {
        let pool = DecodePool::new();
        let (tx, rx) = channel();
        for i in 0..8 {
            let tx = tx.clone();
            pool.submit(move || {
                tx.send(i).unwrap();
            })
            .unwrap();
        }
        let mut got: Vec<i32> = (0..8)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        got.sort_unstable();
        assert_eq!(got, (0..8).collect::<Vec<_>>());
        assert!(pool.worker_count() <= DECODE_WORKERS);
    }

    #[test]
    fn submit_blocks_when_queue_is_full() {
        let pool = Arc::new(DecodePool::new());
        let gate = Arc::new(Mutex::new(()));
        let done = Arc::new(AtomicUsize::new(0));
        let hold = gate.lock().unwrap();
        // Park every worker on the gate and fill the whole queue behind them.
        for _ in 0..(DECODE_WORKERS + DECODE_QUEUE_CAP) {
            let gate = Arc::clone(&gate);
            let done = Arc::clone(&done);
            pool.submit(move || {
                drop(gate.lock().unwrap());
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        let (tx, rx) = channel();
        let overflow_pool = Arc::clone(&pool);
        let overflow = std::thread::spawn(move || {
            overflow_pool.submit(|| {}).unwrap();
            tx.send(()).unwrap();
        });
        // The extra submit must wait for a slot instead of growing the queue.
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
        drop(hold);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        overflow.join().unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while done.load(Ordering::SeqCst) < DECODE_WORKERS + DECODE_QUEUE_CAP {
            assert!(std::time::Instant::now() < deadline, "parked jobs never drained");
            std::thread::sleep(Duration::from_millis(5));
        }
        pool.shutdown();
    }

    #[test]
    fn submit_after_shutdown_is_rejected() {
        let pool = DecodePool::new();
        pool.shutdown();
        let err = pool.submit(|| {});
        assert!(matches!(err, Err(GalleryError::PoolShutDown)));
    }

    #[test]
    fn shutdown_is_idempotent_and_joins_workers() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = DecodePool::new();
        let c = Arc::clone(&counter);
        pool.submit(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        // Wait for the job to run before stopping.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while counter.load(Ordering::SeqCst) == 0 {
            assert!(std::time::Instant::now() < deadline, "job never ran");
            std::thread::sleep(Duration::from_millis(5));
        }
        pool.shutdown();
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
