use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{EditorError, EditorResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Outcome of one background backend call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncNotice {
    Completed { task: String },
    Failed { task: String, error: String },
}

impl SyncNotice {
    pub fn task(&self) -> &str {
        match self {
            SyncNotice::Completed { task } | SyncNotice::Failed { task, .. } => task,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SyncNotice::Failed { .. })
    }
}

#[derive(Default)]
struct JobQueue {
    jobs: VecDeque<Job>,
    draining: bool,
}

/// Fire-and-forget dispatcher. Jobs run on the rayon pool one at a time, in
/// submission order, and report back over a channel that the session drains
/// when convenient.
pub struct BackgroundSync {
    sender: Sender<SyncNotice>,
    receiver: Receiver<SyncNotice>,
    queue: Arc<Mutex<JobQueue>>,
    pending: Arc<AtomicUsize>,
}

impl Default for BackgroundSync {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundSync {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            queue: Arc::new(Mutex::new(JobQueue::default())),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Jobs submitted but not yet finished.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Queue `job`; its outcome arrives later as a [`SyncNotice`].
    pub fn dispatch<F>(&self, task: impl Into<String>, job: F)
    where
        F: FnOnce() -> EditorResult<()> + Send + 'static,
    {
        let task = task.into();
        let sender = self.sender.clone();
        self.enqueue(Box::new(move || {
            let notice = match job() {
                Ok(()) => {
                    log::debug!("sync: {} done", task);
                    SyncNotice::Completed { task }
                }
                Err(e) => {
                    log::warn!("sync: {} failed: {}", task, e);
                    SyncNotice::Failed {
                        task,
                        error: e.to_string(),
                    }
                }
            };
            // receiver gone means the session was dropped
            let _ = sender.send(notice);
        }));
    }

    /// Queue `job` behind everything already submitted and block for its result.
    pub fn run_ordered<T, F>(&self, task: &str, job: F) -> EditorResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> EditorResult<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        self.enqueue(Box::new(move || {
            let _ = tx.send(job());
        }));
        rx.recv()
            .map_err(|_| EditorError::BackendSync(format!("{} was dropped before finishing", task)))?
    }

    fn enqueue(&self, job: Job) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.jobs.push_back(job);
        if !queue.draining {
            queue.draining = true;
            let queue = Arc::clone(&self.queue);
            let pending = Arc::clone(&self.pending);
            rayon::spawn(move || drain_queue(&queue, &pending));
        }
    }

    /// Everything reported so far, without blocking.
    pub fn drain(&self) -> Vec<SyncNotice> {
        self.receiver.try_iter().collect()
    }

    /// Block until `count` notices arrive or `timeout` elapses.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> Vec<SyncNotice> {
        let deadline = Instant::now() + timeout;
        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(left) {
                Ok(n) => out.push(n),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        out
    }
}

fn drain_queue(queue: &Mutex<JobQueue>, pending: &AtomicUsize) {
    loop {
        let next = {
            let mut q = queue.lock().unwrap_or_else(|e| e.into_inner());
            match q.jobs.pop_front() {
                Some(job) => job,
                None => {
                    q.draining = false;
                    return;
                }
            }
        };
        next();
        pending.fetch_sub(1, Ordering::AcqRel);
    }
}
