//! Named single-thread task loop (message queue) with delayed tasks.
//!
//! Replaces the platform message-loop/handler pattern:
//! - `post()` runs tasks in FIFO order on the looper thread
//! - `post_delayed()` runs tasks in due-time order (FIFO for equal due times)
//! - tasks may carry a [`CancelToken`]; cancelled tasks are skipped when they
//!   come up, so owners can drop all their pending work in O(1)
//!
//! The token is checked when a task comes up, not when it is enqueued.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use log::trace;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Shared cancellation flag for a group of posted tasks.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct Job {
    task: Task,
    token: Option<CancelToken>,
}

impl Job {
    fn run(self) {
        if self.token.as_ref().is_some_and(CancelToken::is_cancelled) {
            return; // stale, owner moved on
        }
        (self.task)();
    }
}

enum Message {
    Now(Job),
    At(Instant, Job),
    Quit,
}

struct Delayed {
    due: Instant,
    seq: u64,
    job: Job,
}

// BinaryHeap is a max-heap: invert so the earliest (due, seq) pops first.
impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (other.due, other.seq).cmp(&(self.due, self.seq))
    }
}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Delayed {}

/// Cloneable sender side of a [`Looper`].
#[derive(Clone)]
pub struct LooperHandle {
    name: Arc<str>,
    tx: Sender<Message>,
}

impl std::fmt::Debug for LooperHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LooperHandle")
            .field("name", &self.name)
            .field("queued", &self.tx.len())
            .finish()
    }
}

impl LooperHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` on the looper thread after all previously posted tasks.
    ///
    /// Returns false if the looper has quit.
    pub fn post<F>(&self, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.send(Message::Now(Job { task: Box::new(f), token: None }))
    }

    /// Run `f` on the looper thread once `delay` has elapsed.
    pub fn post_delayed<F>(&self, delay: Duration, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let due = Instant::now() + delay;
        self.send(Message::At(due, Job { task: Box::new(f), token: None }))
    }

    /// Like [`post`](Self::post) / [`post_delayed`](Self::post_delayed), skipped if `token` is cancelled first.
    pub fn post_cancellable<F>(&self, token: &CancelToken, delay: Duration, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let job = Job {
            task: Box::new(f),
            token: Some(token.clone()),
        };
        if delay.is_zero() {
            self.send(Message::Now(job))
        } else {
            self.send(Message::At(Instant::now() + delay, job))
        }
    }

    fn send(&self, msg: Message) -> bool {
        if self.tx.send(msg).is_err() {
            trace!("Looper {} gone, task dropped", self.name);
            return false;
        }
        true
    }
}

/// Owner of a looper thread. Dropping it quits the loop and joins the thread;
/// tasks still queued at that point are discarded.
pub struct Looper {
    handle: LooperHandle,
    thread: Option<thread::JoinHandle<()>>,
}

impl Looper {
    pub fn new(name: &str) -> io::Result<Self> {
        let (tx, rx) = unbounded();
        let thread_name = name.to_string();
        let thread = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || run_loop(&thread_name, rx))?;

        trace!("Looper {} started", name);
        Ok(Self {
            handle: LooperHandle { name: Arc::from(name), tx },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> LooperHandle {
        self.handle.clone()
    }
}

fn run_loop(name: &str, rx: Receiver<Message>) {
    let mut delayed: BinaryHeap<Delayed> = BinaryHeap::new();
    let mut seq: u64 = 0;

    loop {
        // 1. Everything already due, earliest first
        let now = Instant::now();
        while delayed.peek().is_some_and(|d| d.due <= now) {
            if let Some(next) = delayed.pop() {
                next.job.run();
            }
        }

        // 2. Wait for a new message or the next due time
        let msg = match delayed.peek() {
            Some(next) => match rx.recv_timeout(next.due.saturating_duration_since(Instant::now())) {
                Ok(msg) => msg,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(msg) => msg,
                Err(_) => break,
            },
        };

        match msg {
            Message::Now(job) => job.run(),
            Message::At(due, job) => {
                seq += 1;
                delayed.push(Delayed { due, seq, job });
            }
            Message::Quit => break,
        }
    }

    trace!("Looper {} stopped ({} delayed tasks discarded)", name, delayed.len());
}

impl Drop for Looper {
    fn drop(&mut self) {
        let _ = self.handle.tx.send(Message::Quit);
        if let Some(thread) = self.thread.take() {
            // Dropped from a task on its own thread: the loop exits on Quit by itself
            if thread.thread().id() == thread::current().id() {
                return;
            }
            let _ = thread.join();
        }
    }
}
