//! Queue-driven worker loop and the handle used to stop workers.
//!
//! A worker is a named task that pulls envelopes off its [`PriorityQueue`]
//! and hands payloads to a [`MessageHandler`]. Handler errors and panics are
//! reported and swallowed so one bad message never ends the worker.

use crate::error::SyncResult;
use crate::queue::{Envelope, PriorityQueue};
use crate::signal::Signal;
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Tracing target for failures caught at a worker boundary.
pub const DIAGNOSTICS_TARGET: &str = "watchsync::diagnostics";

/// Default bounded wait on an empty queue.
pub const DEFAULT_QUEUE_WAIT: Duration = Duration::from_secs(3);

/// Per-message behaviour of a worker.
#[async_trait]
pub trait MessageHandler<T: Send + 'static>: Send + 'static {
    async fn handle(&mut self, message: T) -> SyncResult<()>;
}

/// Drives a [`MessageHandler`] from a queue until stopped.
pub struct WorkerLoop<T, H> {
    name: &'static str,
    queue: PriorityQueue<T>,
    stop: Signal,
    handler: H,
    wait: Duration,
}

impl<T, H> WorkerLoop<T, H>
where
    T: Send + 'static,
    H: MessageHandler<T>,
{
    pub fn new(name: &'static str, queue: PriorityQueue<T>, stop: Signal, handler: H) -> Self {
        Self {
            name,
            queue,
            stop,
            handler,
            wait: DEFAULT_QUEUE_WAIT,
        }
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Runs until the stop signal is set or a shutdown envelope arrives.
    pub async fn run(mut self) {
        info!("{} started", self.name);
        while !self.stop.is_set() {
            match self.queue.recv_timeout(self.wait).await {
                None => continue,
                Some(Envelope::Shutdown) => {
                    debug!("{} received shutdown", self.name);
                    break;
                }
                Some(Envelope::Payload(message)) => self.dispatch(message).await,
            }
        }
        info!("{} exited", self.name);
    }

    async fn dispatch(&mut self, message: T) {
        let name = self.name;
        match AssertUnwindSafe(self.handler.handle(message))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(target: DIAGNOSTICS_TARGET, worker = name, "message failed: {e}"),
            Err(panic) => error!(
                target: DIAGNOSTICS_TARGET,
                worker = name,
                "message handler panicked: {}",
                panic_message(panic.as_ref())
            ),
        }
    }

    /// Spawns the loop; stopping the handle pushes a shutdown envelope.
    pub fn spawn(self) -> WorkerHandle {
        let name = self.name;
        let stop = self.stop.clone();
        let queue = self.queue.clone();
        let task = tokio::spawn(self.run());
        WorkerHandle::new(name, stop, move || queue.push_shutdown(), task)
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Owner's handle to a running worker task.
pub struct WorkerHandle {
    name: &'static str,
    stop: Signal,
    interrupt: Box<dyn Fn() + Send + Sync>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerHandle {
    /// `interrupt` is called after the stop flag is set, to wake the task
    /// from whatever it is blocked on.
    pub fn new(
        name: &'static str,
        stop: Signal,
        interrupt: impl Fn() + Send + Sync + 'static,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            name,
            stop,
            interrupt: Box::new(interrupt),
            task: Mutex::new(Some(task)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signals the worker and waits for it to exit. Safe to call repeatedly.
    pub async fn stop(&self) {
        let Some(task) = self.task.lock().await.take() else {
            return;
        };
        self.stop.set();
        (self.interrupt)();
        if let Err(e) = task.await {
            error!(target: DIAGNOSTICS_TARGET, worker = self.name, "worker task failed: {e}");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}
