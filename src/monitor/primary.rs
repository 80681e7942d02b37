//! The host's UI-serialization context.
//!
//! Real hosts implement [`PrimaryContext`] with their own dispatch primitive.
//! [`EventLoop`] is an in-process stand-in: one thread draining a FIFO queue,
//! so blocking work posted to it delays everything queued behind it.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle, ThreadId};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::error::ContextClosed;

/// Unit of work executed on the primary context.
pub type PrimaryTask = Box<dyn FnOnce() + Send + 'static>;

/// Capability to enqueue work on the primary context.
///
/// `post` must not block and must not run the task inline.
pub trait PrimaryContext: Send + Sync {
    fn post(&self, task: PrimaryTask) -> Result<(), ContextClosed>;
}

enum Message {
    Run(PrimaryTask),
    Shutdown,
}

// ─── Event loop thread ───────────────────────────────────────────

/// Owns the loop thread. Dropping it drains nothing further and joins.
pub struct EventLoop {
    handle: EventLoopHandle,
    thread: Option<JoinHandle<()>>,
}

/// Cloneable sender side of an [`EventLoop`].
#[derive(Clone)]
pub struct EventLoopHandle {
    tx: mpsc::UnboundedSender<Message>,
    thread_id: ThreadId,
}

impl EventLoop {
    pub fn spawn(name: impl Into<String>) -> std::io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let thread = thread::Builder::new().name(name.into()).spawn(move || {
            while let Some(message) = rx.blocking_recv() {
                match message {
                    Message::Run(task) => {
                        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                            error!("task panicked on the primary context");
                        }
                    }
                    Message::Shutdown => break,
                }
            }
            debug!("primary context stopped");
        })?;

        let handle = EventLoopHandle {
            tx,
            thread_id: thread.thread().id(),
        };

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> EventLoopHandle {
        self.handle.clone()
    }

    /// Stops after the tasks already queued have run.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        let _ = self.handle.tx.send(Message::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

impl EventLoopHandle {
    /// Runs `work` on the loop and waits for its result without blocking
    /// the calling task.
    pub async fn invoke<R, F>(&self, work: F) -> Result<R, ContextClosed>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.post(Box::new(move || {
            let _ = reply_tx.send(work());
        }))?;
        reply_rx.await.map_err(|_| ContextClosed)
    }

    /// Resolves once every task queued before this call has run.
    pub async fn settle(&self) -> Result<(), ContextClosed> {
        self.invoke(|| ()).await
    }

    pub fn is_primary_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl PrimaryContext for EventLoopHandle {
    fn post(&self, task: PrimaryTask) -> Result<(), ContextClosed> {
        self.tx.send(Message::Run(task)).map_err(|_| ContextClosed)
    }
}

impl std::fmt::Debug for EventLoopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoopHandle")
            .field("thread_id", &self.thread_id)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}
