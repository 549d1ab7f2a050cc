//! Producer side of the broadcast primitive

use crate::receiver::Receiver;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Message sent to the control task
pub(crate) enum Command<T> {
    /// Attach a receiver inbox
    Subscribe {
        id: u64,
        inbox: mpsc::UnboundedSender<T>,
    },

    /// Detach a receiver inbox
    Unsubscribe { id: u64 },

    /// Forward a value to every attached inbox
    Publish(T),

    /// Drop every inbox and exit
    Shutdown,
}

/// Fan-out handle. Cloning yields another handle to the same broadcaster.
///
/// Must be created inside a Tokio runtime: the control task is spawned on
/// construction.
pub struct Broadcaster<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    commands: mpsc::UnboundedSender<Command<T>>,
    stopped: AtomicBool,
    next_id: AtomicU64,
    control: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Clone + Send + 'static> Broadcaster<T> {
    /// Create a broadcaster and spawn its control task
    pub fn new() -> Self {
        let (commands, mailbox) = mpsc::unbounded_channel();
        let control = tokio::spawn(run_control(mailbox));

        Self {
            inner: Arc::new(Inner {
                commands,
                stopped: AtomicBool::new(false),
                next_id: AtomicU64::new(0),
                control: Mutex::new(Some(control)),
            }),
        }
    }

    /// Attach a new receiver.
    ///
    /// The receiver observes every value written after this call returns and
    /// nothing written before it. After [`Broadcaster::stop`] the returned
    /// receiver is already closed.
    pub fn subscribe(&self) -> Receiver<T> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        if self.inner.stopped.load(Ordering::Acquire) {
            debug!(receiver_id = id, "Subscribe after stop, returning closed receiver");
            return Receiver::closed(id);
        }

        let (inbox, backlog) = mpsc::unbounded_channel();
        if self
            .inner
            .commands
            .send(Command::Subscribe { id, inbox })
            .is_err()
        {
            return Receiver::closed(id);
        }

        debug!(receiver_id = id, "Receiver subscribed");
        Receiver::spawn(id, backlog, self.inner.commands.clone())
    }

    /// Publish a value to every attached receiver.
    ///
    /// Never blocks. A no-op once the broadcaster is stopped.
    pub fn write(&self, value: T) {
        if self.inner.stopped.load(Ordering::Acquire) {
            trace!("Write after stop ignored");
            return;
        }

        // Only fails when the control task is gone, which means stopped.
        let _ = self.inner.commands.send(Command::Publish(value));
    }

    /// Stop the broadcaster and wait for the control task to exit.
    ///
    /// Values written before the call are still delivered to attached
    /// receivers, which then reach end-of-stream. Calling twice is harmless.
    pub async fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        let _ = self.inner.commands.send(Command::Shutdown);

        let control = self.inner.control.lock().take();
        if let Some(control) = control {
            if let Err(err) = control.await {
                warn!(error = %err, "Broadcast control task ended abnormally");
            }
        }

        debug!("Broadcaster stopped");
    }

    /// Whether [`Broadcaster::stop`] has been called
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }
}

impl<T: Clone + Send + 'static> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Broadcaster<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster")
            .field("stopped", &self.inner.stopped.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        // Last producer handle is gone; let the control task release the inboxes.
        let _ = self.commands.send(Command::Shutdown);
    }
}

/// Control task: sole owner of the receiver set
async fn run_control<T: Clone>(mut mailbox: mpsc::UnboundedReceiver<Command<T>>) {
    let mut inboxes: HashMap<u64, mpsc::UnboundedSender<T>> = HashMap::new();

    while let Some(command) = mailbox.recv().await {
        match command {
            Command::Subscribe { id, inbox } => {
                inboxes.insert(id, inbox);
            }
            Command::Unsubscribe { id } => {
                if inboxes.remove(&id).is_some() {
                    debug!(receiver_id = id, "Receiver unsubscribed");
                }
            }
            Command::Publish(value) => {
                inboxes.retain(|id, inbox| {
                    let alive = inbox.send(value.clone()).is_ok();
                    if !alive {
                        trace!(receiver_id = id, "Dropping detached receiver");
                    }
                    alive
                });
            }
            Command::Shutdown => break,
        }
    }

    debug!(receivers = inboxes.len(), "Broadcast control task exiting");
}
