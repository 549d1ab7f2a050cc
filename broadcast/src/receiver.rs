//! Consumer side of the broadcast primitive

use crate::broadcaster::Command;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// How long one hand-off attempt waits for the consumer
const HANDOFF_WAIT: Duration = Duration::from_millis(10);

/// Backoff increment after a failed hand-off
const BACKOFF_STEP: Duration = Duration::from_millis(20);

/// Backoff ceiling
const MAX_BACKOFF: Duration = Duration::from_millis(200);

/// Subscription handle returned by [`crate::Broadcaster::subscribe`].
///
/// Values arrive in write order. [`Receiver::read`] returns `None` once the
/// stream has ended: the broadcaster or the receiver was stopped and every
/// buffered value has been read.
pub struct Receiver<T> {
    id: u64,
    outbox: mpsc::Receiver<T>,
    leftover: VecDeque<T>,
    quit: Option<oneshot::Sender<()>>,
    delivery: Option<JoinHandle<VecDeque<T>>>,
    commands: Option<mpsc::UnboundedSender<Command<T>>>,
}

impl<T: Send + 'static> Receiver<T> {
    /// Receiver with a running delivery task
    pub(crate) fn spawn(
        id: u64,
        inbox: mpsc::UnboundedReceiver<T>,
        commands: mpsc::UnboundedSender<Command<T>>,
    ) -> Self {
        let (handoff, outbox) = mpsc::channel(1);
        let (quit, quit_signal) = oneshot::channel();

        let delivery = Delivery {
            id,
            inbox,
            outbox: handoff,
            pending: VecDeque::new(),
            quit: quit_signal,
        };

        Self {
            id,
            outbox,
            leftover: VecDeque::new(),
            quit: Some(quit),
            delivery: Some(tokio::spawn(delivery.run())),
            commands: Some(commands),
        }
    }

    /// Receiver whose stream has already ended
    pub(crate) fn closed(id: u64) -> Self {
        let (_, outbox) = mpsc::channel(1);

        Self {
            id,
            outbox,
            leftover: VecDeque::new(),
            quit: None,
            delivery: None,
            commands: None,
        }
    }

    /// Receiver identifier, unique per broadcaster
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next value. `None` means end-of-stream.
    pub async fn read(&mut self) -> Option<T> {
        if let Some(value) = self.outbox.recv().await {
            return Some(value);
        }
        self.leftover.pop_front()
    }

    /// Detach from the broadcaster.
    ///
    /// Values already buffered for this receiver stay readable; after them
    /// [`Receiver::read`] returns `None`. Calling twice is harmless.
    pub async fn stop(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Command::Unsubscribe { id: self.id });
        }

        if let Some(quit) = self.quit.take() {
            let _ = quit.send(());
        }

        if let Some(delivery) = self.delivery.take() {
            match delivery.await {
                Ok(rest) => self.leftover.extend(rest),
                Err(err) => warn!(receiver_id = self.id, error = %err, "Delivery task ended abnormally"),
            }
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Command::Unsubscribe { id: self.id });
        }
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("id", &self.id)
            .field("leftover", &self.leftover.len())
            .field("running", &self.delivery.is_some())
            .finish()
    }
}

/// Outcome of one hand-off round
enum HandOff {
    /// Backlog empty
    Drained,
    /// Consumer did not take the oldest value in time
    NotReady,
    /// Consumer dropped the receiver
    Gone,
}

/// Per-receiver delivery task, owns the backlog
struct Delivery<T> {
    id: u64,
    inbox: mpsc::UnboundedReceiver<T>,
    outbox: mpsc::Sender<T>,
    pending: VecDeque<T>,
    quit: oneshot::Receiver<()>,
}

impl<T: Send> Delivery<T> {
    /// Returns whatever was still buffered when asked to quit
    async fn run(mut self) -> VecDeque<T> {
        let mut retry_after = Duration::ZERO;
        let mut upstream_open = true;

        loop {
            if !upstream_open && self.pending.is_empty() {
                trace!(receiver_id = self.id, "Upstream closed and backlog drained");
                return VecDeque::new();
            }

            tokio::select! {
                _ = &mut self.quit => {
                    return self.take_backlog();
                }
                value = self.inbox.recv(), if upstream_open => match value {
                    Some(value) => {
                        self.pending.push_back(value);
                        retry_after = Duration::ZERO;
                    }
                    None => upstream_open = false,
                },
                _ = tokio::time::sleep(retry_after), if !self.pending.is_empty() => {
                    match self.hand_off().await {
                        HandOff::Drained => retry_after = Duration::ZERO,
                        HandOff::NotReady => {
                            retry_after = (retry_after + BACKOFF_STEP).min(MAX_BACKOFF);
                            trace!(
                                receiver_id = self.id,
                                backlog = self.pending.len(),
                                retry_ms = retry_after.as_millis() as u64,
                                "Consumer not ready"
                            );
                        }
                        HandOff::Gone => return VecDeque::new(),
                    }
                }
            }
        }
    }

    /// Offer the oldest values one at a time; the front stays queued until taken
    async fn hand_off(&mut self) -> HandOff {
        while !self.pending.is_empty() {
            match tokio::time::timeout(HANDOFF_WAIT, self.outbox.reserve()).await {
                Ok(Ok(permit)) => {
                    if let Some(value) = self.pending.pop_front() {
                        permit.send(value);
                    }
                }
                Ok(Err(_)) => return HandOff::Gone,
                Err(_) => return HandOff::NotReady,
            }
        }
        HandOff::Drained
    }

    fn take_backlog(&mut self) -> VecDeque<T> {
        while let Ok(value) = self.inbox.try_recv() {
            self.pending.push_back(value);
        }
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closed_receiver_ends_immediately() {
        let mut receiver: Receiver<u8> = Receiver::closed(7);
        assert_eq!(receiver.id(), 7);
        assert_eq!(receiver.read().await, None);

        receiver.stop().await;
        assert_eq!(receiver.read().await, None);
    }

    #[tokio::test]
    async fn test_stop_keeps_backlog_readable() {
        let (commands, _mailbox) = mpsc::unbounded_channel();
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let mut receiver = Receiver::spawn(1, inbox, commands);

        for value in 0..5u32 {
            inbox_tx.send(value).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        receiver.stop().await;
        receiver.stop().await;

        let mut seen = Vec::new();
        while let Some(value) = receiver.read().await {
            seen.push(value);
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }
}
