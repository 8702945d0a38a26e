use crate::actors::messages::{ActorError, AppError, HistoryMessage};
use crate::models::HistoryEntry;
use std::collections::VecDeque;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Duration};
use tracing::{debug, info};

const MAILBOX_SIZE: usize = 256;
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// A handle to the `HistoryActor`.
///
/// The actor task is the single owner of the bounded buffer, so concurrent
/// batch items append without sharing a lock. Clone the handle freely; the
/// actor stops when the last handle is dropped.
#[derive(Clone)]
pub struct HistoryHandle {
    sender: mpsc::Sender<HistoryMessage>,
}

impl HistoryHandle {
    /// Spawns a history actor keeping at most `capacity` entries.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(MAILBOX_SIZE);
        let actor = HistoryRunner::new(receiver, capacity);
        tokio::spawn(async move { actor.run().await });
        Self { sender }
    }

    /// Records an entry. The oldest entry is evicted when the store is full.
    pub async fn append(&self, entry: HistoryEntry) -> Result<(), AppError> {
        self.request(|responder| HistoryMessage::Append { entry, responder })
            .await
    }

    /// The `limit` most recent entries, oldest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, AppError> {
        self.request(|responder| HistoryMessage::Recent {
            limit: Some(limit),
            responder,
        })
        .await
    }

    /// Every entry currently held, oldest first.
    pub async fn snapshot(&self) -> Result<Vec<HistoryEntry>, AppError> {
        self.request(|responder| HistoryMessage::Recent {
            limit: None,
            responder,
        })
        .await
    }

    pub async fn len(&self) -> Result<usize, AppError> {
        self.request(|responder| HistoryMessage::Len { responder })
            .await
    }

    pub async fn is_empty(&self) -> Result<bool, AppError> {
        Ok(self.len().await? == 0)
    }

    pub async fn clear(&self) -> Result<(), AppError> {
        self.request(|responder| HistoryMessage::Clear { responder })
            .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> HistoryMessage,
    ) -> Result<T, AppError> {
        let (send, recv) = oneshot::channel();
        self.sender
            .send(build(send))
            .await
            .map_err(|e| ActorError::MailboxClosed(e.to_string()))?;
        let reply = timeout(REPLY_TIMEOUT, recv)
            .await?
            .map_err(|e| ActorError::NoReply(e.to_string()))?;
        Ok(reply)
    }
}

// --- Actor Runner ---
struct HistoryRunner {
    receiver: mpsc::Receiver<HistoryMessage>,
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl HistoryRunner {
    fn new(receiver: mpsc::Receiver<HistoryMessage>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            receiver,
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    async fn run(mut self) {
        info!(capacity = self.capacity, "HistoryActor started");
        while let Some(msg) = self.receiver.recv().await {
            self.handle_message(msg);
        }
        info!("HistoryActor stopped");
    }

    fn handle_message(&mut self, msg: HistoryMessage) {
        match msg {
            HistoryMessage::Append { entry, responder } => {
                if self.entries.len() == self.capacity {
                    if let Some(evicted) = self.entries.pop_front() {
                        debug!(request_id = %evicted.result.request_id, "History full, evicting oldest entry");
                    }
                }
                self.entries.push_back(entry);
                let _ = responder.send(());
            }
            HistoryMessage::Recent { limit, responder } => {
                let skip = limit.map_or(0, |n| self.entries.len().saturating_sub(n));
                let _ = responder.send(self.entries.iter().skip(skip).cloned().collect());
            }
            HistoryMessage::Len { responder } => {
                let _ = responder.send(self.entries.len());
            }
            HistoryMessage::Clear { responder } => {
                self.entries.clear();
                let _ = responder.send(());
            }
        }
    }
}
