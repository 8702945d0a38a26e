use crate::models::HistoryEntry;
use tokio::sync::oneshot;

// Re-export the error types for convenience
pub use crate::error::{ActorError, AppError};

/// Messages that can be sent to the `HistoryActor`.
#[derive(Debug)]
pub enum HistoryMessage {
    /// Records one entry, evicting the oldest when full.
    Append {
        entry: HistoryEntry,
        /// Acknowledges once the entry is stored.
        responder: oneshot::Sender<()>,
    },
    /// Reads the most recent entries, oldest first.
    Recent {
        /// `None` returns everything held.
        limit: Option<usize>,
        responder: oneshot::Sender<Vec<HistoryEntry>>,
    },
    /// Number of entries currently held.
    Len { responder: oneshot::Sender<usize> },
    /// Drops every entry.
    Clear { responder: oneshot::Sender<()> },
}
