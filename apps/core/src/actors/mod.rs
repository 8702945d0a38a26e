//! Actor-owned shared state.
//!
//! Each actor is a task owning its state, fed through an mpsc mailbox; callers
//! hold a cloneable handle.

pub mod history;
pub mod messages;

pub use history::HistoryHandle;
