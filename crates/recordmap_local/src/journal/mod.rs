//! Append-only journal of committed saves.

mod backend;
mod file;
mod frame;
mod memory;

pub use backend::JournalBackend;
pub use file::{FileJournal, JournalDir};
pub use frame::{encode_frame, replay, JournalEntry, Replay, FRAME_MAGIC, FRAME_VERSION};
pub use memory::InMemoryJournal;
