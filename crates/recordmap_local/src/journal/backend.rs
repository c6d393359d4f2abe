//! Journal byte store trait.

use crate::error::LocalResult;

/// An append-only byte store holding journal frames.
///
/// Backends do not interpret the bytes. Framing, checksums and replay live in
/// [`super::frame`].
///
/// # Invariants
///
/// - `append` returns the offset the data was written at
/// - `read_at` returns exactly the bytes previously written there
/// - after `sync` returns, everything appended survives a crash
pub trait JournalBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `ReadPastEnd` if the range extends beyond the current size.
    fn read_at(&self, offset: u64, len: usize) -> LocalResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    fn append(&mut self, data: &[u8]) -> LocalResult<u64>;

    /// Pushes appended data to the OS.
    fn flush(&mut self) -> LocalResult<()>;

    /// Current size in bytes; the offset of the next append.
    fn size(&self) -> LocalResult<u64>;

    /// Makes all appended data durable.
    fn sync(&mut self) -> LocalResult<()>;

    /// Drops everything after `new_size`.
    ///
    /// # Errors
    ///
    /// Fails if `new_size` is greater than the current size.
    fn truncate(&mut self, new_size: u64) -> LocalResult<()>;

    /// Reads the whole journal.
    fn read_all(&self) -> LocalResult<Vec<u8>> {
        let size = self.size()?;
        let len = usize::try_from(size)
            .map_err(|_| crate::error::LocalError::corrupted("journal larger than memory"))?;
        self.read_at(0, len)
    }
}
