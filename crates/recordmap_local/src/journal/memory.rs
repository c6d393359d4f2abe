//! In-memory journal.

use super::backend::JournalBackend;
use crate::error::{LocalError, LocalResult};
use parking_lot::RwLock;

/// A journal kept in memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct InMemoryJournal {
    data: RwLock<Vec<u8>>,
}

impl InMemoryJournal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a journal holding `data`, for replay tests.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// A copy of the journal bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl JournalBackend for InMemoryJournal {
    fn read_at(&self, offset: u64, len: usize) -> LocalResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let end = start.saturating_add(len);

        if offset > size || end > data.len() {
            return Err(LocalError::ReadPastEnd { offset, len, size });
        }
        Ok(data[start..end].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> LocalResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> LocalResult<()> {
        Ok(())
    }

    fn size(&self) -> LocalResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&mut self) -> LocalResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> LocalResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;
        if new_size > size {
            return Err(LocalError::ReadPastEnd {
                offset: new_size,
                len: 0,
                size,
            });
        }
        let cur_len = data.len();
        data.truncate(usize::try_from(new_size).unwrap_or(cur_len));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_offsets() {
        let mut journal = InMemoryJournal::new();
        assert_eq!(journal.append(b"abc").unwrap(), 0);
        assert_eq!(journal.append(b"de").unwrap(), 3);
        assert_eq!(journal.size().unwrap(), 5);
        assert_eq!(journal.read_at(1, 3).unwrap(), b"bcd");
        assert_eq!(journal.read_all().unwrap(), b"abcde");
    }

    #[test]
    fn read_past_end_fails() {
        let journal = InMemoryJournal::with_data(b"abc".to_vec());
        assert!(matches!(
            journal.read_at(2, 5),
            Err(LocalError::ReadPastEnd { size: 3, .. })
        ));
    }

    #[test]
    fn truncate_drops_tail() {
        let mut journal = InMemoryJournal::with_data(b"abcdef".to_vec());
        journal.truncate(2).unwrap();
        assert_eq!(journal.data(), b"ab");
        assert!(journal.truncate(10).is_err());
    }
}
