//! In-memory file backend.
//!
//! Wraps an owned byte buffer behind the [`Backend`] trait so already-loaded
//! or synthetic images can be parsed exactly like files on disk. Used mainly
//! by tests.

use super::Backend;

/// A [`Backend`] over an owned byte buffer.
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Wrap `data` as a backend.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Memory {
        Memory { data }
    }
}

impl Backend for Memory {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}
