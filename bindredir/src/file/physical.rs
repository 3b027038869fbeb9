//! Memory-mapped file backend.
//!
//! Maps a file from disk into the process address space so assemblies of any
//! size can be scanned without reading them into a heap buffer first. The map
//! is dropped together with the [`Physical`] value, releasing the handle
//! before the scan moves on to the next file.

use super::Backend;
use crate::{Error::FileError, Result};

use memmap2::Mmap;
use std::{fs, path::Path};

/// A [`Backend`] that memory-maps a file on disk.
pub struct Physical {
    data: Mmap,
}

impl Physical {
    /// Map the file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or mapped.
    pub fn new(path: &Path) -> Result<Physical> {
        let file = fs::File::open(path).map_err(FileError)?;

        // Safety: the map is read-only and lives no longer than this value.
        let mmap = unsafe { Mmap::map(&file).map_err(FileError)? };

        Ok(Physical { data: mmap })
    }
}

impl Backend for Physical {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}
