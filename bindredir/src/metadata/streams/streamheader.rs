//! Stream header for .NET metadata streams.
//!
//! Each stream header records the name, offset, and size of one metadata
//! stream relative to the metadata root.
//!
//! # Reference
//! - [ECMA-335 II.24.2.2](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{file::io::read_le, malformed_error, Error::OutOfBounds, Result};

/// One entry in the metadata stream directory. The structure is variable
/// length, padded to a 4-byte boundary after the null-terminated name.
pub struct StreamHeader {
    /// Offset of the stream data, relative to the metadata root
    pub offset: u32,
    /// Size of this stream in bytes
    pub size: u32,
    /// Name of the stream, at most 32 characters
    pub name: String,
}

impl StreamHeader {
    /// Create a `StreamHeader` from a sequence of bytes.
    ///
    /// # Errors
    /// Returns an error if the data is too short or the stream name is not
    /// one of the names defined by ECMA-335.
    pub fn from(data: &[u8]) -> Result<StreamHeader> {
        if data.len() < 9 {
            return Err(OutOfBounds);
        }

        let mut name = String::with_capacity(32);
        for counter in 0..std::cmp::min(32, data.len() - 8) {
            let name_char = data[8 + counter];
            if name_char == 0 {
                break;
            }

            name.push(char::from(name_char));
        }

        if !["#Strings", "#US", "#Blob", "#GUID", "#~", "#-"]
            .iter()
            .any(|valid_name| name == *valid_name)
        {
            return Err(malformed_error!("Invalid stream header name - {}", name));
        }

        Ok(StreamHeader {
            offset: read_le::<u32>(data)?,
            size: read_le::<u32>(&data[4..])?,
            name,
        })
    }

    /// The on-disk size of this header entry: two `u32` fields plus the name
    /// with its terminator, padded to a 4-byte boundary.
    #[must_use]
    pub fn entry_size(&self) -> usize {
        8 + (((self.name.len() + 1) + 3) & !3)
    }
}
