//! Metadata root header and stream directory.
//!
//! The metadata root (`BSJB` signature) is the entry point for reading .NET
//! assembly metadata: it carries the runtime version string and the directory
//! of streams (`#~`, `#Strings`, `#Blob`, ...) whose offsets are relative to
//! the root itself.
//!
//! # Reference
//! - [ECMA-335 II.24.2.1](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{
    file::io::read_le,
    malformed_error,
    metadata::streams::StreamHeader,
    Error::OutOfBounds,
    Result,
};

/// The MAGIC value indicating the start of CIL metadata
pub const CIL_HEADER_MAGIC: u32 = 0x424A_5342;

/// The parsed metadata root header and its stream directory.
pub struct Root {
    /// Magic signature for physical metadata: 0x424A5342
    pub signature: u32,
    /// `MajorVersion`
    pub major_version: u16,
    /// `MinorVersion`
    pub minor_version: u16,
    /// Runtime version string, trailing padding stripped
    pub version: String,
    /// Reserved, always 0
    pub flags: u16,
    /// Stream directory entries
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// Reads a [`Root`] metadata header from a byte slice.
    ///
    /// # Errors
    /// Returns an error if the data is too short, the signature is invalid,
    /// or the stream directory is malformed.
    pub fn read(data: &[u8]) -> Result<Root> {
        if data.len() < 20 {
            return Err(OutOfBounds);
        }

        let signature = read_le::<u32>(data)?;
        if signature != CIL_HEADER_MAGIC {
            return Err(malformed_error!(
                "CIL_HEADER_MAGIC does not match - {}",
                signature
            ));
        }

        // The stored length includes the null padding to a 4-byte boundary.
        let version_length = read_le::<u32>(&data[12..])? as usize;
        let Some(version_end) = version_length.checked_add(16) else {
            return Err(malformed_error!(
                "Version string length causing integer overflow - {}",
                version_length
            ));
        };
        if version_end + 4 > data.len() {
            return Err(OutOfBounds);
        }

        let version = match std::str::from_utf8(&data[16..version_end]) {
            Ok(padded) => padded.trim_end_matches('\0').to_string(),
            Err(_) => return Err(malformed_error!("Version string is not valid UTF-8")),
        };

        let flags = read_le::<u16>(&data[version_end..])?;

        let stream_count = read_le::<u16>(&data[version_end + 2..])?;
        if stream_count == 0 || stream_count > 5 {
            // Must have streams, no duplicates, no more than 5 possible
            return Err(malformed_error!("Invalid stream count - {}", stream_count));
        }

        let mut stream_headers = Vec::with_capacity(stream_count as usize);
        let mut stream_offset = version_end + 4;
        for _ in 0..stream_count {
            if stream_offset > data.len() {
                return Err(OutOfBounds);
            }

            let header = StreamHeader::from(&data[stream_offset..])?;
            match u32::checked_add(header.offset, header.size) {
                Some(range) => {
                    if range as usize > data.len() {
                        return Err(OutOfBounds);
                    }
                }
                None => {
                    return Err(malformed_error!(
                        "Stream offset and size cause integer overflow - {} + {}",
                        header.offset,
                        header.size
                    ))
                }
            }

            stream_offset += header.entry_size();
            stream_headers.push(header);
        }

        Ok(Root {
            signature,
            major_version: read_le::<u16>(&data[4..])?,
            minor_version: read_le::<u16>(&data[6..])?,
            version,
            flags,
            stream_headers,
        })
    }

    /// Returns the stream header with the given name, if present.
    #[must_use]
    pub fn stream(&self, name: &str) -> Option<&StreamHeader> {
        self.stream_headers.iter().find(|header| header.name == name)
    }
}
