//! Blob heap (`#Blob`) access.
//!
//! The `#Blob` heap stores length-prefixed binary data; the Assembly table's
//! public key lives here. Lengths use the compressed unsigned integer
//! encoding of ECMA-335 II.23.2.
//!
//! # Reference
//! - [ECMA-335 II.24.2.4](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{malformed_error, Error::OutOfBounds, Result};

/// View over the `#Blob` heap.
///
/// Index 0 is the empty blob; a valid heap starts with a null byte.
pub struct Blob<'a> {
    data: &'a [u8],
}

impl<'a> Blob<'a> {
    /// Create a `Blob` view from a sequence of bytes.
    ///
    /// # Errors
    /// Returns an error if the heap is empty or does not start with the
    /// mandatory leading null byte.
    pub fn from(data: &'a [u8]) -> Result<Blob<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Invalid memory for #Blob heap"));
        }

        Ok(Blob { data })
    }

    /// Get the bytes stored at `index`.
    ///
    /// # Errors
    /// Returns an error if the index is out of bounds or the length prefix is
    /// inconsistent with the heap size.
    pub fn get(&self, index: usize) -> Result<&'a [u8]> {
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        let mut offset = index;
        let len = read_compressed_uint(self.data, &mut offset)? as usize;

        let Some(data_end) = offset.checked_add(len) else {
            return Err(OutOfBounds);
        };

        if data_end > self.data.len() {
            return Err(OutOfBounds);
        }

        Ok(&self.data[offset..data_end])
    }
}

/// Read a compressed unsigned integer as defined in ECMA-335 II.23.2,
/// advancing `offset` past the encoded bytes.
fn read_compressed_uint(data: &[u8], offset: &mut usize) -> Result<u32> {
    let Some(&first_byte) = data.get(*offset) else {
        return Err(OutOfBounds);
    };

    // 1-byte encoding: 0xxxxxxx
    if (first_byte & 0x80) == 0 {
        *offset += 1;
        return Ok(u32::from(first_byte));
    }

    // 2-byte encoding: 10xxxxxx xxxxxxxx
    if (first_byte & 0xC0) == 0x80 {
        let Some(&second_byte) = data.get(*offset + 1) else {
            return Err(OutOfBounds);
        };
        *offset += 2;
        return Ok(((u32::from(first_byte) & 0x3F) << 8) | u32::from(second_byte));
    }

    // 4-byte encoding: 110xxxxx xxxxxxxx xxxxxxxx xxxxxxxx
    if (first_byte & 0xE0) == 0xC0 {
        if *offset + 4 > data.len() {
            return Err(OutOfBounds);
        }
        let b1 = u32::from(data[*offset + 1]);
        let b2 = u32::from(data[*offset + 2]);
        let b3 = u32::from(data[*offset + 3]);
        *offset += 4;
        return Ok(((u32::from(first_byte) & 0x1F) << 24) | (b1 << 16) | (b2 << 8) | b3);
    }

    Err(malformed_error!("Invalid compressed uint - {}", first_byte))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data = [
            0x00,
            0x03, 0x41, 0x42, 0x43,
            0x02, 0x44, 0x45,
        ];

        let blob = Blob::from(&data).unwrap();

        assert_eq!(blob.get(0).unwrap(), &[] as &[u8]);
        assert_eq!(blob.get(1).unwrap(), &[0x41, 0x42, 0x43]);
        assert_eq!(blob.get(5).unwrap(), &[0x44, 0x45]);
        assert!(blob.get(9).is_err());
    }

    #[test]
    fn crafted_two_byte_length() {
        let mut data = vec![0x00, 0x80, 0x80];
        data.extend(vec![0xAA_u8; 0x80]);

        let blob = Blob::from(&data).unwrap();
        assert_eq!(blob.get(1).unwrap().len(), 0x80);
    }

    #[test]
    fn truncated_blob() {
        let data = [0x00, 0x10, 0x41];
        let blob = Blob::from(&data).unwrap();
        assert!(blob.get(1).is_err());
    }

    #[test]
    fn compressed_uint_encodings() {
        let mut offset = 0;
        assert_eq!(read_compressed_uint(&[0x7F], &mut offset).unwrap(), 0x7F);

        offset = 0;
        assert_eq!(
            read_compressed_uint(&[0xAE, 0x57], &mut offset).unwrap(),
            0x2E57
        );

        offset = 0;
        assert_eq!(
            read_compressed_uint(&[0xC0, 0x00, 0x40, 0x00], &mut offset).unwrap(),
            0x4000
        );

        offset = 0;
        assert!(read_compressed_uint(&[0xE0], &mut offset).is_err());
    }
}
