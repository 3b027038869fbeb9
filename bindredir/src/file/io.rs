//! Endian-aware, bounds-checked reading utilities for PE and CIL parsing.
//!
//! All CIL metadata structures are little-endian. The helpers here decode
//! primitive values out of byte buffers without ever reading past the end,
//! returning [`crate::Error::OutOfBounds`] instead.

use crate::{Error::OutOfBounds, Result};

/// Types that can be decoded from a little-endian byte sequence.
pub trait CilIO: Sized {
    /// Decode a value from its little-endian byte representation.
    fn from_le_slice(data: &[u8]) -> Self;
}

macro_rules! impl_cil_io {
    ($($t:ty),*) => {
        $(impl CilIO for $t {
            fn from_le_slice(data: &[u8]) -> Self {
                let mut bytes = [0_u8; std::mem::size_of::<$t>()];
                bytes.copy_from_slice(data);
                <$t>::from_le_bytes(bytes)
            }
        })*
    };
}

impl_cil_io!(u8, u16, u32, u64);

/// Safely reads a value of type `T` in little-endian byte order from the start
/// of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Safely reads a value of type `T` at `offset`, advancing the offset by the
/// number of bytes consumed.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let value = T::from_le_slice(&data[*offset..end]);
    *offset = end;

    Ok(value)
}

/// Dynamically reads either a 2-byte or a 4-byte little-endian value,
/// promoting the narrow form to `u32`.
///
/// Metadata heap and table indexes switch between the two widths depending on
/// heap sizes and row counts, so callers pass the `is_large` decision in.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le_at_dyn(data: &[u8], offset: &mut usize, is_large: bool) -> Result<u32> {
    let res = if is_large {
        read_le_at::<u32>(data, offset)?
    } else {
        u32::from(read_le_at::<u16>(data, offset)?)
    };

    Ok(res)
}
