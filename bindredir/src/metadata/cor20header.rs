//! CLR 2.0 (Cor20) header parsing.
//!
//! The Cor20 header sits at the start of the `IMAGE_DIRECTORY_ENTRY_COM_DESCRIPTOR`
//! data directory of a managed PE file and points at the metadata blob this
//! library actually cares about.
//!
//! # Reference
//! - [ECMA-335 II.25.3.3](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{file::io::read_le_at, malformed_error, Error::OutOfBounds, Result};

/// The main CLI header, as found at the CLR runtime data directory.
///
/// Only the leading fields are retained; the trailing reserved RVA/size pairs
/// (code manager table, export address table jump, managed native header) are
/// consumed and validated to be zero per ECMA-335.
pub struct Cor20Header {
    /// Size of header in bytes, shall be 72
    pub cb: u32,
    /// The minimum major version of runtime required to run this program
    pub major_runtime_version: u16,
    /// The minor portion of the version
    pub minor_runtime_version: u16,
    /// RVA of the metadata root
    pub meta_data_rva: u32,
    /// Size of the metadata
    pub meta_data_size: u32,
    /// Flags describing this runtime image
    pub flags: u32,
    /// Token for the entry point of the image
    pub entry_point_token: u32,
    /// RVA of the strong name signature hash, 0 when the image is unsigned
    pub strong_name_signature_rva: u32,
    /// Size of the strong name signature hash
    pub strong_name_signature_size: u32,
}

impl Cor20Header {
    /// Create a `Cor20Header` from a sequence of bytes.
    ///
    /// # Errors
    /// Returns an error if the data is too short to contain a valid CLR
    /// header, or if field validation per ECMA-335 II.25.3.3 fails.
    pub fn read(data: &[u8]) -> Result<Cor20Header> {
        if data.len() < 72 {
            return Err(OutOfBounds);
        }

        let mut offset = 0;

        let cb = read_le_at::<u32>(data, &mut offset)?;
        if cb != 72 {
            return Err(malformed_error!(
                "Invalid CLR header size: expected 72, got {}",
                cb
            ));
        }

        let major_runtime_version = read_le_at::<u16>(data, &mut offset)?;
        let minor_runtime_version = read_le_at::<u16>(data, &mut offset)?;
        if major_runtime_version == 0 {
            return Err(malformed_error!(
                "Invalid major runtime version: {}",
                major_runtime_version
            ));
        }

        let meta_data_rva = read_le_at::<u32>(data, &mut offset)?;
        let meta_data_size = read_le_at::<u32>(data, &mut offset)?;
        if meta_data_rva == 0 || meta_data_size == 0 {
            return Err(malformed_error!("Metadata RVA and size cannot be zero"));
        }

        let flags = read_le_at::<u32>(data, &mut offset)?;
        let entry_point_token = read_le_at::<u32>(data, &mut offset)?;

        // Resources directory, unused here but the pair must be consistent.
        let resource_rva = read_le_at::<u32>(data, &mut offset)?;
        let resource_size = read_le_at::<u32>(data, &mut offset)?;
        if (resource_rva == 0) != (resource_size == 0) {
            return Err(malformed_error!("Resource values are invalid"));
        }

        let strong_name_signature_rva = read_le_at::<u32>(data, &mut offset)?;
        let strong_name_signature_size = read_le_at::<u32>(data, &mut offset)?;
        if (strong_name_signature_rva == 0) != (strong_name_signature_size == 0) {
            return Err(malformed_error!("Strong name values are invalid"));
        }

        Ok(Cor20Header {
            cb,
            major_runtime_version,
            minor_runtime_version,
            meta_data_rva,
            meta_data_size,
            flags,
            entry_point_token,
            strong_name_signature_rva,
            strong_name_signature_size,
        })
    }
}
