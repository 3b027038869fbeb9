//! PE image loading for .NET assemblies.
//!
//! The [`File`] type opens a PE file (memory-mapped from disk or from an
//! in-memory buffer), validates that it carries a CLR runtime header, and
//! exposes the small surface the metadata layer needs: bounds-checked data
//! slices, RVA-to-file-offset translation, and the location of the CLR
//! header directory.
//!
//! Anything without a CLR runtime header is rejected up front — this library
//! only ever looks at managed images.

pub mod io;
pub mod memory;
pub mod physical;

use std::path::Path;

use crate::{
    malformed_error,
    Error::{Empty, GoblinErr, OutOfBounds},
    Result,
};
use goblin::pe::PE;
use memory::Memory;
use physical::Physical;

/// Backend trait for file data sources.
///
/// Abstracts over the origin of the PE bytes so the same parsing path serves
/// memory-mapped files and in-memory buffers.
pub trait Backend {
    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;
}

/// The span a PE section occupies in the RVA space and in the raw file.
#[derive(Debug, Clone, Copy)]
struct SectionSpan {
    virtual_address: u32,
    virtual_size: u32,
    pointer_to_raw_data: u32,
    size_of_raw_data: u32,
}

/// A loaded .NET PE image.
///
/// Construction parses the PE headers with goblin and fails early when the
/// image has no optional header or no CLR runtime header directory. The
/// section table and the CLR directory location are copied out so no
/// references into the parse result need to be kept alive.
pub struct File {
    data: Box<dyn Backend>,
    sections: Vec<SectionSpan>,
    clr_rva: u32,
    clr_size: u32,
}

impl File {
    /// Loads a PE file from the given path via memory mapping.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not a valid PE, or
    /// carries no CLR runtime header.
    pub fn from_file(path: &Path) -> Result<File> {
        Self::load(Box::new(Physical::new(path)?))
    }

    /// Loads a PE file from a memory buffer.
    ///
    /// # Errors
    /// Returns an error if the buffer is empty, not a valid PE, or carries no
    /// CLR runtime header.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        Self::load(Box::new(Memory::new(data)))
    }

    fn load(data: Box<dyn Backend>) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }

        let (sections, clr_rva, clr_size) = match PE::parse(data.data()) {
            Ok(pe) => {
                let Some(optional_header) = pe.header.optional_header else {
                    return Err(malformed_error!("File does not have an OptionalHeader"));
                };

                let Some(clr) = optional_header.data_directories.get_clr_runtime_header()
                else {
                    return Err(malformed_error!(
                        "File does not have a CLR runtime header directory"
                    ));
                };

                let sections = pe
                    .sections
                    .iter()
                    .map(|section| SectionSpan {
                        virtual_address: section.virtual_address,
                        virtual_size: section.virtual_size,
                        pointer_to_raw_data: section.pointer_to_raw_data,
                        size_of_raw_data: section.size_of_raw_data,
                    })
                    .collect();

                (sections, clr.virtual_address, clr.size)
            }
            Err(error) => return Err(GoblinErr(error)),
        };

        Ok(File {
            data,
            sections,
            clr_rva,
            clr_size,
        })
    }

    /// Returns the total size of the loaded file in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the file has a length of zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    /// Returns the RVA and size of the CLR runtime header directory.
    #[must_use]
    pub fn clr(&self) -> (u32, u32) {
        (self.clr_rva, self.clr_size)
    }

    /// Returns a bounds-checked slice of the raw file data.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the requested range does not
    /// fit within the file.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let data = self.data.data();
        let Some(end) = offset.checked_add(len) else {
            return Err(OutOfBounds);
        };
        if end > data.len() {
            return Err(OutOfBounds);
        }

        Ok(&data[offset..end])
    }

    /// Translates a relative virtual address into a raw file offset using the
    /// section table.
    ///
    /// # Errors
    /// Returns an error if the RVA falls outside every section, or a section
    /// header is malformed.
    pub fn rva_to_offset(&self, rva: usize) -> Result<usize> {
        let rva_u32 =
            u32::try_from(rva).map_err(|_| malformed_error!("RVA too large: {}", rva))?;

        for section in &self.sections {
            // Sections may have a zero virtual_size with only raw data present.
            let extent = section.virtual_size.max(section.size_of_raw_data);
            let Some(section_end) = section.virtual_address.checked_add(extent) else {
                return Err(malformed_error!(
                    "Section malformed, causing integer overflow - {} + {}",
                    section.virtual_address,
                    extent
                ));
            };

            if rva_u32 >= section.virtual_address && rva_u32 < section_end {
                return Ok((rva - section.virtual_address as usize)
                    + section.pointer_to_raw_data as usize);
            }
        }

        Err(malformed_error!(
            "RVA could not be converted to offset - {}",
            rva
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_with_sections(sections: Vec<SectionSpan>) -> File {
        File {
            data: Box::new(Memory::new(vec![0_u8; 0x1000])),
            sections,
            clr_rva: 0,
            clr_size: 0,
        }
    }

    #[test]
    fn rva_translation() {
        let file = file_with_sections(vec![SectionSpan {
            virtual_address: 0x2000,
            virtual_size: 0x1000,
            pointer_to_raw_data: 0x200,
            size_of_raw_data: 0x1000,
        }]);

        assert_eq!(file.rva_to_offset(0x2000).unwrap(), 0x200);
        assert_eq!(file.rva_to_offset(0x2FFF).unwrap(), 0x11FF);
        assert!(file.rva_to_offset(0x3000).is_err());
        assert!(file.rva_to_offset(0x1FFF).is_err());
    }

    #[test]
    fn data_slice_bounds() {
        let file = file_with_sections(Vec::new());

        assert_eq!(file.data_slice(0, 16).unwrap().len(), 16);
        assert!(file.data_slice(0x1000, 1).is_err());
        assert!(file.data_slice(usize::MAX, 2).is_err());
    }

    #[test]
    fn empty_input() {
        assert!(matches!(File::from_mem(Vec::new()), Err(Empty)));
    }

    #[test]
    fn not_a_pe() {
        assert!(File::from_mem(vec![0x4D, 0x5A, 0x00, 0x00]).is_err());
    }
}
