//! The `#~` tables stream and the Assembly table row.
//!
//! The tables stream stores all metadata tables back to back, prefixed by a
//! header that lists which tables are present and how many rows each has.
//! Index columns shrink to 2 bytes when the referenced table or heap is small
//! enough, so locating the Assembly table requires computing the exact row
//! size of every table stored before it.
//!
//! # Reference
//! - [ECMA-335 II.24.2.6 and II.22](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

mod tableinfo;

use strum::{EnumCount, EnumIter, IntoEnumIterator};

use crate::{
    file::io::{read_le, read_le_at, read_le_at_dyn},
    malformed_error,
    Error::OutOfBounds,
    Result,
};

pub use tableinfo::{TableInfo, TableRowInfo};

/// Identifiers for the metadata tables defined in ECMA-335 II.22.
///
/// The numeric values correspond to the table IDs from the CLI specification;
/// the same values index the `valid` bitvector of the `#~` stream header.
#[derive(Clone, Copy, PartialEq, Debug, EnumIter, EnumCount, Eq, Hash)]
pub enum TableId {
    /// `Module` table (0x00) - information about the current module
    Module = 0x00,
    /// `TypeRef` table (0x01) - references to types in external assemblies
    TypeRef = 0x01,
    /// `TypeDef` table (0x02) - type definitions within this assembly
    TypeDef = 0x02,
    /// `Field` table (0x04) - field definitions within types
    Field = 0x04,
    /// `MethodDef` table (0x06) - method definitions within types
    MethodDef = 0x06,
    /// `Param` table (0x08) - parameter definitions for methods
    Param = 0x08,
    /// `InterfaceImpl` table (0x09) - interface implementations by types
    InterfaceImpl = 0x09,
    /// `MemberRef` table (0x0A) - references to external members
    MemberRef = 0x0A,
    /// `Constant` table (0x0B) - compile-time constant values
    Constant = 0x0B,
    /// `CustomAttribute` table (0x0C) - custom attribute applications
    CustomAttribute = 0x0C,
    /// `FieldMarshal` table (0x0D) - P/Invoke marshalling information
    FieldMarshal = 0x0D,
    /// `DeclSecurity` table (0x0E) - declarative security permissions
    DeclSecurity = 0x0E,
    /// `ClassLayout` table (0x0F) - memory layout information for types
    ClassLayout = 0x0F,
    /// `FieldLayout` table (0x10) - explicit field offsets within types
    FieldLayout = 0x10,
    /// `StandAloneSig` table (0x11) - standalone method signatures
    StandAloneSig = 0x11,
    /// `EventMap` table (0x12) - type-to-event mappings
    EventMap = 0x12,
    /// `Event` table (0x14) - event definitions
    Event = 0x14,
    /// `PropertyMap` table (0x15) - type-to-property mappings
    PropertyMap = 0x15,
    /// `Property` table (0x17) - property definitions
    Property = 0x17,
    /// `MethodSemantics` table (0x18) - property/event accessor mappings
    MethodSemantics = 0x18,
    /// `MethodImpl` table (0x19) - method implementation mappings
    MethodImpl = 0x19,
    /// `ModuleRef` table (0x1A) - external module references
    ModuleRef = 0x1A,
    /// `TypeSpec` table (0x1B) - generic type specifications
    TypeSpec = 0x1B,
    /// `ImplMap` table (0x1C) - P/Invoke implementation mappings
    ImplMap = 0x1C,
    /// `FieldRVA` table (0x1D) - field RVAs for initialized data
    FieldRVA = 0x1D,
    /// `Assembly` table (0x20) - the identity of the current assembly
    Assembly = 0x20,
    /// `AssemblyProcessor` table (0x21) - processor-specific assembly info
    AssemblyProcessor = 0x21,
    /// `AssemblyOS` table (0x22) - OS-specific assembly info
    AssemblyOS = 0x22,
    /// `AssemblyRef` table (0x23) - external assembly references
    AssemblyRef = 0x23,
    /// `AssemblyRefProcessor` table (0x24) - external assembly processor info
    AssemblyRefProcessor = 0x24,
    /// `AssemblyRefOS` table (0x25) - external assembly OS info
    AssemblyRefOS = 0x25,
    /// `File` table (0x26) - file references in the assembly
    File = 0x26,
    /// `ExportedType` table (0x27) - types exported from this assembly
    ExportedType = 0x27,
    /// `ManifestResource` table (0x28) - embedded or linked resources
    ManifestResource = 0x28,
    /// `NestedClass` table (0x29) - nested class relationships
    NestedClass = 0x29,
    /// `GenericParam` table (0x2A) - generic parameter definitions
    GenericParam = 0x2A,
    /// `MethodSpec` table (0x2B) - generic method specifications
    MethodSpec = 0x2B,
    /// `GenericParamConstraint` table (0x2C) - generic parameter constraints
    GenericParamConstraint = 0x2C,
}

/// The different types of coded indexes from ECMA-335 II.24.2.6.
///
/// A coded index packs a table tag into the low bits of a row index, so its
/// on-disk width depends on the row count of the largest table it can refer to.
#[derive(Clone, Copy, PartialEq, Debug, EnumIter, EnumCount)]
pub enum CodedIndexType {
    /// Refers to `TypeDef`, `TypeRef` or `TypeSpec`
    TypeDefOrRef,
    /// Refers to `Field`, `Param` or `Property`
    HasConstant,
    /// Refers to any table that can carry a custom attribute
    HasCustomAttribute,
    /// Refers to `Field` or `Param`
    HasFieldMarshal,
    /// Refers to `TypeDef`, `MethodDef` or `Assembly`
    HasDeclSecurity,
    /// Refers to `TypeDef`, `TypeRef`, `ModuleRef`, `MethodDef` or `TypeSpec`
    MemberRefParent,
    /// Refers to `Event` or `Property`
    HasSemantics,
    /// Refers to `MethodDef` or `MemberRef`
    MethodDefOrRef,
    /// Refers to `Field` or `MethodDef`
    MemberForwarded,
    /// Refers to `File`, `AssemblyRef` or `ExportedType`
    Implementation,
    /// Refers to `MethodDef` or `MemberRef` (attribute constructors)
    CustomAttributeType,
    /// Refers to `Module`, `ModuleRef`, `AssemblyRef` or `TypeRef`
    ResolutionScope,
    /// Refers to `TypeDef` or `MethodDef`
    TypeOrMethodDef,
}

impl CodedIndexType {
    /// Returns the tables that this coded index type can refer to, in tag order.
    #[must_use]
    pub fn tables(&self) -> &'static [TableId] {
        match self {
            CodedIndexType::TypeDefOrRef => {
                &[TableId::TypeDef, TableId::TypeRef, TableId::TypeSpec]
            }
            CodedIndexType::HasConstant => &[TableId::Field, TableId::Param, TableId::Property],
            CodedIndexType::HasCustomAttribute => &[
                TableId::MethodDef,
                TableId::Field,
                TableId::TypeRef,
                TableId::TypeDef,
                TableId::Param,
                TableId::InterfaceImpl,
                TableId::MemberRef,
                TableId::Module,
                TableId::DeclSecurity, // In the standard PDF, this is wrongly labeled as 'Permission' (although no such table exists)
                TableId::Property,
                TableId::Event,
                TableId::StandAloneSig,
                TableId::ModuleRef,
                TableId::TypeSpec,
                TableId::Assembly,
                TableId::AssemblyRef,
                TableId::File,
                TableId::ExportedType,
                TableId::ManifestResource,
                TableId::GenericParam,
                TableId::GenericParamConstraint,
                TableId::MethodSpec,
            ],
            CodedIndexType::HasFieldMarshal => &[TableId::Field, TableId::Param],
            CodedIndexType::HasDeclSecurity => {
                &[TableId::TypeDef, TableId::MethodDef, TableId::Assembly]
            }
            CodedIndexType::MemberRefParent => &[
                TableId::TypeDef,
                TableId::TypeRef,
                TableId::ModuleRef,
                TableId::MethodDef,
                TableId::TypeSpec,
            ],
            CodedIndexType::HasSemantics => &[TableId::Event, TableId::Property],
            CodedIndexType::MethodDefOrRef => &[TableId::MethodDef, TableId::MemberRef],
            CodedIndexType::MemberForwarded => &[TableId::Field, TableId::MethodDef],
            CodedIndexType::Implementation => {
                &[TableId::File, TableId::AssemblyRef, TableId::ExportedType]
            }
            // Tags 0, 1 and 4 are 'not used' per the standard, but they still
            // widen the tag to 3 bits, so they must stay in the list.
            CodedIndexType::CustomAttributeType => &[
                TableId::MethodDef,
                TableId::MethodDef,
                TableId::MethodDef,
                TableId::MemberRef,
                TableId::MemberRef,
            ],
            CodedIndexType::ResolutionScope => &[
                TableId::Module,
                TableId::ModuleRef,
                TableId::AssemblyRef,
                TableId::TypeRef,
            ],
            CodedIndexType::TypeOrMethodDef => &[TableId::TypeDef, TableId::MethodDef],
        }
    }
}

/// A raw Assembly table row, with heap indexes not yet resolved.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AssemblyRaw {
    /// `HashAlgId`, a 4-byte constant of type `AssemblyHashAlgorithm`
    pub hash_alg_id: u32,
    /// `MajorVersion`
    pub major_version: u16,
    /// `MinorVersion`
    pub minor_version: u16,
    /// `BuildNumber`
    pub build_number: u16,
    /// `RevisionNumber`
    pub revision_number: u16,
    /// `Flags`, a 4-byte bitmask of type `AssemblyFlags`
    pub flags: u32,
    /// Index into the `#Blob` heap, 0 if the assembly is not signed
    pub public_key: u32,
    /// Index into the `#Strings` heap
    pub name: u32,
    /// Index into the `#Strings` heap, 0 for culture-neutral assemblies
    pub culture: u32,
}

/// `PublicKey` flag of the Assembly `Flags` column; set when the `PublicKey`
/// blob holds the full key rather than a token.
pub const ASSEMBLY_FLAGS_PUBLIC_KEY: u32 = 0x0001;

/// A parsed view of the `#~` tables stream.
pub struct TablesStream<'a> {
    data: &'a [u8],
    info: TableInfo,
    valid: u64,
    rows_offset: usize,
}

impl<'a> TablesStream<'a> {
    /// Parses the `#~` stream header and row counts.
    ///
    /// # Errors
    /// Returns an error if the header is truncated, the schema version is
    /// unsupported, or the valid bitvector names a table outside the
    /// compressed-stream set.
    pub fn from(data: &'a [u8]) -> Result<TablesStream<'a>> {
        if data.len() < 24 {
            return Err(OutOfBounds);
        }

        let major_version = read_le::<u8>(&data[4..])?;
        if major_version != 2 {
            return Err(malformed_error!(
                "Unsupported tables schema version - {}",
                major_version
            ));
        }

        let valid = read_le::<u64>(&data[8..])?;
        let known = TableId::iter().fold(0_u64, |acc, id| acc | (1 << id as usize));
        if valid & !known != 0 {
            // Pointer tables and ENC tables only occur in the uncompressed '#-' stream
            return Err(malformed_error!(
                "Valid bitvector names an unknown table - {:#018X}",
                valid
            ));
        }

        let info = TableInfo::new(data, valid)?;
        let rows_offset = 24 + 4 * valid.count_ones() as usize;

        Ok(TablesStream {
            data,
            info,
            valid,
            rows_offset,
        })
    }

    /// Returns the sizing information for this stream.
    #[must_use]
    pub fn info(&self) -> &TableInfo {
        &self.info
    }

    /// Reads the Assembly table row, if the table is present.
    ///
    /// The Assembly table holds at most one row (ECMA-335 II.22.2); modules
    /// without an assembly manifest have none, in which case `Ok(None)` is
    /// returned.
    ///
    /// # Errors
    /// Returns an error if the stream data ends before the computed row offset.
    pub fn assembly(&self) -> Result<Option<AssemblyRaw>> {
        if self.valid & (1 << TableId::Assembly as usize) == 0
            || self.info.get(TableId::Assembly).rows == 0
        {
            return Ok(None);
        }

        let mut offset = self.rows_offset;
        for table_id in TableId::iter() {
            if table_id == TableId::Assembly {
                break;
            }

            let rows = self.info.get(table_id).rows as usize;
            offset += rows * self.info.row_size(table_id) as usize;
        }

        let data = self.data;
        let offset = &mut offset;
        Ok(Some(AssemblyRaw {
            hash_alg_id: read_le_at::<u32>(data, offset)?,
            major_version: read_le_at::<u16>(data, offset)?,
            minor_version: read_le_at::<u16>(data, offset)?,
            build_number: read_le_at::<u16>(data, offset)?,
            revision_number: read_le_at::<u16>(data, offset)?,
            flags: read_le_at::<u32>(data, offset)?,
            public_key: read_le_at_dyn(data, offset, self.info.is_large_blob())?,
            name: read_le_at_dyn(data, offset, self.info.is_large_str())?,
            culture: read_le_at_dyn(data, offset, self.info.is_large_str())?,
        }))
    }
}
