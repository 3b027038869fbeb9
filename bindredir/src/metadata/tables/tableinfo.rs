use strum::{EnumCount, IntoEnumIterator};

use crate::{
    file::io::{read_le, read_le_at},
    metadata::tables::{CodedIndexType, TableId},
    Error::OutOfBounds,
    Result,
};

/// Holds information about the size that reference index fields have
#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub struct TableRowInfo {
    /// The count of rows in this table
    pub rows: u32,
    /// Number of bits required to represent any valid row index
    pub bits: u8,
    /// If the count is > `u16::max`, the indexes of other tables into this table will be 4 bytes instead of 2
    pub is_large: bool,
}

impl TableRowInfo {
    /// Creates a new `TableRowInfo` instance with the given row count.
    ///
    /// Automatically calculates the number of bits required to represent
    /// indices into a table with the specified number of rows.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(rows: u32) -> Self {
        let bits = if rows == 0 {
            1
        } else {
            let zeros = rows.leading_zeros();
            // Safe: 32 - zeros is always <= 32, fits in u8
            (32 - zeros) as u8
        };

        Self {
            rows,
            bits,
            is_large: rows > u32::from(u16::MAX),
        }
    }
}

/// `TableInfo` holds information regarding the row count and reference index field sizes
/// of all tables in this binary
#[derive(Clone, Default)]
pub struct TableInfo {
    rows: Vec<TableRowInfo>,
    coded_indexes: Vec<u8>,
    is_large_index_str: bool,
    is_large_index_guid: bool,
    is_large_index_blob: bool,
}

impl TableInfo {
    /// Build a new `TableInfo` struct
    ///
    /// ## Arguments
    /// * 'data' - The `#~` stream data that the row counts will be parsed from
    /// * '`valid_bitvec`' - The valid bitvector from the header, showing which tables are present
    ///
    /// # Errors
    /// Returns an error if the table data is insufficient or malformed
    pub fn new(data: &[u8], valid_bitvec: u64) -> Result<Self> {
        let mut table_info =
            vec![TableRowInfo::default(); TableId::GenericParamConstraint as usize + 1];
        let mut next_row_offset = 24;

        for table_id in TableId::iter() {
            if data.len() < next_row_offset {
                return Err(OutOfBounds);
            }

            if (valid_bitvec & (1 << table_id as usize)) == 0 {
                continue;
            }

            let row_count = read_le_at::<u32>(data, &mut next_row_offset)?;
            if row_count == 0 {
                // Empty tables should be omitted during compilation and not be present in a valid sample
                continue;
            }

            table_info[table_id as usize] = TableRowInfo::new(row_count);
        }

        let heap_size_flags = read_le::<u8>(&data[6..])?;
        let mut table_info = TableInfo {
            rows: table_info,
            coded_indexes: vec![0; CodedIndexType::COUNT],
            is_large_index_str: heap_size_flags & 1 == 1,
            is_large_index_guid: heap_size_flags & 2 == 2,
            is_large_index_blob: heap_size_flags & 4 == 4,
        };

        table_info.calculate_coded_index_bits();

        Ok(table_info)
    }

    #[cfg(test)]
    /// Special constructor for unit-tests
    ///
    /// ## Arguments
    /// * 'valid_tables'    - A slice of tuples, which provides (table_id, row_count) of the valid tables
    /// * 'large_str'       - Specify if the #String heap indexes are 4 or 2 bytes
    /// * 'large_blob'      - Specify if the #Blob heap indexes are 4 or 2 bytes
    /// * 'large_guid'      - Specify if the #GUID heap indexes are 4 or 2 bytes
    pub fn new_test(
        valid_tables: &[(TableId, u32)],
        large_str: bool,
        large_blob: bool,
        large_guid: bool,
    ) -> Self {
        let mut table_info = TableInfo {
            rows: vec![TableRowInfo::default(); TableId::GenericParamConstraint as usize + 1],
            coded_indexes: vec![0; CodedIndexType::COUNT],
            is_large_index_str: large_str,
            is_large_index_guid: large_guid,
            is_large_index_blob: large_blob,
        };

        for valid_table in valid_tables {
            table_info.rows[valid_table.0 as usize] = TableRowInfo::new(valid_table.1);
        }

        table_info.calculate_coded_index_bits();
        table_info
    }

    /// Returns the size of indexes referring into the '#String' heap in bytes
    #[must_use]
    pub fn str_bytes(&self) -> u8 {
        if self.is_large_index_str {
            4
        } else {
            2
        }
    }

    /// Returns the size of indexes referring into the '#Guid' heap in bytes
    #[must_use]
    pub fn guid_bytes(&self) -> u8 {
        if self.is_large_index_guid {
            4
        } else {
            2
        }
    }

    /// Returns the size of indexes referring into the '#Blob' heap in bytes
    #[must_use]
    pub fn blob_bytes(&self) -> u8 {
        if self.is_large_index_blob {
            4
        } else {
            2
        }
    }

    /// Indicates the size of indexes referring into the '#String' heap. True means 4 bytes, False is 2 bytes
    #[must_use]
    pub fn is_large_str(&self) -> bool {
        self.is_large_index_str
    }

    /// Indicates the size of indexes referring into the '#Blob' heap. True means 4 bytes, False is 2 bytes
    #[must_use]
    pub fn is_large_blob(&self) -> bool {
        self.is_large_index_blob
    }

    /// Returns the metadata for a specific table.
    ///
    /// # Arguments
    /// * `table` - The `TableId` for which to retrieve metadata
    #[must_use]
    pub fn get(&self, table: TableId) -> &TableRowInfo {
        &self.rows[table as usize]
    }

    /// Returns the number of bits required to represent an index into a specific table.
    #[must_use]
    pub fn table_index_bits(&self, table_id: TableId) -> u8 {
        self.rows[table_id as usize].bits
    }

    /// Returns the number of bytes required to represent an index into a specific table.
    #[must_use]
    pub fn table_index_bytes(&self, table_id: TableId) -> u8 {
        if self.rows[table_id as usize].is_large {
            4
        } else {
            2
        }
    }

    /// Returns the cached byte size for a specific coded index reference.
    #[must_use]
    pub fn coded_index_bytes(&self, coded_index_type: CodedIndexType) -> u8 {
        if self.coded_indexes[coded_index_type as usize] > 16 {
            4
        } else {
            2
        }
    }

    /// Returns the on-disk size of one row of the given table in bytes.
    ///
    /// The layouts follow ECMA-335 II.22; fixed-size columns contribute their
    /// declared width, while heap indexes, table indexes and coded indexes
    /// contribute 2 or 4 bytes depending on the heap and row-count thresholds.
    #[must_use]
    pub fn row_size(&self, table_id: TableId) -> u32 {
        let str_b = u32::from(self.str_bytes());
        let guid_b = u32::from(self.guid_bytes());
        let blob_b = u32::from(self.blob_bytes());
        let idx = |table| u32::from(self.table_index_bytes(table));
        let coded = |ci_type| u32::from(self.coded_index_bytes(ci_type));

        match table_id {
            TableId::Module => 2 + str_b + 3 * guid_b,
            TableId::TypeRef => coded(CodedIndexType::ResolutionScope) + 2 * str_b,
            TableId::TypeDef => {
                4 + 2 * str_b
                    + coded(CodedIndexType::TypeDefOrRef)
                    + idx(TableId::Field)
                    + idx(TableId::MethodDef)
            }
            TableId::Field => 2 + str_b + blob_b,
            TableId::MethodDef => 8 + str_b + blob_b + idx(TableId::Param),
            TableId::Param => 4 + str_b,
            TableId::InterfaceImpl => idx(TableId::TypeDef) + coded(CodedIndexType::TypeDefOrRef),
            TableId::MemberRef => coded(CodedIndexType::MemberRefParent) + str_b + blob_b,
            TableId::Constant => 2 + coded(CodedIndexType::HasConstant) + blob_b,
            TableId::CustomAttribute => {
                coded(CodedIndexType::HasCustomAttribute)
                    + coded(CodedIndexType::CustomAttributeType)
                    + blob_b
            }
            TableId::FieldMarshal => coded(CodedIndexType::HasFieldMarshal) + blob_b,
            TableId::DeclSecurity => 2 + coded(CodedIndexType::HasDeclSecurity) + blob_b,
            TableId::ClassLayout => 6 + idx(TableId::TypeDef),
            TableId::FieldLayout => 4 + idx(TableId::Field),
            TableId::StandAloneSig => blob_b,
            TableId::EventMap => idx(TableId::TypeDef) + idx(TableId::Event),
            TableId::Event => 2 + str_b + coded(CodedIndexType::TypeDefOrRef),
            TableId::PropertyMap => idx(TableId::TypeDef) + idx(TableId::Property),
            TableId::Property => 2 + str_b + blob_b,
            TableId::MethodSemantics => {
                2 + idx(TableId::MethodDef) + coded(CodedIndexType::HasSemantics)
            }
            TableId::MethodImpl => {
                idx(TableId::TypeDef) + 2 * coded(CodedIndexType::MethodDefOrRef)
            }
            TableId::ModuleRef => str_b,
            TableId::TypeSpec => blob_b,
            TableId::ImplMap => {
                2 + coded(CodedIndexType::MemberForwarded) + str_b + idx(TableId::ModuleRef)
            }
            TableId::FieldRVA => 4 + idx(TableId::Field),
            TableId::Assembly => 16 + blob_b + 2 * str_b,
            TableId::AssemblyProcessor => 4,
            TableId::AssemblyOS => 12,
            TableId::AssemblyRef => 12 + 2 * blob_b + 2 * str_b,
            TableId::AssemblyRefProcessor => 4 + idx(TableId::AssemblyRef),
            TableId::AssemblyRefOS => 12 + idx(TableId::AssemblyRef),
            TableId::File => 4 + str_b + blob_b,
            TableId::ExportedType => {
                8 + 2 * str_b + coded(CodedIndexType::Implementation)
            }
            TableId::ManifestResource => {
                8 + str_b + coded(CodedIndexType::Implementation)
            }
            TableId::NestedClass => 2 * idx(TableId::TypeDef),
            TableId::GenericParam => {
                4 + coded(CodedIndexType::TypeOrMethodDef) + str_b
            }
            TableId::MethodSpec => coded(CodedIndexType::MethodDefOrRef) + blob_b,
            TableId::GenericParamConstraint => {
                idx(TableId::GenericParam) + coded(CodedIndexType::TypeDefOrRef)
            }
        }
    }

    /// Calculates the number of bits required for a specific coded index type.
    fn calculate_coded_index_size(&self, coded_index_type: CodedIndexType) -> u8 {
        let tables = coded_index_type.tables();
        let max_bits = tables
            .iter()
            .map(|table| self.table_index_bits(*table))
            .max()
            .unwrap_or(1);

        // Safe cast: tables.len() is limited by the enum size, log2 result is small
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let tag_bits = (tables.len() as f32).log2().ceil() as u8;
        max_bits + tag_bits
    }

    /// Calculates and caches the bit sizes required for all coded index types.
    fn calculate_coded_index_bits(&mut self) {
        for coded_index in CodedIndexType::iter() {
            let size = self.calculate_coded_index_size(coded_index);
            self.coded_indexes[coded_index as usize] = size;
        }
    }
}
