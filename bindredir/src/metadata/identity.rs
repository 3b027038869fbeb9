//! Strong-name identity extraction.
//!
//! An assembly identity is the tuple a binding policy is keyed on: simple
//! name, four-part version, culture and public-key token. The Assembly table
//! stores the full public key; the 8-byte token shown in config files is the
//! tail of its SHA-1 hash, printed in reverse byte order.
//!
//! # ECMA-335 References
//! - **II.6.2.1**: Assembly versioning - four-part version number semantics
//! - **II.6.2.1.3**: Public key and token - strong name identity format
//! - **II.22.2**: Assembly table - assembly metadata structure

use std::fmt;
use std::path::Path;

use sha1::{Digest, Sha1};

use crate::{
    file::File,
    malformed_error,
    metadata::{
        cor20header::Cor20Header,
        root::Root,
        streams::{Blob, Strings},
        tables::TablesStream,
    },
    Error, Result,
};

/// A four-part assembly version (major.minor.build.revision).
///
/// Each component is a 16-bit value, matching the four version columns of the
/// Assembly table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssemblyVersion {
    /// `MajorVersion`
    pub major: u16,
    /// `MinorVersion`
    pub minor: u16,
    /// `BuildNumber`
    pub build: u16,
    /// `RevisionNumber`
    pub revision: u16,
}

impl AssemblyVersion {
    /// Creates a new version from its four components.
    #[must_use]
    pub fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        AssemblyVersion {
            major,
            minor,
            build,
            revision,
        }
    }
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// The strong-name identity of an assembly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssemblyIdentity {
    /// Simple name, e.g. "System.Core"
    pub name: String,
    /// Four-part version from the Assembly table
    pub version: AssemblyVersion,
    /// Culture, `None` for culture-neutral assemblies
    pub culture: Option<String>,
    /// Public-key token in display byte order, `None` if unsigned
    pub public_key_token: Option<[u8; 8]>,
}

impl AssemblyIdentity {
    /// Returns true if the assembly carries a public key.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.public_key_token.is_some()
    }

    /// Returns the public-key token as 16 lowercase hex characters.
    #[must_use]
    pub fn token_hex(&self) -> Option<String> {
        self.public_key_token.map(|token| {
            let mut out = String::with_capacity(16);
            for byte in token {
                use fmt::Write;
                // Writing to a String cannot fail
                let _ = write!(out, "{byte:02x}");
            }
            out
        })
    }

    /// Reads the identity from a PE file on disk.
    ///
    /// Returns `Ok(None)` for modules that carry CIL metadata but no
    /// assembly manifest.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not a CLR image, or
    /// its metadata is malformed.
    pub fn from_file(path: &Path) -> Result<Option<AssemblyIdentity>> {
        let file = File::from_file(path)?;

        let (clr_rva, clr_size) = file.clr();
        let clr_offset = file.rva_to_offset(clr_rva as usize)?;
        let cor20 = Cor20Header::read(file.data_slice(clr_offset, clr_size as usize)?)?;

        let meta_offset = file.rva_to_offset(cor20.meta_data_rva as usize)?;
        let meta = file.data_slice(meta_offset, cor20.meta_data_size as usize)?;

        Self::from_metadata(meta)
    }

    /// Reads the identity from a raw metadata blob (starting at `BSJB`).
    ///
    /// # Errors
    /// Returns an error if the metadata root, a required stream, or the
    /// Assembly row is malformed.
    pub fn from_metadata(meta: &[u8]) -> Result<Option<AssemblyIdentity>> {
        let root = Root::read(meta)?;

        let Some(tables_header) = root.stream("#~") else {
            // The uncompressed '#-' layout only occurs in ENC scenarios
            return Err(Error::NotSupported);
        };
        let Some(strings_header) = root.stream("#Strings") else {
            return Err(malformed_error!("Missing '#Strings' stream"));
        };

        let tables_data =
            &meta[tables_header.offset as usize..][..tables_header.size as usize];
        let tables = TablesStream::from(tables_data)?;

        let Some(row) = tables.assembly()? else {
            return Ok(None);
        };

        let strings_data =
            &meta[strings_header.offset as usize..][..strings_header.size as usize];
        let strings = Strings::from(strings_data)?;

        let name = strings.get(row.name as usize)?.to_string();
        if name.is_empty() {
            return Err(malformed_error!("Assembly row has an empty name"));
        }

        let culture = if row.culture == 0 {
            None
        } else {
            let culture = strings.get(row.culture as usize)?;
            if culture.is_empty() {
                None
            } else {
                Some(culture.to_string())
            }
        };

        let public_key_token = if row.public_key == 0 {
            None
        } else {
            let Some(blob_header) = root.stream("#Blob") else {
                return Err(malformed_error!("Missing '#Blob' stream"));
            };
            let blob_data = &meta[blob_header.offset as usize..][..blob_header.size as usize];
            let blob = Blob::from(blob_data)?;

            let key = blob.get(row.public_key as usize)?;
            if key.is_empty() {
                None
            } else {
                Some(public_key_token(key))
            }
        };

        Ok(Some(AssemblyIdentity {
            name,
            version: AssemblyVersion::new(
                row.major_version,
                row.minor_version,
                row.build_number,
                row.revision_number,
            ),
            culture,
            public_key_token,
        }))
    }
}

/// Computes the public-key token for a full public key.
///
/// The token is the last 8 bytes of the SHA-1 hash of the key, reversed into
/// display order. The hash algorithm is fixed; the Assembly table's
/// `HashAlgId` column governs file hashes, not token derivation.
#[must_use]
pub fn public_key_token(key: &[u8]) -> [u8; 8] {
    let mut hasher = Sha1::new();
    hasher.update(key);
    let digest = hasher.finalize();

    let mut token = [0_u8; 8];
    for (i, byte) in digest[digest.len() - 8..].iter().rev().enumerate() {
        token[i] = *byte;
    }
    token
}

/// Extracts assembly identities from files found during a scan.
///
/// Implementations decide which files they apply to and may report a file as
/// not carrying an identity at all; the scan keeps going either way.
pub trait IdentityExtractor {
    /// Returns true if this extractor should be tried on the given path.
    fn applies_to(&self, path: &Path) -> bool;

    /// Extracts the identity, or `None` if the file carries no usable one.
    ///
    /// # Errors
    /// Returns an error only for I/O failures; content that merely fails to
    /// parse is reported as `None`.
    fn extract(&self, path: &Path) -> Result<Option<AssemblyIdentity>>;
}

/// Identity extractor for CLR images (managed `.dll` and `.exe` files).
///
/// Native binaries and files with malformed metadata are treated as carrying
/// no identity rather than failing the scan.
pub struct CilExtractor;

impl IdentityExtractor for CilExtractor {
    fn applies_to(&self, path: &Path) -> bool {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => ext.eq_ignore_ascii_case("dll") || ext.eq_ignore_ascii_case("exe"),
            None => false,
        }
    }

    fn extract(&self, path: &Path) -> Result<Option<AssemblyIdentity>> {
        match AssemblyIdentity::from_file(path) {
            Ok(identity) => Ok(identity),
            Err(Error::FileError(error)) => Err(Error::FileError(error)),
            Err(_) => Ok(None),
        }
    }
}
