//! Metadata stream access for .NET assemblies.
//!
//! The metadata root carries a directory of named streams; this module
//! provides the ones identity extraction needs: the stream directory entries
//! themselves ([`StreamHeader`]), the identifier heap ([`Strings`]) and the
//! binary heap ([`Blob`]). The `#~` tables stream is handled by
//! [`crate::metadata::tables`].

mod blob;
mod streamheader;
mod strings;

pub use blob::Blob;
pub use streamheader::StreamHeader;
pub use strings::Strings;
