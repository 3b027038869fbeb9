//! CIL metadata parsing, just deep enough to read an assembly's identity.
//!
//! The layers mirror the on-disk format: the CLR runtime header points at the
//! metadata root, the root lists the streams, and the `#~` stream holds the
//! Assembly table whose heap indexes resolve through `#Strings` and `#Blob`.

pub mod cor20header;
pub mod identity;
pub mod root;
pub mod streams;
pub mod tables;
