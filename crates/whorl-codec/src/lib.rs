//! Byte formats for Whorl items.
//!
//! - [`envelope`]: reversible transport encoding of raw item bytes
//! - [`archive`]: the `.whorl` item archive and its manifest
//! - [`checksum`]: blake3 checksums used by both
//!
//! # Examples
//!
//! ```
//! use whorl_codec::envelope;
//!
//! let envelope = envelope::encode(&[0xde, 0xad, 0xbe, 0xef]).unwrap();
//! assert_eq!(envelope::decode(&envelope).unwrap(), [0xde, 0xad, 0xbe, 0xef]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod archive;
pub mod checksum;
pub mod envelope;

pub use archive::{
    ARCHIVE_EXTENSION, ArchiveContents, ArchiveManifest, MANIFEST_FILE, is_archive_bytes,
};
pub use envelope::{decode, encode};

/// Upper bound on the unpacked size of an envelope or archive.
pub const MAX_UNPACKED_BYTES: u64 = 64 * 1024 * 1024;
