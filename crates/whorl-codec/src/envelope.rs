//! Transmission envelope for raw item bytes.
//!
//! An envelope is a gzip-compressed tar stream holding exactly one regular
//! file, encoded with standard base64. The entry is always written as
//! `payload` with mode `0644` and mtime `0`, so encoding is deterministic.
//! On decode the entry name is ignored.
//!
//! # Examples
//!
//! ```
//! use whorl_codec::envelope::{decode, encode};
//!
//! let bytes = b"(module $Widget)".to_vec();
//! let envelope = encode(&bytes).unwrap();
//! assert_eq!(decode(&envelope).unwrap(), bytes);
//! ```

use crate::MAX_UNPACKED_BYTES;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::Read;
use tracing::debug;
use whorl_core::{Envelope, Error, Result};

/// Name given to the single entry of an encoded envelope.
pub const PAYLOAD_ENTRY: &str = "payload";

fn codec_error(message: &str, source: impl Into<whorl_core::BoxError>) -> Error {
    Error::CodecError {
        message: message.to_string(),
        source: Some(source.into()),
    }
}

/// Encodes raw bytes into a transport-safe envelope.
///
/// # Errors
///
/// Returns [`Error::CodecError`] if the tar or gzip stream cannot be written.
pub fn encode(bytes: &[u8]) -> Result<Envelope> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);

    builder
        .append_data(&mut header, PAYLOAD_ENTRY, bytes)
        .map_err(|e| codec_error("failed to write payload entry", e))?;
    let compressed = builder
        .into_inner()
        .and_then(GzEncoder::finish)
        .map_err(|e| codec_error("failed to finish envelope stream", e))?;

    let envelope = Envelope::new(STANDARD.encode(compressed));
    debug!(
        raw_bytes = bytes.len(),
        encoded_bytes = envelope.len(),
        "encoded envelope"
    );
    Ok(envelope)
}

/// Decodes an envelope back into the original bytes.
///
/// Leading and trailing ASCII whitespace around the base64 text is ignored.
///
/// # Errors
///
/// Returns [`Error::CodecError`] if the text is not base64, the stream is
/// corrupt, the archive holds zero or several entries, the entry is not a
/// regular file, or the payload exceeds the unpacked size limit.
pub fn decode(envelope: &Envelope) -> Result<Vec<u8>> {
    decode_str(envelope.as_str())
}

/// Decodes envelope text; see [`decode`].
///
/// # Errors
///
/// Same as [`decode`].
pub fn decode_str(text: &str) -> Result<Vec<u8>> {
    let compressed = STANDARD
        .decode(text.trim_ascii())
        .map_err(|e| codec_error("envelope is not valid base64", e))?;

    let mut archive = tar::Archive::new(GzDecoder::new(compressed.as_slice()));
    let entries = archive
        .entries()
        .map_err(|e| codec_error("envelope stream is corrupt", e))?;

    let mut payload: Option<Vec<u8>> = None;
    let mut count = 0usize;
    for entry in entries {
        let mut entry = entry.map_err(|e| codec_error("envelope stream is corrupt", e))?;
        count += 1;
        if count > 1 {
            continue;
        }

        let entry_type = entry.header().entry_type();
        if !entry_type.is_file() {
            return Err(Error::codec(format!(
                "envelope entry is not a regular file ({entry_type:?})"
            )));
        }

        let mut buf = Vec::new();
        (&mut entry)
            .take(MAX_UNPACKED_BYTES + 1)
            .read_to_end(&mut buf)
            .map_err(|e| codec_error("envelope payload is corrupt", e))?;
        if buf.len() as u64 > MAX_UNPACKED_BYTES {
            return Err(Error::codec(format!(
                "envelope payload exceeds {MAX_UNPACKED_BYTES} bytes"
            )));
        }
        payload = Some(buf);
    }

    match (count, payload) {
        (1, Some(bytes)) => {
            debug!(raw_bytes = bytes.len(), "decoded envelope");
            Ok(bytes)
        }
        (n, _) => Err(Error::codec(format!(
            "envelope must contain exactly one entry, found {n}"
        ))),
    }
}
