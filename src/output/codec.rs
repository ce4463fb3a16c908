//! Gzip-compressed newline-delimited JSON

use crate::error::{Error, Result};
use crate::types::JsonValue;
use bytes::Bytes;
use flate2::read::MultiGzDecoder;
use flate2::{Compression, GzBuilder};
use std::io::{Read, Write};

/// Encode records as gzip NDJSON, one compact JSON document per line.
///
/// The gzip header carries no filename or mtime, so identical input produces
/// identical bytes.
pub fn encode_ndjson_gz(records: &[JsonValue]) -> Result<Bytes> {
    let mut encoder = GzBuilder::new().mtime(0).write(Vec::new(), Compression::default());
    for record in records {
        serde_json::to_writer(&mut encoder, record)?;
        encoder.write_all(b"\n")?;
    }
    encoder
        .finish()
        .map(Bytes::from)
        .map_err(|e| Error::Compression {
            message: format!("gzip finish failed: {e}"),
        })
}

/// Gzip of an empty payload, used for `_SUCCESS` markers
pub fn empty_gz() -> Result<Bytes> {
    encode_ndjson_gz(&[])
}

/// Inflate a gzip payload into text lines (blank lines dropped)
pub fn decode_gz_lines(data: &[u8]) -> Result<Vec<String>> {
    let mut text = String::new();
    MultiGzDecoder::new(data)
        .read_to_string(&mut text)
        .map_err(|e| Error::Compression {
            message: format!("gzip decode failed: {e}"),
        })?;
    Ok(text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}

/// Decode gzip NDJSON strictly; any unparseable line is an error
pub fn decode_ndjson_gz(data: &[u8]) -> Result<Vec<JsonValue>> {
    decode_gz_lines(data)?
        .iter()
        .map(|line| serde_json::from_str(line).map_err(Error::from))
        .collect()
}
