//! Record verification and the compressed wire encoding.
//!
//! A record travels as `zlib(utf8(canonical_json(record)))`. Canonical JSON
//! has object keys sorted at every level and serde_json's number and string
//! formatting, so equal records always encode to equal bytes.
//!
//! All functions here are pure: the grammar is passed in, nothing is cached
//! between calls.
//!
//! # Example
//!
//! ```rust
//! use bowwire_protocol::{AcceptAll, Record, decode, encode};
//! use serde_json::json;
//!
//! let record: Record = serde_json::from_value(json!({"channel": "/queue/x", "seq": 1})).unwrap();
//! let payload = encode(&record, &AcceptAll).unwrap();
//! assert_eq!(decode(&payload, &AcceptAll).unwrap(), record);
//! ```

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

use crate::Record;
use crate::error::{ProtocolError, ProtocolResult};
use crate::framing::{read_message, send_message};
use crate::grammar::{
    FieldType, MAX_NESTING_DEPTH, Validator, Violation, ViolationKind, check_depth,
};

/// Upper bound on the decompressed size of a payload.
pub const MAX_DECODED_SIZE: usize = 64 * 1024 * 1024;

/// Minimum growth step of the decompression buffer.
const INFLATE_CHUNK: usize = 4096;

/// Validates a record and returns its canonical text.
///
/// Fails with [`ProtocolError::GrammarViolation`] naming the offending field.
/// Records nested deeper than [`MAX_NESTING_DEPTH`] are refused under any
/// validator.
pub fn verify<V: Validator + ?Sized>(record: &Record, validator: &V) -> ProtocolResult<String> {
    check_depth(record, MAX_NESTING_DEPTH).map_err(ProtocolError::GrammarViolation)?;
    validator
        .validate(record)
        .map_err(ProtocolError::GrammarViolation)?;

    let text = canonical_text(record)?;
    trace!(canonical = %text, "record verified");
    Ok(text)
}

/// Verifies a record and compresses its canonical text.
///
/// Nothing is produced unless verification succeeds.
pub fn encode<V: Validator + ?Sized>(record: &Record, validator: &V) -> ProtocolResult<Vec<u8>> {
    let text = verify(record, validator)?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(text.as_bytes())
        .map_err(|e| ProtocolError::Encoding(format!("compression failed: {e}")))?;
    let payload = encoder
        .finish()
        .map_err(|e| ProtocolError::Encoding(format!("compression failed: {e}")))?;

    debug!(
        text_len = text.len(),
        payload_len = payload.len(),
        "record encoded"
    );
    Ok(payload)
}

/// Decompresses and parses a payload, then re-validates the record.
///
/// Fails with [`ProtocolError::CorruptPayload`] if the bytes are not a
/// complete zlib stream of UTF-8 JSON, and with
/// [`ProtocolError::MalformedData`] if the JSON is not a mapping or breaks
/// the grammar. Input does not have to be canonical: any JSON object text
/// from a compatible producer is accepted.
pub fn decode<V: Validator + ?Sized>(payload: &[u8], validator: &V) -> ProtocolResult<Record> {
    decode_limited(payload, validator, MAX_DECODED_SIZE)
}

/// Like [`decode`], with a caller-chosen cap on the decompressed size.
pub fn decode_limited<V: Validator + ?Sized>(
    payload: &[u8],
    validator: &V,
    max_decoded: usize,
) -> ProtocolResult<Record> {
    let bytes = inflate(payload, max_decoded)?;
    let text = std::str::from_utf8(&bytes)
        .map_err(|e| ProtocolError::corrupt(format!("payload is not UTF-8: {e}")))?;

    let value: Value = serde_json::from_str(text)
        .map_err(|e| ProtocolError::corrupt(format!("payload is not JSON: {e}")))?;

    let record = match value {
        Value::Object(record) => record,
        other => {
            return Err(ProtocolError::MalformedData(Violation::root(
                ViolationKind::NotAMapping {
                    found: FieldType::of(&other),
                },
            )));
        }
    };

    check_depth(&record, MAX_NESTING_DEPTH).map_err(ProtocolError::MalformedData)?;
    validator
        .validate(&record)
        .map_err(ProtocolError::MalformedData)?;

    trace!(keys = record.len(), "record decoded");
    Ok(record)
}

/// Returns the canonical text of a record, without validating it.
pub fn canonical_text(record: &Record) -> ProtocolResult<String> {
    let sorted = sort_keys(record);
    serde_json::to_string(&sorted).map_err(|e| ProtocolError::Encoding(e.to_string()))
}

/// Rebuilds a map with keys inserted in sorted order, recursively.
///
/// serde_json's default map is already ordered; this keeps the output
/// canonical when `preserve_order` is enabled elsewhere in the build.
fn sort_keys(map: &Map<String, Value>) -> Map<String, Value> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    let mut sorted = Map::new();
    for key in keys {
        sorted.insert(key.clone(), sort_value(&map[key]));
    }
    sorted
}

fn sort_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(sort_keys(map)),
        Value::Array(items) => Value::Array(items.iter().map(sort_value).collect()),
        other => other.clone(),
    }
}

/// Inflates a complete zlib stream.
///
/// Truncated streams, trailing bytes and output above `max` bytes are all
/// reported as corruption.
fn inflate(payload: &[u8], max: usize) -> ProtocolResult<Vec<u8>> {
    let mut inflater = Decompress::new(true);
    let initial = payload.len().saturating_mul(4).min(max).max(INFLATE_CHUNK);
    let mut out = Vec::with_capacity(initial);

    loop {
        if out.len() == out.capacity() {
            out.reserve(out.capacity().max(INFLATE_CHUNK));
        }

        let consumed = inflater.total_in() as usize;
        let produced = out.len();
        let status = inflater
            .decompress_vec(&payload[consumed..], &mut out, FlushDecompress::None)
            .map_err(|e| ProtocolError::corrupt(format!("inflate failed: {e}")))?;

        if out.len() > max {
            return Err(ProtocolError::corrupt(format!(
                "decompressed size exceeds {max} bytes"
            )));
        }

        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                let progressed =
                    inflater.total_in() as usize != consumed || out.len() != produced;
                if !progressed && out.len() < out.capacity() {
                    return Err(ProtocolError::corrupt("truncated zlib stream"));
                }
            }
        }
    }

    let consumed = inflater.total_in() as usize;
    if consumed != payload.len() {
        return Err(ProtocolError::corrupt(format!(
            "{} trailing bytes after zlib stream",
            payload.len() - consumed
        )));
    }

    Ok(out)
}

/// Encodes a record and sends it as one frame.
pub async fn send_record<W, V>(stream: &mut W, record: &Record, validator: &V) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
    V: Validator + ?Sized,
{
    let payload = encode(record, validator)?;
    send_message(stream, &payload).await
}

/// Reads one frame and decodes it as a record.
pub async fn read_record<R, V>(stream: &mut R, validator: &V) -> ProtocolResult<Record>
where
    R: AsyncRead + Unpin + ?Sized,
    V: Validator + ?Sized,
{
    let payload = read_message(stream).await?;
    decode(&payload, validator)
}
