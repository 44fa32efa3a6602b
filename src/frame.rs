//! Frame decoding: decompression, control detection, field de-obfuscation.
//!
//! ```text
//! RawFrame ──brotli──▶ text ──┬─ "DISABLE" / "HIDE:<id>" ──▶ DecodedBatch::Control
//!                             └─ JSON array ──cipher──▶ records ──▶ DecodedBatch::Records
//! ```
//!
//! Control strings are recognised before any JSON parsing so they never
//! reach the structured parser.  Every field of the record at batch
//! position `i` is de-obfuscated with that same `i`, including numbers
//! nested inside array fields.

use std::io;

use log::{debug, warn};
use serde_json::Value;

use crate::cipher;
use crate::error::DecodeError;
use crate::protocol::{self, ControlCommand, DecodedBatch};

// ---------------------------------------------------------------------------
// Compression
// ---------------------------------------------------------------------------

/// Inflate one brotli-compressed frame.
pub fn brotli_decompress(frame: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    brotli::BrotliDecompress(&mut io::Cursor::new(frame), &mut out)?;
    Ok(out)
}

/// Compress a payload into a frame, as the server does.
pub fn brotli_compress(payload: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let params = brotli::enc::BrotliEncoderParams::default();
    brotli::BrotliCompress(&mut io::Cursor::new(payload), &mut out, &params)?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode one frame with an injected decompressor.
pub fn decode_frame<F>(frame: &[u8], decompress: F) -> Result<DecodedBatch, DecodeError>
where
    F: FnOnce(&[u8]) -> io::Result<Vec<u8>>,
{
    let raw = decompress(frame).map_err(|source| DecodeError::Decompress {
        frame_len: frame.len(),
        source,
    })?;
    decode_payload(&String::from_utf8_lossy(&raw))
}

/// Decode an already-decompressed payload.
pub fn decode_payload(text: &str) -> Result<DecodedBatch, DecodeError> {
    if let Some(cmd) = ControlCommand::parse(text) {
        return Ok(DecodedBatch::Control(cmd));
    }

    let Value::Array(items) = serde_json::from_str::<Value>(text)? else {
        return Err(DecodeError::NotABatch);
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let Value::Array(fields) = item else {
            warn!("Skipping non-array record at batch position {}", index);
            continue;
        };
        let fields: Vec<Value> = fields
            .into_iter()
            .map(|field| deobfuscate_field(field, index))
            .collect();
        match protocol::record_from_fields(&fields) {
            Some(record) => records.push(record),
            None => warn!(
                "Skipping malformed record at batch position {}: {:?}",
                index, fields
            ),
        }
    }
    Ok(DecodedBatch::Records(records))
}

fn deobfuscate_field(field: Value, index: usize) -> Value {
    match field {
        Value::String(s) => Value::String(cipher::decode_text(&s)),
        Value::Number(_) => shift_number(field, index, cipher::decode_number),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| match v {
                    Value::Number(_) => shift_number(v, index, cipher::decode_number),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}

fn shift_number(v: Value, index: usize, op: fn(f64, usize) -> f64) -> Value {
    match v.as_f64() {
        Some(f) => serde_json::Number::from_f64(op(f, index))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        None => v,
    }
}

// ---------------------------------------------------------------------------
// Encoding (server side of the format; fixtures and replay tooling)
// ---------------------------------------------------------------------------

/// Obfuscate plaintext records into the JSON payload a server would send.
pub fn encode_payload(records: &[Vec<Value>]) -> String {
    let items: Vec<Value> = records
        .iter()
        .enumerate()
        .map(|(index, fields)| {
            Value::Array(
                fields
                    .iter()
                    .cloned()
                    .map(|field| obfuscate_field(field, index))
                    .collect(),
            )
        })
        .collect();
    Value::Array(items).to_string()
}

fn obfuscate_field(field: Value, index: usize) -> Value {
    match field {
        Value::String(s) => Value::String(cipher::encode_text(&s)),
        Value::Number(_) => shift_number(field, index, cipher::encode_number),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| match v {
                    Value::Number(_) => shift_number(v, index, cipher::encode_number),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}

// ---------------------------------------------------------------------------
// FrameDecoder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub decoded: u64,
    pub dropped: u64,
}

/// Brotli frame decoder that never fails: a bad frame becomes an empty
/// batch and is counted as dropped.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    stats: DecoderStats,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, frame: &[u8]) -> DecodedBatch {
        match decode_frame(frame, brotli_decompress) {
            Ok(batch) => {
                self.stats.decoded += 1;
                debug!("Decoded {}-byte frame", frame.len());
                batch
            }
            Err(e) => {
                self.stats.dropped += 1;
                warn!("Dropping frame: {}", e);
                DecodedBatch::empty()
            }
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Record;
    use serde_json::json;

    fn identity(frame: &[u8]) -> io::Result<Vec<u8>> {
        Ok(frame.to_vec())
    }

    fn failing(_: &[u8]) -> io::Result<Vec<u8>> {
        Err(io::Error::new(io::ErrorKind::InvalidData, "corrupt"))
    }

    // ---------------------------------------------------------------
    // Control strings
    // ---------------------------------------------------------------

    #[test]
    fn disable_is_returned_unchanged() {
        let batch = decode_frame(b"DISABLE", identity).unwrap();
        assert_eq!(batch, DecodedBatch::Control(ControlCommand::Disable));
    }

    #[test]
    fn hide_id_is_not_deobfuscated() {
        let batch = decode_frame(b"HIDE:abc123", identity).unwrap();
        assert_eq!(
            batch,
            DecodedBatch::Control(ControlCommand::Hide { id: "abc123".into() })
        );
    }

    // ---------------------------------------------------------------
    // Structured batches
    // ---------------------------------------------------------------

    #[test]
    fn settings_tag_is_recognised_after_decoding() {
        // "S" travels as "F"; numbers at index 0 are unshifted.
        let batch = decode_payload(r#"[["F", 1, 0, 300, 28.4, -97.7]]"#).unwrap();
        let DecodedBatch::Records(records) = batch else {
            panic!("expected records");
        };
        assert!(matches!(&records[0], Record::Settings(s) if s.map_enabled && s.radius_meters == 300.0));
    }

    #[test]
    fn plaintext_s_is_an_entity_id() {
        // An undecoded "S" decodes to "F", which is just an id.
        let batch = decode_payload(r#"[["S", 0, [], 1, 2]]"#).unwrap();
        let DecodedBatch::Records(records) = batch else {
            panic!("expected records");
        };
        assert!(matches!(&records[0], Record::Entity(e) if e.id == "F"));
    }

    #[test]
    fn offsets_use_the_record_batch_index() {
        let payload = encode_payload(&[
            vec![json!("S"), json!(1), json!(0), json!(100.0), json!(28.0), json!(-97.0)],
            vec![json!("alice"), json!("Alice"), json!([2, 5]), json!(10.0), json!(20.0)],
            vec![json!("bob"), json!(0), json!([1]), json!(-30.0), json!(40.0), json!(0), json!(90), json!(3)],
        ]);
        let DecodedBatch::Records(records) = decode_payload(&payload).unwrap() else {
            panic!("expected records");
        };
        assert_eq!(records.len(), 3);

        let Record::Entity(alice) = &records[1] else {
            panic!("expected entity");
        };
        assert_eq!(alice.id, "alice");
        assert_eq!(alice.display_name.as_deref(), Some("Alice"));
        assert_eq!(alice.flags.iter().copied().collect::<Vec<_>>(), vec![2, 5]);
        assert_eq!((alice.lat, alice.lng), (10.0, 20.0));

        let Record::Entity(bob) = &records[2] else {
            panic!("expected entity");
        };
        assert_eq!(bob.display_name, None);
        assert_eq!(bob.avatar_ref, None);
        assert_eq!(bob.battery, Some(90.0));
        assert_eq!(bob.hp, Some(3.0));
        assert_eq!((bob.lat, bob.lng), (-30.0, 40.0));
    }

    #[test]
    fn raw_wire_values_are_shifted_by_position() {
        // Record 2: lat/lng on the wire are value + 50.
        let payload = r#"[["F",1,0,0,0,0],["F",1,0,0,0,0],["nyuoq",0,[52],60,70]]"#;
        let DecodedBatch::Records(records) = decode_payload(payload).unwrap() else {
            panic!("expected records");
        };
        let Record::Entity(e) = &records[2] else {
            panic!("expected entity");
        };
        assert_eq!(e.id, "bmice");
        assert!(e.flags.contains(&2));
        assert_eq!((e.lat, e.lng), (10.0, 20.0));
    }

    #[test]
    fn malformed_record_does_not_stop_the_batch() {
        let payload = encode_payload(&[
            vec![json!("alice"), json!(0), json!([]), json!(1.0), json!(2.0)],
            vec![json!("broken")],
            vec![json!("carol"), json!(0), json!([]), json!(3.0), json!(4.0)],
        ]);
        let DecodedBatch::Records(records) = decode_payload(&payload).unwrap() else {
            panic!("expected records");
        };
        let ids: Vec<_> = records
            .iter()
            .filter_map(|r| match r {
                Record::Entity(e) => Some(e.id.as_str()),
                Record::Settings(_) => None,
            })
            .collect();
        assert_eq!(ids, vec!["alice", "carol"]);
    }

    #[test]
    fn non_array_items_are_skipped() {
        let DecodedBatch::Records(records) = decode_payload(r#"["loose", 5, null]"#).unwrap() else {
            panic!("expected records");
        };
        assert!(records.is_empty());
    }

    // ---------------------------------------------------------------
    // Failures
    // ---------------------------------------------------------------

    #[test]
    fn invalid_json_is_an_error() {
        assert!(matches!(decode_payload("{not json"), Err(DecodeError::Json(_))));
    }

    #[test]
    fn json_object_is_not_a_batch() {
        assert!(matches!(decode_payload(r#"{"a":1}"#), Err(DecodeError::NotABatch)));
    }

    #[test]
    fn decompression_failure_is_an_error() {
        assert!(matches!(
            decode_frame(b"\x00\x01", failing),
            Err(DecodeError::Decompress { frame_len: 2, .. })
        ));
    }

    #[test]
    fn frame_decoder_drops_corrupt_frames() {
        let mut decoder = FrameDecoder::new();
        let batch = decoder.decode(b"definitely not brotli");
        assert!(batch.is_empty());
        assert_eq!(decoder.stats(), DecoderStats { decoded: 0, dropped: 1 });
    }

    #[test]
    fn frame_decoder_decodes_brotli() {
        let mut decoder = FrameDecoder::new();
        let frame = brotli_compress(b"DISABLE").unwrap();
        assert_eq!(
            decoder.decode(&frame),
            DecodedBatch::Control(ControlCommand::Disable)
        );
        assert_eq!(decoder.stats().decoded, 1);
    }
}
