//! On-disk framing for individual WAL records.
//!
//! `[magic: "WREC"][len: u32 LE][payload][crc32: u32 LE]`. The payload is
//! the record serialized with `rmp-serde` — WAL records are transient,
//! redone-then-discarded data, not the crate's durable fixed-layout bytes,
//! so there is no reason to hand-roll their encoding the way the file
//! header and block frames are.

use crate::record::WalRecord;
use byteorder::{ByteOrder, LittleEndian};
use sharpcore_core::{Error, Result, Severity};

const RECORD_MAGIC: [u8; 4] = *b"WREC";

/// Whether `plaintext` begins with the WAL record frame magic.
///
/// Used by `sharpcore_repair`'s brute-force scanner to recognize a
/// decrypted block as a WAL segment without consulting the registry,
/// which is exactly the structure that may be missing or untrustworthy
/// when this check is needed.
pub fn looks_like_wal_segment(plaintext: &[u8]) -> bool {
    plaintext.len() >= 4 && plaintext[0..4] == RECORD_MAGIC
}

/// Encode one record to its on-disk frame bytes.
pub fn encode_record(record: &WalRecord) -> Result<Vec<u8>> {
    let payload = rmp_serde::to_vec(record).map_err(|e| Error::SerializationError(e.to_string()))?;
    let mut frame = Vec::with_capacity(4 + 4 + payload.len() + 4);
    frame.extend_from_slice(&RECORD_MAGIC);
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    let crc = crc32fast::hash(&payload);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Outcome of attempting to decode one frame from a byte cursor.
pub enum DecodeOutcome {
    /// A complete, CRC-verified record, and how many bytes it consumed.
    Record(WalRecord, usize),
    /// Not enough bytes remain to hold even the frame header; this is the
    /// normal, expected end of the durable log, not corruption.
    EndOfLog,
}

/// Attempt to decode one record frame starting at `buf[0..]`.
///
/// A bad magic or CRC is treated as "the log ends here" per `spec.md`
/// §4.6's recovery contract: a WAL tail from a crash mid-append is not
/// itself corruption, it is just not durable. Returns `Err` only for a
/// frame that parsed structurally but whose declared length would run
/// past the end of `buf`.
pub fn decode_record(buf: &[u8]) -> Result<DecodeOutcome> {
    if buf.len() < 8 {
        return Ok(DecodeOutcome::EndOfLog);
    }
    if buf[0..4] != RECORD_MAGIC {
        return Ok(DecodeOutcome::EndOfLog);
    }
    let payload_len = LittleEndian::read_u32(&buf[4..8]) as usize;
    let total_len = 4 + 4 + payload_len + 4;
    if buf.len() < total_len {
        return Ok(DecodeOutcome::EndOfLog);
    }
    let payload = &buf[8..8 + payload_len];
    let stored_crc = LittleEndian::read_u32(&buf[8 + payload_len..total_len]);
    let computed_crc = crc32fast::hash(payload);
    if stored_crc != computed_crc {
        return Ok(DecodeOutcome::EndOfLog);
    }
    let record: WalRecord = rmp_serde::from_slice(payload).map_err(|e| {
        Error::corruption(
            Severity::Severe,
            "wal record",
            format!("record CRC verified but payload did not deserialize: {e}"),
        )
    })?;
    Ok(DecodeOutcome::Record(record, total_len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordKind;

    fn sample() -> WalRecord {
        WalRecord {
            lsn: 42,
            kind: RecordKind::Checkpoint { lsn_ckpt: 40 },
        }
    }

    #[test]
    fn round_trips() {
        let frame = encode_record(&sample()).unwrap();
        match decode_record(&frame).unwrap() {
            DecodeOutcome::Record(record, consumed) => {
                assert_eq!(record, sample());
                assert_eq!(consumed, frame.len());
            }
            DecodeOutcome::EndOfLog => panic!("expected a record"),
        }
    }

    #[test]
    fn short_buffer_is_end_of_log_not_error() {
        let frame = encode_record(&sample()).unwrap();
        let result = decode_record(&frame[0..frame.len() - 1]).unwrap();
        assert!(matches!(result, DecodeOutcome::EndOfLog));
    }

    #[test]
    fn corrupted_crc_is_end_of_log_not_error() {
        let mut frame = encode_record(&sample()).unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        let result = decode_record(&frame).unwrap();
        assert!(matches!(result, DecodeOutcome::EndOfLog));
    }

    #[test]
    fn two_records_decode_in_sequence() {
        let mut buf = encode_record(&sample()).unwrap();
        let second = WalRecord {
            lsn: 43,
            kind: RecordKind::BeginTxn { txn: 1 },
        };
        buf.extend_from_slice(&encode_record(&second).unwrap());

        let (first, consumed) = match decode_record(&buf).unwrap() {
            DecodeOutcome::Record(r, n) => (r, n),
            _ => panic!("expected a record"),
        };
        assert_eq!(first, sample());
        let (next, _) = match decode_record(&buf[consumed..]).unwrap() {
            DecodeOutcome::Record(r, n) => (r, n),
            _ => panic!("expected a record"),
        };
        assert_eq!(next, second);
    }
}
