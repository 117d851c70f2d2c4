//! Columnar segment framing (`spec.md` §4.9): a self-describing byte
//! layout a consumer can decode with nothing but the segment bytes
//! themselves — no side metadata, no schema lookup.
//!
//! ```text
//! [magic "SCOL"][version:u32][column_count:u32]
//!   per column:
//!     [chunk_len:u32]
//!     [type_tag:u8][encoding_tag:u8][value_count:u32]
//!     [null_bitmap_len:u32][null_bitmap_bytes]
//!     [stats_len:u32][stats_bytes]
//!     [payload_len:u32][payload_bytes]
//! [crc32:u32]  (over every preceding byte)
//! ```
//!
//! May be stored as a block inside an SCDB file or as a standalone `.col`
//! file with identical framing (`spec.md` §6 item 4).

use byteorder::{ByteOrder, LittleEndian};
use sharpcore_core::{Error, Result};
use tracing::trace;

use crate::encoding::{decode_payload, encode_payload, select_encoding, Encoding};
use crate::stats::{ColumnStats, Histogram, Scalar};
use crate::value::{ColumnType, ColumnValues, NullBitmap};

const SEGMENT_MAGIC: &[u8; 4] = b"SCOL";
const SEGMENT_VERSION: u32 = 1;

/// One column's framing metadata, self-describing enough that
/// [`decode_column`] never needs to consult anything outside the segment.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    /// The column's scalar type.
    pub column_type: ColumnType,
    /// The encoding its payload bytes use.
    pub encoding: Encoding,
    /// Row count (including NULLs).
    pub value_count: u32,
    /// Statistics computed at encode time.
    pub stats: ColumnStats,
}

/// Encode one column (values + NULL bitmap) into standalone segment bytes.
/// This is the `column_encode` operation of `spec.md` §6.
pub fn encode_column(values: &ColumnValues, nulls: &NullBitmap) -> Result<Vec<u8>> {
    let encoding = select_encoding(values);
    trace!(?encoding, value_count = values.len(), "encoding column");
    let chunk = build_chunk(values, nulls, encoding)?;
    Ok(wrap_segment(vec![chunk]))
}

/// Decode a single-column segment produced by [`encode_column`], the
/// `column_decode` operation of `spec.md` §6.
pub fn decode_column(bytes: &[u8]) -> Result<(ColumnValues, NullBitmap)> {
    let chunks = parse_segment(bytes)?;
    if chunks.len() != 1 {
        return Err(Error::FormatError(format!(
            "expected a single-column segment, found {} columns",
            chunks.len()
        )));
    }
    let (meta, nulls, values) = decode_chunk(&chunks[0])?;
    let _ = meta;
    Ok((values, nulls))
}

/// Read back only a column's statistics, without decoding its values —
/// the `column_stats` operation of `spec.md` §6.
pub fn column_stats(bytes: &[u8]) -> Result<ColumnStats> {
    let chunks = parse_segment(bytes)?;
    let chunk = chunks
        .first()
        .ok_or_else(|| Error::FormatError("segment has no columns".to_string()))?;
    let (meta, ..) = parse_chunk_header(chunk)?;
    Ok(meta.stats)
}

/// Encode several named... actually unnamed columns (columns are
/// positional, matching `spec.md`'s `ColumnMeta[]`) into one multi-column
/// segment, e.g. for a whole table's worth of columnar storage in one
/// block.
pub fn encode_table(columns: &[(ColumnValues, NullBitmap)]) -> Result<Vec<u8>> {
    let mut chunks = Vec::with_capacity(columns.len());
    for (values, nulls) in columns {
        let encoding = select_encoding(values);
        chunks.push(build_chunk(values, nulls, encoding)?);
    }
    Ok(wrap_segment(chunks))
}

/// Decode every column out of a multi-column segment built by
/// [`encode_table`].
pub fn decode_table(bytes: &[u8]) -> Result<Vec<(ColumnValues, NullBitmap)>> {
    let chunks = parse_segment(bytes)?;
    chunks
        .iter()
        .map(|chunk| decode_chunk(chunk).map(|(_, nulls, values)| (values, nulls)))
        .collect()
}

fn build_chunk(values: &ColumnValues, nulls: &NullBitmap, encoding: Encoding) -> Result<Vec<u8>> {
    if values.len() != nulls.len() {
        return Err(Error::FormatError(format!(
            "column has {} rows but its null bitmap covers {}",
            values.len(),
            nulls.len()
        )));
    }
    let stats = ColumnStats::compute(values, nulls)?;
    let payload = encode_payload(values, encoding)?;
    let stats_bytes = encode_stats(&stats);

    let mut body = Vec::new();
    body.push(values.column_type() as u8);
    body.push(encoding as u8);
    body.extend_from_slice(&(values.len() as u32).to_le_bytes());
    body.extend_from_slice(&(nulls.as_bytes().len() as u32).to_le_bytes());
    body.extend_from_slice(nulls.as_bytes());
    body.extend_from_slice(&(stats_bytes.len() as u32).to_le_bytes());
    body.extend_from_slice(&stats_bytes);
    body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    body.extend_from_slice(&payload);

    let mut chunk = Vec::with_capacity(4 + body.len());
    chunk.extend_from_slice(&(body.len() as u32).to_le_bytes());
    chunk.extend_from_slice(&body);
    Ok(chunk)
}

fn wrap_segment(chunks: Vec<Vec<u8>>) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(SEGMENT_MAGIC);
    out.extend_from_slice(&SEGMENT_VERSION.to_le_bytes());
    out.extend_from_slice(&(chunks.len() as u32).to_le_bytes());
    for chunk in &chunks {
        out.extend_from_slice(chunk);
    }
    let crc = crc32fast::hash(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

fn parse_segment(bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
    if bytes.len() < 12 + 4 {
        return Err(Error::FormatError("segment shorter than its own preamble".to_string()));
    }
    if &bytes[0..4] != SEGMENT_MAGIC {
        return Err(Error::FormatError("bad columnar segment magic".to_string()));
    }
    let version = LittleEndian::read_u32(&bytes[4..8]);
    if version != SEGMENT_VERSION {
        return Err(Error::FormatError(format!(
            "unsupported columnar segment version {version}"
        )));
    }

    let (body, crc_bytes) = bytes.split_at(bytes.len() - 4);
    let stored_crc = LittleEndian::read_u32(crc_bytes);
    let computed_crc = crc32fast::hash(body);
    if stored_crc != computed_crc {
        return Err(Error::FormatError(
            "columnar segment checksum mismatch; data is corrupted or truncated".to_string(),
        ));
    }

    let column_count = LittleEndian::read_u32(&bytes[8..12]) as usize;
    let mut cursor = 12usize;
    let mut chunks = Vec::with_capacity(column_count);
    for _ in 0..column_count {
        let chunk_len = read_u32_at(body, cursor)? as usize;
        let start = cursor;
        let end = cursor + 4 + chunk_len;
        let chunk = body
            .get(start..end)
            .ok_or_else(|| Error::FormatError("columnar segment chunk runs past its own bounds".to_string()))?
            .to_vec();
        chunks.push(chunk);
        cursor = end;
    }
    Ok(chunks)
}

fn parse_chunk_header(chunk: &[u8]) -> Result<(ColumnMeta, usize)> {
    let body = chunk.get(4..).ok_or_else(chunk_truncated)?;
    if body.len() < 10 {
        return Err(chunk_truncated());
    }
    let column_type = match body[0] {
        0 => ColumnType::Int64,
        1 => ColumnType::Float64,
        2 => ColumnType::Text,
        other => return Err(Error::FormatError(format!("unknown column type tag {other}"))),
    };
    let encoding = Encoding::from_tag(body[1])?;
    let value_count = LittleEndian::read_u32(&body[2..6]);

    let null_bitmap_len = LittleEndian::read_u32(&body[6..10]) as usize;
    let mut cursor = 10 + null_bitmap_len;
    let stats_len = read_u32_at(body, cursor)? as usize;
    cursor += 4;
    let stats_bytes = body
        .get(cursor..cursor + stats_len)
        .ok_or_else(|| Error::FormatError("column stats run past chunk bounds".to_string()))?;
    let stats = decode_stats(stats_bytes)?;

    let meta = ColumnMeta {
        column_type,
        encoding,
        value_count,
        stats,
    };
    Ok((meta, 10))
}

fn decode_chunk(chunk: &[u8]) -> Result<(ColumnMeta, NullBitmap, ColumnValues)> {
    let (meta, header_len) = parse_chunk_header(chunk)?;
    let body = &chunk[4..];
    let mut cursor = header_len;

    let null_bitmap_len = LittleEndian::read_u32(&body[6..10]) as usize;
    let null_bytes = body
        .get(cursor..cursor + null_bitmap_len)
        .ok_or_else(|| Error::FormatError("null bitmap runs past chunk bounds".to_string()))?;
    let nulls = NullBitmap::from_bytes(null_bytes, meta.value_count as usize)?;
    cursor += null_bitmap_len;

    let stats_len = read_u32_at(body, cursor)? as usize;
    cursor += 4 + stats_len;

    let payload_len = read_u32_at(body, cursor)? as usize;
    cursor += 4;
    let payload = body
        .get(cursor..cursor + payload_len)
        .ok_or_else(|| Error::FormatError("column payload runs past chunk bounds".to_string()))?;

    let values = decode_payload(payload, meta.column_type, meta.encoding, meta.value_count as usize)?;
    Ok((meta, nulls, values))
}

fn read_u32_at(bytes: &[u8], at: usize) -> Result<u32> {
    bytes
        .get(at..at + 4)
        .map(LittleEndian::read_u32)
        .ok_or_else(|| Error::FormatError("column chunk truncated".to_string()))
}

fn encode_stats(stats: &ColumnStats) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&stats.null_count.to_le_bytes());
    out.extend_from_slice(&stats.distinct_count.to_le_bytes());
    write_optional_scalar(&mut out, stats.min.as_ref());
    write_optional_scalar(&mut out, stats.max.as_ref());
    match &stats.histogram {
        None => out.push(0),
        Some(histogram) => {
            out.push(1);
            out.push(histogram.bucket_bounds.len() as u8);
            for (bound, fraction) in histogram.bucket_bounds.iter().zip(histogram.bucket_fractions.iter()) {
                write_scalar(&mut out, bound);
                out.extend_from_slice(&fraction.to_le_bytes());
            }
        }
    }
    out
}

fn decode_stats(bytes: &[u8]) -> Result<ColumnStats> {
    let mut cursor = 0usize;
    let null_count = read_u64_at(bytes, &mut cursor)?;
    let distinct_count = read_u64_at(bytes, &mut cursor)?;
    let min = read_optional_scalar(bytes, &mut cursor)?;
    let max = read_optional_scalar(bytes, &mut cursor)?;

    let has_histogram = *bytes.get(cursor).ok_or_else(stats_truncated)?;
    cursor += 1;
    let histogram = if has_histogram == 1 {
        let bucket_count = *bytes.get(cursor).ok_or_else(stats_truncated)? as usize;
        cursor += 1;
        let mut bucket_bounds = Vec::with_capacity(bucket_count);
        let mut bucket_fractions = Vec::with_capacity(bucket_count);
        for _ in 0..bucket_count {
            bucket_bounds.push(read_scalar(bytes, &mut cursor)?);
            let fraction_bytes = bytes
                .get(cursor..cursor + 8)
                .ok_or_else(stats_truncated)?;
            bucket_fractions.push(LittleEndian::read_f64(fraction_bytes));
            cursor += 8;
        }
        Some(Histogram {
            bucket_bounds,
            bucket_fractions,
        })
    } else {
        None
    };

    Ok(ColumnStats::from_parts(min, max, null_count, distinct_count, histogram))
}

fn write_optional_scalar(out: &mut Vec<u8>, scalar: Option<&Scalar>) {
    match scalar {
        None => out.push(0),
        Some(s) => {
            out.push(1);
            write_scalar(out, s);
        }
    }
}

fn read_optional_scalar(bytes: &[u8], cursor: &mut usize) -> Result<Option<Scalar>> {
    let has = *bytes.get(*cursor).ok_or_else(stats_truncated)?;
    *cursor += 1;
    if has == 1 {
        Ok(Some(read_scalar(bytes, cursor)?))
    } else {
        Ok(None)
    }
}

fn write_scalar(out: &mut Vec<u8>, scalar: &Scalar) {
    match scalar {
        Scalar::Int(v) => {
            out.push(0);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Scalar::Float(v) => {
            out.push(1);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Scalar::Text(v) => {
            out.push(2);
            out.extend_from_slice(&(v.len() as u32).to_le_bytes());
            out.extend_from_slice(v.as_bytes());
        }
    }
}

fn read_scalar(bytes: &[u8], cursor: &mut usize) -> Result<Scalar> {
    let tag = *bytes.get(*cursor).ok_or_else(stats_truncated)?;
    *cursor += 1;
    match tag {
        0 => {
            let v = LittleEndian::read_i64(bytes.get(*cursor..*cursor + 8).ok_or_else(stats_truncated)?);
            *cursor += 8;
            Ok(Scalar::Int(v))
        }
        1 => {
            let v = LittleEndian::read_f64(bytes.get(*cursor..*cursor + 8).ok_or_else(stats_truncated)?);
            *cursor += 8;
            Ok(Scalar::Float(v))
        }
        2 => {
            let len = read_u32_at(bytes, *cursor)? as usize;
            *cursor += 4;
            let s = bytes.get(*cursor..*cursor + len).ok_or_else(stats_truncated)?;
            *cursor += len;
            String::from_utf8(s.to_vec())
                .map(Scalar::Text)
                .map_err(|e| Error::FormatError(format!("invalid UTF-8 in stats scalar: {e}")))
        }
        other => Err(Error::FormatError(format!("unknown stats scalar tag {other}"))),
    }
}

fn read_u64_at(bytes: &[u8], cursor: &mut usize) -> Result<u64> {
    let v = LittleEndian::read_u64(bytes.get(*cursor..*cursor + 8).ok_or_else(stats_truncated)?);
    *cursor += 8;
    Ok(v)
}

fn stats_truncated() -> Error {
    Error::FormatError("column stats block truncated".to_string())
}

fn chunk_truncated() -> Error {
    Error::FormatError("column chunk shorter than its fixed header".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_column_round_trips() {
        let values = ColumnValues::Int64(vec![1, 2, 3, 4, 5]);
        let nulls = NullBitmap::from_flags(&[false, true, false, false, true]);
        let bytes = encode_column(&values, &nulls).unwrap();
        let (decoded_values, decoded_nulls) = decode_column(&bytes).unwrap();
        assert_eq!(decoded_values, values);
        assert_eq!(decoded_nulls, nulls);
    }

    #[test]
    fn column_stats_reads_without_decoding_values() {
        let values = ColumnValues::Int64(vec![10, 20, 30]);
        let nulls = NullBitmap::none_null(3);
        let bytes = encode_column(&values, &nulls).unwrap();
        let stats = column_stats(&bytes).unwrap();
        assert_eq!(stats.min, Some(Scalar::Int(10)));
        assert_eq!(stats.max, Some(Scalar::Int(30)));
    }

    #[test]
    fn multi_column_table_round_trips() {
        let a = (ColumnValues::Int64(vec![1, 2, 3]), NullBitmap::none_null(3));
        let b = (
            ColumnValues::Text(vec!["x".into(), "y".into(), "z".into()]),
            NullBitmap::none_null(3),
        );
        let bytes = encode_table(&[a.clone(), b.clone()]).unwrap();
        let decoded = decode_table(&bytes).unwrap();
        assert_eq!(decoded, vec![a, b]);
    }

    #[test]
    fn corrupted_segment_checksum_is_rejected() {
        let values = ColumnValues::Int64(vec![1, 2, 3]);
        let nulls = NullBitmap::none_null(3);
        let mut bytes = encode_column(&values, &nulls).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(decode_column(&bytes).is_err());
    }
}
