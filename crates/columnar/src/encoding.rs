//! Column encodings (`spec.md` §4.9): Raw, Dictionary, Delta, Run-length,
//! and the reserved Frame-of-reference id.
//!
//! Every encoding here encodes the column's full positional value array,
//! placeholder included at NULL slots — NULL-ness itself lives entirely in
//! the segment's separate [`crate::value::NullBitmap`], never inside the
//! encoded payload. That keeps each encoding's logic a pure function of
//! "what are the bytes", with no NULL special-casing scattered through it.

use crate::value::{ColumnType, ColumnValues};
use byteorder::{ByteOrder, LittleEndian};
use sharpcore_core::limits::{DICTIONARY_SELECTIVITY_THRESHOLD, MIN_RUN_LENGTH};
use sharpcore_core::{Error, Result};

/// Which byte layout a column's payload uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Encoding {
    /// Fixed-width little-endian (numerics) or length-prefixed UTF-8 (text).
    Raw = 0,
    /// Distinct-value table plus an index array.
    Dictionary = 1,
    /// Base value plus per-step deltas (sorted integer columns only).
    Delta = 2,
    /// Value/run-length pairs.
    RunLength = 3,
    /// Reserved; no encoder in this core produces it.
    FrameOfReference = 4,
}

impl Encoding {
    /// Decode the `u8` tag stored in a [`crate::segment::ColumnMeta`].
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Encoding::Raw),
            1 => Ok(Encoding::Dictionary),
            2 => Ok(Encoding::Delta),
            3 => Ok(Encoding::RunLength),
            4 => Ok(Encoding::FrameOfReference),
            other => Err(Error::FormatError(format!("unknown column encoding tag {other}"))),
        }
    }
}

/// Choose an encoding for `values`, per `spec.md` §4.9's selection rules,
/// checked in order of most to least specific so a column that qualifies
/// for more than one compressed form gets the one the spec lists it under.
pub fn select_encoding(values: &ColumnValues) -> Encoding {
    let n = values.len();
    if n == 0 {
        return Encoding::Raw;
    }

    let distinct = distinct_count(values);
    if (distinct as f64) / (n as f64) <= DICTIONARY_SELECTIVITY_THRESHOLD {
        return Encoding::Dictionary;
    }

    if let ColumnValues::Int64(v) = values {
        if n >= 2 && is_sorted_ascending(v) && delta_fits_i32(v) {
            return Encoding::Delta;
        }
    }

    if n >= MIN_RUN_LENGTH {
        let runs = run_count(values);
        if runs < n / 4 {
            return Encoding::RunLength;
        }
    }

    Encoding::Raw
}

fn distinct_count(values: &ColumnValues) -> usize {
    match values {
        ColumnValues::Int64(v) => {
            let mut seen = Vec::with_capacity(v.len());
            for x in v {
                if !seen.contains(x) {
                    seen.push(*x);
                }
            }
            seen.len()
        }
        ColumnValues::Float64(v) => {
            let mut seen: Vec<u64> = Vec::with_capacity(v.len());
            for x in v {
                let bits = x.to_bits();
                if !seen.contains(&bits) {
                    seen.push(bits);
                }
            }
            seen.len()
        }
        ColumnValues::Text(v) => {
            let mut seen: Vec<&String> = Vec::with_capacity(v.len());
            for x in v {
                if !seen.contains(&x) {
                    seen.push(x);
                }
            }
            seen.len()
        }
    }
}

fn run_count(values: &ColumnValues) -> usize {
    match values {
        ColumnValues::Int64(v) => count_runs(v),
        ColumnValues::Float64(v) => count_runs(&v.iter().map(|f| f.to_bits()).collect::<Vec<_>>()),
        ColumnValues::Text(v) => count_runs(v),
    }
}

fn count_runs<T: PartialEq>(v: &[T]) -> usize {
    if v.is_empty() {
        return 0;
    }
    let mut runs = 1;
    for i in 1..v.len() {
        if v[i] != v[i - 1] {
            runs += 1;
        }
    }
    runs
}

fn is_sorted_ascending(v: &[i64]) -> bool {
    v.windows(2).all(|w| w[0] <= w[1])
}

fn delta_fits_i32(v: &[i64]) -> bool {
    v.windows(2).all(|w| i32::try_from(w[1] - w[0]).is_ok())
}

/// Encode `values` under `encoding`, producing the column's payload bytes
/// (not including its [`crate::value::NullBitmap`]).
pub fn encode_payload(values: &ColumnValues, encoding: Encoding) -> Result<Vec<u8>> {
    match encoding {
        Encoding::Raw => Ok(encode_raw(values)),
        Encoding::Dictionary => Ok(encode_dictionary(values)),
        Encoding::Delta => encode_delta(values),
        Encoding::RunLength => Ok(encode_run_length(values)),
        Encoding::FrameOfReference => Err(Error::FormatError(
            "frame-of-reference encoding is reserved; no encoder produces it".to_string(),
        )),
    }
}

/// Decode a payload previously produced by [`encode_payload`].
pub fn decode_payload(
    bytes: &[u8],
    column_type: ColumnType,
    encoding: Encoding,
    value_count: usize,
) -> Result<ColumnValues> {
    match encoding {
        Encoding::Raw => decode_raw(bytes, column_type, value_count),
        Encoding::Dictionary => decode_dictionary(bytes, column_type, value_count),
        Encoding::Delta => decode_delta(bytes, value_count),
        Encoding::RunLength => decode_run_length(bytes, column_type, value_count),
        Encoding::FrameOfReference => Err(Error::FormatError(
            "frame-of-reference encoding is reserved; no decoder reads it".to_string(),
        )),
    }
}

fn encode_raw(values: &ColumnValues) -> Vec<u8> {
    let mut out = Vec::new();
    match values {
        ColumnValues::Int64(v) => {
            for x in v {
                let mut buf = [0u8; 8];
                LittleEndian::write_i64(&mut buf, *x);
                out.extend_from_slice(&buf);
            }
        }
        ColumnValues::Float64(v) => {
            for x in v {
                let mut buf = [0u8; 8];
                LittleEndian::write_f64(&mut buf, *x);
                out.extend_from_slice(&buf);
            }
        }
        ColumnValues::Text(v) => {
            for s in v {
                write_text(&mut out, s);
            }
        }
    }
    out
}

fn decode_raw(bytes: &[u8], column_type: ColumnType, value_count: usize) -> Result<ColumnValues> {
    let mut cursor = 0usize;
    match column_type {
        ColumnType::Int64 => {
            let mut out = Vec::with_capacity(value_count);
            for _ in 0..value_count {
                out.push(read_i64(bytes, &mut cursor)?);
            }
            Ok(ColumnValues::Int64(out))
        }
        ColumnType::Float64 => {
            let mut out = Vec::with_capacity(value_count);
            for _ in 0..value_count {
                out.push(read_f64(bytes, &mut cursor)?);
            }
            Ok(ColumnValues::Float64(out))
        }
        ColumnType::Text => {
            let mut out = Vec::with_capacity(value_count);
            for _ in 0..value_count {
                out.push(read_text(bytes, &mut cursor)?);
            }
            Ok(ColumnValues::Text(out))
        }
    }
}

fn encode_dictionary(values: &ColumnValues) -> Vec<u8> {
    let mut out = Vec::new();
    match values {
        ColumnValues::Int64(v) => {
            let (entries, indices) = build_dictionary(v);
            out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
            for e in &entries {
                out.extend_from_slice(&e.to_le_bytes());
            }
            for i in indices {
                out.extend_from_slice(&(i as i32).to_le_bytes());
            }
        }
        ColumnValues::Float64(v) => {
            let bits: Vec<u64> = v.iter().map(|f| f.to_bits()).collect();
            let (entries, indices) = build_dictionary(&bits);
            out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
            for e in &entries {
                out.extend_from_slice(&f64::from_bits(*e).to_le_bytes());
            }
            for i in indices {
                out.extend_from_slice(&(i as i32).to_le_bytes());
            }
        }
        ColumnValues::Text(v) => {
            let (entries, indices) = build_dictionary(v);
            out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
            for e in &entries {
                write_text(&mut out, e);
            }
            for i in indices {
                out.extend_from_slice(&(i as i32).to_le_bytes());
            }
        }
    }
    out
}

fn build_dictionary<T: PartialEq + Clone>(values: &[T]) -> (Vec<T>, Vec<usize>) {
    let mut entries: Vec<T> = Vec::new();
    let mut indices = Vec::with_capacity(values.len());
    for v in values {
        let idx = match entries.iter().position(|e| e == v) {
            Some(idx) => idx,
            None => {
                entries.push(v.clone());
                entries.len() - 1
            }
        };
        indices.push(idx);
    }
    (entries, indices)
}

fn decode_dictionary(bytes: &[u8], column_type: ColumnType, value_count: usize) -> Result<ColumnValues> {
    let mut cursor = 0usize;
    let distinct_count = read_u32(bytes, &mut cursor)? as usize;

    match column_type {
        ColumnType::Int64 => {
            let mut entries = Vec::with_capacity(distinct_count);
            for _ in 0..distinct_count {
                entries.push(read_i64(bytes, &mut cursor)?);
            }
            let mut out = Vec::with_capacity(value_count);
            for _ in 0..value_count {
                let idx = read_i32(bytes, &mut cursor)? as usize;
                out.push(*entries.get(idx).ok_or_else(dictionary_index_error)?);
            }
            Ok(ColumnValues::Int64(out))
        }
        ColumnType::Float64 => {
            let mut entries = Vec::with_capacity(distinct_count);
            for _ in 0..distinct_count {
                entries.push(read_f64(bytes, &mut cursor)?);
            }
            let mut out = Vec::with_capacity(value_count);
            for _ in 0..value_count {
                let idx = read_i32(bytes, &mut cursor)? as usize;
                out.push(*entries.get(idx).ok_or_else(dictionary_index_error)?);
            }
            Ok(ColumnValues::Float64(out))
        }
        ColumnType::Text => {
            let mut entries = Vec::with_capacity(distinct_count);
            for _ in 0..distinct_count {
                entries.push(read_text(bytes, &mut cursor)?);
            }
            let mut out = Vec::with_capacity(value_count);
            for _ in 0..value_count {
                let idx = read_i32(bytes, &mut cursor)? as usize;
                out.push(entries.get(idx).ok_or_else(dictionary_index_error)?.clone());
            }
            Ok(ColumnValues::Text(out))
        }
    }
}

fn dictionary_index_error() -> Error {
    Error::FormatError("dictionary index out of range of its entry table".to_string())
}

fn encode_delta(values: &ColumnValues) -> Result<Vec<u8>> {
    let ColumnValues::Int64(v) = values else {
        return Err(Error::FormatError(
            "delta encoding only applies to Int64 columns".to_string(),
        ));
    };
    let mut out = Vec::new();
    let Some(&base) = v.first() else {
        return Ok(out);
    };
    out.extend_from_slice(&base.to_le_bytes());
    for w in v.windows(2) {
        let delta = i32::try_from(w[1] - w[0]).map_err(|_| {
            Error::FormatError("delta between neighboring values overflows i32".to_string())
        })?;
        out.extend_from_slice(&delta.to_le_bytes());
    }
    Ok(out)
}

fn decode_delta(bytes: &[u8], value_count: usize) -> Result<ColumnValues> {
    let mut cursor = 0usize;
    let mut out = Vec::with_capacity(value_count);
    if value_count == 0 {
        return Ok(ColumnValues::Int64(out));
    }
    let mut current = read_i64(bytes, &mut cursor)?;
    out.push(current);
    for _ in 1..value_count {
        let delta = read_i32(bytes, &mut cursor)?;
        current += delta as i64;
        out.push(current);
    }
    Ok(ColumnValues::Int64(out))
}

fn encode_run_length(values: &ColumnValues) -> Vec<u8> {
    let mut out = Vec::new();
    match values {
        ColumnValues::Int64(v) => {
            let runs = runs_of(v);
            out.extend_from_slice(&(runs.len() as u32).to_le_bytes());
            for (value, count) in runs {
                out.extend_from_slice(&value.to_le_bytes());
                out.extend_from_slice(&(count as u32).to_le_bytes());
            }
        }
        ColumnValues::Float64(v) => {
            let runs = runs_of(v);
            out.extend_from_slice(&(runs.len() as u32).to_le_bytes());
            for (value, count) in runs {
                out.extend_from_slice(&value.to_le_bytes());
                out.extend_from_slice(&(count as u32).to_le_bytes());
            }
        }
        ColumnValues::Text(v) => {
            let runs = runs_of(v);
            out.extend_from_slice(&(runs.len() as u32).to_le_bytes());
            for (value, count) in runs {
                write_text(&mut out, &value);
                out.extend_from_slice(&(count as u32).to_le_bytes());
            }
        }
    }
    out
}

fn runs_of<T: PartialEq + Clone>(v: &[T]) -> Vec<(T, usize)> {
    let mut runs = Vec::new();
    for value in v {
        match runs.last_mut() {
            Some((last_value, count)) if last_value == value => *count += 1,
            _ => runs.push((value.clone(), 1)),
        }
    }
    runs
}

fn decode_run_length(bytes: &[u8], column_type: ColumnType, value_count: usize) -> Result<ColumnValues> {
    let mut cursor = 0usize;
    let run_count = read_u32(bytes, &mut cursor)? as usize;

    match column_type {
        ColumnType::Int64 => {
            let mut out = Vec::with_capacity(value_count);
            for _ in 0..run_count {
                let value = read_i64(bytes, &mut cursor)?;
                let count = read_u32(bytes, &mut cursor)? as usize;
                out.extend(std::iter::repeat(value).take(count));
            }
            Ok(ColumnValues::Int64(out))
        }
        ColumnType::Float64 => {
            let mut out = Vec::with_capacity(value_count);
            for _ in 0..run_count {
                let value = read_f64(bytes, &mut cursor)?;
                let count = read_u32(bytes, &mut cursor)? as usize;
                out.extend(std::iter::repeat(value).take(count));
            }
            Ok(ColumnValues::Float64(out))
        }
        ColumnType::Text => {
            let mut out = Vec::with_capacity(value_count);
            for _ in 0..run_count {
                let value = read_text(bytes, &mut cursor)?;
                let count = read_u32(bytes, &mut cursor)? as usize;
                out.extend(std::iter::repeat(value).take(count));
            }
            Ok(ColumnValues::Text(out))
        }
    }
}

fn write_text(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    let end = *cursor + 4;
    let slice = bytes.get(*cursor..end).ok_or_else(truncated)?;
    *cursor = end;
    Ok(LittleEndian::read_u32(slice))
}

fn read_i32(bytes: &[u8], cursor: &mut usize) -> Result<i32> {
    let end = *cursor + 4;
    let slice = bytes.get(*cursor..end).ok_or_else(truncated)?;
    *cursor = end;
    Ok(LittleEndian::read_i32(slice))
}

fn read_i64(bytes: &[u8], cursor: &mut usize) -> Result<i64> {
    let end = *cursor + 8;
    let slice = bytes.get(*cursor..end).ok_or_else(truncated)?;
    *cursor = end;
    Ok(LittleEndian::read_i64(slice))
}

fn read_f64(bytes: &[u8], cursor: &mut usize) -> Result<f64> {
    let end = *cursor + 8;
    let slice = bytes.get(*cursor..end).ok_or_else(truncated)?;
    *cursor = end;
    Ok(LittleEndian::read_f64(slice))
}

fn read_text(bytes: &[u8], cursor: &mut usize) -> Result<String> {
    let len = read_u32(bytes, cursor)? as usize;
    let end = *cursor + len;
    let slice = bytes.get(*cursor..end).ok_or_else(truncated)?;
    *cursor = end;
    String::from_utf8(slice.to_vec()).map_err(|e| Error::FormatError(format!("invalid UTF-8 in text column: {e}")))
}

fn truncated() -> Error {
    Error::FormatError("column payload truncated mid-value".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(values: ColumnValues, encoding: Encoding) {
        let column_type = values.column_type();
        let value_count = values.len();
        let bytes = encode_payload(&values, encoding).unwrap();
        let decoded = decode_payload(&bytes, column_type, encoding, value_count).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn raw_round_trips_each_type() {
        round_trip(ColumnValues::Int64(vec![1, -2, 3, i64::MAX, i64::MIN]), Encoding::Raw);
        round_trip(ColumnValues::Float64(vec![1.5, -2.25, 0.0]), Encoding::Raw);
        round_trip(
            ColumnValues::Text(vec!["".to_string(), "hello".to_string(), "world".to_string()]),
            Encoding::Raw,
        );
    }

    #[test]
    fn dictionary_round_trips_low_cardinality_column() {
        round_trip(
            ColumnValues::Text(vec!["a".into(), "b".into(), "a".into(), "a".into(), "b".into()]),
            Encoding::Dictionary,
        );
    }

    #[test]
    fn delta_round_trips_sorted_ints() {
        round_trip(ColumnValues::Int64(vec![10, 12, 12, 20, 21]), Encoding::Delta);
    }

    #[test]
    fn run_length_round_trips_runs() {
        round_trip(ColumnValues::Int64(vec![7, 7, 7, 7, 9, 9, 9, 9, 9]), Encoding::RunLength);
    }

    #[test]
    fn select_encoding_prefers_dictionary_for_low_cardinality() {
        let values = ColumnValues::Text(vec!["x".into(); 50]);
        assert_eq!(select_encoding(&values), Encoding::Dictionary);
    }

    #[test]
    fn select_encoding_prefers_delta_for_sorted_high_cardinality_ints() {
        let values = ColumnValues::Int64((0..50).collect());
        assert_eq!(select_encoding(&values), Encoding::Delta);
    }

    #[test]
    fn select_encoding_falls_back_to_raw_for_high_cardinality_unsorted() {
        let values = ColumnValues::Int64(vec![5, 1, 9, 3, 7, 2, 8, 4, 6, 0]);
        assert_eq!(select_encoding(&values), Encoding::Raw);
    }

    #[test]
    fn frame_of_reference_is_reserved_and_unencodable() {
        let values = ColumnValues::Int64(vec![1, 2, 3]);
        assert!(encode_payload(&values, Encoding::FrameOfReference).is_err());
    }
}
