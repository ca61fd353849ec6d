//! Tabled asymmetric numeral system (tANS/FSE) entropy coder.
//!
//! Table construction follows Duda/Collet: symbols are spread across the
//! `table_size` state slots with a fixed coprime step, the decode table is
//! built by walking that spread forward assigning shrinking bit-widths, and
//! the encode table is its exact inverse, found by recording at which slot
//! each (symbol, occurrence) pair appears during the same walk. Encoding
//! consumes its source in reverse so that decoding forward from the final
//! state reproduces the original order (see `bitstream` module docs).
//!
//! Two table sizes are supported: 12-bit (`T = 4096`), the default, and a
//! 10-bit (`T = 1024`) variant rescaled from a 12-bit table for short
//! payloads where a 4-byte state header isn't worth its weight.

use crate::bitstream::{BitReader, BitWriter};
use crate::error::{CodecError, Result};

pub const TABLE_LOG_12: u32 = 12;
pub const TABLE_LOG_10: u32 = 10;
pub const TABLE_SIZE_12: usize = 1 << TABLE_LOG_12;
pub const TABLE_SIZE_10: usize = 1 << TABLE_LOG_10;

fn spread_step(table_log: u32) -> usize {
    match table_log {
        TABLE_LOG_12 => 2731,
        TABLE_LOG_10 => 643,
        other => panic!("unsupported tANS table_log {other}"),
    }
}

#[derive(Clone, Copy, Debug)]
struct DecodeEntry {
    symbol: u8,
    nb_bits: u8,
    next_state_base: u32,
}

/// A fully materialized tANS table: ready to encode or decode without
/// further allocation.
#[derive(Clone, Debug)]
pub struct TansTable {
    table_log: u32,
    table_size: u32,
    freq: Box<[u16; 256]>,
    cumul: Box<[u32; 257]>,
    nb_hi: Box<[u8; 256]>,
    encode_state: Vec<u32>,
    decode: Vec<DecodeEntry>,
}

impl TansTable {
    pub fn table_log(&self) -> u32 {
        self.table_log
    }

    pub fn table_size(&self) -> u32 {
        self.table_size
    }

    pub fn freq(&self) -> &[u16; 256] {
        &self.freq
    }

    /// Build encode and decode tables from a normalized frequency table
    /// (must sum to exactly `1 << table_log`).
    pub fn build(freq: &[u16; 256], table_log: u32) -> Result<TansTable> {
        let table_size = 1usize << table_log;
        let sum: u64 = freq.iter().map(|&f| f as u64).sum();
        if sum != table_size as u64 {
            return Err(CodecError::corrupt(format!(
                "normalized frequency table sums to {sum}, expected {table_size}"
            )));
        }

        let mut cumul = Box::new([0u32; 257]);
        for s in 0..256 {
            cumul[s + 1] = cumul[s] + freq[s] as u32;
        }

        let step = spread_step(table_log);
        let mut spread = vec![0u8; table_size];
        let mut pos = 0usize;
        for (s, &f) in freq.iter().enumerate() {
            for _ in 0..f {
                spread[pos] = s as u8;
                pos = (pos + step) % table_size;
            }
        }

        let mut decode = Vec::with_capacity(table_size);
        let mut next = [0u32; 256];
        for (s, &f) in freq.iter().enumerate() {
            next[s] = f as u32;
        }
        for &s in &spread {
            let x = next[s as usize];
            next[s as usize] += 1;
            let hb = 31 - x.leading_zeros(); // floor(log2(x)), x >= 1
            let nb_bits = table_log - hb;
            let next_state_base = (x << nb_bits) - table_size as u32;
            decode.push(DecodeEntry {
                symbol: s,
                nb_bits: nb_bits as u8,
                next_state_base,
            });
        }

        let mut encode_state = vec![0u32; table_size];
        let mut occurrence = [0u32; 256];
        for (pos, &s) in spread.iter().enumerate() {
            let k = occurrence[s as usize];
            let slot = cumul[s as usize] + k;
            encode_state[slot as usize] = pos as u32;
            occurrence[s as usize] += 1;
        }

        let mut nb_hi = Box::new([0u8; 256]);
        for (s, &f) in freq.iter().enumerate() {
            if f == 0 {
                continue;
            }
            let mut b = 0u32;
            while (f as u64) << b < 2 * table_size as u64 {
                b += 1;
            }
            nb_hi[s] = b as u8;
        }

        Ok(TansTable {
            table_log,
            table_size: table_size as u32,
            freq: Box::new(*freq),
            cumul,
            nb_hi,
            encode_state,
            decode,
        })
    }

    /// Encode one symbol, advancing `state`. Shared by the whole-buffer
    /// `encode` and the per-position combinators in the `compress` module.
    #[inline]
    pub fn encode_step(&self, state: u32, b: u8, writer: &mut BitWriter) -> Result<u32> {
        let t = self.table_size;
        let f = self.freq[b as usize] as u32;
        if f == 0 {
            return Err(CodecError::corrupt(format!("symbol {b} absent from tANS table")));
        }
        let nb_hi = self.nb_hi[b as usize] as u32;
        let nb = if state as u64 >= (f as u64) << nb_hi {
            nb_hi
        } else {
            nb_hi.saturating_sub(1)
        };
        writer.write(state as u64, nb);
        let k = (state >> nb) - f;
        let slot = self.cumul[b as usize] + k;
        Ok(t + self.encode_state[slot as usize])
    }

    /// Decode one symbol, advancing `state`.
    #[inline]
    pub fn decode_step(&self, state: u32, reader: &mut BitReader) -> Result<(u8, u32)> {
        let t = self.table_size;
        if state < t || state >= 2 * t {
            return Err(CodecError::corrupt("tANS state left its domain"));
        }
        let entry = &self.decode[(state - t) as usize];
        let bits = reader.read(entry.nb_bits as u32)? as u32;
        Ok((entry.symbol, entry.next_state_base + bits))
    }

    /// Encode `src` in reverse into `writer`, returning the final state
    /// (the packet's initial decoder state).
    pub fn encode(&self, src: &[u8], writer: &mut BitWriter) -> Result<u32> {
        let mut state = self.table_size;
        for &b in src.iter().rev() {
            state = self.encode_step(state, b, writer)?;
        }
        Ok(state)
    }

    /// Decode `len` bytes from `reader`, starting at `init_state`, into `dst`.
    pub fn decode(&self, init_state: u32, len: usize, reader: &mut BitReader, dst: &mut [u8]) -> Result<()> {
        let mut state = init_state;
        for slot_out in dst.iter_mut().take(len) {
            let (symbol, next) = self.decode_step(state, reader)?;
            *slot_out = symbol;
            state = next;
        }
        Ok(())
    }
}

/// Encode `src` in reverse, selecting a table per position via
/// `table_for(offset)`. All tables must share the same `table_size`.
pub fn encode_per_position<'a>(
    table_for: impl Fn(usize) -> &'a TansTable,
    src: &[u8],
    writer: &mut BitWriter,
) -> Result<u32> {
    let mut state = if src.is_empty() { 0 } else { table_for(0).table_size() };
    for i in (0..src.len()).rev() {
        let table = table_for(i);
        state = table.encode_step(state, src[i], writer)?;
    }
    Ok(state)
}

/// Decode `len` bytes, selecting a table per position via `table_for(offset)`.
pub fn decode_per_position<'a>(
    table_for: impl Fn(usize) -> &'a TansTable,
    init_state: u32,
    len: usize,
    reader: &mut BitReader,
    dst: &mut [u8],
) -> Result<()> {
    let mut state = init_state;
    for (i, slot_out) in dst.iter_mut().take(len).enumerate() {
        let table = table_for(i);
        let (symbol, next) = table.decode_step(state, reader)?;
        *slot_out = symbol;
        state = next;
    }
    Ok(())
}

/// Normalize raw occurrence counts to a frequency table summing exactly to
/// `table_size`: every symbol with a nonzero count is floored at 1, the
/// remaining slots are distributed proportionally, and rounding error is
/// absorbed by the most frequent symbol.
pub fn normalize_frequencies(counts: &[u64; 256], table_size: usize) -> Result<[u16; 256]> {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return Err(CodecError::invalid_arg("cannot normalize an empty histogram"));
    }
    let mut freq = [0u16; 256];
    let mut remaining: i64 = table_size as i64;
    let mut largest_idx = 0usize;
    let mut largest_val: i64 = -1;

    for (s, &c) in counts.iter().enumerate() {
        if c == 0 {
            continue;
        }
        let share = ((c as u128 * table_size as u128) / total as u128) as i64;
        let share = share.max(1);
        freq[s] = share as u16;
        remaining -= share;
        if share > largest_val {
            largest_val = share;
            largest_idx = s;
        }
    }

    let adjusted = freq[largest_idx] as i64 + remaining;
    if adjusted < 1 {
        return Err(CodecError::corrupt(
            "normalization could not keep every seen symbol at frequency >= 1",
        ));
    }
    freq[largest_idx] = adjusted as u16;
    Ok(freq)
}

/// Rescale an already-normalized 12-bit table down to 10 bits, preserving
/// at least 1 for every symbol that was present in the source table.
pub fn rescale_to_10bit(freq12: &[u16; 256]) -> Result<[u16; 256]> {
    let counts: [u64; 256] = {
        let mut c = [0u64; 256];
        for (s, &f) in freq12.iter().enumerate() {
            c[s] = f as u64;
        }
        c
    };
    normalize_frequencies(&counts, TABLE_SIZE_10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::{BitReader, BitWriter};

    fn flat_freq(symbols: &[u8]) -> [u16; 256] {
        let mut counts = [0u64; 256];
        for &s in symbols {
            counts[s as usize] += 1;
        }
        normalize_frequencies(&counts, TABLE_SIZE_12).unwrap()
    }

    #[test]
    fn round_trip_small_alphabet() {
        let src: Vec<u8> = b"ABRACADABRA_ABRACADABRA_ABRACADABRA".to_vec();
        let freq = flat_freq(&src);
        let table = TansTable::build(&freq, TABLE_LOG_12).unwrap();

        let mut scratch = [0u8; 4096];
        let mut writer = BitWriter::new(&mut scratch);
        let final_state = table.encode(&src, &mut writer).unwrap();
        let len = writer.flush();

        let mut reader = BitReader::new(&scratch[..len]).unwrap();
        let mut out = vec![0u8; src.len()];
        table.decode(final_state, src.len(), &mut reader, &mut out).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn round_trip_all_256_symbols() {
        let src: Vec<u8> = (0..=255u16).flat_map(|b| std::iter::repeat(b as u8).take(3)).collect();
        let freq = flat_freq(&src);
        let table = TansTable::build(&freq, TABLE_LOG_12).unwrap();

        let mut scratch = vec![0u8; src.len() * 2];
        let mut writer = BitWriter::new(&mut scratch);
        let final_state = table.encode(&src, &mut writer).unwrap();
        let len = writer.flush();

        let mut reader = BitReader::new(&scratch[..len]).unwrap();
        let mut out = vec![0u8; src.len()];
        table.decode(final_state, src.len(), &mut reader, &mut out).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn normalization_sums_to_table_size() {
        let mut counts = [0u64; 256];
        counts[b'a' as usize] = 2;
        counts[b'b' as usize] = 3;
        counts[b'c' as usize] = 6;
        counts[b'd' as usize] = 2;
        let freq = normalize_frequencies(&counts, 1 << 4).unwrap();
        assert_eq!(freq.iter().map(|&f| f as u32).sum::<u32>(), 1 << 4);
        assert!(freq[b'a' as usize] >= 1);
    }

    #[test]
    fn rescale_preserves_presence() {
        let mut counts = [0u64; 256];
        counts[b'x' as usize] = 1;
        counts[b'y' as usize] = 4095;
        let freq12 = normalize_frequencies(&counts, TABLE_SIZE_12).unwrap();
        let freq10 = rescale_to_10bit(&freq12).unwrap();
        assert!(freq10[b'x' as usize] >= 1);
        assert_eq!(freq10.iter().map(|&f| f as u32).sum::<u32>(), TABLE_SIZE_10 as u32);
    }
}
