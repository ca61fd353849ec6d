//! Packet header encode/decode: the legacy fixed 8-byte form and the
//! compact 2/4-byte form.
//!
//! The compact form trades the legacy header's explicit `compressed_size`,
//! `model_id` and `context_seq` fields for context-side bookkeeping: a
//! single buffer-to-buffer call already carries its own compressed length
//! as `src_size`, ordered delivery (see the context module) keeps the
//! sequence counter implicit, and compact mode is only meaningful when both
//! ends are pinned to the same dictionary by configuration. Only
//! `original_size` and the (flags, algorithm) pair travel on the wire.

use crate::error::{CodecError, Result};

pub const LEGACY_HEADER_LEN: usize = 8;

pub const FLAG_DELTA: u8 = 0x01;
pub const FLAG_ORDER2: u8 = 0x02;
pub const FLAG_LZP: u8 = 0x04;
pub const FLAG_PASSTHRU: u8 = 0x08;

pub const ALGO_FAMILY_PASSTHRU_BARE: u8 = 0x0;
pub const ALGO_FAMILY_PASSTHRU_RLE: u8 = 0x1;
pub const ALGO_FAMILY_RESERVED_RANS: u8 = 0x2;
pub const ALGO_FAMILY_PASSTHRU_LZ77: u8 = 0x3;
pub const ALGO_FAMILY_TANS_SR: u8 = 0x4;
pub const ALGO_FAMILY_TANS_10: u8 = 0x5;
pub const ALGO_FAMILY_TANS_PCTX: u8 = 0x6;
pub const ALGO_FAMILY_TANS_BIGRAM_PCTX: u8 = 0x7;
pub const ALGO_FAMILY_TANS_MREG: u8 = 0x8;

#[inline]
pub fn algo_family(algorithm: u8) -> u8 {
    algorithm & 0x0f
}

#[inline]
pub fn algo_bucket(algorithm: u8) -> usize {
    (algorithm >> 4) as usize
}

#[inline]
pub fn pack_algo(family: u8, bucket: usize) -> u8 {
    debug_assert!(bucket < 16);
    (family & 0x0f) | ((bucket as u8) << 4)
}

/// Fixed 8-byte legacy header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LegacyHeader {
    pub original_size: u16,
    pub compressed_size: u16,
    pub flags: u8,
    pub algorithm: u8,
    pub model_id: u8,
    pub context_seq: u8,
}

impl LegacyHeader {
    pub fn write_to(&self, out: &mut [u8]) -> Result<()> {
        if out.len() < LEGACY_HEADER_LEN {
            return Err(CodecError::buf_small("destination too small for legacy header"));
        }
        out[0..2].copy_from_slice(&self.original_size.to_le_bytes());
        out[2..4].copy_from_slice(&self.compressed_size.to_le_bytes());
        out[4] = self.flags;
        out[5] = self.algorithm;
        out[6] = self.model_id;
        out[7] = self.context_seq;
        Ok(())
    }

    pub fn read_from(data: &[u8]) -> Result<LegacyHeader> {
        if data.len() < LEGACY_HEADER_LEN {
            return Err(CodecError::corrupt("truncated legacy header"));
        }
        Ok(LegacyHeader {
            original_size: u16::from_le_bytes([data[0], data[1]]),
            compressed_size: u16::from_le_bytes([data[2], data[3]]),
            flags: data[4],
            algorithm: data[5],
            model_id: data[6],
            context_seq: data[7],
        })
    }
}

/// Decoded compact header plus how many bytes it occupied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompactHeader {
    pub flags: u8,
    pub algorithm: u8,
    pub original_size: u16,
    pub consumed: usize,
}

fn build_packet_types() -> Vec<(u8, u8)> {
    let mut types = Vec::with_capacity(256);
    let unbucketed_families = [
        (FLAG_PASSTHRU, ALGO_FAMILY_PASSTHRU_BARE),
        (FLAG_PASSTHRU, ALGO_FAMILY_PASSTHRU_RLE),
        (FLAG_PASSTHRU, ALGO_FAMILY_PASSTHRU_LZ77),
        (0, ALGO_FAMILY_TANS_PCTX),
        (0, ALGO_FAMILY_TANS_BIGRAM_PCTX),
        (0, ALGO_FAMILY_TANS_MREG),
    ];
    for &(base_flags, family) in &unbucketed_families {
        for &delta in &[false, true] {
            for &order2 in &[false, true] {
                if order2 && !delta {
                    continue;
                }
                for &lzp in &[false, true] {
                    if types.len() >= 256 {
                        return types;
                    }
                    let mut flags = base_flags;
                    if delta {
                        flags |= FLAG_DELTA;
                    }
                    if order2 {
                        flags |= FLAG_ORDER2;
                    }
                    if lzp {
                        flags |= FLAG_LZP;
                    }
                    types.push((flags, family));
                }
            }
        }
    }
    for &family in &[ALGO_FAMILY_TANS_SR, ALGO_FAMILY_TANS_10] {
        for bucket in 0..16usize {
            for &delta in &[false, true] {
                for &order2 in &[false, true] {
                    if order2 && !delta {
                        continue;
                    }
                    for &lzp in &[false, true] {
                        if types.len() >= 256 {
                            return types;
                        }
                        let mut flags = 0u8;
                        if delta {
                            flags |= FLAG_DELTA;
                        }
                        if order2 {
                            flags |= FLAG_ORDER2;
                        }
                        if lzp {
                            flags |= FLAG_LZP;
                        }
                        types.push((flags, pack_algo(family, bucket)));
                    }
                }
            }
        }
    }
    types
}

fn packet_types() -> &'static [(u8, u8)] {
    static TABLE: std::sync::OnceLock<Vec<(u8, u8)>> = std::sync::OnceLock::new();
    TABLE.get_or_init(build_packet_types)
}

/// Look up the compact packet-type index for (flags, algorithm); `None`
/// means this combination has no compact representation and the caller
/// must fall back to the legacy header.
pub fn compact_index_for(flags: u8, algorithm: u8) -> Option<u8> {
    packet_types()
        .iter()
        .position(|&(f, a)| f == flags && a == algorithm)
        .map(|i| i as u8)
}

fn decode_packet_type(idx: u8) -> Result<(u8, u8)> {
    packet_types()
        .get(idx as usize)
        .copied()
        .ok_or_else(|| CodecError::corrupt("compact header packet-type index out of range"))
}

fn write_size_varint(size: u16, out: &mut Vec<u8>) {
    if size <= 127 {
        out.push(size as u8);
    } else {
        out.push(0x80);
        out.extend_from_slice(&size.to_le_bytes());
    }
}

fn read_size_varint(data: &[u8]) -> Result<(u16, usize)> {
    if data.is_empty() {
        return Err(CodecError::corrupt("truncated compact header size field"));
    }
    if data[0] & 0x80 == 0 {
        Ok((data[0] as u16, 1))
    } else {
        if data.len() < 3 {
            return Err(CodecError::corrupt("truncated compact header 3-byte size field"));
        }
        Ok((u16::from_le_bytes([data[1], data[2]]), 3))
    }
}

/// Encode a compact header into `out` (appended), or `None` if (flags,
/// algorithm) has no compact representation.
pub fn write_compact(flags: u8, algorithm: u8, original_size: u16, out: &mut Vec<u8>) -> Option<()> {
    let idx = compact_index_for(flags, algorithm)?;
    out.push(idx);
    write_size_varint(original_size, out);
    Some(())
}

pub fn read_compact(data: &[u8]) -> Result<CompactHeader> {
    if data.is_empty() {
        return Err(CodecError::corrupt("truncated compact header"));
    }
    let (flags, algorithm) = decode_packet_type(data[0])?;
    let (original_size, size_len) = read_size_varint(&data[1..])?;
    Ok(CompactHeader {
        flags,
        algorithm,
        original_size,
        consumed: 1 + size_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_round_trips() {
        let h = LegacyHeader {
            original_size: 512,
            compressed_size: 300,
            flags: FLAG_DELTA | FLAG_LZP,
            algorithm: pack_algo(ALGO_FAMILY_TANS_SR, 3),
            model_id: 7,
            context_seq: 200,
        };
        let mut buf = [0u8; LEGACY_HEADER_LEN];
        h.write_to(&mut buf).unwrap();
        let parsed = LegacyHeader::read_from(&buf).unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn compact_round_trips_small_size() {
        let mut out = Vec::new();
        write_compact(0, ALGO_FAMILY_TANS_PCTX, 100, &mut out).unwrap();
        assert_eq!(out.len(), 2);
        let parsed = read_compact(&out).unwrap();
        assert_eq!(parsed.original_size, 100);
        assert_eq!(parsed.algorithm, ALGO_FAMILY_TANS_PCTX);
        assert_eq!(parsed.consumed, 2);
    }

    #[test]
    fn compact_round_trips_large_size() {
        let mut out = Vec::new();
        write_compact(FLAG_PASSTHRU, ALGO_FAMILY_PASSTHRU_BARE, 5000, &mut out).unwrap();
        assert_eq!(out.len(), 4);
        let parsed = read_compact(&out).unwrap();
        assert_eq!(parsed.original_size, 5000);
        assert_eq!(parsed.consumed, 4);
    }

    #[test]
    fn compact_index_out_of_range_is_corrupt() {
        let buf = [255u8, 10];
        let err = read_compact(&buf).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Corrupt);
    }

    #[test]
    fn algo_pack_round_trips() {
        let a = pack_algo(ALGO_FAMILY_TANS_10, 9);
        assert_eq!(algo_family(a), ALGO_FAMILY_TANS_10);
        assert_eq!(algo_bucket(a), 9);
    }
}
