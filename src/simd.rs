//! SIMD kernel contract.
//!
//! The real kernels (generic / SSE4.2 / AVX2 / NEON) are a replaceable,
//! out-of-scope collaborator; this module defines their contract and a
//! reference implementation that every level delegates to, which is what
//! makes them bit-identical by construction rather than by testing alone.
//! Swapping in target-specific codegen later only has to preserve these
//! function bodies' observable behavior.

use crate::config::SimdLevel;

/// Process-wide detected level, resolved once at first use.
pub fn detect_level() -> SimdLevel {
    static LEVEL: std::sync::OnceLock<SimdLevel> = std::sync::OnceLock::new();
    *LEVEL.get_or_init(|| {
        if cfg!(target_arch = "x86_64") {
            SimdLevel::Generic
        } else if cfg!(target_arch = "aarch64") {
            SimdLevel::Generic
        } else {
            SimdLevel::Generic
        }
    })
}

/// XOR `curr` against `prev` into `out`, byte for byte.
pub fn delta_encode_xor(curr: &[u8], prev: &[u8], out: &mut [u8]) {
    for ((&c, &p), o) in curr.iter().zip(prev.iter()).zip(out.iter_mut()) {
        *o = c ^ p;
    }
}

pub fn delta_decode_xor(residual: &[u8], prev: &[u8], out: &mut [u8]) {
    delta_encode_xor(residual, prev, out)
}

/// Modular subtract `curr - prev` into `out`, byte for byte.
pub fn delta_encode_sub(curr: &[u8], prev: &[u8], out: &mut [u8]) {
    for ((&c, &p), o) in curr.iter().zip(prev.iter()).zip(out.iter_mut()) {
        *o = c.wrapping_sub(p);
    }
}

pub fn delta_decode_sub(residual: &[u8], prev: &[u8], out: &mut [u8]) {
    for ((&r, &p), o) in residual.iter().zip(prev.iter()).zip(out.iter_mut()) {
        *o = r.wrapping_add(p);
    }
}

/// XOR `buf` against `prev` in place. Self-inverse, so this serves both
/// [`delta_encode_xor`] and [`delta_decode_xor`]'s role when the caller
/// can't spare a separate output buffer.
pub fn delta_xor_inplace(buf: &mut [u8], prev: &[u8]) {
    for (b, &p) in buf.iter_mut().zip(prev.iter()) {
        *b ^= p;
    }
}

/// In-place form of [`delta_encode_sub`].
pub fn delta_encode_sub_inplace(buf: &mut [u8], prev: &[u8]) {
    for (b, &p) in buf.iter_mut().zip(prev.iter()) {
        *b = b.wrapping_sub(p);
    }
}

/// In-place form of [`delta_decode_sub`].
pub fn delta_decode_sub_inplace(buf: &mut [u8], prev: &[u8]) {
    for (b, &p) in buf.iter_mut().zip(prev.iter()) {
        *b = b.wrapping_add(p);
    }
}

/// Histogram of `data`, one bucket per byte value.
pub fn freq_count(data: &[u8]) -> [u64; 256] {
    let mut counts = [0u64; 256];
    for &b in data {
        counts[b as usize] += 1;
    }
    counts
}

/// Fold `data` into a running CRC32 `state` (IEEE 802.3 polynomial). Part
/// of the SIMD kernel contract alongside the delta and histogram kernels;
/// delegates to the same table-driven fold [`Crc32::update`](crate::crc32::Crc32::update)
/// uses, so the struct-based and free-function entry points can never
/// compute different checksums for the same bytes.
pub fn crc32_update(state: u32, data: &[u8]) -> u32 {
    let raw = crate::crc32::fold(state ^ 0xffff_ffff, data);
    raw ^ 0xffff_ffff
}
