//! Field-class-aware delta prediction between same-sized packets.
//!
//! Four offset ranges get two different residual rules: the header and body
//! ranges are flag/float-shaped and XOR cleanly against their predecessor;
//! the subheader and tail ranges are counter-shaped and benefit from modular
//! subtraction instead. Order-2 extrapolates from the two most recent
//! packets rather than just the last one; the encoder picks whichever order
//! produces the lower-entropy residual.

use crate::error::{CodecError, Result};

const HEADER_END: usize = 16;
const SUBHEADER_END: usize = 64;
const BODY_END: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FieldClass {
    Header,
    Subheader,
    Body,
    Tail,
}

#[inline]
fn class_of(offset: usize) -> FieldClass {
    if offset < HEADER_END {
        FieldClass::Header
    } else if offset < SUBHEADER_END {
        FieldClass::Subheader
    } else if offset < BODY_END {
        FieldClass::Body
    } else {
        FieldClass::Tail
    }
}

#[inline]
fn is_xor_class(class: FieldClass) -> bool {
    matches!(class, FieldClass::Header | FieldClass::Body)
}

/// Delta order: how many prior packets the predictor draws from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    First,
    Second,
}

const MIN_DELTA_SIZE: usize = 8;

/// Whether delta prediction is eligible for a packet of `len` bytes against
/// whatever history a context holds.
pub fn is_eligible(len: usize, has_prev: bool, prev_len: usize) -> bool {
    len >= MIN_DELTA_SIZE && has_prev && prev_len == len
}

/// Walk `[0, len)` as contiguous runs sharing one field class, clamped to
/// the four fixed boundaries. Encode and decode both derive the same
/// segmentation from `len` alone, so table-free order-1 never needs to
/// agree on anything beyond a buffer length.
fn for_each_class_segment(len: usize, mut f: impl FnMut(usize, usize, FieldClass)) {
    let bounds = [HEADER_END.min(len), SUBHEADER_END.min(len), BODY_END.min(len), len];
    let mut start = 0usize;
    for &end in &bounds {
        if end > start {
            f(start, end, class_of(start));
            start = end;
        }
    }
}

fn predict_order2(offset: usize, prev: u8, prev2: u8) -> (FieldClass, u8) {
    let class = class_of(offset);
    let pred = if is_xor_class(class) {
        prev ^ prev2
    } else {
        (2u16 * prev as u16).wrapping_sub(prev2 as u16) as u8
    };
    (class, pred)
}

fn residual_of(class: FieldClass, curr: u8, pred: u8) -> u8 {
    if is_xor_class(class) {
        curr ^ pred
    } else {
        curr.wrapping_sub(pred)
    }
}

fn restore_from(class: FieldClass, residual: u8, pred: u8) -> u8 {
    if is_xor_class(class) {
        residual ^ pred
    } else {
        residual.wrapping_add(pred)
    }
}

/// Encode `buf` (holding `curr`) against `prev` (order-1), overwriting `buf`
/// with the residual in place. `buf` and `prev` must share the same length.
/// Safe to do in place: position `i`'s residual depends only on `buf[i]`
/// and `prev[i]`, never on another position's value. Order-1's predictor is
/// exactly `prev[i]`, so each class segment is one call into the matching
/// SIMD kernel rather than a per-byte dispatch.
pub fn encode_order1_inplace(buf: &mut [u8], prev: &[u8]) {
    debug_assert_eq!(buf.len(), prev.len());
    for_each_class_segment(buf.len(), |start, end, class| {
        if is_xor_class(class) {
            crate::simd::delta_xor_inplace(&mut buf[start..end], &prev[start..end]);
        } else {
            crate::simd::delta_encode_sub_inplace(&mut buf[start..end], &prev[start..end]);
        }
    });
}

/// Inverse of [`encode_order1_inplace`]: `buf` holds the residual on entry,
/// the original bytes on return.
pub fn decode_order1_inplace(buf: &mut [u8], prev: &[u8]) {
    debug_assert_eq!(buf.len(), prev.len());
    for_each_class_segment(buf.len(), |start, end, class| {
        if is_xor_class(class) {
            crate::simd::delta_xor_inplace(&mut buf[start..end], &prev[start..end]);
        } else {
            crate::simd::delta_decode_sub_inplace(&mut buf[start..end], &prev[start..end]);
        }
    });
}

/// Encode `buf` (holding `curr`) against `prev`/`prev2` (order-2) in place.
/// All three slices must share the same length. XOR classes fold to two
/// chained SIMD XOR passes (`curr ^ prev ^ prev2`, and XOR is associative),
/// so only the subtract classes' two-reference linear predictor still runs
/// as a per-byte loop.
pub fn encode_order2_inplace(buf: &mut [u8], prev: &[u8], prev2: &[u8]) {
    debug_assert_eq!(buf.len(), prev.len());
    debug_assert_eq!(buf.len(), prev2.len());
    for_each_class_segment(buf.len(), |start, end, class| {
        if is_xor_class(class) {
            crate::simd::delta_xor_inplace(&mut buf[start..end], &prev[start..end]);
            crate::simd::delta_xor_inplace(&mut buf[start..end], &prev2[start..end]);
        } else {
            for i in start..end {
                let (_, pred) = predict_order2(i, prev[i], prev2[i]);
                buf[i] = residual_of(class, buf[i], pred);
            }
        }
    });
}

/// Inverse of [`encode_order2_inplace`].
pub fn decode_order2_inplace(buf: &mut [u8], prev: &[u8], prev2: &[u8]) {
    debug_assert_eq!(buf.len(), prev.len());
    debug_assert_eq!(buf.len(), prev2.len());
    for_each_class_segment(buf.len(), |start, end, class| {
        if is_xor_class(class) {
            crate::simd::delta_xor_inplace(&mut buf[start..end], &prev[start..end]);
            crate::simd::delta_xor_inplace(&mut buf[start..end], &prev2[start..end]);
        } else {
            for i in start..end {
                let (_, pred) = predict_order2(i, prev[i], prev2[i]);
                buf[i] = restore_from(class, buf[i], pred);
            }
        }
    });
}

/// Shannon entropy in bits/byte, used only at encode time to pick between
/// order-1 and order-2 residuals; never part of the wire format.
fn entropy_estimate(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut counts = [0u32; 256];
    for &b in data {
        counts[b as usize] += 1;
    }
    let n = data.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / n;
            -p * p.log2()
        })
        .sum()
}

/// Produce the lower-entropy residual of order-1 vs order-2 in place:
/// `buf` holds `curr` on entry and the chosen residual on return. `scratch`
/// is caller-owned working space (same length as `buf`), only written to
/// when an order-2 candidate is actually evaluated, so the hot path never
/// allocates. Order-2 is only considered when `prev2` is available and the
/// same length as `buf`.
pub fn encode_best_inplace(buf: &mut [u8], prev: &[u8], prev2: Option<&[u8]>, scratch: &mut [u8]) -> Result<Order> {
    if buf.len() != prev.len() || buf.len() != scratch.len() {
        return Err(CodecError::invalid_arg("delta buffers must share length"));
    }

    if let Some(prev2) = prev2 {
        if prev2.len() == buf.len() {
            // Order-2 candidate first, while `buf` still holds `curr`.
            for (i, slot) in scratch.iter_mut().enumerate() {
                let (class, pred) = predict_order2(i, prev[i], prev2[i]);
                *slot = residual_of(class, buf[i], pred);
            }
            let order2_entropy = entropy_estimate(scratch);

            encode_order1_inplace(buf, prev);
            let order1_entropy = entropy_estimate(buf);

            if order2_entropy < order1_entropy {
                buf.copy_from_slice(scratch);
                return Ok(Order::Second);
            }
            return Ok(Order::First);
        }
    }

    encode_order1_inplace(buf, prev);
    Ok(Order::First)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order1_round_trips_across_classes() {
        let prev: Vec<u8> = (0..300u16).map(|i| (i * 7) as u8).collect();
        let curr: Vec<u8> = (0..300u16).map(|i| (i * 7).wrapping_add(3) as u8).collect();
        let mut buf = curr.clone();
        encode_order1_inplace(&mut buf, &prev);
        decode_order1_inplace(&mut buf, &prev);
        assert_eq!(buf, curr);
    }

    #[test]
    fn order2_round_trips_across_classes() {
        let prev2: Vec<u8> = (0..300u16).map(|i| (i * 3) as u8).collect();
        let prev: Vec<u8> = (0..300u16).map(|i| (i * 5) as u8).collect();
        let curr: Vec<u8> = (0..300u16).map(|i| (i * 11).wrapping_add(9) as u8).collect();
        let mut buf = curr.clone();
        encode_order2_inplace(&mut buf, &prev, &prev2);
        decode_order2_inplace(&mut buf, &prev, &prev2);
        assert_eq!(buf, curr);
    }

    #[test]
    fn identical_packets_zero_out_under_order1() {
        let pkt = vec![0x41u8; 64];
        let mut buf = pkt.clone();
        encode_order1_inplace(&mut buf, &pkt);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn eligibility_requires_size_and_matching_history() {
        assert!(!is_eligible(4, true, 4));
        assert!(!is_eligible(8, false, 8));
        assert!(!is_eligible(8, true, 9));
        assert!(is_eligible(8, true, 8));
    }

    #[test]
    fn encode_best_prefers_lower_entropy_order() {
        let prev2 = vec![0x10u8; 64];
        let prev = vec![0x10u8; 64];
        let mut buf = vec![0x10u8; 64];
        let mut scratch = vec![0u8; 64];
        let order = encode_best_inplace(&mut buf, &prev, Some(&prev2), &mut scratch).unwrap();
        assert_eq!(order, Order::First);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn encode_best_inplace_round_trips_whichever_order_it_picks() {
        let prev2: Vec<u8> = (0..64u16).map(|i| (i * 2) as u8).collect();
        let prev: Vec<u8> = (0..64u16).map(|i| (i * 3) as u8).collect();
        let curr: Vec<u8> = (0..64u16).map(|i| (i * 5).wrapping_add(1) as u8).collect();
        let mut buf = curr.clone();
        let mut scratch = vec![0u8; curr.len()];
        let order = encode_best_inplace(&mut buf, &prev, Some(&prev2), &mut scratch).unwrap();
        match order {
            Order::First => decode_order1_inplace(&mut buf, &prev),
            Order::Second => decode_order2_inplace(&mut buf, &prev, &prev2),
        }
        assert_eq!(buf, curr);
    }
}
