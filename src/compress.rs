//! Compressor: the trial-and-compare pipeline coordinator.
//!
//! Every call builds a small set of candidate encodings of the same packet
//! (passthrough, RLE, LZ77, one or more tANS variants) fully assembled as
//! wire bytes, then keeps the shortest. The delta/LZP pre-filter stage that
//! every candidate shares runs entirely in place against the context's
//! pre-sized arena (`Context::scratch`), so it costs zero hot-path
//! allocation regardless of how many candidates are tried afterwards.
//! Candidate assembly itself still allocates a `Vec<u8>` per trial: juggling
//! N live candidate buffers in a hand-rolled bump allocator bought little
//! for how much implementation risk it added. See DESIGN.md.

use crate::bucket::{bucket_lut, NUM_BUCKETS};
use crate::config::{BIGRAM, COMPACT_HDR, DELTA, FAST_COMPRESS};
use crate::context::Context;
use crate::delta;
use crate::dictionary::Dictionary;
use crate::error::{CodecError, Result};
use crate::header::{self, FLAG_DELTA, FLAG_LZP, FLAG_ORDER2, FLAG_PASSTHRU};
use crate::lz77;
use crate::rle;
use crate::tans::{self, TansTable};

pub const MAX_PACKET_SIZE: usize = 65535;
pub const MAX_OVERHEAD: usize = 8;

pub fn compress_bound(n: usize) -> usize {
    n + MAX_OVERHEAD
}

fn assemble(
    flags: u8,
    algorithm: u8,
    original_size: u16,
    state: Option<u32>,
    mreg: Option<&[(u32, u32)]>,
    payload: &[u8],
    compact: bool,
    model_id: u8,
    seq: u8,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 16);
    let wrote_compact = compact && header::write_compact(flags, algorithm, original_size, &mut out).is_some();
    if !wrote_compact {
        out.resize(header::LEGACY_HEADER_LEN, 0);
    }

    if let Some(regions) = mreg {
        out.push(regions.len() as u8);
        for &(st, len) in regions {
            out.extend_from_slice(&st.to_le_bytes());
            out.extend_from_slice(&len.to_le_bytes());
        }
    } else if let Some(st) = state {
        // The 10-bit tANS variant's state lives in an 11-bit domain and
        // always fits a u16, independent of which header form is in use.
        let narrow_state = wrote_compact || header::algo_family(algorithm) == header::ALGO_FAMILY_TANS_10;
        if narrow_state {
            out.extend_from_slice(&(st as u16).to_le_bytes());
        } else {
            out.extend_from_slice(&st.to_le_bytes());
        }
    }
    out.extend_from_slice(payload);

    if !wrote_compact {
        let compressed_size = (out.len() - header::LEGACY_HEADER_LEN) as u16;
        let legacy = header::LegacyHeader {
            original_size,
            compressed_size,
            flags,
            algorithm,
            model_id,
            context_seq: seq,
        };
        legacy.write_to(&mut out[..header::LEGACY_HEADER_LEN]).unwrap();
    }
    out
}

fn encode_whole(table: &TansTable, src: &[u8]) -> Result<(Vec<u8>, u32)> {
    let mut buf = vec![0u8; src.len() + 16];
    let mut writer = crate::bitstream::BitWriter::new(&mut buf);
    let state = table.encode(src, &mut writer)?;
    let len = writer.flush();
    buf.truncate(len);
    Ok((buf, state))
}

fn encode_single_region(dict: &Dictionary, bucket: usize, src: &[u8]) -> Result<(Vec<u8>, u32)> {
    encode_whole(dict.unigram(bucket), src)
}

fn encode_pctx(dict: &Dictionary, src: &[u8]) -> Result<(Vec<u8>, u32)> {
    let lut = bucket_lut(src.len());
    let table_for = |i: usize| dict.unigram(lut[i] as usize);
    let mut buf = vec![0u8; src.len() + 16];
    let mut writer = crate::bitstream::BitWriter::new(&mut buf);
    let state = tans::encode_per_position(table_for, src, &mut writer)?;
    let len = writer.flush();
    buf.truncate(len);
    Ok((buf, state))
}

fn encode_bigram_pctx(dict: &Dictionary, src: &[u8]) -> Result<(Vec<u8>, u32)> {
    let lut = bucket_lut(src.len());
    let table_for = |i: usize| {
        let bucket = lut[i] as usize;
        let prev = if i == 0 { 0u8 } else { src[i - 1] };
        let class = dict.class_of_prev(prev);
        dict.bigram(bucket, class)
    };
    let mut buf = vec![0u8; src.len() + 16];
    let mut writer = crate::bitstream::BitWriter::new(&mut buf);
    let state = tans::encode_per_position(table_for, src, &mut writer)?;
    let len = writer.flush();
    buf.truncate(len);
    Ok((buf, state))
}

fn encode_tans10(dict: &Dictionary, src: &[u8]) -> Result<(Vec<u8>, u32)> {
    let lut = bucket_lut(src.len());
    let table_for = |i: usize| dict.unigram_10bit(lut[i] as usize);
    let mut buf = vec![0u8; src.len() + 16];
    let mut writer = crate::bitstream::BitWriter::new(&mut buf);
    let state = tans::encode_per_position(table_for, src, &mut writer)?;
    let len = writer.flush();
    buf.truncate(len);
    Ok((buf, state))
}

fn encode_mreg(dict: &Dictionary, src: &[u8]) -> Result<(Vec<u8>, Vec<(u32, u32)>)> {
    let mut payload = Vec::with_capacity(src.len());
    let mut descriptors = Vec::new();
    let mut start = 0usize;
    for (bucket, run) in crate::bucket::bucket_segments(src.len()) {
        let (bytes, state) = encode_whole(dict.unigram(bucket), &src[start..start + run])?;
        descriptors.push((state, bytes.len() as u32));
        payload.extend_from_slice(&bytes);
        start += run;
    }
    Ok((payload, descriptors))
}

struct Best {
    bytes: Vec<u8>,
    family: u8,
}

fn consider(best: &mut Option<Best>, bytes: Vec<u8>, family: u8) {
    if best.as_ref().is_none_or(|b| bytes.len() < b.bytes.len()) {
        *best = Some(Best { bytes, family });
    }
}

/// Compress `src` into `dst`, returning the number of bytes written.
pub fn compress(ctx: &mut Context, src: &[u8], dst: &mut [u8]) -> Result<usize> {
    if src.is_empty() {
        return Err(CodecError::invalid_arg("src must be non-empty"));
    }
    if src.len() > MAX_PACKET_SIZE {
        return Err(CodecError::too_big("payload exceeds 65535 bytes"));
    }

    let cfg = *ctx.config();
    let compact = cfg.has(COMPACT_HDR);
    let fast = cfg.has(FAST_COMPRESS);
    let original_size = src.len() as u16;
    let model_id = ctx.dict().map(Dictionary::model_id).unwrap_or(0);
    let seq = ctx.seq();

    let mut flags = 0u8;
    let prev_len = ctx.prev().map_or(0, <[u8]>::len);
    let delta_eligible = cfg.has(DELTA) && delta::is_eligible(src.len(), ctx.prev().is_some(), prev_len);

    // The delta/LZP pre-filter shares one arena-backed working buffer (plus
    // an equal-sized scratch region for the order-2 trial) instead of
    // allocating fresh `Vec<u8>`s every call.
    let mut arena = std::mem::take(&mut ctx.scratch);
    if arena.len() < 2 * src.len() {
        arena.resize(2 * src.len(), 0);
    }
    let (working_buf, rest) = arena.split_at_mut(src.len());
    working_buf.copy_from_slice(src);
    let scratch2 = &mut rest[..src.len()];

    let delta_order = if delta_eligible {
        let prev = ctx.prev().unwrap();
        let prev2 = ctx.prev2().filter(|p| p.len() == src.len());
        match delta::encode_best_inplace(working_buf, prev, prev2, scratch2) {
            Ok(order) => Some(order),
            Err(e) => {
                ctx.scratch = arena;
                return Err(e);
            }
        }
    } else {
        None
    };
    if let Some(order) = delta_order {
        flags |= FLAG_DELTA;
        if order == delta::Order::Second {
            flags |= FLAG_ORDER2;
        }
    }

    let mut lzp_applied = false;
    if !delta_eligible {
        let lzp_table = ctx
            .adaptive()
            .and_then(|a| a.lzp_mirror())
            .or_else(|| ctx.dict().and_then(Dictionary::lzp));
        if let Some(table) = lzp_table {
            table.apply_inplace(working_buf);
            lzp_applied = true;
            flags |= FLAG_LZP;
        }
    }
    let prefiltered = delta_eligible || lzp_applied;
    let working: &[u8] = working_buf;

    let mut best: Option<Best> = None;

    let passthru = assemble(
        flags | FLAG_PASSTHRU,
        header::ALGO_FAMILY_PASSTHRU_BARE,
        original_size,
        None,
        None,
        &working,
        compact,
        model_id,
        seq,
    );
    consider(&mut best, passthru, header::ALGO_FAMILY_PASSTHRU_BARE);

    if rle::run_dominant(&working) {
        let tokens = rle::encode(&working);
        let c = assemble(
            flags | FLAG_PASSTHRU,
            header::ALGO_FAMILY_PASSTHRU_RLE,
            original_size,
            None,
            None,
            &tokens,
            compact,
            model_id,
            seq,
        );
        consider(&mut best, c, header::ALGO_FAMILY_PASSTHRU_RLE);
    }

    let lz77_min = if fast { lz77::MIN_PAYLOAD_FAST } else { lz77::MIN_PAYLOAD_NORMAL };
    if working.len() >= lz77_min {
        let tokens = lz77::encode(&working);
        let c = assemble(
            flags | FLAG_PASSTHRU,
            header::ALGO_FAMILY_PASSTHRU_LZ77,
            original_size,
            None,
            None,
            &tokens,
            compact,
            model_id,
            seq,
        );
        consider(&mut best, c, header::ALGO_FAMILY_PASSTHRU_LZ77);
    }

    if let Some(dict) = ctx.dict() {
        if !fast && !prefiltered {
            for bucket in 0..NUM_BUCKETS {
                if let Ok((payload, state)) = encode_single_region(dict, bucket, &working) {
                    let c = assemble(
                        flags,
                        header::pack_algo(header::ALGO_FAMILY_TANS_SR, bucket),
                        original_size,
                        Some(state),
                        None,
                        &payload,
                        compact,
                        model_id,
                        seq,
                    );
                    consider(&mut best, c, header::ALGO_FAMILY_TANS_SR);
                }
            }
        }

        if let Ok((payload, state)) = encode_pctx(dict, &working) {
            let c = assemble(
                flags,
                header::ALGO_FAMILY_TANS_PCTX,
                original_size,
                Some(state),
                None,
                &payload,
                compact,
                model_id,
                seq,
            );
            consider(&mut best, c, header::ALGO_FAMILY_TANS_PCTX);
        }

        if cfg.has(BIGRAM) {
            if let Ok((payload, state)) = encode_bigram_pctx(dict, &working) {
                let c = assemble(
                    flags,
                    header::ALGO_FAMILY_TANS_BIGRAM_PCTX,
                    original_size,
                    Some(state),
                    None,
                    &payload,
                    compact,
                    model_id,
                    seq,
                );
                consider(&mut best, c, header::ALGO_FAMILY_TANS_BIGRAM_PCTX);
            }
        }

        if let Ok((payload, descriptors)) = encode_mreg(dict, &working) {
            let c = assemble(
                flags,
                header::ALGO_FAMILY_TANS_MREG,
                original_size,
                None,
                Some(&descriptors),
                &payload,
                compact,
                model_id,
                seq,
            );
            consider(&mut best, c, header::ALGO_FAMILY_TANS_MREG);
        }

        if working.len() <= 128 {
            if let Ok((payload, state)) = encode_tans10(dict, &working) {
                let c = assemble(
                    flags,
                    header::pack_algo(header::ALGO_FAMILY_TANS_10, 0),
                    original_size,
                    Some(state),
                    None,
                    &payload,
                    compact,
                    model_id,
                    seq,
                );
                consider(&mut best, c, header::ALGO_FAMILY_TANS_10);
            }
        }
    }

    ctx.scratch = arena;

    let best = best.expect("passthrough candidate is always produced");
    if best.bytes.len() > dst.len() {
        return Err(CodecError::buf_small("destination too small for compressed packet"));
    }
    dst[..best.bytes.len()].copy_from_slice(&best.bytes);

    accumulate_adaptive(ctx, src);
    ctx.advance(src)?;
    ctx.record_output(best.family as usize, best.bytes.len());
    Ok(best.bytes.len())
}

/// Feed one packet's true bytes into the context's adaptive mirror. Shared
/// by the compressor and decompressor so both sides' mirrors evolve in
/// lockstep regardless of which direction processed the packet.
pub(crate) fn accumulate_adaptive(ctx: &mut Context, src: &[u8]) {
    let (dict, adaptive) = ctx.dict_and_adaptive_mut();
    let Some(adaptive) = adaptive else { return };

    // Unigram observation is a pure per-offset histogram: fold each
    // same-bucket run with one `freq_count` call instead of per-byte.
    let mut start = 0usize;
    for (bucket, run) in crate::bucket::bucket_segments(src.len()) {
        let counts = crate::simd::freq_count(&src[start..start + run]);
        adaptive.add_unigram_counts(bucket, &counts);
        start += run;
    }

    if let Some(dict) = dict {
        let lut = bucket_lut(src.len());
        let mut prev = 0u8;
        for (i, &b) in src.iter().enumerate() {
            let bucket = lut[i] as usize;
            let class = dict.class_of_prev(prev);
            adaptive.observe_bigram(bucket, class, b);
            prev = b;
        }
    }

    if let Some(mirror) = adaptive.lzp_mirror_mut() {
        let mut prev = 0u8;
        for (i, &b) in src.iter().enumerate() {
            mirror.observe(prev, i as u32, b);
            prev = b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, COMPACT_HDR, DELTA};
    use crate::context::Context;
    use crate::decompress::decompress;
    use crate::dictionary::Dictionary;
    use std::sync::Arc;

    #[test]
    fn round_trips_without_dictionary() {
        let mut ctx = Context::create(None, Config::default()).unwrap();
        let src = b"hello hello hello hello".to_vec();
        let mut dst = vec![0u8; compress_bound(src.len())];
        let n = compress(&mut ctx, &src, &mut dst).unwrap();
        let mut out = vec![0u8; src.len()];
        let mut dctx = Context::create(None, Config::default()).unwrap();
        let m = decompress(&mut dctx, &dst[..n], &mut out).unwrap();
        assert_eq!(&out[..m], &src[..]);
    }

    #[test]
    fn round_trips_with_trained_dictionary() {
        let corpus_pkt = vec![0x41u8; 256];
        let dict = Arc::new(Dictionary::train(&[&corpus_pkt], 1, false).unwrap());
        let mut ctx = Context::create(Some(dict.clone()), Config::default()).unwrap();
        let mut dst = vec![0u8; compress_bound(corpus_pkt.len())];
        let n = compress(&mut ctx, &corpus_pkt, &mut dst).unwrap();
        assert!(n < corpus_pkt.len());

        let mut dctx = Context::create(Some(dict), Config::default()).unwrap();
        let mut out = vec![0u8; corpus_pkt.len()];
        let m = decompress(&mut dctx, &dst[..n], &mut out).unwrap();
        assert_eq!(&out[..m], &corpus_pkt[..]);
    }

    #[test]
    fn stateful_delta_shrinks_second_packet() {
        let cfg = Config {
            flags: crate::config::STATEFUL | DELTA,
            ..Config::default()
        };
        let mut ctx = Context::create(None, cfg).unwrap();
        let p0 = vec![0x41u8; 64];
        let mut p1 = p0.clone();
        p1[0] = 0x42;

        let mut dst0 = vec![0u8; compress_bound(64)];
        let n0 = compress(&mut ctx, &p0, &mut dst0).unwrap();
        let header0 = header::LegacyHeader::read_from(&dst0[..n0]).unwrap();
        assert_eq!(header0.flags & FLAG_DELTA, 0);

        let mut dst1 = vec![0u8; compress_bound(64)];
        let n1 = compress(&mut ctx, &p1, &mut dst1).unwrap();
        let header1 = header::LegacyHeader::read_from(&dst1[..n1]).unwrap();
        assert_ne!(header1.flags & FLAG_DELTA, 0);
    }

    #[test]
    fn compact_header_is_smaller_than_legacy_for_same_payload() {
        let corpus_pkt = vec![0x7au8; 64];
        let dict = Arc::new(Dictionary::train(&[&corpus_pkt], 2, false).unwrap());
        let mut legacy_ctx = Context::create(Some(dict.clone()), Config::default()).unwrap();
        let mut compact_ctx = Context::create(
            Some(dict),
            Config {
                flags: crate::config::STATEFUL | COMPACT_HDR,
                ..Config::default()
            },
        )
        .unwrap();

        let mut dst_legacy = vec![0u8; compress_bound(64)];
        let n_legacy = compress(&mut legacy_ctx, &corpus_pkt, &mut dst_legacy).unwrap();
        let mut dst_compact = vec![0u8; compress_bound(64)];
        let n_compact = compress(&mut compact_ctx, &corpus_pkt, &mut dst_compact).unwrap();
        assert!(n_compact + 6 <= n_legacy || n_compact < n_legacy);
    }

    #[test]
    fn output_never_exceeds_bound() {
        let mut ctx = Context::create(None, Config::default()).unwrap();
        let src: Vec<u8> = (0..=255u16).cycle().take(300).map(|b| b as u8).collect();
        let mut dst = vec![0u8; compress_bound(src.len())];
        let n = compress(&mut ctx, &src, &mut dst).unwrap();
        assert!(n <= compress_bound(src.len()));
    }
}
