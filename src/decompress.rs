//! Decompressor: header parse, algorithm dispatch, inverse pipeline.
//!
//! Mirrors `compress` step for step so the two sides' adaptive mirrors and
//! packet history never diverge: whichever header form, LZP table
//! selection, and delta order the encoder used must be reconstructed
//! exactly from the flags and algorithm byte alone.

use crate::adaptive::AdaptiveState;
use crate::bitstream::BitReader;
use crate::bucket::{bucket_lut, bucket_segments};
use crate::compress::accumulate_adaptive;
use crate::config::COMPACT_HDR;
use crate::context::Context;
use crate::delta;
use crate::dictionary::Dictionary;
use crate::error::{CodecError, Result};
use crate::header::{self, FLAG_DELTA, FLAG_LZP, FLAG_ORDER2};
use crate::lz77;
use crate::lzp::LzpTable;
use crate::rle;
use crate::tans::{self, TansTable};

struct ParsedHeader {
    flags: u8,
    algorithm: u8,
    original_size: usize,
    offset: usize,
    /// Only the legacy header carries `model_id` on the wire; compact mode
    /// pins both ends to the same dictionary out of band (see `header`
    /// module docs), so there is nothing to check there.
    model_id: Option<u8>,
}

fn parse_header(ctx: &Context, src: &[u8]) -> Result<ParsedHeader> {
    if ctx.config().has(COMPACT_HDR) {
        let h = header::read_compact(src)?;
        Ok(ParsedHeader {
            flags: h.flags,
            algorithm: h.algorithm,
            original_size: h.original_size as usize,
            offset: h.consumed,
            model_id: None,
        })
    } else {
        let h = header::LegacyHeader::read_from(src)?;
        let remaining = src.len().checked_sub(header::LEGACY_HEADER_LEN).ok_or_else(|| CodecError::corrupt("packet shorter than legacy header"))?;
        if remaining != h.compressed_size as usize {
            return Err(CodecError::corrupt("legacy compressed_size does not match packet length"));
        }
        Ok(ParsedHeader {
            flags: h.flags,
            algorithm: h.algorithm,
            original_size: h.original_size as usize,
            offset: header::LEGACY_HEADER_LEN,
            model_id: Some(h.model_id),
        })
    }
}

/// Validate the legacy header's `model_id` against the context's dictionary
/// for every non-passthrough packet (§4.I step 2, §7 VERSION).
fn check_model_id(ctx: &Context, header: &ParsedHeader) -> Result<()> {
    let Some(pkt_model_id) = header.model_id else {
        return Ok(());
    };
    if header.flags & header::FLAG_PASSTHRU != 0 {
        return Ok(());
    }
    match ctx.dict() {
        Some(dict) if dict.model_id() == pkt_model_id => Ok(()),
        _ => Err(CodecError::version("packet model_id does not match context dictionary")),
    }
}

fn decode_single_region(table: &TansTable, payload: &[u8], state: u32, len: usize) -> Result<Vec<u8>> {
    let mut reader = BitReader::new(payload)?;
    let mut out = vec![0u8; len];
    table.decode(state, len, &mut reader, &mut out)?;
    Ok(out)
}

fn decode_pctx(dict: &Dictionary, payload: &[u8], state: u32, len: usize) -> Result<Vec<u8>> {
    let lut = bucket_lut(len);
    let table_for = |i: usize| dict.unigram(lut[i] as usize);
    let mut reader = BitReader::new(payload)?;
    let mut out = vec![0u8; len];
    tans::decode_per_position(table_for, state, len, &mut reader, &mut out)?;
    Ok(out)
}

fn decode_tans10(dict: &Dictionary, payload: &[u8], state: u32, len: usize) -> Result<Vec<u8>> {
    let lut = bucket_lut(len);
    let table_for = |i: usize| dict.unigram_10bit(lut[i] as usize);
    let mut reader = BitReader::new(payload)?;
    let mut out = vec![0u8; len];
    tans::decode_per_position(table_for, state, len, &mut reader, &mut out)?;
    Ok(out)
}

/// Unlike plain PCTX, the bigram table choice depends on the previous
/// *decoded* byte, which isn't available yet when the table-selection
/// closure would need to run — so this walks the loop directly instead of
/// going through `tans::decode_per_position`.
fn decode_bigram_pctx(dict: &Dictionary, payload: &[u8], state: u32, len: usize) -> Result<Vec<u8>> {
    let lut = bucket_lut(len);
    let mut reader = BitReader::new(payload)?;
    let mut out = vec![0u8; len];
    let mut cur = state;
    let mut prev = 0u8;
    for i in 0..len {
        let bucket = lut[i] as usize;
        let class = dict.class_of_prev(prev);
        let table = dict.bigram(bucket, class);
        let (symbol, next) = table.decode_step(cur, &mut reader)?;
        out[i] = symbol;
        cur = next;
        prev = symbol;
    }
    Ok(out)
}

fn decode_mreg(dict: &Dictionary, mut payload: &[u8], descriptors: &[(u32, u32)], original_size: usize) -> Result<Vec<u8>> {
    let segments = bucket_segments(original_size);
    if segments.len() != descriptors.len() {
        return Err(CodecError::corrupt("MREG region count does not match recomputed segmentation"));
    }
    let mut out = Vec::with_capacity(original_size);
    for (&(bucket, run), &(state, region_len)) in segments.iter().zip(descriptors.iter()) {
        let region_len = region_len as usize;
        if payload.len() < region_len {
            return Err(CodecError::corrupt("truncated MREG region"));
        }
        let (region_bytes, rest) = payload.split_at(region_len);
        let decoded = decode_single_region(dict.unigram(bucket), region_bytes, state, run)?;
        out.extend_from_slice(&decoded);
        payload = rest;
    }
    Ok(out)
}

fn read_u32(data: &[u8], offset: &mut usize) -> Result<u32> {
    let bytes = data.get(*offset..*offset + 4).ok_or_else(|| CodecError::corrupt("truncated state field"))?;
    *offset += 4;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

fn read_u16(data: &[u8], offset: &mut usize) -> Result<u32> {
    let bytes = data.get(*offset..*offset + 2).ok_or_else(|| CodecError::corrupt("truncated state field"))?;
    *offset += 2;
    Ok(u16::from_le_bytes(bytes.try_into().unwrap()) as u32)
}

fn lzp_table_for(ctx: &Context) -> Option<&LzpTable> {
    ctx.adaptive().and_then(AdaptiveState::lzp_mirror).or_else(|| ctx.dict().and_then(Dictionary::lzp))
}

/// Decompress one packet from `src` into `dst`, returning the number of
/// original bytes written.
pub fn decompress(ctx: &mut Context, src: &[u8], dst: &mut [u8]) -> Result<usize> {
    let header = parse_header(ctx, src)?;
    let original_size = header.original_size;
    if dst.len() < original_size {
        return Err(CodecError::buf_small("destination too small for decompressed packet"));
    }
    if original_size > crate::compress::MAX_PACKET_SIZE {
        return Err(CodecError::too_big("header original_size exceeds 65535 bytes"));
    }
    check_model_id(ctx, &header)?;

    let family = header::algo_family(header.algorithm);
    let bucket = header::algo_bucket(header.algorithm);
    let compact = ctx.config().has(COMPACT_HDR);
    let mut offset = header.offset;
    let data = src;

    let working: Vec<u8> = match family {
        header::ALGO_FAMILY_PASSTHRU_BARE => {
            let payload = data.get(offset..).ok_or_else(|| CodecError::corrupt("truncated passthrough payload"))?;
            if payload.len() != original_size {
                return Err(CodecError::corrupt("passthrough payload length mismatch"));
            }
            payload.to_vec()
        }
        header::ALGO_FAMILY_PASSTHRU_RLE => {
            let payload = data.get(offset..).ok_or_else(|| CodecError::corrupt("truncated RLE payload"))?;
            rle::decode(payload, original_size)?
        }
        header::ALGO_FAMILY_PASSTHRU_LZ77 => {
            let payload = data.get(offset..).ok_or_else(|| CodecError::corrupt("truncated LZ77 payload"))?;
            lz77::decode(payload, original_size)?
        }
        header::ALGO_FAMILY_TANS_SR => {
            let dict = ctx.dict().ok_or_else(|| CodecError::invalid_arg("TANS_SR packet requires a dictionary"))?;
            let state = if compact { read_u16(data, &mut offset)? } else { read_u32(data, &mut offset)? };
            let payload = &data[offset..];
            decode_single_region(dict.unigram(bucket), payload, state, original_size)?
        }
        header::ALGO_FAMILY_TANS_PCTX => {
            let dict = ctx.dict().ok_or_else(|| CodecError::invalid_arg("TANS_PCTX packet requires a dictionary"))?;
            let state = if compact { read_u16(data, &mut offset)? } else { read_u32(data, &mut offset)? };
            let payload = &data[offset..];
            decode_pctx(dict, payload, state, original_size)?
        }
        header::ALGO_FAMILY_TANS_BIGRAM_PCTX => {
            let dict = ctx.dict().ok_or_else(|| CodecError::invalid_arg("TANS_BIGRAM_PCTX packet requires a dictionary"))?;
            let state = if compact { read_u16(data, &mut offset)? } else { read_u32(data, &mut offset)? };
            let payload = &data[offset..];
            decode_bigram_pctx(dict, payload, state, original_size)?
        }
        header::ALGO_FAMILY_TANS_10 => {
            let dict = ctx.dict().ok_or_else(|| CodecError::invalid_arg("TANS_10 packet requires a dictionary"))?;
            // The 10-bit variant's state always fits a u16, in both header forms.
            let state = read_u16(data, &mut offset)?;
            let payload = &data[offset..];
            decode_tans10(dict, payload, state, original_size)?
        }
        header::ALGO_FAMILY_TANS_MREG => {
            let dict = ctx.dict().ok_or_else(|| CodecError::invalid_arg("TANS_MREG packet requires a dictionary"))?;
            let n_regions = *data.get(offset).ok_or_else(|| CodecError::corrupt("truncated MREG region count"))? as usize;
            offset += 1;
            let mut descriptors = Vec::with_capacity(n_regions);
            for _ in 0..n_regions {
                let state = read_u32(data, &mut offset)?;
                let len = read_u32(data, &mut offset)?;
                descriptors.push((state, len));
            }
            let payload = &data[offset..];
            decode_mreg(dict, payload, &descriptors, original_size)?
        }
        header::ALGO_FAMILY_RESERVED_RANS => {
            return Err(CodecError::unsupported("rANS family is reserved, not implemented"));
        }
        other => {
            return Err(CodecError::corrupt(format!("unrecognized algorithm family {other}")));
        }
    };
    let mut working = working;

    if header.flags & FLAG_LZP != 0 {
        let table = lzp_table_for(ctx).ok_or_else(|| CodecError::invalid_arg("LZP flag set but no LZP table available"))?;
        table.unapply_inplace(&mut working);
    }

    if header.flags & FLAG_DELTA != 0 {
        let prev = ctx.prev().ok_or_else(|| CodecError::corrupt("DELTA flag set but context has no previous packet"))?.to_vec();
        if prev.len() != working.len() {
            return Err(CodecError::corrupt("DELTA residual length does not match previous packet"));
        }
        if header.flags & FLAG_ORDER2 != 0 {
            let prev2 = ctx
                .prev2()
                .ok_or_else(|| CodecError::corrupt("ORDER2 flag set but context has no second previous packet"))?
                .to_vec();
            if prev2.len() != working.len() {
                return Err(CodecError::corrupt("ORDER2 residual length does not match second previous packet"));
            }
            delta::decode_order2_inplace(&mut working, &prev, &prev2);
        } else {
            delta::decode_order1_inplace(&mut working, &prev);
        }
    }
    let restored = working;

    dst[..restored.len()].copy_from_slice(&restored);

    accumulate_adaptive(ctx, &restored);
    ctx.advance(&restored)?;
    ctx.record_output(family as usize, src.len());

    Ok(restored.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::{compress, compress_bound};
    use crate::config::{Config, BIGRAM, COMPACT_HDR, DELTA};
    use crate::dictionary::Dictionary;
    use std::sync::Arc;

    #[test]
    fn passthrough_round_trips() {
        let mut ctx_enc = Context::create(None, Config::default()).unwrap();
        let mut ctx_dec = Context::create(None, Config::default()).unwrap();
        let src = b"a payload with no dictionary at all, just enough bytes".to_vec();
        let mut wire = vec![0u8; compress_bound(src.len())];
        let n = compress(&mut ctx_enc, &src, &mut wire).unwrap();
        let mut out = vec![0u8; src.len()];
        let m = decompress(&mut ctx_dec, &wire[..n], &mut out).unwrap();
        assert_eq!(&out[..m], &src[..]);
    }

    #[test]
    fn bigram_pctx_round_trips_with_dictionary() {
        let corpus_pkt: Vec<u8> = (0..128u16).map(|i| (i % 17) as u8).collect();
        let dict = Arc::new(Dictionary::train(&[&corpus_pkt], 4, false).unwrap());
        let cfg = Config {
            flags: crate::config::STATEFUL | BIGRAM,
            ..Config::default()
        };
        let mut ctx_enc = Context::create(Some(dict.clone()), cfg).unwrap();
        let mut ctx_dec = Context::create(Some(dict), cfg).unwrap();
        let mut wire = vec![0u8; compress_bound(corpus_pkt.len())];
        let n = compress(&mut ctx_enc, &corpus_pkt, &mut wire).unwrap();
        let mut out = vec![0u8; corpus_pkt.len()];
        let m = decompress(&mut ctx_dec, &wire[..n], &mut out).unwrap();
        assert_eq!(&out[..m], &corpus_pkt[..]);
    }

    #[test]
    fn stateful_stream_stays_in_sync_across_several_packets() {
        let cfg = Config {
            flags: crate::config::STATEFUL | DELTA,
            ..Config::default()
        };
        let mut ctx_enc = Context::create(None, cfg).unwrap();
        let mut ctx_dec = Context::create(None, cfg).unwrap();

        let packets: Vec<Vec<u8>> = (0..5)
            .map(|k| (0..64u16).map(|i| (i as u8).wrapping_add(k)).collect())
            .collect();

        for pkt in &packets {
            let mut wire = vec![0u8; compress_bound(pkt.len())];
            let n = compress(&mut ctx_enc, pkt, &mut wire).unwrap();
            let mut out = vec![0u8; pkt.len()];
            let m = decompress(&mut ctx_dec, &wire[..n], &mut out).unwrap();
            assert_eq!(&out[..m], &pkt[..]);
        }
    }

    #[test]
    fn compact_header_round_trips_with_dictionary() {
        let corpus_pkt = vec![0x33u8; 40];
        let dict = Arc::new(Dictionary::train(&[&corpus_pkt], 6, false).unwrap());
        let cfg = Config {
            flags: crate::config::STATEFUL | COMPACT_HDR,
            ..Config::default()
        };
        let mut ctx_enc = Context::create(Some(dict.clone()), cfg).unwrap();
        let mut ctx_dec = Context::create(Some(dict), cfg).unwrap();
        let mut wire = vec![0u8; compress_bound(corpus_pkt.len())];
        let n = compress(&mut ctx_enc, &corpus_pkt, &mut wire).unwrap();
        let mut out = vec![0u8; corpus_pkt.len()];
        let m = decompress(&mut ctx_dec, &wire[..n], &mut out).unwrap();
        assert_eq!(&out[..m], &corpus_pkt[..]);
    }

    #[test]
    fn truncated_packet_is_rejected_not_panicking() {
        let mut ctx = Context::create(None, Config::default()).unwrap();
        let mut out = vec![0u8; 16];
        assert!(decompress(&mut ctx, &[1, 2, 3], &mut out).is_err());
    }

    #[test]
    fn mismatched_model_id_is_rejected_as_version_error() {
        let corpus_pkt = vec![0x5cu8; 64];
        let dict_a = Arc::new(Dictionary::train(&[&corpus_pkt], 11, false).unwrap());
        let dict_b = Arc::new(Dictionary::train(&[&corpus_pkt], 12, false).unwrap());

        let mut ctx_enc = Context::create(Some(dict_a), Config::default()).unwrap();
        let mut wire = vec![0u8; compress_bound(corpus_pkt.len())];
        let n = compress(&mut ctx_enc, &corpus_pkt, &mut wire).unwrap();

        let mut ctx_dec = Context::create(Some(dict_b), Config::default()).unwrap();
        let mut out = vec![0u8; corpus_pkt.len()];
        let err = decompress(&mut ctx_dec, &wire[..n], &mut out).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Version);
    }
}
