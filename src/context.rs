//! Context lifecycle: the mutable, single-threaded working state that
//! persists across a stream of compress/decompress calls.

use std::sync::Arc;

use crate::adaptive::AdaptiveState;
use crate::config::{Config, SimdLevel, ADAPTIVE, STATEFUL, STATS};
use crate::dictionary::Dictionary;
use crate::error::{CodecError, Result};
use crate::simd;

/// Per-algorithm-family occurrence counters, collected only when the STATS
/// flag is set.
#[derive(Clone, Copy, Debug, Default)]
pub struct Stats {
    pub packets_in: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub algo_counts: [u64; 9],
}

/// The mutable state of one compression stream. Not `Sync`; one Context
/// per worker thread, each compressing/decompressing its own ordered
/// packet sequence.
pub struct Context {
    dict: Option<Arc<Dictionary>>,
    config: Config,
    prev_pkt: Vec<u8>,
    prev2_pkt: Vec<u8>,
    has_prev: bool,
    has_prev2: bool,
    ring: Vec<u8>,
    ring_pos: usize,
    seq: u8,
    adaptive: Option<AdaptiveState>,
    stats: Option<Stats>,
    pub(crate) scratch: Vec<u8>,
}

impl Context {
    pub fn create(dict: Option<Arc<Dictionary>>, config: Config) -> Result<Context> {
        config.validate()?;
        if config.has(ADAPTIVE) && dict.is_none() {
            return Err(CodecError::invalid_arg("ADAPTIVE requires a dictionary"));
        }

        let stateful = config.has(STATEFUL);
        let ring = if stateful { vec![0u8; config.ring_buffer_size] } else { Vec::new() };
        let adaptive = if config.has(ADAPTIVE) {
            dict.as_ref().map(|d| AdaptiveState::new(d))
        } else {
            None
        };
        let stats = if config.has(STATS) { Some(Stats::default()) } else { None };
        let arena_size = config.arena_size_or_default(65535);

        Ok(Context {
            dict,
            config,
            prev_pkt: Vec::new(),
            prev2_pkt: Vec::new(),
            has_prev: false,
            has_prev2: false,
            ring,
            ring_pos: 0,
            seq: 0,
            adaptive,
            stats,
            scratch: vec![0u8; arena_size],
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dict(&self) -> Option<&Dictionary> {
        self.dict.as_deref()
    }

    pub fn seq(&self) -> u8 {
        self.seq
    }

    /// The SIMD kernel level this context's codec calls resolve to: the
    /// configured level, or the process-wide detected one when `Auto`.
    pub fn simd_level(&self) -> SimdLevel {
        match self.config.simd_level {
            SimdLevel::Auto => simd::detect_level(),
            level => level,
        }
    }

    pub fn prev(&self) -> Option<&[u8]> {
        self.has_prev.then_some(self.prev_pkt.as_slice())
    }

    pub fn prev2(&self) -> Option<&[u8]> {
        self.has_prev2.then_some(self.prev2_pkt.as_slice())
    }

    pub fn adaptive(&self) -> Option<&AdaptiveState> {
        self.adaptive.as_ref()
    }

    pub fn adaptive_mut(&mut self) -> Option<&mut AdaptiveState> {
        self.adaptive.as_mut()
    }

    /// Split borrow: the dictionary and the adaptive mirror live in
    /// disjoint fields, so both can be held at once without recomputing
    /// per-byte class lookups through a single accessor.
    pub fn dict_and_adaptive_mut(&mut self) -> (Option<&Dictionary>, Option<&mut AdaptiveState>) {
        (self.dict.as_deref(), self.adaptive.as_mut())
    }

    pub fn stats(&self) -> Result<&Stats> {
        self.stats.as_ref().ok_or_else(|| CodecError::unsupported("STATS flag is not set on this context"))
    }

    fn write_ring(&mut self, data: &[u8]) {
        if self.ring.is_empty() {
            return;
        }
        let cap = self.ring.len();
        for &b in data {
            self.ring[self.ring_pos] = b;
            self.ring_pos = (self.ring_pos + 1) % cap;
        }
    }

    /// Record the result of one successful compress or decompress call:
    /// rotate packet history, advance the sequence counter, feed the ring
    /// buffer, and roll the adaptive accumulators if enabled.
    pub fn advance(&mut self, original: &[u8]) -> Result<()> {
        if self.config.has(STATEFUL) {
            std::mem::swap(&mut self.prev2_pkt, &mut self.prev_pkt);
            self.has_prev2 = self.has_prev;
            self.prev_pkt.clear();
            self.prev_pkt.extend_from_slice(original);
            self.has_prev = true;
            self.write_ring(original);
        }
        self.seq = self.seq.wrapping_add(1);
        if let Some(adaptive) = self.adaptive.as_mut() {
            adaptive.end_packet()?;
        }
        if let Some(stats) = self.stats.as_mut() {
            stats.packets_in += 1;
            stats.bytes_in += original.len() as u64;
        }
        Ok(())
    }

    pub fn record_output(&mut self, algo_family: usize, out_len: usize) {
        if let Some(stats) = self.stats.as_mut() {
            stats.bytes_out += out_len as u64;
            if algo_family < stats.algo_counts.len() {
                stats.algo_counts[algo_family] += 1;
            }
        }
    }

    /// Clear history and sequence counter; re-seed adaptive tables from the
    /// dictionary. The dictionary itself is untouched.
    pub fn reset(&mut self) {
        self.has_prev = false;
        self.has_prev2 = false;
        self.prev_pkt.clear();
        self.prev2_pkt.clear();
        self.seq = 0;
        self.ring_pos = 0;
        for b in self.ring.iter_mut() {
            *b = 0;
        }
        if let (Some(adaptive), Some(dict)) = (self.adaptive.as_mut(), self.dict.as_ref()) {
            adaptive.reset(dict);
        }
        if let Some(stats) = self.stats.as_mut() {
            *stats = Stats::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::STATELESS;

    #[test]
    fn create_requires_valid_config() {
        let cfg = Config {
            flags: STATEFUL | STATELESS,
            ..Config::default()
        };
        assert!(Context::create(None, cfg).is_err());
    }

    #[test]
    fn advance_rotates_history_and_wraps_seq() {
        let cfg = Config::default();
        let mut ctx = Context::create(None, cfg).unwrap();
        let p0 = vec![1u8; 8];
        let p1 = vec![2u8; 8];
        ctx.advance(&p0).unwrap();
        assert_eq!(ctx.prev(), Some(p0.as_slice()));
        assert_eq!(ctx.prev2(), None);
        ctx.advance(&p1).unwrap();
        assert_eq!(ctx.prev(), Some(p1.as_slice()));
        assert_eq!(ctx.prev2(), Some(p0.as_slice()));

        for _ in 0..254 {
            ctx.advance(&p1).unwrap();
        }
        assert_eq!(ctx.seq(), 0);
    }

    #[test]
    fn reset_clears_history() {
        let cfg = Config::default();
        let mut ctx = Context::create(None, cfg).unwrap();
        ctx.advance(&[1, 2, 3]).unwrap();
        ctx.reset();
        assert!(ctx.prev().is_none());
        assert_eq!(ctx.seq(), 0);
    }

    #[test]
    fn simd_level_resolves_auto_to_a_concrete_level() {
        let cfg = Config::default();
        let ctx = Context::create(None, cfg).unwrap();
        assert_eq!(ctx.config().simd_level, crate::config::SimdLevel::Auto);
        assert_ne!(ctx.simd_level(), crate::config::SimdLevel::Auto);
    }

    #[test]
    fn simd_level_honors_explicit_config() {
        let cfg = Config {
            simd_level: crate::config::SimdLevel::Generic,
            ..Config::default()
        };
        let ctx = Context::create(None, cfg).unwrap();
        assert_eq!(ctx.simd_level(), crate::config::SimdLevel::Generic);
    }

    #[test]
    fn stateless_context_ignores_history() {
        let cfg = Config {
            flags: STATELESS,
            ..Config::default()
        };
        let mut ctx = Context::create(None, cfg).unwrap();
        ctx.advance(&[9u8; 4]).unwrap();
        assert!(ctx.prev().is_none());
    }
}
