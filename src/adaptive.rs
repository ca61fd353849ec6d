//! Per-context adaptive table state.
//!
//! Mirrors the dictionary's unigram/bigram/LZP tables, but accumulates
//! frequencies from live traffic instead of an offline corpus. Every 128
//! packets the accumulators are normalized into fresh tANS tables and reset;
//! a bucket that saw no traffic in a window keeps its previous table rather
//! than collapsing to nothing. Encoder and decoder must call the same
//! sequence of `observe_*`/`end_packet` so their mirrors never diverge.

use crate::bucket::NUM_BUCKETS;
use crate::dictionary::Dictionary;
use crate::error::Result;
use crate::lzp::LzpTable;
use crate::tans::{normalize_frequencies, TansTable, TABLE_LOG_12};

pub const REBUILD_PERIOD: u32 = 128;

pub struct AdaptiveState {
    unigram_tables: Vec<TansTable>,
    bigram_tables: Vec<Vec<TansTable>>,
    unigram_accum: Vec<[u64; 256]>,
    bigram_accum: Vec<Vec<[u64; 256]>>,
    lzp_mirror: Option<LzpTable>,
    packets_since_rebuild: u32,
}

impl AdaptiveState {
    pub fn new(dict: &Dictionary) -> Self {
        let num_classes = dict.num_bigram_classes();
        let unigram_tables = (0..NUM_BUCKETS).map(|b| dict.unigram(b).clone()).collect();
        let bigram_tables = (0..NUM_BUCKETS)
            .map(|b| (0..num_classes).map(|c| dict.bigram(b, c).clone()).collect())
            .collect();
        AdaptiveState {
            unigram_tables,
            bigram_tables,
            unigram_accum: vec![[0u64; 256]; NUM_BUCKETS],
            bigram_accum: vec![vec![[0u64; 256]; num_classes]; NUM_BUCKETS],
            lzp_mirror: dict.lzp().cloned(),
            packets_since_rebuild: 0,
        }
    }

    pub fn unigram(&self, bucket: usize) -> &TansTable {
        &self.unigram_tables[bucket]
    }

    pub fn bigram(&self, bucket: usize, class: usize) -> &TansTable {
        &self.bigram_tables[bucket][class]
    }

    pub fn lzp_mirror(&self) -> Option<&LzpTable> {
        self.lzp_mirror.as_ref()
    }

    pub fn lzp_mirror_mut(&mut self) -> Option<&mut LzpTable> {
        self.lzp_mirror.as_mut()
    }

    pub fn observe_unigram(&mut self, bucket: usize, byte: u8) {
        self.unigram_accum[bucket][byte as usize] += 1;
    }

    /// Fold a whole segment's histogram (from [`crate::simd::freq_count`])
    /// into one bucket's accumulator at once.
    pub fn add_unigram_counts(&mut self, bucket: usize, counts: &[u64; 256]) {
        for (total, count) in self.unigram_accum[bucket].iter_mut().zip(counts.iter()) {
            *total += count;
        }
    }

    pub fn observe_bigram(&mut self, bucket: usize, class: usize, byte: u8) {
        self.bigram_accum[bucket][class][byte as usize] += 1;
    }

    /// Call once per compressed/decompressed packet; triggers a rebuild
    /// every [`REBUILD_PERIOD`] packets.
    pub fn end_packet(&mut self) -> Result<()> {
        self.packets_since_rebuild += 1;
        if self.packets_since_rebuild >= REBUILD_PERIOD {
            self.rebuild()?;
            self.packets_since_rebuild = 0;
        }
        Ok(())
    }

    fn rebuild(&mut self) -> Result<()> {
        for (bucket, accum) in self.unigram_accum.iter_mut().enumerate() {
            let total: u64 = accum.iter().sum();
            if total > 0 {
                let freq = normalize_frequencies(accum, 1usize << TABLE_LOG_12)?;
                self.unigram_tables[bucket] = TansTable::build(&freq, TABLE_LOG_12)?;
            }
            *accum = [0u64; 256];
        }
        for (bucket, classes) in self.bigram_accum.iter_mut().enumerate() {
            for (class, accum) in classes.iter_mut().enumerate() {
                let total: u64 = accum.iter().sum();
                if total > 0 {
                    let freq = normalize_frequencies(accum, 1usize << TABLE_LOG_12)?;
                    self.bigram_tables[bucket][class] = TansTable::build(&freq, TABLE_LOG_12)?;
                }
                *accum = [0u64; 256];
            }
        }
        Ok(())
    }

    pub fn reset(&mut self, dict: &Dictionary) {
        *self = AdaptiveState::new(dict);
    }
}
