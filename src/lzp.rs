//! LZP (Lempel-Ziv-Prediction) XOR pre-filter.
//!
//! Each position is hashed together with the byte immediately preceding it
//! to index a table of single-byte predictions. Where the prediction is
//! right the XOR output is zero, which then compresses extremely well under
//! tANS; where it's wrong the filter costs nothing beyond the XOR itself.

use crate::error::Result;

pub const TABLE_SIZE: usize = 131_072; // 2^17

const MAJORITY_CONFIDENCE: f64 = 0.40;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Entry {
    predicted: u8,
    valid: bool,
}

/// A trained (or adaptively accumulated) prediction table.
#[derive(Clone, Debug)]
pub struct LzpTable {
    entries: Vec<Entry>,
}

#[inline]
fn hash_index(prev_byte: u8, offset: u32) -> usize {
    let mut h = (prev_byte as u32).wrapping_mul(2_654_435_761);
    h ^= offset.wrapping_mul(0x9E37_79B1);
    h ^= h >> 15;
    (h as usize) & (TABLE_SIZE - 1)
}

impl LzpTable {
    pub fn empty() -> Self {
        LzpTable {
            entries: vec![Entry::default(); TABLE_SIZE],
        }
    }

    /// Train from a corpus of packets via Boyer-Moore majority voting per
    /// bucket, keeping a prediction only when it explains at least 40% of
    /// the observations routed to its bucket.
    pub fn train(corpus: &[&[u8]]) -> LzpTable {
        let mut candidate = vec![0u8; TABLE_SIZE];
        let mut bm_count = vec![0i32; TABLE_SIZE];
        for pkt in corpus {
            let mut prev = 0u8;
            for (i, &b) in pkt.iter().enumerate() {
                let idx = hash_index(prev, i as u32);
                if bm_count[idx] == 0 {
                    candidate[idx] = b;
                    bm_count[idx] = 1;
                } else if candidate[idx] == b {
                    bm_count[idx] += 1;
                } else {
                    bm_count[idx] -= 1;
                }
                prev = b;
            }
        }

        let mut matches = vec![0u32; TABLE_SIZE];
        let mut totals = vec![0u32; TABLE_SIZE];
        for pkt in corpus {
            let mut prev = 0u8;
            for (i, &b) in pkt.iter().enumerate() {
                let idx = hash_index(prev, i as u32);
                totals[idx] += 1;
                if candidate[idx] == b {
                    matches[idx] += 1;
                }
                prev = b;
            }
        }

        let mut entries = vec![Entry::default(); TABLE_SIZE];
        for idx in 0..TABLE_SIZE {
            if totals[idx] > 0 && matches[idx] as f64 / totals[idx] as f64 >= MAJORITY_CONFIDENCE {
                entries[idx] = Entry {
                    predicted: candidate[idx],
                    valid: true,
                };
            }
        }
        LzpTable { entries }
    }

    #[inline]
    fn predict(&self, prev_byte: u8, offset: u32) -> u8 {
        let entry = &self.entries[hash_index(prev_byte, offset)];
        if entry.valid {
            entry.predicted
        } else {
            0
        }
    }

    /// Adaptively fold one more observation into the table: a correct
    /// guess is reinforced by adoption, a wrong one is overwritten.
    pub fn observe(&mut self, prev_byte: u8, offset: u32, actual: u8) {
        let idx = hash_index(prev_byte, offset);
        let entry = &mut self.entries[idx];
        entry.predicted = actual;
        entry.valid = true;
    }

    /// XOR `src` against this table's predictions, writing into `out`
    /// (same length as `src`). Used identically for forward (compress) and
    /// inverse (decompress) application since XOR is self-inverse and both
    /// sides see the same true byte sequence at each position.
    pub fn apply(&self, src: &[u8], out: &mut [u8]) {
        debug_assert_eq!(src.len(), out.len());
        let mut prev = 0u8;
        for (i, (&b, slot)) in src.iter().zip(out.iter_mut()).enumerate() {
            let pred = self.predict(prev, i as u32);
            *slot = b ^ pred;
            prev = b;
        }
    }

    /// Inverse application: like `apply`, but the true previous byte is the
    /// already-recovered output, not the (still XORed) input.
    pub fn unapply(&self, src: &[u8], out: &mut [u8]) {
        debug_assert_eq!(src.len(), out.len());
        let mut prev = 0u8;
        for (i, (&b, slot)) in src.iter().zip(out.iter_mut()).enumerate() {
            let pred = self.predict(prev, i as u32);
            let actual = b ^ pred;
            *slot = actual;
            prev = actual;
        }
    }

    /// In-place form of [`LzpTable::apply`]: `buf` holds the true bytes on
    /// entry and the filtered bytes on return. Safe in place because
    /// position `i`'s output depends on `prev` (the prior position's
    /// already-consumed true byte) and is written only after that byte has
    /// been read.
    pub fn apply_inplace(&self, buf: &mut [u8]) {
        let mut prev = 0u8;
        for (i, slot) in buf.iter_mut().enumerate() {
            let pred = self.predict(prev, i as u32);
            let b = *slot;
            *slot = b ^ pred;
            prev = b;
        }
    }

    /// In-place form of [`LzpTable::unapply`].
    pub fn unapply_inplace(&self, buf: &mut [u8]) {
        let mut prev = 0u8;
        for (i, slot) in buf.iter_mut().enumerate() {
            let pred = self.predict(prev, i as u32);
            let actual = *slot ^ pred;
            *slot = actual;
            prev = actual;
        }
    }

    pub fn serialized_len() -> usize {
        TABLE_SIZE + TABLE_SIZE.div_ceil(8)
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        for e in &self.entries {
            out.push(e.predicted);
        }
        let mut bitmap = vec![0u8; TABLE_SIZE.div_ceil(8)];
        for (i, e) in self.entries.iter().enumerate() {
            if e.valid {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        out.extend_from_slice(&bitmap);
    }

    pub fn read_from(data: &[u8]) -> Result<LzpTable> {
        let bitmap_len = TABLE_SIZE.div_ceil(8);
        if data.len() < TABLE_SIZE + bitmap_len {
            return Err(crate::error::CodecError::dict_invalid("truncated LZP section"));
        }
        let predicted = &data[..TABLE_SIZE];
        let bitmap = &data[TABLE_SIZE..TABLE_SIZE + bitmap_len];
        let mut entries = vec![Entry::default(); TABLE_SIZE];
        for (i, entry) in entries.iter_mut().enumerate() {
            let valid = bitmap[i / 8] & (1 << (i % 8)) != 0;
            entry.predicted = predicted[i];
            entry.valid = valid;
        }
        Ok(LzpTable { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untrained_table_is_identity() {
        let table = LzpTable::empty();
        let src = b"hello world".to_vec();
        let mut out = vec![0u8; src.len()];
        table.apply(&src, &mut out);
        assert_eq!(out, src);
    }

    #[test]
    fn trained_table_round_trips() {
        let corpus_pkt = vec![0x41u8; 64];
        let table = LzpTable::train(&[&corpus_pkt]);
        let src = vec![0x41u8; 64];
        let mut filtered = vec![0u8; src.len()];
        table.apply(&src, &mut filtered);
        let mut restored = vec![0u8; src.len()];
        table.unapply(&filtered, &mut restored);
        assert_eq!(restored, src);
    }

    #[test]
    fn inplace_variants_match_the_buffer_to_buffer_ones() {
        let corpus_pkt = vec![0x41u8; 64];
        let table = LzpTable::train(&[&corpus_pkt]);
        let src: Vec<u8> = (0..64u16).map(|i| i as u8).collect();

        let mut filtered = vec![0u8; src.len()];
        table.apply(&src, &mut filtered);
        let mut buf = src.clone();
        table.apply_inplace(&mut buf);
        assert_eq!(buf, filtered);

        let mut restored = vec![0u8; filtered.len()];
        table.unapply(&filtered, &mut restored);
        table.unapply_inplace(&mut buf);
        assert_eq!(buf, restored);
        assert_eq!(buf, src);
    }

    #[test]
    fn serialize_round_trips() {
        let corpus_pkt: Vec<u8> = (0..=255u16).map(|b| b as u8).collect();
        let table = LzpTable::train(&[&corpus_pkt]);
        let mut buf = Vec::new();
        table.write_to(&mut buf);
        assert_eq!(buf.len(), LzpTable::serialized_len());
        let loaded = LzpTable::read_from(&buf).unwrap();
        let src = vec![7u8; 32];
        let mut a = vec![0u8; 32];
        let mut b = vec![0u8; 32];
        table.apply(&src, &mut a);
        loaded.apply(&src, &mut b);
        assert_eq!(a, b);
    }
}
