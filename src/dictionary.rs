//! Dictionary training, serialization and loading.
//!
//! A dictionary is an immutable, shared-read-only bundle of per-bucket
//! unigram and bigram frequency tables (already built into runtime-ready
//! [`TansTable`]s), an optional LZP table, and the bigram class map used to
//! pick which bigram table a given previous byte routes to.

use crate::bucket::{bucket_segments, default_class_map, NUM_BIGRAM_CLASSES_CURRENT, NUM_BIGRAM_CLASSES_LEGACY, NUM_BUCKETS};
use crate::crc32::crc32;
use crate::error::{CodecError, Result};
use crate::lzp::LzpTable;
use crate::simd;
use crate::tans::{normalize_frequencies, rescale_to_10bit, TansTable, TABLE_LOG_10, TABLE_LOG_12, TABLE_SIZE_12};

const MAGIC: &[u8; 4] = b"NETC";
const CURRENT_VERSION: u8 = 5;
const LEGACY_VERSION: u8 = 4;

const DICT_FLAG_HAS_LZP: u8 = 0x01;

fn flat_table(log: u32) -> Result<TansTable> {
    let size = 1usize << log;
    let per_symbol = (size / 256).max(1) as u16;
    let mut freq = [per_symbol; 256];
    let mut sum = per_symbol as u32 * 256;
    let mut i = 0;
    while sum < size as u32 {
        freq[i] += 1;
        sum += 1;
        i += 1;
    }
    TansTable::build(&freq, log)
}

/// A trained, runtime-ready dictionary.
pub struct Dictionary {
    model_id: u8,
    num_bigram_classes: usize,
    class_map: [u8; 256],
    unigram_tables: Vec<TansTable>,
    unigram_tables_10: Vec<TansTable>,
    bigram_tables: Vec<Vec<TansTable>>,
    lzp: Option<LzpTable>,
}

impl Dictionary {
    pub fn model_id(&self) -> u8 {
        self.model_id
    }

    pub fn num_bigram_classes(&self) -> usize {
        self.num_bigram_classes
    }

    pub fn class_of_prev(&self, prev_byte: u8) -> usize {
        self.class_map[prev_byte as usize] as usize
    }

    pub fn unigram(&self, bucket: usize) -> &TansTable {
        &self.unigram_tables[bucket]
    }

    pub fn unigram_10bit(&self, bucket: usize) -> &TansTable {
        &self.unigram_tables_10[bucket]
    }

    pub fn bigram(&self, bucket: usize, class: usize) -> &TansTable {
        &self.bigram_tables[bucket][class]
    }

    pub fn lzp(&self) -> Option<&LzpTable> {
        self.lzp.as_ref()
    }

    /// Train a dictionary from a corpus of packets.
    pub fn train(packets: &[&[u8]], model_id: u8, train_lzp: bool) -> Result<Dictionary> {
        if model_id == 0 || model_id == 255 {
            return Err(CodecError::invalid_arg("model_id must be in [1, 254]"));
        }
        if packets.is_empty() {
            return Err(CodecError::invalid_arg("training corpus is empty"));
        }

        let class_map = build_bigram_class_map(packets, NUM_BIGRAM_CLASSES_CURRENT);

        let mut unigram_counts = vec![[0u64; 256]; NUM_BUCKETS];
        let mut bigram_counts = vec![vec![[0u64; 256]; NUM_BIGRAM_CLASSES_CURRENT]; NUM_BUCKETS];
        for pkt in packets {
            // Unigram counts are a pure per-offset histogram, so each
            // same-bucket run can be folded with one `freq_count` call
            // instead of a manual per-byte loop.
            let mut start = 0usize;
            for (bucket, run) in bucket_segments(pkt.len()) {
                let segment_counts = simd::freq_count(&pkt[start..start + run]);
                for (total, count) in unigram_counts[bucket].iter_mut().zip(segment_counts.iter()) {
                    *total += count;
                }
                start += run;
            }

            // Bigram counts key off the previous byte's class, which crosses
            // bucket boundaries, so this stays a direct per-byte walk.
            let mut prev = 0u8;
            for (i, &b) in pkt.iter().enumerate() {
                let bucket = crate::bucket::bucket_of(i);
                let class = class_map[prev as usize] as usize;
                bigram_counts[bucket][class][b as usize] += 1;
                prev = b;
            }
        }

        let mut unigram_tables = Vec::with_capacity(NUM_BUCKETS);
        let mut unigram_tables_10 = Vec::with_capacity(NUM_BUCKETS);
        for counts in &unigram_counts {
            let table = build_table_or_flat(counts, TABLE_LOG_12)?;
            let freq10 = rescale_to_10bit(table.freq())?;
            unigram_tables_10.push(TansTable::build(&freq10, TABLE_LOG_10)?);
            unigram_tables.push(table);
        }

        let mut bigram_tables = Vec::with_capacity(NUM_BUCKETS);
        for bucket_counts in &bigram_counts {
            let mut per_class = Vec::with_capacity(NUM_BIGRAM_CLASSES_CURRENT);
            for counts in bucket_counts {
                per_class.push(build_table_or_flat(counts, TABLE_LOG_12)?);
            }
            bigram_tables.push(per_class);
        }

        let lzp = if train_lzp {
            Some(LzpTable::train(packets))
        } else {
            None
        };

        Ok(Dictionary {
            model_id,
            num_bigram_classes: NUM_BIGRAM_CLASSES_CURRENT,
            class_map,
            unigram_tables,
            unigram_tables_10,
            bigram_tables,
            lzp,
        })
    }

    /// Serialize into the current (version 5) wire format.
    pub fn save(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.push(CURRENT_VERSION);
        out.push(self.model_id);
        out.push(NUM_BUCKETS as u8);
        let flags = if self.lzp.is_some() { DICT_FLAG_HAS_LZP } else { 0 };
        out.push(flags);
        out.extend_from_slice(&self.class_map);
        for table in &self.unigram_tables {
            for &f in table.freq() {
                out.extend_from_slice(&f.to_le_bytes());
            }
        }
        for bucket in &self.bigram_tables {
            for class_table in bucket {
                for &f in class_table.freq() {
                    out.extend_from_slice(&f.to_le_bytes());
                }
            }
        }
        if let Some(lzp) = &self.lzp {
            lzp.write_to(&mut out);
        }
        let crc = crc32(&out);
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }

    /// Load and validate a dictionary blob, recognizing both the current
    /// (version 5) and legacy (version 4) layouts.
    pub fn load(data: &[u8]) -> Result<Dictionary> {
        if data.len() < 4 + 1 + 1 + 1 + 1 + 4 {
            return Err(CodecError::dict_invalid("blob too short for a header"));
        }
        if &data[0..4] != MAGIC {
            return Err(CodecError::dict_invalid("bad magic"));
        }
        let version = data[4];
        if version != CURRENT_VERSION && version != LEGACY_VERSION {
            return Err(CodecError::version(format!("unrecognized dictionary version {version}")));
        }

        let (crc_stored, body) = {
            let crc_off = data.len() - 4;
            let stored = u32::from_le_bytes([data[crc_off], data[crc_off + 1], data[crc_off + 2], data[crc_off + 3]]);
            (stored, &data[..crc_off])
        };
        if crc32(body) != crc_stored {
            return Err(CodecError::dict_invalid("CRC32 mismatch"));
        }

        let model_id = data[5];
        let ctx_count = data[6] as usize;
        let flags = data[7];
        if ctx_count != NUM_BUCKETS {
            return Err(CodecError::dict_invalid("unexpected bucket count"));
        }

        let num_classes = if version == CURRENT_VERSION {
            NUM_BIGRAM_CLASSES_CURRENT
        } else {
            NUM_BIGRAM_CLASSES_LEGACY
        };

        let mut offset = 8;
        let class_map: [u8; 256] = if version == CURRENT_VERSION {
            let map = body
                .get(offset..offset + 256)
                .ok_or_else(|| CodecError::dict_invalid("truncated class map"))?;
            offset += 256;
            map.try_into().unwrap()
        } else {
            default_class_map(NUM_BIGRAM_CLASSES_LEGACY)
        };

        let mut unigram_tables = Vec::with_capacity(NUM_BUCKETS);
        let mut unigram_tables_10 = Vec::with_capacity(NUM_BUCKETS);
        for _ in 0..NUM_BUCKETS {
            let freq = read_freq_vec(body, &mut offset)?;
            let table = TansTable::build(&freq, TABLE_LOG_12)?;
            let freq10 = rescale_to_10bit(table.freq())?;
            unigram_tables_10.push(TansTable::build(&freq10, TABLE_LOG_10)?);
            unigram_tables.push(table);
        }

        let mut bigram_tables = Vec::with_capacity(NUM_BUCKETS);
        for _ in 0..NUM_BUCKETS {
            let mut per_class = Vec::with_capacity(num_classes);
            for _ in 0..num_classes {
                let freq = read_freq_vec(body, &mut offset)?;
                per_class.push(TansTable::build(&freq, TABLE_LOG_12)?);
            }
            bigram_tables.push(per_class);
        }

        let lzp = if flags & DICT_FLAG_HAS_LZP != 0 {
            Some(LzpTable::read_from(&body[offset..])?)
        } else {
            None
        };

        Ok(Dictionary {
            model_id,
            num_bigram_classes: num_classes,
            class_map,
            unigram_tables,
            unigram_tables_10,
            bigram_tables,
            lzp,
        })
    }
}

fn read_freq_vec(body: &[u8], offset: &mut usize) -> Result<[u16; 256]> {
    let bytes = body
        .get(*offset..*offset + 512)
        .ok_or_else(|| CodecError::dict_invalid("truncated frequency table"))?;
    *offset += 512;
    let mut freq = [0u16; 256];
    for (s, slot) in freq.iter_mut().enumerate() {
        *slot = u16::from_le_bytes([bytes[s * 2], bytes[s * 2 + 1]]);
    }
    let sum: u32 = freq.iter().map(|&f| f as u32).sum();
    if sum != TABLE_SIZE_12 as u32 {
        return Err(CodecError::dict_invalid(format!(
            "frequency table sums to {sum}, expected {TABLE_SIZE_12}"
        )));
    }
    Ok(freq)
}

fn build_table_or_flat(counts: &[u64; 256], log: u32) -> Result<TansTable> {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return flat_table(log);
    }
    let freq = normalize_frequencies(counts, 1usize << log)?;
    TansTable::build(&freq, log)
}

fn build_bigram_class_map(packets: &[&[u8]], num_classes: usize) -> [u8; 256] {
    let mut next_hist = vec![[0u64; 256]; 256];
    for pkt in packets {
        let mut prev = 0u8;
        for &b in pkt.iter() {
            next_hist[prev as usize][b as usize] += 1;
            prev = b;
        }
    }

    let dominant_successor = |prev: usize| -> u8 {
        next_hist[prev]
            .iter()
            .enumerate()
            .max_by_key(|&(_, &c)| c)
            .map(|(s, _)| s as u8)
            .unwrap_or(0)
    };

    let mut order: Vec<usize> = (0..256).collect();
    order.sort_by_key(|&p| dominant_successor(p));

    let mut map = [0u8; 256];
    let group_size = 256 / num_classes;
    for (rank, &prev) in order.iter().enumerate() {
        let class = (rank / group_size).min(num_classes - 1);
        map[prev] = class as u8;
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn train_and_save_load_round_trips() {
        let pkt = vec![0x41u8; 256];
        let dict = Dictionary::train(&[&pkt], 1, false).unwrap();
        let blob = dict.save();
        let loaded = Dictionary::load(&blob).unwrap();
        assert_eq!(loaded.model_id(), 1);
        assert_eq!(loaded.unigram(0).freq(), dict.unigram(0).freq());
    }

    #[test]
    fn rejects_bad_model_id() {
        let pkt = vec![1u8; 32];
        assert!(Dictionary::train(&[&pkt], 0, false).is_err());
        assert!(Dictionary::train(&[&pkt], 255, false).is_err());
    }

    #[test]
    fn tampered_blob_fails_crc() {
        let pkt: Vec<u8> = (0..=255u16).map(|b| b as u8).collect();
        let dict = Dictionary::train(&[&pkt], 9, true).unwrap();
        let mut blob = dict.save();
        let mid = blob.len() / 2;
        blob[mid] ^= 0x01;
        let err = Dictionary::load(&blob).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DictInvalid);
    }

    #[test]
    fn unrecognized_version_is_rejected() {
        let pkt = vec![5u8; 16];
        let dict = Dictionary::train(&[&pkt], 3, false).unwrap();
        let mut blob = dict.save();
        blob[4] = 3;
        let crc_off = blob.len() - 4;
        let crc = crc32(&blob[..crc_off]);
        blob[crc_off..].copy_from_slice(&crc.to_le_bytes());
        let err = Dictionary::load(&blob).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Version);
    }
}
