//! Context configuration: mode flags plus the few numeric knobs that shape
//! buffer sizing and trial selection.

use crate::error::{CodecError, Result};

pub const STATEFUL: u16 = 1 << 0;
pub const STATELESS: u16 = 1 << 1;
pub const DELTA: u16 = 1 << 2;
pub const BIGRAM: u16 = 1 << 3;
pub const ADAPTIVE: u16 = 1 << 4;
pub const COMPACT_HDR: u16 = 1 << 5;
pub const FAST_COMPRESS: u16 = 1 << 6;
pub const STATS: u16 = 1 << 7;

const DEFAULT_RING_BUFFER_SIZE: usize = 64 * 1024;
const DEFAULT_COMPRESSION_LEVEL: u8 = 5;

/// SIMD kernel level; all levels MUST produce bit-identical output (see
/// the `simd` module). `Auto` resolves to whatever the process detected at
/// first use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimdLevel {
    Auto,
    Generic,
    Sse42,
    Avx2,
    Neon,
}

#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub flags: u16,
    pub ring_buffer_size: usize,
    pub compression_level: u8,
    pub simd_level: SimdLevel,
    pub arena_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            flags: STATEFUL,
            ring_buffer_size: DEFAULT_RING_BUFFER_SIZE,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            simd_level: SimdLevel::Auto,
            arena_size: 0,
        }
    }
}

impl Config {
    #[inline]
    pub fn has(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }

    pub fn validate(&self) -> Result<()> {
        let stateful = self.has(STATEFUL);
        let stateless = self.has(STATELESS);
        if stateful && stateless {
            return Err(CodecError::invalid_arg("STATEFUL and STATELESS are mutually exclusive"));
        }
        if !stateful && !stateless {
            return Err(CodecError::invalid_arg("exactly one of STATEFUL or STATELESS must be set"));
        }
        if stateless && (self.has(DELTA) || self.has(ADAPTIVE)) {
            return Err(CodecError::invalid_arg("STATELESS forbids DELTA and ADAPTIVE"));
        }
        if self.has(ADAPTIVE) && !stateful {
            return Err(CodecError::invalid_arg("ADAPTIVE requires STATEFUL"));
        }
        Ok(())
    }

    pub fn arena_size_or_default(&self, max_packet: usize) -> usize {
        if self.arena_size > 0 {
            self.arena_size
        } else {
            2 * max_packet
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn stateful_and_stateless_conflict() {
        let cfg = Config {
            flags: STATEFUL | STATELESS,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn stateless_forbids_delta() {
        let cfg = Config {
            flags: STATELESS | DELTA,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn adaptive_requires_stateful() {
        let cfg = Config {
            flags: STATELESS | ADAPTIVE,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }
}
