//! Stateless convenience wrappers (§6: `compress_stateless` /
//! `decompress_stateless`).
//!
//! Each call builds a throwaway STATELESS `Context` around the caller's
//! dictionary so one-shot callers never have to manage context lifetime.
//! Because a fresh `Context` never has a previous packet, these can never
//! observe or emit the DELTA flag: `compress_stateless` simply never takes
//! the delta branch (its `Config` forbids DELTA outright), and
//! `decompress_stateless` treats a DELTA-flagged packet as CORRUPT since no
//! history exists to decode it against (§4.I step 3, testable property 4).

use std::sync::Arc;

use crate::compress;
use crate::config::{Config, STATELESS};
use crate::context::Context;
use crate::decompress;
use crate::dictionary::Dictionary;
use crate::error::Result;

fn stateless_config() -> Config {
    Config {
        flags: STATELESS,
        ..Config::default()
    }
}

/// Compress one packet with no retained history. `dict` may be `None` for
/// plain passthrough/RLE/LZ77 candidates only.
pub fn compress_stateless(dict: Option<Arc<Dictionary>>, src: &[u8], dst: &mut [u8]) -> Result<usize> {
    let mut ctx = Context::create(dict, stateless_config())?;
    compress::compress(&mut ctx, src, dst)
}

/// Decompress one packet with no retained history. A DELTA-flagged input
/// always fails as CORRUPT here, by construction.
pub fn decompress_stateless(dict: Option<Arc<Dictionary>>, src: &[u8], dst: &mut [u8]) -> Result<usize> {
    let mut ctx = Context::create(dict, stateless_config())?;
    decompress::decompress(&mut ctx, src, dst)
}
