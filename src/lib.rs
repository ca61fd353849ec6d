//! NETC: a buffer-to-buffer codec for small, low-entropy binary packets.
//!
//! Compresses and decompresses payloads of 1..=65535 bytes at wire speed.
//! A [`Dictionary`] trained offline on a representative corpus supplies
//! per-offset byte and bigram statistics to a tabled asymmetric numeral
//! system (tANS/FSE) entropy coder; an optional adaptive mode lets a
//! stateful [`Context`] refine those statistics from live traffic. See
//! each module's docs for the pipeline stage it implements.
//!
//! No transport, framing, encryption, or process lifecycle concerns: the
//! caller owns source and destination buffers and this crate only ever
//! reads one and writes the other.

pub mod adaptive;
pub mod bitstream;
pub mod bucket;
pub mod compress;
pub mod config;
pub mod context;
pub mod crc32;
pub mod decompress;
pub mod delta;
pub mod dictionary;
pub mod error;
pub mod header;
pub mod lz77;
pub mod lzp;
pub mod rle;
pub mod simd;
pub mod stateless;
pub mod tans;

pub use compress::{compress, compress_bound};
pub use config::Config;
pub use context::{Context, Stats};
pub use decompress::decompress;
pub use dictionary::Dictionary;
pub use error::{CodecError, ErrorKind, Result};
pub use stateless::{compress_stateless, decompress_stateless};
