//! Error taxonomy for the codec.
//!
//! Every fallible entry point returns a [`CodecError`] carrying a stable
//! [`ErrorKind`]. Callers that need to branch on failure reason should match
//! on `.kind()`; the `Display` text is for logs and tests only, never for
//! programmatic decisions (see spec §7).

use std::fmt;

use thiserror::Error;

/// Stable error kinds. Do not reorder variants used in any on-disk or wire
/// format decision table; new variants are additive only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Dictionary train/load/save could not allocate.
    NoMem,
    /// Input payload exceeds the 65535-byte packet limit.
    TooBig,
    /// A decode-side invariant was violated: truncated header, bad
    /// algorithm byte, bitstream underflow, out-of-range reference, ...
    Corrupt,
    /// Dictionary blob failed magic/length/CRC validation.
    DictInvalid,
    /// Destination buffer is too small for the operation's output.
    BufSmall,
    /// Context pointer/handle was null or missing.
    CtxNull,
    /// Feature recognized but not implemented (e.g. the reserved rANS byte).
    Unsupported,
    /// Dictionary version unrecognized, or model_id mismatch against ctx.
    Version,
    /// Null/zero/contradictory arguments (e.g. STATELESS + DELTA).
    InvalidArg,
}

impl ErrorKind {
    /// Short machine-stable name, used in tests and diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NoMem => "NOMEM",
            ErrorKind::TooBig => "TOOBIG",
            ErrorKind::Corrupt => "CORRUPT",
            ErrorKind::DictInvalid => "DICT_INVALID",
            ErrorKind::BufSmall => "BUF_SMALL",
            ErrorKind::CtxNull => "CTX_NULL",
            ErrorKind::Unsupported => "UNSUPPORTED",
            ErrorKind::Version => "VERSION",
            ErrorKind::InvalidArg => "INVALID_ARG",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error type returned by every fallible operation in this crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct CodecError {
    kind: ErrorKind,
    message: String,
}

impl CodecError {
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        CodecError {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn too_big<S: Into<String>>(m: S) -> Self {
        Self::new(ErrorKind::TooBig, m)
    }
    pub(crate) fn corrupt<S: Into<String>>(m: S) -> Self {
        Self::new(ErrorKind::Corrupt, m)
    }
    pub(crate) fn dict_invalid<S: Into<String>>(m: S) -> Self {
        Self::new(ErrorKind::DictInvalid, m)
    }
    pub(crate) fn buf_small<S: Into<String>>(m: S) -> Self {
        Self::new(ErrorKind::BufSmall, m)
    }
    pub(crate) fn unsupported<S: Into<String>>(m: S) -> Self {
        Self::new(ErrorKind::Unsupported, m)
    }
    pub(crate) fn version<S: Into<String>>(m: S) -> Self {
        Self::new(ErrorKind::Version, m)
    }
    pub(crate) fn invalid_arg<S: Into<String>>(m: S) -> Self {
        Self::new(ErrorKind::InvalidArg, m)
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
