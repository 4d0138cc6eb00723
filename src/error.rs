//! Crate error types.
//!
//! There is exactly one recoverable error — a failed tag comparison on
//! `Open`/`Unmask` — plus misuse panics for programmer errors. `cyclist`
//! signals the same failure as `bool`/`Option::None` rather than a typed
//! error; this crate follows the newer idiom in the pack instead
//! (`spongefish` and `logannye-tinyzkp` both derive their error enums with
//! `thiserror`), giving scheme wrappers a named, matchable error type they
//! can extend.

use thiserror::Error;

/// Errors surfaced by the Protocol transcript engine.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A `Seal`/`Mask` tag comparison failed. The Protocol instance that
    /// produced this error is permanently desynchronized (the wrong,
    /// computed tag has already been folded into the next CHAIN frame) and
    /// MUST be discarded.
    #[error("invalid ciphertext: tag mismatch")]
    InvalidCiphertext,

    /// An error from the reader passed to `MixStream`/`MixWriter`. Does not
    /// corrupt the Protocol: no frame is written until the stream is fully
    /// consumed or `MixWriter::close` is called.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
