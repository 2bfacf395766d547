//! Error taxonomy for the EV2 secure-messaging core.
//!
//! Library code (everything but `main.rs`) returns `Result<T, Error>`.
//! `main.rs` wraps these in `anyhow::Result` at the CLI boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected status word 0x{sw:04X}")]
    UnexpectedStatus { sw: u16 },

    #[error("short response: expected at least {expected} bytes, got {actual}")]
    ShortResponse { expected: usize, actual: usize },

    #[error("EV2-First authentication failed: RndA mismatch")]
    AuthFailure,

    #[error("response MAC mismatch, session discarded")]
    MacMismatch,

    #[error("invalid protocol parameter: {0}")]
    ProtocolParameter(String),

    #[error("parse error: {0}")]
    ParseError(String),
}

pub type Result<T> = std::result::Result<T, Error>;
