//! Error types for the protocol engine.

use crate::crypto::CryptoError;
use crate::file_settings::FileSettingsError;
use crate::transport::TransportError;

/// Failures during the EV2First mutual authentication handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The chip rejected the handshake opener with 0x91AD. Some chips answer
    /// this way once after power-up; callers may retry the whole handshake,
    /// the engine never does so on its own.
    #[error("chip asked for an authentication retry (0x91AD)")]
    UnsupportedRetry,
    /// The chip failed to echo our rotated challenge, so it does not hold
    /// the key we authenticated with.
    #[error("chip failed the challenge-response check")]
    ChallengeMismatch,
}

/// Any failure the engine can surface to a caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Physical-layer failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The chip returned a status outside the success set.
    #[error("unexpected status {major:02x}{minor:02x}")]
    UnexpectedStatus {
        /// SW1 as returned by the chip.
        major: u8,
        /// SW2 as returned by the chip.
        minor: u8,
    },

    /// A response MAC did not verify against the session MAC key.
    #[error("response MAC verification failed")]
    InvalidMac,

    /// The EV2First handshake failed.
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),

    /// A caller-supplied argument was out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// The chip's response did not have the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(&'static str),

    /// A command that needs secure messaging was issued without an
    /// authenticated session.
    #[error("no authenticated session")]
    NoSession,

    /// File settings could not be decoded or encoded.
    #[error(transparent)]
    FileSettings(#[from] FileSettingsError),

    /// A cryptographic primitive rejected its input.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Engine-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
