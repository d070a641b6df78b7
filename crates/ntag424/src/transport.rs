//! Transport layer for tag communication.
//!
//! The engine never touches the NFC field itself; callers supply a
//! [`CardTransport`] that moves ISO 7816-4 APDUs to and from a tag that is
//! already in the field. Transports are strictly sequential half-duplex:
//! one command in flight, its paired response (or failure) before the next.

use bytes::Bytes;
use std::fmt;

/// A raw APDU exchange result: response payload plus the two status bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// Response data, without SW1/SW2.
    pub data: Bytes,
    /// First status byte.
    pub sw1: u8,
    /// Second status byte.
    pub sw2: u8,
}

/// Errors from the physical layer.
///
/// Cancellation, timeout and termination are deliberately distinct variants:
/// callers routinely suppress user cancellation from error surfaces while
/// still treating the other outcomes as failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The command bytes could not be framed as an APDU.
    #[error("invalid APDU: {0}")]
    InvalidApdu(&'static str),
    /// Failed to transmit or receive.
    #[error("transmission failed")]
    Transmission,
    /// The user cancelled the tag session.
    #[error("tag session cancelled by user")]
    UserCancelled,
    /// The tag session timed out.
    #[error("tag session timed out")]
    SessionTimeout,
    /// The tag session was terminated by the system.
    #[error("tag session terminated")]
    SessionTerminated,
    /// Reader or device failure with a backend-specific message.
    #[error("device error: {0}")]
    Device(String),
}

impl TransportError {
    /// Whether this outcome reflects a user decision rather than a fault.
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::UserCancelled)
    }
}

/// Byte-transceive capability over a connected tag.
pub trait CardTransport: fmt::Debug + Send {
    /// Send one APDU and wait for the paired response.
    fn transceive(&mut self, apdu: &[u8]) -> Result<RawResponse, TransportError>;
}

#[cfg(test)]
pub(crate) use mock::MockTransport;
