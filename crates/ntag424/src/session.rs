//! Per-connection session state.

use crate::crypto::SessionCrypto;
use crate::error::{Error, Result};
use crate::types::KeySpecifier;

/// Mutable state of one authenticated exchange with a tag.
///
/// Starts empty, is populated atomically when the EV2First handshake
/// succeeds, and ends with the physical connection. There is no explicit
/// teardown.
#[derive(Debug, Default)]
pub(crate) struct Session {
    /// Key slot the current session authenticated with.
    pub(crate) active_key: Option<KeySpecifier>,
    /// Transaction identifier assigned by the chip at authentication.
    pub(crate) transaction_id: [u8; 4],
    /// Command counter, incremented once per command sent.
    pub(crate) counter: u16,
    /// Secure channel derived from the handshake.
    pub(crate) crypto: Option<Box<dyn SessionCrypto>>,
}

impl Session {
    /// Install the result of a successful handshake. Resets the counter.
    pub(crate) fn activate(
        &mut self,
        key: KeySpecifier,
        transaction_id: [u8; 4],
        crypto: Box<dyn SessionCrypto>,
    ) {
        self.active_key = Some(key);
        self.transaction_id = transaction_id;
        self.counter = 0;
        self.crypto = Some(crypto);
    }

    /// Secure channel of the active session, or [`Error::NoSession`].
    pub(crate) fn crypto(&self) -> Result<&dyn SessionCrypto> {
        self.crypto.as_deref().ok_or(Error::NoSession)
    }
}
