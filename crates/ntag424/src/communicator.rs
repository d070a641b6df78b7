//! Command layer: envelope building, mode dispatch and session bookkeeping.
//!
//! Every native command travels inside a fixed ISO 7816-4 wrapper:
//!
//! ```text
//! [0x90, cmd, 0x00, 0x00, len, header…, data…, mac…, 0x00]
//! ```
//!
//! Three wire-security modes build on that envelope. Plain commands go out
//! untouched. MAC commands append a truncated CMAC over the command, the
//! session counter, the transaction identifier and the payload, and verify
//! the equivalent MAC on the response. Full commands additionally encrypt
//! the data field in both directions. The mode is chosen per file, so most
//! operations take a [`CommunicationMode`] selector.

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::constants::status;
use crate::crypto::SessionCrypto;
use crate::error::{Error, Result};
use crate::session::Session;
use crate::transport::{CardTransport, TransportError};
use crate::types::{CommunicationMode, KeySpecifier};

/// A native-command reply after envelope stripping.
#[derive(Debug, Clone)]
pub(crate) struct CommandReply {
    pub(crate) data: Bytes,
    pub(crate) major: u8,
    pub(crate) minor: u8,
}

impl CommandReply {
    /// Enforce the engine-wide status rule: SW1 must be 0x91 and SW2 must
    /// be "ok" or "additional frame". Anything else is surfaced with both
    /// bytes attached.
    pub(crate) fn check_status(&self) -> Result<()> {
        if self.major != status::MAJOR_OK
            || (self.minor != status::MINOR_OK && self.minor != status::MINOR_ADDITIONAL_FRAME)
        {
            return Err(Error::UnexpectedStatus {
                major: self.major,
                minor: self.minor,
            });
        }
        Ok(())
    }
}

/// Protocol engine for one NTAG 424 DNA tag connection.
///
/// Owns the transport and all session state. One instance drives one
/// physical tag session; commands are strictly sequential.
#[derive(Debug)]
pub struct DnaCommunicator<T> {
    transport: T,
    pub(crate) session: Session,
}

impl<T: CardTransport> DnaCommunicator<T> {
    /// Wrap a connected transport. The session starts unauthenticated.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            session: Session::default(),
        }
    }

    /// Key slot of the active session, if authenticated.
    pub fn active_key(&self) -> Option<KeySpecifier> {
        self.session.active_key
    }

    /// Whether an EV2 session is established.
    pub fn is_authenticated(&self) -> bool {
        self.session.crypto.is_some()
    }

    /// Access the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Tear down the engine and recover the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Raw exchange of a fully-formed APDU.
    pub(crate) fn transceive(&mut self, packet: &[u8]) -> Result<CommandReply> {
        trace!(apdu = %hex::encode(packet), "outbound");
        let response = self.transport.transceive(packet)?;
        trace!(
            data = %hex::encode(&response.data),
            sw1 = response.sw1,
            sw2 = response.sw2,
            "inbound"
        );
        Ok(CommandReply {
            data: response.data,
            major: response.sw1,
            minor: response.sw2,
        })
    }

    /// Build the native-command envelope and transceive it. No status
    /// checking and no counter bookkeeping happen here.
    pub(crate) fn native_command(
        &mut self,
        command: u8,
        header: &[u8],
        data: &[u8],
        mac: Option<&[u8; 8]>,
    ) -> Result<CommandReply> {
        let mac = mac.map(<[u8; 8]>::as_slice).unwrap_or_default();
        let len = header.len() + data.len() + mac.len();
        let len = u8::try_from(len)
            .map_err(|_| TransportError::InvalidApdu("command exceeds one frame"))?;

        let mut packet = Vec::with_capacity(6 + len as usize);
        packet.extend_from_slice(&[0x90, command, 0x00, 0x00, len]);
        packet.extend_from_slice(header);
        packet.extend_from_slice(data);
        packet.extend_from_slice(mac);
        packet.push(0x00);

        self.transceive(&packet)
    }

    /// Unprotected command. Counts against the session counter like every
    /// other command so MAC inputs stay aligned with the chip's view.
    pub(crate) fn plain_command(
        &mut self,
        command: u8,
        header: &[u8],
        data: &[u8],
    ) -> Result<CommandReply> {
        let reply = self.native_command(command, header, data, None)?;
        self.session.counter = self.session.counter.wrapping_add(1);
        reply.check_status()?;
        Ok(reply)
    }

    /// MAC-protected command. Appends a truncated CMAC over
    /// `[cmd, counter LE, TI, header, data]`, then verifies the response MAC
    /// over `[status minor, counter LE, TI, payload]` with the incremented
    /// counter. Responses shorter than 8 bytes carry no MAC and pass through
    /// with an empty payload.
    pub(crate) fn mac_command(
        &mut self,
        command: u8,
        header: &[u8],
        data: &[u8],
    ) -> Result<CommandReply> {
        let mac = {
            let crypto = self.session.crypto()?;
            let mut input = Vec::with_capacity(7 + header.len() + data.len());
            input.push(command);
            input.extend_from_slice(&self.session.counter.to_le_bytes());
            input.extend_from_slice(&self.session.transaction_id);
            input.extend_from_slice(header);
            input.extend_from_slice(data);
            crypto.generate_mac(&input)
        };

        let mut reply = self.native_command(command, header, data, Some(&mac))?;
        self.session.counter = self.session.counter.wrapping_add(1);

        if reply.data.len() < 8 {
            reply.data = Bytes::new();
            reply.check_status()?;
            return Ok(reply);
        }

        let payload = reply.data.slice(..reply.data.len() - 8);
        let received_mac = reply.data.slice(reply.data.len() - 8..);

        let crypto = self.session.crypto()?;
        let mut input = Vec::with_capacity(7 + payload.len());
        input.push(reply.minor);
        input.extend_from_slice(&self.session.counter.to_le_bytes());
        input.extend_from_slice(&self.session.transaction_id);
        input.extend_from_slice(&payload);
        let expected = crypto.generate_mac(&input);

        if expected[..] != received_mac[..] {
            warn!(command, "response MAC mismatch");
            return Err(Error::InvalidMac);
        }

        reply.data = payload;
        reply.check_status()?;
        Ok(reply)
    }

    /// Fully-protected command: encrypts the data field, delegates to
    /// [`Self::mac_command`], and decrypts the returned payload. Empty data
    /// fields are passed through unencrypted in both directions.
    pub(crate) fn encrypted_command(
        &mut self,
        command: u8,
        header: &[u8],
        data: &[u8],
    ) -> Result<CommandReply> {
        let encrypted = if data.is_empty() {
            Vec::new()
        } else {
            let crypto = self.session.crypto()?;
            crypto.encrypt_data(&self.session.transaction_id, self.session.counter, data)?
        };

        let mut reply = self.mac_command(command, header, &encrypted)?;

        if !reply.data.is_empty() {
            let crypto = self.session.crypto()?;
            let plain = crypto.decrypt_data(
                &self.session.transaction_id,
                self.session.counter,
                &reply.data,
            )?;
            reply.data = Bytes::from(plain);
        }
        Ok(reply)
    }

    /// Dispatch on the wire-security mode a file is configured for.
    pub(crate) fn switched_command(
        &mut self,
        mode: CommunicationMode,
        command: u8,
        header: &[u8],
        data: &[u8],
    ) -> Result<CommandReply> {
        debug!(command, ?mode, "command");
        match mode {
            CommunicationMode::Plain => self.plain_command(command, header, data),
            CommunicationMode::Mac => self.mac_command(command, header, data),
            CommunicationMode::Full => self.encrypted_command(command, header, data),
        }
    }

    /// Install a secure channel directly. Used by the authentication flow.
    pub(crate) fn activate_session(
        &mut self,
        key: KeySpecifier,
        transaction_id: [u8; 4],
        crypto: Box<dyn SessionCrypto>,
    ) {
        self.session.activate(key, transaction_id, crypto);
    }
}
