//! Protocol engine for NXP NTAG 424 DNA secure-memory contactless chips.
//!
//! The engine drives one tag session over a caller-supplied
//! [`CardTransport`]: EV2First mutual authentication, session-bound MAC and
//! encryption, file reads and writes in the wire-security mode each file is
//! configured for, and the bit-packed file-settings codec.
//!
//! ```no_run
//! # use ntag424::{CardTransport, DnaCommunicator, FileSpecifier, KeySpecifier, DEFAULT_KEY};
//! # fn provision(transport: impl CardTransport) -> ntag424::Result<()> {
//! let mut tag = DnaCommunicator::new(transport);
//! tag.select_file_by_id(0xe104)?;
//! tag.authenticate_ev2_first(KeySpecifier::Key0, &DEFAULT_KEY)?;
//! let settings = tag.get_file_settings(FileSpecifier::Ndef)?;
//! # let _ = settings;
//! # Ok(())
//! # }
//! ```

mod auth;
mod commands;
mod communicator;
mod constants;
pub mod crypto;
mod error;
mod file_settings;
mod session;
mod transport;
mod types;
pub mod util;

pub use communicator::DnaCommunicator;
pub use constants::{ins, status, DEFAULT_KEY};
pub use error::{AuthError, Error, Result};
pub use file_settings::{EncodeMode, FileSettings, FileSettingsError, SdmField};
pub use transport::{CardTransport, RawResponse, TransportError};
pub use types::{CommunicationMode, FileSpecifier, KeySpecifier, Permission};
