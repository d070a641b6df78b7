//! Bolt-card provisioning templates and SDM read-back verification for
//! NTAG 424 DNA tags.
//!
//! Provisioning builds an NDEF file whose placeholder offsets get
//! programmed into the card's SDM file settings; every later tap has the
//! chip splice fresh encrypted data into those exact offsets, which this
//! crate extracts and verifies offline, without a tag session.

pub mod ndef;
mod template;
mod verifier;

pub use ndef::NdefFile;
pub use template::{
    flags, BoltCardTemplate, ShortChainHash, TemplateError, TemplateValue, CMAC_PLACEHOLDER,
    MAGIC, PICC_DATA_PLACEHOLDER,
};
pub use verifier::{
    extract_from_binary, extract_from_text, extract_from_url, extract_picc_data_info,
    verify_with_any, DynamicValues, ExtractError, KeySet, PiccDataInfo, VerifyError,
};
