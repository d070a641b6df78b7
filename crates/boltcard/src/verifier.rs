//! Verification of SDM data read back from a provisioned card.
//!
//! Each tap yields a fresh encrypted PICC blob and truncated CMAC, spliced
//! by the chip into the template's placeholder regions. Verification runs
//! without a live tag session: decrypt the PICC data under the card's
//! PICC-data key, then recompute the two-stage CMAC under the card's CMAC
//! key and compare. Per-key failures are expected when trying a list of
//! candidate cards and are not fatal.

use tracing::debug;
use url::Url;

use ntag424::crypto::{aes_cmac, aes_ecb_decrypt, truncate_mac};

use crate::template::MAGIC;

const PICC_DATA_REGION: usize = 32;
const CMAC_REGION: usize = 16;

/// Fields pulled out of a read-back payload, still encrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicValues {
    /// Encrypted PICC data (16 bytes once hex-decoded).
    pub picc_data: Vec<u8>,
    /// Truncated CMAC (8 bytes once hex-decoded).
    pub cmac: Vec<u8>,
    /// Optional `enc` parameter, covered by the CMAC when present.
    pub enc: Option<String>,
}

/// Extraction failures. Missing and malformed are distinct per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    /// No `picc_data` field was present.
    #[error("picc_data field is missing")]
    PiccDataMissing,
    /// The `picc_data` field was present but not hex text.
    #[error("picc_data field is not valid hex")]
    PiccDataInvalid,
    /// No `cmac` field was present.
    #[error("cmac field is missing")]
    CmacMissing,
    /// The `cmac` field was present but not hex text.
    #[error("cmac field is not valid hex")]
    CmacInvalid,
}

/// Pull `picc_data`, `cmac` and `enc` query parameters out of a URL.
/// Parameter names match case-insensitively.
pub fn extract_from_url(url: &Url) -> Result<DynamicValues, ExtractError> {
    let mut picc_string = None;
    let mut cmac_string = None;
    let mut enc_string = None;

    for (name, value) in url.query_pairs() {
        if name.eq_ignore_ascii_case("picc_data") {
            picc_string = Some(value.into_owned());
        } else if name.eq_ignore_ascii_case("cmac") {
            cmac_string = Some(value.into_owned());
        } else if name.eq_ignore_ascii_case("enc") {
            enc_string = Some(value.into_owned());
        }
    }

    let picc_string = picc_string.ok_or(ExtractError::PiccDataMissing)?;
    let picc_data = hex::decode(picc_string).map_err(|_| ExtractError::PiccDataInvalid)?;
    let cmac_string = cmac_string.ok_or(ExtractError::CmacMissing)?;
    let cmac = hex::decode(cmac_string).map_err(|_| ExtractError::CmacInvalid)?;

    Ok(DynamicValues {
        picc_data,
        cmac,
        enc: enc_string,
    })
}

/// Extract from scanned text, e.g. the payload of a `lightning:` code.
pub fn extract_from_text(text: &str) -> Result<DynamicValues, ExtractError> {
    let url = Url::parse(&format!("lightning:{text}"))
        .map_err(|_| ExtractError::PiccDataMissing)?;
    extract_from_url(&url)
}

/// Extract from a binary-templated payload: validate the magic prefix, then
/// split the fixed-length suffix into hex-as-text PICC and CMAC regions.
pub fn extract_from_binary(binary: &[u8]) -> Result<DynamicValues, ExtractError> {
    let min_length = MAGIC.len() + PICC_DATA_REGION + CMAC_REGION;
    if binary.len() < min_length || !binary.starts_with(&MAGIC) {
        return Err(ExtractError::PiccDataMissing);
    }

    let suffix = &binary[binary.len() - PICC_DATA_REGION - CMAC_REGION..];
    let (picc_raw, cmac_raw) = suffix.split_at(PICC_DATA_REGION);

    let picc_data = std::str::from_utf8(picc_raw)
        .ok()
        .and_then(|text| hex::decode(text).ok())
        .ok_or(ExtractError::PiccDataInvalid)?;
    let cmac = std::str::from_utf8(cmac_raw)
        .ok()
        .and_then(|text| hex::decode(text).ok())
        .ok_or(ExtractError::CmacInvalid)?;

    Ok(DynamicValues {
        picc_data,
        cmac,
        enc: None,
    })
}

/// The two AES-128 keys a card's SDM output is verified against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySet {
    /// Decrypts the PICC data (key slot 1 on a provisioned card).
    pub picc_data_key: [u8; 16],
    /// Authenticates the CMAC (key slot 2 on a provisioned card).
    pub cmac_key: [u8; 16],
}

impl Default for KeySet {
    /// The all-zero factory keys.
    fn default() -> Self {
        Self {
            picc_data_key: [0u8; 16],
            cmac_key: [0u8; 16],
        }
    }
}

/// Decrypted, authenticated PICC data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PiccDataInfo {
    /// The chip's permanent 7-byte UID.
    pub uid: [u8; 7],
    /// Tap counter, 24 bits on the chip.
    pub counter: u32,
}

impl PiccDataInfo {
    /// Largest value the 3-byte counter can reach.
    pub const MAX_COUNTER: u32 = 0x00ff_ffff;
}

/// Verification failures, distinct so a key-trial loop can tell "wrong
/// key" apart from "cannot even compute".
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// The PICC data did not decrypt to a well-formed block.
    #[error("PICC data decryption failed")]
    DecryptionFailed,
    /// The CMAC input could not be assembled (non-ASCII `enc`).
    #[error("CMAC calculation failed")]
    CmacCalculationFailed,
    /// Everything computed, but the CMAC does not match.
    #[error("CMAC mismatch")]
    CmacMismatch,
}

/// Decrypt and authenticate one read-back PICC/CMAC pair.
///
/// The decrypted block must be 16 bytes starting with the 0xC7 tag marker.
/// The CMAC is recomputed in two stages: a session MAC derived from the
/// decrypted UID and counter, then a MAC over the uppercased `enc` string
/// (empty when absent), truncated to its odd-indexed bytes.
pub fn extract_picc_data_info(
    picc_data: &[u8],
    cmac: &[u8],
    enc: Option<&str>,
    key_set: &KeySet,
) -> Result<PiccDataInfo, VerifyError> {
    let decrypted = aes_ecb_decrypt(&key_set.picc_data_key, picc_data)
        .map_err(|_| VerifyError::DecryptionFailed)?;
    if decrypted.len() != 16 || decrypted[0] != 0xc7 {
        return Err(VerifyError::DecryptionFailed);
    }

    let mut uid = [0u8; 7];
    uid.copy_from_slice(&decrypted[1..8]);
    let counter = u32::from_le_bytes([decrypted[8], decrypted[9], decrypted[10], 0]);

    // Stage one: MAC over the SDM session vector, zero-padded to a block.
    let mut input_a = [0u8; 16];
    input_a[0..6].copy_from_slice(&[0x3c, 0xc3, 0x00, 0x01, 0x00, 0x80]);
    input_a[6..16].copy_from_slice(&decrypted[1..11]);
    let mac_a = aes_cmac(&key_set.cmac_key, &input_a);

    // Stage two: keyed with stage one, over the enc parameter if present.
    let mut input_b = Vec::new();
    if let Some(enc) = enc {
        if !enc.is_ascii() {
            return Err(VerifyError::CmacCalculationFailed);
        }
        input_b.extend_from_slice(enc.to_ascii_uppercase().as_bytes());
        input_b.extend_from_slice(b"&cmac=");
    }
    let expected = truncate_mac(&aes_cmac(&mac_a, &input_b));

    if expected[..] != cmac[..] {
        return Err(VerifyError::CmacMismatch);
    }
    Ok(PiccDataInfo { uid, counter })
}

/// Try a list of candidate key sets, short-circuiting at the first match.
///
/// Returns the index of the matching key set alongside the decoded data.
/// When every candidate fails, the last failure is returned; individual
/// failures are expected and only logged.
pub fn verify_with_any(
    picc_data: &[u8],
    cmac: &[u8],
    enc: Option<&str>,
    key_sets: &[KeySet],
) -> Result<(usize, PiccDataInfo), VerifyError> {
    let mut last_error = VerifyError::DecryptionFailed;
    for (index, key_set) in key_sets.iter().enumerate() {
        match extract_picc_data_info(picc_data, cmac, enc, key_set) {
            Ok(info) => return Ok((index, info)),
            Err(error) => {
                debug!(index, %error, "candidate key set rejected");
                last_error = error;
            }
        }
    }
    Err(last_error)
}
