//! Bolt-card tag templates.
//!
//! A template is the NDEF file written to a card during provisioning, plus
//! the byte offsets of the placeholder regions the chip later overwrites
//! with live SDM data on every read. Those offsets get programmed into the
//! card's file settings, so they must match the assembled bytes exactly.

use tracing::debug;
use url::Url;

use crate::ndef::{self, NdefFile};

/// Two-byte prefix marking a binary payload as a bolt card.
pub const MAGIC: [u8; 2] = [0xe1, 0x80];

/// Placeholder for the 16-byte encrypted PICC data, as 32 hex characters.
pub const PICC_DATA_PLACEHOLDER: &str = "00000000000000000000000000000000";

/// Placeholder for the 8-byte truncated CMAC, as 16 hex characters.
pub const CMAC_PLACEHOLDER: &str = "0000000000000000";

const PICC_DATA_REGION: usize = 32;
const CMAC_REGION: usize = 16;

/// Flag bits of the binary template, one independent pair each.
pub mod flags {
    /// Payload is an address string rather than a BOLT 12 offer.
    pub const TYPE_ADDRESS: u8 = 0b001;
    /// Payload targets a chain other than mainnet; a 4-byte chain hash
    /// follows the flags byte.
    pub const CHAIN_OTHER: u8 = 0b010;
    /// The wallet behind this card only supports BOLT 11.
    pub const SUPPORT_BOLT11: u8 = 0b100;
}

/// First four bytes of a chain's genesis block hash, identifying the chain
/// in the binary template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortChainHash(
    /// First four bytes of the genesis block hash.
    pub [u8; 4],
);

impl ShortChainHash {
    /// Bitcoin mainnet.
    pub const MAINNET: Self = Self([0x6f, 0xe2, 0x8c, 0x0a]);
    /// Bitcoin testnet3.
    pub const TESTNET3: Self = Self([0x43, 0x49, 0x7f, 0xd7]);
    /// Bitcoin testnet4.
    pub const TESTNET4: Self = Self([0x43, 0xf0, 0x8b, 0xda]);
}

/// The resolved content a template was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateValue {
    /// A payment URL carrying placeholder query parameters.
    Url(Url),
    /// A binary payload with trailing placeholder regions.
    Binary(Vec<u8>),
}

/// Template construction failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// The placeholder markers were not found in the resolved URL.
    #[error("placeholder markers missing from the resolved URL")]
    MarkerMissing,
}

/// An immutable provisioning template: assembled file bytes with zeroed
/// placeholder regions and the exact offsets of those regions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoltCardTemplate {
    /// The resolved content the file was built from.
    pub value: TemplateValue,
    /// The assembled Type-4 file bytes.
    pub data: Vec<u8>,
    /// Length of the NDEF header before the payload.
    pub header_length: usize,
    /// Offset of the 32-character PICC data region in `data`.
    pub picc_data_offset: usize,
    /// Offset of the 16-character CMAC region in `data`.
    pub cmac_offset: usize,
}

impl BoltCardTemplate {
    /// Build a URL-templated card file.
    ///
    /// Any `picc_data` or `cmac` query parameters already on the base URL
    /// are dropped, then zero-filled placeholders are appended. The offsets
    /// index into the UTF-8 encoding of the final URL, shifted by the NDEF
    /// header length.
    pub fn from_url(base_url: &Url) -> Result<Self, TemplateError> {
        let retained: Vec<(String, String)> = base_url
            .query_pairs()
            .filter(|(name, _)| {
                !name.eq_ignore_ascii_case("picc_data") && !name.eq_ignore_ascii_case("cmac")
            })
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();

        let mut url = base_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (name, value) in &retained {
                pairs.append_pair(name, value);
            }
            pairs.append_pair("picc_data", PICC_DATA_PLACEHOLDER);
            pairs.append_pair("cmac", CMAC_PLACEHOLDER);
        }

        let file = ndef::file_for_url(&url);
        let url_str = url.as_str();
        let picc_data_offset = url_str
            .rfind("picc_data=")
            .map(|index| index + "picc_data=".len())
            .ok_or(TemplateError::MarkerMissing)?;
        let cmac_offset = url_str
            .rfind("cmac=")
            .map(|index| index + "cmac=".len())
            .ok_or(TemplateError::MarkerMissing)?;
        debug!(url = %url, picc_data_offset, cmac_offset, "built URL template");

        Ok(Self {
            picc_data_offset: file.header_length + picc_data_offset,
            cmac_offset: file.header_length + cmac_offset,
            header_length: file.header_length,
            data: file.data,
            value: TemplateValue::Url(url),
        })
    }

    /// Build a binary-templated card file around a BOLT 12 offer.
    pub fn from_offer(
        offer: &[u8],
        chain: Option<ShortChainHash>,
        supports_bolt12: bool,
    ) -> Self {
        Self::from_binary(offer, 0, chain, supports_bolt12)
    }

    /// Build a binary-templated card file around an address string.
    pub fn from_address(
        address: &str,
        chain: Option<ShortChainHash>,
        supports_bolt12: bool,
    ) -> Self {
        Self::from_binary(address.as_bytes(), flags::TYPE_ADDRESS, chain, supports_bolt12)
    }

    fn from_binary(
        payload: &[u8],
        type_flag: u8,
        chain: Option<ShortChainHash>,
        supports_bolt12: bool,
    ) -> Self {
        // Mainnet is the default and is never spelled out.
        let chain = chain.filter(|chain| *chain != ShortChainHash::MAINNET);

        let mut flag_bits = type_flag;
        if chain.is_some() {
            flag_bits |= flags::CHAIN_OTHER;
        }
        if !supports_bolt12 {
            flag_bits |= flags::SUPPORT_BOLT11;
        }

        let mut binary = MAGIC.to_vec();
        binary.push(flag_bits);
        if let Some(chain) = chain {
            binary.extend_from_slice(&chain.0);
        }
        let prefix_length = binary.len();
        binary.extend_from_slice(payload);
        binary.extend_from_slice(&[0u8; PICC_DATA_REGION + CMAC_REGION]);

        let NdefFile {
            data,
            header_length,
        } = ndef::file_for_binary(&binary);

        let picc_data_offset = header_length + prefix_length + payload.len();
        Self {
            value: TemplateValue::Binary(binary),
            data,
            header_length,
            picc_data_offset,
            cmac_offset: picc_data_offset + PICC_DATA_REGION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::{extract_from_binary, extract_from_url, ExtractError};

    #[test]
    fn url_placeholders_sit_at_the_recorded_offsets() {
        let base = Url::parse("https://pay.example.com/card?id=7").expect("url");
        let template = BoltCardTemplate::from_url(&base).expect("template");

        let picc = &template.data[template.picc_data_offset..template.picc_data_offset + 32];
        let cmac = &template.data[template.cmac_offset..template.cmac_offset + 16];
        assert_eq!(picc, PICC_DATA_PLACEHOLDER.as_bytes());
        assert_eq!(cmac, CMAC_PLACEHOLDER.as_bytes());
    }

    #[test]
    fn existing_placeholder_parameters_are_replaced() {
        let base = Url::parse("https://pay.example.com/card?PICC_DATA=dead&cmac=beef&id=7")
            .expect("url");
        let template = BoltCardTemplate::from_url(&base).expect("template");

        let TemplateValue::Url(url) = &template.value else {
            panic!("URL template");
        };
        let query = url.query().expect("query");
        assert!(query.contains("id=7"));
        assert!(!query.contains("dead"));
        assert!(!query.contains("beef"));
        // Exactly one of each marker, at the end.
        assert_eq!(query.matches("picc_data=").count(), 1);
    }

    #[test]
    fn spliced_url_values_are_recovered_exactly() {
        let base = Url::parse("https://pay.example.com/card").expect("url");
        let template = BoltCardTemplate::from_url(&base).expect("template");

        let picc_hex = "0102030405060708090a0b0c0d0e0f10";
        let cmac_hex = "f1e2d3c4b5a69788";
        let mut data = template.data.clone();
        data[template.picc_data_offset..template.picc_data_offset + 32]
            .copy_from_slice(picc_hex.as_bytes());
        data[template.cmac_offset..template.cmac_offset + 16]
            .copy_from_slice(cmac_hex.as_bytes());

        let url_bytes = &data[template.header_length..];
        let url = Url::parse(std::str::from_utf8(url_bytes).expect("utf8")).expect("url");
        let values = extract_from_url(&url).expect("extract");
        assert_eq!(hex::encode(&values.picc_data), picc_hex);
        assert_eq!(hex::encode(&values.cmac), cmac_hex);
        assert_eq!(values.enc, None);
    }

    #[test]
    fn mainnet_offer_omits_the_chain_hash() {
        let offer = b"lno1qsgqmqvgm96frzdg8m0gc6nzeqffvzsqzrxqy32afmr3jn9ggkwg3egfwch2hy0l6jut6vqcqsmcu";
        let template =
            BoltCardTemplate::from_offer(offer, Some(ShortChainHash::MAINNET), true);

        let TemplateValue::Binary(binary) = &template.value else {
            panic!("binary template");
        };
        assert_eq!(&binary[0..2], &MAGIC);
        assert_eq!(binary[2], 0); // offer, mainnet, bolt12
        assert_eq!(&binary[3..3 + offer.len()], offer);
        assert_eq!(binary.len(), 3 + offer.len() + 48);
    }

    #[test]
    fn testnet_address_packs_all_three_flags() {
        let template = BoltCardTemplate::from_address(
            "carol@pay.example.com",
            Some(ShortChainHash::TESTNET3),
            false,
        );

        let TemplateValue::Binary(binary) = &template.value else {
            panic!("binary template");
        };
        assert_eq!(binary[2], 0b111);
        assert_eq!(&binary[3..7], &ShortChainHash::TESTNET3.0);
        assert_eq!(&binary[7..28], b"carol@pay.example.com");
    }

    #[test]
    fn binary_placeholder_regions_are_zeroed_at_the_offsets() {
        let template = BoltCardTemplate::from_offer(b"offer", None, true);
        let picc = &template.data[template.picc_data_offset..template.picc_data_offset + 32];
        let cmac = &template.data[template.cmac_offset..template.cmac_offset + 16];
        assert_eq!(picc, &[0u8; 32]);
        assert_eq!(cmac, &[0u8; 16]);
    }

    #[test]
    fn spliced_binary_values_are_recovered_exactly() {
        let template = BoltCardTemplate::from_offer(b"offer", Some(ShortChainHash::TESTNET4), true);

        let picc_hex = "c7aabbccddeeff00112233445566f00d";
        let cmac_hex = "00aa11bb22cc33dd";
        let mut data = template.data.clone();
        data[template.picc_data_offset..template.picc_data_offset + 32]
            .copy_from_slice(picc_hex.as_bytes());
        data[template.cmac_offset..template.cmac_offset + 16]
            .copy_from_slice(cmac_hex.as_bytes());

        let values = extract_from_binary(&data[template.header_length..]).expect("extract");
        assert_eq!(hex::encode(&values.picc_data), picc_hex);
        assert_eq!(hex::encode(&values.cmac), cmac_hex);
    }

    #[test]
    fn unspliced_binary_template_fails_as_invalid_not_missing() {
        let template = BoltCardTemplate::from_offer(b"offer", None, true);
        let err = extract_from_binary(&template.data[template.header_length..])
            .expect_err("zero placeholders are not hex text");
        assert_eq!(err, ExtractError::PiccDataInvalid);
    }
}
