//! NFC Forum Type-4 Tag file construction.
//!
//! A Type-4 file is a 2-byte big-endian NLEN followed by one NDEF message.
//! All builders here emit a single record with both the message-begin and
//! message-end flags set, using the short-record form whenever the payload
//! fits in one length byte (AN12196 pages 30-31).

use url::Url;

const FLAG_MESSAGE_BEGIN: u8 = 0b1000_0000;
const FLAG_MESSAGE_END: u8 = 0b0100_0000;
const FLAG_SHORT_RECORD: u8 = 0b0001_0000;
const TNF_WELL_KNOWN: u8 = 0x01;
const TNF_UNKNOWN: u8 = 0x05;

const TYPE_TEXT: u8 = 0x54; // 'T'
const TYPE_URL: u8 = 0x55; // 'U'

/// URI identifier code 0x00: no abbreviation, the URI is carried verbatim.
const URI_NO_PREFIX: [u8; 1] = [0x00];

/// RTD Text prefix: UTF-8, 2-byte language code "en".
const TEXT_EN_PREFIX: [u8; 3] = [0x02, b'e', b'n'];

/// An assembled Type-4 file: the raw bytes plus the length of everything
/// before the payload. Offsets into the payload are relative to
/// `header_length`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdefFile {
    /// The complete file bytes, NLEN included.
    pub data: Vec<u8>,
    /// Length of everything before the payload.
    pub header_length: usize,
}

/// One record: `record_type` of `None` means TNF "unknown" with an empty
/// type field, as used for opaque binary payloads.
fn assemble(record_type: Option<u8>, type_prefix: &[u8], payload: &[u8]) -> NdefFile {
    let payload_length = type_prefix.len() + payload.len();
    let (tnf, type_length) = match record_type {
        Some(_) => (TNF_WELL_KNOWN, 1u8),
        None => (TNF_UNKNOWN, 0u8),
    };

    let mut record_header = Vec::with_capacity(8);
    if payload_length <= 255 {
        record_header.push(FLAG_MESSAGE_BEGIN | FLAG_MESSAGE_END | FLAG_SHORT_RECORD | tnf);
        record_header.push(type_length);
        record_header.push(payload_length as u8);
    } else {
        record_header.push(FLAG_MESSAGE_BEGIN | FLAG_MESSAGE_END | tnf);
        record_header.push(type_length);
        let length = u32::try_from(payload_length).unwrap_or(u32::MAX);
        record_header.extend_from_slice(&length.to_be_bytes());
    }
    if let Some(record_type) = record_type {
        record_header.push(record_type);
    }

    // NLEN counts the NDEF message, not itself, and tops out at 0xFFFE.
    // Tag files are far below that; anything larger is a caller bug.
    let message_length = record_header.len() + payload_length;
    debug_assert!(
        message_length <= 0xfffe,
        "NDEF message exceeds the NLEN ceiling"
    );
    let nlen = message_length.min(0xfffe) as u16;

    let mut data = Vec::with_capacity(2 + record_header.len() + payload_length);
    data.extend_from_slice(&nlen.to_be_bytes());
    data.extend_from_slice(&record_header);
    data.extend_from_slice(type_prefix);
    let header_length = data.len();
    data.extend_from_slice(payload);

    NdefFile {
        data,
        header_length,
    }
}

/// Build a Type-4 file holding a single URI record.
pub fn file_for_url(url: &Url) -> NdefFile {
    assemble(Some(TYPE_URL), &URI_NO_PREFIX, url.as_str().as_bytes())
}

/// Build a Type-4 file holding a single text record (UTF-8, language "en").
pub fn file_for_text(text: &str) -> NdefFile {
    assemble(Some(TYPE_TEXT), &TEXT_EN_PREFIX, text.as_bytes())
}

/// Build a Type-4 file holding one opaque binary record.
pub fn file_for_binary(binary: &[u8]) -> NdefFile {
    assemble(None, &[], binary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_url_record_layout() {
        let url = Url::parse("https://example.com/").expect("url");
        let file = file_for_url(&url);

        // NLEN ‖ [flags, type len, payload len, 'U'] ‖ URI code ‖ URI.
        let uri = "https://example.com/";
        let payload_length = 1 + uri.len();
        assert_eq!(&file.data[0..2], &[0x00, (4 + payload_length) as u8]);
        assert_eq!(file.data[2], 0xd1); // MB | ME | SR | well-known
        assert_eq!(file.data[3], 0x01);
        assert_eq!(file.data[4], payload_length as u8);
        assert_eq!(file.data[5], 0x55);
        assert_eq!(file.data[6], 0x00);
        assert_eq!(&file.data[7..], uri.as_bytes());
        assert_eq!(file.header_length, 7);
    }

    #[test]
    fn long_records_use_four_length_bytes() {
        let text = "x".repeat(300);
        let file = file_for_text(&text);

        assert_eq!(file.data[2], 0xc1); // MB | ME | well-known, no SR
        assert_eq!(file.data[3], 0x01);
        let payload_length = 3 + 300u32;
        assert_eq!(&file.data[4..8], &payload_length.to_be_bytes());
        assert_eq!(file.data[8], 0x54);
        assert_eq!(&file.data[9..12], &[0x02, b'e', b'n']);
        assert_eq!(file.header_length, 12);

        let nlen = u16::from_be_bytes([file.data[0], file.data[1]]) as usize;
        assert_eq!(nlen, file.data.len() - 2);
    }

    #[test]
    fn binary_records_have_no_type_field() {
        let file = file_for_binary(&[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(&file.data[0..2], &[0x00, 0x07]);
        assert_eq!(file.data[2], 0xd5); // MB | ME | SR | unknown
        assert_eq!(file.data[3], 0x00); // empty type
        assert_eq!(file.data[4], 0x04);
        assert_eq!(file.header_length, 5);
        assert_eq!(&file.data[5..], &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    #[should_panic(expected = "NLEN ceiling")]
    fn messages_beyond_the_nlen_ceiling_are_a_caller_bug() {
        let _ = file_for_binary(&vec![0u8; 0x1_0000]);
    }

    #[test]
    fn short_record_boundary_is_255_payload_bytes() {
        let file = file_for_binary(&[0u8; 255]);
        assert_eq!(file.data[2] & FLAG_SHORT_RECORD, FLAG_SHORT_RECORD);
        let file = file_for_binary(&[0u8; 256]);
        assert_eq!(file.data[2] & FLAG_SHORT_RECORD, 0);
    }
}
