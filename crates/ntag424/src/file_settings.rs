//! Binary codec for file access and SDM configuration.
//!
//! The wire layout is bit-packed and conditional: which 3-byte offsets are
//! present depends on the SDM option flags and permissions earlier in the
//! structure. Decoder and encoder share one field-order plan
//! ([`FileSettings::sdm_field_order`]) so the two cannot drift apart.
//!
//! Layout (GetFileSettings response):
//!
//! ```text
//! [type] [options] [rights rw|chg] [rights rd|wr] [size LE24]
//! then, if SDM is enabled and configured:
//! [sdm options] [F|ctr-ret] [meta|file-read] [conditional LE24 fields…]
//! ```

use crate::types::{CommunicationMode, Permission};
use crate::util;

/// A conditional SDM field. Used to name which one is missing on encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdmField {
    /// Offset of the mirrored UID.
    UidOffset,
    /// Offset of the mirrored read counter.
    ReadCounterOffset,
    /// Offset of the encrypted PICC data.
    PiccDataOffset,
    /// Offset where the MAC input begins.
    MacInputOffset,
    /// Offset of the encrypted file data.
    EncOffset,
    /// Length of the encrypted file data.
    EncLength,
    /// Offset of the mirrored MAC.
    MacOffset,
    /// Read-counter limit value.
    ReadCounterLimit,
}

impl std::fmt::Display for SdmField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::UidOffset => "SDM UID offset",
            Self::ReadCounterOffset => "SDM read-counter offset",
            Self::PiccDataOffset => "SDM PICC-data offset",
            Self::MacInputOffset => "SDM MAC-input offset",
            Self::EncOffset => "SDM encrypted-data offset",
            Self::EncLength => "SDM encrypted-data length",
            Self::MacOffset => "SDM MAC offset",
            Self::ReadCounterLimit => "SDM read-counter limit",
        };
        f.write_str(name)
    }
}

/// Codec failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FileSettingsError {
    /// Input ended before a required field.
    #[error("file settings data is truncated")]
    Truncated,
    /// A flag requires a field that is unset. Never silently defaulted.
    #[error("{0} is required by the active flags but unset")]
    MissingField(SdmField),
}

/// Which command the encoded bytes are for. GetFileSettings responses carry
/// the file type and size; the ChangeFileSettings data field omits both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeMode {
    /// The full read-back image, as the chip returns it.
    GetFileSettings,
    /// The mutable subset sent to the chip.
    ChangeFileSettings,
}

/// Access permissions plus optional Secure Dynamic Messaging configuration
/// of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSettings {
    /// Raw file type byte.
    pub file_type: u8,
    /// Whether Secure Dynamic Messaging is enabled.
    pub sdm_enabled: bool,
    /// Wire protection for data commands on this file.
    pub communication_mode: CommunicationMode,
    /// Who may read the file.
    pub read_permission: Permission,
    /// Who may write the file.
    pub write_permission: Permission,
    /// Who may both read and write the file.
    pub read_write_permission: Permission,
    /// Who may change these settings.
    pub change_permission: Permission,
    /// File size in bytes.
    pub file_size: u32,

    /// Mirror the UID into the file on each read.
    pub sdm_option_uid: bool,
    /// Mirror the read counter into the file on each read.
    pub sdm_option_read_counter: bool,
    /// Stop mirroring once the read counter reaches its limit.
    pub sdm_option_read_counter_limit: bool,
    /// Encrypt a region of the file data on each read.
    pub sdm_option_encrypt_file_data: bool,
    /// Mirror values as ASCII hex rather than raw bytes.
    pub sdm_option_use_ascii: bool,
    /// Who may read the mirrored meta data.
    pub sdm_meta_read_permission: Permission,
    /// Who may read the SDM-protected file data.
    pub sdm_file_read_permission: Permission,
    /// Who may retrieve the read counter directly.
    pub sdm_read_counter_retrieval_permission: Permission,

    /// Offset of the mirrored UID.
    pub sdm_uid_offset: Option<u32>,
    /// Offset of the mirrored read counter.
    pub sdm_read_counter_offset: Option<u32>,
    /// Offset of the encrypted PICC data.
    pub sdm_picc_data_offset: Option<u32>,
    /// Offset where the MAC input begins.
    pub sdm_mac_input_offset: Option<u32>,
    /// Offset of the mirrored MAC.
    pub sdm_mac_offset: Option<u32>,
    /// Offset of the encrypted file data.
    pub sdm_enc_offset: Option<u32>,
    /// Length of the encrypted file data.
    pub sdm_enc_length: Option<u32>,
    /// Read-counter limit value.
    pub sdm_read_counter_limit: Option<u32>,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            file_type: 0,
            sdm_enabled: false,
            communication_mode: CommunicationMode::Plain,
            read_permission: Permission::None,
            write_permission: Permission::None,
            read_write_permission: Permission::None,
            change_permission: Permission::None,
            file_size: 0,
            sdm_option_uid: false,
            sdm_option_read_counter: false,
            sdm_option_read_counter_limit: false,
            sdm_option_encrypt_file_data: false,
            sdm_option_use_ascii: false,
            sdm_meta_read_permission: Permission::None,
            sdm_file_read_permission: Permission::None,
            sdm_read_counter_retrieval_permission: Permission::None,
            sdm_uid_offset: None,
            sdm_read_counter_offset: None,
            sdm_picc_data_offset: None,
            sdm_mac_input_offset: None,
            sdm_mac_offset: None,
            sdm_enc_offset: None,
            sdm_enc_length: None,
            sdm_read_counter_limit: None,
        }
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, count: usize) -> Result<&'a [u8], FileSettingsError> {
        if self.data.len() < self.pos + count {
            return Err(FileSettingsError::Truncated);
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8, FileSettingsError> {
        Ok(self.take(1)?[0])
    }

    fn le24(&mut self) -> Result<u32, FileSettingsError> {
        let bytes = self.take(3)?;
        Ok(util::read_le24(&[bytes[0], bytes[1], bytes[2]]))
    }

    fn at_end(&self) -> bool {
        self.pos == self.data.len()
    }
}

impl FileSettings {
    /// Minimum length of an encoded GetFileSettings response.
    pub const MIN_BYTE_COUNT: usize = 7;

    /// Decode a GetFileSettings response.
    ///
    /// Fails with [`FileSettingsError::Truncated`] before any conditional
    /// field is read past the available length. A chip with SDM enabled but
    /// nothing configured may omit the whole SDM sub-header; that decodes
    /// to all-NONE SDM permissions and no option flags.
    pub fn decode(data: &[u8]) -> Result<Self, FileSettingsError> {
        let mut cursor = Cursor { data, pos: 0 };
        if data.len() < Self::MIN_BYTE_COUNT {
            return Err(FileSettingsError::Truncated);
        }

        let mut settings = Self {
            file_type: cursor.byte()?,
            ..Self::default()
        };

        let options = cursor.byte()?;
        settings.sdm_enabled = util::bit_lsb(options, 6);
        if util::bit_lsb(options, 0) {
            settings.communication_mode = if util::bit_lsb(options, 1) {
                CommunicationMode::Full
            } else {
                CommunicationMode::Mac
            };
        }

        let rights_a = cursor.byte()?;
        let rights_b = cursor.byte()?;
        settings.read_write_permission = Permission::from_nibble(util::left_nibble(rights_a));
        settings.change_permission = Permission::from_nibble(util::right_nibble(rights_a));
        settings.read_permission = Permission::from_nibble(util::left_nibble(rights_b));
        settings.write_permission = Permission::from_nibble(util::right_nibble(rights_b));

        settings.file_size = cursor.le24()?;

        if settings.sdm_enabled && !cursor.at_end() {
            let sdm_options = cursor.byte()?;
            settings.sdm_option_uid = util::bit_lsb(sdm_options, 7);
            settings.sdm_option_read_counter = util::bit_lsb(sdm_options, 6);
            settings.sdm_option_read_counter_limit = util::bit_lsb(sdm_options, 5);
            settings.sdm_option_encrypt_file_data = util::bit_lsb(sdm_options, 4);
            settings.sdm_option_use_ascii = util::bit_lsb(sdm_options, 0);

            let sdm_rights_a = cursor.byte()?;
            let sdm_rights_b = cursor.byte()?;
            settings.sdm_read_counter_retrieval_permission =
                Permission::from_nibble(util::right_nibble(sdm_rights_a));
            settings.sdm_meta_read_permission =
                Permission::from_nibble(util::left_nibble(sdm_rights_b));
            settings.sdm_file_read_permission =
                Permission::from_nibble(util::right_nibble(sdm_rights_b));

            for field in settings.sdm_field_order() {
                let value = cursor.le24()?;
                *settings.field_slot(field) = Some(value);
            }
        }

        Ok(settings)
    }

    /// Encode for the given command.
    ///
    /// Fails with the [`SdmField`] naming the first field whose governing
    /// flag is set but whose value is unset.
    pub fn encode(&self, mode: EncodeMode) -> Result<Vec<u8>, FileSettingsError> {
        let mut buffer = Vec::with_capacity(32);

        if mode == EncodeMode::GetFileSettings {
            buffer.push(self.file_type);
        }

        let sdm_mask = if self.sdm_enabled { 0b0100_0000 } else { 0 };
        let mode_mask = match self.communication_mode {
            CommunicationMode::Plain => 0b00,
            CommunicationMode::Mac => 0b01,
            CommunicationMode::Full => 0b11,
        };
        buffer.push(sdm_mask | mode_mask);

        buffer.push(self.read_write_permission.nibble() << 4 | self.change_permission.nibble());
        buffer.push(self.read_permission.nibble() << 4 | self.write_permission.nibble());

        if mode == EncodeMode::GetFileSettings {
            buffer.extend_from_slice(&util::write_le24(self.file_size));
        }

        if self.sdm_enabled && self.has_sdm_config() {
            let mut sdm_options = 0u8;
            if self.sdm_option_uid {
                sdm_options |= 0b1000_0000;
            }
            if self.sdm_option_read_counter {
                sdm_options |= 0b0100_0000;
            }
            if self.sdm_option_read_counter_limit {
                sdm_options |= 0b0010_0000;
            }
            if self.sdm_option_encrypt_file_data {
                sdm_options |= 0b0001_0000;
            }
            if self.sdm_option_use_ascii {
                sdm_options |= 0b0000_0001;
            }
            buffer.push(sdm_options);

            buffer.push(0xf0 | self.sdm_read_counter_retrieval_permission.nibble());
            buffer.push(
                self.sdm_meta_read_permission.nibble() << 4
                    | self.sdm_file_read_permission.nibble(),
            );

            for field in self.sdm_field_order() {
                match *self.field_slot_ref(field) {
                    Some(value) => buffer.extend_from_slice(&util::write_le24(value)),
                    None => return Err(FileSettingsError::MissingField(field)),
                }
            }
        }

        Ok(buffer)
    }

    /// The conditional SDM fields present under the current flags, in wire
    /// order. Decode and encode both walk this plan.
    fn sdm_field_order(&self) -> Vec<SdmField> {
        let mut order = Vec::new();
        if self.sdm_meta_read_permission == Permission::All {
            if self.sdm_option_uid {
                order.push(SdmField::UidOffset);
            }
            if self.sdm_option_read_counter {
                order.push(SdmField::ReadCounterOffset);
            }
        } else if self.sdm_meta_read_permission != Permission::None {
            order.push(SdmField::PiccDataOffset);
        }
        if self.sdm_file_read_permission != Permission::None {
            order.push(SdmField::MacInputOffset);
            if self.sdm_option_encrypt_file_data {
                order.push(SdmField::EncOffset);
                order.push(SdmField::EncLength);
            }
            order.push(SdmField::MacOffset);
        }
        if self.sdm_option_read_counter_limit {
            order.push(SdmField::ReadCounterLimit);
        }
        order
    }

    fn field_slot(&mut self, field: SdmField) -> &mut Option<u32> {
        match field {
            SdmField::UidOffset => &mut self.sdm_uid_offset,
            SdmField::ReadCounterOffset => &mut self.sdm_read_counter_offset,
            SdmField::PiccDataOffset => &mut self.sdm_picc_data_offset,
            SdmField::MacInputOffset => &mut self.sdm_mac_input_offset,
            SdmField::EncOffset => &mut self.sdm_enc_offset,
            SdmField::EncLength => &mut self.sdm_enc_length,
            SdmField::MacOffset => &mut self.sdm_mac_offset,
            SdmField::ReadCounterLimit => &mut self.sdm_read_counter_limit,
        }
    }

    fn field_slot_ref(&self, field: SdmField) -> &Option<u32> {
        match field {
            SdmField::UidOffset => &self.sdm_uid_offset,
            SdmField::ReadCounterOffset => &self.sdm_read_counter_offset,
            SdmField::PiccDataOffset => &self.sdm_picc_data_offset,
            SdmField::MacInputOffset => &self.sdm_mac_input_offset,
            SdmField::EncOffset => &self.sdm_enc_offset,
            SdmField::EncLength => &self.sdm_enc_length,
            SdmField::MacOffset => &self.sdm_mac_offset,
            SdmField::ReadCounterLimit => &self.sdm_read_counter_limit,
        }
    }

    /// Whether any SDM option or permission departs from the all-off
    /// defaults. When nothing does, the SDM sub-header is omitted.
    fn has_sdm_config(&self) -> bool {
        self.sdm_option_uid
            || self.sdm_option_read_counter
            || self.sdm_option_read_counter_limit
            || self.sdm_option_encrypt_file_data
            || self.sdm_option_use_ascii
            || self.sdm_meta_read_permission != Permission::None
            || self.sdm_file_read_permission != Permission::None
            || self.sdm_read_counter_retrieval_permission != Permission::None
    }

    /// Factory settings of file 1, the capability container.
    pub fn factory_capability_container() -> Self {
        Self {
            read_permission: Permission::All,
            write_permission: Permission::Key0,
            read_write_permission: Permission::Key0,
            change_permission: Permission::Key0,
            file_size: 32,
            ..Self::default()
        }
    }

    /// Factory settings of file 2, the NDEF file.
    pub fn factory_ndef() -> Self {
        Self {
            read_permission: Permission::All,
            write_permission: Permission::All,
            read_write_permission: Permission::All,
            change_permission: Permission::Key0,
            file_size: 256,
            ..Self::default()
        }
    }

    /// Factory settings of file 3, the proprietary file.
    pub fn factory_proprietary() -> Self {
        Self {
            communication_mode: CommunicationMode::Full,
            read_permission: Permission::Key2,
            write_permission: Permission::Key3,
            read_write_permission: Permission::Key3,
            change_permission: Permission::Key0,
            file_size: 128,
            ..Self::default()
        }
    }
}
