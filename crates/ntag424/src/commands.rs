//! File, key and chip-information commands.

use bytes::Bytes;
use tracing::warn;

use crate::communicator::DnaCommunicator;
use crate::constants::ins;
use crate::crypto::crc32_jam;
use crate::error::{Error, Result};
use crate::file_settings::{EncodeMode, FileSettings};
use crate::transport::CardTransport;
use crate::types::{CommunicationMode, FileSpecifier, KeySpecifier};
use crate::util;

fn le24_checked(value: u32, what: &'static str) -> Result<[u8; 3]> {
    if value > 0x00ff_ffff {
        return Err(Error::InvalidParameter(what));
    }
    Ok(util::write_le24(value))
}

impl<T: CardTransport> DnaCommunicator<T> {
    /// Read the chip's permanent 7-byte UID. Requires an authenticated
    /// session; always runs in full communication mode.
    pub fn get_chip_uid(&mut self) -> Result<[u8; 7]> {
        let reply = self.encrypted_command(ins::GET_CARD_UID, &[], &[])?;
        let uid: [u8; 7] = reply
            .data
            .get(..7)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(Error::MalformedResponse("chip UID must be 7 bytes"))?;
        Ok(uid)
    }

    /// Read `length` bytes from a file, in the mode the file is
    /// configured for.
    pub fn read_file_data(
        &mut self,
        file: FileSpecifier,
        offset: u32,
        length: u32,
        mode: CommunicationMode,
    ) -> Result<Bytes> {
        let mut header = vec![file.number()];
        header.extend_from_slice(&le24_checked(offset, "read offset exceeds 24 bits")?);
        header.extend_from_slice(&le24_checked(length, "read length exceeds 24 bits")?);
        let reply = self.switched_command(mode, ins::READ_DATA, &header, &[])?;
        Ok(reply.data)
    }

    /// Write bytes into a file at the given offset, in the mode the file is
    /// configured for.
    pub fn write_file_data(
        &mut self,
        file: FileSpecifier,
        offset: u32,
        data: &[u8],
        mode: CommunicationMode,
    ) -> Result<()> {
        let length = u32::try_from(data.len())
            .map_err(|_| Error::InvalidParameter("write length exceeds 24 bits"))?;
        let mut header = vec![file.number()];
        header.extend_from_slice(&le24_checked(offset, "write offset exceeds 24 bits")?);
        header.extend_from_slice(&le24_checked(length, "write length exceeds 24 bits")?);
        self.switched_command(mode, ins::WRITE_DATA, &header, data)?;
        Ok(())
    }

    /// Read and decode a file's settings. MAC mode per the datasheet.
    pub fn get_file_settings(&mut self, file: FileSpecifier) -> Result<FileSettings> {
        let reply = self.mac_command(ins::GET_FILE_SETTINGS, &[file.number()], &[])?;
        Ok(FileSettings::decode(&reply.data)?)
    }

    /// Reconfigure a file's access and SDM settings. Full mode, so this
    /// requires a session authenticated with the file's change key.
    pub fn change_file_settings(
        &mut self,
        file: FileSpecifier,
        settings: &FileSettings,
    ) -> Result<()> {
        let data = settings.encode(EncodeMode::ChangeFileSettings)?;
        self.encrypted_command(ins::CHANGE_FILE_SETTINGS, &[file.number()], &data)?;
        Ok(())
    }

    /// Read the version byte of a key slot.
    pub fn get_key_version(&mut self, key: KeySpecifier) -> Result<u8> {
        let reply = self.mac_command(ins::GET_KEY_VERSION, &[key.number()], &[])?;
        Ok(reply.data.first().copied().unwrap_or(0))
    }

    /// Replace a key. Changing the master key sends the new key directly;
    /// other slots send old-XOR-new plus a CRC of the new key so the chip
    /// can validate without exposing either.
    pub fn change_key(
        &mut self,
        key: KeySpecifier,
        old_key: &[u8; 16],
        new_key: &[u8; 16],
        version: u8,
    ) -> Result<()> {
        if self.active_key() != Some(KeySpecifier::Key0) {
            warn!("changing keys while not authenticated as key 0 may be refused by the chip");
        }

        let mut data;
        if key == KeySpecifier::Key0 {
            data = new_key.to_vec();
            data.push(version);
        } else {
            data = util::xor(old_key, new_key);
            data.push(version);
            data.extend_from_slice(&crc32_jam(new_key));
        }

        self.encrypted_command(ins::CHANGE_KEY, &[key.number()], &data)?;
        Ok(())
    }

    /// ISO SelectFile by 2-byte file identifier. The NDEF application
    /// answers this outside the native command set, so the status words are
    /// not interpreted here.
    pub fn select_file_by_id(&mut self, file_id: u16) -> Result<()> {
        let id = file_id.to_be_bytes();
        let packet = [0x00, 0xa4, 0x00, 0x0c, 0x02, id[0], id[1], 0x00];
        self.transceive(&packet)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::testing::MockSessionCrypto;
    use crate::transport::MockTransport;
    use hex_literal::hex;

    const TI: [u8; 4] = [1, 2, 3, 4];

    fn authenticated() -> DnaCommunicator<MockTransport> {
        let mut comm = DnaCommunicator::new(MockTransport::new());
        comm.activate_session(KeySpecifier::Key0, TI, Box::new(MockSessionCrypto));
        comm
    }

    /// Payload ‖ valid mock MAC for a 0x9100 response at post-send counter 1.
    fn ok_response(payload: &[u8]) -> Vec<u8> {
        let mut input = vec![0x00, 0x01, 0x00];
        input.extend_from_slice(&TI);
        input.extend_from_slice(payload);
        let mut response = payload.to_vec();
        response.extend_from_slice(&MockSessionCrypto::mock_mac(&input));
        response
    }

    #[test]
    fn read_header_packs_file_offset_and_length() {
        let mut comm = DnaCommunicator::new(MockTransport::new());
        comm.transport_mut().push_response(&[0xab; 4], 0x91, 0x00);
        let data = comm
            .read_file_data(FileSpecifier::Ndef, 0x20, 4, CommunicationMode::Plain)
            .expect("read");
        assert_eq!(&data[..], &[0xab; 4]);
        assert_eq!(
            comm.transport_mut().commands[0],
            vec![0x90, 0xad, 0x00, 0x00, 0x07, 0x02, 0x20, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn oversized_offsets_are_rejected() {
        let mut comm = DnaCommunicator::new(MockTransport::new());
        let err = comm
            .read_file_data(FileSpecifier::Ndef, 0x0100_0000, 4, CommunicationMode::Plain)
            .expect_err("24-bit overflow");
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn write_sends_header_then_data() {
        let mut comm = DnaCommunicator::new(MockTransport::new());
        comm.transport_mut().push_response(&[], 0x91, 0x00);
        comm.write_file_data(
            FileSpecifier::CapabilityContainer,
            1,
            &[0xde, 0xad],
            CommunicationMode::Plain,
        )
        .expect("write");
        assert_eq!(
            comm.transport_mut().commands[0],
            vec![0x90, 0x8d, 0x00, 0x00, 0x09, 0x01, 0x01, 0x00, 0x00, 0x02, 0x00, 0x00, 0xde, 0xad, 0x00]
        );
    }

    #[test]
    fn file_settings_round_trip_over_mac_mode() {
        let mut comm = authenticated();
        let encoded = FileSettings::factory_ndef()
            .encode(EncodeMode::GetFileSettings)
            .expect("encode");
        let response = ok_response(&encoded);
        comm.transport_mut().push_response(&response, 0x91, 0x00);

        let settings = comm
            .get_file_settings(FileSpecifier::Ndef)
            .expect("get settings");
        assert_eq!(settings, FileSettings::factory_ndef());
        assert_eq!(comm.transport_mut().commands[0][1], 0xf5);
    }

    #[test]
    fn change_file_settings_encrypts_the_encoding() {
        let mut comm = authenticated();
        comm.transport_mut().push_response(&[], 0x91, 0x00);
        let settings = FileSettings::factory_ndef();
        comm.change_file_settings(FileSpecifier::Ndef, &settings)
            .expect("change settings");

        let expected: Vec<u8> = settings
            .encode(EncodeMode::ChangeFileSettings)
            .expect("encode")
            .iter()
            .map(|b| b ^ 0xaa)
            .collect();
        let sent = &comm.transport_mut().commands[0];
        assert_eq!(sent[1], 0x5f);
        assert_eq!(sent[5], 0x02);
        assert_eq!(&sent[6..6 + expected.len()], &expected[..]);
    }

    #[test]
    fn key_version_defaults_to_zero_on_empty_payload() {
        let mut comm = authenticated();
        comm.transport_mut().push_response(&[], 0x91, 0x00);
        assert_eq!(
            comm.get_key_version(KeySpecifier::Key2).expect("version"),
            0
        );

        let mut comm = authenticated();
        let response = ok_response(&[0x07]);
        comm.transport_mut().push_response(&response, 0x91, 0x00);
        assert_eq!(
            comm.get_key_version(KeySpecifier::Key2).expect("version"),
            7
        );
    }

    #[test]
    fn master_key_change_sends_the_new_key_directly() {
        let mut comm = authenticated();
        comm.transport_mut().push_response(&[], 0x91, 0x00);
        let new_key = hex!("404142434445464748494a4b4c4d4e4f");
        comm.change_key(KeySpecifier::Key0, &[0u8; 16], &new_key, 1)
            .expect("change key");

        let mut expected = new_key.to_vec();
        expected.push(0x01);
        let wire: Vec<u8> = expected.iter().map(|b| b ^ 0xaa).collect();
        let sent = &comm.transport_mut().commands[0];
        assert_eq!(sent[1], 0xc4);
        assert_eq!(sent[5], 0x00);
        assert_eq!(&sent[6..6 + wire.len()], &wire[..]);
    }

    #[test]
    fn other_key_changes_carry_xor_and_crc() {
        let mut comm = authenticated();
        comm.transport_mut().push_response(&[], 0x91, 0x00);
        let old_key = hex!("000102030405060708090a0b0c0d0e0f");
        let new_key = hex!("404142434445464748494a4b4c4d4e4f");
        comm.change_key(KeySpecifier::Key1, &old_key, &new_key, 2)
            .expect("change key");

        let mut expected = util::xor(&old_key, &new_key);
        expected.push(0x02);
        expected.extend_from_slice(&crc32_jam(&new_key));
        let wire: Vec<u8> = expected.iter().map(|b| b ^ 0xaa).collect();
        let sent = &comm.transport_mut().commands[0];
        assert_eq!(sent[5], 0x01);
        assert_eq!(&sent[6..6 + wire.len()], &wire[..]);
    }

    #[test]
    fn chip_uid_is_decrypted_from_full_mode() {
        let mut comm = authenticated();
        let uid = hex!("048d58d2142290");
        let wire_payload: Vec<u8> = uid.iter().map(|b| b ^ 0xaa).collect();
        let response = ok_response(&wire_payload);
        comm.transport_mut().push_response(&response, 0x91, 0x00);

        assert_eq!(comm.get_chip_uid().expect("uid"), uid);
    }

    #[test]
    fn select_file_ignores_status_words() {
        let mut comm = DnaCommunicator::new(MockTransport::new());
        comm.transport_mut().push_response(&[], 0x6a, 0x82);
        comm.select_file_by_id(0xe104).expect("select");
        assert_eq!(
            comm.transport_mut().commands[0],
            vec![0x00, 0xa4, 0x00, 0x0c, 0x02, 0xe1, 0x04, 0x00]
        );
    }
}
