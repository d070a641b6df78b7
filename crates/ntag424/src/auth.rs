//! EV2First mutual authentication.
//!
//! Two native commands: the opener (0x71) names the key slot and gets back
//! the chip's encrypted challenge; the closer (0xAF) answers with our own
//! challenge plus the chip's rotated one, and the chip's reply proves it
//! holds the key and carries the transaction identifier. On success the
//! session keys are derived and installed atomically; on any failure the
//! session is left untouched.

use rand::RngCore;
use tracing::debug;

use crate::communicator::DnaCommunicator;
use crate::constants::{ins, status};
use crate::crypto::{aes_cbc_decrypt, aes_cbc_encrypt, AesSessionCrypto, ZERO_IV};
use crate::error::{AuthError, Error, Result};
use crate::transport::CardTransport;
use crate::types::KeySpecifier;
use crate::util;

impl<T: CardTransport> DnaCommunicator<T> {
    /// Run the EV2First handshake with `key_data` for the given slot.
    ///
    /// A stage-1 status of 0x91AD means the chip asked for a retry; this is
    /// surfaced as [`AuthError::UnsupportedRetry`] and never retried here.
    pub fn authenticate_ev2_first(&mut self, key: KeySpecifier, key_data: &[u8]) -> Result<()> {
        let key_data: &[u8; 16] = key_data
            .try_into()
            .map_err(|_| Error::InvalidParameter("authentication key must be 16 bytes"))?;

        // Stage 1: request the chip's challenge.
        let reply = self.native_command(ins::AUTH_EV2_FIRST, &[key.number(), 0x00], &[], None)?;
        if reply.major != status::MAJOR_OK {
            return Err(Error::UnexpectedStatus {
                major: reply.major,
                minor: reply.minor,
            });
        }
        if reply.minor == status::MINOR_AUTH_RETRY {
            debug!(slot = key.number(), "chip requested authentication retry");
            return Err(AuthError::UnsupportedRetry.into());
        }
        if reply.minor != status::MINOR_ADDITIONAL_FRAME {
            return Err(Error::UnexpectedStatus {
                major: reply.major,
                minor: reply.minor,
            });
        }
        let challenge_b: [u8; 16] = aes_cbc_decrypt(key_data, &ZERO_IV, &reply.data)?
            .try_into()
            .map_err(|_| Error::MalformedResponse("stage-1 challenge must be 16 bytes"))?;

        // Stage 2: answer with our challenge and the chip's, rotated.
        let mut challenge_a = [0u8; 16];
        rand::rng().fill_bytes(&mut challenge_a);

        let mut combined = Vec::with_capacity(32);
        combined.extend_from_slice(&challenge_a);
        combined.extend_from_slice(&util::rotate_left(&challenge_b));
        let combined = aes_cbc_encrypt(key_data, &ZERO_IV, &combined)?;

        let reply = self.native_command(ins::ADDITIONAL_FRAME, &combined, &[], None)?;
        if reply.major != status::MAJOR_OK || reply.minor != status::MINOR_OK {
            return Err(Error::UnexpectedStatus {
                major: reply.major,
                minor: reply.minor,
            });
        }
        if reply.data.len() != 32 {
            return Err(Error::MalformedResponse("stage-2 payload must be 32 bytes"));
        }
        let plain = aes_cbc_decrypt(key_data, &ZERO_IV, &reply.data)?;

        let mut transaction_id = [0u8; 4];
        transaction_id.copy_from_slice(&plain[0..4]);
        let challenge_a_rotated = &plain[4..20];
        let pd_cap = &plain[20..26];
        let pc_cap = &plain[26..32];

        if util::rotate_right(challenge_a_rotated) != challenge_a {
            return Err(AuthError::ChallengeMismatch.into());
        }
        debug!(
            ti = %hex::encode(transaction_id),
            pd_cap = %hex::encode(pd_cap),
            pc_cap = %hex::encode(pc_cap),
            "authenticated"
        );

        let crypto = AesSessionCrypto::derive(key_data, &challenge_a, &challenge_b);
        self.activate_session(key, transaction_id, Box::new(crypto));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    const KEY: [u8; 16] = [0u8; 16];

    fn communicator() -> DnaCommunicator<MockTransport> {
        DnaCommunicator::new(MockTransport::new())
    }

    #[test]
    fn rejects_short_keys() {
        let mut comm = communicator();
        let err = comm
            .authenticate_ev2_first(KeySpecifier::Key0, &[0u8; 8])
            .expect_err("short key");
        assert!(matches!(err, Error::InvalidParameter(_)));
        assert!(comm.transport_mut().commands.is_empty());
    }

    #[test]
    fn stage_one_opener_names_the_slot() {
        let mut comm = communicator();
        comm.transport_mut().push_response(&[], 0x6a, 0x82);
        let _ = comm.authenticate_ev2_first(KeySpecifier::Key3, &KEY);
        assert_eq!(
            comm.transport_mut().commands[0],
            vec![0x90, 0x71, 0x00, 0x00, 0x02, 0x03, 0x00, 0x00]
        );
    }

    #[test]
    fn retry_status_is_a_distinct_fatal_error() {
        let mut comm = communicator();
        comm.transport_mut().push_response(&[], 0x91, 0xad);
        let err = comm
            .authenticate_ev2_first(KeySpecifier::Key0, &KEY)
            .expect_err("retry requested");
        assert!(matches!(
            err,
            Error::Authentication(AuthError::UnsupportedRetry)
        ));
        // Exactly one command went out: no automatic retry.
        assert_eq!(comm.transport_mut().commands.len(), 1);
        assert!(!comm.is_authenticated());
    }

    #[test]
    fn bad_stage_one_statuses_carry_both_bytes() {
        let mut comm = communicator();
        comm.transport_mut().push_response(&[], 0x6f, 0x00);
        let err = comm
            .authenticate_ev2_first(KeySpecifier::Key0, &KEY)
            .expect_err("bad major");
        assert!(matches!(err, Error::UnexpectedStatus { major: 0x6f, .. }));

        comm.transport_mut().push_response(&[], 0x91, 0x1e);
        let err = comm
            .authenticate_ev2_first(KeySpecifier::Key0, &KEY)
            .expect_err("bad minor");
        assert!(matches!(
            err,
            Error::UnexpectedStatus {
                major: 0x91,
                minor: 0x1e
            }
        ));
    }

    #[test]
    fn stage_one_challenge_must_be_one_block() {
        let mut comm = communicator();
        comm.transport_mut().push_response(&[0u8; 8], 0x91, 0xaf);
        let err = comm
            .authenticate_ev2_first(KeySpecifier::Key0, &KEY)
            .expect_err("short challenge");
        assert!(matches!(err, Error::Crypto(_) | Error::MalformedResponse(_)));
    }

    #[test]
    fn wrong_challenge_echo_fails_authentication() {
        let mut comm = communicator();
        // Stage 1: a valid-looking encrypted challenge.
        comm.transport_mut().push_response(
            &aes_cbc_encrypt(&KEY, &ZERO_IV, &[0x42u8; 16]).expect("encrypt"),
            0x91,
            0xaf,
        );
        // Stage 2: structurally valid but cannot echo our random challenge.
        comm.transport_mut().push_response(
            &aes_cbc_encrypt(&KEY, &ZERO_IV, &[0u8; 32]).expect("encrypt"),
            0x91,
            0x00,
        );

        let err = comm
            .authenticate_ev2_first(KeySpecifier::Key0, &KEY)
            .expect_err("challenge mismatch");
        assert!(matches!(
            err,
            Error::Authentication(AuthError::ChallengeMismatch)
        ));
        assert!(!comm.is_authenticated());
        assert_eq!(comm.active_key(), None);
    }
}
