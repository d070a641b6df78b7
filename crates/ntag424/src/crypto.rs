//! Crypto primitives adapter and session crypto.
//!
//! Thin wrappers over the RustCrypto AES/CMAC implementations, plus the
//! [`SessionCrypto`] seam through which an authenticated session encrypts,
//! decrypts and MACs command traffic. The production implementation,
//! [`AesSessionCrypto`], derives its keys per the EV2 secure-messaging rules
//! of the NT4H2421Gx datasheet (see AN12196).

use aes::Aes128;
use cipher::block_padding::NoPadding;
use cipher::{BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit};
use cmac::{Cmac, Mac};
use zeroize::Zeroize;

use crate::util;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// All-zero IV used by the plain authentication exchanges.
pub const ZERO_IV: [u8; 16] = [0u8; 16];

/// Errors from the raw primitives. The engine validates lengths before
/// calling in, so these mostly signal malformed chip responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// Input was empty or not a multiple of the AES block size.
    #[error("data length is not a multiple of the AES block size")]
    BlockSize,
    /// Decrypted data did not carry valid padding.
    #[error("invalid message padding")]
    Padding,
}

/// AES-128 CBC encrypt without padding. `data` must be block-aligned.
pub fn aes_cbc_encrypt(
    key: &[u8; 16],
    iv: &[u8; 16],
    data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if data.is_empty() || data.len() % 16 != 0 {
        return Err(CryptoError::BlockSize);
    }
    let mut buf = data.to_vec();
    let len = buf.len();
    Aes128CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .map_err(|_| CryptoError::BlockSize)?;
    Ok(buf)
}

/// AES-128 CBC decrypt without padding. `data` must be block-aligned.
pub fn aes_cbc_decrypt(
    key: &[u8; 16],
    iv: &[u8; 16],
    data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if data.is_empty() || data.len() % 16 != 0 {
        return Err(CryptoError::BlockSize);
    }
    let mut buf = data.to_vec();
    Aes128CbcDec::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| CryptoError::BlockSize)?;
    Ok(buf)
}

/// AES-128 ECB encrypt without padding.
pub fn aes_ecb_encrypt(key: &[u8; 16], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.is_empty() || data.len() % 16 != 0 {
        return Err(CryptoError::BlockSize);
    }
    let cipher = Aes128::new(key.into());
    let mut out = data.to_vec();
    for block in out.chunks_exact_mut(16) {
        cipher.encrypt_block(aes::Block::from_mut_slice(block));
    }
    Ok(out)
}

/// AES-128 ECB decrypt without padding.
pub fn aes_ecb_decrypt(key: &[u8; 16], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.is_empty() || data.len() % 16 != 0 {
        return Err(CryptoError::BlockSize);
    }
    let cipher = Aes128::new(key.into());
    let mut out = data.to_vec();
    for block in out.chunks_exact_mut(16) {
        cipher.decrypt_block(aes::Block::from_mut_slice(block));
    }
    Ok(out)
}

/// Full 16-byte AES-CMAC.
pub fn aes_cmac(key: &[u8; 16], data: &[u8]) -> [u8; 16] {
    let mut mac = <Cmac<Aes128> as Mac>::new(key.into());
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Truncate a 16-byte CMAC to the 8 odd-indexed bytes, the form the chip
/// puts on the wire (MACt in the datasheet).
pub const fn truncate_mac(full: &[u8; 16]) -> [u8; 8] {
    [
        full[1], full[3], full[5], full[7], full[9], full[11], full[13], full[15],
    ]
}

/// 8-byte truncated AES-CMAC.
pub fn aes_cmac_short(key: &[u8; 16], data: &[u8]) -> [u8; 8] {
    truncate_mac(&aes_cmac(key, data))
}

/// CRC32 in the "JAMCRC" form the chip expects: standard CRC-32 with the
/// final complement undone, serialized little-endian.
pub fn crc32_jam(data: &[u8]) -> [u8; 4] {
    (crc32fast::hash(data) ^ 0xffff_ffff).to_le_bytes()
}

/// Per-session encryption and authentication.
///
/// One implementation talks real AES under session keys; tests substitute a
/// deterministic double so the transport and authentication logic can be
/// exercised without cryptography.
pub trait SessionCrypto: std::fmt::Debug + Send {
    /// Encrypt outgoing command data.
    fn encrypt_data(
        &self,
        transaction_id: &[u8; 4],
        counter: u16,
        message: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt response data.
    fn decrypt_data(
        &self,
        transaction_id: &[u8; 4],
        counter: u16,
        message: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Truncated MAC over an already-assembled MAC input.
    fn generate_mac(&self, message: &[u8]) -> [u8; 8];
}

/// Production [`SessionCrypto`] holding the EV2 session keys.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct AesSessionCrypto {
    enc_key: [u8; 16],
    mac_key: [u8; 16],
}

impl std::fmt::Debug for AesSessionCrypto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        f.debug_struct("AesSessionCrypto").finish_non_exhaustive()
    }
}

impl AesSessionCrypto {
    /// Derive session keys from the authentication key and the two
    /// challenges exchanged during EV2First.
    ///
    /// SV1 = A5 5A 00 01 00 80 ‖ A[0..2] ‖ (A[2..8] ⊕ B[0..6]) ‖ B[6..16] ‖ A[8..16]
    /// SV2 = 5A A5 00 01 00 80 ‖ (same tail)
    ///
    /// SesAuthEncKey = CMAC(key, SV1), SesAuthMacKey = CMAC(key, SV2).
    pub fn derive(key: &[u8; 16], challenge_a: &[u8; 16], challenge_b: &[u8; 16]) -> Self {
        let mut tail = Vec::with_capacity(26);
        tail.extend_from_slice(&challenge_a[0..2]);
        tail.extend_from_slice(&util::xor(&challenge_a[2..8], &challenge_b[0..6]));
        tail.extend_from_slice(&challenge_b[6..16]);
        tail.extend_from_slice(&challenge_a[8..16]);

        let mut sv1 = vec![0xa5, 0x5a, 0x00, 0x01, 0x00, 0x80];
        sv1.extend_from_slice(&tail);
        let mut sv2 = vec![0x5a, 0xa5, 0x00, 0x01, 0x00, 0x80];
        sv2.extend_from_slice(&tail);

        Self {
            enc_key: aes_cmac(key, &sv1),
            mac_key: aes_cmac(key, &sv2),
        }
    }

    /// Build from explicit session keys, bypassing derivation.
    #[cfg(test)]
    pub(crate) fn from_keys(enc_key: [u8; 16], mac_key: [u8; 16]) -> Self {
        Self { enc_key, mac_key }
    }

    /// Command-data IV: E(SesAuthEncKey, label ‖ TI ‖ counter LE ‖ 0*8).
    fn data_iv(
        &self,
        label: [u8; 2],
        transaction_id: &[u8; 4],
        counter: u16,
    ) -> Result<[u8; 16], CryptoError> {
        let mut input = [0u8; 16];
        input[0..2].copy_from_slice(&label);
        input[2..6].copy_from_slice(transaction_id);
        input[6..8].copy_from_slice(&counter.to_le_bytes());
        let block = aes_ecb_encrypt(&self.enc_key, &input)?;
        let mut iv = [0u8; 16];
        iv.copy_from_slice(&block);
        Ok(iv)
    }
}

impl SessionCrypto for AesSessionCrypto {
    fn encrypt_data(
        &self,
        transaction_id: &[u8; 4],
        counter: u16,
        message: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let iv = self.data_iv([0xa5, 0x5a], transaction_id, counter)?;
        aes_cbc_encrypt(&self.enc_key, &iv, &util::pad_message(message))
    }

    fn decrypt_data(
        &self,
        transaction_id: &[u8; 4],
        counter: u16,
        message: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let iv = self.data_iv([0x5a, 0xa5], transaction_id, counter)?;
        let plain = aes_cbc_decrypt(&self.enc_key, &iv, message)?;
        util::unpad_message(&plain)
            .map(<[u8]>::to_vec)
            .ok_or(CryptoError::Padding)
    }

    fn generate_mac(&self, message: &[u8]) -> [u8; 8] {
        aes_cmac_short(&self.mac_key, message)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Deterministic stand-in: XOR "encryption" and a fold-based MAC.
    /// Lets transport and authentication tests assert exact bytes without
    /// real key material.
    #[derive(Debug, Clone, Copy)]
    pub(crate) struct MockSessionCrypto;

    impl MockSessionCrypto {
        pub(crate) fn mock_mac(message: &[u8]) -> [u8; 8] {
            let mut mac = [0u8; 8];
            for (i, b) in message.iter().enumerate() {
                mac[i % 8] ^= b;
            }
            mac
        }
    }

    impl SessionCrypto for MockSessionCrypto {
        fn encrypt_data(
            &self,
            _transaction_id: &[u8; 4],
            _counter: u16,
            message: &[u8],
        ) -> Result<Vec<u8>, CryptoError> {
            Ok(message.iter().map(|b| b ^ 0xaa).collect())
        }

        fn decrypt_data(
            &self,
            _transaction_id: &[u8; 4],
            _counter: u16,
            message: &[u8],
        ) -> Result<Vec<u8>, CryptoError> {
            Ok(message.iter().map(|b| b ^ 0xaa).collect())
        }

        fn generate_mac(&self, message: &[u8]) -> [u8; 8] {
            Self::mock_mac(message)
        }
    }
}
