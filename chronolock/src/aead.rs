//! Payload encryption for individual chunks.
//!
//! AES-256-GCM under the session DEK, one fresh random nonce per call,
//! nonce prepended to the ciphertext. Reusing the DEK across the chunks of
//! a session is safe exactly because every invocation draws its own nonce.

use crate::errors::{CryptoError, Error};
use crate::{Decrypter, Encrypter};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// Constant number of bytes a chunk grows by when encrypted.
pub const OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// The default chunk cipher.
pub struct Cipher;

fn cipher(key: &[u8]) -> Result<Aes256Gcm, Error> {
    Aes256Gcm::new_from_slice(key).map_err(|_| {
        CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            got: key.len(),
        }
        .into()
    })
}

impl Encrypter for Cipher {
    fn encrypt(&self, key: &[u8], plain: &[u8]) -> Result<Vec<u8>, Error> {
        let cipher = cipher(key)?;

        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.try_fill_bytes(&mut nonce)?;

        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plain)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }
}

impl Decrypter for Cipher {
    fn decrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
        if data.len() < OVERHEAD {
            return Err(CryptoError::AuthenticationFailed.into());
        }
        let cipher = cipher(key)?;
        let (nonce, sealed) = data.split_at(NONCE_SIZE);
        cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CryptoError::AuthenticationFailed.into())
    }
}
