// Copyright 2025 BotForge contributors
//
//    Licensed under the Apache License, Version 2.0 (the "License");
//    you may not use this file except in compliance with the License.
//    You may obtain a copy of the License at
//
//        http://www.apache.org/licenses/LICENSE-2.0
//
//    Unless required by applicable law or agreed to in writing, software
//    distributed under the License is distributed on an "AS IS" BASIS,
//    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//    See the License for the specific language governing permissions and
//    limitations under the License.

//! Deterministic encryption for bot credentials at rest.
//!
//! # Description
//!
//! Credentials are stored encrypted, but the store still has to answer
//! "which row holds this credential" with a plain equality query. A random
//! nonce would make every encryption of the same credential differ, so the
//! nonce is *synthesised* from the key and the plaintext: equal inputs
//! produce equal ciphertexts, and the AEAD tag still authenticates the
//! stored value. The sealed form is `hex(nonce || ciphertext)`.
//!
//! The trade-off is the usual one for deterministic schemes: an observer of
//! the table can tell whether two rows hold the same credential. Credentials
//! are high-entropy upstream tokens, so dictionary attacks against the
//! ciphertext column are not a practical concern.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use sha2::{Digest, Sha256};

use crate::errors::CryptoError;

/// AES-GCM nonce width in bytes.
const NONCE_LEN: usize = 12;

/// Deterministic AEAD keyed by the process-wide 32-byte secret.
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
    key: [u8; 32],
}

impl CredentialCipher {
    /// Build the cipher from the configured key material.
    ///
    /// Accepts either 64 hex characters or 32 raw bytes; anything else is a
    /// boot-time failure.
    pub fn new(key_material: &str) -> Result<Self, CryptoError> {
        let bytes = if key_material.len() == 64 {
            hex::decode(key_material)?
        } else {
            key_material.as_bytes().to_vec()
        };

        let key: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::BadKeyLength)?;

        Ok(Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
            key,
        })
    }

    /// Synthetic nonce: SHA-256(key || plaintext) truncated to 96 bits.
    fn nonce_for(&self, plaintext: &[u8]) -> [u8; NONCE_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(self.key);
        hasher.update(plaintext);
        let digest = hasher.finalize();

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&digest[..NONCE_LEN]);
        nonce
    }

    /// Encrypt a credential. Equal inputs yield equal outputs.
    pub fn seal(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce = self.nonce_for(plaintext.as_bytes());
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| CryptoError::Integrity)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);

        Ok(hex::encode(sealed))
    }

    /// Decrypt a stored credential. A failure here is a data-integrity
    /// fault: the caller must abort the operation rather than fall back to
    /// the ciphertext.
    pub fn open(&self, sealed: &str) -> Result<String, CryptoError> {
        let raw = hex::decode(sealed)?;
        if raw.len() <= NONCE_LEN {
            return Err(CryptoError::Truncated);
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Integrity)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::BadPlaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TEST_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn cipher() -> CredentialCipher {
        CredentialCipher::new(TEST_KEY).expect("Failed to build the test cipher")
    }

    #[test]
    fn round_trip_recovers_the_credential() {
        let c = cipher();
        let credential = "7512345678:AAHk3vXq9yPzW0eRtY2uIoP1aSdF4gHj5kL";

        let sealed = c.seal(credential).expect("Failed to seal");
        assert_eq!(c.open(&sealed).expect("Failed to open"), credential);
    }

    #[test]
    fn sealing_is_deterministic() {
        let c = cipher();
        let credential = "42:averylongsecretpartofthetokenvalue123";

        let first = c.seal(credential).expect("Failed to seal");
        let second = c.seal(credential).expect("Failed to seal");
        assert_eq!(first, second);
    }

    #[test]
    fn distinct_credentials_seal_differently() {
        let c = cipher();
        let a = c.seal("1:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        let b = c.seal("2:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_ciphertext_is_an_integrity_fault() {
        let c = cipher();
        let mut sealed = c.seal("9:tttttttttttttttttttttttttttttttt").unwrap();
        // Flip the last hex digit.
        let flipped = if sealed.ends_with('0') { '1' } else { '0' };
        sealed.pop();
        sealed.push(flipped);

        assert!(matches!(c.open(&sealed), Err(CryptoError::Integrity)));
    }

    #[test]
    fn raw_32_byte_key_is_accepted() {
        let c = CredentialCipher::new("this-is-a-32-byte-test-keyvalue!");
        assert!(c.is_ok());
    }

    #[test]
    fn short_key_is_rejected() {
        assert!(matches!(
            CredentialCipher::new("too-short"),
            Err(CryptoError::BadKeyLength)
        ));
    }
}
