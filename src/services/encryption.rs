// Field-level encryption for client contact details. Stored form is
// base64(nonce || ciphertext) with a random 12-byte nonce per value.

use aes_gcm::aead::{rand_core::RngCore, Aead, OsRng};
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::{engine::general_purpose, Engine as _};

#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("encryption key must be exactly 32 bytes")]
    BadKey,
    #[error("cipher operation failed")]
    Cipher,
    #[error("encrypted payload malformed: {0}")]
    Malformed(String),
}

#[derive(Clone)]
pub struct EncryptionService {
    cipher: Aes256Gcm,
}

impl EncryptionService {
    pub fn new(key: &str) -> Result<Self, EncryptionError> {
        if key.len() != 32 {
            return Err(EncryptionError::BadKey);
        }
        let key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, EncryptionError> {
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| EncryptionError::Cipher)?;

        let mut payload = nonce_bytes.to_vec();
        payload.extend_from_slice(&ciphertext);
        Ok(general_purpose::STANDARD.encode(&payload))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, EncryptionError> {
        let payload = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| EncryptionError::Malformed(format!("base64: {}", e)))?;

        if payload.len() < 12 {
            return Err(EncryptionError::Malformed("payload too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = payload.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| EncryptionError::Cipher)?;

        String::from_utf8(plaintext).map_err(|e| EncryptionError::Malformed(format!("utf8: {}", e)))
    }
}
