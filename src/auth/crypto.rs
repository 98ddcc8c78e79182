use crate::error::AppError;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

/// Encrypts refresh tokens before they are stored on the user row.
///
/// Stored form is `base64(nonce || ciphertext)`; a fresh random nonce is
/// drawn for every encryption.
pub struct RefreshTokenCipher {
    encryption_key: [u8; KEY_SIZE],
}

impl RefreshTokenCipher {
    pub fn new(encryption_key: [u8; KEY_SIZE]) -> Self {
        Self { encryption_key }
    }

    pub fn from_base64_key(key: &str) -> Result<Self, AppError> {
        let key_bytes = BASE64
            .decode(key)
            .map_err(|e| AppError::ConfigError(format!("Invalid refresh token key: {}", e)))?;

        if key_bytes.len() != KEY_SIZE {
            return Err(AppError::ConfigError(format!(
                "Refresh token key must be {} bytes, got {}",
                KEY_SIZE,
                key_bytes.len()
            )));
        }

        let mut encryption_key = [0u8; KEY_SIZE];
        encryption_key.copy_from_slice(&key_bytes);

        Ok(Self { encryption_key })
    }

    fn cipher(&self) -> Result<Aes256Gcm, AppError> {
        Aes256Gcm::new_from_slice(&self.encryption_key)
            .map_err(|e| AppError::InternalError(format!("Cipher init failed: {}", e)))
    }

    pub fn encrypt(&self, token: &str) -> Result<String, AppError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let encrypted = self
            .cipher()?
            .encrypt(nonce, token.as_bytes())
            .map_err(|e| AppError::InternalError(format!("Encryption failed: {}", e)))?;

        let mut stored = Vec::with_capacity(NONCE_SIZE + encrypted.len());
        stored.extend_from_slice(&nonce_bytes);
        stored.extend_from_slice(&encrypted);
        Ok(BASE64.encode(stored))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String, AppError> {
        let bytes = BASE64
            .decode(stored)
            .map_err(|e| AppError::InternalError(format!("Invalid stored token: {}", e)))?;
        if bytes.len() <= NONCE_SIZE {
            return Err(AppError::InternalError("Stored token is truncated".into()));
        }

        let (nonce_bytes, encrypted) = bytes.split_at(NONCE_SIZE);
        let decrypted = self
            .cipher()?
            .decrypt(Nonce::from_slice(nonce_bytes), encrypted)
            .map_err(|e| AppError::InternalError(format!("Decryption failed: {}", e)))?;

        String::from_utf8(decrypted).map_err(|e| AppError::InternalError(format!("Invalid UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate_test_key() -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    #[test]
    fn test_refresh_token_encryption() {
        let cipher = RefreshTokenCipher::new(generate_test_key());
        let token = "header.payload.signature";

        let stored = cipher.encrypt(token).unwrap();
        assert_ne!(stored, token);
        assert_eq!(cipher.decrypt(&stored).unwrap(), token);
    }

    #[test]
    fn test_nonce_differs_per_encryption() {
        let cipher = RefreshTokenCipher::new(generate_test_key());
        assert_ne!(cipher.encrypt("same").unwrap(), cipher.encrypt("same").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let stored = RefreshTokenCipher::new(generate_test_key()).encrypt("token").unwrap();
        let other = RefreshTokenCipher::new(generate_test_key());
        assert!(other.decrypt(&stored).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = RefreshTokenCipher::new(generate_test_key());
        let mut bytes = BASE64.decode(cipher.encrypt("token").unwrap()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;

        assert!(cipher.decrypt(&BASE64.encode(bytes)).is_err());
    }

    #[test]
    fn test_invalid_key_length() {
        let short_key = BASE64.encode([0u8; 16]);
        assert!(RefreshTokenCipher::from_base64_key(&short_key).is_err());
        assert!(RefreshTokenCipher::from_base64_key("not base64!").is_err());
    }
}
