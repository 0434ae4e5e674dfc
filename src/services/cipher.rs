//! Secret encryption using ChaCha20-Poly1305
//!
//! Every stored secret is sealed under the single vault master key with a
//! fresh random 96-bit nonce. Callers never choose the nonce. Ciphertext and
//! nonce are persisted base64-encoded.
//!
//! Each value is bound to the record that holds it through associated data
//! (see [`record_binding`]), so a ciphertext copied into another row fails
//! to open.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use thiserror::Error;
use uuid::Uuid;
use zeroize::Zeroizing;

/// Master key length in bytes
pub const KEY_LEN: usize = 32;
/// Nonce length in bytes
pub const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("Master key is not valid base64")]
    KeyEncoding,
    #[error("Master key must be {KEY_LEN} bytes, got {0}")]
    KeyLength(usize),
    #[error("Encryption failed")]
    Encryption,
    /// Wrong key, wrong nonce, tampered data or non UTF-8 plaintext
    #[error("Decryption failed")]
    Decryption,
}

/// The 256-bit vault master key; wiped on drop
pub struct MasterKey(Zeroizing<[u8; KEY_LEN]>);

impl MasterKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        if bytes.len() != KEY_LEN {
            return Err(CipherError::KeyLength(bytes.len()));
        }
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CipherError> {
        let bytes = Zeroizing::new(
            BASE64
                .decode(encoded.trim())
                .map_err(|_| CipherError::KeyEncoding)?,
        );
        Self::from_bytes(&bytes)
    }

    /// Draw a new key from the OS RNG
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(key.as_mut());
        Self(key)
    }

    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(BASE64.encode(self.0.as_ref()))
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

/// Associated data tying a sealed value to its secret id and owner
pub fn record_binding(secret_id: Uuid, owner_id: Uuid) -> Vec<u8> {
    format!("keyvault/secret/v1/{}/{}", secret_id, owner_id).into_bytes()
}

/// Ciphertext (with tag) and the nonce it was sealed with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedSecret {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

impl SealedSecret {
    pub fn ciphertext_base64(&self) -> String {
        BASE64.encode(&self.ciphertext)
    }

    pub fn nonce_base64(&self) -> String {
        BASE64.encode(self.nonce)
    }

    /// Rebuild from stored base64 columns; a bad encoding or nonce length
    /// is treated as a decryption failure
    pub fn from_base64(ciphertext: &str, nonce: &str) -> Result<Self, CipherError> {
        let ciphertext = BASE64
            .decode(ciphertext)
            .map_err(|_| CipherError::Decryption)?;
        let nonce_bytes = BASE64.decode(nonce).map_err(|_| CipherError::Decryption)?;
        let nonce: [u8; NONCE_LEN] = nonce_bytes
            .as_slice()
            .try_into()
            .map_err(|_| CipherError::Decryption)?;

        Ok(Self { ciphertext, nonce })
    }
}

/// Seals and opens secret values under the master key
pub struct SecretCipher {
    cipher: ChaCha20Poly1305,
}

impl SecretCipher {
    pub fn new(key: &MasterKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key.0.as_ref())),
        }
    }

    /// Seal `plaintext`; the same `aad` must be presented to open it
    pub fn encrypt(&self, plaintext: &str, aad: &[u8]) -> Result<SealedSecret, CipherError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let payload = Payload {
            msg: plaintext.as_bytes(),
            aad,
        };
        let ciphertext = self
            .cipher
            .encrypt(&nonce, payload)
            .map_err(|_| CipherError::Encryption)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes.copy_from_slice(nonce.as_slice());

        Ok(SealedSecret {
            ciphertext,
            nonce: nonce_bytes,
        })
    }

    pub fn decrypt(&self, sealed: &SealedSecret, aad: &[u8]) -> Result<Zeroizing<String>, CipherError> {
        let payload = Payload {
            msg: sealed.ciphertext.as_ref(),
            aad,
        };
        let plaintext = Zeroizing::new(
            self.cipher
                .decrypt(Nonce::from_slice(&sealed.nonce), payload)
                .map_err(|_| CipherError::Decryption)?,
        );

        let text = std::str::from_utf8(&plaintext).map_err(|_| CipherError::Decryption)?;
        Ok(Zeroizing::new(text.to_owned()))
    }
}
