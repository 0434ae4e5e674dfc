//! Credential hashing
//!
//! Argon2id over the password and a per-user random salt. The raw output is
//! stored hex-encoded next to the salt, and verification recomputes it and
//! compares in constant time.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::Argon2Settings;

/// Bytes of random salt generated per user
pub const SALT_LEN: usize = 32;
/// Bytes of Argon2id output stored per user
pub const HASH_LEN: usize = 32;
const MIN_SALT_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("Password must not be empty")]
    EmptyPassword,
    #[error("Salt must be at least {MIN_SALT_LEN} bytes")]
    SaltTooShort,
    #[error("Invalid Argon2 parameters: {0}")]
    Params(String),
    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

/// Stored form of a password
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordDigest {
    /// Hex-encoded Argon2id output
    pub hash: String,
    /// Hex-encoded salt
    pub salt: String,
}

#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
}

impl CredentialHasher {
    pub fn new(settings: &Argon2Settings) -> Result<Self, HashError> {
        let params = Params::new(
            settings.memory_kib,
            settings.iterations,
            settings.parallelism,
            Some(HASH_LEN),
        )
        .map_err(|e| HashError::Params(e.to_string()))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a password, drawing a fresh salt unless one is supplied
    pub fn hash(&self, password: &str, salt: Option<&[u8]>) -> Result<PasswordDigest, HashError> {
        if password.is_empty() {
            return Err(HashError::EmptyPassword);
        }

        let salt = match salt {
            Some(s) if s.len() < MIN_SALT_LEN => return Err(HashError::SaltTooShort),
            Some(s) => s.to_vec(),
            None => {
                let mut s = vec![0u8; SALT_LEN];
                OsRng.fill_bytes(&mut s);
                s
            }
        };

        let output = self.derive(password, &salt)?;

        Ok(PasswordDigest {
            hash: hex::encode(output.as_ref()),
            salt: hex::encode(&salt),
        })
    }

    /// Check a password against a stored hash and salt
    ///
    /// Any malformed stored value yields `false`.
    pub fn verify(&self, password: &str, hash: &str, salt: &str) -> bool {
        if password.is_empty() {
            return false;
        }
        let (Ok(expected), Ok(salt)) = (hex::decode(hash), hex::decode(salt)) else {
            return false;
        };
        if salt.len() < MIN_SALT_LEN {
            return false;
        }

        match self.derive(password, &salt) {
            Ok(computed) => computed.as_ref().ct_eq(expected.as_slice()).into(),
            Err(_) => false,
        }
    }

    fn derive(&self, password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; HASH_LEN]>, HashError> {
        let mut output = Zeroizing::new([0u8; HASH_LEN]);
        self.argon2
            .hash_password_into(password.as_bytes(), salt, output.as_mut())
            .map_err(|e| HashError::Hashing(e.to_string()))?;
        Ok(output)
    }
}
