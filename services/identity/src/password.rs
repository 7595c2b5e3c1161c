//! Password encoding and verification

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use tracing::warn;

use crate::error::{IdentityError, IdentityResult};

/// Encodes passwords for storage and checks submitted ones against them
pub trait PasswordEncoder: Send + Sync {
    fn encode(&self, raw_password: &str) -> IdentityResult<String>;

    fn matches(&self, raw_password: &str, encoded_password: &str) -> bool;
}

/// Argon2id with default parameters, stored as PHC strings
#[derive(Debug, Clone, Default)]
pub struct Argon2PasswordEncoder {
    argon2: Argon2<'static>,
}

impl Argon2PasswordEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PasswordEncoder for Argon2PasswordEncoder {
    fn encode(&self, raw_password: &str) -> IdentityResult<String> {
        let salt = SaltString::generate(&mut rand::thread_rng());
        let hash = self
            .argon2
            .hash_password(raw_password.as_bytes(), &salt)
            .map_err(|e| IdentityError::PasswordHash(format!("Failed to hash password: {}", e)))?;

        Ok(hash.to_string())
    }

    fn matches(&self, raw_password: &str, encoded_password: &str) -> bool {
        let parsed_hash = match PasswordHash::new(encoded_password) {
            Ok(hash) => hash,
            Err(e) => {
                warn!("Stored password hash could not be parsed: {}", e);
                return false;
            }
        };

        self.argon2
            .verify_password(raw_password.as_bytes(), &parsed_hash)
            .is_ok()
    }
}
