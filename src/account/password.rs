/// Password hashing and verification (Argon2id)
use crate::{
    config::AuthConfig,
    error::{ApiError, ApiResult},
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use sha2::{Digest, Sha256};

/// Credential verifier
///
/// Holds the Argon2 parameters read from configuration at startup so hashing
/// and verification always agree on the cost.
#[derive(Clone)]
pub struct CredentialVerifier {
    params: Params,
}

impl CredentialVerifier {
    pub fn new(config: &AuthConfig) -> ApiResult<Self> {
        let params = Params::new(
            config.password_hash_memory_kib,
            config.password_hash_cost,
            1,
            None,
        )
        .map_err(|e| ApiError::Internal(format!("Invalid Argon2 parameters: {}", e)))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password into a PHC string
    pub fn hash(&self, password: &str) -> ApiResult<String> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ApiError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Check a password against a stored hash
    ///
    /// A missing, empty or unparseable hash never verifies.
    pub fn verify(&self, password: &str, stored_hash: Option<&str>) -> bool {
        let Some(stored_hash) = stored_hash.filter(|h| !h.is_empty()) else {
            return false;
        };

        match PasswordHash::new(stored_hash) {
            // Parameters come from the PHC string, so older hashes keep verifying
            Ok(parsed) => self
                .argon2()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

/// Password for a tenant's guest account, derived from the domain alone
pub fn guest_password(domain: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"guest:");
    hasher.update(domain.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_config;

    fn verifier() -> CredentialVerifier {
        CredentialVerifier::new(&test_config().authentication).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let verifier = verifier();
        let hash = verifier.hash("secret1").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(verifier.verify("secret1", Some(&hash)));
        assert!(!verifier.verify("secret2", Some(&hash)));
    }

    #[test]
    fn test_missing_hash_fails_closed() {
        let verifier = verifier();

        for candidate in ["", "secret1", "anything at all"] {
            assert!(!verifier.verify(candidate, None));
            assert!(!verifier.verify(candidate, Some("")));
        }
    }

    #[test]
    fn test_garbage_hash_fails_closed() {
        assert!(!verifier().verify("secret1", Some("not-a-phc-string")));
    }

    #[test]
    fn test_salted_hashes_differ() {
        let verifier = verifier();
        assert_ne!(verifier.hash("secret1").unwrap(), verifier.hash("secret1").unwrap());
    }

    #[test]
    fn test_guest_password_is_deterministic() {
        let a = guest_password("https://shop.example");
        assert_eq!(a, guest_password("https://shop.example"));
        assert_ne!(a, guest_password("https://other.example"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut config = test_config().authentication;
        config.password_hash_cost = 0;
        assert!(CredentialVerifier::new(&config).is_err());
    }
}
