use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};
use tokio::task;

use super::{CryptoError, random_alphanumeric};
use crate::config::SecurityConfig;

/// Argon2id hasher configured from [`SecurityConfig`].
///
/// Verification also accepts bcrypt (`$2a$`/`$2b$`/`$2y$`) hashes so older
/// accounts keep working until they are rehashed on login.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
    dummy_hash: String,
}

impl PasswordHasher {
    pub fn new(config: &SecurityConfig) -> Result<Self, CryptoError> {
        let params = Params::new(
            config.argon2_memory_cost_kib,
            config.argon2_time_cost,
            config.argon2_parallelism,
            None,
        )
        .map_err(|e| CryptoError::Hash(format!("invalid argon2 params: {e}")))?;

        // Unknown accounts are compared against this so the login path costs
        // the same whether or not the user exists.
        let dummy_hash = hash_with_params(&random_alphanumeric(24), params.clone())?;

        Ok(Self { params, dummy_hash })
    }

    pub async fn hash(&self, password: &str) -> Result<String, CryptoError> {
        let password = password.to_string();
        let params = self.params.clone();
        task::spawn_blocking(move || hash_with_params(&password, params))
            .await
            .map_err(|e| CryptoError::Task(e.to_string()))?
    }

    /// Verifies `password` against `stored`, or against the dummy hash when
    /// there is no stored hash. The dummy path always yields `false`.
    pub async fn verify(&self, password: &str, stored: Option<&str>) -> Result<bool, CryptoError> {
        let (hash, real) = match stored {
            Some(hash) => (hash.to_string(), true),
            None => (self.dummy_hash.clone(), false),
        };
        let password = password.to_string();

        let matched = task::spawn_blocking(move || verify_hash(&password, &hash))
            .await
            .map_err(|e| CryptoError::Task(e.to_string()))??;

        Ok(real && matched)
    }

    /// True when `stored` was produced by bcrypt or with argon2 parameters
    /// other than the configured ones.
    #[must_use]
    pub fn needs_rehash(&self, stored: &str) -> bool {
        if is_bcrypt(stored) {
            return true;
        }
        let Ok(parsed) = PasswordHash::new(stored) else {
            return true;
        };
        Params::try_from(&parsed).map_or(true, |p| {
            p.m_cost() != self.params.m_cost()
                || p.t_cost() != self.params.t_cost()
                || p.p_cost() != self.params.p_cost()
        })
    }
}

fn is_bcrypt(hash: &str) -> bool {
    hash.starts_with("$2a$") || hash.starts_with("$2b$") || hash.starts_with("$2y$")
}

fn verify_hash(password: &str, hash: &str) -> Result<bool, CryptoError> {
    if is_bcrypt(hash) {
        return bcrypt::verify(password, hash).map_err(|e| CryptoError::Hash(e.to_string()));
    }

    let parsed = PasswordHash::new(hash)
        .map_err(|e| CryptoError::Hash(format!("invalid password hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Hashes synchronously with explicit parameters. Prefer
/// [`PasswordHasher::hash`] on async paths.
pub fn hash_with_params(password: &str, params: Params) -> Result<String, CryptoError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| CryptoError::Hash(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> SecurityConfig {
        SecurityConfig {
            argon2_memory_cost_kib: 1024,
            argon2_time_cost: 1,
            ..SecurityConfig::default()
        }
    }

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hasher = PasswordHasher::new(&fast_config()).unwrap();
        let hash = hasher.hash("correct horse").await.unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse", Some(&hash)).await.unwrap());
        assert!(!hasher.verify("wrong horse", Some(&hash)).await.unwrap());
        assert!(!hasher.needs_rehash(&hash));
    }

    #[tokio::test]
    async fn test_dummy_verification_never_matches() {
        let hasher = PasswordHasher::new(&fast_config()).unwrap();
        assert!(!hasher.verify("anything", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_legacy_bcrypt_hash_verifies_and_needs_rehash() {
        let hasher = PasswordHasher::new(&fast_config()).unwrap();
        let legacy = bcrypt::hash("admin123", 4).unwrap();

        assert!(hasher.verify("admin123", Some(&legacy)).await.unwrap());
        assert!(hasher.needs_rehash(&legacy));
    }

    #[test]
    fn test_param_change_needs_rehash() {
        let old = PasswordHasher::new(&fast_config()).unwrap();
        let hash = hash_with_params("pw", old.params.clone()).unwrap();

        let newer = PasswordHasher::new(&SecurityConfig {
            argon2_time_cost: 3,
            ..fast_config()
        })
        .unwrap();
        assert!(newer.needs_rehash(&hash));
    }
}
