//! RFC 6238 TOTP (SHA-1, 6 digits, 30 s step, one step of drift) and
//! single-use recovery codes.

use rand::{Rng, rng};
use totp_rs::{Algorithm, Secret, TOTP};

use super::{CryptoError, random_alphanumeric, sha256_hex};

pub const RECOVERY_CODE_COUNT: usize = 8;

const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP_SECONDS: u64 = 30;
const SECRET_BYTES: usize = 20;

/// Material handed to the user while enrolling an authenticator.
#[derive(Debug, Clone)]
pub struct TotpEnrollment {
    /// Base32 secret, stored until verification enables 2FA.
    pub secret: String,
    pub otpauth_url: String,
    /// PNG QR code as a `data:` URI.
    pub qr_code_image: String,
}

fn build(secret: Vec<u8>, issuer: &str, account: &str) -> Result<TOTP, CryptoError> {
    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        SKEW,
        STEP_SECONDS,
        secret,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| CryptoError::Totp(e.to_string()))
}

fn from_base32(secret: &str, issuer: &str, account: &str) -> Result<TOTP, CryptoError> {
    let bytes = Secret::Encoded(secret.to_string())
        .to_bytes()
        .map_err(|e| CryptoError::Totp(format!("invalid secret: {e:?}")))?;
    build(bytes, issuer, account)
}

/// Generates a fresh secret and the provisioning URL/QR for it.
pub fn enroll(issuer: &str, account: &str) -> Result<TotpEnrollment, CryptoError> {
    let bytes: [u8; SECRET_BYTES] = rng().random();
    let totp = build(bytes.to_vec(), issuer, account)?;

    let qr = totp.get_qr_base64().map_err(CryptoError::Totp)?;

    Ok(TotpEnrollment {
        secret: totp.get_secret_base32(),
        otpauth_url: totp.get_url(),
        qr_code_image: format!("data:image/png;base64,{qr}"),
    })
}

/// Checks `code` against the current step and its neighbours.
pub fn verify(secret: &str, issuer: &str, account: &str, code: &str) -> Result<bool, CryptoError> {
    let code = code.trim();
    if code.len() != DIGITS || !code.chars().all(|c| c.is_ascii_digit()) {
        return Ok(false);
    }
    let totp = from_base32(secret, issuer, account)?;
    totp.check_current(code)
        .map_err(|e| CryptoError::Totp(e.to_string()))
}

/// Code for the current step. Used by tooling and tests.
pub fn current_code(secret: &str, issuer: &str, account: &str) -> Result<String, CryptoError> {
    from_base32(secret, issuer, account)?
        .generate_current()
        .map_err(|e| CryptoError::Totp(e.to_string()))
}

/// Plaintext recovery codes in `xxxxx-xxxxx` form.
#[must_use]
pub fn generate_recovery_codes() -> Vec<String> {
    (0..RECOVERY_CODE_COUNT)
        .map(|_| {
            let raw = random_alphanumeric(10).to_ascii_lowercase();
            format!("{}-{}", &raw[..5], &raw[5..])
        })
        .collect()
}

#[must_use]
pub fn hash_recovery_code(code: &str) -> String {
    sha256_hex(&code.trim().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enroll_and_verify_current_code() {
        let enrollment = enroll("Warden", "alice").unwrap();
        assert!(enrollment.otpauth_url.starts_with("otpauth://totp/"));
        assert!(enrollment.qr_code_image.starts_with("data:image/png;base64,"));

        let code = current_code(&enrollment.secret, "Warden", "alice").unwrap();
        assert!(verify(&enrollment.secret, "Warden", "alice", &code).unwrap());
    }

    #[test]
    fn test_rejects_non_numeric_code() {
        let enrollment = enroll("Warden", "alice").unwrap();
        assert!(!verify(&enrollment.secret, "Warden", "alice", "abcdef").unwrap());
        assert!(!verify(&enrollment.secret, "Warden", "alice", "123").unwrap());
    }

    #[test]
    fn test_recovery_codes() {
        let codes = generate_recovery_codes();
        assert_eq!(codes.len(), RECOVERY_CODE_COUNT);
        assert!(codes.iter().all(|c| c.len() == 11 && c.as_bytes()[5] == b'-'));
        assert_eq!(
            hash_recovery_code(&codes[0].to_ascii_uppercase()),
            hash_recovery_code(&codes[0])
        );
    }
}
