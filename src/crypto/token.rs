use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("token malformed")]
    Malformed,

    #[error("token signature invalid")]
    SignatureInvalid,

    #[error("wrong token type")]
    WrongType,

    #[error("token encoding failed: {0}")]
    Encoding(String),
}

impl TokenError {
    /// Short code recorded in audit details.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Expired => "token_expired",
            Self::Malformed => "token_malformed",
            Self::SignatureInvalid => "token_signature_invalid",
            Self::WrongType => "wrong_token_type",
            Self::Encoding(_) => "token_encoding_failed",
        }
    }
}

/// Payload of access and refresh tokens. `roles` and `username` are only
/// present on access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    /// Login session this token belongs to; survives refresh.
    pub sid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, TokenError> {
        self.sub.parse().map_err(|_| TokenError::Malformed)
    }
}

/// HS256 encoder/decoder bound to one issuer and audience.
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
}

impl TokenCodec {
    #[must_use]
    pub fn new(secret: &[u8], issuer: &str, audience: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            issuer: issuer.to_string(),
            audience: audience.to_string(),
        }
    }

    /// Builds claims for `kind` valid for `ttl` from now.
    #[must_use]
    pub fn claims(
        &self,
        kind: TokenKind,
        user_id: i64,
        session_id: &str,
        jti: String,
        ttl: Duration,
    ) -> Claims {
        let now = Utc::now();
        Claims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti,
            kind,
            sid: session_id.to_string(),
            username: None,
            roles: None,
        }
    }

    pub fn encode(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Verifies signature, issuer, audience and expiry, then the token type.
    pub fn decode(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::SignatureInvalid,
                _ => TokenError::Malformed,
            }
        })?;

        if data.claims.kind != expected {
            return Err(TokenError::WrongType);
        }

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(b"0123456789abcdef0123456789abcdef", "warden", "warden-api")
    }

    #[test]
    fn test_round_trip_preserves_claims() {
        let codec = codec();
        let mut claims = codec.claims(
            TokenKind::Access,
            42,
            "session-1",
            "jti-1".to_string(),
            Duration::hours(2),
        );
        claims.username = Some("admin".to_string());
        claims.roles = Some(vec!["admin".to_string()]);

        let token = codec.encode(&claims).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let decoded = codec.decode(&token, TokenKind::Access).unwrap();
        assert_eq!(decoded, claims);
        assert_eq!(decoded.user_id().unwrap(), 42);
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let codec = codec();
        let claims = codec.claims(
            TokenKind::Refresh,
            1,
            "s",
            "j".to_string(),
            Duration::days(7),
        );
        let token = codec.encode(&claims).unwrap();

        assert_eq!(
            codec.decode(&token, TokenKind::Access),
            Err(TokenError::WrongType)
        );
    }

    #[test]
    fn test_expired_token() {
        let codec = codec();
        let claims = codec.claims(
            TokenKind::Access,
            1,
            "s",
            "j".to_string(),
            Duration::seconds(-10),
        );
        let token = codec.encode(&claims).unwrap();

        assert_eq!(
            codec.decode(&token, TokenKind::Access),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_foreign_signature() {
        let other = TokenCodec::new(b"another-secret-another-secret-000", "warden", "warden-api");
        let claims = other.claims(
            TokenKind::Access,
            1,
            "s",
            "j".to_string(),
            Duration::hours(1),
        );
        let token = other.encode(&claims).unwrap();

        assert_eq!(
            codec().decode(&token, TokenKind::Access),
            Err(TokenError::SignatureInvalid)
        );
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert_eq!(
            codec().decode("not-a-token", TokenKind::Access),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn test_wrong_audience_is_malformed() {
        let other = TokenCodec::new(b"0123456789abcdef0123456789abcdef", "warden", "elsewhere");
        let claims = other.claims(
            TokenKind::Access,
            1,
            "s",
            "j".to_string(),
            Duration::hours(1),
        );
        let token = other.encode(&claims).unwrap();

        assert_eq!(
            codec().decode(&token, TokenKind::Access),
            Err(TokenError::Malformed)
        );
    }
}
