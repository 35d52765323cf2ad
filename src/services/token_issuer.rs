//! Issues and validates the access/refresh pair of an interactive session.
//!
//! Refresh tokens are single use when `auth.track_refresh_tokens` is on: the
//! first refresh claims the token's `jti` in the revocation set and every
//! later attempt, including a concurrent one, finds it taken.
//!
//! A login that still needs its second factor gets an opaque `session_token`
//! instead of a pair. Only its hash is cached, and redeeming it removes it.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::crypto::{Claims, TokenCodec, TokenError, TokenKind, random_alphanumeric, sha256_hex};
use crate::db::repositories::{CacheRepository, RepoResult};
use crate::domain::User;

const REVOKED_PREFIX: &str = "revoked:";
const CHALLENGE_PREFIX: &str = "login_2fa:";
const CHALLENGE_TOKEN_LEN: usize = 48;

/// A password-verified login waiting for its TOTP or recovery code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginChallenge {
    pub user_id: i64,
    /// Normalised account the first step was made with; keys the throttle.
    pub account: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

pub struct TokenIssuer {
    codec: TokenCodec,
    access_ttl: Duration,
    refresh_ttl: Duration,
    track_refresh: bool,
    challenge_ttl: std::time::Duration,
    cache: Arc<dyn CacheRepository>,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(config: &AuthConfig, cache: Arc<dyn CacheRepository>) -> Self {
        Self {
            codec: TokenCodec::new(config.jwt_secret.as_bytes(), &config.issuer, &config.audience),
            access_ttl: Duration::seconds(config.access_token_ttl_seconds),
            refresh_ttl: Duration::seconds(config.refresh_token_ttl_seconds),
            track_refresh: config.track_refresh_tokens,
            challenge_ttl: std::time::Duration::from_secs(config.second_factor_ttl_seconds.max(1)),
            cache,
        }
    }

    #[must_use]
    pub fn new_session_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Signs a fresh pair for `user` with fresh `jti`s. Only the access token
    /// carries the username and role names.
    pub fn issue_pair(
        &self,
        user: &User,
        roles: Vec<String>,
        session_id: &str,
    ) -> Result<TokenPair, TokenError> {
        let mut access = self.codec.claims(
            TokenKind::Access,
            user.id,
            session_id,
            uuid::Uuid::new_v4().to_string(),
            self.access_ttl,
        );
        access.username = Some(user.username.clone());
        access.roles = Some(roles);

        let refresh = self.codec.claims(
            TokenKind::Refresh,
            user.id,
            session_id,
            uuid::Uuid::new_v4().to_string(),
            self.refresh_ttl,
        );

        Ok(TokenPair {
            access_token: self.codec.encode(&access)?,
            refresh_token: self.codec.encode(&refresh)?,
            token_type: "Bearer",
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.codec.decode(token, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        self.codec.decode(token, TokenKind::Refresh)
    }

    /// Claims the refresh token's `jti`. Returns false when it was already
    /// consumed or revoked. Always true when tracking is disabled.
    pub async fn consume_refresh(&self, claims: &Claims) -> RepoResult<bool> {
        if !self.track_refresh {
            return Ok(true);
        }
        self.cache
            .set_if_absent(
                &format!("{REVOKED_PREFIX}{}", claims.jti),
                claims.sub.clone(),
                Self::remaining(claims),
            )
            .await
    }

    /// Revokes a refresh token until it would have expired anyway.
    pub async fn revoke(&self, claims: &Claims) -> RepoResult<()> {
        if !self.track_refresh {
            return Ok(());
        }
        self.cache
            .set(
                &format!("{REVOKED_PREFIX}{}", claims.jti),
                claims.sub.clone(),
                Self::remaining(claims),
            )
            .await
    }

    /// Parks a password-verified login and returns the token that redeems it.
    pub async fn open_challenge(&self, user_id: i64, account: &str) -> RepoResult<String> {
        let token = random_alphanumeric(CHALLENGE_TOKEN_LEN);
        self.cache
            .set(
                &format!("{CHALLENGE_PREFIX}{}", sha256_hex(&token)),
                format!("{user_id}:{account}"),
                self.challenge_ttl,
            )
            .await?;
        Ok(token)
    }

    /// Redeems a challenge token. A token works once, whatever the outcome
    /// of the code check that follows.
    pub async fn take_challenge(&self, token: &str) -> RepoResult<Option<LoginChallenge>> {
        let Some(value) = self
            .cache
            .take(&format!("{CHALLENGE_PREFIX}{}", sha256_hex(token)))
            .await?
        else {
            return Ok(None);
        };
        Ok(value.split_once(':').and_then(|(id, account)| {
            Some(LoginChallenge {
                user_id: id.parse().ok()?,
                account: account.to_string(),
            })
        }))
    }

    fn remaining(claims: &Claims) -> std::time::Duration {
        let secs = claims.exp - Utc::now().timestamp();
        std::time::Duration::from_secs(u64::try_from(secs).unwrap_or(0).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::MemoryCache;
    use crate::domain::UserStatus;

    fn issuer(track: bool) -> TokenIssuer {
        let config = AuthConfig {
            jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
            track_refresh_tokens: track,
            ..AuthConfig::default()
        };
        TokenIssuer::new(&config, Arc::new(MemoryCache::new()))
    }

    fn user() -> User {
        User {
            id: 7,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: String::new(),
            full_name: "Alice".to_string(),
            avatar: None,
            bio: None,
            status: UserStatus::Active,
            totp_secret: None,
            totp_enabled: false,
            totp_recovery_hashes: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_pair_carries_roles_on_access_only() {
        let issuer = issuer(true);
        let pair = issuer
            .issue_pair(&user(), vec!["admin".to_string()], "sid-1")
            .unwrap();
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 7200);

        let access = issuer.verify_access(&pair.access_token).unwrap();
        assert_eq!(access.roles, Some(vec!["admin".to_string()]));
        assert_eq!(access.username.as_deref(), Some("alice"));
        assert_eq!(access.sid, "sid-1");

        let refresh = issuer.verify_refresh(&pair.refresh_token).unwrap();
        assert!(refresh.roles.is_none());
        assert_ne!(refresh.jti, access.jti);
    }

    #[test]
    fn test_tokens_are_not_interchangeable() {
        let issuer = issuer(true);
        let pair = issuer.issue_pair(&user(), vec![], "sid").unwrap();

        assert_eq!(
            issuer.verify_access(&pair.refresh_token).unwrap_err(),
            TokenError::WrongType
        );
        assert_eq!(
            issuer.verify_refresh(&pair.access_token).unwrap_err(),
            TokenError::WrongType
        );
    }

    #[tokio::test]
    async fn test_refresh_consumed_once() {
        let issuer = issuer(true);
        let pair = issuer.issue_pair(&user(), vec![], "sid").unwrap();
        let claims = issuer.verify_refresh(&pair.refresh_token).unwrap();

        assert!(issuer.consume_refresh(&claims).await.unwrap());
        assert!(!issuer.consume_refresh(&claims).await.unwrap());
    }

    #[tokio::test]
    async fn test_revoked_refresh_cannot_be_consumed() {
        let issuer = issuer(true);
        let pair = issuer.issue_pair(&user(), vec![], "sid").unwrap();
        let claims = issuer.verify_refresh(&pair.refresh_token).unwrap();

        issuer.revoke(&claims).await.unwrap();
        assert!(!issuer.consume_refresh(&claims).await.unwrap());
    }

    #[tokio::test]
    async fn test_challenge_redeems_once() {
        let issuer = issuer(true);
        let token = issuer.open_challenge(7, "alice@example.com").await.unwrap();

        assert_eq!(
            issuer.take_challenge(&token).await.unwrap(),
            Some(LoginChallenge {
                user_id: 7,
                account: "alice@example.com".to_string(),
            })
        );
        assert_eq!(issuer.take_challenge(&token).await.unwrap(), None);
        assert_eq!(issuer.take_challenge("made-up").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_untracked_refresh_is_reusable() {
        let issuer = issuer(false);
        let pair = issuer.issue_pair(&user(), vec![], "sid").unwrap();
        let claims = issuer.verify_refresh(&pair.refresh_token).unwrap();

        assert!(issuer.consume_refresh(&claims).await.unwrap());
        assert!(issuer.consume_refresh(&claims).await.unwrap());
    }
}
