//! Default implementation of the `AuthService` trait.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::crypto::{self, CryptoError, PAT_SCHEME, PasswordHasher, constant_time_eq, sha256_hex, totp};
use crate::db::repositories::{
    PatCommandRepository, PatQueryRepository, RepoError, Repositories, RoleQueryRepository,
    UserCommandRepository, UserQueryRepository,
};
use crate::domain::user::normalize_identifier;
use crate::domain::{
    AuditAction, AuditRecord, AuditResource, ClientInfo, CredentialKind, NewUser, PatStatus,
    Principal, Role, User, UserStatus, UserWithRoles,
};
use crate::services::audit::AuditWriter;
use crate::services::auth_service::{
    AuthError, AuthService, AuthSession, LoginRequest, RegisterRequest, SecondFactorRequest,
};
use crate::services::captcha::CaptchaService;
use crate::services::rbac::PermissionEvaluator;
use crate::services::throttle::LoginThrottle;
use crate::services::token_issuer::{LoginChallenge, TokenIssuer};

/// Why a login attempt was refused. Recorded in the audit detail; the
/// caller only ever sees [`AuthError::InvalidCredentials`] for these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    CaptchaMismatch,
    UserNotFound,
    PasswordMismatch,
    TotpRequired,
    TotpInvalid,
    RecoveryCodeInvalid,
    UserInactive,
    UserBanned,
}

impl Rejection {
    const fn reason(self) -> &'static str {
        match self {
            Self::CaptchaMismatch => "captcha_mismatch",
            Self::UserNotFound => "user_not_found",
            Self::PasswordMismatch => "password_mismatch",
            Self::TotpRequired => "totp_required",
            Self::TotpInvalid => "totp_invalid",
            Self::RecoveryCodeInvalid => "recovery_code_invalid",
            Self::UserInactive => "user_inactive",
            Self::UserBanned => "user_banned",
        }
    }

    const fn for_status(status: UserStatus) -> Option<Self> {
        match status {
            UserStatus::Active => None,
            UserStatus::Inactive => Some(Self::UserInactive),
            UserStatus::Banned => Some(Self::UserBanned),
        }
    }
}

enum LoginFailure {
    Rejected(Rejection),
    Error(AuthError),
}

enum LoginStep {
    Complete(User, Vec<Role>),
    /// Password and status check out; a code is still missing.
    NeedsSecondFactor(User),
}

impl From<Rejection> for LoginFailure {
    fn from(r: Rejection) -> Self {
        Self::Rejected(r)
    }
}

impl From<RepoError> for LoginFailure {
    fn from(err: RepoError) -> Self {
        Self::Error(err.into())
    }
}

impl From<CryptoError> for LoginFailure {
    fn from(err: CryptoError) -> Self {
        Self::Error(err.into())
    }
}

/// Holds the audit entry of one login attempt until a verdict is reached.
/// Dropping it unsettled, because the request was cancelled or timed out,
/// records the attempt as cancelled.
struct PendingLogin {
    audit: Arc<AuditWriter>,
    client: ClientInfo,
    account: String,
    user: Option<(i64, String)>,
    method: &'static str,
    armed: bool,
}

impl PendingLogin {
    fn new(audit: Arc<AuditWriter>, client: &ClientInfo, account: &str) -> Self {
        Self {
            audit,
            client: client.clone(),
            account: account.to_string(),
            user: None,
            method: "password",
            armed: true,
        }
    }

    fn identify(&mut self, user: &User) {
        self.user = Some((user.id, user.username.clone()));
    }

    fn build(&self) -> AuditRecord {
        let mut record = AuditRecord::new(AuditAction::Login, AuditResource::Session)
            .client(&self.client)
            .detail(json!({ "account": self.account, "method": self.method }));
        if let Some((id, username)) = &self.user {
            record = record.actor(*id, username).resource_id(id);
        }
        record
    }

    /// Disarms the guard and hands back the entry to write.
    fn settle(mut self) -> AuditRecord {
        self.armed = false;
        self.build()
    }
}

impl Drop for PendingLogin {
    fn drop(&mut self) {
        if self.armed {
            metrics::counter!("login_attempts_total", "outcome" => "cancelled").increment(1);
            self.audit.record(self.build().failure("cancelled"));
        }
    }
}

pub struct DefaultAuthService {
    users: Arc<dyn UserQueryRepository>,
    user_commands: Arc<dyn UserCommandRepository>,
    roles: Arc<dyn RoleQueryRepository>,
    pats: Arc<dyn PatQueryRepository>,
    pat_commands: Arc<dyn PatCommandRepository>,
    evaluator: Arc<PermissionEvaluator>,
    issuer: Arc<TokenIssuer>,
    captcha: Arc<CaptchaService>,
    hasher: Arc<PasswordHasher>,
    throttle: Arc<LoginThrottle>,
    audit: Arc<AuditWriter>,
    allow_registration: bool,
    default_role: String,
    auto_rehash: bool,
    totp_issuer: String,
}

impl DefaultAuthService {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repos: &Repositories,
        evaluator: Arc<PermissionEvaluator>,
        issuer: Arc<TokenIssuer>,
        captcha: Arc<CaptchaService>,
        hasher: Arc<PasswordHasher>,
        throttle: Arc<LoginThrottle>,
        audit: Arc<AuditWriter>,
        config: &Config,
    ) -> Self {
        Self {
            users: repos.users.clone(),
            user_commands: repos.users.clone(),
            roles: repos.roles.clone(),
            pats: repos.pats.clone(),
            pat_commands: repos.pats.clone(),
            evaluator,
            issuer,
            captcha,
            hasher,
            throttle,
            audit,
            allow_registration: config.auth.allow_registration,
            default_role: config.auth.default_role.clone(),
            auto_rehash: config.security.auto_migrate_password_hashes,
            totp_issuer: config.security.totp_issuer.clone(),
        }
    }

    /// Steps of the pipeline after the throttle check. Every early return
    /// lands in [`Self::fail`].
    async fn run_login(
        &self,
        req: &LoginRequest,
        account: &str,
        attempt: &mut PendingLogin,
    ) -> Result<LoginStep, LoginFailure> {
        if !self.captcha.verify(&req.captcha_id, &req.captcha).await? {
            return Err(Rejection::CaptchaMismatch.into());
        }

        let user = self.users.find_by_account(account).await?;
        let password_ok = self
            .hasher
            .verify(&req.password, user.as_ref().map(|u| u.password_hash.as_str()))
            .await?;
        let Some(user) = user else {
            return Err(Rejection::UserNotFound.into());
        };
        attempt.identify(&user);
        if !password_ok {
            return Err(Rejection::PasswordMismatch.into());
        }

        // Status comes before the second factor so a disabled account never
        // answers differently from a wrong password.
        if let Some(rejection) = Rejection::for_status(user.status) {
            return Err(rejection.into());
        }

        if user.requires_second_factor() {
            let totp_code = req.totp_code.as_deref();
            let recovery_code = req.recovery_code.as_deref();
            if totp_code.is_none() && recovery_code.is_none() {
                return Ok(LoginStep::NeedsSecondFactor(user));
            }
            attempt.method = self
                .check_second_factor(&user, totp_code, recovery_code)
                .await?;
        }

        let roles = self.roles.roles_of_user(user.id).await?;
        Ok(LoginStep::Complete(user, roles))
    }

    async fn run_second_factor(
        &self,
        req: &SecondFactorRequest,
        challenge: &LoginChallenge,
        attempt: &mut PendingLogin,
    ) -> Result<(User, Vec<Role>), LoginFailure> {
        let user = match self.users.find_by_id(challenge.user_id).await {
            Ok(user) => user,
            Err(RepoError::NotFound) => return Err(Rejection::UserNotFound.into()),
            Err(e) => return Err(e.into()),
        };
        attempt.identify(&user);

        // The account may have changed since the first step.
        if let Some(rejection) = Rejection::for_status(user.status) {
            return Err(rejection.into());
        }
        if !user.requires_second_factor() {
            return Err(Rejection::TotpInvalid.into());
        }

        attempt.method = self
            .check_second_factor(&user, req.totp_code.as_deref(), req.recovery_code.as_deref())
            .await?;

        let roles = self.roles.roles_of_user(user.id).await?;
        Ok((user, roles))
    }

    async fn check_second_factor(
        &self,
        user: &User,
        totp_code: Option<&str>,
        recovery_code: Option<&str>,
    ) -> Result<&'static str, LoginFailure> {
        let secret = user.totp_secret.as_deref().unwrap_or_default();

        if let Some(code) = totp_code.filter(|c| !c.trim().is_empty()) {
            if totp::verify(secret, &self.totp_issuer, &user.username, code)? {
                return Ok("totp");
            }
            return Err(Rejection::TotpInvalid.into());
        }

        if let Some(code) = recovery_code.filter(|c| !c.trim().is_empty()) {
            let hash = totp::hash_recovery_code(code);
            if self.user_commands.consume_recovery_hash(user.id, &hash).await? {
                return Ok("recovery_code");
            }
            return Err(Rejection::RecoveryCodeInvalid.into());
        }

        Err(Rejection::TotpRequired.into())
    }

    fn throttled(&self, account: &str, client: &ClientInfo, retry_after: Duration) -> AuthError {
        metrics::counter!("login_attempts_total", "outcome" => "throttled").increment(1);
        self.audit.record(
            AuditRecord::new(AuditAction::Login, AuditResource::Session)
                .client(client)
                .detail(json!({ "account": account }))
                .failure("throttled"),
        );
        AuthError::Throttled {
            retry_after_secs: retry_after.as_secs().max(1),
        }
    }

    /// The single failure sink of both login steps. Credential rejections
    /// all surface as [`AuthError::InvalidCredentials`].
    fn fail(&self, attempt: PendingLogin, throttle_key: &str, failure: LoginFailure) -> AuthError {
        let (reason, err) = match failure {
            LoginFailure::Rejected(rejection) => {
                self.throttle.record_failure(throttle_key);
                (rejection.reason(), AuthError::InvalidCredentials)
            }
            LoginFailure::Error(err) => ("internal_error", err),
        };
        metrics::counter!("login_attempts_total", "outcome" => reason).increment(1);
        info!(event = "login_failed", account = %attempt.account, reason, "Login rejected");
        self.audit.record(attempt.settle().failure(reason));
        err
    }

    /// Parks a password-verified login until the second step.
    async fn defer(&self, attempt: PendingLogin, user: &User) -> AuthError {
        match self.issuer.open_challenge(user.id, &attempt.account).await {
            Ok(session_token) => {
                let reason = Rejection::TotpRequired.reason();
                metrics::counter!("login_attempts_total", "outcome" => reason).increment(1);
                debug!(event = "login_needs_second_factor", user_id = user.id, "Awaiting second factor");
                self.audit.record(attempt.settle().failure(reason));
                AuthError::SecondFactorRequired { session_token }
            }
            Err(e) => {
                self.audit.record(attempt.settle().failure("internal_error"));
                e.into()
            }
        }
    }

    /// Issues the pair and writes the success entry. A successful login
    /// that leaves no trace is refused.
    async fn complete(
        &self,
        attempt: PendingLogin,
        throttle_key: &str,
        user: User,
        roles: Vec<Role>,
    ) -> Result<AuthSession, AuthError> {
        let session_id = TokenIssuer::new_session_id();
        let role_names = roles.iter().map(|r| r.name.clone()).collect();
        let tokens = match self.issuer.issue_pair(&user, role_names, &session_id) {
            Ok(tokens) => tokens,
            Err(e) => {
                self.audit.record(attempt.settle().failure("token_issue_failed"));
                return Err(e.into());
            }
        };

        let mut record = attempt.settle();
        if let Some(detail) = record.detail.as_mut().and_then(Value::as_object_mut) {
            detail.insert("session_id".to_string(), Value::String(session_id));
        }
        if let Err(e) = self.audit.write(record).await {
            metrics::counter!("login_attempts_total", "outcome" => "audit_failed").increment(1);
            return Err(AuthError::Unavailable(format!("audit log unavailable: {e}")));
        }

        self.throttle.reset(throttle_key);
        metrics::counter!("login_attempts_total", "outcome" => "success").increment(1);
        info!(event = "login_succeeded", user_id = user.id, "User logged in");

        Ok(AuthSession {
            tokens,
            user: UserWithRoles { user, roles },
        })
    }

    async fn rehash_if_needed(&self, user: &User, password: &str) {
        if !self.auto_rehash || !self.hasher.needs_rehash(&user.password_hash) {
            return;
        }
        match self.hasher.hash(password).await {
            Ok(hash) => match self.user_commands.rehash_password(user.id, &hash).await {
                Ok(()) => info!(event = "password_rehashed", user_id = user.id, "Upgraded password hash"),
                Err(e) => warn!(event = "password_rehash_failed", user_id = user.id, error = %e, "Could not store upgraded hash"),
            },
            Err(e) => warn!(event = "password_rehash_failed", user_id = user.id, error = %e, "Could not rehash password"),
        }
    }

    fn reject_token(&self, resource: AuditResource, reason: &str, client: &ClientInfo) -> AuthError {
        debug!(event = "authentication_failed", reason, "Bearer credential rejected");
        self.audit.record(
            AuditRecord::new(AuditAction::Authenticate, resource)
                .client(client)
                .failure(reason),
        );
        AuthError::Unauthorized
    }

    async fn authenticate_session(&self, token: &str, client: &ClientInfo) -> Result<Principal, AuthError> {
        let claims = match self.issuer.verify_access(token) {
            Ok(claims) => claims,
            Err(e) => return Err(self.reject_token(AuditResource::Session, e.reason(), client)),
        };
        let Ok(user_id) = claims.user_id() else {
            return Err(self.reject_token(AuditResource::Session, "token_malformed", client));
        };

        let user = match self.users.find_by_id(user_id).await {
            Ok(user) => user,
            Err(RepoError::NotFound) => {
                return Err(self.reject_token(AuditResource::Session, "user_not_found", client));
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(rejection) = Rejection::for_status(user.status) {
            return Err(self.reject_token(AuditResource::Session, rejection.reason(), client));
        }

        let (roles, permissions) = self.evaluator.for_user(user.id).await?;
        Ok(Principal {
            user_id: user.id,
            username: user.username,
            email: user.email,
            role_ids: roles.iter().map(|r| r.id).collect(),
            permissions,
            credential: CredentialKind::Session,
            credential_id: claims.sid,
        })
    }

    async fn authenticate_pat(&self, token: &str, client: &ClientInfo) -> Result<Principal, AuthError> {
        let reject = |reason| Err(self.reject_token(AuditResource::Token, reason, client));

        let Some(prefix) = crypto::pat_lookup_prefix(token) else {
            return reject("pat_malformed");
        };

        let hash = sha256_hex(token);
        let candidates = self.pats.find_by_prefix(prefix).await?;
        let Some(pat) = candidates
            .into_iter()
            .find(|p| constant_time_eq(p.token_hash.as_bytes(), hash.as_bytes()))
        else {
            return reject("pat_not_found");
        };

        if pat.status != PatStatus::Active {
            return reject("pat_disabled");
        }
        let now = Utc::now();
        if pat.is_expired_at(now) {
            return reject("pat_expired");
        }

        let owner = match self.users.find_by_id(pat.user_id).await {
            Ok(user) => user,
            Err(RepoError::NotFound) => return reject("user_not_found"),
            Err(e) => return Err(e.into()),
        };
        if let Some(rejection) = Rejection::for_status(owner.status) {
            return reject(rejection.reason());
        }

        let (roles, owner_permissions) = self.evaluator.for_user(owner.id).await?;
        let effective = pat.permission_set().intersect(&owner_permissions);

        let commands = self.pat_commands.clone();
        let pat_id = pat.id;
        tokio::spawn(async move {
            if let Err(e) = commands.touch_last_used(pat_id, now).await {
                warn!(event = "pat_touch_failed", pat_id, error = %e, "Could not record token use");
            }
        });

        Ok(Principal {
            user_id: owner.id,
            username: owner.username,
            email: owner.email,
            role_ids: roles.iter().map(|r| r.id).collect(),
            permissions: Arc::new(effective),
            credential: CredentialKind::PersonalAccessToken,
            credential_id: pat.id.to_string(),
        })
    }

    async fn session_for(&self, user: User, session_id: &str) -> Result<AuthSession, AuthError> {
        let roles = self.roles.roles_of_user(user.id).await?;
        let tokens = self
            .issuer
            .issue_pair(&user, roles.iter().map(|r| r.name.clone()).collect(), session_id)?;
        Ok(AuthSession {
            tokens,
            user: UserWithRoles { user, roles },
        })
    }
}

#[async_trait]
impl AuthService for DefaultAuthService {
    async fn login(
        &self,
        req: LoginRequest,
        client: &ClientInfo,
    ) -> Result<AuthSession, AuthError> {
        let account = normalize_identifier(&req.account);
        let throttle_key = LoginThrottle::key(&account, client.ip.as_deref());

        if let Err(retry_after) = self.throttle.check(&throttle_key) {
            return Err(self.throttled(&account, client, retry_after));
        }

        let mut attempt = PendingLogin::new(self.audit.clone(), client, &account);

        let (user, roles) = match self.run_login(&req, &account, &mut attempt).await {
            Ok(LoginStep::Complete(user, roles)) => (user, roles),
            Ok(LoginStep::NeedsSecondFactor(user)) => return Err(self.defer(attempt, &user).await),
            Err(failure) => return Err(self.fail(attempt, &throttle_key, failure)),
        };

        let session = self.complete(attempt, &throttle_key, user, roles).await?;
        self.rehash_if_needed(&session.user.user, &req.password).await;
        Ok(session)
    }

    async fn login_second_factor(
        &self,
        req: SecondFactorRequest,
        client: &ClientInfo,
    ) -> Result<AuthSession, AuthError> {
        let Some(challenge) = self.issuer.take_challenge(&req.session_token).await? else {
            metrics::counter!("login_attempts_total", "outcome" => "session_token_invalid")
                .increment(1);
            self.audit.record(
                AuditRecord::new(AuditAction::Login, AuditResource::Session)
                    .client(client)
                    .failure("session_token_invalid"),
            );
            return Err(AuthError::InvalidCredentials);
        };

        let throttle_key = LoginThrottle::key(&challenge.account, client.ip.as_deref());
        if let Err(retry_after) = self.throttle.check(&throttle_key) {
            return Err(self.throttled(&challenge.account, client, retry_after));
        }

        let mut attempt = PendingLogin::new(self.audit.clone(), client, &challenge.account);
        match self.run_second_factor(&req, &challenge, &mut attempt).await {
            Ok((user, roles)) => self.complete(attempt, &throttle_key, user, roles).await,
            Err(failure) => Err(self.fail(attempt, &throttle_key, failure)),
        }
    }

    async fn register(
        &self,
        req: RegisterRequest,
        client: &ClientInfo,
    ) -> Result<AuthSession, AuthError> {
        if !self.allow_registration {
            return Err(AuthError::RegistrationDisabled);
        }

        let username = normalize_identifier(&req.username);
        let email = normalize_identifier(&req.email);

        if !self.captcha.verify(&req.captcha_id, &req.captcha).await? {
            self.audit.record(
                AuditRecord::new(AuditAction::Register, AuditResource::User)
                    .client(client)
                    .detail(json!({ "username": username }))
                    .failure("captcha_mismatch"),
            );
            return Err(AuthError::InvalidCaptcha);
        }

        let role_ids = match self.roles.find_by_name(&self.default_role).await? {
            Some(role) => vec![role.id],
            None => {
                warn!(role = %self.default_role, "Default role missing; registering without roles");
                Vec::new()
            }
        };

        let password_hash = self.hasher.hash(&req.password).await?;
        let full_name = req
            .full_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| username.clone());

        let user = self
            .user_commands
            .create(
                NewUser {
                    username,
                    email,
                    password_hash,
                    full_name,
                    status: UserStatus::Active,
                },
                &role_ids,
                AuditRecord::new(AuditAction::Register, AuditResource::User).client(client),
            )
            .await?;

        info!(event = "user_registered", user_id = user.id, "User registered");
        self.session_for(user, &TokenIssuer::new_session_id()).await
    }

    async fn refresh(
        &self,
        refresh_token: &str,
        client: &ClientInfo,
    ) -> Result<AuthSession, AuthError> {
        let fail = |reason: &str, user_id: Option<i64>| {
            let mut record = AuditRecord::new(AuditAction::Refresh, AuditResource::Session)
                .client(client)
                .failure(reason);
            record.user_id = user_id;
            self.audit.record(record);
            AuthError::Unauthorized
        };

        let claims = self
            .issuer
            .verify_refresh(refresh_token)
            .map_err(|e| fail(e.reason(), None))?;
        let user_id = claims.user_id().map_err(|e| fail(e.reason(), None))?;

        if !self.issuer.consume_refresh(&claims).await? {
            return Err(fail("refresh_token_reused", Some(user_id)));
        }

        // Read after consuming so the new pair reflects the latest state.
        let user = match self.users.find_by_id(user_id).await {
            Ok(user) => user,
            Err(RepoError::NotFound) => return Err(fail("user_not_found", Some(user_id))),
            Err(e) => return Err(e.into()),
        };
        if let Some(rejection) = Rejection::for_status(user.status) {
            return Err(fail(rejection.reason(), Some(user_id)));
        }

        self.audit.record(
            AuditRecord::new(AuditAction::Refresh, AuditResource::Session)
                .actor(user.id, &user.username)
                .resource_id(user.id)
                .client(client)
                .detail(json!({ "session_id": claims.sid })),
        );
        self.session_for(user, &claims.sid).await
    }

    async fn logout(&self, refresh_token: &str, client: &ClientInfo) -> Result<(), AuthError> {
        let claims = self.issuer.verify_refresh(refresh_token).map_err(|e| {
            self.audit.record(
                AuditRecord::new(AuditAction::Logout, AuditResource::Session)
                    .client(client)
                    .failure(e.reason()),
            );
            AuthError::Unauthorized
        })?;

        self.issuer.revoke(&claims).await?;

        let mut record = AuditRecord::new(AuditAction::Logout, AuditResource::Session)
            .client(client)
            .detail(json!({ "session_id": claims.sid }));
        if let Ok(user_id) = claims.user_id() {
            record = match self.users.find_by_id(user_id).await {
                Ok(user) => record.actor(user.id, &user.username),
                Err(_) => {
                    record.user_id = Some(user_id);
                    record
                }
            };
        }
        self.audit.record(record);
        Ok(())
    }

    async fn authenticate(
        &self,
        bearer: &str,
        client: &ClientInfo,
    ) -> Result<Principal, AuthError> {
        if bearer.starts_with(PAT_SCHEME) {
            self.authenticate_pat(bearer, client).await
        } else {
            self.authenticate_session(bearer, client).await
        }
    }

    async fn change_password(
        &self,
        principal: &Principal,
        current_password: &str,
        new_password: &str,
        client: &ClientInfo,
    ) -> Result<(), AuthError> {
        if current_password == new_password {
            return Err(AuthError::Validation(
                "New password must be different from current password".to_string(),
            ));
        }

        let user = self.users.find_by_id(principal.user_id).await?;
        if !self
            .hasher
            .verify(current_password, Some(&user.password_hash))
            .await?
        {
            self.audit.record(
                AuditRecord::new(AuditAction::ChangePassword, AuditResource::User)
                    .by(principal)
                    .resource_id(user.id)
                    .client(client)
                    .failure("password_mismatch"),
            );
            return Err(AuthError::Validation(
                "Current password is incorrect".to_string(),
            ));
        }

        let hash = self.hasher.hash(new_password).await?;
        self.user_commands
            .update_password(
                user.id,
                &hash,
                AuditRecord::new(AuditAction::ChangePassword, AuditResource::User)
                    .by(principal)
                    .resource_id(user.id)
                    .client(client),
            )
            .await?;
        Ok(())
    }
}
