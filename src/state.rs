use std::sync::Arc;

use crate::config::Config;
use crate::crypto::PasswordHasher;
use crate::db::Store;
use crate::db::repositories::Repositories;
use crate::services::{
    AuditLogService, AuditWriter, AuthService, CaptchaService, DefaultAuthService, LoginThrottle,
    MenuService, PatService, PermissionEvaluator, RoleService, SeaOrmMenuService,
    SeaOrmRoleService, SeaOrmSettingService, SeaOrmUserService, SettingService, StatsService,
    TokenIssuer, TwoFactorService, UserService,
};

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub repos: Repositories,

    pub audit: Arc<AuditWriter>,

    pub throttle: Arc<LoginThrottle>,

    pub issuer: Arc<TokenIssuer>,

    pub evaluator: Arc<PermissionEvaluator>,

    pub captcha: Arc<CaptchaService>,

    pub auth_service: Arc<dyn AuthService>,

    pub user_service: Arc<dyn UserService>,

    pub role_service: Arc<dyn RoleService>,

    pub menu_service: Arc<dyn MenuService>,

    pub setting_service: Arc<dyn SettingService>,

    pub pat_service: Arc<PatService>,

    pub two_factor: Arc<TwoFactorService>,

    pub audit_logs: Arc<AuditLogService>,

    pub stats: Arc<StatsService>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_url,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;
        Self::with_store(config, store)
    }

    /// Wires every service on top of an already migrated store.
    pub fn with_store(config: Config, store: Store) -> anyhow::Result<Self> {
        let repos = Repositories::new(&store.conn);

        let hasher = Arc::new(
            PasswordHasher::new(&config.security)
                .map_err(|e| anyhow::anyhow!("Invalid password hashing parameters: {e}"))?,
        );
        let audit = AuditWriter::spawn(repos.audit_logs.clone(), &config.audit);
        let throttle = Arc::new(LoginThrottle::new(&config.security.auth_throttle));
        let issuer = Arc::new(TokenIssuer::new(&config.auth, repos.cache.clone()));
        let evaluator = Arc::new(PermissionEvaluator::new(repos.roles.clone()));
        let captcha = Arc::new(CaptchaService::new(repos.captcha.clone(), &config.captcha));

        let auth_service = Arc::new(DefaultAuthService::new(
            &repos,
            evaluator.clone(),
            issuer.clone(),
            captcha.clone(),
            hasher.clone(),
            throttle.clone(),
            audit.clone(),
            &config,
        )) as Arc<dyn AuthService>;

        let user_service =
            Arc::new(SeaOrmUserService::new(&repos, hasher)) as Arc<dyn UserService>;
        let role_service = Arc::new(SeaOrmRoleService::new(&repos)) as Arc<dyn RoleService>;
        let menu_service = Arc::new(SeaOrmMenuService::new(&repos)) as Arc<dyn MenuService>;
        let setting_service =
            Arc::new(SeaOrmSettingService::new(&repos)) as Arc<dyn SettingService>;

        let pat_service = Arc::new(PatService::new(&repos));
        let two_factor = Arc::new(TwoFactorService::new(&repos, &config.security));
        let audit_logs = Arc::new(AuditLogService::new(&repos));
        let stats = Arc::new(StatsService::new(&repos));

        Ok(Self {
            config: Arc::new(config),
            store,
            repos,
            audit,
            throttle,
            issuer,
            evaluator,
            captcha,
            auth_service,
            user_service,
            role_service,
            menu_service,
            setting_service,
            pat_service,
            two_factor,
            audit_logs,
            stats,
        })
    }
}
