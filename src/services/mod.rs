pub mod error;
pub use error::{NotFoundExt, ServiceError};

pub mod audit;
pub use audit::AuditWriter;

pub mod captcha;
pub use captcha::{CaptchaChallenge, CaptchaService};

pub mod throttle;
pub use throttle::LoginThrottle;

pub mod token_issuer;
pub use token_issuer::{LoginChallenge, TokenIssuer, TokenPair};

pub mod rbac;
pub use rbac::PermissionEvaluator;

pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{
    AuthError, AuthService, AuthSession, LoginRequest, RegisterRequest, SecondFactorRequest,
};
pub use auth_service_impl::DefaultAuthService;

pub mod two_factor;
pub use two_factor::{TwoFactorService, TwoFactorSetup, TwoFactorStatus};

pub mod pat_service;
pub use pat_service::{CreatePat, CreatedPat, PatService};

pub mod user_service;
pub mod user_service_impl;
pub use user_service::{BatchCreateResult, CreateUser, ProfileChanges, UserService};
pub use user_service_impl::SeaOrmUserService;

pub mod role_service;
pub mod role_service_impl;
pub use role_service::{RoleDetail, RoleService};
pub use role_service_impl::SeaOrmRoleService;

pub mod menu_service;
pub mod menu_service_impl;
pub use menu_service::MenuService;
pub use menu_service_impl::SeaOrmMenuService;

pub mod setting_service;
pub mod setting_service_impl;
pub use setting_service::SettingService;
pub use setting_service_impl::SeaOrmSettingService;

pub mod audit_log_service;
pub use audit_log_service::AuditLogService;

pub mod stats_service;
pub use stats_service::{Overview, StatsService};

pub mod scheduler;
pub use scheduler::Scheduler;
