use axum::{
    Router,
    http::{HeaderValue, Method, StatusCode, header},
    middleware,
    routing::{MethodRouter, delete, get, patch, post, put},
};
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::state::SharedState;

mod audit_logs;
pub mod auth;
mod error;
mod menus;
mod observability;
mod overview;
mod permissions;
mod profile;
mod roles;
mod settings;
mod system;
mod tokens;
mod two_factor;
mod types;
mod users;
mod validation;

pub use error::ApiError;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in partial updates.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub fn router(state: Arc<AppState>) -> Router {
    let (cors_origins, request_timeout) = {
        let config = state.config();
        (
            config.server.cors_allowed_origins.clone(),
            Duration::from_secs(config.general.request_timeout_seconds.max(1)),
        )
    };

    let protected_routes = create_protected_router(state.clone());

    let api_router = Router::new()
        .merge(protected_routes)
        .route("/health", get(system::health))
        .route("/auth/captcha", get(auth::get_captcha))
        .route("/auth/login", post(auth::login))
        .route("/auth/login/2fa", post(auth::login_second_factor))
        .route("/auth/register", post(auth::register))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .with_state(state)
        .layer(middleware::from_fn(observability::logging_middleware));

    let cors_layer = if cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .layer(
            cors_layer
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        )
        .layer(deadline(request_timeout))
        .layer(middleware::from_fn(observability::security_headers_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Requests that outlive `timeout` are dropped and answered with 503.
fn deadline(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::SERVICE_UNAVAILABLE, timeout)
}

/// Guards a single route with a permission check.
fn scoped(route: MethodRouter<Arc<AppState>>, scope: &'static str) -> MethodRouter<Arc<AppState>> {
    route.route_layer(middleware::from_fn_with_state(scope, auth::require_scope))
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        // Own account
        .route("/user/profile", scoped(get(profile::get_profile), "user:profile:read"))
        .route("/user/profile", scoped(put(profile::update_profile), "user:profile:update"))
        .route("/user/password", scoped(put(profile::change_password), "user:password:update"))
        .route("/user/account", scoped(delete(profile::delete_account), "user:profile:delete"))
        .route("/auth/2fa/setup", scoped(post(two_factor::setup), "user:2fa:manage"))
        .route("/auth/2fa/verify", scoped(post(two_factor::verify), "user:2fa:manage"))
        .route("/auth/2fa/disable", scoped(post(two_factor::disable), "user:2fa:manage"))
        .route("/auth/2fa/status", scoped(get(two_factor::status), "user:2fa:manage"))
        .route("/user/tokens", scoped(post(tokens::create_token), "user:tokens:create"))
        .route("/user/tokens", scoped(get(tokens::list_tokens), "user:tokens:read"))
        .route("/user/tokens/{id}", scoped(get(tokens::get_token), "user:tokens:read"))
        .route("/user/tokens/{id}", scoped(delete(tokens::delete_token), "user:tokens:delete"))
        .route(
            "/user/tokens/{id}/enable",
            scoped(patch(tokens::enable_token), "user:tokens:update"),
        )
        .route(
            "/user/tokens/{id}/disable",
            scoped(patch(tokens::disable_token), "user:tokens:update"),
        )
        // Users
        .route("/admin/users", scoped(get(users::list_users), "admin:users:read"))
        .route("/admin/users", scoped(post(users::create_user), "admin:users:create"))
        .route(
            "/admin/users/batch",
            scoped(post(users::batch_create_users), "admin:users:create"),
        )
        .route("/admin/users/{id}", scoped(get(users::get_user), "admin:users:read"))
        .route("/admin/users/{id}", scoped(put(users::update_user), "admin:users:update"))
        .route("/admin/users/{id}", scoped(delete(users::delete_user), "admin:users:delete"))
        .route(
            "/admin/users/{id}/roles",
            scoped(put(users::assign_roles), "admin:users:update"),
        )
        // Roles and permissions
        .route("/admin/roles", scoped(get(roles::list_roles), "admin:roles:read"))
        .route("/admin/roles", scoped(post(roles::create_role), "admin:roles:create"))
        .route("/admin/roles/{id}", scoped(get(roles::get_role), "admin:roles:read"))
        .route("/admin/roles/{id}", scoped(put(roles::update_role), "admin:roles:update"))
        .route("/admin/roles/{id}", scoped(delete(roles::delete_role), "admin:roles:delete"))
        .route(
            "/admin/roles/{id}/permissions",
            scoped(put(roles::set_permissions), "admin:roles:update"),
        )
        .route(
            "/admin/permissions",
            scoped(get(permissions::list_permissions), "admin:permissions:read"),
        )
        .route(
            "/admin/permissions",
            scoped(post(permissions::create_permission), "admin:permissions:create"),
        )
        .route(
            "/admin/permissions/{id}",
            scoped(delete(permissions::delete_permission), "admin:permissions:delete"),
        )
        // Audit trail
        .route(
            "/admin/auditlogs",
            scoped(get(audit_logs::list_audit_logs), "admin:audit_logs:read"),
        )
        .route(
            "/admin/auditlogs/{id}",
            scoped(get(audit_logs::get_audit_log), "admin:audit_logs:read"),
        )
        // Menus
        .route("/admin/menus", scoped(get(menus::list_menus), "admin:menus:read"))
        .route("/admin/menus", scoped(post(menus::create_menu), "admin:menus:create"))
        .route(
            "/admin/menus/reorder",
            scoped(post(menus::reorder_menus), "admin:menus:update"),
        )
        .route("/admin/menus/{id}", scoped(get(menus::get_menu), "admin:menus:read"))
        .route("/admin/menus/{id}", scoped(put(menus::update_menu), "admin:menus:update"))
        .route("/admin/menus/{id}", scoped(delete(menus::delete_menu), "admin:menus:delete"))
        // Settings
        .route("/admin/settings", scoped(get(settings::list_settings), "admin:settings:read"))
        .route(
            "/admin/settings",
            scoped(post(settings::create_setting), "admin:settings:create"),
        )
        .route(
            "/admin/settings",
            scoped(put(settings::batch_update_settings), "admin:settings:update"),
        )
        .route(
            "/admin/settings/{key}",
            scoped(get(settings::get_setting), "admin:settings:read"),
        )
        .route(
            "/admin/settings/{key}",
            scoped(put(settings::update_setting), "admin:settings:update"),
        )
        .route(
            "/admin/settings/{key}",
            scoped(delete(settings::delete_setting), "admin:settings:delete"),
        )
        // Overview and metrics
        .route(
            "/admin/overview/stats",
            scoped(get(overview::get_overview), "admin:overview:read"),
        )
        .route("/metrics", scoped(get(observability::get_metrics), "admin:overview:read"))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_answers_service_unavailable() {
        let app = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .layer(deadline(Duration::from_secs(1)));

        let response = app
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
