use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use warden::config::Config;
use warden::state::SharedState;

const DEV_SECRET: &str = "dev-secret-change-me";
const ADMIN_PASSWORD: &str = "admin123";

struct TestApp {
    router: Router,
    shared: Arc<SharedState>,
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.general.database_url = "sqlite::memory:".to_string();
    config.auth.jwt_secret = "integration-test-secret-at-least-32-bytes".to_string();
    config.captcha.dev_secret = Some(DEV_SECRET.to_string());
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;
    config.security.argon2_parallelism = 1;
    config
}

async fn spawn_app() -> TestApp {
    let shared = Arc::new(
        SharedState::new(test_config())
            .await
            .expect("Failed to create shared state"),
    );
    let state = warden::api::create_app_state(Arc::clone(&shared), None);
    TestApp {
        router: warden::api::router(state),
        shared,
    }
}

impl TestApp {
    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, Some(token), None).await
    }

    async fn captcha(&self, code: &str) -> String {
        let (status, body) = self
            .send(
                Method::GET,
                &format!("/api/auth/captcha?code={code}&secret={DEV_SECRET}"),
                None,
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], code);
        body["id"].as_str().unwrap().to_string()
    }

    async fn try_login(&self, account: &str, password: &str, extra: Value) -> (StatusCode, Value) {
        let captcha_id = self.captcha("9999").await;
        let mut body = json!({
            "account": account,
            "password": password,
            "captcha_id": captcha_id,
            "captcha": "9999",
        });
        if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            body.extend(extra.clone());
        }
        self.send(Method::POST, "/api/auth/login", None, Some(body))
            .await
    }

    async fn login(&self, account: &str, password: &str) -> Value {
        let (status, body) = self.try_login(account, password, json!({})).await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body
    }

    async fn admin_token(&self) -> String {
        self.login("admin", ADMIN_PASSWORD).await["access_token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    async fn role_id(&self, admin: &str, name: &str) -> i64 {
        let (status, body) = self
            .get(&format!("/api/admin/roles?keyword={name}"), admin)
            .await;
        assert_eq!(status, StatusCode::OK);
        body["data"]
            .as_array()
            .unwrap()
            .iter()
            .find(|r| r["name"] == name)
            .and_then(|r| r["id"].as_i64())
            .unwrap()
    }

    async fn create_user(&self, admin: &str, username: &str, role_ids: &[i64]) -> i64 {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/admin/users",
                Some(admin),
                Some(json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": "secret-pass",
                    "role_ids": role_ids,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create user failed: {body}");
        body["id"].as_i64().unwrap()
    }

    async fn create_menu(&self, admin: &str, title: &str, parent_id: Option<i64>) -> i64 {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/admin/menus",
                Some(admin),
                Some(json!({
                    "title": title,
                    "path": format!("/{}", title.to_lowercase()),
                    "parent_id": parent_id,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create menu failed: {body}");
        body["id"].as_i64().unwrap()
    }

    async fn set_status(&self, admin: &str, user_id: i64, status: &str) {
        let (code, body) = self
            .send(
                Method::PUT,
                &format!("/api/admin/users/{user_id}"),
                Some(admin),
                Some(json!({ "status": status })),
            )
            .await;
        assert_eq!(code, StatusCode::OK, "status change failed: {body}");
    }

    async fn create_token(&self, owner: &str, permissions: &[&str]) -> (i64, String) {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/user/tokens",
                Some(owner),
                Some(json!({ "name": "cli", "permissions": permissions })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create token failed: {body}");
        (
            body["id"].as_i64().unwrap(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    /// Enrolls `username` in 2FA and returns the secret and recovery codes.
    async fn enable_two_factor(&self, access: &str, username: &str) -> (String, Vec<String>) {
        let (status, setup) = self
            .send(Method::POST, "/api/auth/2fa/setup", Some(access), None)
            .await;
        assert_eq!(status, StatusCode::OK, "{setup}");
        let secret = setup["secret"].as_str().unwrap().to_string();

        let (status, verified) = self
            .send(
                Method::POST,
                "/api/auth/2fa/verify",
                Some(access),
                Some(json!({ "code": self.totp(&secret, username) })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{verified}");
        let codes = serde_json::from_value(verified["recovery_codes"].clone()).unwrap();
        (secret, codes)
    }

    fn totp(&self, secret: &str, username: &str) -> String {
        let issuer = &self.shared.config.security.totp_issuer;
        warden::crypto::totp::current_code(secret, issuer, username).unwrap()
    }

    async fn audit_entries(&self, admin: &str, query: &str) -> Vec<Value> {
        self.shared.audit.flush().await;
        let (status, body) = self
            .get(&format!("/api/admin/auditlogs?per_page=100&{query}"), admin)
            .await;
        assert_eq!(status, StatusCode::OK);
        body["data"].as_array().unwrap().clone()
    }
}

fn jwt_payload(token: &str) -> Value {
    let payload = token.split('.').nth(1).unwrap();
    serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap()
}

#[tokio::test]
async fn test_health_is_public() {
    let app = spawn_app().await;
    let (status, body) = app.send(Method::GET, "/api/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["checks"]["database"], true);
}

#[tokio::test]
async fn test_login_and_fetch_profile() {
    let app = spawn_app().await;

    let session = app.login("admin", ADMIN_PASSWORD).await;
    assert_eq!(session["token_type"], "Bearer");
    assert!(session["refresh_token"].is_string());
    assert_eq!(session["user"]["username"], "admin");

    let access = session["access_token"].as_str().unwrap();
    let (status, body) = app.get("/api/user/profile", access).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "admin");
    assert_eq!(body["roles"][0]["name"], "admin");
}

#[tokio::test]
async fn test_wrong_captcha_is_rejected_and_consumed() {
    let app = spawn_app().await;
    let captcha_id = app.captcha("9999").await;

    let attempt = |captcha: &str| {
        json!({
            "account": "admin",
            "password": ADMIN_PASSWORD,
            "captcha_id": captcha_id,
            "captcha": captcha,
        })
    };

    let (status, body) = app
        .send(Method::POST, "/api/auth/login", None, Some(attempt("0000")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    // The challenge was spent by the failed attempt.
    let (status, _) = app
        .send(Method::POST, "/api/auth/login", None, Some(attempt("9999")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let admin = app.admin_token().await;
    let failures = app
        .audit_entries(&admin, "action=login&status=failure")
        .await;
    assert_eq!(failures.len(), 2);
    assert!(
        failures
            .iter()
            .all(|e| e["details"]["reason"] == "captcha_mismatch")
    );
}

#[tokio::test]
async fn test_unauthenticated_requests_are_rejected() {
    let app = spawn_app().await;

    let (status, body) = app.send(Method::GET, "/api/user/profile", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = app.get("/api/user/profile", "not-a-token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_disabled_token_cannot_mutate() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;

    let (status, created) = app
        .send(
            Method::POST,
            "/api/user/tokens",
            Some(&admin),
            Some(json!({
                "name": "t",
                "permissions": ["user:profile:read", "user:profile:update"],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let pat = created["token"].as_str().unwrap().to_string();
    let pat_id = created["id"].as_i64().unwrap();

    let (status, _) = app.get("/api/user/profile", &pat).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(
            Method::PATCH,
            &format!("/api/user/tokens/{pat_id}/disable"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "disabled");

    let (status, _) = app
        .send(
            Method::PUT,
            "/api/user/profile",
            Some(&pat),
            Some(json!({ "full_name": "Changed By Token" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, profile) = app.get("/api/user/profile", &admin).await;
    assert_eq!(profile["full_name"], "Administrator");

    let (status, tokens) = app.get("/api/user/tokens", &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tokens.as_array().unwrap().len(), 1);
    assert!(tokens[0].get("token").is_none());
}

#[tokio::test]
async fn test_token_loses_permissions_with_owner_roles() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;

    let user_role = app.role_id(&admin, "user").await;
    let alice_id = app.create_user(&admin, "alice", &[user_role]).await;

    let alice = app.login("alice", "secret-pass").await;
    let alice_access = alice["access_token"].as_str().unwrap();

    let (status, created) = app
        .send(
            Method::POST,
            "/api/user/tokens",
            Some(alice_access),
            Some(json!({ "name": "cli", "permissions": ["user:profile:read"] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let pat = created["token"].as_str().unwrap().to_string();

    let (status, _) = app.get("/api/user/profile", &pat).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(
            Method::PUT,
            &format!("/api/admin/users/{alice_id}/roles"),
            Some(&admin),
            Some(json!({ "role_ids": [] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get("/api/user/profile", &pat).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_token_cannot_exceed_owner_permissions() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;

    let user_role = app.role_id(&admin, "user").await;
    app.create_user(&admin, "bob", &[user_role]).await;
    let bob = app.login("bob", "secret-pass").await;

    let (status, _) = app
        .send(
            Method::POST,
            "/api/user/tokens",
            bob["access_token"].as_str(),
            Some(json!({ "name": "escalate", "permissions": ["admin:users:read"] })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_refresh_reflects_current_roles() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;

    let user_role = app.role_id(&admin, "user").await;
    let admin_role = app.role_id(&admin, "admin").await;
    let carol_id = app.create_user(&admin, "carol", &[user_role]).await;

    let session = app.login("carol", "secret-pass").await;
    let roles = jwt_payload(session["access_token"].as_str().unwrap())["roles"].clone();
    assert_eq!(roles, json!(["user"]));

    let (status, _) = app
        .send(
            Method::PUT,
            &format!("/api/admin/users/{carol_id}/roles"),
            Some(&admin),
            Some(json!({ "role_ids": [user_role, admin_role] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let refresh_token = session["refresh_token"].as_str().unwrap();
    let (status, refreshed) = app
        .send(
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({ "refresh_token": refresh_token })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{refreshed}");

    let claims = jwt_payload(refreshed["access_token"].as_str().unwrap());
    let mut roles: Vec<String> = serde_json::from_value(claims["roles"].clone()).unwrap();
    roles.sort();
    assert_eq!(roles, vec!["admin", "user"]);

    // Refresh tokens are single-use.
    let (status, _) = app
        .send(
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({ "refresh_token": refresh_token })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let app = spawn_app().await;
    let session = app.login("admin", ADMIN_PASSWORD).await;
    let refresh = json!({ "refresh_token": session["refresh_token"] });

    let (status, _) = app
        .send(Method::POST, "/api/auth/logout", None, Some(refresh.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(Method::POST, "/api/auth/refresh", None, Some(refresh))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_menu_cycle_and_delete_with_children() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;

    let m1 = app.create_menu(&admin, "Reports", None).await;
    let m2 = app.create_menu(&admin, "Daily", Some(m1)).await;

    let (status, body) = app
        .send(
            Method::PUT,
            &format!("/api/admin/menus/{m1}"),
            Some(&admin),
            Some(json!({ "parent_id": m1 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = app
        .send(
            Method::PUT,
            &format!("/api/admin/menus/{m1}"),
            Some(&admin),
            Some(json!({ "parent_id": m2 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(
            Method::DELETE,
            &format!("/api/admin/menus/{m1}"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (status, tree) = app.get("/api/admin/menus", &admin).await;
    assert_eq!(status, StatusCode::OK);
    let reports = tree
        .as_array()
        .unwrap()
        .iter()
        .find(|n| n["id"] == m1)
        .unwrap();
    assert_eq!(reports["children"][0]["id"], m2);
}

#[tokio::test]
async fn test_system_roles_are_protected() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let admin_role = app.role_id(&admin, "admin").await;

    let (status, _) = app
        .send(
            Method::DELETE,
            &format!("/api/admin/roles/{admin_role}"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            Method::PUT,
            &format!("/api/admin/roles/{admin_role}"),
            Some(&admin),
            Some(json!({ "name": "superuser" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, role) = app
        .send(
            Method::POST,
            "/api/admin/roles",
            Some(&admin),
            Some(json!({ "name": "auditor", "description": "Reads the audit trail" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{role}");
    assert_eq!(role["display_name"], "auditor");

    let (status, _) = app
        .send(
            Method::POST,
            "/api/admin/roles",
            Some(&admin),
            Some(json!({ "name": "auditor" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_missing_permission_is_forbidden() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;

    let user_role = app.role_id(&admin, "user").await;
    app.create_user(&admin, "dave", &[user_role]).await;
    let dave = app.login("dave", "secret-pass").await;
    let dave_access = dave["access_token"].as_str().unwrap();

    let (status, body) = app.get("/api/admin/users", dave_access).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["error"]["message"],
        "missing permission admin:users:read"
    );

    let (status, _) = app.get("/api/user/profile", dave_access).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_register_grants_default_role() {
    let app = spawn_app().await;
    let captcha_id = app.captcha("4242").await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "username": "Erin",
                "email": "Erin@Example.com",
                "password": "secret-pass",
                "captcha_id": captcha_id,
                "captcha": "4242",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["user"]["username"], "erin");
    assert_eq!(body["user"]["email"], "erin@example.com");
    assert_eq!(body["user"]["roles"][0]["name"], "user");

    let captcha_id = app.captcha("4242").await;
    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "username": "erin",
                "email": "other@example.com",
                "password": "secret-pass",
                "captcha_id": captcha_id,
                "captcha": "4242",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["details"]["field"], "username");
}

#[tokio::test]
async fn test_two_factor_login_flow() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let (secret, recovery_codes) = app.enable_two_factor(&admin, "admin").await;
    assert!(!recovery_codes.is_empty());

    let (status, body) = app.try_login("admin", ADMIN_PASSWORD, json!({})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["details"]["requires_2fa"], true);
    let session_token = body["error"]["details"]["session_token"]
        .as_str()
        .unwrap()
        .to_string();

    // The second step needs no new CAPTCHA.
    let second_step = json!({
        "session_token": session_token,
        "totp_code": app.totp(&secret, "admin"),
    });
    let (status, session) = app
        .send(Method::POST, "/api/auth/login/2fa", None, Some(second_step.clone()))
        .await;
    assert_eq!(status, StatusCode::OK, "{session}");
    assert_eq!(session["user"]["username"], "admin");
    assert!(session["access_token"].is_string());

    // A session token is redeemed once.
    let (status, body) = app
        .send(Method::POST, "/api/auth/login/2fa", None, Some(second_step))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "invalid credentials");

    // A code sent with the first step completes the login directly.
    let (status, _) = app
        .try_login(
            "admin",
            ADMIN_PASSWORD,
            json!({ "totp_code": app.totp(&secret, "admin") }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.try_login("admin", ADMIN_PASSWORD, json!({})).await;
    let recovery = &recovery_codes[0];
    let (status, _) = app
        .send(
            Method::POST,
            "/api/auth/login/2fa",
            None,
            Some(json!({
                "session_token": body["error"]["details"]["session_token"],
                "recovery_code": recovery,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Recovery codes are single-use.
    let (status, _) = app
        .try_login("admin", ADMIN_PASSWORD, json!({ "recovery_code": recovery }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.get("/api/auth/2fa/status", &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], true);
    assert_eq!(
        body["recovery_codes_remaining"].as_u64().unwrap() as usize,
        recovery_codes.len() - 1
    );
}

#[tokio::test]
async fn test_second_step_rejects_wrong_code_and_spends_token() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let (secret, _) = app.enable_two_factor(&admin, "admin").await;

    let (_, body) = app.try_login("admin", ADMIN_PASSWORD, json!({})).await;
    let session_token = body["error"]["details"]["session_token"].clone();

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/login/2fa",
            None,
            Some(json!({ "session_token": session_token, "totp_code": "000000" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "invalid credentials");

    let (status, _) = app
        .send(
            Method::POST,
            "/api/auth/login/2fa",
            None,
            Some(json!({
                "session_token": session_token,
                "totp_code": app.totp(&secret, "admin"),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/login/2fa",
            None,
            Some(json!({ "session_token": "never-issued" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_disabled_two_factor_account_looks_like_wrong_password() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let user_role = app.role_id(&admin, "user").await;
    let dave_id = app.create_user(&admin, "dave", &[user_role]).await;

    let dave = app.login("dave", "secret-pass").await;
    let (_, recovery_codes) = app
        .enable_two_factor(dave["access_token"].as_str().unwrap(), "dave")
        .await;

    app.set_status(&admin, dave_id, "banned").await;

    let (right_status, right) = app.try_login("dave", "secret-pass", json!({})).await;
    let (wrong_status, wrong) = app.try_login("dave", "not-the-password", json!({})).await;
    assert_eq!(right_status, StatusCode::UNAUTHORIZED);
    assert_eq!(right_status, wrong_status);
    assert_eq!(right, wrong);
    assert_eq!(right["error"]["message"], "invalid credentials");

    // A banned account cannot spend its recovery codes.
    let (status, _) = app
        .try_login(
            "dave",
            "secret-pass",
            json!({ "recovery_code": recovery_codes[0] }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    app.set_status(&admin, dave_id, "active").await;
    let (status, _) = app
        .try_login(
            "dave",
            "secret-pass",
            json!({ "recovery_code": recovery_codes[0] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let reasons: Vec<Value> = app
        .audit_entries(&admin, &format!("user_id={dave_id}&action=login&status=failure"))
        .await
        .into_iter()
        .map(|e| e["details"]["reason"].clone())
        .collect();
    assert_eq!(
        reasons.iter().filter(|r| *r == "user_banned").count(),
        2,
        "{reasons:?}"
    );
    assert!(reasons.contains(&json!("password_mismatch")));
}

#[tokio::test]
async fn test_settings_batch_update_is_typed() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;

    let (status, _) = app
        .send(
            Method::POST,
            "/api/admin/settings",
            Some(&admin),
            Some(json!({
                "key": "mail.retry_limit",
                "value": "3",
                "value_type": "number",
                "category": "notification",
                "label": "Retry limit",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .send(
            Method::PUT,
            "/api/admin/settings",
            Some(&admin),
            Some(json!({ "settings": { "mail.retry_limit": "many" } })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = app
        .send(
            Method::PUT,
            "/api/admin/settings",
            Some(&admin),
            Some(json!({ "settings": { "mail.retry_limit": "5" } })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get("/api/admin/settings/mail.retry_limit", &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"], "5");
}

#[tokio::test]
async fn test_overview_counts() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;

    let user_role = app.role_id(&admin, "user").await;
    app.create_user(&admin, "frank", &[user_role]).await;

    let (status, body) = app.get("/api/admin/overview/stats", &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["users"]["total"], 2);
    assert_eq!(body["users"]["active"], 2);
    assert_eq!(body["roles"], 2);
    assert!(body["recent_activity"].is_array());
}

#[tokio::test]
async fn test_batch_create_reports_each_entry() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/users/batch",
            Some(&admin),
            Some(json!({
                "users": [
                    { "username": "gina", "email": "gina@example.com", "password": "secret-pass" },
                    { "username": "x", "email": "x@example.com", "password": "secret-pass" },
                    { "username": "admin", "email": "dup@example.com", "password": "secret-pass" },
                ]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let results = body.as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["success"], true);
    assert_eq!(results[1]["success"], false);
    assert_eq!(results[2]["success"], false);
    assert_eq!(results[2]["index"], 2);
}

#[tokio::test]
async fn test_inactive_and_banned_accounts_cannot_log_in() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let user_role = app.role_id(&admin, "user").await;
    let erin_id = app.create_user(&admin, "erin", &[user_role]).await;

    for status in ["inactive", "banned"] {
        app.set_status(&admin, erin_id, status).await;
        let (code, body) = app.try_login("erin", "secret-pass", json!({})).await;
        assert_eq!(code, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["message"], "invalid credentials");
        assert!(body["error"].get("details").is_none());
    }

    let mut reasons: Vec<String> = app
        .audit_entries(&admin, &format!("user_id={erin_id}&action=login&status=failure"))
        .await
        .iter()
        .map(|e| e["details"]["reason"].as_str().unwrap().to_string())
        .collect();
    reasons.sort();
    assert_eq!(reasons, vec!["user_banned", "user_inactive"]);
}

#[tokio::test]
async fn test_successful_login_is_audited_once() {
    let app = spawn_app().await;
    let session = app.login("admin", ADMIN_PASSWORD).await;
    let admin = session["access_token"].as_str().unwrap();

    let entries = app.audit_entries(admin, "action=login&status=success").await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["user_id"], session["user"]["id"]);
    assert_eq!(entries[0]["details"]["method"], "password");
    assert!(entries[0]["details"]["session_id"].is_string());
}

#[tokio::test]
async fn test_token_fails_when_owner_is_banned_or_deleted() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let user_role = app.role_id(&admin, "user").await;
    let gwen_id = app.create_user(&admin, "gwen", &[user_role]).await;

    let gwen = app.login("gwen", "secret-pass").await;
    let (_, pat) = app
        .create_token(gwen["access_token"].as_str().unwrap(), &["user:profile:read"])
        .await;

    let (status, _) = app.get("/api/user/profile", &pat).await;
    assert_eq!(status, StatusCode::OK);

    app.set_status(&admin, gwen_id, "banned").await;
    let (status, _) = app.get("/api/user/profile", &pat).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    app.set_status(&admin, gwen_id, "active").await;
    let (status, _) = app.get("/api/user/profile", &pat).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(
            Method::DELETE,
            &format!("/api/admin/users/{gwen_id}"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get("/api/user/profile", &pat).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let reasons: Vec<Value> = app
        .audit_entries(&admin, "action=authenticate&status=failure")
        .await
        .into_iter()
        .map(|e| e["details"]["reason"].clone())
        .collect();
    assert!(reasons.contains(&json!("user_banned")), "{reasons:?}");
    assert!(reasons.contains(&json!("user_not_found")), "{reasons:?}");
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    use chrono::{Duration, Utc};
    use sea_orm::{ActiveModelTrait, EntityTrait, Set};
    use warden::entities::personal_access_tokens;

    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let (pat_id, pat) = app.create_token(&admin, &["user:profile:read"]).await;

    let (status, _) = app.get("/api/user/profile", &pat).await;
    assert_eq!(status, StatusCode::OK);

    let conn = &app.shared.store.conn;
    let model = personal_access_tokens::Entity::find_by_id(pat_id)
        .one(conn)
        .await
        .unwrap()
        .unwrap();
    let mut active: personal_access_tokens::ActiveModel = model.into();
    active.expires_at = Set(Some(Utc::now() - Duration::hours(1)));
    active.update(conn).await.unwrap();

    let (status, body) = app.get("/api/user/profile", &pat).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let entries = app
        .audit_entries(&admin, "action=authenticate&status=failure")
        .await;
    assert!(entries.iter().any(|e| e["details"]["reason"] == "pat_expired"));
}

#[tokio::test]
async fn test_user_can_delete_own_account() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let user_role = app.role_id(&admin, "user").await;
    let hank_id = app.create_user(&admin, "hank", &[user_role]).await;

    let hank = app.login("hank", "secret-pass").await;
    let access = hank["access_token"].as_str().unwrap();

    let (status, body) = app
        .send(Method::DELETE, "/api/user/account", Some(access), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, _) = app.get("/api/user/profile", access).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.try_login("hank", "secret-pass", json!({})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "invalid credentials");

    let (status, _) = app.get(&format!("/api/admin/users/{hank_id}"), &admin).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let entries = app
        .audit_entries(&admin, &format!("user_id={hank_id}&action=delete"))
        .await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["details"]["scope"], "account");
}
