use axum::extract::{ConnectInfo, FromRequest, FromRequestParts};
use axum::http::request::Parts;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use super::{ApiError, AppState};
use crate::domain::{
    ClientInfo, Page, PageRequest, PersonalAccessToken, Principal, Role, UserStatus, UserWithRoles,
};
use crate::services::{AuthSession, TokenPair};

/// `Json` whose rejections use the API error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl From<&PageQuery> for PageRequest {
    fn from(q: &PageQuery) -> Self {
        Self::new(q.page, q.per_page)
    }
}

#[derive(Debug, Serialize)]
pub struct PageMeta {
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
    pub has_more: bool,
}

/// List envelope: `{ "data": [...], "meta": {...} }`.
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

impl<T> From<Page<T>> for Paginated<T> {
    fn from(page: Page<T>) -> Self {
        let meta = PageMeta {
            total: page.total,
            page: page.page,
            per_page: page.per_page,
            total_pages: page.total_pages(),
            has_more: page.has_more(),
        };
        Self {
            data: page.items,
            meta,
        }
    }
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RoleSummary {
    pub id: i64,
    pub name: String,
    pub display_name: String,
}

impl From<&Role> for RoleSummary {
    fn from(role: &Role) -> Self {
        Self {
            id: role.id,
            name: role.name.clone(),
            display_name: role.display_name.clone(),
        }
    }
}

/// Public view of an account. Credential material never leaves the server.
#[derive(Debug, Serialize)]
pub struct UserDto {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub status: UserStatus,
    pub two_factor_enabled: bool,
    pub roles: Vec<RoleSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserWithRoles> for UserDto {
    fn from(u: UserWithRoles) -> Self {
        let two_factor_enabled = u.user.requires_second_factor();
        Self {
            id: u.user.id,
            username: u.user.username,
            email: u.user.email,
            full_name: u.user.full_name,
            avatar: u.user.avatar,
            bio: u.user.bio,
            status: u.user.status,
            two_factor_enabled,
            roles: u.roles.iter().map(RoleSummary::from).collect(),
            created_at: u.user.created_at,
            updated_at: u.user.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: UserDto,
}

impl From<AuthSession> for TokenResponse {
    fn from(session: AuthSession) -> Self {
        Self {
            tokens: session.tokens,
            user: session.user.into(),
        }
    }
}

/// PAT metadata. Neither the hash nor the plaintext is included.
#[derive(Debug, Serialize)]
pub struct PatDto {
    pub id: i64,
    pub name: String,
    pub token_prefix: String,
    pub permissions: Vec<String>,
    pub status: crate::domain::PatStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<PersonalAccessToken> for PatDto {
    fn from(t: PersonalAccessToken) -> Self {
        Self {
            id: t.id,
            name: t.name,
            token_prefix: t.token_prefix,
            permissions: t.permissions,
            status: t.status,
            expires_at: t.expires_at,
            last_used_at: t.last_used_at,
            created_at: t.created_at,
        }
    }
}

impl FromRequestParts<Arc<AppState>> for ClientInfo {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        let ip = client_ip(
            peer,
            forwarded_for(parts),
            &state.config().server.trusted_proxy_ips,
        );

        let user_agent = parts
            .headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);

        Ok(Self {
            ip: ip.map(|ip| ip.to_string()),
            user_agent,
        })
    }
}

fn forwarded_for(parts: &Parts) -> Option<IpAddr> {
    parts
        .headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| {
            parts
                .headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
        })
        .and_then(|v| v.trim().parse().ok())
}

/// Forwarding headers are only believed when the direct peer is a
/// configured proxy.
fn client_ip(peer: Option<IpAddr>, forwarded: Option<IpAddr>, trusted: &[String]) -> Option<IpAddr> {
    match peer {
        Some(peer) if trusted.iter().any(|t| t.parse::<IpAddr>().is_ok_and(|t| t == peer)) => {
            forwarded.or(Some(peer))
        }
        Some(peer) => Some(peer),
        None => None,
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(ApiError::unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_header_needs_a_trusted_peer() {
        let proxy: IpAddr = "10.0.0.1".parse().unwrap();
        let client: IpAddr = "203.0.113.9".parse().unwrap();
        let trusted = vec!["10.0.0.1".to_string()];

        assert_eq!(client_ip(Some(proxy), Some(client), &trusted), Some(client));
        assert_eq!(client_ip(Some(proxy), None, &trusted), Some(proxy));
        assert_eq!(client_ip(Some(client), Some(proxy), &trusted), Some(client));
        assert_eq!(client_ip(None, Some(client), &trusted), None);
    }

    #[test]
    fn paginated_meta() {
        let page = Page::new(vec![1, 2, 3], 23, PageRequest::new(Some(1), Some(10)));
        let body = serde_json::to_value(Paginated::from(page)).unwrap();
        assert_eq!(body["data"].as_array().unwrap().len(), 3);
        assert_eq!(body["meta"]["total_pages"], 3);
        assert_eq!(body["meta"]["has_more"], true);
    }
}
