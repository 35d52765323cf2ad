//! CAPTCHA challenges: generation, rendering and single-use verification.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CaptchaConfig;
use crate::crypto::{constant_time_eq, random_digits};
use crate::db::repositories::{CaptchaRepository, RepoResult};

#[derive(Debug, Clone, Serialize)]
pub struct CaptchaChallenge {
    pub id: String,
    /// SVG rendering of the code as a `data:` URI.
    pub image: String,
    pub expire_at: DateTime<Utc>,
    /// Only returned in dev mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

pub struct CaptchaService {
    repo: Arc<dyn CaptchaRepository>,
    ttl: Duration,
    code_length: usize,
    dev_secret: Option<String>,
}

impl CaptchaService {
    #[must_use]
    pub fn new(repo: Arc<dyn CaptchaRepository>, config: &CaptchaConfig) -> Self {
        Self {
            repo,
            ttl: Duration::from_secs(config.ttl_seconds),
            code_length: config.code_length,
            dev_secret: config.dev_secret.clone(),
        }
    }

    fn dev_mode(&self, secret: Option<&str>) -> bool {
        match (self.dev_secret.as_deref(), secret) {
            (Some(expected), Some(given)) => constant_time_eq(expected.as_bytes(), given.as_bytes()),
            _ => false,
        }
    }

    /// Creates a challenge. With a matching dev `secret` the caller may fix
    /// the code and gets it back in the response; otherwise both inputs are
    /// ignored.
    pub async fn generate(
        &self,
        code: Option<&str>,
        secret: Option<&str>,
    ) -> RepoResult<CaptchaChallenge> {
        let dev = self.dev_mode(secret);
        let code = match code {
            Some(c) if dev && is_printable_code(c.trim()) => c.trim().to_string(),
            _ => random_digits(self.code_length),
        };

        let id = uuid::Uuid::new_v4().simple().to_string();
        self.repo.create(&id, &code, self.ttl).await?;

        let expire_at = Utc::now()
            + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::minutes(5));

        Ok(CaptchaChallenge {
            id,
            image: render_svg(&code),
            expire_at,
            code: dev.then_some(code),
        })
    }

    /// Consumes the challenge and reports whether `code` matched it.
    pub async fn verify(&self, id: &str, code: &str) -> RepoResult<bool> {
        if id.is_empty() || code.is_empty() {
            return Ok(false);
        }
        self.repo.verify(id, code.trim()).await
    }
}

fn is_printable_code(code: &str) -> bool {
    (1..=8).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Draws the code as jittered glyphs over a few noise lines.
fn render_svg(code: &str) -> String {
    const WIDTH: usize = 120;
    const HEIGHT: usize = 40;

    let mut svg = format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}"><rect width="100%" height="100%" fill="#f4f4f5"/>"##
    );

    let noise = random_digits(12);
    let noise: Vec<usize> = noise.bytes().map(|b| usize::from(b - b'0')).collect();
    for line in noise.chunks(4) {
        let _ = write!(
            svg,
            r##"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="#a1a1aa" stroke-width="1"/>"##,
            line[0] * 4,
            line[1] * 4,
            WIDTH - line[2] * 4,
            HEIGHT - line[3] * 4,
        );
    }

    let jitter = random_digits(code.len().max(1));
    let step = WIDTH / (code.len() + 1);
    for (i, (ch, j)) in code.chars().zip(jitter.bytes()).enumerate() {
        let offset = usize::from(j - b'0');
        let _ = write!(
            svg,
            r##"<text x="{}" y="{}" font-family="monospace" font-size="22" fill="#27272a" transform="rotate({} {} 20)">{ch}</text>"##,
            step * (i + 1) - 6,
            24 + offset / 2,
            offset * 3,
            step * (i + 1),
        );
    }
    svg.push_str("</svg>");

    format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{CacheCaptchaRepository, MemoryCache};

    fn service(dev_secret: Option<&str>) -> CaptchaService {
        let repo = Arc::new(CacheCaptchaRepository::new(Arc::new(MemoryCache::new())));
        CaptchaService::new(
            repo,
            &CaptchaConfig {
                dev_secret: dev_secret.map(str::to_string),
                ..CaptchaConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_dev_mode_returns_chosen_code() {
        let service = service(Some("dev-secret"));
        let challenge = service
            .generate(Some("9999"), Some("dev-secret"))
            .await
            .unwrap();

        assert_eq!(challenge.code.as_deref(), Some("9999"));
        assert!(challenge.image.starts_with("data:image/svg+xml;base64,"));
        assert!(service.verify(&challenge.id, "9999").await.unwrap());
        assert!(!service.verify(&challenge.id, "9999").await.unwrap());
    }

    #[tokio::test]
    async fn test_wrong_secret_hides_code() {
        let service = service(Some("dev-secret"));
        let challenge = service.generate(Some("9999"), Some("nope")).await.unwrap();

        assert!(challenge.code.is_none());
        assert_eq!(challenge.id.len(), 32);
    }

    #[tokio::test]
    async fn test_dev_mode_unavailable_without_configured_secret() {
        let service = service(None);
        let challenge = service.generate(Some("1234"), Some("")).await.unwrap();
        assert!(challenge.code.is_none());
    }

    #[test]
    fn test_svg_is_base64_data_uri() {
        let uri = render_svg("1234");
        let encoded = uri.strip_prefix("data:image/svg+xml;base64,").unwrap();
        let decoded = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert!(decoded.starts_with("<svg"));
        assert_eq!(decoded.matches("<text").count(), 4);
    }
}
