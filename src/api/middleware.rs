//! Request middleware: correlation ids and session authentication.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

use super::AppState;
use crate::models::{AppUser, SessionToken};

pub const SESSION_COOKIE: &str = "familyhub_session";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Security configuration loaded from environment variables.
#[derive(Clone, Debug, Default)]
pub struct SecurityConfig {
    /// Allowed CORS origins (from FAMILYHUB_CORS_ORIGINS, comma-separated)
    pub cors_origins: Option<Vec<String>>,
    /// Mark the session cookie `Secure` (from FAMILYHUB_SECURE_COOKIES)
    pub secure_cookies: bool,
}

impl SecurityConfig {
    pub fn from_env() -> Self {
        let cors_origins = std::env::var("FAMILYHUB_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty());

        let secure_cookies = std::env::var("FAMILYHUB_SECURE_COOKIES")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Self {
            cors_origins,
            secure_cookies,
        }
    }

    /// Plain local defaults: any origin, cookies without `Secure`.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_cors_origins(origins: Vec<String>) -> Self {
        Self {
            cors_origins: Some(origins),
            ..Self::default()
        }
    }

    /// `Set-Cookie` value carrying a fresh session token.
    pub fn session_cookie(&self, token: &SessionToken) -> String {
        let secure = if self.secure_cookies { "; Secure" } else { "" };
        format!(
            "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax{secure}",
            token.as_str()
        )
    }

    /// `Set-Cookie` value that removes the session cookie.
    pub fn expired_session_cookie(&self) -> String {
        let secure = if self.secure_cookies { "; Secure" } else { "" };
        format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{secure}")
    }
}

/// The signed-in user, placed in request extensions by [`require_session`].
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub user: AppUser,
    pub token: SessionToken,
}

impl CurrentUser {
    /// Identity written into audit fields.
    pub fn audit_name(&self) -> String {
        self.user.id.to_string()
    }
}

/// Reads the session token from the `Cookie` header, if present.
pub fn session_token(headers: &HeaderMap) -> Option<SessionToken> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| SessionToken(value.to_string()))
}

/// Tags every request with a correlation id, taken from the
/// `X-Correlation-Id` header or generated, and echoes it on the response.
pub async fn correlation_id(request: Request<Body>, next: Next) -> Response {
    let id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|h| !h.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = tracing::info_span!(
        "request",
        correlation_id = %id,
        method = %request.method(),
        uri = %request.uri().path(),
    );

    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

/// Rejects requests without a valid session cookie.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(token) = session_token(request.headers()) else {
        tracing::warn!("Missing session cookie");
        return Err(StatusCode::UNAUTHORIZED);
    };

    match state.hub.authenticate(&token).await {
        Ok(Some(user)) => {
            request.extensions_mut().insert(CurrentUser { user, token });
            Ok(next.run(request).await)
        }
        Ok(None) => {
            tracing::warn!("Unknown or expired session");
            Err(StatusCode::UNAUTHORIZED)
        }
        Err(e) => {
            tracing::error!("Session lookup failed: {:#}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_session_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; familyhub_session=abc123; lang=en"),
        );

        assert_eq!(session_token(&headers), Some(SessionToken("abc123".to_string())));
    }

    #[test]
    fn empty_session_cookie_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("familyhub_session="));

        assert_eq!(session_token(&headers), None);
    }

    #[test]
    fn secure_flag_follows_config() {
        let token = SessionToken("t".to_string());

        let local = SecurityConfig::disabled().session_cookie(&token);
        assert!(local.starts_with("familyhub_session=t;"));
        assert!(local.contains("HttpOnly"));
        assert!(!local.contains("Secure"));

        let deployed = SecurityConfig {
            secure_cookies: true,
            ..SecurityConfig::default()
        };
        assert!(deployed.session_cookie(&token).ends_with("; Secure"));
        assert!(deployed.expired_session_cookie().contains("Max-Age=0"));
    }
}
