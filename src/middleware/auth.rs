use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Authenticated identity attached to the request by [`require_auth`].
#[derive(Clone, Copy, Debug)]
pub struct AuthUser {
    pub id: Uuid,
}

/// Session middleware: extract the access token, verify it, attach the
/// identity to the request, or short-circuit with 401. No persisted state is
/// touched here.
pub async fn require_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_access_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;

    let claims = state.tokens.verify_access_token(&token)?;
    request.extensions_mut().insert(AuthUser { id: claims.sub });

    Ok(next.run(request).await)
}

/// Pull the access token out of the request: the `accessToken` cookie takes
/// precedence, then `Authorization: Bearer <token>`.
pub fn extract_access_token(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(ACCESS_TOKEN_COOKIE) {
        let value = cookie.value().trim();
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }

    let auth_header = headers.get("authorization")?.to_str().ok()?;
    let token = auth_header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::{AUTHORIZATION, COOKIE};

    fn headers(cookie: Option<&str>, bearer: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(c) = cookie {
            headers.insert(COOKIE, format!("accessToken={}", c).parse().unwrap());
        }
        if let Some(b) = bearer {
            headers.insert(AUTHORIZATION, format!("Bearer {}", b).parse().unwrap());
        }
        headers
    }

    #[test]
    fn cookie_takes_precedence_over_bearer() {
        let h = headers(Some("from-cookie"), Some("from-header"));
        assert_eq!(extract_access_token(&h).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn falls_back_to_bearer_header() {
        let h = headers(None, Some("from-header"));
        assert_eq!(extract_access_token(&h).as_deref(), Some("from-header"));
    }

    #[test]
    fn missing_token_yields_none() {
        assert_eq!(extract_access_token(&HeaderMap::new()), None);
    }

    #[test]
    fn non_bearer_authorization_is_ignored() {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, "Basic dXNlcjpwYXNz".parse().unwrap());
        assert_eq!(extract_access_token(&h), None);
    }

    #[test]
    fn empty_bearer_token_yields_none() {
        let h = headers(None, Some(""));
        assert_eq!(extract_access_token(&h), None);
    }
}
