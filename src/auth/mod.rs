use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::AuthConfig;

pub mod password;

/// Claims carried by both access and refresh tokens. `token_use`
/// distinguishes the two so one kind can never stand in for the other even
/// if the secrets were ever unified.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: Uuid,
    pub token_use: TokenUse,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenUse {
    Access,
    Refresh,
}

impl Claims {
    fn new(user_id: Uuid, token_use: TokenUse, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id,
            token_use,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("token generation failed: {0}")]
    Generation(String),
}

/// Issues and verifies signed access/refresh tokens.
///
/// Access tokens are stateless; refresh tokens are additionally persisted on
/// the user row by the caller, which is what makes server-initiated
/// revocation (logout) possible.
#[derive(Clone)]
pub struct TokenService {
    access_secret: String,
    refresh_secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access_secret: config.access_token_secret.clone(),
            refresh_secret: config.refresh_token_secret.clone(),
            access_ttl: Duration::minutes(config.access_token_ttl_minutes),
            refresh_ttl: Duration::days(config.refresh_token_ttl_days),
        }
    }

    pub fn issue_access_token(&self, user_id: Uuid) -> Result<String, TokenError> {
        sign(
            Claims::new(user_id, TokenUse::Access, self.access_ttl),
            &self.access_secret,
        )
    }

    pub fn issue_refresh_token(&self, user_id: Uuid) -> Result<String, TokenError> {
        sign(
            Claims::new(user_id, TokenUse::Refresh, self.refresh_ttl),
            &self.refresh_secret,
        )
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = verify(token, &self.access_secret)?;
        if claims.token_use != TokenUse::Access {
            return Err(TokenError::Invalid("not an access token".to_string()));
        }
        Ok(claims)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = verify(token, &self.refresh_secret)?;
        if claims.token_use != TokenUse::Refresh {
            return Err(TokenError::Invalid("not a refresh token".to_string()));
        }
        Ok(claims)
    }
}

fn sign(claims: Claims, secret: &str) -> Result<String, TokenError> {
    if secret.is_empty() {
        return Err(TokenError::Generation("empty signing secret".to_string()));
    }
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| TokenError::Generation(e.to_string()))
}

fn verify(token: &str, secret: &str) -> Result<Claims, TokenError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid(e.to_string()),
    })?;
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(&AuthConfig {
            access_token_secret: "access-secret-for-tests".to_string(),
            refresh_token_secret: "refresh-secret-for-tests".to_string(),
            access_token_ttl_minutes: 15,
            refresh_token_ttl_days: 10,
        })
    }

    #[test]
    fn access_token_round_trip() {
        let svc = service();
        let user_id = Uuid::new_v4();
        let token = svc.issue_access_token(user_id).unwrap();
        let claims = svc.verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.token_use, TokenUse::Access);
    }

    #[test]
    fn refresh_token_round_trip() {
        let svc = service();
        let user_id = Uuid::new_v4();
        let token = svc.issue_refresh_token(user_id).unwrap();
        let claims = svc.verify_refresh_token(&token).unwrap();
        assert_eq!(claims.sub, user_id);
    }

    #[test]
    fn access_token_rejected_by_refresh_verifier() {
        let svc = service();
        let token = svc.issue_access_token(Uuid::new_v4()).unwrap();
        // Different secret, so the signature itself fails
        assert!(matches!(
            svc.verify_refresh_token(&token),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn tampered_token_is_invalid() {
        let svc = service();
        let mut token = svc.issue_access_token(Uuid::new_v4()).unwrap();
        token.push('x');
        assert!(matches!(
            svc.verify_access_token(&token),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn stale_token_is_expired() {
        let svc = service();
        // Hand-build claims well past the default validation leeway
        let claims = Claims {
            sub: Uuid::new_v4(),
            token_use: TokenUse::Access,
            exp: (Utc::now() - Duration::hours(2)).timestamp(),
            iat: (Utc::now() - Duration::hours(3)).timestamp(),
        };
        let token = sign(claims, "access-secret-for-tests").unwrap();
        assert!(matches!(
            svc.verify_access_token(&token),
            Err(TokenError::Expired)
        ));
    }
}
