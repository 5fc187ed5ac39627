use anyhow::Result;
use uuid::Uuid;

use tubecast_api::auth::password::{hash_password, verify_password};
use tubecast_api::auth::{TokenError, TokenService};
use tubecast_api::config::AuthConfig;

fn token_service() -> TokenService {
    TokenService::new(&AuthConfig {
        access_token_secret: "integration-access-secret".to_string(),
        refresh_token_secret: "integration-refresh-secret".to_string(),
        access_token_ttl_minutes: 15,
        refresh_token_ttl_days: 10,
    })
}

#[test]
fn access_token_round_trip() -> Result<()> {
    let tokens = token_service();
    let user_id = Uuid::new_v4();

    let token = tokens.issue_access_token(user_id)?;
    let claims = tokens.verify_access_token(&token)?;

    assert_eq!(claims.sub, user_id);
    Ok(())
}

#[test]
fn refresh_token_round_trip() -> Result<()> {
    let tokens = token_service();
    let user_id = Uuid::new_v4();

    let token = tokens.issue_refresh_token(user_id)?;
    let claims = tokens.verify_refresh_token(&token)?;

    assert_eq!(claims.sub, user_id);
    Ok(())
}

#[test]
fn access_token_is_not_a_refresh_token() -> Result<()> {
    let tokens = token_service();
    let access = tokens.issue_access_token(Uuid::new_v4())?;
    let refresh = tokens.issue_refresh_token(Uuid::new_v4())?;

    assert!(tokens.verify_refresh_token(&access).is_err());
    assert!(tokens.verify_access_token(&refresh).is_err());
    Ok(())
}

#[test]
fn wrong_secret_is_rejected() -> Result<()> {
    let tokens = token_service();
    let other = TokenService::new(&AuthConfig {
        access_token_secret: "some-other-secret".to_string(),
        refresh_token_secret: "some-other-refresh-secret".to_string(),
        access_token_ttl_minutes: 15,
        refresh_token_ttl_days: 10,
    });

    let token = tokens.issue_access_token(Uuid::new_v4())?;
    match other.verify_access_token(&token) {
        Err(TokenError::Invalid(_)) => Ok(()),
        other => panic!("expected invalid token, got {:?}", other),
    }
}

#[test]
fn tampered_token_is_rejected() -> Result<()> {
    let tokens = token_service();
    let mut token = tokens.issue_access_token(Uuid::new_v4())?;
    token.push('x');

    assert!(tokens.verify_access_token(&token).is_err());
    Ok(())
}

#[test]
fn password_hash_round_trip() -> Result<()> {
    let hash = hash_password("correct horse battery staple")?;

    assert_ne!(hash, "correct horse battery staple");
    assert!(verify_password("correct horse battery staple", &hash));
    assert!(!verify_password("wrong password", &hash));
    Ok(())
}

#[test]
fn two_hashes_of_the_same_password_differ() -> Result<()> {
    // Salted hashing: equal inputs must not produce equal hashes
    let a = hash_password("hunter2")?;
    let b = hash_password("hunter2")?;
    assert_ne!(a, b);
    Ok(())
}

#[test]
fn malformed_stored_hash_fails_closed() {
    assert!(!verify_password("anything", "not-a-phc-string"));
    assert!(!verify_password("anything", ""));
}
