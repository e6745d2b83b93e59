// Workspace-scoped bearer tokens
// Tokens are issued by the identity service; this crate verifies them and
// mints short-lived ones for local tooling and tests.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lifetime of tokens minted by [`create_token`]
pub const TOKEN_TTL_HOURS: i64 = 8;

/// Claims carried by every caller token
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Acting user
    pub sub: Uuid,
    /// Tenant every request is scoped to
    pub workspace_id: Uuid,
    /// Expiry (seconds since epoch)
    pub exp: usize,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("{0}")]
    Invalid(String),
}

/// Mints a token for `user_id` acting in `workspace_id`
///
/// # Example
/// ```
/// use ghostpirates_orchestrator::auth::jwt::{create_token, verify_token};
/// use uuid::Uuid;
///
/// let (user_id, workspace_id) = (Uuid::new_v4(), Uuid::new_v4());
/// let token = create_token(user_id, workspace_id, "your-secret-key").expect("valid token");
///
/// let claims = verify_token(&token, "your-secret-key").expect("valid token");
/// assert_eq!(claims.workspace_id, workspace_id);
/// ```
pub fn create_token(user_id: Uuid, workspace_id: Uuid, secret: &str) -> Result<String, TokenError> {
    let claims = Claims {
        sub: user_id,
        workspace_id,
        exp: (Utc::now() + Duration::hours(TOKEN_TTL_HOURS)).timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref()))
        .map_err(|e| TokenError::Invalid(e.to_string()))
}

/// Checks the signature and expiry of a bearer token
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, TokenError> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_ref()), &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid(e.to_string()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "test-secret-key-for-unit-tests";

    #[test]
    fn token_carries_user_and_workspace() {
        let (user_id, workspace_id) = (Uuid::new_v4(), Uuid::new_v4());
        let token = create_token(user_id, workspace_id, TEST_SECRET).expect("valid token");

        let claims = verify_token(&token, TEST_SECRET).expect("valid verification");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.workspace_id, workspace_id);

        let in_ttl = (Utc::now() + Duration::hours(TOKEN_TTL_HOURS)).timestamp();
        assert!(claims.exp as i64 > Utc::now().timestamp());
        assert!(claims.exp as i64 <= in_ttl + 10);
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let token = create_token(Uuid::new_v4(), Uuid::new_v4(), TEST_SECRET).expect("valid token");

        assert!(matches!(verify_token(&token, "wrong-secret"), Err(TokenError::Invalid(_))));
        assert!(matches!(verify_token("invalid.token.string", TEST_SECRET), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn expired_token_is_reported_as_such() {
        let claims = Claims {
            sub: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            exp: (Utc::now() - Duration::hours(1)).timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(TEST_SECRET.as_ref())).unwrap();

        assert!(matches!(verify_token(&token, TEST_SECRET), Err(TokenError::Expired)));
    }
}
