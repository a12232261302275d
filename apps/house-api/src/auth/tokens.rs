//! HS256 bearer tokens carrying the caller's identity.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Lifetime of tokens minted by [`JwtKeys::issue`].
pub const TOKEN_TTL_HOURS: i64 = 24 * 7;

/// Claims issued by the forum's login endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    #[serde(default = "default_role")]
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

fn default_role() -> String {
    "user".to_string()
}

/// Signing and verification keys derived from the shared secret.
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    pub fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Mint a token for `user_id`. Used by tooling and tests; the forum's
    /// login flow issues the same shape.
    pub fn issue(&self, user_id: i64, username: &str) -> Result<String, ApiError> {
        self.issue_with_role(user_id, username, &default_role())
    }

    pub fn issue_with_role(
        &self,
        user_id: i64,
        username: &str,
        role: &str,
    ) -> Result<String, ApiError> {
        let now = Utc::now();
        let claims = Claims {
            user_id,
            username: username.to_string(),
            role: role.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            tracing::error!(?e, "failed to sign token");
            ApiError::internal("Token signing failed")
        })
    }

    /// Check signature and expiry and return the claims.
    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            tracing::debug!(?e, "token validation failed");
            ApiError::unauthorized("Invalid or expired token")
        })?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let keys = JwtKeys::from_secret("test-secret");
        let token = keys.issue(42, "alice").unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, "user");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = JwtKeys::from_secret("one").issue(1, "a").unwrap();
        let err = JwtKeys::from_secret("two").verify(&token).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = JwtKeys::from_secret("test-secret");
        let past = Utc::now() - Duration::hours(2);
        let claims = Claims {
            user_id: 1,
            username: "old".to_string(),
            role: "user".to_string(),
            iat: past.timestamp(),
            exp: (past + Duration::minutes(1)).timestamp(),
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding).unwrap();
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn role_survives_round_trip() {
        let keys = JwtKeys::from_secret("test-secret");
        let token = keys.issue_with_role(7, "bot", "service").unwrap();
        assert_eq!(keys.verify(&token).unwrap().role, "service");
    }

    #[test]
    fn garbage_is_rejected() {
        let keys = JwtKeys::from_secret("test-secret");
        assert!(keys.verify("not.a.jwt").is_err());
    }
}
