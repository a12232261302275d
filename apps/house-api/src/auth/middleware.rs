//! Bearer token extraction.

use axum::extract::{FromRequestParts, Query};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::AppState;

/// Authenticated caller, taken from `Authorization: Bearer <jwt>`.
///
/// Browsers cannot set headers on a WebSocket upgrade, so a `token` query
/// parameter is accepted when the header is absent.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub username: String,
    pub role: String,
}

impl AuthUser {
    /// Trusted forum services and operators, allowed to award experience.
    pub fn is_privileged(&self) -> bool {
        matches!(self.role.as_str(), "admin" | "service")
    }
}

/// Rejection returned when the bearer token is missing or invalid.
pub struct AuthError {
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": "UNAUTHORIZED",
                "message": self.message
            }
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = match parts.headers.get(AUTHORIZATION) {
            Some(header) => {
                let header = header.to_str().map_err(|_| AuthError {
                    message: "Invalid Authorization header",
                })?;
                header
                    .strip_prefix("Bearer ")
                    .ok_or(AuthError {
                        message: "Invalid Authorization header format",
                    })?
                    .to_string()
            }
            None => Query::<TokenQuery>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|Query(q)| q.token)
                .filter(|t| !t.is_empty())
                .ok_or(AuthError {
                    message: "Missing Authorization header",
                })?,
        };

        let claims = state.keys.verify(&token).map_err(|_| AuthError {
            message: "Invalid or expired token",
        })?;

        Ok(AuthUser {
            user_id: claims.user_id,
            username: claims.username,
            role: claims.role,
        })
    }
}
