use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

pub const ANY_ROLE: &[Role] = &[Role::Admin, Role::User];
pub const ADMIN_ONLY: &[Role] = &[Role::Admin];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    pub role: Role,
    pub exp: usize,
}

/// Resolve the caller from a bearer token, or from `x-user-id` /
/// `x-user-role` when dev overrides are on.
pub async fn require_user(state: &AppState, headers: &HeaderMap) -> AppResult<AuthUser> {
    if state.config.auth_dev_overrides_enabled() {
        if let Some(user) = dev_override_user(headers) {
            return Ok(user);
        }
    }

    let token = bearer_token(headers)
        .ok_or_else(|| AppError::Unauthorized("No token provided.".to_string()))?;
    let secret = state.config.jwt_secret.as_deref().ok_or_else(|| {
        AppError::ServiceUnavailable("JWT_SECRET is not configured.".to_string())
    })?;

    decode_token(secret, token)
}

pub fn require_role(user: &AuthUser, allowed: &[Role]) -> AppResult<()> {
    if allowed.contains(&user.role) {
        return Ok(());
    }
    let names = allowed
        .iter()
        .map(|role| role.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    Err(AppError::Forbidden(format!(
        "Access denied: this action requires one of the following roles: {names}"
    )))
}

pub fn decode_token(secret: &str, token: &str) -> AppResult<AuthUser> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|error| match error.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::Unauthorized("Token expired.".to_string())
        }
        _ => AppError::Unauthorized("Invalid token.".to_string()),
    })?;

    Ok(AuthUser {
        id: data.claims.user_id,
        role: data.claims.role,
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn dev_override_user(headers: &HeaderMap) -> Option<AuthUser> {
    let id = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())?;
    let role = headers
        .get("x-user-role")
        .and_then(|value| value.to_str().ok())
        .and_then(Role::parse)
        .unwrap_or(Role::User);
    Some(AuthUser { id, role })
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue, StatusCode};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    use super::{
        bearer_token, decode_token, dev_override_user, require_role, AuthUser, Claims, Role,
        ADMIN_ONLY, ANY_ROLE,
    };

    fn token(secret: &str, role: Role, exp: usize) -> String {
        encode(
            &Header::default(),
            &Claims {
                user_id: Uuid::from_u128(5),
                role,
                exp,
            },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("encodes")
    }

    fn far_future() -> usize {
        (chrono::Utc::now().timestamp() + 3600) as usize
    }

    #[test]
    fn decodes_valid_token() {
        let user = decode_token("s3cret", &token("s3cret", Role::Admin, far_future()))
            .expect("valid token");
        assert_eq!(
            user,
            AuthUser {
                id: Uuid::from_u128(5),
                role: Role::Admin
            }
        );
    }

    #[test]
    fn rejects_wrong_secret_and_expired_tokens() {
        let wrong = decode_token("other", &token("s3cret", Role::User, far_future()));
        assert!(matches!(wrong, Err(ref e) if e.status_code() == StatusCode::UNAUTHORIZED));

        let expired = decode_token("s3cret", &token("s3cret", Role::User, 1_000));
        assert!(matches!(expired, Err(ref e) if e.status_code() == StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn role_gate() {
        let user = AuthUser {
            id: Uuid::nil(),
            role: Role::User,
        };
        assert!(require_role(&user, ANY_ROLE).is_ok());
        let denied = require_role(&user, ADMIN_ONLY).expect_err("user is not admin");
        assert_eq!(denied.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn reads_bearer_and_override_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(
            "x-user-id",
            HeaderValue::from_static("00000000-0000-0000-0000-000000000009"),
        );
        headers.insert("x-user-role", HeaderValue::from_static("ADMIN"));
        let user = dev_override_user(&headers).expect("override user");
        assert_eq!(user.id, Uuid::from_u128(9));
        assert_eq!(user.role, Role::Admin);
    }
}
