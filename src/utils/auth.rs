//! Session auth: HS256 JWTs (1 day) carried in an HttpOnly `token` cookie or
//! an `Authorization: Bearer` header, plus argon2 password hashing. The
//! `CurrentUid` extractor gives handlers the authenticated user id.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header, request::Parts, StatusCode};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

pub const TOKEN_COOKIE: &str = "token";
const TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("password hash error: {0}")]
    Hash(argon2::password_hash::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: i32,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, uid: i32) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            user_id: uid,
            iat: now,
            exp: now + TOKEN_TTL_SECS,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))?;
        Ok(data.claims)
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(AuthError::Hash)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Set-Cookie value for a fresh session. Production cookies go cross-site
/// (frontend on its own domain), so they need Secure + SameSite=None.
pub fn session_cookie(token: &str, production: bool) -> String {
    if production {
        format!("{TOKEN_COOKIE}={token}; Path=/; Max-Age=86400; HttpOnly; Secure; SameSite=None")
    } else {
        format!("{TOKEN_COOKIE}={token}; Path=/; Max-Age=86400; HttpOnly; SameSite=Lax")
    }
}

/// Set-Cookie value that clears the session.
pub fn clear_session_cookie(production: bool) -> String {
    if production {
        format!("{TOKEN_COOKIE}=; Path=/; Max-Age=0; HttpOnly; Secure; SameSite=None")
    } else {
        format!("{TOKEN_COOKIE}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.to_string())
}

fn cookie_token(parts: &Parts) -> Option<String> {
    let cookies = parts.headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        pair.trim()
            .strip_prefix(TOKEN_COOKIE)?
            .strip_prefix('=')
            .map(|t| t.to_string())
    })
}

/// Authenticated user id, extracted from the session token.
pub struct CurrentUid(pub i32);

impl<S> FromRequestParts<S> for CurrentUid
where
    JwtKeys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let token = bearer_token(parts)
            .or_else(|| cookie_token(parts))
            .ok_or((StatusCode::UNAUTHORIZED, "Not authenticated. Please login."))?;
        let claims = keys.verify(&token).map_err(|_| {
            (
                StatusCode::UNAUTHORIZED,
                "Session expired. Please login again.",
            )
        })?;
        Ok(CurrentUid(claims.user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_header(name: header::HeaderName, value: &str) -> Parts {
        Request::builder()
            .header(name, value)
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[test]
    fn issue_and_verify_round_trip() {
        let keys = JwtKeys::new("test-secret");
        let token = keys.issue(42).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.user_id, 42);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn verify_rejects_foreign_secret() {
        let token = JwtKeys::new("one").issue(1).unwrap();
        assert!(JwtKeys::new("two").verify(&token).is_err());
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        assert!(!verify_password("hunter2", "not-a-phc-string"));
    }

    #[test]
    fn reads_token_from_cookie_header() {
        let parts = parts_with_header(header::COOKIE, "theme=dark; token=abc.def.ghi; lang=en");
        assert_eq!(cookie_token(&parts).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn reads_token_from_bearer_header() {
        let parts = parts_with_header(header::AUTHORIZATION, "Bearer abc.def.ghi");
        assert_eq!(bearer_token(&parts).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn session_cookie_flags_by_environment() {
        assert!(session_cookie("t", true).contains("Secure; SameSite=None"));
        assert!(session_cookie("t", false).contains("SameSite=Lax"));
        assert!(clear_session_cookie(false).contains("Max-Age=0"));
    }
}
