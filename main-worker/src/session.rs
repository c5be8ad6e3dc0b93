//! Client session tokens.
//!
//! Generalizes the teacher's `jwt::Claims`/`generate_access_token`
//! pair: the claim set carries a permission set instead of a role
//! list, and there is a single token kind (the REST surface has no
//! refresh/logout endpoints, so there is nothing to revoke against).

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::Permission;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionClaims {
    /// Subject — the client identity that authenticated (the `key` or
    /// legacy `client_id` from `POST /api/login`).
    pub sub: String,
    pub permissions: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Issues a session token bound to `subject`'s exact permission set —
/// a session inherits exactly the permissions of the credential that
/// authenticated it, never more.
pub fn issue(subject: &str, permissions: &[Permission], ttl: std::time::Duration, secret: &str) -> String {
    let now = Utc::now();
    let exp = now + ChronoDuration::seconds(ttl.as_secs() as i64);
    let claims = SessionClaims {
        sub: subject.to_string(),
        permissions: permissions.iter().map(|p| p.as_str().to_string()).collect(),
        iat: now.timestamp(),
        exp: exp.timestamp(),
        jti: uuid::Uuid::new_v4().to_string(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .expect("HS256 signing never fails for well-formed claims")
}

pub fn validate(token: &str, secret: &str) -> Result<SessionClaims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    decode::<SessionClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-characters-long";

    #[test]
    fn issues_and_validates_round_trip() {
        let token = issue("admin", &[Permission::Read, Permission::Write], std::time::Duration::from_secs(900), SECRET);
        let claims = validate(&token, SECRET).unwrap();
        assert_eq!(claims.sub, "admin");
        assert_eq!(claims.permissions, vec!["read".to_string(), "write".to_string()]);
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = issue("admin", &[Permission::Read], std::time::Duration::from_secs(900), SECRET);
        assert!(validate(&token, "wrong-secret-of-at-least-32-characterss").is_err());
    }
}
