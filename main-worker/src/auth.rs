//! The Authorizer façade: maps a Bearer credential to a permission
//! set. The RBAC token store and admin-key model behind it are kept
//! opaque on purpose — this module is that boundary, not a
//! general-purpose identity system.

use std::collections::HashMap;
use std::path::Path;

use dashmap::DashMap;
use store_core::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Write,
    Admin,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Admin => "admin",
        }
    }
}

/// Maps a credential to `{permissions}` or rejects it. Two credential
/// sources are honored: the static `admin_key` (bypasses everything,
/// full permission set) and a `key_store` file of named API keys, each
/// with its own permission set — loaded once at startup, the way the
/// teacher loads `DATABASE_URL` once via `dotenv`.
pub struct Authorizer {
    admin_key: Option<String>,
    api_keys: DashMap<String, Vec<Permission>>,
    pub session_secret: String,
}

impl Authorizer {
    pub fn new(admin_key: Option<String>, key_store_path: Option<&str>, session_secret: String) -> StoreResult<Self> {
        let api_keys = DashMap::new();
        if let Some(path) = key_store_path {
            if Path::new(path).exists() {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| StoreError::Internal(format!("failed to read key_store '{path}': {e}")))?;
                let parsed: HashMap<String, Vec<Permission>> = serde_json::from_str(&raw)
                    .map_err(|e| StoreError::Internal(format!("key_store '{path}' is not valid JSON: {e}")))?;
                for (key, permissions) in parsed {
                    api_keys.insert(key, permissions);
                }
            }
        }
        Ok(Self { admin_key, api_keys, session_secret })
    }

    /// Authorizes a raw login credential (`POST /api/login`'s `key` or
    /// legacy `client_id`), returning the permission set a freshly
    /// issued session token should inherit.
    pub fn authorize_credential(&self, credential: &str) -> StoreResult<Vec<Permission>> {
        if self.admin_key.as_deref() == Some(credential) {
            return Ok(vec![Permission::Read, Permission::Write, Permission::Admin]);
        }
        if let Some(permissions) = self.api_keys.get(credential) {
            return Ok(permissions.clone());
        }
        Err(StoreError::Unauthorized)
    }

    /// Authorizes a Bearer value presented on an authenticated
    /// endpoint: either the static admin key directly, or a session
    /// token previously issued by `/api/login`.
    pub fn authorize_bearer(&self, bearer: &str) -> StoreResult<Vec<Permission>> {
        if self.admin_key.as_deref() == Some(bearer) {
            return Ok(vec![Permission::Read, Permission::Write, Permission::Admin]);
        }
        let claims = crate::session::validate(bearer, &self.session_secret).map_err(|_| StoreError::Unauthorized)?;
        let permissions = claims
            .permissions
            .iter()
            .filter_map(|p| match p.as_str() {
                "read" => Some(Permission::Read),
                "write" => Some(Permission::Write),
                "admin" => Some(Permission::Admin),
                _ => None,
            })
            .collect();
        Ok(permissions)
    }

    /// Fails with `Forbidden` unless `required` is present in `granted`.
    pub fn require(granted: &[Permission], required: Permission) -> StoreResult<()> {
        if granted.contains(&required) {
            Ok(())
        } else {
            Err(StoreError::Forbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_key_grants_every_permission() {
        let auth = Authorizer::new(Some("super-secret".into()), None, "sess-secret".into()).unwrap();
        let granted = auth.authorize_credential("super-secret").unwrap();
        assert!(granted.contains(&Permission::Admin));
        assert!(granted.contains(&Permission::Write));
    }

    #[test]
    fn unknown_credential_is_unauthorized() {
        let auth = Authorizer::new(Some("super-secret".into()), None, "sess-secret".into()).unwrap();
        assert!(auth.authorize_credential("nope").is_err());
    }

    #[test]
    fn require_rejects_missing_permission() {
        assert!(Authorizer::require(&[Permission::Read], Permission::Write).is_err());
        assert!(Authorizer::require(&[Permission::Read, Permission::Write], Permission::Write).is_ok());
    }
}
