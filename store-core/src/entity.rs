//! The addressable unit `(database, key) -> JSON bytes` and its
//! on-storage metadata record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Join character between `database` and `key` in an entity-id.
const ID_SEPARATOR: char = '_';

/// Rejects entity components containing path separators or `..`
/// segments — the same check the storage boundary relies on to keep
/// an entity-id from escaping its storage root.
pub fn validate_component(label: &str, value: &str) -> StoreResult<()> {
    if value.is_empty() {
        return Err(StoreError::InvalidArgument(format!("{label} must not be empty")));
    }
    if value.contains('/') || value.contains('\\') {
        return Err(StoreError::InvalidArgument(format!(
            "{label} must not contain path separators"
        )));
    }
    if value.split(['/', '\\']).any(|segment| segment == "..") || value == ".." {
        return Err(StoreError::InvalidArgument(format!(
            "{label} must not contain '..' segments"
        )));
    }
    Ok(())
}

/// Computes `entity_id = database + "_" + key`, validating both
/// components first.
pub fn entity_id(database: &str, key: &str) -> StoreResult<String> {
    validate_component("database", database)?;
    validate_component("key", key)?;
    Ok(format!("{database}{ID_SEPARATOR}{key}"))
}

/// Validates a bare entity-id as used at the storage boundary: reject
/// empty ids, ids containing `/`, `\`, or `..`.
pub fn validate_entity_id(id: &str) -> StoreResult<()> {
    validate_component("entity_id", id)
}

/// The on-storage metadata record living alongside the blob object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub key_id: String,
    pub alg: String,
    /// base64 of the 12-byte GCM nonce.
    pub iv: String,
    /// base64 of the 16-byte GCM authentication tag.
    pub tag: String,
    #[serde(default)]
    pub schema_id: String,
    pub version: u64,
    pub writer_id: String,
    pub timestamp: DateTime<Utc>,
    pub database: String,
    pub entity_key: String,
}

impl EntityMetadata {
    pub fn entity_id(&self) -> String {
        format!("{}{}{}", self.database, ID_SEPARATOR, self.entity_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_database_and_key_with_underscore() {
        assert_eq!(entity_id("chatdb", "s1").unwrap(), "chatdb_s1");
    }

    #[test]
    fn rejects_empty_components() {
        assert!(entity_id("", "s1").is_err());
        assert!(entity_id("chatdb", "").is_err());
    }

    #[test]
    fn rejects_path_separators_and_traversal() {
        assert!(entity_id("chat/db", "s1").is_err());
        assert!(entity_id("chatdb", "s1\\x").is_err());
        assert!(entity_id("chatdb", "..").is_err());
        assert!(validate_entity_id("a/../b").is_err());
    }
}
