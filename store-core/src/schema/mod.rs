//! Schema validation boundary.
//!
//! `SchemaValidator` is consumed as an external validator capability by
//! the Put path; `JsonSchemaValidator` is the one concrete
//! implementation this crate ships, reading draft-07 templates from
//! the storage backend's `templates_dir()`.

use async_trait::async_trait;
use jsonschema::JSONSchema;

use crate::error::{StoreError, StoreResult};

#[async_trait]
pub trait SchemaValidator: Send + Sync {
    /// Validates `body` against `schema_id`. `Ok(())` on pass,
    /// `Err(StoreError::InvalidArgument(..))` on schema violation or an
    /// unreadable/unknown schema.
    async fn validate(&self, schema_id: &str, body: &[u8]) -> StoreResult<()>;
}

/// Loads a draft-07 JSON Schema document from `templates/<schema_id>.json`
/// (via the storage backend's local mirror) and validates bodies
/// against it with the `jsonschema` crate.
pub struct JsonSchemaValidator {
    storage: std::sync::Arc<dyn crate::storage::StorageBackend>,
}

impl JsonSchemaValidator {
    pub fn new(storage: std::sync::Arc<dyn crate::storage::StorageBackend>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl SchemaValidator for JsonSchemaValidator {
    async fn validate(&self, schema_id: &str, body: &[u8]) -> StoreResult<()> {
        let schema_bytes = self.storage.read_template(schema_id).await?;
        let schema_value: serde_json::Value = serde_json::from_slice(&schema_bytes)
            .map_err(|e| StoreError::Internal(format!("schema '{schema_id}' is not valid JSON: {e}")))?;
        let compiled = JSONSchema::compile(&schema_value)
            .map_err(|e| StoreError::Internal(format!("schema '{schema_id}' failed to compile: {e}")))?;

        let body_value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| StoreError::InvalidArgument(format!("body is not valid JSON: {e}")))?;

        let result = compiled.validate(&body_value);
        if let Err(errors) = result {
            let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
            return Err(StoreError::InvalidArgument(format!(
                "schema '{schema_id}' violated: {}",
                messages.join("; ")
            )));
        }
        Ok(())
    }
}
