//! Per-jurisdiction form schemas and the provider that serves them.

mod catalog;
mod definition;
mod standard;

use std::sync::Arc;

pub use catalog::{SchemaCatalog, SchemaLoadError};
pub use definition::{
    instance_key, split_instance_key, trigger_value, ComplianceSchema, ExtraValidation,
    FieldChoice, FieldDefinition, FieldType, Persona, SchemaKey,
};

/// Read-only source of schemas keyed by country, compliance type, and optional host country.
pub trait SchemaProvider: Send + Sync {
    fn fields(&self, key: &SchemaKey) -> Result<Arc<ComplianceSchema>, SchemaError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("no form schema configured for {0}")]
    NotFound(SchemaKey),
}
