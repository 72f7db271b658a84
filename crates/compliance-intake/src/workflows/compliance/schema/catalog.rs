use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use tracing::warn;

use super::definition::{ComplianceSchema, ExtraValidation, FieldDefinition, FieldType, SchemaKey};
use super::{standard, SchemaError, SchemaProvider};

/// Errors raised while assembling a catalog from curated schema documents.
#[derive(Debug, thiserror::Error)]
pub enum SchemaLoadError {
    #[error("failed to read schema document: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid schema document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("schema {0} is defined more than once")]
    DuplicateSchema(SchemaKey),
    #[error("schema {0} has no fields")]
    EmptySchema(SchemaKey),
    #[error("schema {schema}: field name '{name}' is empty or contains brackets")]
    InvalidFieldName { schema: SchemaKey, name: String },
    #[error("schema {schema}: field '{name}' appears more than once")]
    DuplicateField { schema: SchemaKey, name: String },
    #[error("schema {schema}: conditional field '{name}' has no parent_value")]
    MissingParentValue { schema: SchemaKey, name: String },
    #[error("schema {schema}: top-level field '{name}' cannot carry a parent_value")]
    UnexpectedParentValue { schema: SchemaKey, name: String },
    #[error("schema {schema}: only top-level fields may repeat per host country ('{name}')")]
    NestedRepeat { schema: SchemaKey, name: String },
    #[error("schema {schema}: field '{field}' has invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        schema: SchemaKey,
        field: String,
        pattern: String,
        source: regex::Error,
    },
    #[error("schema {schema}: field '{field}' compares against unknown date field '{reference}'")]
    UnknownReference {
        schema: SchemaKey,
        field: String,
        reference: String,
    },
}

/// In-memory schema provider built from the standard set or a JSON document.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    schemas: HashMap<SchemaKey, Arc<ComplianceSchema>>,
}

impl SchemaCatalog {
    /// Catalog with the schemas shipped alongside the service.
    pub fn standard() -> Self {
        let schemas = standard::schemas()
            .into_iter()
            .map(|schema| (schema.key.clone(), Arc::new(schema)))
            .collect();
        Self { schemas }
    }

    pub fn from_schemas(schemas: Vec<ComplianceSchema>) -> Result<Self, SchemaLoadError> {
        let mut catalog = Self::default();
        for schema in schemas {
            check_schema(&schema)?;
            if catalog.schemas.contains_key(&schema.key) {
                return Err(SchemaLoadError::DuplicateSchema(schema.key));
            }
            catalog.schemas.insert(schema.key.clone(), Arc::new(schema));
        }
        Ok(catalog)
    }

    /// Parse a JSON array of schemas.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, SchemaLoadError> {
        let schemas: Vec<ComplianceSchema> = serde_json::from_reader(reader)?;
        Self::from_schemas(schemas)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaLoadError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Configured keys in a stable order.
    pub fn keys(&self) -> Vec<SchemaKey> {
        let mut keys: Vec<SchemaKey> = self.schemas.keys().cloned().collect();
        keys.sort_by(|a, b| {
            (a.country.as_str(), a.compliance_type, a.host_country.as_ref()).cmp(&(
                b.country.as_str(),
                b.compliance_type,
                b.host_country.as_ref(),
            ))
        });
        keys
    }
}

impl SchemaProvider for SchemaCatalog {
    fn fields(&self, key: &SchemaKey) -> Result<Arc<ComplianceSchema>, SchemaError> {
        if let Some(schema) = self.schemas.get(key) {
            return Ok(schema.clone());
        }
        if key.host_country.is_some() {
            if let Some(schema) = self.schemas.get(&key.general()) {
                return Ok(schema.clone());
            }
        }
        Err(SchemaError::NotFound(key.clone()))
    }
}

fn check_schema(schema: &ComplianceSchema) -> Result<(), SchemaLoadError> {
    let key = &schema.key;
    if schema.fields.is_empty() {
        return Err(SchemaLoadError::EmptySchema(key.clone()));
    }

    let mut names = HashSet::new();
    let mut date_fields = HashSet::new();
    for top in &schema.fields {
        if top.parent_value.is_some() {
            return Err(SchemaLoadError::UnexpectedParentValue {
                schema: key.clone(),
                name: top.name.clone(),
            });
        }

        let mut outcome = Ok(());
        top.walk(&mut |field, depth| {
            if outcome.is_ok() {
                outcome = check_field(key, field, depth, &mut names);
                if field.field_type == FieldType::Date {
                    date_fields.insert(field.name.clone());
                }
            }
        });
        outcome?;
    }

    for top in &schema.fields {
        let mut outcome = Ok(());
        top.walk(&mut |field, _| {
            if outcome.is_ok() {
                outcome = check_references(key, field, &date_fields);
            }
        });
        outcome?;
    }

    Ok(())
}

fn check_field(
    key: &SchemaKey,
    field: &FieldDefinition,
    depth: usize,
    names: &mut HashSet<String>,
) -> Result<(), SchemaLoadError> {
    let name = &field.name;
    if name.trim().is_empty() || name.contains('[') || name.contains(']') {
        return Err(SchemaLoadError::InvalidFieldName {
            schema: key.clone(),
            name: name.clone(),
        });
    }
    if !names.insert(name.clone()) {
        return Err(SchemaLoadError::DuplicateField {
            schema: key.clone(),
            name: name.clone(),
        });
    }
    if depth > 0 && field.repeat_per_host_country {
        return Err(SchemaLoadError::NestedRepeat {
            schema: key.clone(),
            name: name.clone(),
        });
    }

    for child in &field.conditional_fields {
        let Some(parent_value) = child.parent_value.as_deref() else {
            return Err(SchemaLoadError::MissingParentValue {
                schema: key.clone(),
                name: child.name.clone(),
            });
        };
        if field.can_produce(parent_value) == Some(false) {
            warn!(
                schema = %key,
                parent = %name,
                child = %child.name,
                parent_value,
                "conditional field can never activate"
            );
        }
    }

    for rule in &field.extra_validations {
        if let ExtraValidation::Pattern { pattern, .. } = rule {
            Regex::new(pattern).map_err(|source| SchemaLoadError::InvalidPattern {
                schema: key.clone(),
                field: name.clone(),
                pattern: pattern.clone(),
                source,
            })?;
        }
    }

    Ok(())
}

fn check_references(
    key: &SchemaKey,
    field: &FieldDefinition,
    date_fields: &HashSet<String>,
) -> Result<(), SchemaLoadError> {
    for rule in &field.extra_validations {
        if let ExtraValidation::AfterField { field: reference } = rule {
            if !date_fields.contains(reference) {
                return Err(SchemaLoadError::UnknownReference {
                    schema: key.clone(),
                    field: field.name.clone(),
                    reference: reference.clone(),
                });
            }
        }
    }
    Ok(())
}
