//! Compliance application intake: form schemas, conditional fields, validation, pre-signed
//! uploads, and persisted applications.

pub mod conditional;
pub mod domain;
pub mod repository;
pub mod router;
pub mod schema;
pub mod service;
pub mod uploads;
pub mod validation;

#[cfg(test)]
mod tests;

pub use conditional::{active_fields, ActiveField, ActiveFieldSet, ActiveFieldView};
pub use domain::{
    Application, ApplicationId, ApplicationStatus, ApplicationSubmission, ApplicationView,
    ComplianceType, CountryCode, FieldValues, InvalidCountryCode,
};
pub use repository::{
    ApplicationFilter, InvalidPage, Page, PageRequest, RepositoryError, SubmissionStore,
};
pub use router::compliance_router;
pub use schema::{
    ComplianceSchema, FieldDefinition, FieldType, SchemaCatalog, SchemaError, SchemaKey,
    SchemaLoadError, SchemaProvider,
};
pub use service::{schema_key_for, ActiveFieldsQuery, ComplianceRequestService, ServiceError};
pub use uploads::{
    FileAvailability, FileReference, FileReferenceResolver, IssuedUpload, UploadEntry,
    UploadError, UploadRegistry, UPLOAD_URL_TTL_MINUTES,
};
pub use validation::{FieldViolation, ValidationReport, Validator, ViolationRule};
