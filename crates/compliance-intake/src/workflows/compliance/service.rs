use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::conditional::{active_fields, ActiveFieldView};
use super::domain::{
    Application, ApplicationId, ApplicationStatus, ApplicationSubmission, ComplianceType,
    CountryCode, FieldValues,
};
use super::repository::{
    ApplicationFilter, InvalidPage, Page, PageRequest, RepositoryError, SubmissionStore,
};
use super::schema::{ComplianceSchema, SchemaError, SchemaKey, SchemaProvider};
use super::uploads::{FileReferenceResolver, IssuedUpload, UploadEntry, UploadError, UploadRegistry};
use super::validation::{FieldViolation, FileUse, ValidationReport, Validator, ViolationRule};
use crate::config::IntakeConfig;

/// Partial answers sent by a client that wants to know which fields to render next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveFieldsQuery {
    pub country: CountryCode,
    #[serde(alias = "form_type")]
    pub compliance_type: ComplianceType,
    #[serde(default)]
    pub host_countries: Vec<CountryCode>,
    #[serde(default)]
    pub fields: FieldValues,
}

/// Service composing the schema provider, validator, upload resolver, and store.
pub struct ComplianceRequestService<P, U, S> {
    schemas: Arc<P>,
    uploads: FileReferenceResolver<U>,
    store: Arc<S>,
    validator: Validator,
}

/// Schema key for a home country and host list: host-specific only for a single host.
pub fn schema_key_for(
    home_country: &CountryCode,
    compliance_type: ComplianceType,
    host_countries: &[CountryCode],
) -> SchemaKey {
    let key = SchemaKey::new(home_country.clone(), compliance_type);
    match host_countries {
        [host] => key.for_host(host.clone()),
        _ => key,
    }
}

impl<P, U, S> ComplianceRequestService<P, U, S>
where
    P: SchemaProvider + 'static,
    U: UploadRegistry + 'static,
    S: SubmissionStore + 'static,
{
    pub fn new(schemas: Arc<P>, registry: Arc<U>, store: Arc<S>, config: &IntakeConfig) -> Self {
        Self {
            schemas,
            uploads: FileReferenceResolver::new(
                registry,
                &config.upload_base_url,
                &config.signing_secret,
            ),
            store,
            validator: Validator::new(config.max_host_countries),
        }
    }

    pub fn uploads(&self) -> &FileReferenceResolver<U> {
        &self.uploads
    }

    pub fn fields(&self, key: &SchemaKey) -> Result<Arc<ComplianceSchema>, ServiceError> {
        Ok(self.schemas.fields(key)?)
    }

    /// Active field keys for partial answers, in render order.
    pub fn active_fields(
        &self,
        query: &ActiveFieldsQuery,
    ) -> Result<Vec<ActiveFieldView>, ServiceError> {
        let key = schema_key_for(&query.country, query.compliance_type, &query.host_countries);
        let schema = self.fields(&key)?;
        let active = active_fields(&schema, &query.fields, &query.host_countries);
        Ok(active.views())
    }

    pub fn issue_upload_urls(
        &self,
        file_names: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<IssuedUpload>, ServiceError> {
        Ok(self.uploads.issue(file_names, now)?)
    }

    /// Storage-side acceptance of a `PUT` to a pre-signed URL.
    pub fn accept_upload(
        &self,
        object_key: &str,
        expires: i64,
        signature: &str,
        size_bytes: u64,
        now: DateTime<Utc>,
    ) -> Result<UploadEntry, ServiceError> {
        self.uploads
            .authorize_upload(object_key, expires, signature, now)?;
        Ok(self.uploads.record_upload(object_key, now, size_bytes)?)
    }

    /// Validate, resolve file references, and persist a new application with status `FILED`.
    pub fn submit(
        &self,
        tenant: &str,
        submission: ApplicationSubmission,
        now: DateTime<Utc>,
    ) -> Result<Application, ServiceError> {
        let key = schema_key_for(
            &submission.home_country,
            submission.compliance_type,
            &submission.host_countries,
        );
        let schema = self.fields(&key)?;
        let active = active_fields(&schema, &submission.fields, &submission.host_countries);

        let (mut report, file_references) =
            self.validator.inspect(&submission, &schema, &active, now.date_naive());

        let mut object_keys: Vec<String> = Vec::new();
        for file in &file_references {
            if object_keys.contains(&file.object_key) {
                continue;
            }
            let availability = self.uploads.availability(&file.object_key)?;
            if !availability.is_available() {
                report.push(unresolved(&file.field, availability.describe()));
            }
            object_keys.push(file.object_key.clone());
        }
        if !report.is_empty() {
            return Err(rejected(tenant, &key, report));
        }

        let id = ApplicationId::generate();
        if let Err(err) = self.uploads.claim(&object_keys, &id) {
            self.release_claims(&object_keys, &id);
            return Err(match err {
                UploadError::AlreadyClaimed { object_key, owner } => {
                    let field = field_for_key(&file_references, &object_key);
                    let mut report = ValidationReport::default();
                    report.push(unresolved(
                        field,
                        format!("file is already attached to application {owner}"),
                    ));
                    rejected(tenant, &key, report)
                }
                other => other.into(),
            });
        }

        let ApplicationSubmission {
            home_country,
            host_countries,
            compliance_type,
            start_date,
            expiry_date,
            fields,
            uploaded_files,
        } = submission;
        let fields = fields
            .into_iter()
            .filter(|(field_key, _)| active.contains(field_key))
            .collect();

        let application = Application {
            id: id.clone(),
            tenant: tenant.to_string(),
            home_country,
            host_countries,
            compliance_type,
            status: ApplicationStatus::Filed,
            start_date,
            expiry_date,
            fields,
            uploaded_files,
            created_at: now,
        };

        let stored = match self.store.insert(application) {
            Ok(stored) => stored,
            Err(err) => {
                self.release_claims(&object_keys, &id);
                return Err(err.into());
            }
        };

        info!(
            application_id = %stored.id,
            tenant,
            schema = %key,
            files = object_keys.len(),
            "compliance application filed"
        );
        Ok(stored)
    }

    pub fn list(
        &self,
        filter: &ApplicationFilter,
        page: PageRequest,
    ) -> Result<Page<Application>, ServiceError> {
        Ok(self.store.list(filter, page)?)
    }

    /// Fetch an application owned by `tenant`. Other tenants' applications read as missing.
    pub fn get(&self, tenant: &str, id: &ApplicationId) -> Result<Application, ServiceError> {
        self.store
            .fetch(id)?
            .filter(|application| application.tenant == tenant)
            .ok_or(ServiceError::Repository(RepositoryError::NotFound))
    }

    /// Best effort: the caller's error is what gets reported.
    fn release_claims(&self, object_keys: &[String], id: &ApplicationId) {
        if let Err(err) = self.uploads.release(object_keys, id) {
            warn!(application_id = %id, error = %err, "failed to release file claims");
        }
    }

    /// Record a case-manager decision, guarded by the status machine.
    pub fn record_status(
        &self,
        id: &ApplicationId,
        status: ApplicationStatus,
    ) -> Result<Application, ServiceError> {
        let mut application = self.store.fetch(id)?.ok_or(RepositoryError::NotFound)?;
        if !application.status.can_transition_to(status) {
            return Err(ServiceError::InvalidTransition {
                id: id.clone(),
                from: application.status,
                to: status,
            });
        }
        application.status = status;
        self.store.update(application.clone())?;
        debug!(application_id = %id, status = %status, "application status recorded");
        Ok(application)
    }
}

fn unresolved(field: &str, message: String) -> FieldViolation {
    FieldViolation {
        field: field.to_string(),
        rule: ViolationRule::UnresolvedFileReference,
        message,
    }
}

fn field_for_key<'a>(uses: &'a [FileUse], object_key: &str) -> &'a str {
    uses.iter()
        .find(|file| file.object_key == object_key)
        .map(|file| file.field.as_str())
        .unwrap_or("uploaded_files")
}

fn rejected(tenant: &str, key: &SchemaKey, report: ValidationReport) -> ServiceError {
    warn!(
        tenant,
        schema = %key,
        issues = report.violations.len(),
        fields = ?report.fields(),
        "submission rejected"
    );
    ServiceError::Validation(report)
}

/// Error raised by the compliance request service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Validation(#[from] ValidationReport),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Page(#[from] InvalidPage),
    #[error("application {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: ApplicationId,
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Schema(SchemaError::NotFound(_)) => StatusCode::NOT_FOUND,
            ServiceError::Validation(_) | ServiceError::Page(_) => StatusCode::BAD_REQUEST,
            ServiceError::Upload(err) => match err {
                UploadError::NoFiles | UploadError::InvalidFileName(_) => StatusCode::BAD_REQUEST,
                UploadError::InvalidSignature | UploadError::Expired { .. } => {
                    StatusCode::FORBIDDEN
                }
                UploadError::UnknownObjectKey(_) => StatusCode::NOT_FOUND,
                UploadError::AlreadyUploaded(_)
                | UploadError::AlreadyClaimed { .. }
                | UploadError::Conflict(_) => StatusCode::CONFLICT,
                UploadError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            ServiceError::Repository(RepositoryError::Conflict)
            | ServiceError::InvalidTransition { .. } => StatusCode::CONFLICT,
            ServiceError::Repository(RepositoryError::Unavailable(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Client-facing message. Server faults stay opaque.
    pub fn detail(&self) -> String {
        match self {
            _ if self.status_code().is_server_error() => "A server error occurred.".to_string(),
            ServiceError::Validation(_) => "Submission failed validation.".to_string(),
            ServiceError::Repository(RepositoryError::NotFound) => "Not found.".to_string(),
            other => other.to_string(),
        }
    }
}
