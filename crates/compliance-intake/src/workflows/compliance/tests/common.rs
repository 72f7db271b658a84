use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};

use crate::auth::{ApiCredentials, TENANT_HEADER};
use crate::config::IntakeConfig;
use crate::workflows::compliance::domain::{
    Application, ApplicationId, ApplicationSubmission, ComplianceType, CountryCode, FieldValues,
};
use crate::workflows::compliance::repository::{
    ApplicationFilter, Page, PageRequest, RepositoryError, SubmissionStore,
};
use crate::workflows::compliance::schema::SchemaCatalog;
use crate::workflows::compliance::uploads::{
    IssuedUpload, UploadEntry, UploadError, UploadRegistry,
};
use crate::workflows::compliance::{compliance_router, ComplianceRequestService};

pub(super) const TOKEN: &str = "test-token";
pub(super) const TENANT: &str = "acme";
pub(super) const SIGNATURE_PNG: &str = "data:image/png;base64,iVBORw0KGgo=";

pub(super) type TestService =
    ComplianceRequestService<SchemaCatalog, MemoryUploadRegistry, MemorySubmissionStore>;

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn today() -> NaiveDate {
    now().date_naive()
}

pub(super) fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("valid date")
}

pub(super) fn country(raw: &str) -> CountryCode {
    CountryCode::parse(raw).expect("valid country")
}

pub(super) fn intake_config() -> IntakeConfig {
    IntakeConfig {
        upload_base_url: "https://storage.test/bucket/".to_string(),
        signing_secret: "test-signing-secret".to_string(),
        max_host_countries: 5,
        schema_path: None,
    }
}

pub(super) fn values(pairs: Value) -> FieldValues {
    serde_json::from_value(pairs).expect("field values")
}

fn employee_fields() -> Value {
    json!({
        "employee_first_name": "John",
        "employee_last_name": "Doe",
        "employee_date_of_birth": "1985-06-15",
        "employee_email": "john.doe@example.com",
        "employee_phone": "+1 415 555 0100",
        "employer_name": "Acme Corp",
        "assignment_start_date": "2025-04-01",
        "assignment_end_date": "2026-03-31",
        "employee_signature": SIGNATURE_PNG,
    })
}

fn merge(base: Value, extra: Value) -> FieldValues {
    let mut fields = values(base);
    fields.extend(values(extra));
    fields
}

/// Complete, valid US certificate-of-coverage submission for one host country.
pub(super) fn coc_submission() -> ApplicationSubmission {
    ApplicationSubmission {
        home_country: country("US"),
        host_countries: vec![country("DE")],
        compliance_type: ComplianceType::CoverageCertificate,
        start_date: date("2025-04-01"),
        expiry_date: date("2026-03-31"),
        fields: merge(
            employee_fields(),
            json!({
                "employee_ssn": "123-45-6789",
                "employer_ein": "12-3456789",
                "has_dependents": false,
            }),
        ),
        uploaded_files: Vec::new(),
    }
}

/// Complete, valid German multi-state certificate covering Austria and France.
pub(super) fn multi_state_submission() -> ApplicationSubmission {
    ApplicationSubmission {
        home_country: country("DE"),
        host_countries: vec![country("AT"), country("FR")],
        compliance_type: ComplianceType::MultiStateCertificate,
        start_date: date("2025-04-01"),
        expiry_date: date("2026-03-31"),
        fields: merge(
            employee_fields(),
            json!({
                "nationality": "DE",
                "host_work_site[AT]": "client_site",
                "host_client_name[AT]": "Kunde GmbH",
                "host_client_is_affiliate[AT]": false,
                "host_days_per_month[AT]": 10,
                "host_work_site[FR]": "home_office",
                "host_days_per_month[FR]": 4,
            }),
        ),
        uploaded_files: Vec::new(),
    }
}

pub(super) fn build_service() -> (
    TestService,
    Arc<MemoryUploadRegistry>,
    Arc<MemorySubmissionStore>,
) {
    let registry = Arc::new(MemoryUploadRegistry::default());
    let store = Arc::new(MemorySubmissionStore::default());
    let service = ComplianceRequestService::new(
        Arc::new(SchemaCatalog::standard()),
        registry.clone(),
        store.clone(),
        &intake_config(),
    );
    (service, registry, store)
}

/// Split a pre-signed URL into the key, expiry, and signature the storage side receives.
pub(super) fn signed_parts(issued: &IssuedUpload) -> (String, i64, String) {
    let (_, query) = issued
        .pre_signed_url
        .split_once('?')
        .expect("url carries a query");
    let mut expires = None;
    let mut signature = None;
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some(("expires", value)) => expires = value.parse().ok(),
            Some(("signature", value)) => signature = Some(value.to_string()),
            _ => {}
        }
    }
    (
        issued.object_key.clone(),
        expires.expect("expires param"),
        signature.expect("signature param"),
    )
}

/// Issue a URL for `file_name` and upload to it at `at`.
pub(super) fn uploaded_key(service: &TestService, file_name: &str, at: DateTime<Utc>) -> String {
    let issued = service
        .issue_upload_urls(&[file_name.to_string()], now())
        .expect("issue url")
        .remove(0);
    let (object_key, expires, signature) = signed_parts(&issued);
    service
        .accept_upload(&object_key, expires, &signature, 2048, at)
        .expect("upload accepted");
    object_key
}

#[derive(Default, Clone)]
pub(super) struct MemorySubmissionStore {
    pub(super) records: Arc<Mutex<HashMap<ApplicationId, Application>>>,
}

impl MemorySubmissionStore {
    pub(super) fn len(&self) -> usize {
        self.records.lock().expect("store mutex poisoned").len()
    }
}

impl SubmissionStore for MemorySubmissionStore {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError> {
        let mut guard = self.records.lock().expect("store mutex poisoned");
        if guard.contains_key(&application.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn update(&self, application: Application) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("store mutex poisoned");
        guard.insert(application.id.clone(), application);
        Ok(())
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn list(
        &self,
        filter: &ApplicationFilter,
        page: PageRequest,
    ) -> Result<Page<Application>, RepositoryError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        let matching = guard
            .values()
            .filter(|application| filter.matches(application))
            .cloned()
            .collect();
        Ok(Page::paginate(matching, page))
    }
}

pub(super) struct UnavailableStore;

impl SubmissionStore for UnavailableStore {
    fn insert(&self, _application: Application) -> Result<Application, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _application: Application) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(
        &self,
        _filter: &ApplicationFilter,
        _page: PageRequest,
    ) -> Result<Page<Application>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryUploadRegistry {
    entries: Arc<Mutex<HashMap<String, UploadEntry>>>,
}

impl MemoryUploadRegistry {
    pub(super) fn entry(&self, object_key: &str) -> Option<UploadEntry> {
        self.entries
            .lock()
            .expect("registry mutex poisoned")
            .get(object_key)
            .cloned()
    }
}

impl UploadRegistry for MemoryUploadRegistry {
    fn insert(&self, entry: UploadEntry) -> Result<(), UploadError> {
        let mut guard = self.entries.lock().expect("registry mutex poisoned");
        let key = entry.reference.object_key.clone();
        if guard.contains_key(&key) {
            return Err(UploadError::Conflict(key));
        }
        guard.insert(key, entry);
        Ok(())
    }

    fn fetch(&self, object_key: &str) -> Result<Option<UploadEntry>, UploadError> {
        let guard = self.entries.lock().expect("registry mutex poisoned");
        Ok(guard.get(object_key).cloned())
    }

    fn update(&self, entry: UploadEntry) -> Result<(), UploadError> {
        let mut guard = self.entries.lock().expect("registry mutex poisoned");
        guard.insert(entry.reference.object_key.clone(), entry);
        Ok(())
    }
    fn claim(&self, object_key: &str, application_id: &ApplicationId) -> Result<(), UploadError> {
        let mut guard = self.entries.lock().expect("registry mutex poisoned");
        guard
            .get_mut(object_key)
            .ok_or_else(|| UploadError::UnknownObjectKey(object_key.to_string()))?
            .claim_for(application_id)
    }

    fn release(
        &self,
        object_key: &str,
        application_id: &ApplicationId,
    ) -> Result<(), UploadError> {
        let mut guard = self.entries.lock().expect("registry mutex poisoned");
        if let Some(entry) = guard.get_mut(object_key) {
            entry.release_for(application_id);
        }
        Ok(())
    }
}

pub(super) fn router_with_service(service: TestService) -> axum::Router {
    compliance_router(
        Arc::new(service),
        Arc::new(ApiCredentials::single(TOKEN, TENANT)),
    )
}

/// Authenticated request for `TENANT`, with an optional JSON body.
pub(super) fn api_request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .header(TENANT_HEADER, TENANT);
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).expect("serialize body")))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
