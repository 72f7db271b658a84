use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{ApplicationId, ApplicationStatus, ApplicationSubmission, ComplianceType, CountryCode};
use super::repository::{ApplicationFilter, PageRequest, SubmissionStore};
use super::schema::{SchemaKey, SchemaProvider};
use super::service::{ActiveFieldsQuery, ComplianceRequestService, ServiceError};
use super::uploads::UploadRegistry;
use crate::auth::{require_tenant, ApiCredentials, TenantContext};

pub const LIST_PATH: &str = "/api/compliance/compliance-requests/";

/// Router builder exposing the compliance API behind the tenant middleware.
pub fn compliance_router<P, U, S>(
    service: Arc<ComplianceRequestService<P, U, S>>,
    credentials: Arc<ApiCredentials>,
) -> Router
where
    P: SchemaProvider + 'static,
    U: UploadRegistry + 'static,
    S: SubmissionStore + 'static,
{
    Router::new()
        .route("/api/compliance/fields", get(fields_handler::<P, U, S>))
        .route(
            "/api/compliance/fields/active",
            post(active_fields_handler::<P, U, S>),
        )
        .route(
            "/api/compliance/document_upload_url/",
            post(upload_url_handler::<P, U, S>),
        )
        .route(
            "/api/compliance/requests/create",
            post(create_handler::<P, U, S>),
        )
        .route(LIST_PATH, get(list_handler::<P, U, S>))
        .route(
            "/api/compliance/compliance-requests/:application_id",
            get(detail_handler::<P, U, S>),
        )
        .route_layer(middleware::from_fn_with_state(credentials, require_tenant))
        .with_state(service)
}

fn detail(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "detail": message.into() }))).into_response()
}

pub(crate) fn error_response(err: ServiceError) -> Response {
    let status = err.status_code();
    if status.is_server_error() {
        error!(error = %err, "compliance request failed");
    }
    match err {
        ServiceError::Validation(report) => {
            let payload = json!({
                "detail": "Submission failed validation.",
                "errors": report.violations,
            });
            (status, Json(payload)).into_response()
        }
        other => detail(status, other.detail()),
    }
}

fn parse_country(param: &str, raw: &str) -> Result<CountryCode, Response> {
    CountryCode::parse(raw).map_err(|err| {
        detail(StatusCode::BAD_REQUEST, format!("{param}: {err}"))
    })
}

fn optional_country(param: &str, raw: Option<&str>) -> Result<Option<CountryCode>, Response> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => parse_country(param, value).map(Some),
        None => Ok(None),
    }
}

fn parse_form_type(raw: &str) -> Result<ComplianceType, Response> {
    ComplianceType::from_code(raw).ok_or_else(|| {
        detail(
            StatusCode::BAD_REQUEST,
            format!("form_type: '{raw}' is not a known compliance type"),
        )
    })
}

#[derive(Debug, Deserialize)]
pub(crate) struct FieldsParams {
    country: String,
    form_type: String,
    host_country: Option<String>,
}

fn schema_key(params: &FieldsParams) -> Result<SchemaKey, Response> {
    let country = parse_country("country", &params.country)?;
    let key = SchemaKey::new(country, parse_form_type(&params.form_type)?);
    Ok(
        match optional_country("host_country", params.host_country.as_deref())? {
            Some(host) => key.for_host(host),
            None => key,
        },
    )
}

pub(crate) async fn fields_handler<P, U, S>(
    State(service): State<Arc<ComplianceRequestService<P, U, S>>>,
    params: Result<Query<FieldsParams>, QueryRejection>,
) -> Response
where
    P: SchemaProvider + 'static,
    U: UploadRegistry + 'static,
    S: SubmissionStore + 'static,
{
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => return detail(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    let key = match schema_key(&params) {
        Ok(key) => key,
        Err(response) => return response,
    };

    match service.fields(&key) {
        Ok(schema) => (StatusCode::OK, Json(schema.as_ref().clone())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn active_fields_handler<P, U, S>(
    State(service): State<Arc<ComplianceRequestService<P, U, S>>>,
    body: Result<Json<ActiveFieldsQuery>, JsonRejection>,
) -> Response
where
    P: SchemaProvider + 'static,
    U: UploadRegistry + 'static,
    S: SubmissionStore + 'static,
{
    let Json(query) = match body {
        Ok(body) => body,
        Err(rejection) => return detail(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    match service.active_fields(&query) {
        Ok(fields) => (StatusCode::OK, Json(json!({ "fields": fields }))).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadUrlRequest {
    file_names: Vec<String>,
}

pub(crate) async fn upload_url_handler<P, U, S>(
    State(service): State<Arc<ComplianceRequestService<P, U, S>>>,
    body: Result<Json<UploadUrlRequest>, JsonRejection>,
) -> Response
where
    P: SchemaProvider + 'static,
    U: UploadRegistry + 'static,
    S: SubmissionStore + 'static,
{
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return detail(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    match service.issue_upload_urls(&request.file_names, Utc::now()) {
        Ok(issued) => (StatusCode::OK, Json(issued)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn create_handler<P, U, S>(
    State(service): State<Arc<ComplianceRequestService<P, U, S>>>,
    Extension(context): Extension<TenantContext>,
    body: Result<Json<ApplicationSubmission>, JsonRejection>,
) -> Response
where
    P: SchemaProvider + 'static,
    U: UploadRegistry + 'static,
    S: SubmissionStore + 'static,
{
    let Json(submission) = match body {
        Ok(body) => body,
        Err(rejection) => return detail(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    let now = Utc::now();
    match service.submit(&context.tenant, submission, now) {
        Ok(application) => {
            let view = application.view(now.date_naive());
            (StatusCode::CREATED, Json(view)).into_response()
        }
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListParams {
    page: Option<u32>,
    page_size: Option<u32>,
    status: Option<String>,
    form_type: Option<String>,
    home_country: Option<String>,
    host_country: Option<String>,
}

fn non_empty(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

fn listing_filter(tenant: &str, params: &ListParams) -> Result<ApplicationFilter, Response> {
    let status = match non_empty(&params.status) {
        Some(raw) => Some(ApplicationStatus::from_label(raw).ok_or_else(|| {
            detail(
                StatusCode::BAD_REQUEST,
                format!("status: '{raw}' is not a known status"),
            )
        })?),
        None => None,
    };
    let compliance_type = match non_empty(&params.form_type) {
        Some(raw) => Some(parse_form_type(raw)?),
        None => None,
    };

    Ok(ApplicationFilter {
        tenant: tenant.to_string(),
        status,
        compliance_type,
        home_country: optional_country("home_country", params.home_country.as_deref())?,
        host_country: optional_country("host_country", params.host_country.as_deref())?,
    })
}

/// Relative link to another page of the same listing, filters preserved.
fn page_link(filter: &ApplicationFilter, page: u32, page_size: u32) -> String {
    let mut query = vec![format!("page={page}"), format!("page_size={page_size}")];
    if let Some(status) = filter.status {
        query.push(format!("status={}", status.label()));
    }
    if let Some(kind) = filter.compliance_type {
        query.push(format!("form_type={}", kind.code()));
    }
    if let Some(home) = &filter.home_country {
        query.push(format!("home_country={home}"));
    }
    if let Some(host) = &filter.host_country {
        query.push(format!("host_country={host}"));
    }
    format!("{LIST_PATH}?{}", query.join("&"))
}

pub(crate) async fn list_handler<P, U, S>(
    State(service): State<Arc<ComplianceRequestService<P, U, S>>>,
    Extension(context): Extension<TenantContext>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Response
where
    P: SchemaProvider + 'static,
    U: UploadRegistry + 'static,
    S: SubmissionStore + 'static,
{
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => return detail(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    let filter = match listing_filter(&context.tenant, &params) {
        Ok(filter) => filter,
        Err(response) => return response,
    };
    let request = match PageRequest::new(params.page, params.page_size) {
        Ok(request) => request,
        Err(err) => return error_response(err.into()),
    };

    let today = Utc::now().date_naive();
    match service.list(&filter, request) {
        Ok(page) => {
            let next = page
                .next_page()
                .map(|number| page_link(&filter, number, page.page_size));
            let previous = page
                .previous_page()
                .map(|number| page_link(&filter, number, page.page_size));
            let results: Vec<_> = page
                .results
                .iter()
                .map(|application| application.view(today))
                .collect();
            let payload = json!({
                "count": page.count,
                "next": next,
                "previous": previous,
                "results": results,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn detail_handler<P, U, S>(
    State(service): State<Arc<ComplianceRequestService<P, U, S>>>,
    Extension(context): Extension<TenantContext>,
    Path(application_id): Path<String>,
) -> Response
where
    P: SchemaProvider + 'static,
    U: UploadRegistry + 'static,
    S: SubmissionStore + 'static,
{
    let id = ApplicationId(application_id);
    match service.get(&context.tenant, &id) {
        Ok(application) => {
            let view = application.view(Utc::now().date_naive());
            (StatusCode::OK, Json(view)).into_response()
        }
        Err(err) => error_response(err),
    }
}
