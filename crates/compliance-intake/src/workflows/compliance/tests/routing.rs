use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::auth::{ApiCredentials, TENANT_HEADER};
use crate::workflows::compliance::schema::SchemaCatalog;
use crate::workflows::compliance::{compliance_router, ComplianceRequestService};

fn submission_json() -> Value {
    serde_json::to_value(coc_submission()).expect("serialize submission")
}

#[tokio::test]
async fn requests_without_token_are_unauthorized() {
    let (service, _, _) = build_service();
    let router = router_with_service(service);

    let response = router
        .oneshot(
            Request::get("/api/compliance/fields?country=US&form_type=COC")
                .header(TENANT_HEADER, TENANT)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json_body(response).await;
    assert_eq!(
        body["detail"],
        "Authentication credentials were not provided."
    );
}

#[tokio::test]
async fn unknown_tokens_are_unauthorized() {
    let (service, _, _) = build_service();
    let router = router_with_service(service);

    let response = router
        .oneshot(
            Request::get("/api/compliance/compliance-requests/")
                .header(header::AUTHORIZATION, "Bearer forged")
                .header(TENANT_HEADER, TENANT)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_version_header_is_a_bad_request() {
    let (service, _, _) = build_service();
    let router = router_with_service(service);

    let response = router
        .oneshot(
            Request::get("/api/compliance/compliance-requests/")
                .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tenants_outside_the_grant_are_forbidden() {
    let (service, _, _) = build_service();
    let router = router_with_service(service);

    let response = router
        .oneshot(
            Request::get("/api/compliance/compliance-requests/")
                .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                .header(TENANT_HEADER, "globex")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn fields_route_serves_schema() {
    let (service, _, _) = build_service();
    let router = router_with_service(service);

    let response = router
        .oneshot(api_request(
            Method::GET,
            "/api/compliance/fields?country=us&host_country=DE&form_type=COC",
            None,
        ))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["country"], "US");
    assert_eq!(body["fields"][0]["name"], "employee_first_name");
    assert_eq!(body["fields"][0]["type"], "string");
}

#[tokio::test]
async fn fields_route_reports_unknown_schema_and_bad_params() {
    let (service, _, _) = build_service();
    let router = router_with_service(service);

    let response = router
        .clone()
        .oneshot(api_request(
            Method::GET,
            "/api/compliance/fields?country=JP&form_type=ETA",
            None,
        ))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json_body(response).await;
    assert!(body["detail"]
        .as_str()
        .expect("detail")
        .contains("JP/ETA"));

    let response = router
        .clone()
        .oneshot(api_request(
            Method::GET,
            "/api/compliance/fields?country=JP&form_type=PASSPORT",
            None,
        ))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = router
        .oneshot(api_request(Method::GET, "/api/compliance/fields?country=US", None))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn active_fields_route_expands_hosts() {
    let (service, _, _) = build_service();
    let router = router_with_service(service);

    let response = router
        .oneshot(api_request(
            Method::POST,
            "/api/compliance/fields/active",
            Some(json!({
                "country": "DE",
                "form_type": "A1_MULTI",
                "host_countries": ["UK", "AT"],
                "fields": { "host_work_site[AT]": "client_site" },
            })),
        ))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    let keys: Vec<&str> = body["fields"]
        .as_array()
        .expect("fields array")
        .iter()
        .filter_map(|field| field["key"].as_str())
        .collect();
    assert!(keys.contains(&"host_work_site[UK]"));
    assert!(keys.contains(&"host_client_name[AT]"));
    assert!(!keys.contains(&"host_client_name[UK]"));
}

#[tokio::test]
async fn upload_url_route_issues_one_url_per_name() {
    let (service, _, _) = build_service();
    let router = router_with_service(service);

    let response = router
        .clone()
        .oneshot(api_request(
            Method::POST,
            "/api/compliance/document_upload_url/",
            Some(json!({ "file_names": ["passport.pdf", "passport.pdf"] })),
        ))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    let issued = body.as_array().expect("array");
    assert_eq!(issued.len(), 2);
    assert_ne!(issued[0]["object_key"], issued[1]["object_key"]);
    assert!(issued[0]["pre_signed_url"]
        .as_str()
        .expect("url")
        .starts_with("https://storage.test/bucket/uploads/"));

    let response = router
        .oneshot(api_request(
            Method::POST,
            "/api/compliance/document_upload_url/",
            Some(json!({ "file_names": [] })),
        ))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_route_files_valid_applications() {
    let (service, _, _) = build_service();
    let router = router_with_service(service);

    let response = router
        .oneshot(api_request(
            Method::POST,
            "/api/compliance/requests/create",
            Some(submission_json()),
        ))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "FILED");
    assert_eq!(body["compliance_type"], "COC");
    assert_eq!(body["fields"]["employee_first_name"], "John");
    let expected_days = (coc_submission().expiry_date - Utc::now().date_naive()).num_days();
    assert_eq!(body["days_to_expiry"], expected_days);
}

#[tokio::test]
async fn create_route_returns_field_scoped_errors() {
    let (service, _, _) = build_service();
    let router = router_with_service(service);
    let mut payload = submission_json();
    payload["fields"]
        .as_object_mut()
        .expect("fields object")
        .remove("employee_first_name");
    payload["expiry_date"] = json!("2025-01-01");

    let response = router
        .oneshot(api_request(
            Method::POST,
            "/api/compliance/requests/create",
            Some(payload),
        ))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json_body(response).await;
    assert_eq!(body["detail"], "Submission failed validation.");
    let errors = body["errors"].as_array().expect("errors");
    assert!(errors
        .iter()
        .any(|error| error["field"] == "employee_first_name" && error["rule"] == "required"));
    assert!(errors
        .iter()
        .any(|error| error["field"] == "expiry_date" && error["rule"] == "date_order"));
}

#[tokio::test]
async fn create_route_rejects_malformed_json() {
    let (service, _, _) = build_service();
    let router = router_with_service(service);

    let response = router
        .oneshot(
            Request::post("/api/compliance/requests/create")
                .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                .header(TENANT_HEADER, TENANT)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{\"home_country\": "))
                .expect("request"),
        )
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json_body(response).await;
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn create_route_hides_store_faults() {
    let service = ComplianceRequestService::new(
        Arc::new(SchemaCatalog::standard()),
        Arc::new(MemoryUploadRegistry::default()),
        Arc::new(UnavailableStore),
        &intake_config(),
    );
    let router = compliance_router(
        Arc::new(service),
        Arc::new(ApiCredentials::single(TOKEN, TENANT)),
    );

    let response = router
        .oneshot(api_request(
            Method::POST,
            "/api/compliance/requests/create",
            Some(submission_json()),
        ))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json_body(response).await;
    assert_eq!(body["detail"], "A server error occurred.");
}

#[tokio::test]
async fn listing_route_paginates_with_links() {
    let (service, _, _) = build_service();
    for _ in 0..3 {
        service
            .submit(TENANT, coc_submission(), Utc::now())
            .expect("accepted");
    }
    service
        .submit("globex", coc_submission(), Utc::now())
        .expect("other tenant");
    let router = router_with_service(service);

    let response = router
        .clone()
        .oneshot(api_request(
            Method::GET,
            "/api/compliance/compliance-requests/?page=1&page_size=2&status=filed",
            None,
        ))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["count"], 3);
    assert_eq!(body["results"].as_array().expect("results").len(), 2);
    assert_eq!(
        body["next"],
        "/api/compliance/compliance-requests/?page=2&page_size=2&status=FILED"
    );
    assert_eq!(body["previous"], Value::Null);

    let response = router
        .oneshot(api_request(
            Method::GET,
            "/api/compliance/compliance-requests/?page=0",
            None,
        ))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn detail_route_is_tenant_scoped() {
    let (service, _, _) = build_service();
    let own = service
        .submit(TENANT, coc_submission(), Utc::now())
        .expect("accepted");
    let foreign = service
        .submit("globex", coc_submission(), Utc::now())
        .expect("accepted");
    let router = router_with_service(service);

    let response = router
        .clone()
        .oneshot(api_request(
            Method::GET,
            &format!("/api/compliance/compliance-requests/{}", own.id),
            None,
        ))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["id"], own.id.0);

    let response = router
        .oneshot(api_request(
            Method::GET,
            &format!("/api/compliance/compliance-requests/{}", foreign.id),
            None,
        ))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
