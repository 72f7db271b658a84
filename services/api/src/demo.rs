use crate::infra::{
    in_memory_service, load_catalog, parse_country, parse_date, parse_form_type, IntakeService,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::Args;
use compliance_intake::config::IntakeConfig;
use compliance_intake::error::AppError;
use compliance_intake::workflows::compliance::{
    schema_key_for, ApplicationFilter, ApplicationSubmission, ComplianceSchema, ComplianceType,
    CountryCode, FieldValues, IssuedUpload, PageRequest, SchemaProvider, ServiceError,
};
use serde_json::json;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct SchemaArgs {
    /// Home country as a two-letter code
    #[arg(long, value_parser = parse_country)]
    pub(crate) country: CountryCode,
    /// Compliance type code (A1, A1_MULTI, COC, ETA, VISA)
    #[arg(long = "form-type", value_parser = parse_form_type)]
    pub(crate) form_type: ComplianceType,
    /// Host country; repeat for multi-state certificates
    #[arg(long = "host-country", value_parser = parse_country)]
    pub(crate) host_countries: Vec<CountryCode>,
    /// Load schemas from a JSON document instead of the built-in set
    #[arg(long)]
    pub(crate) schema_path: Option<PathBuf>,
    /// Print the schema as JSON rather than an outline
    #[arg(long, default_value_t = false)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Tenant the demo application is filed under
    #[arg(long, default_value = "demo")]
    pub(crate) tenant: String,
    /// Home country for the certificate of coverage
    #[arg(long, default_value = "US", value_parser = parse_country)]
    pub(crate) home_country: CountryCode,
    /// Country the employee is posted to
    #[arg(long, default_value = "DE", value_parser = parse_country)]
    pub(crate) host_country: CountryCode,
    /// Assignment start date (YYYY-MM-DD); defaults to two weeks from today
    #[arg(long, value_parser = parse_date)]
    pub(crate) start_date: Option<NaiveDate>,
    /// Skip the attempt to reuse an already attached upload
    #[arg(long, default_value_t = false)]
    pub(crate) skip_reuse: bool,
}

pub(crate) fn run_schema(args: SchemaArgs) -> Result<(), AppError> {
    let config = IntakeConfig {
        schema_path: args.schema_path,
        ..IntakeConfig::default()
    };
    let catalog = load_catalog(&config)?;
    let key = schema_key_for(&args.country, args.form_type, &args.host_countries);
    let schema = catalog.fields(&key).map_err(ServiceError::from)?;

    if args.json {
        match serde_json::to_string_pretty(schema.as_ref()) {
            Ok(payload) => println!("{payload}"),
            Err(err) => eprintln!("failed to render schema: {err}"),
        }
    } else {
        print_schema_outline(&schema);
    }
    Ok(())
}

fn print_schema_outline(schema: &ComplianceSchema) {
    println!(
        "{} schema for {}",
        schema.key.compliance_type.label(),
        schema.key
    );
    for field in &schema.fields {
        field.walk(&mut |node, depth| {
            let indent = "  ".repeat(depth + 1);
            let trigger = node
                .parent_value
                .as_deref()
                .map(|value| format!(" when parent = {value}"))
                .unwrap_or_default();
            let required = if node.required { " *" } else { "" };
            let per_host = if node.repeat_per_host_country {
                " [per host]"
            } else {
                ""
            };
            let field_type = serde_json::to_value(node.field_type)
                .ok()
                .and_then(|value| value.as_str().map(str::to_string))
                .unwrap_or_default();
            println!(
                "{indent}- {} ({field_type}){required}{per_host}{trigger}",
                node.name
            );
        });
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let service = in_memory_service(&IntakeConfig::default())?;
    let (today, start_date, expiry_date) = demo_dates(Utc::now(), args.start_date);

    println!("Compliance intake demo");
    println!("======================");
    println!("Tenant: {}", args.tenant);
    println!("Coverage window: {start_date} to {expiry_date}");

    let issued = service
        .issue_upload_urls(&["dependent passport.pdf".to_string()], Utc::now())?
        .remove(0);
    println!("\nUpload URL issued");
    println!("- file: {}", issued.file_name);
    println!("- object key: {}", issued.object_key);
    println!("- expires at: {}", issued.expires_at);

    let (expires, signature) = signed_query(&issued);
    let entry = service.accept_upload(
        &issued.object_key,
        expires,
        &signature,
        48_213,
        Utc::now(),
    )?;
    if let Some(upload) = entry.uploaded {
        println!("- stored {} bytes at {}", upload.size_bytes, upload.uploaded_at);
    }

    let submission = ApplicationSubmission {
        home_country: args.home_country,
        host_countries: vec![args.host_country],
        compliance_type: ComplianceType::CoverageCertificate,
        start_date,
        expiry_date,
        fields: demo_answers(start_date, expiry_date, &issued.object_key),
        uploaded_files: vec![issued.object_key.clone()],
    };
    let application = service.submit(&args.tenant, submission.clone(), Utc::now())?;
    let view = application.view(today);
    println!("\nApplication filed");
    println!("- id: {}", view.id);
    println!(
        "- {} from {} to {}",
        view.compliance_type.label(),
        view.home_country,
        join_countries(&view.host_countries)
    );
    println!("- status: {}", view.status);
    println!("- days to expiry: {}", view.days_to_expiry);

    if !args.skip_reuse {
        println!("\nResubmitting with the same upload");
        match service.submit(&args.tenant, submission, Utc::now()) {
            Err(ServiceError::Validation(report)) => {
                for violation in &report.violations {
                    println!("- {}: {}", violation.field, violation.message);
                }
            }
            Err(err) => println!("- rejected: {}", err.detail()),
            Ok(duplicate) => println!("- unexpectedly filed {}", duplicate.id),
        }
    }

    print_listing(&service, &args.tenant, today)?;
    Ok(())
}

/// Today's UTC date, the assignment start, and a one-year coverage expiry.
fn demo_dates(
    now: DateTime<Utc>,
    start_date: Option<NaiveDate>,
) -> (NaiveDate, NaiveDate, NaiveDate) {
    let today = now.date_naive();
    let start_date = start_date.unwrap_or(today + Duration::days(14));
    (today, start_date, start_date + Duration::days(364))
}

fn print_listing(service: &IntakeService, tenant: &str, today: NaiveDate) -> Result<(), AppError> {
    let page = service.list(&ApplicationFilter::for_tenant(tenant), PageRequest::default())?;
    println!("\nApplications on file ({})", page.count);
    for application in &page.results {
        println!(
            "- {} | {} | {} | expires in {} days",
            application.id,
            application.compliance_type,
            application.status,
            application.days_to_expiry(today)
        );
    }
    Ok(())
}

fn demo_answers(start_date: NaiveDate, expiry_date: NaiveDate, object_key: &str) -> FieldValues {
    let mut fields = FieldValues::new();
    let answers = [
        ("employee_first_name", json!("Maria")),
        ("employee_last_name", json!("Lopez")),
        ("employee_date_of_birth", json!("1988-02-11")),
        ("employee_phone", json!("+1 212 555 0134")),
        ("employee_ssn", json!("987654321")),
        ("employer_name", json!("Northwind Traders")),
        ("employer_ein", json!("98-7654321")),
        ("assignment_start_date", json!(start_date.to_string())),
        ("assignment_end_date", json!(expiry_date.to_string())),
        ("has_dependents", json!(true)),
        ("dependents_count", json!(1)),
        ("dependent_documents", json!([object_key])),
        ("employee_signature", json!("data:image/png;base64,iVBORw0KGgo=")),
    ];
    for (name, value) in answers {
        fields.insert(name.to_string(), value);
    }
    fields
}

/// `expires` and `signature` from a pre-signed URL's query string.
fn signed_query(issued: &IssuedUpload) -> (i64, String) {
    let query = issued
        .pre_signed_url
        .split_once('?')
        .map(|(_, query)| query)
        .unwrap_or_default();
    let mut expires = issued.expires_at.timestamp();
    let mut signature = String::new();
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some(("expires", value)) => expires = value.parse().unwrap_or(expires),
            Some(("signature", value)) => signature = value.to_string(),
            _ => {}
        }
    }
    (expires, signature)
}

fn join_countries(countries: &[CountryCode]) -> String {
    countries
        .iter()
        .map(CountryCode::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
