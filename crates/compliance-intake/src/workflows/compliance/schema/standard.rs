//! Schemas shipped with the service. Deployments replace them through `APP_SCHEMA_PATH`.

use super::super::domain::{ComplianceType, CountryCode};
use super::definition::{
    ComplianceSchema, ExtraValidation, FieldDefinition, FieldType, Persona, SchemaKey,
};

pub(super) fn schemas() -> Vec<ComplianceSchema> {
    vec![
        us_certificate_of_coverage(),
        de_single_country_certificate(),
        de_multi_state_certificate(),
        gb_travel_authorization(),
        gb_visa_for_us_hosts(),
    ]
}

fn key(country: &'static str, compliance_type: ComplianceType) -> SchemaKey {
    SchemaKey::new(CountryCode::from_static(country), compliance_type)
}

fn employee_identity() -> Vec<FieldDefinition> {
    vec![
        FieldDefinition::new("employee_first_name", FieldType::Text)
            .labelled("First name")
            .in_group("Employee")
            .required()
            .max_length(50),
        FieldDefinition::new("employee_last_name", FieldType::Text)
            .labelled("Last name")
            .in_group("Employee")
            .required()
            .max_length(50),
        FieldDefinition::new("employee_date_of_birth", FieldType::Date)
            .labelled("Date of birth")
            .in_group("Employee")
            .required()
            .validated_by(ExtraValidation::NotInFuture)
            .validated_by(ExtraValidation::MinimumAge { years: 18 }),
        FieldDefinition::new("employee_email", FieldType::Email)
            .labelled("Email")
            .in_group("Employee"),
        FieldDefinition::new("employee_phone", FieldType::Phone)
            .labelled("Phone number")
            .in_group("Employee")
            .required(),
    ]
}

fn employer(group: &str) -> FieldDefinition {
    FieldDefinition::new("employer_name", FieldType::Text)
        .labelled("Employer name")
        .in_group(group)
        .answered_by(Persona::Counterpart)
        .required()
        .max_length(120)
}

fn signature() -> FieldDefinition {
    FieldDefinition::new("employee_signature", FieldType::SignatureImage)
        .labelled("Signature")
        .in_group("Declaration")
        .required()
}

fn assignment_window() -> Vec<FieldDefinition> {
    vec![
        FieldDefinition::new("assignment_start_date", FieldType::Date)
            .labelled("Assignment start")
            .in_group("Assignment")
            .required(),
        FieldDefinition::new("assignment_end_date", FieldType::Date)
            .labelled("Assignment end")
            .in_group("Assignment")
            .required()
            .validated_by(ExtraValidation::AfterField {
                field: "assignment_start_date".to_string(),
            }),
    ]
}

fn us_certificate_of_coverage() -> ComplianceSchema {
    let mut fields = employee_identity();
    fields.push(
        FieldDefinition::new("employee_ssn", FieldType::Text)
            .labelled("Social Security number")
            .in_group("Employee")
            .required()
            .validated_by(ExtraValidation::Pattern {
                pattern: r"^\d{3}-?\d{2}-?\d{4}$".to_string(),
                message: Some("must be a nine digit SSN".to_string()),
            }),
    );
    fields.push(employer("Employer"));
    fields.push(
        FieldDefinition::new("employer_ein", FieldType::Text)
            .labelled("Employer EIN")
            .in_group("Employer")
            .answered_by(Persona::Counterpart)
            .required()
            .validated_by(ExtraValidation::Pattern {
                pattern: r"^\d{2}-?\d{7}$".to_string(),
                message: Some("must be a nine digit EIN".to_string()),
            }),
    );
    fields.extend(assignment_window());
    fields.push(
        FieldDefinition::new("has_dependents", FieldType::Boolean)
            .labelled("Dependents accompany the employee")
            .in_group("Dependents")
            .required()
            .when(
                "true",
                FieldDefinition::new("dependents_count", FieldType::Number)
                    .labelled("Number of dependents")
                    .in_group("Dependents")
                    .required(),
            )
            .when(
                "true",
                FieldDefinition::new("dependent_documents", FieldType::FileReference)
                    .labelled("Dependent passports")
                    .in_group("Dependents")
                    .required(),
            ),
    );
    fields.push(
        FieldDefinition::new("covered_by_home_social_security", FieldType::Boolean)
            .labelled("Remains covered by home social security")
            .in_group("Assumptions")
            .answered_by(Persona::Assumption),
    );
    fields.push(signature());

    ComplianceSchema::new(key("US", ComplianceType::CoverageCertificate), fields)
}

fn de_single_country_certificate() -> ComplianceSchema {
    let mut fields = employee_identity();
    fields.push(
        FieldDefinition::new("nationality", FieldType::Country)
            .labelled("Nationality")
            .in_group("Employee")
            .required(),
    );
    fields.push(employer("Employer"));
    fields.extend(assignment_window());
    fields.push(
        FieldDefinition::new("host_work_address", FieldType::Text)
            .labelled("Work address in host country")
            .in_group("Assignment")
            .required()
            .max_length(255),
    );
    fields.push(signature());

    ComplianceSchema::new(key("DE", ComplianceType::SingleCountryCertificate), fields)
}

fn host_work_site() -> FieldDefinition {
    FieldDefinition::new("host_work_site", FieldType::Choice)
        .labelled("Where will the work take place?")
        .in_group("Host country")
        .required()
        .per_host_country()
        .with_choices(&[
            ("Client site", "client_site"),
            ("Own office", "own_office"),
            ("Home office", "home_office"),
        ])
        .when(
            "client_site",
            FieldDefinition::new("host_client_name", FieldType::Text)
                .labelled("Client name")
                .in_group("Host country")
                .answered_by(Persona::Counterpart)
                .required()
                .max_length(120),
        )
        .when(
            "client_site",
            FieldDefinition::new("host_client_is_affiliate", FieldType::Boolean)
                .labelled("Client belongs to the same group")
                .in_group("Host country")
                .required()
                .when(
                    "true",
                    FieldDefinition::new("host_affiliate_registration", FieldType::Text)
                        .labelled("Affiliate registration number")
                        .in_group("Host country")
                        .required()
                        .validated_by(ExtraValidation::Pattern {
                            pattern: r"^[A-Z0-9-]{4,20}$".to_string(),
                            message: None,
                        }),
                ),
        )
        .when(
            "own_office",
            FieldDefinition::new("host_office_address", FieldType::Text)
                .labelled("Office address")
                .in_group("Host country")
                .required()
                .max_length(255),
        )
}

fn de_multi_state_certificate() -> ComplianceSchema {
    let mut fields = employee_identity();
    fields.push(
        FieldDefinition::new("nationality", FieldType::Country)
            .labelled("Nationality")
            .in_group("Employee")
            .required(),
    );
    fields.push(employer("Employer"));
    fields.extend(assignment_window());
    fields.push(host_work_site());
    fields.push(
        FieldDefinition::new("host_days_per_month", FieldType::Number)
            .labelled("Working days per month")
            .in_group("Host country")
            .required()
            .per_host_country(),
    );
    fields.push(signature());

    ComplianceSchema::new(key("DE", ComplianceType::MultiStateCertificate), fields)
}

fn travel_purpose() -> FieldDefinition {
    FieldDefinition::new("travel_purpose", FieldType::Choice)
        .labelled("Purpose of travel")
        .in_group("Trip")
        .required()
        .with_choices(&[
            ("Business meeting", "business_meeting"),
            ("Conference", "conference"),
            ("Project work", "project_work"),
        ])
        .when(
            "conference",
            FieldDefinition::new("conference_name", FieldType::Text)
                .labelled("Conference name")
                .in_group("Trip")
                .required()
                .max_length(120),
        )
        .when(
            "project_work",
            FieldDefinition::new("project_description", FieldType::Text)
                .labelled("Project description")
                .in_group("Trip")
                .required()
                .max_length(500),
        )
}

fn passport() -> Vec<FieldDefinition> {
    vec![
        FieldDefinition::new("passport_number", FieldType::Text)
            .labelled("Passport number")
            .in_group("Passport")
            .required()
            .validated_by(ExtraValidation::Pattern {
                pattern: r"^[A-Z0-9]{6,9}$".to_string(),
                message: Some("must be 6-9 upper-case letters or digits".to_string()),
            }),
        FieldDefinition::new("passport_scan", FieldType::FileReference)
            .labelled("Passport scan")
            .in_group("Passport")
            .required(),
    ]
}

fn gb_travel_authorization() -> ComplianceSchema {
    let mut fields = employee_identity();
    fields.extend(passport());
    fields.push(travel_purpose());

    ComplianceSchema::new(key("GB", ComplianceType::TravelAuthorization), fields)
}

fn gb_visa_for_us_hosts() -> ComplianceSchema {
    let mut fields = employee_identity();
    fields.extend(passport());
    fields.push(travel_purpose());
    fields.push(employer("Sponsor"));
    fields.push(
        FieldDefinition::new("us_sponsor_address", FieldType::Text)
            .labelled("US sponsor address")
            .in_group("Sponsor")
            .answered_by(Persona::Counterpart)
            .required()
            .max_length(255),
    );
    fields.push(
        FieldDefinition::new("previous_us_visa", FieldType::Boolean)
            .labelled("Held a US visa before")
            .in_group("History")
            .required()
            .when(
                "true",
                FieldDefinition::new("previous_visa_issued_on", FieldType::Date)
                    .labelled("Previous visa issue date")
                    .in_group("History")
                    .required()
                    .validated_by(ExtraValidation::NotInFuture),
            ),
    );
    fields.push(signature());

    let key = key("GB", ComplianceType::Visa).for_host(CountryCode::from_static("US"));
    ComplianceSchema::new(key, fields)
}
