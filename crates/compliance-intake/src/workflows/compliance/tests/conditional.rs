use serde_json::json;

use super::common::*;
use crate::workflows::compliance::conditional::active_fields;
use crate::workflows::compliance::domain::ComplianceType;
use crate::workflows::compliance::schema::{
    ComplianceSchema, FieldDefinition, FieldType, SchemaCatalog, SchemaKey, SchemaProvider,
};

fn multi_state_schema() -> std::sync::Arc<ComplianceSchema> {
    SchemaCatalog::standard()
        .fields(&SchemaKey::new(
            country("DE"),
            ComplianceType::MultiStateCertificate,
        ))
        .expect("standard schema")
}

#[test]
fn evaluation_is_idempotent() {
    let schema = multi_state_schema();
    let fields = values(json!({
        "host_work_site[AT]": "client_site",
        "host_client_is_affiliate[AT]": "true",
    }));
    let hosts = [country("AT"), country("FR")];

    let first = active_fields(&schema, &fields, &hosts);
    let second = active_fields(&schema, &fields, &hosts);

    assert_eq!(first, second);
    assert_eq!(first.keys(), second.keys());
}

#[test]
fn multi_host_expansion_yields_independent_copies() {
    let schema = multi_state_schema();
    let fields = values(json!({
        "host_work_site[UK]": "own_office",
        "host_work_site[AT]": "client_site",
    }));
    let hosts = [country("UK"), country("AT")];

    let active = active_fields(&schema, &fields, &hosts);

    for key in [
        "host_work_site[UK]",
        "host_work_site[AT]",
        "host_days_per_month[UK]",
        "host_days_per_month[AT]",
        "host_office_address[UK]",
        "host_client_name[AT]",
        "host_client_is_affiliate[AT]",
    ] {
        assert!(active.contains(key), "expected {key} to be active");
    }
    assert!(!active.contains("host_office_address[AT]"));
    assert!(!active.contains("host_client_name[UK]"));
    assert!(!active.contains("host_work_site"));

    let child = active.get("host_client_name[AT]").expect("child active");
    assert_eq!(child.parent_key.as_deref(), Some("host_work_site[AT]"));
    assert_eq!(child.host_country, Some(country("AT")));
    assert_eq!(child.depth, 1);
}

#[test]
fn duplicate_hosts_expand_once() {
    let schema = multi_state_schema();
    let hosts = [country("AT"), country("at")];

    let active = active_fields(&schema, &values(json!({})), &hosts);

    let site_instances = active
        .iter()
        .filter(|field| field.definition.name == "host_work_site")
        .count();
    assert_eq!(site_instances, 1);
}

#[test]
fn nested_children_activate_through_every_level() {
    let schema = multi_state_schema();
    let hosts = [country("AT")];

    let shallow = active_fields(
        &schema,
        &values(json!({ "host_work_site[AT]": "client_site" })),
        &hosts,
    );
    assert!(!shallow.contains("host_affiliate_registration[AT]"));

    let deep = active_fields(
        &schema,
        &values(json!({
            "host_work_site[AT]": "client_site",
            "host_client_is_affiliate[AT]": true,
        })),
        &hosts,
    );
    let registration = deep
        .get("host_affiliate_registration[AT]")
        .expect("grandchild active");
    assert_eq!(registration.depth, 2);
    assert_eq!(
        registration.parent_key.as_deref(),
        Some("host_client_is_affiliate[AT]")
    );
}

#[test]
fn children_follow_parent_changes() {
    let schema = multi_state_schema();
    let hosts = [country("AT")];

    let active = active_fields(
        &schema,
        &values(json!({
            "host_work_site[AT]": "home_office",
            "host_client_is_affiliate[AT]": true,
        })),
        &hosts,
    );

    assert!(!active.contains("host_client_is_affiliate[AT]"));
    assert!(!active.contains("host_affiliate_registration[AT]"));
}

#[test]
fn boolean_triggers_accept_json_bools_and_strings() {
    let schema = SchemaCatalog::standard()
        .fields(&SchemaKey::new(
            country("US"),
            ComplianceType::CoverageCertificate,
        ))
        .expect("standard schema");

    for value in [json!(true), json!("true"), json!(" true ")] {
        let active = active_fields(&schema, &values(json!({ "has_dependents": value })), &[]);
        assert!(active.contains("dependents_count"));
        assert!(active.contains("dependent_documents"));
    }

    let active = active_fields(
        &schema,
        &values(json!({ "has_dependents": false })),
        &[],
    );
    assert!(!active.contains("dependents_count"));
}

#[test]
fn stale_parent_values_never_activate() {
    let schema = ComplianceSchema::new(
        SchemaKey::new(country("FR"), ComplianceType::SingleCountryCertificate),
        vec![FieldDefinition::new("site", FieldType::Choice)
            .with_choices(&[("Office", "office")])
            .when("warehouse", FieldDefinition::new("dock", FieldType::Text))],
    );

    let active = active_fields(&schema, &values(json!({ "site": "warehouse" })), &[]);

    assert_eq!(active.keys(), vec!["site"]);
}

#[test]
fn numeric_values_trigger_by_decimal_rendering() {
    let schema = ComplianceSchema::new(
        SchemaKey::new(country("FR"), ComplianceType::SingleCountryCertificate),
        vec![FieldDefinition::new("trips", FieldType::Number)
            .when("3", FieldDefinition::new("third_trip_reason", FieldType::Text))],
    );

    let active = active_fields(&schema, &values(json!({ "trips": 3 })), &[]);
    assert!(active.contains("third_trip_reason"));

    let active = active_fields(&schema, &values(json!({ "trips": 2 })), &[]);
    assert!(!active.contains("third_trip_reason"));
}

#[test]
fn views_serialize_host_and_parent_metadata() {
    let schema = multi_state_schema();
    let active = active_fields(
        &schema,
        &values(json!({ "host_work_site[AT]": "own_office" })),
        &[country("AT")],
    );

    let views = serde_json::to_value(active.views()).expect("serialize");
    let office = views
        .as_array()
        .expect("array")
        .iter()
        .find(|view| view["key"] == "host_office_address[AT]")
        .expect("office field");
    assert_eq!(office["name"], "host_office_address");
    assert_eq!(office["type"], "string");
    assert_eq!(office["host_country"], "AT");
    assert_eq!(office["parent_key"], "host_work_site[AT]");
}
