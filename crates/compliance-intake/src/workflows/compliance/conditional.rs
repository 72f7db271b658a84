//! Resolution of the fields currently in play for a (possibly partial) set of answers.

use std::collections::HashSet;

use serde::Serialize;

use super::domain::{CountryCode, FieldValues};
use super::schema::{trigger_value, ComplianceSchema, FieldDefinition, FieldType};

/// One instantiated field: a definition bound to its submission key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveField<'a> {
    pub key: String,
    pub definition: &'a FieldDefinition,
    pub host_country: Option<CountryCode>,
    pub parent_key: Option<String>,
    pub depth: usize,
}

impl ActiveField<'_> {
    pub fn view(&self) -> ActiveFieldView {
        ActiveFieldView {
            key: self.key.clone(),
            name: self.definition.name.clone(),
            field_type: self.definition.field_type,
            required: self.definition.required,
            host_country: self.host_country.clone(),
            parent_key: self.parent_key.clone(),
            depth: self.depth,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveFieldView {
    pub key: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_country: Option<CountryCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<String>,
    pub depth: usize,
}

/// Ordered set of active fields, in schema order with children after their parent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActiveFieldSet<'a> {
    fields: Vec<ActiveField<'a>>,
}

impl<'a> ActiveFieldSet<'a> {
    pub fn iter(&self) -> impl Iterator<Item = &ActiveField<'a>> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ActiveField<'a>> {
        self.fields.iter().find(|field| field.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.fields.iter().map(|field| field.key.as_str()).collect()
    }

    pub fn views(&self) -> Vec<ActiveFieldView> {
        self.fields.iter().map(ActiveField::view).collect()
    }
}

/// Compute the active field set.
///
/// A conditional child is active when its parent's current value equals the child's
/// `parent_value`. Children whose trigger the parent can never produce stay inactive.
/// Top-level fields flagged `repeat_per_host_country` are instantiated once for every
/// distinct host country, in the order given.
pub fn active_fields<'a>(
    schema: &'a ComplianceSchema,
    values: &FieldValues,
    host_countries: &[CountryCode],
) -> ActiveFieldSet<'a> {
    let mut seen = HashSet::new();
    let hosts: Vec<&CountryCode> = host_countries
        .iter()
        .filter(|country| seen.insert(country.as_str()))
        .collect();

    let mut set = ActiveFieldSet::default();
    for field in &schema.fields {
        if field.repeat_per_host_country {
            for host in hosts.iter().copied() {
                expand(field, Some(host), None, 0, values, &mut set);
            }
        } else {
            expand(field, None, None, 0, values, &mut set);
        }
    }
    set
}

fn expand<'a>(
    field: &'a FieldDefinition,
    host_country: Option<&CountryCode>,
    parent_key: Option<&str>,
    depth: usize,
    values: &FieldValues,
    set: &mut ActiveFieldSet<'a>,
) {
    let key = field.instance_key(host_country);
    let current = values.get(&key).and_then(trigger_value);

    set.fields.push(ActiveField {
        key: key.clone(),
        definition: field,
        host_country: host_country.cloned(),
        parent_key: parent_key.map(str::to_string),
        depth,
    });

    let Some(current) = current else {
        return;
    };

    for child in &field.conditional_fields {
        let Some(trigger) = child.parent_value.as_deref() else {
            continue;
        };
        if field.can_produce(trigger) == Some(false) {
            continue;
        }
        if trigger == current {
            expand(child, host_country, Some(&key), depth + 1, values, set);
        }
    }
}
