use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::super::domain::{ComplianceType, CountryCode};

/// Semantic type of a form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[serde(rename = "string", alias = "text")]
    Text,
    Email,
    Number,
    Date,
    Boolean,
    Choice,
    Country,
    Phone,
    SignatureImage,
    FileReference,
}

/// Who is expected to answer the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    #[default]
    Subject,
    Counterpart,
    Assumption,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChoice {
    pub label: String,
    pub value: String,
}

impl FieldChoice {
    pub fn new(label: &str, value: &str) -> Self {
        Self {
            label: label.to_string(),
            value: value.to_string(),
        }
    }
}

/// Constraints layered on top of the type check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtraValidation {
    Pattern {
        pattern: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Date must lie at least `years` before today.
    MinimumAge { years: u32 },
    /// Date must be strictly later than the named date field.
    AfterField { field: String },
    NotInFuture,
}

/// Node of a schema tree. Children hang off `conditional_fields` and carry `parent_value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub persona: Persona,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<FieldChoice>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_validations: Vec<ExtraValidation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_value: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub repeat_per_host_country: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditional_fields: Vec<FieldDefinition>,
}

impl FieldDefinition {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            label: None,
            help_text: None,
            group: None,
            persona: Persona::Subject,
            required: false,
            max_length: None,
            choices: Vec::new(),
            extra_validations: Vec::new(),
            parent_value: None,
            repeat_per_host_country: false,
            conditional_fields: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn labelled(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn in_group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    pub fn answered_by(mut self, persona: Persona) -> Self {
        self.persona = persona;
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn with_choices(mut self, choices: &[(&str, &str)]) -> Self {
        self.choices = choices
            .iter()
            .map(|(label, value)| FieldChoice::new(label, value))
            .collect();
        self
    }

    pub fn validated_by(mut self, rule: ExtraValidation) -> Self {
        self.extra_validations.push(rule);
        self
    }

    pub fn per_host_country(mut self) -> Self {
        self.repeat_per_host_country = true;
        self
    }

    /// Attach a child shown when this field's value equals `parent_value`.
    pub fn when(mut self, parent_value: &str, mut child: FieldDefinition) -> Self {
        child.parent_value = Some(parent_value.to_string());
        self.conditional_fields.push(child);
        self
    }

    /// Whether this field can ever hold `value`. `None` means unconstrained.
    pub fn can_produce(&self, value: &str) -> Option<bool> {
        if self.field_type == FieldType::Boolean {
            return Some(value == "true" || value == "false");
        }
        if self.choices.is_empty() {
            return None;
        }
        Some(self.choices.iter().any(|choice| choice.value == value))
    }

    pub fn instance_key(&self, host_country: Option<&CountryCode>) -> String {
        instance_key(&self.name, host_country)
    }

    /// Depth-first walk over this field and every descendant.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a FieldDefinition, usize)) {
        fn inner<'a>(
            field: &'a FieldDefinition,
            depth: usize,
            visit: &mut dyn FnMut(&'a FieldDefinition, usize),
        ) {
            visit(field, depth);
            for child in &field.conditional_fields {
                inner(child, depth + 1, visit);
            }
        }
        inner(self, 0, visit);
    }
}

/// Key under which a field's value is submitted: `name`, or `name[CC]` per host country.
pub fn instance_key(name: &str, host_country: Option<&CountryCode>) -> String {
    match host_country {
        Some(country) => format!("{name}[{country}]"),
        None => name.to_string(),
    }
}

/// Split an instance key back into its field name and host country suffix.
pub fn split_instance_key(key: &str) -> (&str, Option<&str>) {
    match key.strip_suffix(']').and_then(|rest| rest.rsplit_once('[')) {
        Some((name, country)) => (name, Some(country)),
        None => (key, None),
    }
}

/// Normalize a submitted value into the string compared against `parent_value`.
pub fn trigger_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Lookup key for a schema in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaKey {
    pub country: CountryCode,
    pub compliance_type: ComplianceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_country: Option<CountryCode>,
}

impl SchemaKey {
    pub fn new(country: CountryCode, compliance_type: ComplianceType) -> Self {
        Self {
            country,
            compliance_type,
            host_country: None,
        }
    }

    pub fn for_host(mut self, host_country: CountryCode) -> Self {
        self.host_country = Some(host_country);
        self
    }

    /// The same key without the host-country qualifier.
    pub fn general(&self) -> Self {
        Self {
            country: self.country.clone(),
            compliance_type: self.compliance_type,
            host_country: None,
        }
    }
}

impl std::fmt::Display for SchemaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.host_country {
            Some(host) => write!(f, "{}/{} (host {})", self.country, self.compliance_type, host),
            None => write!(f, "{}/{}", self.country, self.compliance_type),
        }
    }
}

/// Ordered top-level fields for one jurisdiction/type pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceSchema {
    #[serde(flatten)]
    pub key: SchemaKey,
    pub fields: Vec<FieldDefinition>,
}

impl ComplianceSchema {
    pub fn new(key: SchemaKey, fields: Vec<FieldDefinition>) -> Self {
        Self { key, fields }
    }

    /// Find a definition anywhere in the tree by name.
    pub fn find(&self, name: &str) -> Option<&FieldDefinition> {
        let mut found = None;
        for field in &self.fields {
            field.walk(&mut |candidate, _| {
                if found.is_none() && candidate.name == name {
                    found = Some(candidate);
                }
            });
        }
        found
    }
}
