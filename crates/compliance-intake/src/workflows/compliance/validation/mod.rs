//! Field-level and application-level checks for submitted compliance applications.

mod rules;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::RwLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::conditional::{ActiveField, ActiveFieldSet};
use super::domain::{ApplicationSubmission, FieldValues};
use super::schema::{
    instance_key, split_instance_key, trigger_value, ComplianceSchema, ExtraValidation,
};
use super::uploads::is_object_key;
use rules::{check_type, is_blank, latest_birth_date, parse_date, Checked};

/// Rule a field failed. Serialized in the API's error payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationRule {
    Required,
    InvalidType,
    MaxLength,
    InvalidChoice,
    InvalidDate,
    InvalidEmail,
    InvalidNumber,
    InvalidPhone,
    InvalidCountry,
    InvalidEncoding,
    InvalidFileReference,
    Pattern,
    MinimumAge,
    DateOrder,
    FutureDate,
    UnknownField,
    InactiveField,
    DuplicateHostCountry,
    HostCountryCount,
    UnresolvedFileReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub rule: ViolationRule,
    pub message: String,
}

/// Every violation found in one submission, in the order the fields were checked.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub violations: Vec<FieldViolation>,
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.fields();
        write!(
            f,
            "submission failed validation ({} issue(s) on: {})",
            self.violations.len(),
            fields.join(", ")
        )
    }
}

impl std::error::Error for ValidationReport {}

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn push(&mut self, violation: FieldViolation) {
        self.violations.push(violation);
    }

    /// Distinct field keys mentioned, first occurrence first.
    pub fn fields(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.violations
            .iter()
            .map(|violation| violation.field.as_str())
            .filter(|field| seen.insert(*field))
            .collect()
    }

    pub fn for_field(&self, field: &str) -> Vec<&FieldViolation> {
        self.violations
            .iter()
            .filter(|violation| violation.field == field)
            .collect()
    }

    pub fn has(&self, field: &str, rule: ViolationRule) -> bool {
        self.violations
            .iter()
            .any(|violation| violation.field == field && violation.rule == rule)
    }

    fn into_result<T>(self, ok: T) -> Result<T, ValidationReport> {
        if self.is_empty() {
            Ok(ok)
        } else {
            Err(self)
        }
    }
}

/// File key referenced by a submission and where it was referenced from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileUse {
    pub field: String,
    pub object_key: String,
}

/// Result of a successful validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidatedSubmission {
    pub file_references: Vec<FileUse>,
}

/// Read-only validator. Holds a cache of compiled schema patterns.
#[derive(Debug)]
pub struct Validator {
    max_host_countries: usize,
    patterns: RwLock<HashMap<String, Regex>>,
}

impl Validator {
    pub fn new(max_host_countries: usize) -> Self {
        Self {
            max_host_countries: max_host_countries.max(1),
            patterns: RwLock::new(HashMap::new()),
        }
    }

    /// Validate a submission against its schema and the fields active for its answers.
    pub fn validate(
        &self,
        submission: &ApplicationSubmission,
        schema: &ComplianceSchema,
        active: &ActiveFieldSet<'_>,
        today: NaiveDate,
    ) -> Result<ValidatedSubmission, ValidationReport> {
        let (report, files) = self.inspect(submission, schema, active, today);
        report.into_result(ValidatedSubmission {
            file_references: files,
        })
    }

    /// Every violation plus every well-formed file key, even when the submission is invalid.
    pub fn inspect(
        &self,
        submission: &ApplicationSubmission,
        schema: &ComplianceSchema,
        active: &ActiveFieldSet<'_>,
        today: NaiveDate,
    ) -> (ValidationReport, Vec<FileUse>) {
        let mut report = ValidationReport::default();
        let mut files = Vec::new();

        self.check_application(submission, &mut report, &mut files);
        self.check_fields(schema, active, &submission.fields, today, &mut report, &mut files);

        (report, files)
    }

    fn check_application(
        &self,
        submission: &ApplicationSubmission,
        report: &mut ValidationReport,
        files: &mut Vec<FileUse>,
    ) {
        if submission.expiry_date <= submission.start_date {
            report.push(FieldViolation {
                field: "expiry_date".to_string(),
                rule: ViolationRule::DateOrder,
                message: "must be after start_date".to_string(),
            });
        }

        let hosts = &submission.host_countries;
        if hosts.is_empty() {
            report.push(FieldViolation {
                field: "host_countries".to_string(),
                rule: ViolationRule::Required,
                message: "at least one host country is required".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for host in hosts {
            if !seen.insert(host.as_str()) {
                report.push(FieldViolation {
                    field: "host_countries".to_string(),
                    rule: ViolationRule::DuplicateHostCountry,
                    message: format!("{host} is listed more than once"),
                });
            }
        }

        let compliance_type = submission.compliance_type;
        if hosts.len() > 1 && !compliance_type.allows_multiple_hosts() {
            report.push(FieldViolation {
                field: "host_countries".to_string(),
                rule: ViolationRule::HostCountryCount,
                message: format!(
                    "{} covers exactly one host country",
                    compliance_type.label()
                ),
            });
        } else if hosts.len() > self.max_host_countries {
            report.push(FieldViolation {
                field: "host_countries".to_string(),
                rule: ViolationRule::HostCountryCount,
                message: format!("at most {} host countries", self.max_host_countries),
            });
        }

        for object_key in &submission.uploaded_files {
            let object_key = object_key.trim();
            if is_object_key(object_key) {
                files.push(FileUse {
                    field: "uploaded_files".to_string(),
                    object_key: object_key.to_string(),
                });
            } else {
                report.push(FieldViolation {
                    field: "uploaded_files".to_string(),
                    rule: ViolationRule::InvalidFileReference,
                    message: format!("'{object_key}' is not an issued object key"),
                });
            }
        }
    }

    fn check_fields(
        &self,
        schema: &ComplianceSchema,
        active: &ActiveFieldSet<'_>,
        values: &FieldValues,
        today: NaiveDate,
        report: &mut ValidationReport,
        files: &mut Vec<FileUse>,
    ) {
        for (key, value) in values {
            if active.contains(key) || is_blank(value) {
                continue;
            }
            let (name, _) = split_instance_key(key);
            let (rule, message) = if schema.find(name).is_some() {
                (
                    ViolationRule::InactiveField,
                    "field does not apply to the current answers",
                )
            } else {
                (ViolationRule::UnknownField, "field is not part of this form")
            };
            report.push(FieldViolation {
                field: key.clone(),
                rule,
                message: message.to_string(),
            });
        }

        for field in active.iter() {
            let definition = field.definition;
            let value = values.get(&field.key).filter(|value| !is_blank(value));

            let Some(value) = value else {
                if definition.required {
                    report.push(FieldViolation {
                        field: field.key.clone(),
                        rule: ViolationRule::Required,
                        message: "this field is required".to_string(),
                    });
                }
                continue;
            };

            let checked = match check_type(definition, &field.key, value) {
                Ok(checked) => checked,
                Err(violation) => {
                    report.push(violation);
                    continue;
                }
            };

            if let Checked::Files(keys) = &checked {
                files.extend(keys.iter().map(|object_key| FileUse {
                    field: field.key.clone(),
                    object_key: object_key.clone(),
                }));
            }

            for rule in &definition.extra_validations {
                if let Some(violation) = self.check_extra(rule, field, value, &checked, values, today)
                {
                    report.push(violation);
                }
            }
        }
    }

    fn check_extra(
        &self,
        rule: &ExtraValidation,
        field: &ActiveField<'_>,
        value: &Value,
        checked: &Checked,
        values: &FieldValues,
        today: NaiveDate,
    ) -> Option<FieldViolation> {
        let key = &field.key;
        let fail = |rule: ViolationRule, message: String| {
            Some(FieldViolation {
                field: key.clone(),
                rule,
                message,
            })
        };

        match (rule, checked) {
            (ExtraValidation::Pattern { pattern, message }, _) => {
                let text = match checked {
                    Checked::Text(text) => text.clone(),
                    _ => trigger_value(value)?,
                };
                match self.matches_pattern(pattern, &text) {
                    Some(true) => None,
                    Some(false) => fail(
                        ViolationRule::Pattern,
                        message
                            .clone()
                            .unwrap_or_else(|| format!("does not match {pattern}")),
                    ),
                    None => {
                        warn!(field = %key, pattern, "schema pattern failed to compile");
                        fail(
                            ViolationRule::Pattern,
                            "field cannot be checked right now".to_string(),
                        )
                    }
                }
            }
            (ExtraValidation::MinimumAge { years }, Checked::Date(date)) => {
                let cutoff = latest_birth_date(today, *years)?;
                if *date > cutoff {
                    fail(
                        ViolationRule::MinimumAge,
                        format!("must be at least {years} years before today"),
                    )
                } else {
                    None
                }
            }
            (ExtraValidation::AfterField { field: other }, Checked::Date(date)) => {
                let earlier = sibling_date(other, field, values)?;
                if *date <= earlier {
                    fail(
                        ViolationRule::DateOrder,
                        format!("must be after {other}"),
                    )
                } else {
                    None
                }
            }
            (ExtraValidation::NotInFuture, Checked::Date(date)) => {
                if *date > today {
                    fail(
                        ViolationRule::FutureDate,
                        "cannot be in the future".to_string(),
                    )
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn matches_pattern(&self, pattern: &str, text: &str) -> Option<bool> {
        let cached = self
            .patterns
            .read()
            .ok()
            .and_then(|cache| cache.get(pattern).cloned());
        if let Some(regex) = cached {
            return Some(regex.is_match(text));
        }

        let regex = Regex::new(pattern).ok()?;
        let matched = regex.is_match(text);
        if let Ok(mut cache) = self.patterns.write() {
            cache.insert(pattern.to_string(), regex);
        }
        Some(matched)
    }
}

/// Date held by another field, preferring the same host-country instance.
fn sibling_date(name: &str, field: &ActiveField<'_>, values: &FieldValues) -> Option<NaiveDate> {
    let scoped = field
        .host_country
        .as_ref()
        .map(|host| instance_key(name, Some(host)));
    scoped
        .and_then(|key| values.get(&key))
        .or_else(|| values.get(name))
        .and_then(Value::as_str)
        .and_then(parse_date)
}
