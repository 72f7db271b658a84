use std::sync::OnceLock;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use chrono::{Months, NaiveDate};
use regex::Regex;
use serde_json::Value;

use super::super::domain::CountryCode;
use super::super::schema::{trigger_value, FieldDefinition, FieldType};
use super::super::uploads::is_object_key;
use super::{FieldViolation, ViolationRule};

/// Value after the type check, narrowed to what the extra validations need.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Checked {
    Text(String),
    Date(NaiveDate),
    Files(Vec<String>),
    Other,
}

fn phone_shape() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    PHONE.get_or_init(|| Regex::new(r"^\+?[1-9][0-9]{6,14}$").expect("phone pattern compiles"))
}

fn email_shape() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
    })
}

/// `null`, blank strings, and empty collections count as "not answered".
pub(super) fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

pub(super) fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Latest birth date that still satisfies a minimum age on `today`.
pub(super) fn latest_birth_date(today: NaiveDate, years: u32) -> Option<NaiveDate> {
    today.checked_sub_months(Months::new(years.saturating_mul(12)))
}

fn violation(key: &str, rule: ViolationRule, message: impl Into<String>) -> FieldViolation {
    FieldViolation {
        field: key.to_string(),
        rule,
        message: message.into(),
    }
}

fn as_text<'v>(key: &str, value: &'v Value) -> Result<&'v str, FieldViolation> {
    value
        .as_str()
        .ok_or_else(|| violation(key, ViolationRule::InvalidType, "expected a string"))
}

/// Check a non-blank value against its declared type.
pub(super) fn check_type(
    field: &FieldDefinition,
    key: &str,
    value: &Value,
) -> Result<Checked, FieldViolation> {
    let checked = match field.field_type {
        FieldType::Text => {
            let text = as_text(key, value)?;
            if let Some(max) = field.max_length {
                let length = text.chars().count();
                if length > max {
                    return Err(violation(
                        key,
                        ViolationRule::MaxLength,
                        format!("must be at most {max} characters (got {length})"),
                    ));
                }
            }
            Checked::Text(text.to_string())
        }
        FieldType::Email => {
            let text = as_text(key, value)?.trim();
            if !email_shape().is_match(text) {
                return Err(violation(
                    key,
                    ViolationRule::InvalidEmail,
                    "must be an email address",
                ));
            }
            Checked::Text(text.to_string())
        }
        FieldType::Number => {
            let numeric = match value {
                Value::Number(_) => true,
                Value::String(text) => text
                    .trim()
                    .parse::<f64>()
                    .is_ok_and(|number| number.is_finite()),
                _ => false,
            };
            if !numeric {
                return Err(violation(key, ViolationRule::InvalidNumber, "must be a number"));
            }
            Checked::Other
        }
        FieldType::Date => {
            let text = as_text(key, value)?;
            let date = parse_date(text).ok_or_else(|| {
                violation(key, ViolationRule::InvalidDate, "must be a date (YYYY-MM-DD)")
            })?;
            Checked::Date(date)
        }
        FieldType::Boolean => {
            let valid = match value {
                Value::Bool(_) => true,
                Value::String(text) => matches!(text.trim(), "true" | "false"),
                _ => false,
            };
            if !valid {
                return Err(violation(key, ViolationRule::InvalidType, "must be true or false"));
            }
            Checked::Other
        }
        FieldType::Choice => {
            let raw = trigger_value(value).ok_or_else(|| {
                violation(key, ViolationRule::InvalidType, "expected a single choice")
            })?;
            Checked::Text(raw)
        }
        FieldType::Country => {
            let text = as_text(key, value)?;
            let code = CountryCode::parse(text).map_err(|_| {
                violation(
                    key,
                    ViolationRule::InvalidCountry,
                    "must be a two-letter country code",
                )
            })?;
            Checked::Text(code.as_str().to_string())
        }
        FieldType::Phone => {
            let text = as_text(key, value)?;
            let compact: String = text
                .chars()
                .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
                .collect();
            if !phone_shape().is_match(&compact) {
                return Err(violation(
                    key,
                    ViolationRule::InvalidPhone,
                    "must be an international phone number",
                ));
            }
            Checked::Text(compact)
        }
        FieldType::SignatureImage => {
            let text = as_text(key, value)?.trim();
            if is_object_key(text) {
                Checked::Files(vec![text.to_string()])
            } else if decodes_as_image_payload(text) {
                Checked::Other
            } else {
                return Err(violation(
                    key,
                    ViolationRule::InvalidEncoding,
                    "must be a base64 image payload or an uploaded file key",
                ));
            }
        }
        FieldType::FileReference => Checked::Files(file_keys(key, value)?),
    };

    if !field.choices.is_empty() && field.field_type != FieldType::Boolean {
        let raw = trigger_value(value).unwrap_or_default();
        let raw = match field.field_type {
            FieldType::Country => raw.to_ascii_uppercase(),
            _ => raw,
        };
        if !field.choices.iter().any(|choice| choice.value == raw) {
            return Err(violation(
                key,
                ViolationRule::InvalidChoice,
                format!("'{raw}' is not one of the offered choices"),
            ));
        }
    }

    Ok(checked)
}

fn decodes_as_image_payload(raw: &str) -> bool {
    let payload = match raw.strip_prefix("data:") {
        Some(rest) => match rest.split_once(";base64,") {
            Some((mime, payload)) if mime.starts_with("image/") => payload,
            _ => return false,
        },
        None => raw,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64_STANDARD
        .decode(compact.as_bytes())
        .map(|bytes| !bytes.is_empty())
        .unwrap_or(false)
}

fn file_keys(key: &str, value: &Value) -> Result<Vec<String>, FieldViolation> {
    let invalid = || {
        violation(
            key,
            ViolationRule::InvalidFileReference,
            "must reference an object key issued by the upload endpoint",
        )
    };

    let keys: Vec<String> = match value {
        Value::String(text) => vec![text.trim().to_string()],
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(|text| text.trim().to_string()))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(invalid)?,
        _ => return Err(invalid()),
    };

    if keys.iter().all(|candidate| is_object_key(candidate)) {
        Ok(keys)
    } else {
        Err(invalid())
    }
}
