use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for persisted compliance applications.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Two-letter jurisdiction code, normalized to upper case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    pub fn parse(raw: &str) -> Result<Self, InvalidCountryCode> {
        let trimmed = raw.trim();
        if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(trimmed.to_ascii_uppercase()))
        } else {
            Err(InvalidCountryCode(raw.to_string()))
        }
    }

    /// Build from a literal already known to be a valid upper-case code.
    pub(crate) fn from_static(code: &'static str) -> Self {
        debug_assert!(code.len() == 2 && code.chars().all(|c| c.is_ascii_uppercase()));
        Self(code.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CountryCode {
    type Error = InvalidCountryCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CountryCode> for String {
    fn from(value: CountryCode) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a two-letter country code")]
pub struct InvalidCountryCode(pub String);

/// Category of cross-border requirement an application is filed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComplianceType {
    #[serde(rename = "A1")]
    SingleCountryCertificate,
    #[serde(rename = "A1_MULTI")]
    MultiStateCertificate,
    #[serde(rename = "COC")]
    CoverageCertificate,
    #[serde(rename = "ETA")]
    TravelAuthorization,
    #[serde(rename = "VISA")]
    Visa,
}

impl ComplianceType {
    pub const fn code(self) -> &'static str {
        match self {
            ComplianceType::SingleCountryCertificate => "A1",
            ComplianceType::MultiStateCertificate => "A1_MULTI",
            ComplianceType::CoverageCertificate => "COC",
            ComplianceType::TravelAuthorization => "ETA",
            ComplianceType::Visa => "VISA",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ComplianceType::SingleCountryCertificate => "Single-country certificate",
            ComplianceType::MultiStateCertificate => "Multi-state certificate",
            ComplianceType::CoverageCertificate => "Certificate of coverage",
            ComplianceType::TravelAuthorization => "Travel authorization",
            ComplianceType::Visa => "Visa",
        }
    }

    /// Only multi-state certificates cover more than one host country.
    pub const fn allows_multiple_hosts(self) -> bool {
        matches!(self, ComplianceType::MultiStateCertificate)
    }

    pub fn from_code(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "A1" => Some(Self::SingleCountryCertificate),
            "A1_MULTI" => Some(Self::MultiStateCertificate),
            "COC" => Some(Self::CoverageCertificate),
            "ETA" => Some(Self::TravelAuthorization),
            "VISA" => Some(Self::Visa),
            _ => None,
        }
    }
}

impl fmt::Display for ComplianceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Lifecycle of a filed application. Anything past `Filed` is set by case managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Filed,
    Approved,
    Rejected,
    Expired,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Filed => "FILED",
            ApplicationStatus::Approved => "APPROVED",
            ApplicationStatus::Rejected => "REJECTED",
            ApplicationStatus::Expired => "EXPIRED",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, ApplicationStatus::Filed)
    }

    pub const fn can_transition_to(self, next: ApplicationStatus) -> bool {
        matches!(
            (self, next),
            (
                ApplicationStatus::Filed,
                ApplicationStatus::Approved | ApplicationStatus::Rejected | ApplicationStatus::Expired
            )
        )
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "FILED" => Some(Self::Filed),
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Submitted field answers keyed by field (or per-host instance) key.
pub type FieldValues = BTreeMap<String, serde_json::Value>;

/// Inbound payload for `POST /api/compliance/requests/create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSubmission {
    pub home_country: CountryCode,
    pub host_countries: Vec<CountryCode>,
    #[serde(alias = "form_type")]
    pub compliance_type: ComplianceType,
    pub start_date: NaiveDate,
    pub expiry_date: NaiveDate,
    #[serde(default)]
    pub fields: FieldValues,
    #[serde(default)]
    pub uploaded_files: Vec<String>,
}

/// Persisted application, as stored by a `SubmissionStore`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub tenant: String,
    pub home_country: CountryCode,
    pub host_countries: Vec<CountryCode>,
    pub compliance_type: ComplianceType,
    pub status: ApplicationStatus,
    pub start_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub fields: FieldValues,
    pub uploaded_files: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Application {
    pub fn days_to_expiry(&self, today: NaiveDate) -> i64 {
        (self.expiry_date - today).num_days()
    }

    pub fn view(&self, today: NaiveDate) -> ApplicationView {
        ApplicationView {
            id: self.id.clone(),
            home_country: self.home_country.clone(),
            host_countries: self.host_countries.clone(),
            compliance_type: self.compliance_type,
            status: self.status.label(),
            start_date: self.start_date,
            expiry_date: self.expiry_date,
            days_to_expiry: self.days_to_expiry(today),
            fields: self.fields.clone(),
            uploaded_files: self.uploaded_files.clone(),
            created_at: self.created_at,
        }
    }
}

/// Outbound representation with computed fields.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationView {
    pub id: ApplicationId,
    pub home_country: CountryCode,
    pub host_countries: Vec<CountryCode>,
    pub compliance_type: ComplianceType,
    pub status: &'static str,
    pub start_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub days_to_expiry: i64,
    pub fields: FieldValues,
    pub uploaded_files: Vec<String>,
    pub created_at: DateTime<Utc>,
}
