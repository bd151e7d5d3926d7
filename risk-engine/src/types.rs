//! Core types for risk engine

use chrono::{DateTime, NaiveDate, Utc};
use compliance_service::ScreeningResult;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Registration status of a company
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyStatus {
    /// Registered and trading
    Active,
    /// Dissolved or struck off
    Dissolved,
    /// Suspended (moratorium, bankruptcy proceedings)
    Suspended,
    /// Registry did not say
    Unknown,
}

impl CompanyStatus {
    /// Check if active
    pub fn is_active(&self) -> bool {
        matches!(self, CompanyStatus::Active)
    }
}

impl fmt::Display for CompanyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompanyStatus::Active => "active",
            CompanyStatus::Dissolved => "dissolved",
            CompanyStatus::Suspended => "suspended",
            CompanyStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Postal address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Street name
    pub street: Option<String>,
    /// House number, including any suffix
    pub house_number: Option<String>,
    /// Postal code
    pub postal_code: Option<String>,
    /// City
    pub city: Option<String>,
    /// Country
    pub country: Option<String>,
}

/// Industry classification code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndustryCode {
    /// Code, e.g. an SBI or NACE code
    pub code: String,
    /// Human-readable description
    pub description: Option<String>,
    /// Main activity of the company
    pub primary: bool,
}

/// Officer or director
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Officer {
    /// Full name
    pub name: String,
    /// Role, e.g. "director"
    pub role: String,
}

/// Company profile as fetched from the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    /// Registry number
    pub registry_number: String,

    /// Legal name
    pub legal_name: String,

    /// Legal form, e.g. "Besloten Vennootschap"
    pub legal_form: Option<String>,

    /// Trade names
    pub trade_names: Vec<String>,

    /// Registration status
    pub status: CompanyStatus,

    /// Registration date
    pub registration_date: Option<NaiveDate>,

    /// Main address
    pub address: Option<Address>,

    /// Industry codes, main activity first
    pub industry_codes: Vec<IndustryCode>,

    /// Officers and directors
    pub officers: Vec<Officer>,
}

impl CompanyProfile {
    /// Names of profile fields that are missing or empty
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.officers.is_empty() {
            missing.push("officers");
        }
        if self.address.is_none() {
            missing.push("address");
        }
        if self.industry_codes.is_empty() {
            missing.push("industry_codes");
        }
        if self.registration_date.is_none() {
            missing.push("registration_date");
        }
        missing
    }
}

/// Registry search hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryMatch {
    /// Registry number
    pub registry_number: String,
    /// Name as registered
    pub name: String,
}

/// Risk level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Low risk
    Low,
    /// Medium risk
    Medium,
    /// High risk
    High,
}

impl RiskLevel {
    /// Level for a score in [0, 100]: high from 75, medium from 50
    pub fn from_score(score: Decimal) -> Self {
        if score >= Decimal::from(75) {
            RiskLevel::High
        } else if score >= Decimal::from(50) {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// One contribution to a risk score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    /// Factor name
    pub name: String,

    /// Configured weight
    pub weight: Decimal,

    /// Observed value the weight applies to
    pub raw_value: Decimal,

    /// Points added to (or, for the clamp adjustment, removed from) the score
    pub contribution: Decimal,
}

/// Risk assessment result
///
/// `factors` always sum to `score` exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Registry number of the assessed company
    pub company_id: String,

    /// Legal name of the assessed company
    pub legal_name: String,

    /// Risk score (0-100)
    pub score: Decimal,

    /// Risk level
    pub risk_level: RiskLevel,

    /// Contributing factors, in a fixed order
    pub factors: Vec<RiskFactor>,

    /// Screening the score is based on
    pub screening: ScreeningResult,

    /// Degraded: based on a stale profile, a stale screening or no
    /// screening answer at all
    pub stale: bool,

    /// Sanctions status could not be determined
    pub indeterminate: bool,

    /// Sources that answered, e.g. `kvk:profile:68750110`
    pub provenance: Vec<String>,

    /// Assessment timestamp
    pub computed_at: DateTime<Utc>,
}

impl RiskAssessment {
    /// Sum of factor contributions
    pub fn factor_total(&self) -> Decimal {
        self.factors.iter().map(|f| f.contribution).sum()
    }

    /// Factor by name
    pub fn factor(&self, name: &str) -> Option<&RiskFactor> {
        self.factors.iter().find(|f| f.name == name)
    }
}
