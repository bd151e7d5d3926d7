//! KVK (Dutch Chamber of Commerce) registry client
//!
//! Maps `basisprofiel` and `zoeken` payloads to [`CompanyProfile`] and
//! [`RegistryMatch`]. Payloads missing `kvkNummer` or `naam` are rejected.

use crate::error::RegistryError;
use crate::registry::RegistryClient;
use crate::types::{Address, CompanyProfile, CompanyStatus, IndustryCode, Officer, RegistryMatch};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// Provider name
pub const PROVIDER_NAME: &str = "kvk";

type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// KVK API configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KvkConfig {
    /// API base URL
    pub base_url: String,
    /// API key, sent in the `apikey` header
    pub api_key: Option<String>,
    /// Request timeout
    pub timeout_seconds: u64,
    /// Search results per page
    pub max_results: u32,
}

impl Default for KvkConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.kvk.nl/test/api".to_string(),
            api_key: None,
            timeout_seconds: 30,
            max_results: 10,
        }
    }
}

/// `basisprofiel` payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Basisprofiel {
    /// Registry number
    pub kvk_nummer: Option<String>,
    /// Registered name
    pub naam: Option<String>,
    /// Legal form
    pub rechtsvorm: Option<String>,
    /// Registration status, when the registry reports one
    pub status: Option<String>,
    /// Start date, `YYYYMMDD` or `YYYY-MM-DD`
    pub datum_aanvang: Option<String>,
    /// Deregistration date
    pub datum_uitschrijving: Option<String>,
    /// Registration period
    pub materiele_registratie: Option<MaterieleRegistratie>,
    /// Trade names
    #[serde(default)]
    pub handelsnamen: Vec<Handelsnaam>,
    /// Business activities
    #[serde(default)]
    pub sbi_activiteiten: Vec<SbiActiviteit>,
    /// Officers
    #[serde(default)]
    pub functionarissen: Vec<Functionaris>,
    /// Embedded resources
    #[serde(default, rename = "_embedded")]
    pub embedded: Option<Embedded>,
}

/// Registration period
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterieleRegistratie {
    /// Start date
    pub datum_aanvang: Option<String>,
    /// End date
    pub datum_einde: Option<String>,
}

/// Trade name
#[derive(Debug, Clone, Deserialize)]
pub struct Handelsnaam {
    /// Name
    pub naam: String,
}

/// SBI activity
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SbiActiviteit {
    /// SBI code
    pub sbi_code: String,
    /// Description
    pub sbi_omschrijving: Option<String>,
    /// Main activity marker, `"Ja"`/`"Nee"` or a boolean
    #[serde(default)]
    pub ind_hoofdactiviteit: Option<serde_json::Value>,
}

/// Officer
#[derive(Debug, Clone, Deserialize)]
pub struct Functionaris {
    /// Name
    pub naam: String,
    /// Role
    #[serde(default)]
    pub functie: Option<String>,
}

/// Embedded resources of a `basisprofiel`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Embedded {
    /// Main establishment
    pub hoofdvestiging: Option<Vestiging>,
}

/// Establishment
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Vestiging {
    /// Addresses
    #[serde(default)]
    pub adressen: Vec<Adres>,
}

/// Address
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Adres {
    /// `bezoekadres` or `postadres`
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Street
    pub straatnaam: Option<String>,
    /// House number
    pub huisnummer: Option<u32>,
    /// House number suffix
    pub huisnummer_toevoeging: Option<String>,
    /// Postal code
    pub postcode: Option<String>,
    /// City
    pub plaats: Option<String>,
    /// Country
    pub land: Option<String>,
}

/// `zoeken` payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    /// Results
    #[serde(default)]
    pub resultaten: Vec<SearchResult>,
}

/// Search result
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Registry number
    pub kvk_nummer: Option<String>,
    /// Name
    pub naam: Option<String>,
    /// Older API versions call it `handelsnaam`
    pub handelsnaam: Option<String>,
}

/// Map a `basisprofiel` payload to a [`CompanyProfile`]
pub fn profile_from_basisprofiel(payload: Basisprofiel) -> RegistryResult<CompanyProfile> {
    let registry_number = payload
        .kvk_nummer
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| RegistryError::InvalidPayload("basisprofiel without kvkNummer".to_string()))?;
    let legal_name = payload
        .naam
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| {
            RegistryError::InvalidPayload(format!("basisprofiel {} without naam", registry_number))
        })?;

    let registration = payload.materiele_registratie.unwrap_or_default();
    let end_date = payload
        .datum_uitschrijving
        .or(registration.datum_einde)
        .filter(|d| !d.trim().is_empty());
    let status = match payload.status.as_deref() {
        Some(status) => map_status(status),
        None if end_date.is_some() => CompanyStatus::Dissolved,
        None => CompanyStatus::Active,
    };
    let registration_date = payload
        .datum_aanvang
        .or(registration.datum_aanvang)
        .as_deref()
        .and_then(parse_date);

    let mut industry_codes: Vec<IndustryCode> = payload
        .sbi_activiteiten
        .into_iter()
        .map(|sbi| IndustryCode {
            primary: is_main_activity(sbi.ind_hoofdactiviteit.as_ref()),
            code: sbi.sbi_code,
            description: sbi.sbi_omschrijving,
        })
        .collect();
    // Main activity first, otherwise registry order
    industry_codes.sort_by_key(|code| !code.primary);

    let address = payload
        .embedded
        .and_then(|e| e.hoofdvestiging)
        .and_then(|v| main_address(v.adressen));

    let officers = payload
        .functionarissen
        .into_iter()
        .filter(|f| !f.naam.trim().is_empty())
        .map(|f| Officer {
            name: f.naam,
            role: f.functie.unwrap_or_else(|| "unknown".to_string()),
        })
        .collect();

    Ok(CompanyProfile {
        registry_number,
        legal_name,
        legal_form: payload.rechtsvorm,
        trade_names: payload.handelsnamen.into_iter().map(|h| h.naam).collect(),
        status,
        registration_date,
        address,
        industry_codes,
        officers,
    })
}

/// Map a `zoeken` payload to search hits, skipping results without a number or name
pub fn matches_from_search(payload: SearchResponse) -> Vec<RegistryMatch> {
    payload
        .resultaten
        .into_iter()
        .filter_map(|r| {
            let name = r.naam.or(r.handelsnaam)?;
            Some(RegistryMatch {
                registry_number: r.kvk_nummer?,
                name,
            })
        })
        .collect()
}

fn map_status(status: &str) -> CompanyStatus {
    match status.trim().to_lowercase().as_str() {
        "actief" | "active" | "ingeschreven" => CompanyStatus::Active,
        "opgeheven" | "ontbonden" | "uitgeschreven" | "dissolved" => CompanyStatus::Dissolved,
        "surseance" | "faillissement" | "suspended" => CompanyStatus::Suspended,
        _ => CompanyStatus::Unknown,
    }
}

fn is_main_activity(value: Option<&serde_json::Value>) -> bool {
    match value {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("ja"),
        _ => false,
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .ok()
}

fn main_address(addresses: Vec<Adres>) -> Option<Address> {
    let visiting = addresses
        .iter()
        .position(|a| a.kind.as_deref() == Some("bezoekadres"))
        .unwrap_or(0);
    let adres = addresses.into_iter().nth(visiting)?;

    let house_number = adres.huisnummer.map(|n| match &adres.huisnummer_toevoeging {
        Some(suffix) if !suffix.is_empty() => format!("{}{}", n, suffix),
        _ => n.to_string(),
    });

    Some(Address {
        street: adres.straatnaam,
        house_number,
        postal_code: adres.postcode,
        city: adres.plaats,
        country: adres.land.or_else(|| Some("Nederland".to_string())),
    })
}

/// KVK API client
pub struct KvkClient {
    base_url: String,
    api_key: String,
    max_results: u32,
    client: Client,
}

impl KvkClient {
    /// Create new client
    pub fn new(config: KvkConfig) -> crate::Result<Self> {
        let api_key = config
            .api_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| crate::Error::InvalidConfig("KVK API key not set".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| crate::Error::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_results: config.max_results,
            client,
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        subject: &str,
    ) -> RegistryResult<T> {
        let response = self
            .client
            .get(url)
            .header("apikey", &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query)
            .send()
            .await
            .map_err(|e| {
                error!("KVK request failed: {}", e);
                RegistryError::Unavailable(format!("KVK request failed: {}", e))
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(subject.to_string()));
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(RegistryError::Unavailable(format!("KVK returned {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Unavailable(format!(
                "KVK returned {}: {}",
                status, body
            )));
        }

        response.json::<T>().await.map_err(|e| {
            RegistryError::InvalidPayload(format!("Failed to parse KVK response: {}", e))
        })
    }
}

#[async_trait]
impl RegistryClient for KvkClient {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn fetch_profile(&self, registry_number: &str) -> RegistryResult<CompanyProfile> {
        let url = format!("{}/v1/basisprofielen/{}", self.base_url, registry_number);
        let payload: Basisprofiel = self.get(&url, &[], registry_number).await?;
        let profile = profile_from_basisprofiel(payload)?;

        info!("Retrieved basisprofiel for KVK: {}", registry_number);
        Ok(profile)
    }

    async fn search(&self, name: &str) -> RegistryResult<Vec<RegistryMatch>> {
        let url = format!("{}/v2/zoeken", self.base_url);
        let query = [
            ("naam", name.to_string()),
            ("resultatenPerPagina", self.max_results.to_string()),
        ];

        // The search endpoint answers 404 for "no results"
        let payload: SearchResponse = match self.get(&url, &query, name).await {
            Ok(payload) => payload,
            Err(RegistryError::NotFound(_)) => SearchResponse::default(),
            Err(e) => return Err(e),
        };

        let matches = matches_from_search(payload);
        info!("Found {} KVK results", matches.len());
        Ok(matches)
    }
}
