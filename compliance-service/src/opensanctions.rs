//! OpenSanctions search API client
//!
//! Entities come back as loosely typed property bags. They are mapped to
//! [`SanctionsEntry`] here, at the boundary; anything that does not fit the
//! internal schema is rejected as [`ComplianceError::InvalidPayload`].

use crate::error::{ComplianceError, Result};
use crate::sanctions::{parse_timestamp, SanctionsSource};
use crate::types::{EntityType, SanctionsEntry};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, error, warn};

pub const PROVIDER_NAME: &str = "opensanctions";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenSanctionsConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Dataset (collection) to search
    pub dataset: String,
    /// Entity schema filter sent with every search. Entity type hints are
    /// applied by the screener after the fetch.
    pub schema: String,
    pub limit: u32,
    pub timeout_seconds: u64,
}

impl Default for OpenSanctionsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.opensanctions.org".to_string(),
            api_key: None,
            dataset: "default".to_string(),
            schema: "LegalEntity".to_string(),
            limit: 10,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<OsEntity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsEntity {
    pub id: String,
    pub schema: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub properties: OsProperties,
    #[serde(default)]
    pub datasets: Vec<String>,
    #[serde(default)]
    pub last_change: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsProperties {
    #[serde(default)]
    pub name: Vec<String>,
    #[serde(default)]
    pub alias: Vec<String>,
    #[serde(default)]
    pub country: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub modified_at: Vec<String>,
}

fn schema_entity_type(schema: &str) -> Option<EntityType> {
    match schema {
        "Person" => Some(EntityType::Person),
        "Company" | "Organization" | "LegalEntity" | "PublicBody" => Some(EntityType::Organization),
        _ => None,
    }
}

/// Map an OpenSanctions entity to a [`SanctionsEntry`].
///
/// The source list is the entity's dataset ranked highest in
/// `source_priority`; unknown datasets fall back to the first one listed.
pub fn entity_to_entry(entity: &OsEntity, source_priority: &[String]) -> Result<SanctionsEntry> {
    let entity_type = schema_entity_type(&entity.schema).ok_or_else(|| {
        ComplianceError::InvalidPayload(format!(
            "entity {} has unsupported schema {}",
            entity.id, entity.schema
        ))
    })?;

    let canonical_name = entity
        .properties
        .name
        .iter()
        .find(|n| !n.trim().is_empty())
        .or_else(|| entity.caption.as_ref().filter(|c| !c.trim().is_empty()))
        .cloned()
        .ok_or_else(|| {
            ComplianceError::InvalidPayload(format!("entity {} has no name", entity.id))
        })?;

    let source_list = source_priority
        .iter()
        .find(|list| entity.datasets.contains(list))
        .or_else(|| entity.datasets.first())
        .cloned()
        .ok_or_else(|| {
            ComplianceError::InvalidPayload(format!("entity {} has no dataset", entity.id))
        })?;

    let timestamp = entity
        .last_change
        .as_deref()
        .or_else(|| entity.properties.modified_at.first().map(String::as_str))
        .ok_or_else(|| {
            ComplianceError::InvalidPayload(format!("entity {} has no timestamp", entity.id))
        })?;
    let last_updated = parse_timestamp(timestamp).ok_or_else(|| {
        ComplianceError::InvalidPayload(format!(
            "entity {} has invalid timestamp {}",
            entity.id, timestamp
        ))
    })?;

    let aliases: BTreeSet<String> = entity
        .properties
        .name
        .iter()
        .chain(entity.properties.alias.iter())
        .filter(|n| **n != canonical_name && !n.trim().is_empty())
        .cloned()
        .collect();

    Ok(SanctionsEntry {
        id: entity.id.clone(),
        source_list,
        canonical_name,
        aliases,
        entity_type,
        countries: entity
            .properties
            .country
            .iter()
            .map(|c| c.to_ascii_uppercase())
            .collect(),
        programs: entity.properties.topics.iter().cloned().collect(),
        last_updated,
    })
}

pub struct OpenSanctionsClient {
    config: OpenSanctionsConfig,
    api_key: String,
    source_priority: Vec<String>,
    client: Client,
}

impl OpenSanctionsClient {
    pub fn new(config: OpenSanctionsConfig, source_priority: Vec<String>) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                ComplianceError::ConfigError("OpenSanctions API key not set".to_string())
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ComplianceError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            config,
            api_key,
            source_priority,
            client,
        })
    }

    fn search_params(&self, query: &str) -> [(&'static str, String); 3] {
        [
            ("q", query.to_string()),
            ("schema", self.config.schema.clone()),
            ("limit", self.config.limit.to_string()),
        ]
    }

    async fn search(&self, query: &str) -> Result<Vec<OsEntity>> {
        let url = format!(
            "{}/search/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.dataset
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&self.search_params(query))
            .send()
            .await
            .map_err(|e| {
                error!("OpenSanctions request failed: {}", e);
                ComplianceError::SourceUnavailable(format!("OpenSanctions request failed: {}", e))
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(ComplianceError::SourceUnavailable(format!(
                "OpenSanctions returned {}",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ComplianceError::SourceUnavailable(format!(
                "OpenSanctions returned {}: {}",
                status, body
            )));
        }

        let body = response.json::<SearchResponse>().await.map_err(|e| {
            ComplianceError::InvalidPayload(format!("Failed to parse OpenSanctions response: {}", e))
        })?;

        Ok(body.results)
    }
}

#[async_trait]
impl SanctionsSource for OpenSanctionsClient {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn fetch_candidates(&self, name_hint: Option<&str>) -> Result<Vec<SanctionsEntry>> {
        // The hosted API has no bulk export on this endpoint
        let query = name_hint.filter(|q| !q.trim().is_empty()).ok_or_else(|| {
            ComplianceError::InvalidInput("OpenSanctions search needs a name".to_string())
        })?;

        let entities = self.search(query).await?;
        debug!("OpenSanctions returned {} entities", entities.len());

        let entries = entities
            .iter()
            .filter_map(|entity| match entity_to_entry(entity, &self.source_priority) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping OpenSanctions entity: {}", e);
                    None
                }
            })
            .collect();

        Ok(entries)
    }
}
