use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Organization => "organization",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "person" | "individual" => Ok(EntityType::Person),
            "organization" | "organisation" | "company" | "legalentity" => {
                Ok(EntityType::Organization)
            }
            other => Err(format!("unknown entity type '{}'", other)),
        }
    }
}

/// Read-only copy of an entry owned by a sanctions source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SanctionsEntry {
    pub id: String,
    /// Source list identifier, e.g. a dataset name
    pub source_list: String,
    pub canonical_name: String,
    pub aliases: BTreeSet<String>,
    pub entity_type: EntityType,
    pub countries: BTreeSet<String>,
    pub programs: BTreeSet<String>,
    pub last_updated: DateTime<Utc>,
}

impl SanctionsEntry {
    /// Canonical name first, then aliases in sorted order
    pub fn names(&self) -> impl Iterator<Item = (MatchedField, &str)> + '_ {
        std::iter::once((MatchedField::CanonicalName, self.canonical_name.as_str())).chain(
            self.aliases
                .iter()
                .map(|alias| (MatchedField::Alias(alias.clone()), alias.as_str())),
        )
    }
}

/// Which name of an entry produced a match
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum MatchedField {
    CanonicalName,
    Alias(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Both names normalize to the same token set
    ExactTokenSet,
    Fuzzy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchCandidate {
    pub entry: SanctionsEntry,
    pub score: f64, // 0.0-1.0
    pub matched_field: MatchedField,
    pub matched_name: String,
    pub kind: MatchKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScreeningStatus {
    /// Fresh answer from the sanctions source
    Complete,
    /// Source unavailable; last known result served instead
    Stale,
    /// Source unavailable and nothing cached: sanctions status unknown
    Indeterminate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreeningResult {
    pub query: String,
    pub normalized_query: String,
    pub entity_type: Option<EntityType>,
    /// Descending by score
    pub candidates: Vec<MatchCandidate>,
    pub hit: bool,
    pub status: ScreeningStatus,
    /// Served from the screening cache rather than the source
    #[serde(default)]
    pub cached: bool,
    pub screened_at: DateTime<Utc>,
}

impl ScreeningResult {
    pub fn indeterminate(
        query: &str,
        normalized_query: &str,
        entity_type: Option<EntityType>,
    ) -> Self {
        Self {
            query: query.to_string(),
            normalized_query: normalized_query.to_string(),
            entity_type,
            candidates: Vec::new(),
            hit: false,
            status: ScreeningStatus::Indeterminate,
            cached: false,
            screened_at: Utc::now(),
        }
    }

    pub fn top_score(&self) -> Option<f64> {
        self.candidates.first().map(|c| c.score)
    }

    pub fn is_indeterminate(&self) -> bool {
        self.status == ScreeningStatus::Indeterminate
    }

    pub fn is_stale(&self) -> bool {
        self.status == ScreeningStatus::Stale
    }
}
