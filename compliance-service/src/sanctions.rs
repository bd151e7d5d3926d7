use crate::error::{ComplianceError, Result};
use crate::types::{EntityType, SanctionsEntry};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Separator for multi-valued CSV columns
const MULTI_VALUE_SEPARATOR: char = ';';

/// A source of sanctions-list candidates
#[async_trait]
pub trait SanctionsSource: Send + Sync {
    /// Provider name, used as the rate-limit bucket and in provenance
    fn name(&self) -> &str;

    /// Fetch the full or name-filtered candidate set
    async fn fetch_candidates(&self, name_hint: Option<&str>) -> Result<Vec<SanctionsEntry>>;
}

/// In-memory sanctions lists, keyed by list name then entry id
pub struct SanctionsListStore {
    name: String,
    lists: Arc<DashMap<String, DashMap<String, SanctionsEntry>>>,
}

#[derive(Debug, Deserialize)]
struct CsvRecord {
    id: String,
    name: String,
    #[serde(default)]
    aliases: String,
    entity_type: String,
    #[serde(default)]
    countries: String,
    #[serde(default)]
    programs: String,
    last_updated: String,
}

impl SanctionsListStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lists: Arc::new(DashMap::new()),
        }
    }

    /// Load (or replace) a sanctions list. Returns the number of entries kept.
    pub fn load_list(&self, list: &str, entries: Vec<SanctionsEntry>) -> usize {
        let map = DashMap::new();

        for mut entry in entries {
            entry.source_list = list.to_string();
            map.insert(entry.id.clone(), entry);
        }

        let count = map.len();
        self.lists.insert(list.to_string(), map);
        info!("Loaded {} sanctions list with {} entries", list, count);

        count
    }

    /// Load a list from CSV with columns
    /// `id,name,aliases,entity_type,countries,programs,last_updated`.
    ///
    /// Multi-valued columns are `;`-separated. `last_updated` is RFC 3339 or
    /// a plain `YYYY-MM-DD` date.
    pub fn load_csv<R: Read>(&self, list: &str, reader: R) -> Result<usize> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let mut entries = Vec::new();
        for (line, record) in csv_reader.deserialize::<CsvRecord>().enumerate() {
            let record = record.map_err(|e| {
                ComplianceError::InvalidPayload(format!("{} row {}: {}", list, line + 1, e))
            })?;
            entries.push(record_to_entry(list, record)?);
        }

        Ok(self.load_list(list, entries))
    }

    pub fn remove_list(&self, list: &str) -> bool {
        self.lists.remove(list).is_some()
    }

    /// Get total number of entries across all lists
    pub fn total_entries(&self) -> usize {
        self.lists.iter().map(|l| l.value().len()).sum()
    }

    /// Names of the loaded lists, sorted
    pub fn loaded_lists(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lists.iter().map(|l| l.key().clone()).collect();
        names.sort();
        names
    }

    /// All entries, ordered by list then id
    pub fn entries(&self) -> Vec<SanctionsEntry> {
        let mut entries: Vec<SanctionsEntry> = self
            .lists
            .iter()
            .flat_map(|list| {
                list.value()
                    .iter()
                    .map(|e| e.value().clone())
                    .collect::<Vec<_>>()
            })
            .collect();
        entries.sort_by(|a, b| (&a.source_list, &a.id).cmp(&(&b.source_list, &b.id)));
        entries
    }
}

#[async_trait]
impl SanctionsSource for SanctionsListStore {
    fn name(&self) -> &str {
        &self.name
    }

    /// Local lists are small enough to hand back whole; the screener ranks them.
    async fn fetch_candidates(&self, name_hint: Option<&str>) -> Result<Vec<SanctionsEntry>> {
        if self.lists.is_empty() {
            return Err(ComplianceError::ListNotLoaded(self.name.clone()));
        }

        let entries = self.entries();
        debug!(
            "Serving {} local sanctions entries (hint present: {})",
            entries.len(),
            name_hint.is_some()
        );
        Ok(entries)
    }
}

fn record_to_entry(list: &str, record: CsvRecord) -> Result<SanctionsEntry> {
    if record.id.is_empty() || record.name.is_empty() {
        return Err(ComplianceError::InvalidPayload(format!(
            "{}: entry without id or name",
            list
        )));
    }

    let entity_type = record.entity_type.parse::<EntityType>().map_err(|e| {
        ComplianceError::InvalidPayload(format!("{} entry {}: {}", list, record.id, e))
    })?;

    let last_updated = parse_timestamp(&record.last_updated).ok_or_else(|| {
        ComplianceError::InvalidPayload(format!(
            "{} entry {}: bad last_updated '{}'",
            list, record.id, record.last_updated
        ))
    })?;

    let aliases: BTreeSet<String> = split_multi(&record.aliases)
        .filter(|alias| *alias != record.name)
        .collect();

    Ok(SanctionsEntry {
        id: record.id,
        source_list: list.to_string(),
        canonical_name: record.name,
        aliases,
        entity_type,
        countries: split_multi(&record.countries)
            .map(|c| c.to_ascii_uppercase())
            .collect(),
        programs: split_multi(&record.programs).collect(),
        last_updated,
    })
}

fn split_multi(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(MULTI_VALUE_SEPARATOR)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// RFC 3339 timestamp or plain date (midnight UTC)
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(ts.and_utc());
    }
    match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(date) => date.and_hms_opt(0, 0, 0).map(|ts| ts.and_utc()),
        Err(_) => {
            warn!("Unparseable sanctions timestamp: {}", value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
id,name,aliases,entity_type,countries,programs,last_updated
os-1,Gazprom Neft PJSC,Gazpromneft;Sibneft,organization,ru,RUSSIA-EO14024,2024-03-01
os-2,Ivan Petrov,,person,RU;by,,2024-02-10T08:30:00Z
";

    #[test]
    fn test_load_csv() {
        let store = SanctionsListStore::new("local");
        let loaded = store.load_csv("eu_fsf", SAMPLE.as_bytes()).unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(store.total_entries(), 2);

        let entries = store.entries();
        assert_eq!(entries[0].id, "os-1");
        assert_eq!(entries[0].aliases.len(), 2);
        assert!(entries[0].countries.contains("RU"));
        assert_eq!(entries[1].entity_type, EntityType::Person);
        assert_eq!(entries[1].countries.len(), 2);
        assert!(entries[1].programs.is_empty());
    }

    #[test]
    fn test_bad_rows_are_rejected() {
        let store = SanctionsListStore::new("local");
        let bad_type = "id,name,aliases,entity_type,countries,programs,last_updated\n\
                        x-1,Some Vessel,,vessel,,,2024-01-01\n";
        assert!(matches!(
            store.load_csv("un_sc_sanctions", bad_type.as_bytes()),
            Err(ComplianceError::InvalidPayload(_))
        ));

        let bad_date = "id,name,aliases,entity_type,countries,programs,last_updated\n\
                        x-1,Acme,,organization,,,yesterday\n";
        assert!(store.load_csv("un_sc_sanctions", bad_date.as_bytes()).is_err());
        assert!(store.loaded_lists().is_empty());
    }

    #[test]
    fn test_reload_replaces_list() {
        let store = SanctionsListStore::new("local");
        store.load_csv("eu_fsf", SAMPLE.as_bytes()).unwrap();
        store.load_list("us_ofac_sdn", Vec::new());
        assert_eq!(store.loaded_lists(), vec!["eu_fsf", "us_ofac_sdn"]);

        store.load_list("eu_fsf", Vec::new());
        assert_eq!(store.total_entries(), 0);
        assert!(store.remove_list("eu_fsf"));
        assert!(!store.remove_list("eu_fsf"));
    }

    #[tokio::test]
    async fn test_empty_store_is_not_loaded() {
        let store = SanctionsListStore::new("local");
        let err = store.fetch_candidates(None).await.unwrap_err();
        assert!(matches!(err, ComplianceError::ListNotLoaded(_)));
    }
}
