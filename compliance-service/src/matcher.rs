//! Fuzzy name matching for sanctions screening
//!
//! Both names are normalized (lowercase, diacritics stripped, punctuation
//! folded, legal-entity suffixes removed) and then compared with a fixed
//! blend of two symmetric measures:
//!
//! * a token-set overlap score, where tokens match exactly or, above a
//!   configured floor, by Jaro-Winkler similarity;
//! * a normalized Levenshtein similarity over the sorted token sequences, so
//!   reordered names ("Neft Gazprom") are not penalized for their order.
//!
//! The blend weights, the token floor and the decision threshold all come
//! from [`MatcherConfig`].

use crate::error::{ComplianceError, Result};
use crate::types::{MatchCandidate, MatchKind, MatchedField, SanctionsEntry};
use serde::{Deserialize, Serialize};
use strsim::{jaro_winkler, normalized_levenshtein};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Name matcher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Minimum similarity for a name match to count as a hit
    pub decision_threshold: f64,

    /// Weight of the token-set overlap score
    pub token_weight: f64,

    /// Weight of the character edit-distance score
    pub edit_weight: f64,

    /// Jaro-Winkler similarity from which two different tokens count as overlapping
    pub token_similarity_floor: f64,

    /// Legal-entity designators stripped from either end of a name
    pub legal_suffixes: Vec<String>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            decision_threshold: 0.85,
            token_weight: 0.6,
            edit_weight: 0.4,
            token_similarity_floor: 0.88,
            legal_suffixes: [
                "ltd", "limited", "llc", "llp", "inc", "incorporated", "corp", "corporation",
                "co", "company", "plc", "gmbh", "ag", "kg", "sa", "sarl", "srl", "spa", "b.v.",
                "n.v.", "v.o.f.", "c.v.", "oy", "ab", "pjsc", "ojsc", "jsc", "oao", "ooo", "zao",
                "pao",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl MatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.decision_threshold > 0.0 && self.decision_threshold <= 1.0) {
            return Err(ComplianceError::ConfigError(format!(
                "decision threshold must be in (0, 1], got {}",
                self.decision_threshold
            )));
        }
        if self.token_weight < 0.0 || self.edit_weight < 0.0 {
            return Err(ComplianceError::ConfigError(
                "matcher weights must not be negative".to_string(),
            ));
        }
        if ((self.token_weight + self.edit_weight) - 1.0).abs() > 1e-9 {
            return Err(ComplianceError::ConfigError(format!(
                "matcher weights must sum to 1.0, got {} + {}",
                self.token_weight, self.edit_weight
            )));
        }
        if !(0.0..=1.0).contains(&self.token_similarity_floor) {
            return Err(ComplianceError::ConfigError(format!(
                "token similarity floor must be in [0, 1], got {}",
                self.token_similarity_floor
            )));
        }
        Ok(())
    }
}

/// A name after normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedName {
    /// Normalized tokens joined by single spaces, in original order
    pub text: String,
    /// Tokens sorted, duplicates kept
    sorted: Vec<String>,
    /// Tokens sorted and deduplicated
    set: Vec<String>,
}

impl NormalizedName {
    fn from_tokens(tokens: Vec<String>) -> Self {
        let text = tokens.join(" ");
        let mut sorted = tokens;
        sorted.sort();
        let mut set = sorted.clone();
        set.dedup();
        Self { text, sorted, set }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn tokens(&self) -> &[String] {
        &self.set
    }
}

pub struct NameMatcher {
    config: MatcherConfig,
    /// Folded suffixes as token sequences, longest first
    suffixes: Vec<Vec<String>>,
}

impl NameMatcher {
    pub fn new(config: MatcherConfig) -> Result<Self> {
        config.validate()?;

        let mut suffixes: Vec<Vec<String>> = config
            .legal_suffixes
            .iter()
            .map(|s| fold(s))
            .filter(|tokens| !tokens.is_empty())
            .collect();
        suffixes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        suffixes.dedup();

        Ok(Self { config, suffixes })
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn threshold(&self) -> f64 {
        self.config.decision_threshold
    }

    pub fn is_match(&self, score: f64) -> bool {
        score >= self.config.decision_threshold
    }

    /// Normalize a name for comparison and cache keys
    pub fn normalize(&self, name: &str) -> NormalizedName {
        let mut tokens = fold(name);

        // Strip designators from the end, then the front, never down to nothing
        while let Some(suffix) = self
            .suffixes
            .iter()
            .find(|s| tokens.len() > s.len() && tokens.ends_with(s))
        {
            tokens.truncate(tokens.len() - suffix.len());
        }
        while let Some(prefix) = self
            .suffixes
            .iter()
            .find(|s| tokens.len() > s.len() && tokens.starts_with(s))
        {
            tokens.drain(..prefix.len());
        }

        NormalizedName::from_tokens(tokens)
    }

    /// Similarity of two raw names in [0.0, 1.0]
    pub fn score(&self, query_name: &str, candidate_name: &str) -> f64 {
        let query = self.normalize(query_name);
        let candidate = self.normalize(candidate_name);
        self.score_normalized(&query, &candidate).0
    }

    /// Similarity and match kind of two normalized names
    pub fn score_normalized(&self, a: &NormalizedName, b: &NormalizedName) -> (f64, MatchKind) {
        // Same tokens in any order
        if a.sorted == b.sorted {
            return (1.0, MatchKind::ExactTokenSet);
        }
        if a.is_empty() || b.is_empty() {
            return (0.0, MatchKind::Fuzzy);
        }

        let kind = if a.set == b.set {
            MatchKind::ExactTokenSet
        } else {
            MatchKind::Fuzzy
        };

        let token = self.token_overlap(&a.set, &b.set);
        let edit = normalized_levenshtein(&a.sorted.join(" "), &b.sorted.join(" "));
        let blended = self.config.token_weight * token + self.config.edit_weight * edit;

        (blended.clamp(0.0, 1.0), kind)
    }

    /// Best-scoring name of `entry` against `query`, threshold not applied.
    ///
    /// On equal scores an exact token-set match beats an edit-distance-only
    /// one; after that the canonical name wins over aliases.
    pub fn best_match(&self, query: &NormalizedName, entry: &SanctionsEntry) -> MatchCandidate {
        let mut best: Option<(f64, MatchKind, MatchedField, &str)> = None;

        for (field, name) in entry.names() {
            let (score, kind) = self.score_normalized(query, &self.normalize(name));
            let better = match &best {
                None => true,
                Some((best_score, best_kind, _, _)) => {
                    score > *best_score
                        || (score == *best_score
                            && kind == MatchKind::ExactTokenSet
                            && *best_kind == MatchKind::Fuzzy)
                }
            };
            if better {
                best = Some((score, kind, field, name));
            }
        }

        // names() always yields the canonical name
        let (score, kind, matched_field, matched_name) =
            best.unwrap_or((0.0, MatchKind::Fuzzy, MatchedField::CanonicalName, ""));

        MatchCandidate {
            entry: entry.clone(),
            score,
            matched_field,
            matched_name: matched_name.to_string(),
            kind,
        }
    }

    /// Symmetric soft overlap of two token sets
    fn token_overlap(&self, a: &[String], b: &[String]) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let forward: f64 = a.iter().map(|t| self.best_token_similarity(t, b)).sum();
        let backward: f64 = b.iter().map(|t| self.best_token_similarity(t, a)).sum();
        (forward + backward) / (a.len() + b.len()) as f64
    }

    fn best_token_similarity(&self, token: &str, others: &[String]) -> f64 {
        others
            .iter()
            .map(|other| {
                if other == token {
                    1.0
                } else {
                    let similarity = jaro_winkler(token, other);
                    if similarity >= self.config.token_similarity_floor {
                        similarity
                    } else {
                        0.0
                    }
                }
            })
            .fold(0.0, f64::max)
    }
}

/// Lowercase, strip diacritics, drop dots and apostrophes, split on anything
/// that is not alphanumeric.
fn fold(name: &str) -> Vec<String> {
    let cleaned: String = name
        .to_lowercase()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| !matches!(c, '.' | '\'' | '\u{2019}' | '`'))
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    cleaned.split_whitespace().map(str::to_string).collect()
}
