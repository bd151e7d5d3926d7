//! Risk scoring engine
//!
//! A pure function of a company profile and a screening result. Every factor
//! is recorded with its weight, raw value and contribution, in a fixed order,
//! and the contributions always add up to the final score: when the raw sum
//! leaves [0, 100] a final `clamp_adjustment` factor carries the difference.

use crate::error::{Error, Result};
use crate::types::{CompanyProfile, RiskAssessment, RiskFactor, RiskLevel};
use chrono::{DateTime, Utc};
use compliance_service::ScreeningResult;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Factor names, in the order they appear in an assessment
pub mod factors {
    /// Sanctions hit with a top score at or above the strong-hit score
    pub const SANCTIONS_STRONG_HIT: &str = "sanctions_strong_hit";
    /// Sanctions hit below the strong-hit score
    pub const SANCTIONS_HIT: &str = "sanctions_hit";
    /// Sanctions status unknown
    pub const SANCTIONS_INDETERMINATE: &str = "sanctions_indeterminate";
    /// Company not active
    pub const INACTIVE_STATUS: &str = "inactive_status";
    /// Missing profile fields
    pub const INCOMPLETE_PROFILE: &str = "incomplete_profile";
    /// Difference between the raw sum and the clamped score
    pub const CLAMP_ADJUSTMENT: &str = "clamp_adjustment";
}

const MAX_SCORE: Decimal = dec!(100);

/// Factor weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Top match score from which a sanctions hit takes the fixed penalty
    pub strong_hit_score: Decimal,

    /// Fixed penalty for a strong sanctions hit
    pub strong_hit_penalty: Decimal,

    /// Points per unit of top match score for weaker sanctions hits
    pub scaled_hit_weight: Decimal,

    /// Penalty when the sanctions status could not be determined
    pub indeterminate_penalty: Decimal,

    /// Penalty for a company that is not active
    pub inactive_status_penalty: Decimal,

    /// Penalty per missing profile field
    pub incomplete_field_penalty: Decimal,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            strong_hit_score: dec!(0.95),
            strong_hit_penalty: dec!(70),
            scaled_hit_weight: dec!(60),
            indeterminate_penalty: dec!(25),
            inactive_status_penalty: dec!(30),
            incomplete_field_penalty: dec!(2.5),
        }
    }
}

impl ScoringWeights {
    /// Reject negative weights and a strong-hit score outside (0, 1]
    pub fn validate(&self) -> Result<()> {
        if self.strong_hit_score <= Decimal::ZERO || self.strong_hit_score > Decimal::ONE {
            return Err(Error::InvalidConfig(format!(
                "strong hit score must be in (0, 1], got {}",
                self.strong_hit_score
            )));
        }

        let weights = [
            ("strong_hit_penalty", self.strong_hit_penalty),
            ("scaled_hit_weight", self.scaled_hit_weight),
            ("indeterminate_penalty", self.indeterminate_penalty),
            ("inactive_status_penalty", self.inactive_status_penalty),
            ("incomplete_field_penalty", self.incomplete_field_penalty),
        ];
        for (name, weight) in weights {
            if weight.is_sign_negative() {
                return Err(Error::InvalidConfig(format!(
                    "{} must not be negative, got {}",
                    name, weight
                )));
            }
        }
        Ok(())
    }
}

/// Risk scorer
#[derive(Debug, Clone, Default)]
pub struct RiskScorer {
    weights: ScoringWeights,
}

impl RiskScorer {
    /// Create new risk scorer
    pub fn new(weights: ScoringWeights) -> Result<Self> {
        weights.validate()?;
        Ok(Self { weights })
    }

    /// Configured weights
    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score a profile against its screening, timestamped now
    pub fn score(&self, profile: &CompanyProfile, screening: &ScreeningResult) -> RiskAssessment {
        self.score_at(profile, screening, Utc::now())
    }

    /// Score a profile against its screening.
    ///
    /// `computed_at` is only recorded; it never enters the arithmetic.
    pub fn score_at(
        &self,
        profile: &CompanyProfile,
        screening: &ScreeningResult,
        computed_at: DateTime<Utc>,
    ) -> RiskAssessment {
        let w = &self.weights;
        let top = if screening.hit {
            screening
                .top_score()
                .and_then(Decimal::from_f64)
                .map(|s| s.round_dp(4))
                .unwrap_or(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };
        let strong = screening.hit && top >= w.strong_hit_score;
        let weak = screening.hit && !strong;

        let mut breakdown = vec![
            RiskFactor {
                name: factors::SANCTIONS_STRONG_HIT.to_string(),
                weight: w.strong_hit_penalty,
                raw_value: if strong { top } else { Decimal::ZERO },
                contribution: if strong {
                    w.strong_hit_penalty
                } else {
                    Decimal::ZERO
                },
            },
            RiskFactor {
                name: factors::SANCTIONS_HIT.to_string(),
                weight: w.scaled_hit_weight,
                raw_value: if weak { top } else { Decimal::ZERO },
                contribution: if weak {
                    (w.scaled_hit_weight * top).round_dp(2)
                } else {
                    Decimal::ZERO
                },
            },
            flag_factor(
                factors::SANCTIONS_INDETERMINATE,
                w.indeterminate_penalty,
                screening.is_indeterminate(),
            ),
            flag_factor(
                factors::INACTIVE_STATUS,
                w.inactive_status_penalty,
                !profile.status.is_active(),
            ),
        ];

        let missing = Decimal::from(profile.missing_fields().len());
        breakdown.push(RiskFactor {
            name: factors::INCOMPLETE_PROFILE.to_string(),
            weight: w.incomplete_field_penalty,
            raw_value: missing,
            contribution: (w.incomplete_field_penalty * missing).round_dp(2),
        });

        let raw_total: Decimal = breakdown.iter().map(|f| f.contribution).sum();
        let score = raw_total.clamp(Decimal::ZERO, MAX_SCORE);
        breakdown.push(RiskFactor {
            name: factors::CLAMP_ADJUSTMENT.to_string(),
            weight: Decimal::ONE,
            raw_value: raw_total,
            contribution: score - raw_total,
        });

        RiskAssessment {
            company_id: profile.registry_number.clone(),
            legal_name: profile.legal_name.clone(),
            score,
            risk_level: RiskLevel::from_score(score),
            factors: breakdown,
            screening: screening.clone(),
            // An unanswered screening is degraded just like a stale one
            stale: screening.is_stale() || screening.is_indeterminate(),
            indeterminate: screening.is_indeterminate(),
            provenance: Vec::new(),
            computed_at,
        }
    }
}

fn flag_factor(name: &str, weight: Decimal, present: bool) -> RiskFactor {
    let raw_value = if present { Decimal::ONE } else { Decimal::ZERO };
    RiskFactor {
        name: name.to_string(),
        weight,
        raw_value,
        contribution: weight * raw_value,
    }
}
