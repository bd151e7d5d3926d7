pub mod error;
pub mod matcher;
pub mod opensanctions;
pub mod sanctions;
pub mod screening;
pub mod types;

pub use error::ComplianceError;
pub use matcher::{MatcherConfig, NameMatcher, NormalizedName};
pub use opensanctions::{OpenSanctionsClient, OpenSanctionsConfig};
pub use sanctions::{SanctionsListStore, SanctionsSource};
pub use screening::{SanctionsScreener, ScreenerConfig};
pub use types::{
    EntityType, MatchCandidate, MatchKind, MatchedField, SanctionsEntry, ScreeningResult,
    ScreeningStatus,
};
