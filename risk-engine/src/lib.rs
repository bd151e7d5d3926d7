//! Risk Engine for compliance screening
//!
//! Combines company-registry profiles with sanctions screening into an
//! explainable 0-100 risk score.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod kvk;
pub mod orchestrator;
pub mod registry;
pub mod scoring;
pub mod types;

pub use config::{CacheTtlConfig, EngineConfig, RegistryConfig};
pub use error::{Error, RegistryError, Result};
pub use kvk::{KvkClient, KvkConfig};
pub use orchestrator::RiskAggregator;
pub use registry::{CompanyQuery, RegistryClient};
pub use scoring::{RiskScorer, ScoringWeights};
pub use types::*;
