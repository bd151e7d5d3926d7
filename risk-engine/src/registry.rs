//! Company registry boundary

use crate::error::{Error, RegistryError};
use crate::types::{CompanyProfile, RegistryMatch};
use async_trait::async_trait;

/// Longest accepted company name, in characters
pub const MAX_NAME_LENGTH: usize = 200;

/// Company registry client
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Provider name, used as the rate-limit bucket and in provenance
    fn name(&self) -> &str;

    /// Fetch the profile for a registry number
    async fn fetch_profile(
        &self,
        registry_number: &str,
    ) -> std::result::Result<CompanyProfile, RegistryError>;

    /// Search companies by name
    async fn search(&self, name: &str) -> std::result::Result<Vec<RegistryMatch>, RegistryError>;
}

/// A parsed assessment query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanyQuery {
    /// Registry number, digits only
    RegistryNumber(String),
    /// Company name, trimmed
    Name(String),
}

impl CompanyQuery {
    /// Parse raw input.
    ///
    /// Input made of digits (spaces allowed) is a registry number and must
    /// have exactly `registry_number_len` digits. Anything else is a name of
    /// 1 to 200 characters.
    pub fn parse(raw: &str, registry_number_len: usize) -> crate::Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::Invalid("query is empty".to_string()));
        }

        if trimmed.chars().all(|c| c.is_ascii_digit() || c == ' ') {
            let digits: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
            if digits.len() != registry_number_len {
                return Err(Error::Invalid(format!(
                    "registry number must have {} digits, got {}",
                    registry_number_len,
                    digits.len()
                )));
            }
            return Ok(CompanyQuery::RegistryNumber(digits));
        }

        if trimmed.chars().count() > MAX_NAME_LENGTH {
            return Err(Error::Invalid(format!(
                "company name longer than {} characters",
                MAX_NAME_LENGTH
            )));
        }
        Ok(CompanyQuery::Name(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_numbers() {
        assert_eq!(
            CompanyQuery::parse(" 6875 0110 ", 8).unwrap(),
            CompanyQuery::RegistryNumber("68750110".to_string())
        );
        assert!(matches!(
            CompanyQuery::parse("1234567", 8),
            Err(Error::Invalid(_))
        ));
        assert!(CompanyQuery::parse("123456789", 8).is_err());
    }

    #[test]
    fn test_names() {
        assert_eq!(
            CompanyQuery::parse("  Test BV Donald ", 8).unwrap(),
            CompanyQuery::Name("Test BV Donald".to_string())
        );
        assert_eq!(
            CompanyQuery::parse("3M", 8).unwrap(),
            CompanyQuery::Name("3M".to_string())
        );
        assert!(CompanyQuery::parse("   ", 8).is_err());
        assert!(CompanyQuery::parse(&"x".repeat(201), 8).is_err());
    }
}
