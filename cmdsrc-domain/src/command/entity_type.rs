use crate::error::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 聚合种类（统一大写，如 `LOANCHARGE`）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityType(String);

impl EntityType {
    pub fn new(value: impl AsRef<str>) -> DomainResult<Self> {
        let value = value.as_ref().trim();
        if value.is_empty() {
            return Err(DomainError::malformed("entity type must not be blank"));
        }
        if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(DomainError::malformed(format!(
                "entity type '{value}' must be alphanumeric"
            )));
        }
        Ok(Self(value.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EntityType {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntityType> for String {
    fn from(value: EntityType) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_to_upper_case() {
        assert_eq!(EntityType::new(" loanCharge ").unwrap().as_str(), "LOANCHARGE");
    }

    #[test]
    fn rejects_blank_and_punctuation() {
        assert!(EntityType::new("  ").is_err());
        assert!(EntityType::new("loan-charge").is_err());
    }
}
