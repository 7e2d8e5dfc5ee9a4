//! Ingestion runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into
//! [`IngestService`](crate::IngestService) behind an `Arc`. The core never reads process-wide
//! environment variables while a message is being ingested; callers that want environment
//! overrides apply them explicitly with [`IngestConfig::apply_env_overrides`].

use crate::constants::{
    ENV_CONCEPT_NAME_CODING_SYSTEM, ENV_DRUG_CODING_SYSTEM, ENV_PROPOSED_CONCEPT_IDENTIFIER,
    LOCAL_CONCEPT_NAME_CODING_SYSTEM, LOCAL_DRUG_CODING_SYSTEM, PROPOSED_CONCEPT_IDENTIFIER,
};
use crate::error::{IngestError, IngestResult};
use serde::{Deserialize, Serialize};

/// Ingestion configuration resolved at startup.
///
/// Only coding conventions are configurable. The accepted message type is fixed at `ORU^R01`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    proposed_concept_identifier: String,
    drug_coding_system: String,
    concept_name_coding_system: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            proposed_concept_identifier: PROPOSED_CONCEPT_IDENTIFIER.to_owned(),
            drug_coding_system: LOCAL_DRUG_CODING_SYSTEM.to_owned(),
            concept_name_coding_system: LOCAL_CONCEPT_NAME_CODING_SYSTEM.to_owned(),
        }
    }
}

impl IngestConfig {
    /// Create a new `IngestConfig` with explicit coding-system values.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::InvalidConfig`] if any value is blank.
    pub fn new(
        proposed_concept_identifier: impl Into<String>,
        drug_coding_system: impl Into<String>,
        concept_name_coding_system: impl Into<String>,
    ) -> IngestResult<Self> {
        let cfg = Self {
            proposed_concept_identifier: proposed_concept_identifier.into(),
            drug_coding_system: drug_coding_system.into(),
            concept_name_coding_system: concept_name_coding_system.into(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a YAML configuration document. Keys that are omitted keep their defaults.
    ///
    /// # Errors
    ///
    /// - [`IngestError::ConfigYaml`] if the document is not valid YAML or has unknown keys
    /// - [`IngestError::InvalidConfig`] if any value is blank
    pub fn from_yaml(yaml: &str) -> IngestResult<Self> {
        let cfg: Self = serde_yaml::from_str(yaml)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Replace values with overrides from `lookup`, which is usually `std::env::var(..).ok()`.
    ///
    /// Taking a lookup function keeps environment access at the caller's edge.
    pub fn apply_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> IngestResult<Self> {
        if let Some(value) = lookup(ENV_PROPOSED_CONCEPT_IDENTIFIER) {
            self.proposed_concept_identifier = value;
        }
        if let Some(value) = lookup(ENV_DRUG_CODING_SYSTEM) {
            self.drug_coding_system = value;
        }
        if let Some(value) = lookup(ENV_CONCEPT_NAME_CODING_SYSTEM) {
            self.concept_name_coding_system = value;
        }
        self.validate()?;
        Ok(self)
    }

    /// Checks that no configured value is blank.
    pub fn validate(&self) -> IngestResult<()> {
        let values = [
            ("proposed_concept_identifier", &self.proposed_concept_identifier),
            ("drug_coding_system", &self.drug_coding_system),
            ("concept_name_coding_system", &self.concept_name_coding_system),
        ];
        for (name, value) in values {
            if value.trim().is_empty() {
                return Err(IngestError::InvalidConfig(format!("{name} cannot be empty")));
            }
        }
        Ok(())
    }

    pub fn proposed_concept_identifier(&self) -> &str {
        &self.proposed_concept_identifier
    }

    pub fn drug_coding_system(&self) -> &str {
        &self.drug_coding_system
    }

    pub fn concept_name_coding_system(&self) -> &str {
        &self.concept_name_coding_system
    }
}
