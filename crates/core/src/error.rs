//! Error types for ORU ingestion.
//!
//! Ingestion has two severities and each has its own type:
//! - [`IngestError`] is fatal and aborts the whole message. It reaches the caller wrapped in an
//!   [`IngestFailure`] that names the stage it happened in.
//! - [`DecodeFailure`] is isolated to a single OBX segment. It never propagates; the
//!   orchestrator records it to the error sink and moves on.
//!
//! [`StoreError`] is what collaborators report when their backend fails. It is always fatal.

use serde::Serialize;
use std::fmt;

/// Which external reference could not be resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Patient,
    Provider,
    Location,
    EnteringUser,
    Form,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Patient => "patient (PID)",
            Self::Provider => "attending provider (PV1-7)",
            Self::Location => "assigned location (PV1-3)",
            Self::EnteringUser => "entering user (ORC-10)",
            Self::Form => "form (MSH-21)",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to parse HL7 message: {0}")]
    Hl7(#[from] hl7::Hl7Error),

    #[error("unsupported message type '{0}' (only ORU^R01 is accepted)")]
    UnsupportedMessageType(String),

    #[error("malformed message: missing required {0} segment")]
    MalformedMessage(&'static str),

    #[error("could not resolve {0}")]
    UnresolvedReference(ReferenceKind),

    #[error("invalid form reference '{0}' in MSH-21")]
    InvalidFormReference(String),

    #[error("invalid timestamp in {field}: '{value}'")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("encounter storage did not return an encounter identity")]
    EncounterNotPersisted,

    #[error("storage failure: {0}")]
    Store(#[from] StoreError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to deserialise YAML configuration: {0}")]
    ConfigYaml(#[from] serde_yaml::Error),
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// The transition that was being attempted when ingestion failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validating,
    ResolvingReferences,
    PersistingEncounter,
    ProcessingObservations,
    Notifying,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Validating => "validating the message",
            Self::ResolvingReferences => "resolving references",
            Self::PersistingEncounter => "persisting the encounter",
            Self::ProcessingObservations => "processing observations",
            Self::Notifying => "notifying encounter creation",
        })
    }
}

/// A fatal ingestion failure and the stage it happened in.
#[derive(Debug, thiserror::Error)]
#[error("ingestion failed while {stage}: {error}")]
pub struct IngestFailure {
    pub stage: Stage,
    #[source]
    pub error: IngestError,
}

impl IngestFailure {
    pub fn at(stage: Stage, error: impl Into<IngestError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }

    /// The unresolved reference, if that is why ingestion failed.
    pub fn unresolved_reference(&self) -> Option<ReferenceKind> {
        match self.error {
            IngestError::UnresolvedReference(kind) => Some(kind),
            _ => None,
        }
    }
}

/// Why a single OBX segment could not be decoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DecodeFailure {
    #[error("OBX-2 value type is missing")]
    MissingDatatype,

    #[error("unsupported observation datatype '{0}'")]
    UnsupportedDatatype(String),

    #[error("invalid question concept id '{0}' in OBX-3")]
    InvalidConceptId(String),

    #[error("invalid answer concept id '{0}'")]
    InvalidAnswerConceptId(String),

    #[error("invalid drug id '{0}'")]
    InvalidDrugId(String),

    #[error("numeric (NM) value '{0}' is not numeric")]
    InvalidNumeric(String),

    #[error("invalid date (DT) value '{0}'")]
    InvalidDate(String),

    #[error("invalid timestamp (TS) value '{0}'")]
    InvalidTimestamp(String),

    #[error("proposed concept has no text")]
    EmptyProposalText,
}

/// A collaborator backend failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{operation} failed: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl StoreError {
    pub fn backend(
        operation: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Backend {
            operation,
            source: source.into(),
        }
    }
}
