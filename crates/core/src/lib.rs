//! # ORU Core
//!
//! Ingestion of HL7v2 ORU^R01 result messages into clinical records.
//!
//! This crate turns one parsed [`hl7::Message`] into:
//! - an encounter built from PV1, ORC and MSH references
//! - one observation per decodable OBX, grouped by OBX-4 sub-id
//! - concept proposals for coded answers the sender could not map
//!
//! **No persistence**: entity storage, identifier lookup, the error queue and encounter
//! notification are collaborators behind the traits in [`store`]. [`InMemoryStore`] implements
//! all of them for dry runs and tests.

pub mod config;
pub mod constants;
pub mod decoder;
pub mod encounter;
pub mod error;
pub mod grouping;
pub mod ingest;
pub mod memory;
pub mod observation;
pub mod references;
pub mod segments;
pub mod store;

pub use config::IngestConfig;
pub use decoder::{Decoded, DecodedObx, ValueDecoder, ValueType};
pub use encounter::{Encounter, PersistedEncounter};
pub use error::{
    DecodeFailure, IngestError, IngestFailure, IngestResult, ReferenceKind, Stage, StoreError,
};
pub use grouping::group_observations;
pub use ingest::{IngestService, IngestSummary, Ingested, Ingestion};
pub use memory::{Directory, InMemoryStore, StoreEvent};
pub use observation::{
    ConceptProposal, DecodeError, Observation, ObservationItem, ObservationSubId,
    ObservationValue, ProposalState,
};
pub use references::{ReferenceResolver, ResolvedReferences};
pub use segments::{ObxSegment, OruSegments};
pub use store::{
    ClinicalStore, Collaborators, EncounterNotifier, ErrorSink, Form, ReferenceLookup,
    StoreResult,
};
