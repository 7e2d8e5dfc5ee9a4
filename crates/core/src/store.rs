//! Collaborator interfaces the ingestion core depends on.
//!
//! The core owns no persistence. Everything that touches the health-record system goes
//! through one of four traits:
//! - [`ReferenceLookup`] maps wire identifiers (PID, XCN, PL, form ids) to internal records
//! - [`ClinicalStore`] persists encounters, observations, groups and concept proposals
//! - [`ErrorSink`] receives isolated per-OBX decode errors
//! - [`EncounterNotifier`] is told once per message that an encounter was created
//!
//! Every call returns [`StoreResult`] so that backend failures reach the orchestrator, which
//! treats them as fatal. Implementations must be `Send + Sync`; the ingestion service shares
//! them across workers behind an `Arc`.

use crate::encounter::Encounter;
use crate::error::StoreError;
use crate::observation::{ConceptProposal, DecodeError, Observation};
use hl7::{Field, Segment};
use oru_types::{EncounterRef, EncounterTypeRef, FormRef, LocationRef, PatientRef, UserRef};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A form definition as known to the health-record system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    pub id: FormRef,
    #[serde(default)]
    pub encounter_type: Option<EncounterTypeRef>,
}

/// Resolution of external identifiers into internal record references.
///
/// `Ok(None)` means "no match" and is turned into an unresolved-reference failure by the
/// caller; `Err` means the backend itself failed.
pub trait ReferenceLookup: Send + Sync {
    /// Matches a patient from the whole PID segment.
    fn resolve_patient_id(&self, pid: &Segment) -> StoreResult<Option<PatientRef>>;

    /// Matches a user from an XCN field (PV1-7, ORC-10).
    fn resolve_user_id(&self, xcn: &Field) -> StoreResult<Option<UserRef>>;

    /// Matches a location from a PL field (PV1-3).
    fn resolve_location_id(&self, pl: &Field) -> StoreResult<Option<LocationRef>>;

    fn lookup_form(&self, form_id: i32) -> StoreResult<Option<Form>>;
}

/// Persistence of clinical records.
pub trait ClinicalStore: Send + Sync {
    /// Persists an encounter, returning its identity. `Ok(None)` means the store accepted the
    /// call but produced no identity, which the orchestrator treats as fatal.
    fn create_encounter(&self, encounter: &Encounter) -> StoreResult<Option<EncounterRef>>;

    fn create_observation(&self, observation: &Observation) -> StoreResult<()>;

    /// Persists two or more observations as one group.
    fn create_observation_group(&self, members: &[Observation]) -> StoreResult<()>;

    fn propose_concept(&self, proposal: &ConceptProposal) -> StoreResult<()>;
}

/// Destination for isolated decode errors.
pub trait ErrorSink: Send + Sync {
    fn record_decode_error(&self, error: &DecodeError) -> StoreResult<()>;
}

/// Receives the encounter-created event.
pub trait EncounterNotifier: Send + Sync {
    fn notify_encounter_created(&self, encounter: EncounterRef) -> StoreResult<()>;
}

/// The full set of collaborators an [`IngestService`](crate::IngestService) talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub lookup: Arc<dyn ReferenceLookup>,
    pub store: Arc<dyn ClinicalStore>,
    pub errors: Arc<dyn ErrorSink>,
    pub notifier: Arc<dyn EncounterNotifier>,
}

impl Collaborators {
    /// Uses one backend for every role, e.g. [`InMemoryStore`](crate::InMemoryStore).
    pub fn from_shared<T>(backend: Arc<T>) -> Self
    where
        T: ReferenceLookup + ClinicalStore + ErrorSink + EncounterNotifier + 'static,
    {
        Self {
            lookup: backend.clone(),
            store: backend.clone(),
            errors: backend.clone(),
            notifier: backend,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
