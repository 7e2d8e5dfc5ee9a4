//! In-memory collaborator backend.
//!
//! [`InMemoryStore`] implements every collaborator trait against a fixed [`Directory`] of known
//! identifiers and records each call, lookups included, in order. The `oru` CLI uses it for
//! dry runs and the test suite uses it to observe what ingestion did.

use crate::encounter::Encounter;
use crate::error::{IngestResult, StoreError};
use crate::observation::{ConceptProposal, DecodeError, Observation};
use crate::store::{
    ClinicalStore, EncounterNotifier, ErrorSink, Form, ReferenceLookup, StoreResult,
};
use hl7::{Field, Segment};
use oru_types::{EncounterRef, LocationRef, PatientRef, UserRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Known identifiers, keyed by the first component of the wire field.
///
/// ```yaml
/// patients:
///   "3": 42
/// users:
///   "1": 1
/// locations:
///   "1": 5
/// forms:
///   - id: 16
///     encounter_type: 2
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Directory {
    /// PID-3.1 to patient.
    pub patients: BTreeMap<String, PatientRef>,
    /// XCN.1 to user.
    pub users: BTreeMap<String, UserRef>,
    /// PL.1 to location.
    pub locations: BTreeMap<String, LocationRef>,
    pub forms: Vec<Form>,
}

impl Directory {
    pub fn from_yaml(yaml: &str) -> IngestResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

/// One recorded collaborator call.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StoreEvent {
    PatientLookup {
        identifier: String,
        result: Option<PatientRef>,
    },
    UserLookup {
        identifier: String,
        result: Option<UserRef>,
    },
    LocationLookup {
        identifier: String,
        result: Option<LocationRef>,
    },
    FormLookup {
        form_id: i32,
        found: bool,
    },
    EncounterCreated {
        id: Option<EncounterRef>,
        encounter: Encounter,
    },
    ObservationCreated {
        observation: Observation,
    },
    ObservationGroupCreated {
        members: Vec<Observation>,
    },
    ConceptProposed {
        proposal: ConceptProposal,
    },
    DecodeErrorRecorded {
        error: DecodeError,
    },
    EncounterNotified {
        encounter: EncounterRef,
    },
}

impl StoreEvent {
    /// The serialised `event` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PatientLookup { .. } => "patient_lookup",
            Self::UserLookup { .. } => "user_lookup",
            Self::LocationLookup { .. } => "location_lookup",
            Self::FormLookup { .. } => "form_lookup",
            Self::EncounterCreated { .. } => "encounter_created",
            Self::ObservationCreated { .. } => "observation_created",
            Self::ObservationGroupCreated { .. } => "observation_group_created",
            Self::ConceptProposed { .. } => "concept_proposed",
            Self::DecodeErrorRecorded { .. } => "decode_error_recorded",
            Self::EncounterNotified { .. } => "encounter_notified",
        }
    }

    /// Whether the call wrote something, as opposed to looking something up.
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            Self::PatientLookup { .. }
                | Self::UserLookup { .. }
                | Self::LocationLookup { .. }
                | Self::FormLookup { .. }
        )
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    directory: Directory,
    refuse_encounter_identity: bool,
    fail_observation_writes: bool,
    events: Mutex<Vec<StoreEvent>>,
}

impl InMemoryStore {
    pub fn new(directory: Directory) -> Self {
        Self {
            directory,
            ..Self::default()
        }
    }

    pub fn with_patient(mut self, identifier: &str, id: i32) -> Self {
        self.directory
            .patients
            .insert(identifier.to_owned(), PatientRef(id));
        self
    }

    pub fn with_user(mut self, identifier: &str, id: i32) -> Self {
        self.directory.users.insert(identifier.to_owned(), UserRef(id));
        self
    }

    pub fn with_location(mut self, identifier: &str, id: i32) -> Self {
        self.directory
            .locations
            .insert(identifier.to_owned(), LocationRef(id));
        self
    }

    pub fn with_form(mut self, form: Form) -> Self {
        self.directory.forms.push(form);
        self
    }

    /// Makes `create_encounter` succeed without returning an identity.
    pub fn refuse_encounter_identity(mut self) -> Self {
        self.refuse_encounter_identity = true;
        self
    }

    /// Makes observation and group writes fail with a backend error.
    pub fn fail_observation_writes(mut self) -> Self {
        self.fail_observation_writes = true;
        self
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Every recorded call, in order.
    pub fn events(&self) -> Vec<StoreEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded calls that wrote something.
    pub fn writes(&self) -> Vec<StoreEvent> {
        self.events().into_iter().filter(StoreEvent::is_write).collect()
    }

    fn log(&self) -> StoreResult<MutexGuard<'_, Vec<StoreEvent>>> {
        self.events
            .lock()
            .map_err(|_| StoreError::backend("event log", "in-memory event log is poisoned"))
    }

    fn record(&self, event: StoreEvent) -> StoreResult<()> {
        self.log()?.push(event);
        Ok(())
    }
}

impl ReferenceLookup for InMemoryStore {
    fn resolve_patient_id(&self, pid: &Segment) -> StoreResult<Option<PatientRef>> {
        let identifier = pid.value(3).trim().to_owned();
        let result = self.directory.patients.get(&identifier).copied();
        self.record(StoreEvent::PatientLookup { identifier, result })?;
        Ok(result)
    }

    fn resolve_user_id(&self, xcn: &Field) -> StoreResult<Option<UserRef>> {
        let identifier = xcn.value().trim().to_owned();
        let result = self.directory.users.get(&identifier).copied();
        self.record(StoreEvent::UserLookup { identifier, result })?;
        Ok(result)
    }

    fn resolve_location_id(&self, pl: &Field) -> StoreResult<Option<LocationRef>> {
        let identifier = pl.value().trim().to_owned();
        let result = self.directory.locations.get(&identifier).copied();
        self.record(StoreEvent::LocationLookup { identifier, result })?;
        Ok(result)
    }

    fn lookup_form(&self, form_id: i32) -> StoreResult<Option<Form>> {
        let form = self
            .directory
            .forms
            .iter()
            .find(|f| f.id.id() == form_id)
            .copied();
        self.record(StoreEvent::FormLookup {
            form_id,
            found: form.is_some(),
        })?;
        Ok(form)
    }
}

impl ClinicalStore for InMemoryStore {
    fn create_encounter(&self, encounter: &Encounter) -> StoreResult<Option<EncounterRef>> {
        let mut log = self.log()?;
        let id = if self.refuse_encounter_identity {
            None
        } else {
            let created = log
                .iter()
                .filter(|e| matches!(e, StoreEvent::EncounterCreated { id: Some(_), .. }))
                .count();
            let next = i32::try_from(created + 1)
                .map_err(|e| StoreError::backend("create_encounter", e))?;
            Some(EncounterRef(next))
        };
        log.push(StoreEvent::EncounterCreated {
            id,
            encounter: encounter.clone(),
        });
        Ok(id)
    }

    fn create_observation(&self, observation: &Observation) -> StoreResult<()> {
        if self.fail_observation_writes {
            return Err(StoreError::backend(
                "create_observation",
                "observation storage unavailable",
            ));
        }
        self.record(StoreEvent::ObservationCreated {
            observation: observation.clone(),
        })
    }

    fn create_observation_group(&self, members: &[Observation]) -> StoreResult<()> {
        if self.fail_observation_writes {
            return Err(StoreError::backend(
                "create_observation_group",
                "observation storage unavailable",
            ));
        }
        self.record(StoreEvent::ObservationGroupCreated {
            members: members.to_vec(),
        })
    }

    fn propose_concept(&self, proposal: &ConceptProposal) -> StoreResult<()> {
        self.record(StoreEvent::ConceptProposed {
            proposal: proposal.clone(),
        })
    }
}

impl ErrorSink for InMemoryStore {
    fn record_decode_error(&self, error: &DecodeError) -> StoreResult<()> {
        self.record(StoreEvent::DecodeErrorRecorded {
            error: error.clone(),
        })
    }
}

impl EncounterNotifier for InMemoryStore {
    fn notify_encounter_created(&self, encounter: EncounterRef) -> StoreResult<()> {
        self.record(StoreEvent::EncounterNotified { encounter })
    }
}
