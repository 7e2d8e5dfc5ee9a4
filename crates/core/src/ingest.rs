//! ORU^R01 ingestion.
//!
//! [`IngestService`] turns one parsed message into an encounter, its observations, observation
//! groups and concept proposals, then announces the encounter. The steps are modelled as a
//! type-state [`Ingestion`]: each transition consumes the previous state, so a step can only run
//! once its inputs exist.
//!
//! ```text
//! Start -> Validated -> ReferencesResolved -> EncounterPersisted -> ObservationsProcessed
//!       -> Notified
//! ```
//!
//! Any transition up to and including observation processing can fail, and a failure reports
//! its [`Stage`]. A single OBX that cannot be decoded is not a failure: it is handed to the
//! error sink and the remaining segments are still processed.
//!
//! Nothing is rolled back. Transactions, if any, belong to the storage collaborators.

use crate::config::IngestConfig;
use crate::constants::{
    ORC_DATETIME_OF_TRANSACTION, ORU_MESSAGE_CODE, ORU_TRIGGER_EVENT, PV1_ADMIT_DATETIME,
};
use crate::decoder::{DecodedObx, ValueDecoder};
use crate::encounter::{Encounter, PersistedEncounter};
use crate::error::{IngestError, IngestFailure, Stage};
use crate::grouping::group_observations;
use crate::observation::{DecodeError, ObservationItem};
use crate::references::{ReferenceResolver, ResolvedReferences};
use crate::segments::OruSegments;
use crate::store::Collaborators;
use chrono::NaiveDateTime;
use hl7::Message;
use serde::Serialize;
use std::sync::Arc;

/// Source of the "received at" time used when ORC-9 is absent.
pub type Clock = fn() -> NaiveDateTime;

fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// What a successful ingestion did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub message_control_id: String,
    pub encounter: PersistedEncounter,
    /// Standalone observations persisted.
    pub observations: usize,
    /// Observation groups persisted.
    pub groups: usize,
    pub proposals: usize,
    pub decode_errors: usize,
    /// OBX segments with nothing to record.
    pub skipped: usize,
}

/// A completed ingestion: the original message and what was done with it.
#[derive(Clone, Debug)]
pub struct Ingested {
    pub message: Message,
    pub summary: IngestSummary,
}

/// Ingestion entry point.
///
/// Holds only immutable configuration and shared collaborators, so one service can be used from
/// many threads at once.
#[derive(Clone, Debug)]
pub struct IngestService {
    cfg: Arc<IngestConfig>,
    collaborators: Collaborators,
    clock: Clock,
}

impl IngestService {
    pub fn new(cfg: Arc<IngestConfig>, collaborators: Collaborators) -> Self {
        Self {
            cfg,
            collaborators,
            clock: local_now,
        }
    }

    /// Replaces the clock, which is the local wall-clock time by default.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Ingests a parsed message.
    ///
    /// # Errors
    ///
    /// Returns an [`IngestFailure`] naming the stage and reason of the first fatal error.
    /// Collaborator writes made before the failure are not undone.
    pub fn ingest(&self, message: Message) -> Result<Ingested, IngestFailure> {
        let summary = Ingestion::start(self, &message)
            .validate()?
            .resolve_references()?
            .persist_encounter()?
            .process_observations()?
            .notify()?
            .finish();

        Ok(Ingested { message, summary })
    }

    /// Parses and ingests message text. A parse failure is reported at [`Stage::Validating`].
    pub fn ingest_text(&self, text: &str) -> Result<Ingested, IngestFailure> {
        let message = Message::parse(text).map_err(|e| fail(Stage::Validating, e))?;
        self.ingest(message)
    }
}

/// Marker type: nothing has been checked yet.
#[derive(Clone, Copy, Debug)]
pub struct Start;

/// The message is ORU^R01 and has its required segments.
#[derive(Clone, Debug)]
pub struct Validated<'m> {
    segments: OruSegments<'m>,
}

#[derive(Clone, Debug)]
pub struct ReferencesResolved<'m> {
    segments: OruSegments<'m>,
    refs: ResolvedReferences,
}

#[derive(Clone, Debug)]
pub struct EncounterPersisted<'m> {
    segments: OruSegments<'m>,
    encounter: PersistedEncounter,
}

#[derive(Clone, Debug)]
pub struct ObservationsProcessed {
    summary: IngestSummary,
}

#[derive(Clone, Debug)]
pub struct Notified {
    summary: IngestSummary,
}

/// One message moving through ingestion. `S` is the current state.
#[derive(Clone, Debug)]
pub struct Ingestion<'s, 'm, S> {
    service: &'s IngestService,
    message: &'m Message,
    state: S,
}

impl<'s, 'm, S> Ingestion<'s, 'm, S> {
    fn advance<T>(self, state: T) -> Ingestion<'s, 'm, T> {
        Ingestion {
            service: self.service,
            message: self.message,
            state,
        }
    }
}

impl<'s, 'm> Ingestion<'s, 'm, Start> {
    pub fn start(service: &'s IngestService, message: &'m Message) -> Self {
        Self {
            service,
            message,
            state: Start,
        }
    }

    /// Checks MSH-9 and extracts the segments ingestion reads.
    pub fn validate(self) -> Result<Ingestion<'s, 'm, Validated<'m>>, IngestFailure> {
        let message_type = self.message.message_type();
        if message_type.code != ORU_MESSAGE_CODE || message_type.trigger_event != ORU_TRIGGER_EVENT
        {
            return Err(fail(
                Stage::Validating,
                IngestError::UnsupportedMessageType(message_type.to_string()),
            ));
        }

        let segments =
            OruSegments::from_message(self.message).map_err(|e| fail(Stage::Validating, e))?;

        tracing::debug!(
            "validated ORU^R01 message '{}' (HL7 {})",
            self.message.control_id(),
            self.message.version()
        );
        Ok(self.advance(Validated { segments }))
    }
}

impl<'s, 'm> Ingestion<'s, 'm, Validated<'m>> {
    pub fn resolve_references(
        self,
    ) -> Result<Ingestion<'s, 'm, ReferencesResolved<'m>>, IngestFailure> {
        let refs = ReferenceResolver::new(self.service.collaborators.lookup.as_ref())
            .resolve_all(&self.state.segments)
            .map_err(|e| fail(Stage::ResolvingReferences, e))?;

        let segments = self.state.segments.clone();
        Ok(self.advance(ReferencesResolved { segments, refs }))
    }
}

impl<'s, 'm> Ingestion<'s, 'm, ReferencesResolved<'m>> {
    /// Assembles the encounter from PV1-44 and ORC-9 and persists it.
    pub fn persist_encounter(
        self,
    ) -> Result<Ingestion<'s, 'm, EncounterPersisted<'m>>, IngestFailure> {
        let stage = Stage::PersistingEncounter;
        let segments = &self.state.segments;
        let admit = segments.pv1.map(|s| s.value(PV1_ADMIT_DATETIME)).unwrap_or("");
        let entered = segments
            .orc
            .map(|s| s.value(ORC_DATETIME_OF_TRANSACTION))
            .unwrap_or("");

        let received_at = (self.service.clock)();
        let encounter = Encounter::assemble(&self.state.refs, admit, entered, received_at)
            .map_err(|e| fail(stage, e))?;
        let id = self
            .service
            .collaborators
            .store
            .create_encounter(&encounter)
            .map_err(|e| fail(stage, e))?
            .ok_or_else(|| fail(stage, IngestError::EncounterNotPersisted))?;

        tracing::debug!("created encounter {id} for patient {}", encounter.patient);

        let segments = self.state.segments.clone();
        Ok(self.advance(EncounterPersisted {
            segments,
            encounter: PersistedEncounter { id, encounter },
        }))
    }
}

impl<'s, 'm> Ingestion<'s, 'm, EncounterPersisted<'m>> {
    /// Decodes every OBX, persists proposals as they are found, then persists observations and
    /// groups in first-seen sub-id order.
    pub fn process_observations(
        self,
    ) -> Result<Ingestion<'s, 'm, ObservationsProcessed>, IngestFailure> {
        let stage = Stage::ProcessingObservations;
        let service = self.service;
        let collaborators = &service.collaborators;
        let delimiters = self.message.delimiters();
        let decoder = ValueDecoder::new(&service.cfg, delimiters);
        let encounter = &self.state.encounter;

        let mut summary = IngestSummary {
            message_control_id: self.message.control_id().to_owned(),
            encounter: encounter.clone(),
            observations: 0,
            groups: 0,
            proposals: 0,
            decode_errors: 0,
            skipped: 0,
        };

        let mut decoded = Vec::new();
        for obx in &self.state.segments.observations {
            match decoder.decode_obx(obx, encounter) {
                Ok(DecodedObx::Observation(observation)) => {
                    decoded.push((obx.sub_id(), observation));
                }
                Ok(DecodedObx::Proposal(proposal)) => {
                    collaborators
                        .store
                        .propose_concept(&proposal)
                        .map_err(|e| fail(stage, e))?;
                    summary.proposals += 1;
                }
                Ok(DecodedObx::Skipped) => summary.skipped += 1,
                Err(reason) => {
                    tracing::warn!(
                        "skipping OBX {} (order {}) of message '{}': {reason}",
                        obx.segment.value(1),
                        obx.order,
                        summary.message_control_id
                    );
                    let error = DecodeError {
                        raw_segment: obx.segment.encode(delimiters),
                        message_control_id: summary.message_control_id.clone(),
                        reason,
                    };
                    collaborators
                        .errors
                        .record_decode_error(&error)
                        .map_err(|e| fail(stage, e))?;
                    summary.decode_errors += 1;
                }
            }
        }

        for item in group_observations(decoded) {
            match item {
                ObservationItem::Standalone { observation } => {
                    collaborators
                        .store
                        .create_observation(&observation)
                        .map_err(|e| fail(stage, e))?;
                    summary.observations += 1;
                }
                ObservationItem::Group { sub_id, members } => {
                    tracing::debug!(
                        "grouping {} observations under sub-id {}",
                        members.len(),
                        sub_id.as_str()
                    );
                    collaborators
                        .store
                        .create_observation_group(&members)
                        .map_err(|e| fail(stage, e))?;
                    summary.groups += 1;
                }
            }
        }

        Ok(self.advance(ObservationsProcessed { summary }))
    }
}

impl<'s, 'm> Ingestion<'s, 'm, ObservationsProcessed> {
    /// Announces the encounter. A notifier failure is fatal at [`Stage::Notifying`] even though
    /// everything before it has been persisted.
    pub fn notify(self) -> Result<Ingestion<'s, 'm, Notified>, IngestFailure> {
        let summary = self.state.summary.clone();
        self.service
            .collaborators
            .notifier
            .notify_encounter_created(summary.encounter.id)
            .map_err(|e| fail(Stage::Notifying, e))?;
        Ok(self.advance(Notified { summary }))
    }
}

impl<'s, 'm> Ingestion<'s, 'm, Notified> {
    pub fn finish(self) -> IngestSummary {
        let summary = self.state.summary;
        tracing::info!(
            "ingested message '{}': encounter {}, {} observations, {} groups, {} proposals, \
             {} decode errors",
            summary.message_control_id,
            summary.encounter.id,
            summary.observations,
            summary.groups,
            summary.proposals,
            summary.decode_errors
        );
        summary
    }
}

fn fail(stage: Stage, error: impl Into<IngestError>) -> IngestFailure {
    let failure = IngestFailure::at(stage, error);
    tracing::error!("{failure}");
    failure
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DecodeFailure, ReferenceKind};
    use crate::memory::{InMemoryStore, StoreEvent};
    use crate::observation::{Observation, ObservationValue};
    use crate::store::Form;
    use chrono::NaiveDate;
    use oru_types::{
        ConceptRef, EncounterRef, EncounterTypeRef, FormRef, LocationRef, NonEmptyText,
        PatientRef, ProviderRef, UserRef,
    };

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    fn fixed_clock() -> NaiveDateTime {
        at(2024, 6, 1, 9, 30, 0)
    }

    fn directory() -> InMemoryStore {
        InMemoryStore::default()
            .with_patient("3", 42)
            .with_user("7", 7)
            .with_user("1", 1)
            .with_location("1", 5)
            .with_form(Form {
                id: FormRef(16),
                encounter_type: Some(EncounterTypeRef(2)),
            })
    }

    fn service(store: Arc<InMemoryStore>) -> IngestService {
        IngestService::new(
            Arc::new(IngestConfig::default()),
            Collaborators::from_shared(store),
        )
        .with_clock(fixed_clock)
    }

    fn pv1(admit: &str) -> String {
        // PV1-7 is followed by 37 separators, which puts `admit` in PV1-44.
        format!("PV1||O|1^Clinic||||7^Attending{}{admit}", "|".repeat(37))
    }

    fn message_with(header_tail: &str, pv1: Option<&str>, orc: &str, body: &[&str]) -> String {
        let mut segments = vec![
            format!("MSH|^~\\&|FORMENTRY|SITE|HL7LISTENER|SITE|20240101120500||{header_tail}"),
            "PID|||3^^^^||Doe^John".to_owned(),
        ];
        segments.extend(pv1.map(str::to_owned));
        segments.push(orc.to_owned());
        segments.push("OBR|1|||1238^MEDICAL RECORD OBSERVATIONS^99DCT".to_owned());
        segments.extend(body.iter().map(|s| (*s).to_owned()));
        segments.join("\r")
    }

    fn message(body: &[&str]) -> String {
        message_with(
            "ORU^R01|CTRL-1|P|2.5",
            Some(pv1("20240101120000").as_str()),
            "ORC|RE||||||||20240101120400|1^Super User",
            body,
        )
    }

    fn run(store: &Arc<InMemoryStore>, text: &str) -> Result<Ingested, IngestFailure> {
        service(store.clone()).ingest_text(text)
    }

    fn created_observations(store: &InMemoryStore) -> Vec<Observation> {
        store
            .events()
            .into_iter()
            .filter_map(|e| match e {
                StoreEvent::ObservationCreated { observation } => Some(observation),
                _ => None,
            })
            .collect()
    }

    fn write_names(store: &InMemoryStore) -> Vec<&'static str> {
        store.writes().iter().map(StoreEvent::name).collect()
    }

    #[test]
    fn single_numeric_observation_scenario() {
        let store = Arc::new(directory());
        let ingested =
            run(&store, &message(&["OBX|1|NM|5089^TEMP^99DCT||98.6"])).expect("ingests");

        let summary = &ingested.summary;
        assert_eq!(summary.message_control_id, "CTRL-1");
        assert_eq!(summary.encounter.id, EncounterRef(1));
        assert_eq!(summary.encounter.encounter.patient, PatientRef(42));
        assert_eq!(summary.encounter.encounter.provider, ProviderRef(7));
        assert_eq!(
            summary.encounter.encounter.encounter_datetime,
            at(2024, 1, 1, 12, 0, 0)
        );
        assert_eq!((summary.observations, summary.groups, summary.proposals), (1, 0, 0));

        let observations = created_observations(&store);
        assert_eq!(observations.len(), 1);
        let obs = &observations[0];
        assert_eq!(obs.value, ObservationValue::Numeric(98.6));
        assert_eq!(obs.person, PatientRef(42));
        assert_eq!(obs.concept, ConceptRef(5089));
        assert_eq!(obs.encounter, EncounterRef(1));
        assert_eq!(obs.location, LocationRef(5));
        assert_eq!(obs.creator, UserRef(1));
        assert_eq!(obs.obs_datetime, at(2024, 1, 1, 12, 0, 0));

        assert_eq!(
            write_names(&store),
            ["encounter_created", "observation_created", "encounter_notified"]
        );
        assert_eq!(ingested.message.control_id(), "CTRL-1");
    }

    #[test]
    fn proposal_does_not_occupy_a_group_slot() {
        let store = Arc::new(directory());
        let ingested = run(
            &store,
            &message(&[
                "OBX|1|CWE|1284^PROBLEM ADDED^99DCT|5.1|PROPOSED^Night sweats^99DCT",
                "OBX|2|NM|5089^TEMP^99DCT|5.2|37.5",
            ]),
        )
        .expect("ingests");

        let summary = ingested.summary;
        assert_eq!((summary.proposals, summary.groups, summary.observations), (1, 0, 1));
        assert_eq!(
            write_names(&store),
            ["encounter_created", "concept_proposed", "observation_created", "encounter_notified"]
        );

        let proposal = store.events().into_iter().find_map(|e| match e {
            StoreEvent::ConceptProposed { proposal } => Some(proposal),
            _ => None,
        });
        let proposal = proposal.expect("proposal recorded");
        assert_eq!(proposal.question, ConceptRef(1284));
        assert_eq!(proposal.original_text, NonEmptyText::new("Night sweats").unwrap());
        assert_eq!(proposal.encounter, EncounterRef(1));
        assert_eq!(
            created_observations(&store)[0].value,
            ObservationValue::Numeric(37.5)
        );
    }

    #[test]
    fn missing_pv1_fails_on_location_and_persists_nothing() {
        let store = Arc::new(directory());
        let text = message_with(
            "ORU^R01|CTRL-1|P|2.5",
            None,
            "ORC|RE||||||||20240101120400|1^Super User",
            &["OBX|1|NM|5089^TEMP^99DCT||98.6"],
        );

        let failure = run(&store, &text).expect_err("no PV1");
        assert_eq!(failure.stage, Stage::ResolvingReferences);
        assert_eq!(failure.unresolved_reference(), Some(ReferenceKind::Location));
        assert!(store.writes().is_empty());
    }

    #[test]
    fn shared_sub_ids_are_persisted_as_groups() {
        let store = Arc::new(directory());
        let ingested = run(
            &store,
            &message(&[
                "OBX|1|NM|5089^WEIGHT^99DCT|1.1|70",
                "OBX|2|NM|5090^HEIGHT^99DCT|1.2|180",
                "OBX|3|ST|1000^NOTE^99DCT|2|lone",
            ]),
        )
        .expect("ingests");

        assert_eq!((ingested.summary.groups, ingested.summary.observations), (1, 1));
        let writes = store.writes();
        assert!(matches!(
            &writes[1],
            StoreEvent::ObservationGroupCreated { members } if members.len() == 2
                && members[0].concept == ConceptRef(5089)
                && members[1].concept == ConceptRef(5090)
        ));
        assert!(matches!(
            &writes[2],
            StoreEvent::ObservationCreated { observation }
                if observation.value == ObservationValue::Text("lone".to_owned())
        ));
    }

    #[test]
    fn decode_failure_is_isolated_and_recorded() {
        let store = Arc::new(directory());
        let bad = "OBX|2|NM|5089^TEMP^99DCT||warm";
        let ingested = run(
            &store,
            &message(&[
                "OBX|1|NM|5089^TEMP^99DCT||37",
                bad,
                "OBX|3|ED|1^X^99DCT||blob",
                "OBX|4|NM|5090||38",
            ]),
        )
        .expect("ingests");

        assert_eq!(ingested.summary.decode_errors, 2);
        assert_eq!(ingested.summary.observations, 2);
        assert_eq!(created_observations(&store).len(), 2);

        let errors: Vec<_> = store
            .events()
            .into_iter()
            .filter_map(|e| match e {
                StoreEvent::DecodeErrorRecorded { error } => Some(error),
                _ => None,
            })
            .collect();
        assert_eq!(errors[0].raw_segment, bad);
        assert_eq!(errors[0].message_control_id, "CTRL-1");
        assert_eq!(errors[0].reason, DecodeFailure::InvalidNumeric("warm".to_owned()));
        assert_eq!(
            errors[1].reason,
            DecodeFailure::UnsupportedDatatype("ED".to_owned())
        );
    }

    #[test]
    fn failed_decodes_never_join_a_group() {
        let store = Arc::new(directory());
        let ingested = run(
            &store,
            &message(&[
                "OBX|1|NM|5089^WEIGHT^99DCT|1.1|70",
                "OBX|2|NM|5090^HEIGHT^99DCT|1.2|tall",
                "OBX|3|NM|5091^PULSE^99DCT|1.3|72",
                "OBX|4|NM|5092^TEMP^99DCT|2.1|37",
                "OBX|5|NM|5093^RESP^99DCT|2.2|fast",
            ]),
        )
        .expect("ingests");

        let summary = &ingested.summary;
        assert_eq!(
            (summary.groups, summary.observations, summary.decode_errors),
            (1, 1, 2)
        );

        let events = store.events();
        let group = events.iter().find_map(|e| match e {
            StoreEvent::ObservationGroupCreated { members } => Some(members),
            _ => None,
        });
        let concepts: Vec<ConceptRef> = group
            .expect("group recorded")
            .iter()
            .map(|m| m.concept)
            .collect();
        assert_eq!(concepts, [ConceptRef(5089), ConceptRef(5091)]);

        let standalone = created_observations(&store);
        assert_eq!(standalone.len(), 1);
        assert_eq!(standalone[0].concept, ConceptRef(5092));
        assert_eq!(standalone[0].value, ObservationValue::Numeric(37.0));
    }

    #[test]
    fn no_observations_still_notifies_once() {
        let store = Arc::new(directory());
        let ingested =
            run(&store, &message(&["OBX|1|NM|5089^TEMP^99DCT||"])).expect("ingests");

        assert_eq!(ingested.summary.skipped, 1);
        assert_eq!(write_names(&store), ["encounter_created", "encounter_notified"]);
    }

    #[test]
    fn form_and_transaction_time_flow_into_the_encounter() {
        let store = Arc::new(directory());
        let text = message_with(
            "ORU^R01|CTRL-2|P|2.5|1||||||||16^AMRS.ELD.FORMID",
            Some(pv1("20240305").as_str()),
            "ORC|RE|||||||||1^Super User",
            &[],
        );
        let encounter = run(&store, &text).expect("ingests").summary.encounter.encounter;

        assert_eq!(encounter.form, Some(FormRef(16)));
        assert_eq!(encounter.encounter_type, Some(EncounterTypeRef(2)));
        assert_eq!(encounter.encounter_datetime, at(2024, 3, 5, 0, 0, 0));
        assert_eq!(encounter.date_created, fixed_clock());
    }

    #[test]
    fn fatal_failures_report_their_stage() {
        let store = Arc::new(directory());
        let obx = ["OBX|1|NM|5089||1"];

        let adt = message_with(
            "ADT^A01|C|P|2.5",
            Some(pv1("2024").as_str()),
            "ORC|RE",
            &obx,
        );
        let failure = run(&store, &adt).expect_err("wrong type");
        assert_eq!(failure.stage, Stage::Validating);
        assert!(matches!(failure.error, IngestError::UnsupportedMessageType(t) if t == "ADT^A01"));

        let failure = run(&store, "PID|||3").expect_err("not HL7");
        assert_eq!(failure.stage, Stage::Validating);
        assert!(matches!(failure.error, IngestError::Hl7(_)));

        let failure = run(&store, "MSH|^~\\&|A||||||ORU^R01|C|P|2.5").expect_err("no PID");
        assert!(matches!(failure.error, IngestError::MalformedMessage("PID")));

        let bad_form = message_with(
            "ORU^R01|C|P|2.5|1||||||||form^X",
            Some(pv1("2024").as_str()),
            "ORC|RE|||||||||1",
            &obx,
        );
        let failure = run(&store, &bad_form).expect_err("bad form");
        assert_eq!(failure.stage, Stage::ResolvingReferences);
        assert!(matches!(failure.error, IngestError::InvalidFormReference(f) if f == "form"));

        let bad_admit = message_with(
            "ORU^R01|C|P|2.5",
            Some(pv1("0000").as_str()),
            "ORC|RE|||||||||1",
            &obx,
        );
        let failure = run(&store, &bad_admit).expect_err("bad PV1-44");
        assert_eq!(failure.stage, Stage::PersistingEncounter);
        assert!(matches!(
            failure.error,
            IngestError::InvalidTimestamp { field: "PV1-44", .. }
        ));

        assert!(store.writes().is_empty());
    }

    #[test]
    fn encounter_without_identity_is_fatal() {
        let store = Arc::new(directory().refuse_encounter_identity());
        let failure = run(&store, &message(&["OBX|1|NM|5089||1"])).expect_err("no identity");

        assert_eq!(failure.stage, Stage::PersistingEncounter);
        assert!(matches!(failure.error, IngestError::EncounterNotPersisted));
        assert_eq!(write_names(&store), ["encounter_created"]);
    }

    #[test]
    fn observation_persistence_failure_is_fatal_and_skips_notification() {
        let store = Arc::new(directory().fail_observation_writes());
        let failure = run(&store, &message(&["OBX|1|NM|5089||1"])).expect_err("store down");

        assert_eq!(failure.stage, Stage::ProcessingObservations);
        assert!(matches!(failure.error, IngestError::Store(_)));
        assert!(!write_names(&store).contains(&"encounter_notified"));
    }

    struct UnreachableNotifier;

    impl crate::store::EncounterNotifier for UnreachableNotifier {
        fn notify_encounter_created(&self, _: EncounterRef) -> crate::StoreResult<()> {
            Err(crate::StoreError::backend("notify", "listener unreachable"))
        }
    }

    #[test]
    fn notifier_failure_is_fatal_after_observations_persist() {
        let store = Arc::new(directory());
        let collaborators = Collaborators {
            notifier: Arc::new(UnreachableNotifier),
            ..Collaborators::from_shared(store.clone())
        };
        let service = IngestService::new(Arc::new(IngestConfig::default()), collaborators)
            .with_clock(fixed_clock);

        let failure = service
            .ingest_text(&message(&["OBX|1|NM|5089||1"]))
            .expect_err("notifier down");

        assert_eq!(failure.stage, Stage::Notifying);
        assert!(matches!(failure.error, IngestError::Store(_)));
        assert_eq!(write_names(&store), ["encounter_created", "observation_created"]);
    }

    #[test]
    fn ingests_a_form_entry_message() {
        let store = Arc::new(
            InMemoryStore::default()
                .with_patient("3", 3)
                .with_user("1", 1)
                .with_location("1", 1)
                .with_form(Form {
                    id: FormRef(16),
                    encounter_type: None,
                }),
        );
        let text = "MSH|^~\\&|FORMENTRY|AMRS.ELD|HL7LISTENER|AMRS.ELD|20080226102656||ORU^R01|JqnfhKKtouEz8kzTk6Zo|P|2.5|1||||||||16^AMRS.ELD.FORMID\r\
PID|||3^^^^||John3^Doe^||\r\
PV1||O|1^Unknown Location||||1^Super User (1-8)|||||||||||||||||||||||||||||||||||||20080212|||||||V\r\
ORC|RE||||||||20080226102537|1^Super User\r\
OBR|1|||1238^MEDICAL RECORD OBSERVATIONS^99DCT\r\
OBX|1|NM|5497^CD4, BY FACS^99DCT||450|||||||||20080206\r\
OBX|2|DT|5096^RETURN VISIT DATE^99DCT||20080229|||||||||20080212\r\
OBR|2|||1727^CHIEF COMPLAINT^99DCT\r\
OBX|1|CWE|1728^CHIEF COMPLAINT^99DCT|1.1|5090^HEIGHT^99DCT^123^HEIGHT NAME^99NAM|||||||||20080212\r\
OBX|2|CWE|1729^SYMPTOM^99DCT|1.2|PROPOSED^ACHES^99DCT|||||||||20080212\r\
OBX|3|CWE|1730^DRUG^99DCT|1.3|1107^NONE^99DCT^22^ASPIRIN^99RX|||||||||20080212";

        let summary = run(&store, text).expect("ingests").summary;
        assert_eq!(summary.encounter.encounter.encounter_datetime, at(2008, 2, 12, 0, 0, 0));
        assert_eq!(summary.encounter.encounter.date_created, at(2008, 2, 26, 10, 25, 37));
        assert_eq!(
            (summary.observations, summary.groups, summary.proposals),
            (2, 1, 1)
        );

        let group = store.events().into_iter().find_map(|e| match e {
            StoreEvent::ObservationGroupCreated { members } => Some(members),
            _ => None,
        });
        let values: Vec<ObservationValue> = group
            .expect("group recorded")
            .into_iter()
            .map(|o| o.value)
            .collect();
        assert_eq!(
            values,
            [
                ObservationValue::Coded {
                    concept: ConceptRef(5090),
                    drug: None,
                    name: Some(oru_types::ConceptNameRef(123)),
                },
                ObservationValue::Coded {
                    concept: ConceptRef(1107),
                    drug: Some(oru_types::DrugRef(22)),
                    name: None,
                },
            ]
        );
    }

    #[test]
    fn service_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<IngestService>();
    }
}
