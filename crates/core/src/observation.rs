//! Observation records produced from OBX segments.

use crate::error::DecodeFailure;
use chrono::{NaiveDate, NaiveDateTime};
use oru_types::{
    ConceptNameRef, ConceptRef, DrugRef, EncounterRef, LocationRef, NonEmptyText, PatientRef,
    UserRef,
};
use serde::Serialize;

/// A typed observation value. The variant is chosen by the OBX-2 datatype tag alone.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ObservationValue {
    /// No HL7 datatype decodes to this; it exists for stores that model boolean answers.
    Boolean(bool),
    Coded {
        concept: ConceptRef,
        drug: Option<DrugRef>,
        name: Option<ConceptNameRef>,
    },
    Datetime(NaiveDateTime),
    Numeric(f64),
    Text(String),
}

impl ObservationValue {
    /// A `DT` value: the date at midnight.
    pub fn date(date: NaiveDate) -> Self {
        Self::Datetime(date.and_time(chrono::NaiveTime::MIN))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Coded { .. } => "coded",
            Self::Datetime(_) => "datetime",
            Self::Numeric(_) => "numeric",
            Self::Text(_) => "text",
        }
    }
}

/// An observation ready to persist.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Observation {
    pub person: PatientRef,
    /// The question, from OBX-3.
    pub concept: ConceptRef,
    pub encounter: EncounterRef,
    /// OBX-14, else the encounter datetime.
    pub obs_datetime: NaiveDateTime,
    pub location: LocationRef,
    pub creator: UserRef,
    pub date_created: NaiveDateTime,
    pub value: ObservationValue,
    /// NTE-3 lines that followed the OBX.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalState {
    Unmapped,
}

/// A coded answer the sender could not map, queued for curation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConceptProposal {
    pub question: ConceptRef,
    pub original_text: NonEmptyText,
    pub encounter: EncounterRef,
    pub state: ProposalState,
}

impl ConceptProposal {
    pub fn unmapped(
        question: ConceptRef,
        original_text: NonEmptyText,
        encounter: EncounterRef,
    ) -> Self {
        Self {
            question,
            original_text,
            encounter,
            state: ProposalState::Unmapped,
        }
    }
}

/// An OBX segment that could not be decoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DecodeError {
    /// The segment re-encoded with the message's own delimiters.
    pub raw_segment: String,
    pub message_control_id: String,
    pub reason: DecodeFailure,
}

/// The grouping key of an OBX: OBX-4 up to the first `.`.
///
/// `"1.1"` and `"1.2"` share the sub-id `"1"`; an empty OBX-4 is ungrouped.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ObservationSubId(String);

impl ObservationSubId {
    pub fn from_raw(raw: &str) -> Self {
        let prefix = raw.split('.').next().unwrap_or_default();
        Self(prefix.trim().to_owned())
    }

    pub fn is_ungrouped(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A unit of observation persistence.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObservationItem {
    Standalone { observation: Observation },
    Group {
        sub_id: ObservationSubId,
        members: Vec<Observation>,
    },
}
