//! OBX value decoding.
//!
//! The OBX-2 datatype tag alone decides how OBX-5 is read; content is never sniffed. Decoding
//! is pure: concept, drug and concept-name references are parsed as values and never looked up.
//!
//! | tag         | value                                                     |
//! |-------------|-----------------------------------------------------------|
//! | `NM`        | finite `f64`                                              |
//! | `CWE`, `CE` | coded answer, or a concept proposal for the sentinel code |
//! | `DT`        | date at midnight                                          |
//! | `TS`        | timestamp; an absent value falls back to a default        |
//! | `ST`        | the field text verbatim                                   |

use crate::config::IngestConfig;
use crate::constants::{OBX_DATETIME, OBX_OBSERVATION_IDENTIFIER, OBX_VALUE, OBX_VALUE_TYPE};
use crate::encounter::PersistedEncounter;
use crate::error::DecodeFailure;
use crate::observation::{ConceptProposal, Observation, ObservationValue};
use crate::segments::ObxSegment;
use chrono::NaiveDateTime;
use hl7::{Delimiters, Field};
use oru_types::{ConceptNameRef, ConceptRef, DrugRef, NonEmptyText};
use std::str::FromStr;

const IDENTIFIER: usize = 1;
const TEXT: usize = 2;
const ALTERNATE_IDENTIFIER: usize = 4;
const ALTERNATE_CODING_SYSTEM: usize = 6;

/// Supported OBX-2 datatypes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
    Nm,
    Cwe,
    Ce,
    Dt,
    Ts,
    St,
}

impl FromStr for ValueType {
    type Err = DecodeFailure;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(DecodeFailure::MissingDatatype),
            "NM" => Ok(Self::Nm),
            "CWE" => Ok(Self::Cwe),
            "CE" => Ok(Self::Ce),
            "DT" => Ok(Self::Dt),
            "TS" => Ok(Self::Ts),
            "ST" => Ok(Self::St),
            other => Err(DecodeFailure::UnsupportedDatatype(other.to_owned())),
        }
    }
}

/// Outcome of decoding one OBX-5 value.
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    Value(ObservationValue),
    /// The coded answer carried the proposed-concept sentinel; this is its text.
    Proposal(NonEmptyText),
    /// Nothing to record.
    Empty,
}

/// Outcome of decoding a whole OBX segment.
#[derive(Clone, Debug, PartialEq)]
pub enum DecodedObx {
    Observation(Observation),
    Proposal(ConceptProposal),
    Skipped,
}

pub struct ValueDecoder<'a> {
    cfg: &'a IngestConfig,
    delimiters: &'a Delimiters,
}

impl<'a> ValueDecoder<'a> {
    pub fn new(cfg: &'a IngestConfig, delimiters: &'a Delimiters) -> Self {
        Self { cfg, delimiters }
    }

    /// Decodes `value` according to the datatype `tag`.
    ///
    /// `default_datetime` is used for a `TS` value that is empty or has a zero year.
    pub fn decode(
        &self,
        tag: &str,
        value: &Field,
        default_datetime: NaiveDateTime,
    ) -> Result<Decoded, DecodeFailure> {
        match tag.parse::<ValueType>()? {
            ValueType::Nm => decode_numeric(value),
            ValueType::Cwe => self.decode_coded(value, true),
            ValueType::Ce => self.decode_coded(value, false),
            ValueType::Dt => decode_date(value),
            ValueType::Ts => decode_timestamp(value, default_datetime),
            ValueType::St => Ok(self.decode_text(value)),
        }
    }

    /// Decodes an OBX segment into an observation or concept proposal for `encounter`.
    pub fn decode_obx(
        &self,
        obx: &ObxSegment<'_>,
        encounter: &PersistedEncounter,
    ) -> Result<DecodedObx, DecodeFailure> {
        let segment = obx.segment;
        let question_raw = segment.component(OBX_OBSERVATION_IDENTIFIER, IDENTIFIER).trim();
        let question = question_raw
            .parse::<ConceptRef>()
            .map_err(|_| DecodeFailure::InvalidConceptId(question_raw.to_owned()))?;

        let obs_datetime = match hl7::parse_timestamp(segment.value(OBX_DATETIME)) {
            Ok(Some(datetime)) => datetime,
            Ok(None) => encounter.encounter.encounter_datetime,
            Err(e) => {
                tracing::warn!("using encounter datetime for concept {question}: {e}");
                encounter.encounter.encounter_datetime
            }
        };

        let empty = Field::default();
        let value = segment.field(OBX_VALUE).unwrap_or(&empty);
        let decoded = self.decode(
            segment.value(OBX_VALUE_TYPE),
            value,
            encounter.encounter.encounter_datetime,
        )?;

        Ok(match decoded {
            Decoded::Value(value) => DecodedObx::Observation(Observation {
                person: encounter.encounter.patient,
                concept: question,
                encounter: encounter.id,
                obs_datetime,
                location: encounter.encounter.location,
                creator: encounter.encounter.creator,
                date_created: encounter.encounter.date_created,
                value,
                comment: obx.comment(),
            }),
            Decoded::Proposal(text) => {
                DecodedObx::Proposal(ConceptProposal::unmapped(question, text, encounter.id))
            }
            Decoded::Empty => {
                tracing::debug!("not creating null valued observation for concept {question}");
                DecodedObx::Skipped
            }
        })
    }

    fn decode_coded(&self, value: &Field, with_drug: bool) -> Result<Decoded, DecodeFailure> {
        if value.is_empty() {
            return Ok(Decoded::Empty);
        }
        let identifier = value.component(IDENTIFIER).trim();

        if identifier == self.cfg.proposed_concept_identifier() {
            return NonEmptyText::new(value.component(TEXT))
                .map(Decoded::Proposal)
                .map_err(|_| DecodeFailure::EmptyProposalText);
        }

        let concept = identifier
            .parse::<ConceptRef>()
            .map_err(|_| DecodeFailure::InvalidAnswerConceptId(identifier.to_owned()))?;

        let alternate_system = value.component(ALTERNATE_CODING_SYSTEM).trim();
        let alternate_id = value.component(ALTERNATE_IDENTIFIER).trim();

        let drug = if with_drug && alternate_system == self.cfg.drug_coding_system() {
            let drug = alternate_id
                .parse::<DrugRef>()
                .map_err(|_| DecodeFailure::InvalidDrugId(alternate_id.to_owned()))?;
            Some(drug)
        } else {
            None
        };

        let name = if alternate_system == self.cfg.concept_name_coding_system() {
            let name = alternate_id.parse::<ConceptNameRef>().ok();
            if name.is_none() {
                tracing::warn!("ignoring unreadable concept name id '{alternate_id}'");
            }
            name
        } else {
            None
        };

        Ok(Decoded::Value(ObservationValue::Coded {
            concept,
            drug,
            name,
        }))
    }

    fn decode_text(&self, value: &Field) -> Decoded {
        let text = value.encode(self.delimiters);
        if text.trim().is_empty() {
            Decoded::Empty
        } else {
            Decoded::Value(ObservationValue::Text(text))
        }
    }
}

fn decode_numeric(value: &Field) -> Result<Decoded, DecodeFailure> {
    if value.is_empty() {
        return Ok(Decoded::Empty);
    }
    let raw = value.value().trim();
    raw.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .map(|n| Decoded::Value(ObservationValue::Numeric(n)))
        .ok_or_else(|| DecodeFailure::InvalidNumeric(raw.to_owned()))
}

fn decode_date(value: &Field) -> Result<Decoded, DecodeFailure> {
    let raw = value.value();
    match hl7::parse_date(raw) {
        Ok(Some(date)) => Ok(Decoded::Value(ObservationValue::date(date))),
        // A populated field with a blank first component is not an absent date.
        Ok(None) if raw.trim().is_empty() && !value.is_empty() => {
            Err(DecodeFailure::InvalidDate(raw.to_owned()))
        }
        Ok(None) => Ok(Decoded::Empty),
        Err(_) => Err(DecodeFailure::InvalidDate(raw.to_owned())),
    }
}

fn decode_timestamp(value: &Field, default: NaiveDateTime) -> Result<Decoded, DecodeFailure> {
    let raw = value.value();
    match hl7::parse_timestamp(raw) {
        Ok(Some(datetime)) => Ok(Decoded::Value(ObservationValue::Datetime(datetime))),
        Ok(None) => Ok(Decoded::Value(ObservationValue::Datetime(default))),
        Err(_) => Err(DecodeFailure::InvalidTimestamp(raw.to_owned())),
    }
}
