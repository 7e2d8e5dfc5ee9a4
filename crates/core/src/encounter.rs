//! Encounter assembly.

use crate::error::{IngestError, IngestResult};
use crate::references::ResolvedReferences;
use chrono::NaiveDateTime;
use oru_types::{
    EncounterRef, EncounterTypeRef, FormRef, LocationRef, PatientRef, ProviderRef, UserRef,
};
use serde::Serialize;

/// An encounter built from PV1, ORC and MSH references.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Encounter {
    /// PV1-44.
    pub encounter_datetime: NaiveDateTime,
    pub patient: PatientRef,
    pub provider: ProviderRef,
    pub location: LocationRef,
    pub form: Option<FormRef>,
    /// Taken only from the form.
    pub encounter_type: Option<EncounterTypeRef>,
    /// The entering user (ORC-10).
    pub creator: UserRef,
    /// ORC-9, else the time the message was received.
    pub date_created: NaiveDateTime,
}

impl Encounter {
    /// Builds an unpersisted encounter.
    ///
    /// # Arguments
    ///
    /// * `refs` - Resolved references for the message.
    /// * `admit_raw` - PV1-44, the encounter datetime.
    /// * `entered_raw` - ORC-9, the date/time of transaction.
    /// * `received_at` - Ingestion clock reading used when ORC-9 is absent or unreadable.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::InvalidTimestamp`] if PV1-44 is absent, has a zero year or is
    /// malformed.
    pub fn assemble(
        refs: &ResolvedReferences,
        admit_raw: &str,
        entered_raw: &str,
        received_at: NaiveDateTime,
    ) -> IngestResult<Self> {
        let invalid_admit = || IngestError::InvalidTimestamp {
            field: "PV1-44",
            value: admit_raw.to_owned(),
        };
        let encounter_datetime = hl7::parse_timestamp(admit_raw)
            .map_err(|_| invalid_admit())?
            .ok_or_else(invalid_admit)?;

        let date_created = match hl7::parse_timestamp(entered_raw) {
            Ok(Some(entered)) => entered,
            Ok(None) => received_at,
            Err(e) => {
                tracing::warn!("ignoring ORC-9 date/time of transaction: {e}");
                received_at
            }
        };

        Ok(Self {
            encounter_datetime,
            patient: refs.patient,
            provider: refs.provider,
            location: refs.location,
            form: refs.form.map(|f| f.id),
            encounter_type: refs.form.and_then(|f| f.encounter_type),
            creator: refs.entering_user,
            date_created,
        })
    }
}

/// An encounter together with the identity the store gave it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PersistedEncounter {
    pub id: EncounterRef,
    #[serde(flatten)]
    pub encounter: Encounter,
}
