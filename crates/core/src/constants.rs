//! Constants used throughout the ORU core crate.
//!
//! Wire positions are 1-based HL7 field numbers, so `PV1_ADMIT_DATETIME` is PV1-44.

/// Coded-answer identifier that marks a proposed (not yet mapped) concept.
pub const PROPOSED_CONCEPT_IDENTIFIER: &str = "PROPOSED";

/// Alternate coding system naming a local drug identifier on a CWE answer.
pub const LOCAL_DRUG_CODING_SYSTEM: &str = "99RX";

/// Alternate coding system naming a local concept-name identifier on a coded answer.
pub const LOCAL_CONCEPT_NAME_CODING_SYSTEM: &str = "99NAM";

/// MSH-9.1 accepted by the ingestion service.
pub const ORU_MESSAGE_CODE: &str = "ORU";

/// MSH-9.2 accepted by the ingestion service.
pub const ORU_TRIGGER_EVENT: &str = "R01";

/// Environment override for [`PROPOSED_CONCEPT_IDENTIFIER`].
pub const ENV_PROPOSED_CONCEPT_IDENTIFIER: &str = "ORU_PROPOSED_CONCEPT_IDENTIFIER";

/// Environment override for [`LOCAL_DRUG_CODING_SYSTEM`].
pub const ENV_DRUG_CODING_SYSTEM: &str = "ORU_DRUG_CODING_SYSTEM";

/// Environment override for [`LOCAL_CONCEPT_NAME_CODING_SYSTEM`].
pub const ENV_CONCEPT_NAME_CODING_SYSTEM: &str = "ORU_CONCEPT_NAME_CODING_SYSTEM";

pub(crate) const MSH_PROFILE_IDENTIFIER: usize = 21;

pub(crate) const PV1_ASSIGNED_LOCATION: usize = 3;
pub(crate) const PV1_ATTENDING_DOCTOR: usize = 7;
pub(crate) const PV1_ADMIT_DATETIME: usize = 44;

pub(crate) const ORC_DATETIME_OF_TRANSACTION: usize = 9;
pub(crate) const ORC_ENTERED_BY: usize = 10;

pub(crate) const OBX_VALUE_TYPE: usize = 2;
pub(crate) const OBX_OBSERVATION_IDENTIFIER: usize = 3;
pub(crate) const OBX_SUB_ID: usize = 4;
pub(crate) const OBX_VALUE: usize = 5;
pub(crate) const OBX_DATETIME: usize = 14;

pub(crate) const NTE_COMMENT: usize = 3;
