//! HL7v2 wire boundary for the ORU ingestion workspace.
//!
//! This crate provides the **message tree** the ingestion core reads from:
//! - splitting pipe-delimited text into segments, fields, repetitions, components and
//!   sub-components using the delimiters declared in MSH-1 and MSH-2
//! - re-encoding a segment exactly as it was received, for error reporting
//! - lenient parsing of the HL7 `TS` and `DT` datatypes
//!
//! Escape sequences (`\F\`, `\S\`, ...) are kept verbatim in leaf values. Nothing here knows
//! about ORU^R01 semantics; that belongs to `oru-core`.

pub mod message;
pub mod timestamp;

pub use message::{Component, Delimiters, Field, Message, MessageType, Repetition, Segment};
pub use timestamp::{parse_date, parse_timestamp};

/// Errors returned by the `hl7` wire crate.
#[derive(Debug, thiserror::Error)]
pub enum Hl7Error {
    #[error("message contains no segments")]
    EmptyMessage,

    #[error("first segment must be MSH, found '{0}'")]
    MissingHeader(String),

    #[error("invalid encoding characters in MSH: '{0}'")]
    InvalidEncodingCharacters(String),

    #[error("invalid segment name: '{0}'")]
    InvalidSegmentName(String),

    #[error("invalid HL7 timestamp: '{0}'")]
    InvalidTimestamp(String),

    #[error("invalid HL7 date: '{0}'")]
    InvalidDate(String),
}

/// Type alias for Results that can fail with an [`Hl7Error`].
pub type Hl7Result<T> = Result<T, Hl7Error>;
