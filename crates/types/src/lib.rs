//! Shared primitive types for the ORU ingestion workspace.
//!
//! Two kinds of value live here:
//! - [`NonEmptyText`], validated free text used wherever a blank string would be a data error
//! - record reference newtypes (`PatientRef`, `ConceptRef`, ...) that carry only the internal
//!   identifier of an entity owned by the health-record store

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("text cannot be empty")]
    Empty,
}

/// Free text guaranteed to contain at least one non-whitespace character.
///
/// Leading and trailing whitespace is removed on construction, so two inputs that differ only
/// in surrounding padding compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Trims `input` and wraps it, or returns [`TextError::Empty`] when nothing is left.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        match input.as_ref().trim() {
            "" => Err(TextError::Empty),
            trimmed => Ok(Self(trimmed.to_owned())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for NonEmptyText {
    type Error = TextError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NonEmptyText> for String {
    fn from(value: NonEmptyText) -> Self {
        value.0
    }
}

impl fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

macro_rules! record_ref {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i32);

        impl $name {
            pub fn id(self) -> i32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            /// Parses the identifier exactly as sent; surrounding whitespace is not tolerated.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }
    };
}

record_ref!(
    /// A patient (the person every observation belongs to).
    PatientRef
);
record_ref!(
    /// A system user, as resolved from an XCN field.
    UserRef
);
record_ref!(
    /// The user acting as the encounter's attending provider.
    ProviderRef
);
record_ref!(
    /// A care location.
    LocationRef
);
record_ref!(
    /// A data-entry form, carried in MSH-21.
    FormRef
);
record_ref!(
    /// An encounter type, only ever taken from a resolved form.
    EncounterTypeRef
);
record_ref!(
    /// A persisted encounter.
    EncounterRef
);
record_ref!(
    /// A concept, used both as an observation question and as a coded answer.
    ConceptRef
);
record_ref!(
    /// A specific name of a concept.
    ConceptNameRef
);
record_ref!(
    /// A drug, attached to coded answers from the local drug coding system.
    DrugRef
);

impl From<UserRef> for ProviderRef {
    fn from(user: UserRef) -> Self {
        Self(user.0)
    }
}
