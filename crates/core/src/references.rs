//! Resolution of wire identifiers into internal record references.
//!
//! Every reference except the form is mandatory. A reference whose field is absent or empty is
//! unresolved without asking the lookup service.

use crate::constants::{
    MSH_PROFILE_IDENTIFIER, ORC_ENTERED_BY, PV1_ASSIGNED_LOCATION, PV1_ATTENDING_DOCTOR,
};
use crate::error::{IngestError, IngestResult, ReferenceKind};
use crate::segments::OruSegments;
use crate::store::{Form, ReferenceLookup};
use hl7::{Field, Segment};
use oru_types::{LocationRef, PatientRef, ProviderRef, UserRef};

/// Everything an encounter and its observations point at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedReferences {
    pub patient: PatientRef,
    pub provider: ProviderRef,
    pub location: LocationRef,
    pub entering_user: UserRef,
    pub form: Option<Form>,
}

pub struct ReferenceResolver<'a> {
    lookup: &'a dyn ReferenceLookup,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(lookup: &'a dyn ReferenceLookup) -> Self {
        Self { lookup }
    }

    /// Resolves every reference in a fixed order: patient, location, provider, entering user,
    /// form. The first failure wins.
    pub fn resolve_all(&self, segments: &OruSegments<'_>) -> IngestResult<ResolvedReferences> {
        let patient = self.resolve_patient(segments.pid)?;
        let location =
            self.resolve_location(segments.pv1.and_then(|s| s.field(PV1_ASSIGNED_LOCATION)))?;
        let provider =
            self.resolve_provider(segments.pv1.and_then(|s| s.field(PV1_ATTENDING_DOCTOR)))?;
        let entering_user =
            self.resolve_entering_user(segments.orc.and_then(|s| s.field(ORC_ENTERED_BY)))?;
        let form = self.resolve_form(segments.msh)?;

        tracing::debug!(
            "resolved patient {patient}, location {location}, provider {provider}, \
             entering user {entering_user}"
        );

        Ok(ResolvedReferences {
            patient,
            provider,
            location,
            entering_user,
            form,
        })
    }

    pub fn resolve_patient(&self, pid: &Segment) -> IngestResult<PatientRef> {
        self.lookup
            .resolve_patient_id(pid)?
            .ok_or(IngestError::UnresolvedReference(ReferenceKind::Patient))
    }

    /// PV1-7. Only the first repetition is offered to the lookup.
    pub fn resolve_provider(&self, attending: Option<&Field>) -> IngestResult<ProviderRef> {
        let kind = ReferenceKind::Provider;
        let field = present(attending, kind)?.first_repetition();
        self.lookup
            .resolve_user_id(&field)?
            .map(ProviderRef::from)
            .ok_or(IngestError::UnresolvedReference(kind))
    }

    /// PV1-3.
    pub fn resolve_location(&self, assigned: Option<&Field>) -> IngestResult<LocationRef> {
        let kind = ReferenceKind::Location;
        self.lookup
            .resolve_location_id(present(assigned, kind)?)?
            .ok_or(IngestError::UnresolvedReference(kind))
    }

    /// ORC-10.
    pub fn resolve_entering_user(&self, entered_by: Option<&Field>) -> IngestResult<UserRef> {
        let kind = ReferenceKind::EnteringUser;
        self.lookup
            .resolve_user_id(present(entered_by, kind)?)?
            .ok_or(IngestError::UnresolvedReference(kind))
    }

    /// MSH-21.1. Absent means "no form"; present must be a positive integer the lookup knows.
    pub fn resolve_form(&self, msh: &Segment) -> IngestResult<Option<Form>> {
        let raw = msh.component(MSH_PROFILE_IDENTIFIER, 1).trim();
        if raw.is_empty() {
            return Ok(None);
        }

        let form_id = raw
            .parse::<i32>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| IngestError::InvalidFormReference(raw.to_owned()))?;

        self.lookup
            .lookup_form(form_id)?
            .map(Some)
            .ok_or(IngestError::UnresolvedReference(ReferenceKind::Form))
    }
}

fn present(field: Option<&Field>, kind: ReferenceKind) -> IngestResult<&Field> {
    field
        .filter(|f| !f.is_empty())
        .ok_or(IngestError::UnresolvedReference(kind))
}
