//! Read-only view over the segments of an ORU^R01 message.

use crate::constants::{NTE_COMMENT, OBX_SUB_ID};
use crate::error::{IngestError, IngestResult};
use crate::observation::ObservationSubId;
use hl7::{Message, Segment};

/// The segments ingestion reads, borrowed from the parsed message.
#[derive(Clone, Debug)]
pub struct OruSegments<'m> {
    pub msh: &'m Segment,
    pub pid: &'m Segment,
    /// First PV1, if any.
    pub pv1: Option<&'m Segment>,
    /// First ORC, if any.
    pub orc: Option<&'m Segment>,
    /// Every OBX in document order.
    pub observations: Vec<ObxSegment<'m>>,
}

/// An OBX together with its order-observation index and trailing NTE segments.
#[derive(Clone, Debug)]
pub struct ObxSegment<'m> {
    /// 0 for OBX segments before any OBR, then 1, 2, ... per OBR.
    pub order: usize,
    pub segment: &'m Segment,
    pub notes: Vec<&'m Segment>,
}

impl<'m> ObxSegment<'m> {
    pub fn sub_id(&self) -> ObservationSubId {
        ObservationSubId::from_raw(self.segment.value(OBX_SUB_ID))
    }

    /// Every repetition of NTE-3 across the trailing notes, space separated. `None` when there
    /// is no text.
    pub fn comment(&self) -> Option<String> {
        let lines: Vec<&str> = self
            .notes
            .iter()
            .filter_map(|nte| nte.field(NTE_COMMENT))
            .flat_map(|field| field.repetitions())
            .map(|repetition| repetition.component(1).trim())
            .filter(|line| !line.is_empty())
            .collect();
        (!lines.is_empty()).then(|| lines.join(" "))
    }
}

impl<'m> OruSegments<'m> {
    /// Extracts the ingestion view from a parsed message.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::MalformedMessage`] when PID is absent. PV1 and ORC absence is
    /// tolerated here and surfaces later as an unresolved reference.
    pub fn from_message(message: &'m Message) -> IngestResult<Self> {
        let msh = message.header();
        let pid = message
            .segment("PID")
            .ok_or(IngestError::MalformedMessage("PID"))?;

        let mut observations: Vec<ObxSegment<'m>> = Vec::new();
        let mut order = 0;
        // Whether the previous segment was an OBX or one of its notes.
        let mut after_obx = false;

        for segment in message.segments().iter().skip(1) {
            match segment.name() {
                "OBR" => {
                    order += 1;
                    after_obx = false;
                }
                "OBX" => {
                    observations.push(ObxSegment {
                        order,
                        segment,
                        notes: Vec::new(),
                    });
                    after_obx = true;
                }
                "NTE" if after_obx => {
                    if let Some(obx) = observations.last_mut() {
                        obx.notes.push(segment);
                    }
                }
                "NTE" => {}
                _ => after_obx = false,
            }
        }

        tracing::debug!(
            "message has {} OBX segments across {} orders",
            observations.len(),
            order
        );

        Ok(Self {
            msh,
            pid,
            pv1: message.segment("PV1"),
            orc: message.segment("ORC"),
            observations,
        })
    }
}
