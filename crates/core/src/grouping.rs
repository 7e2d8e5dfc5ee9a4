//! Grouping of observations that share an OBX-4 sub-id.

use crate::observation::{Observation, ObservationItem, ObservationSubId};

/// Groups observations by sub-id.
///
/// Items come out in the order their sub-id was first seen. A sub-id with a single member, and
/// every ungrouped observation, becomes a standalone item.
pub fn group_observations(
    observations: Vec<(ObservationSubId, Observation)>,
) -> Vec<ObservationItem> {
    let mut slots: Vec<(Option<ObservationSubId>, Vec<Observation>)> = Vec::new();

    for (sub_id, observation) in observations {
        if sub_id.is_ungrouped() {
            slots.push((None, vec![observation]));
            continue;
        }
        match slots
            .iter_mut()
            .find(|(key, _)| key.as_ref() == Some(&sub_id))
        {
            Some((_, members)) => members.push(observation),
            None => slots.push((Some(sub_id), vec![observation])),
        }
    }

    slots
        .into_iter()
        .filter_map(|(sub_id, mut members)| match (sub_id, members.len()) {
            (Some(sub_id), n) if n > 1 => Some(ObservationItem::Group { sub_id, members }),
            _ => members
                .pop()
                .map(|observation| ObservationItem::Standalone { observation }),
        })
        .collect()
}
