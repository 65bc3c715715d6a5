//! Symptom playbook registry.
//!
//! A playbook is an ordered list of knobs to try for a specific symptom.
//! Knob order encodes a descending prior-belief ranking and is part of the
//! contract; earlier knobs are tested first.

use crate::core::errors::{LabOpsError, Result};

/// One playbook knob with its human rationale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybookKnob {
    pub name: &'static str,
    pub rationale: &'static str,
}

/// A symptom playbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playbook {
    pub id: &'static str,
    pub symptom: &'static str,
    pub objective: &'static str,
    pub knobs: Vec<PlaybookKnob>,
}

/// Normalizes a symptom string: lowercase, alphanumerics kept, runs of
/// space/underscore/dash collapse to one `_`, leading/trailing `_` removed.
#[must_use]
pub fn normalize_symptom(raw: &str) -> String {
    let mut normalized = String::with_capacity(raw.len());
    let mut previous_was_separator = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            normalized.push(ch.to_ascii_lowercase());
            previous_was_separator = false;
            continue;
        }
        let is_separator = matches!(ch, ' ' | '_' | '-');
        if is_separator && !normalized.is_empty() && !previous_was_separator {
            normalized.push('_');
            previous_was_separator = true;
        }
    }
    while normalized.ends_with('_') {
        normalized.pop();
    }
    normalized
}

fn dropped_frames_playbook() -> Playbook {
    Playbook {
        id: "dropped_frames_oaat_v1",
        symptom: "dropped_frames",
        objective:
            "Isolate which single streaming/network knob causes frame loss relative to baseline.",
        // Order is deliberate: network-latency stress first, then
        // camera-side rate/ROI pressure, then explicit transport
        // disorder/loss knobs.
        knobs: vec![
            PlaybookKnob {
                name: "packet_delay_ms",
                rationale: "Test sensitivity to transport latency spikes.",
            },
            PlaybookKnob {
                name: "fps",
                rationale: "Lower/raise frame cadence to separate throughput vs latency issues.",
            },
            PlaybookKnob {
                name: "roi_enabled",
                rationale: "Check whether ROI path changes bandwidth or processing load.",
            },
            PlaybookKnob {
                name: "reorder_percent",
                rationale: "Test sensitivity to out-of-order packet delivery.",
            },
            PlaybookKnob {
                name: "loss_percent",
                rationale: "Measure tolerance to packet loss under controlled impairment.",
            },
        ],
    }
}

/// Selects the playbook for a symptom (synonyms included).
pub fn select_playbook_for_symptom(symptom_input: &str) -> Result<Playbook> {
    let normalized = normalize_symptom(symptom_input);
    if normalized.is_empty() {
        return Err(LabOpsError::Usage {
            details: "symptom input cannot be empty".into(),
        });
    }
    match normalized.as_str() {
        "dropped_frames" | "frame_drops" | "drops" => Ok(dropped_frames_playbook()),
        _ => Err(LabOpsError::Usage {
            details: format!(
                "no playbook registered for symptom '{symptom_input}' (normalized='{normalized}'). available symptoms: dropped_frames"
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_collapses_separators_and_case() {
        assert_eq!(normalize_symptom("Dropped Frames"), "dropped_frames");
        assert_eq!(normalize_symptom("  --dropped--frames__ "), "dropped_frames");
        assert_eq!(normalize_symptom("FRAME-drops"), "frame_drops");
        assert_eq!(normalize_symptom("???"), "");
    }

    #[test]
    fn dropped_frames_knob_order_is_fixed() {
        let playbook = select_playbook_for_symptom("dropped frames").unwrap();
        assert_eq!(playbook.id, "dropped_frames_oaat_v1");
        let names: Vec<&str> = playbook.knobs.iter().map(|k| k.name).collect();
        assert_eq!(
            names,
            vec![
                "packet_delay_ms",
                "fps",
                "roi_enabled",
                "reorder_percent",
                "loss_percent"
            ]
        );
    }

    #[test]
    fn synonyms_resolve_to_the_same_playbook() {
        for symptom in ["dropped_frames", "frame_drops", "drops", "Drops"] {
            assert_eq!(
                select_playbook_for_symptom(symptom).unwrap().id,
                "dropped_frames_oaat_v1"
            );
        }
    }

    #[test]
    fn unknown_symptom_lists_available_ones() {
        let err = select_playbook_for_symptom("purple haze").unwrap_err();
        assert!(err.to_string().contains("available symptoms: dropped_frames"));
    }
}
