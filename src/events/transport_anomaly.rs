//! Transport anomaly heuristics over collected counter snapshots.
//!
//! Thresholds are deliberately coarse: the goal is to surface "look here
//! first" signals in summaries and events, not to classify faults.

#![allow(missing_docs)]

use crate::backends::real_sdk::transport_counters::{
    TransportCounterReading, TransportCountersSnapshot,
};

const RESEND_SPIKE_THRESHOLD: u64 = 50;
const PACKET_ERROR_THRESHOLD: u64 = 1;
const DROPPED_PACKET_THRESHOLD: u64 = 1;

/// One triggered anomaly heuristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportAnomalyFinding {
    pub heuristic_id: String,
    pub counter_name: String,
    pub observed_value: u64,
    pub threshold: u64,
    pub summary: String,
}

fn maybe_finding(
    findings: &mut Vec<TransportAnomalyFinding>,
    heuristic_id: &str,
    counter_name: &str,
    reading: &TransportCounterReading,
    threshold: u64,
    summary_prefix: &str,
) {
    if !reading.available || reading.value < threshold {
        return;
    }
    findings.push(TransportAnomalyFinding {
        heuristic_id: heuristic_id.to_string(),
        counter_name: counter_name.to_string(),
        observed_value: reading.value,
        threshold,
        summary: format!(
            "{summary_prefix} counter {} exceeded threshold {threshold}.",
            reading.value
        ),
    });
}

/// Evaluates all heuristics over a counter snapshot. Order is fixed so
/// summary and event output stay predictable run-to-run.
#[must_use]
pub fn detect_transport_anomalies(
    counters: &TransportCountersSnapshot,
) -> Vec<TransportAnomalyFinding> {
    let mut findings = Vec::with_capacity(3);
    maybe_finding(
        &mut findings,
        "resend_spike_threshold",
        "resends",
        &counters.resends,
        RESEND_SPIKE_THRESHOLD,
        "Transport anomaly: resend spike",
    );
    maybe_finding(
        &mut findings,
        "packet_error_threshold",
        "packet_errors",
        &counters.packet_errors,
        PACKET_ERROR_THRESHOLD,
        "Transport anomaly: packet errors",
    );
    maybe_finding(
        &mut findings,
        "dropped_packet_threshold",
        "dropped_packets",
        &counters.dropped_packets,
        DROPPED_PACKET_THRESHOLD,
        "Transport anomaly: dropped packets",
    );
    findings
}
