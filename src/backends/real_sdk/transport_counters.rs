//! Best-effort transport-counter collection from backend config dumps.
//!
//! Different SDKs expose different node names for the same transport
//! counters, so collection goes through alias sets and produces one stable,
//! backend-agnostic snapshot for `run.json`. Missing or non-numeric values
//! are "not available", never a run failure.

#![allow(missing_docs)]

use crate::backends::BackendConfig;

/// One normalized counter reading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportCounterReading {
    pub available: bool,
    pub value: u64,
    pub source_key: String,
}

/// Snapshot of the three transport counters the triage flow cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportCountersSnapshot {
    pub resends: TransportCounterReading,
    pub packet_errors: TransportCounterReading,
    pub dropped_packets: TransportCounterReading,
}

const RESEND_ALIASES: &[&str] = &[
    "StatisticResendPacketCount",
    "GevStreamResendPacketCount",
    "resend_packets",
    "resends",
];
const PACKET_ERROR_ALIASES: &[&str] = &[
    "StatisticPacketErrorCount",
    "GevStreamPacketErrorCount",
    "packet_errors",
];
const DROPPED_PACKET_ALIASES: &[&str] = &[
    "StatisticDroppedPacketCount",
    "GevStreamDroppedPacketCount",
    "dropped_packets",
];

fn collect_one(dump: &BackendConfig, aliases: &[&str]) -> TransportCounterReading {
    for alias in aliases {
        if let Some(raw) = dump.get(*alias) {
            if let Ok(value) = raw.trim().parse::<u64>() {
                return TransportCounterReading {
                    available: true,
                    value,
                    source_key: (*alias).to_string(),
                };
            }
        }
    }
    TransportCounterReading::default()
}

/// Collects transport counters from a backend dump using the alias sets.
#[must_use]
pub fn collect_transport_counters(dump: &BackendConfig) -> TransportCountersSnapshot {
    TransportCountersSnapshot {
        resends: collect_one(dump, RESEND_ALIASES),
        packet_errors: collect_one(dump, PACKET_ERROR_ALIASES),
        dropped_packets: collect_one(dump, DROPPED_PACKET_ALIASES),
    }
}
