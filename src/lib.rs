#![forbid(unsafe_code)]

//! LabOps — camera-lab triage toolkit.
//!
//! A symptom (for example "dropped frames") drives a deterministic sequence
//! of scenario runs that mutate one configuration knob at a time relative
//! to a known-good baseline, rank competing root-cause hypotheses from the
//! accumulated evidence, decide when to stop, and emit a reproducible
//! engineer handoff bundle.
//!
//! Pipeline: playbook → OAAT variants → scenario runtime (backend + apply
//! bridge + metrics + events) → experiment state → stop decision → per-run
//! bundles + cross-run engineer packet.

pub mod agent;
pub mod artifacts;
pub mod backends;
pub mod core;
pub mod events;
pub mod metrics;
pub mod prelude;
pub mod run;
pub mod scenario;
pub mod soak;
