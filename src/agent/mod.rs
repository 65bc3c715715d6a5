//! Triage agent: playbooks, OAAT variant generation, experiment state,
//! stop decisions, hypothesis ranking, and the engineer packet.

pub mod packet;
pub mod playbook;
pub mod ranker;
pub mod state;
pub mod stop;
pub mod triage;
pub mod variants;
