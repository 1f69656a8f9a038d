//! Verity orchestrator - the sequencing layer over the core trio
//!
//! Accepts evaluation requests, clamps their bounds, gates them on
//! declarative constraints, runs the bounded interpreter, and records
//! exactly one ledger entry per request, refusals included. Holds no
//! business logic of its own.

#![deny(unsafe_code)]

mod orchestrator;
mod request;
mod store;

pub use orchestrator::{Orchestrator, OrchestratorError};
pub use request::{EvaluationRequest, EvaluationResponse, RequestedBounds};
pub use store::{InMemoryStore, NullReplicator, PayloadStore, Replicator};
