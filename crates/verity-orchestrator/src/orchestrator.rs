//! The request pipeline
//!
//! `process` runs one request through the fixed sequence: clamp bounds,
//! validate, gate on constraints, evaluate under budget, fingerprint, and
//! append exactly one ledger entry on every path, refusals and failures
//! included. The interpreter runs inside `spawn_blocking` so its Rc-based
//! environment tree lives and dies on one thread.

use std::time::Instant;

use thiserror::Error;
use tracing::{info, warn};

use verity_constraints::{evaluate_constraint, validate, Outcome};
use verity_crypto::{hash_bytes, hash_parts, to_hex, SigningIdentity};
use verity_interpreter::{evaluate, parse_expr, Environment, Usage};
use verity_ledger::{Certificate, ChainVerification, EntryType, Ledger, LedgerError};

use crate::request::{EvaluationRequest, EvaluationResponse};
use crate::store::{InMemoryStore, NullReplicator, PayloadStore, Replicator};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Failed to canonicalize request: {0}")]
    Canonicalize(#[from] serde_json::Error),

    #[error("Evaluation task did not complete")]
    TaskFailed,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// What came back from the blocking interpreter task.
struct Run {
    result: Result<serde_json::Value, verity_interpreter::EvalError>,
    usage: Usage,
    /// False when the expression failed structural parsing and no budget
    /// was consumed.
    parsed: bool,
}

/// Sequences constraints, interpreter and ledger for one deployment.
pub struct Orchestrator {
    ledger: Ledger,
    issuer: SigningIdentity,
    store: Box<dyn PayloadStore>,
    replicator: Box<dyn Replicator>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    /// Fresh orchestrator with a generated issuer identity and in-memory
    /// collaborators.
    pub fn new() -> Self {
        Self {
            ledger: Ledger::new(),
            issuer: SigningIdentity::generate(),
            store: Box::new(InMemoryStore::new()),
            replicator: Box::new(NullReplicator),
        }
    }

    pub fn with_store(mut self, store: Box<dyn PayloadStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_replicator(mut self, replicator: Box<dyn Replicator>) -> Self {
        self.replicator = replicator;
        self
    }

    pub fn issuer_id(&self) -> String {
        self.issuer.issuer_id()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn verify_chain(&self) -> ChainVerification {
        self.ledger.verify_chain()
    }

    /// Signed certificate for a recorded entry, issued under this
    /// orchestrator's identity.
    pub fn certificate(&self, index: u64) -> Result<Certificate, LedgerError> {
        self.ledger.certificate(index, &self.issuer)
    }

    /// Full payload behind a ledger entry's `payload_hash`.
    pub fn payload(&self, payload_hash: &str) -> Option<serde_json::Value> {
        self.store.retrieve(payload_hash, &self.issuer_id())
    }

    /// Run one request end to end. Refusals and evaluation failures are
    /// responses, not errors; `Err` is reserved for host faults.
    pub async fn process(
        &self,
        request: EvaluationRequest,
    ) -> Result<EvaluationResponse, OrchestratorError> {
        let started = Instant::now();
        let budget = request.bounds.clone().unwrap_or_default().to_budget();

        // Canonical form: serde_json orders map keys, so two requests with
        // the same content fingerprint identically.
        let request_json = serde_json::to_value(&request)?;
        let canonical_request = request_json.to_string();
        let payload_hash = to_hex(&hash_bytes(canonical_request.as_bytes()));

        // Structural check before any gating or budget is spent. The parsed
        // tree is rebuilt inside the blocking task; it cannot cross threads.
        if let Err(err) = parse_expr(&request.expression).map(drop) {
            return self.finish(
                EntryType::Rejection,
                &request_json,
                payload_hash,
                serde_json::Value::Null,
                Some(err.code()),
                Usage::default(),
                started,
            );
        }

        if let Some(constraint) = &request.constraints {
            if let Err(err) = validate(constraint) {
                warn!(%err, "constraint rejected by static validation");
                return self.finish(
                    EntryType::Rejection,
                    &request_json,
                    payload_hash,
                    serde_json::Value::Null,
                    Some("invalid_constraint".into()),
                    Usage::default(),
                    started,
                );
            }

            let snapshot = request.snapshot.clone().unwrap_or_default();
            let verdict = evaluate_constraint(constraint, &snapshot);
            match verdict.outcome {
                Outcome::Pass => {}
                Outcome::Fail => {
                    return self.finish(
                        EntryType::Rejection,
                        &request_json,
                        payload_hash,
                        serde_json::Value::Null,
                        Some("constraint_failed".into()),
                        Usage::default(),
                        started,
                    );
                }
                Outcome::Undefined => {
                    return self.finish(
                        EntryType::Rejection,
                        &request_json,
                        payload_hash,
                        serde_json::Value::Null,
                        Some("constraint_undefined".into()),
                        Usage::default(),
                        started,
                    );
                }
            }
        }

        // Parse and evaluate on a blocking thread: the environment tree is
        // Rc-based and must not cross threads.
        let expression = request.expression.clone();
        let run = tokio::task::spawn_blocking(move || match parse_expr(&expression) {
            Ok(expr) => {
                let (result, usage) = evaluate(&expr, Environment::root(), &budget);
                Run {
                    result: result.map(|value| value.to_json()),
                    usage,
                    parsed: true,
                }
            }
            Err(err) => Run {
                result: Err(err),
                usage: Usage::default(),
                parsed: false,
            },
        })
        .await
        .map_err(|_| OrchestratorError::TaskFailed)?;

        let entry_type = if run.parsed {
            EntryType::Evaluation
        } else {
            EntryType::Rejection
        };
        let (result, reason) = match run.result {
            Ok(value) => (value, None),
            Err(err) => (serde_json::Value::Null, Some(err.code())),
        };
        self.finish(
            entry_type,
            &request_json,
            payload_hash,
            result,
            reason,
            run.usage,
            started,
        )
    }

    /// The single exit point: fingerprint, one ledger append, payload
    /// store, replication, response.
    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        entry_type: EntryType,
        request_json: &serde_json::Value,
        payload_hash: String,
        result: serde_json::Value,
        reason: Option<String>,
        usage: Usage,
        started: Instant,
    ) -> Result<EvaluationResponse, OrchestratorError> {
        let canonical_request = request_json.to_string();
        let canonical_result = result.to_string();
        let fingerprint = to_hex(&hash_parts(&[
            canonical_request.as_bytes(),
            canonical_result.as_bytes(),
        ]));

        let summary = reason.clone().unwrap_or_else(|| "ok".into());
        self.store
            .store(&payload_hash, request_json, &self.issuer_id());
        let entry = self.ledger.append(entry_type, payload_hash, summary);
        if !self.replicator.submit(&entry) {
            // Local ledger is authoritative; an unacked replica is an
            // operational concern, not a failure of this request.
            warn!(index = entry.index, "replica did not acknowledge entry");
        }

        let verified = reason.is_none();
        info!(
            index = entry.index,
            verified,
            reason = reason.as_deref().unwrap_or("ok"),
            %fingerprint,
            "request recorded"
        );
        Ok(EvaluationResponse {
            result,
            verified,
            reason,
            operations_used: usage.operations,
            iterations_used: usage.iterations,
            recursion_depth_used: usage.peak_recursion,
            elapsed_ms: started.elapsed().as_millis() as u64,
            fingerprint,
            ledger_index: entry.index,
            merkle_root: self.ledger.merkle_root(),
        })
    }
}
