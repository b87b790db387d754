use std::sync::Arc;
use std::time::{Duration, Instant};

use consilium_models::{
    AgentError, AgentErrorKind, AgentSignal, MarketBriefingDocument, OrchestratorConfig,
};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::ProducerError;
use crate::producer::{ProducerContext, SignalProducer};

/// How one producer call ended.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Signal,
    Timeout,
    ExecutionFailed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AgentRun {
    pub agent_name: String,
    pub outcome: CallOutcome,
    pub elapsed_ms: u64,
}

/// Everything the signal stage produced, sorted by agent name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalCollection {
    pub signals: Vec<AgentSignal>,
    pub errors: Vec<AgentError>,
    pub runs: Vec<AgentRun>,
}

impl SignalCollection {
    pub fn attempted(&self) -> usize {
        self.runs.len()
    }

    /// Sanitizable stage summary for the audit trail.
    pub fn summary(&self, required: usize) -> serde_json::Value {
        serde_json::json!({
            "attempted": self.attempted(),
            "succeeded": self.signals.len(),
            "failed": self.errors.len(),
            "required": required,
            "agents": self.runs,
        })
    }
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("{succeeded} signals succeeded, {required} required")]
    InsufficientSignals {
        succeeded: usize,
        required: usize,
        collection: SignalCollection,
    },

    #[error("cancelled by caller")]
    Cancelled { collection: SignalCollection },
}

enum Settled {
    Signal(AgentSignal),
    Failed(ProducerError),
    TimedOut,
    Cancelled,
}

/// Runs every signal producer concurrently and gates on a minimum success count.
pub struct Orchestrator {
    producers: Vec<Arc<dyn SignalProducer>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(producers: Vec<Arc<dyn SignalProducer>>, config: OrchestratorConfig) -> Self {
        Self { producers, config }
    }

    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    pub fn per_agent_timeout(&self) -> Duration {
        Duration::from_millis(self.config.per_agent_timeout_ms)
    }

    /// Fan out to all producers and collect what settles.
    ///
    /// Each producer gets a child of `cancel`. A producer that overruns the
    /// per-agent timeout has its child token cancelled and its future dropped.
    pub async fn run(
        &self,
        mbd: Arc<MarketBriefingDocument>,
        run_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<SignalCollection, OrchestratorError> {
        let timeout = self.per_agent_timeout();
        let stage_start = Instant::now();
        info!(
            run_id = %run_id,
            market_id = %mbd.market_id,
            producers = self.producers.len(),
            timeout_ms = timeout.as_millis(),
            "Collecting agent signals"
        );

        let mut handles = Vec::with_capacity(self.producers.len());
        for producer in &self.producers {
            let producer = Arc::clone(producer);
            let mbd = Arc::clone(&mbd);
            let child = cancel.child_token();
            let name = producer.name().to_string();

            let handle = tokio::spawn(async move {
                let started = Instant::now();
                let ctx = ProducerContext {
                    run_id,
                    cancel: child.clone(),
                    timeout,
                };
                let settled = tokio::select! {
                    biased;
                    _ = child.cancelled() => Settled::Cancelled,
                    result = tokio::time::timeout(timeout, producer.produce(&mbd, &ctx)) => match result {
                        Ok(Ok(signal)) => Settled::Signal(signal),
                        Ok(Err(ProducerError::Cancelled)) if child.is_cancelled() => Settled::Cancelled,
                        Ok(Err(e)) => Settled::Failed(e),
                        Err(_) => {
                            child.cancel();
                            Settled::TimedOut
                        }
                    },
                };
                (settled, started.elapsed())
            });
            handles.push((name, AbortOnDropHandle::new(handle)));
        }

        let mut collection = SignalCollection::default();
        for (name, handle) in handles {
            let (settled, elapsed) = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!(agent = %name, error = %e, "Agent task panicked");
                    let message = if e.is_panic() {
                        "producer panicked".to_string()
                    } else {
                        format!("producer task aborted: {e}")
                    };
                    (
                        Settled::Failed(ProducerError::Task(message)),
                        stage_start.elapsed(),
                    )
                }
            };
            record(&mut collection, &name, settled, elapsed, timeout);
        }

        collection.signals.sort_by(|a, b| a.agent_name.cmp(&b.agent_name));
        collection.errors.sort_by(|a, b| a.agent_name.cmp(&b.agent_name));
        collection.runs.sort_by(|a, b| a.agent_name.cmp(&b.agent_name));

        if cancel.is_cancelled() {
            warn!(run_id = %run_id, "Signal collection cancelled");
            return Err(OrchestratorError::Cancelled { collection });
        }

        let succeeded = collection.signals.len();
        let required = self.config.min_agents_required;
        info!(
            run_id = %run_id,
            succeeded,
            failed = collection.errors.len(),
            required,
            elapsed_ms = stage_start.elapsed().as_millis(),
            "Agent signals collected"
        );

        if succeeded < required {
            return Err(OrchestratorError::InsufficientSignals {
                succeeded,
                required,
                collection,
            });
        }
        Ok(collection)
    }
}

fn record(
    collection: &mut SignalCollection,
    name: &str,
    settled: Settled,
    elapsed: Duration,
    timeout: Duration,
) {
    let elapsed_ms = elapsed.as_millis() as u64;
    let fail = |collection: &mut SignalCollection, kind: AgentErrorKind, message: String| {
        warn!(agent = %name, kind = ?kind, error = %message, elapsed_ms, "Agent failed");
        collection.errors.push(AgentError {
            agent_name: name.to_string(),
            kind,
            message,
            elapsed_ms,
        });
    };

    let outcome = match settled {
        Settled::Signal(mut signal) => {
            signal.agent_name = name.to_string();
            match signal.validate() {
                Ok(()) => {
                    info!(
                        agent = %name,
                        direction = %signal.direction,
                        fair_probability = signal.fair_probability,
                        confidence = signal.confidence,
                        elapsed_ms,
                        "Agent succeeded"
                    );
                    collection.signals.push(signal);
                    CallOutcome::Signal
                }
                Err(reason) => {
                    fail(
                        collection,
                        AgentErrorKind::ExecutionFailed,
                        ProducerError::InvalidSignal(reason).to_string(),
                    );
                    CallOutcome::ExecutionFailed
                }
            }
        }
        Settled::Failed(e) => {
            fail(collection, AgentErrorKind::ExecutionFailed, e.to_string());
            CallOutcome::ExecutionFailed
        }
        Settled::TimedOut => {
            fail(
                collection,
                AgentErrorKind::Timeout,
                ProducerError::Timeout(timeout.as_millis() as u64).to_string(),
            );
            CallOutcome::Timeout
        }
        Settled::Cancelled => {
            fail(
                collection,
                AgentErrorKind::ExecutionFailed,
                ProducerError::Cancelled.to_string(),
            );
            CallOutcome::Cancelled
        }
    };

    collection.runs.push(AgentRun {
        agent_name: name.to_string(),
        outcome,
        elapsed_ms,
    });
}
