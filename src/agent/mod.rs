//! Main orchestrator - implements the agent loop
//!
//! OBSERVE → REASON → ACT
//!
//! One cycle per inbound event. OBSERVE normalizes and records the event,
//! REASON evaluates the ledger and selects at most one policy, ACT hands
//! the directive to the delivery collaborator. Terminal states: FAILED,
//! NONE-ACT, DISPATCHED.

use crate::audit::DispatchLog;
use crate::categorizer::Categorizer;
use crate::delivery::{DeliveryChannel, DispatchAck};
use crate::error::GuardianError;
use crate::eval::{EvalThresholds, EvaluationEngine};
use crate::ingest::{EventIngestor, IngestOutcome};
use crate::models::{
    CycleOutcome, CycleReport, Evaluation, InboundEvent, NewGoal, Transaction, Verdict,
};
use crate::parser::GoalParser;
use crate::policy::{DedupLedger, PolicyContext, PolicyRegistry};
use crate::store::GoalStore;
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-user mutual exclusion around the append-and-evaluate sequence.
///
/// Ledger append order for one user must reflect arrival order; across
/// users there is no shared lock.
struct UserLocks {
    inner: RwLock<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl UserLocks {
    fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    async fn acquire(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.write().await;
            locks
                .entry(user_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Main orchestrator that coordinates the decision cycle
pub struct Orchestrator {
    store: Arc<dyn GoalStore>,
    ingestor: EventIngestor,
    evaluator: EvaluationEngine,
    registry: PolicyRegistry,
    dedup: DedupLedger,
    delivery: Arc<dyn DeliveryChannel>,
    dispatch_log: DispatchLog,
    user_locks: UserLocks,
    /// Previous evaluation per user, for transition-sensitive policies.
    last_evaluations: RwLock<HashMap<Uuid, Evaluation>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn GoalStore>,
        categorizer: Arc<dyn Categorizer>,
        parser: Arc<dyn GoalParser>,
        registry: PolicyRegistry,
        delivery: Arc<dyn DeliveryChannel>,
        thresholds: EvalThresholds,
    ) -> Self {
        Self {
            ingestor: EventIngestor::new(store.clone(), categorizer, parser),
            evaluator: EvaluationEngine::new(store.clone(), thresholds),
            store,
            registry,
            dedup: DedupLedger::new(),
            delivery,
            dispatch_log: DispatchLog::new(),
            user_locks: UserLocks::new(),
            last_evaluations: RwLock::new(HashMap::new()),
        }
    }

    pub fn dispatch_log(&self) -> &DispatchLog {
        &self.dispatch_log
    }

    /// Run one full cycle for an inbound event.
    pub async fn run_cycle(&self, event: InboundEvent) -> Result<CycleReport> {
        let user_id = event.user_id();
        let at = event.occurred_at();
        let _guard = self.user_locks.acquire(user_id).await;

        info!(
            user_id = ?user_id,
            idempotency_key = %event.idempotency_key(),
            "Cycle: OBSERVE"
        );

        // === OBSERVE ===
        let observed = match self.ingestor.ingest(&event).await {
            Ok(outcome) => outcome,
            Err(e @ GuardianError::UnparsableGoal(_)) => {
                // Logged, no side effects beyond the log; the clarification
                // request is the delivery side's responsibility.
                warn!(user_id = ?user_id, error = %e, "Cycle failed during OBSERVE");
                return Ok(CycleReport {
                    verdict: Verdict::None,
                    directive_issued: false,
                    outcome: CycleOutcome::Failed,
                    directive_id: None,
                    evaluation: None,
                });
            }
            // Validation and setup errors surface synchronously to the caller.
            Err(e) => return Err(e),
        };

        let trigger = match &observed {
            IngestOutcome::Recorded(txn) => Some(txn.clone()),
            IngestOutcome::GoalSet(_) => None,
            IngestOutcome::Duplicate => {
                // Idempotent no-op: report the current verdict without
                // re-applying any state.
                let evaluation = self.evaluator.evaluate(user_id, at).await?;
                return Ok(none_act(evaluation));
            }
        };

        self.reason_and_act(user_id, at, trigger.as_ref()).await
    }

    /// Structured declare-or-update-goal entry point; shares the reasoning
    /// path with event cycles.
    pub async fn declare_goal(
        &self,
        user_id: Uuid,
        goal: NewGoal,
        at: DateTime<Utc>,
    ) -> Result<CycleReport> {
        let _guard = self.user_locks.acquire(user_id).await;
        self.store.set_goal(user_id, goal).await?;
        self.reason_and_act(user_id, at, None).await
    }

    // === REASON + ACT ===
    async fn reason_and_act(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
        trigger: Option<&Transaction>,
    ) -> Result<CycleReport> {
        let evaluation = self.evaluator.evaluate(user_id, at).await?;

        let previous = {
            let mut cache = self.last_evaluations.write().await;
            cache.insert(user_id, evaluation.clone())
        };

        if evaluation.verdict == Verdict::None {
            return Ok(none_act(evaluation));
        }

        let Some(goal) = self.store.active_goal(user_id, at).await? else {
            return Ok(none_act(evaluation));
        };

        let ctx = PolicyContext {
            user_id,
            goal: &goal,
            evaluation: &evaluation,
            previous: previous.as_ref(),
            trigger,
            at,
        };

        let Some(directive) = self.registry.select(&ctx) else {
            debug!(user_id = ?user_id, verdict = %evaluation.verdict, "No policy claimed the verdict");
            return Ok(none_act(evaluation));
        };

        let now = Utc::now();
        if self.dedup.seen(&directive.dedup_key, now).await {
            debug!(
                user_id = ?user_id,
                dedup_key = %directive.dedup_key,
                "Directive suppressed by dedup window"
            );
            return Ok(none_act(evaluation));
        }

        // === ACT ===
        match self.delivery.dispatch(&directive).await? {
            DispatchAck::Accepted => {
                // The dedup key is recorded only after acceptance, so a
                // transient acceptance failure never burns the key.
                self.dedup.record(&directive.dedup_key, now).await;

                let directive = Arc::new(directive);
                self.dispatch_log
                    .record(directive.clone(), evaluation.clone(), CycleOutcome::Dispatched)
                    .await?;

                info!(
                    user_id = ?user_id,
                    policy = %directive.policy,
                    verdict = %evaluation.verdict,
                    "Cycle: DISPATCHED"
                );

                Ok(CycleReport {
                    verdict: evaluation.verdict,
                    directive_issued: true,
                    outcome: CycleOutcome::Dispatched,
                    directive_id: Some(directive.directive_id),
                    evaluation: Some(evaluation),
                })
            }
            DispatchAck::Rejected { reason } => {
                warn!(
                    user_id = ?user_id,
                    policy = %directive.policy,
                    %reason,
                    "Delivery rejected directive"
                );

                self.dispatch_log
                    .record(Arc::new(directive), evaluation.clone(), CycleOutcome::Failed)
                    .await?;

                Ok(CycleReport {
                    verdict: evaluation.verdict,
                    directive_issued: false,
                    outcome: CycleOutcome::Failed,
                    directive_id: None,
                    evaluation: Some(evaluation),
                })
            }
        }
    }
}

fn none_act(evaluation: Evaluation) -> CycleReport {
    CycleReport {
        verdict: evaluation.verdict,
        directive_issued: false,
        outcome: CycleOutcome::NoneAct,
        directive_id: None,
        evaluation: Some(evaluation),
    }
}
