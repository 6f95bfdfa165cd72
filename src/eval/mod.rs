//! Evaluation engine
//!
//! Computes a spending verdict from the goal and ledger state.
//! Deterministic and side-effect-free over a ledger snapshot; the only
//! awaits are store reads.

use crate::models::{Evaluation, Verdict};
use crate::store::GoalStore;
use crate::Result;
use chrono::{DateTime, Utc};
use std::env;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Default ratio at which a goal is considered at risk.
pub const DEFAULT_WARN_RATIO: f64 = 0.8;
/// Default ratio at which a goal is considered over budget.
pub const DEFAULT_BREACH_RATIO: f64 = 1.0;

/// Verdict thresholds. Policy defaults, overridable via environment.
#[derive(Debug, Clone, Copy)]
pub struct EvalThresholds {
    /// ratio < warn → GREEN
    pub warn: f64,
    /// warn <= ratio < breach → ORANGE; ratio >= breach → RED
    pub breach: f64,
}

impl Default for EvalThresholds {
    fn default() -> Self {
        Self {
            warn: DEFAULT_WARN_RATIO,
            breach: DEFAULT_BREACH_RATIO,
        }
    }
}

impl EvalThresholds {
    /// Read `GUARDIAN_WARN_RATIO` / `GUARDIAN_BREACH_RATIO`, falling back
    /// to the defaults on absence or parse failure.
    pub fn from_env() -> Self {
        let warn = env::var("GUARDIAN_WARN_RATIO")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_WARN_RATIO);
        let breach = env::var("GUARDIAN_BREACH_RATIO")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_BREACH_RATIO);
        Self { warn, breach }
    }

    fn classify(&self, ratio: f64) -> Verdict {
        if ratio >= self.breach {
            Verdict::Red
        } else if ratio >= self.warn {
            Verdict::Orange
        } else {
            Verdict::Green
        }
    }
}

/// Evaluates a user's ledger against their active goal
pub struct EvaluationEngine {
    store: Arc<dyn GoalStore>,
    thresholds: EvalThresholds,
}

impl EvaluationEngine {
    pub fn new(store: Arc<dyn GoalStore>, thresholds: EvalThresholds) -> Self {
        Self { store, thresholds }
    }

    /// Resolve the active goal at `at`, sum non-essential spend within the
    /// goal period up to `at`, and classify the ratio.
    ///
    /// Transactions outside the period stay in the ledger for audit but are
    /// excluded from the sum; late-arriving entries for a closed period
    /// never change that period's verdict.
    pub async fn evaluate(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<Evaluation> {
        let Some(goal) = self.store.active_goal(user_id, at).await? else {
            return Ok(Evaluation::none(at));
        };

        // Budget is validated positive at goal creation, so the ratio is
        // always well-defined.
        let upper = at.min(goal.period.end);
        let txns = self
            .store
            .transactions_in(user_id, goal.period.start, upper)
            .await?;

        let spent: i64 = txns
            .iter()
            .filter(|t| t.category.counts_as_non_essential())
            .map(|t| t.amount_minor)
            .sum();

        let ratio = spent as f64 / goal.budget_minor as f64;
        let verdict = self.thresholds.classify(ratio);

        debug!(
            user_id = ?user_id,
            goal_id = ?goal.goal_id,
            spent_minor = spent,
            budget_minor = goal.budget_minor,
            %verdict,
            "Evaluated spending state"
        );

        Ok(Evaluation {
            verdict,
            goal_id: Some(goal.goal_id),
            spent_non_essential_minor: spent,
            budget_minor: goal.budget_minor,
            ratio,
            projected_overage_minor: (spent - goal.budget_minor).max(0),
            remaining_minor: goal.budget_minor - spent,
            evaluated_at: at,
        })
    }
}
