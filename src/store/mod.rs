//! Goal and ledger persistence layer
//!
//! Owns the User and Goal lifecycle plus the append-only transaction ledger.
//! Currently uses in-memory maps; can be replaced with a database behind
//! the trait.

use crate::models::{
    Goal, GoalStatus, NewGoal, NewTransaction, Transaction, User,
};
use crate::error::GuardianError;
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Trait for goal/ledger persistence
#[async_trait::async_trait]
pub trait GoalStore: Send + Sync {
    /// Create the user if absent; returns the stored record either way.
    async fn init_user(&self, user_id: Uuid) -> Result<User>;

    async fn user(&self, user_id: Uuid) -> Result<Option<User>>;

    /// Soft-archive; the record is never removed.
    async fn archive_user(&self, user_id: Uuid) -> Result<()>;

    /// Validates, supersedes overlapping ACTIVE goals, inserts the new
    /// ACTIVE goal. Initializes the user on first interaction. ACTIVE
    /// goals whose period has ended are marked COMPLETED on the way.
    async fn set_goal(&self, user_id: Uuid, goal: NewGoal) -> Result<Goal>;

    /// Explicit cancellation; returns the abandoned goal, or `None` when
    /// no matching ACTIVE goal exists.
    async fn abandon_goal(&self, user_id: Uuid, goal_id: Uuid) -> Result<Option<Goal>>;

    /// Pure lookup of the ACTIVE goal whose period contains `at`.
    async fn active_goal(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<Option<Goal>>;

    /// Append-only; fails with `UnknownUser` for uninitialized users.
    async fn record_transaction(&self, user_id: Uuid, txn: NewTransaction) -> Result<Transaction>;

    /// Ledger window read, `from <= occurred_at <= to`, in append order.
    async fn transactions_in(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>>;
}

/// In-memory goal store for development and tests
pub struct InMemoryGoalStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
    goals_by_user: Arc<RwLock<HashMap<Uuid, Vec<Goal>>>>,
    ledger_by_user: Arc<RwLock<HashMap<Uuid, Vec<Transaction>>>>,
}

impl InMemoryGoalStore {
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            goals_by_user: Arc::new(RwLock::new(HashMap::new())),
            ledger_by_user: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryGoalStore {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_goal(goal: &NewGoal) -> Result<()> {
    if goal.period.end <= goal.period.start {
        return Err(GuardianError::InvalidPeriod(format!(
            "period end {} must be after start {}",
            goal.period.end, goal.period.start
        )));
    }
    if goal.target_minor <= 0 {
        return Err(GuardianError::InvalidAmount(format!(
            "target saving amount must be positive, got {}",
            goal.target_minor
        )));
    }
    if goal.budget_minor <= 0 {
        return Err(GuardianError::InvalidAmount(format!(
            "non-essential budget must be positive, got {}",
            goal.budget_minor
        )));
    }
    Ok(())
}

#[async_trait::async_trait]
impl GoalStore for InMemoryGoalStore {

    async fn init_user(&self, user_id: Uuid) -> Result<User> {
        let mut users = self.users.write().await;
        let user = users.entry(user_id).or_insert_with(|| User {
            user_id,
            created_at: Utc::now(),
            archived: false,
        });
        Ok(user.clone())
    }

    async fn user(&self, user_id: Uuid) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(&user_id).cloned())
    }

    async fn archive_user(&self, user_id: Uuid) -> Result<()> {
        let mut users = self.users.write().await;
        match users.get_mut(&user_id) {
            Some(user) => {
                user.archived = true;
                Ok(())
            }
            None => Err(GuardianError::UnknownUser(user_id)),
        }
    }

    async fn set_goal(&self, user_id: Uuid, goal: NewGoal) -> Result<Goal> {
        validate_goal(&goal)?;

        // A goal declaration counts as first interaction.
        self.init_user(user_id).await?;

        let now = Utc::now();
        let mut goals = self.goals_by_user.write().await;
        let user_goals = goals.entry(user_id).or_insert_with(Vec::new);

        // At most one ACTIVE goal per overlapping period, enforced here.
        // Goals whose period already ended complete instead of lingering
        // as ACTIVE.
        for existing in user_goals.iter_mut() {
            if existing.status != GoalStatus::Active {
                continue;
            }
            if existing.period.end <= now {
                debug!(
                    goal_id = ?existing.goal_id,
                    user_id = ?user_id,
                    "Completing expired goal"
                );
                existing.status = GoalStatus::Completed;
                existing.updated_at = now;
            } else if existing.period.overlaps(&goal.period) {
                debug!(
                    goal_id = ?existing.goal_id,
                    user_id = ?user_id,
                    "Superseding overlapping active goal"
                );
                existing.status = GoalStatus::Abandoned;
                existing.updated_at = now;
            }
        }

        let stored = Goal {
            goal_id: Uuid::new_v4(),
            user_id,
            title: goal.title,
            target_minor: goal.target_minor,
            budget_minor: goal.budget_minor,
            currency: goal.currency,
            period: goal.period,
            status: GoalStatus::Active,
            created_at: now,
            updated_at: now,
        };
        user_goals.push(stored.clone());

        Ok(stored)
    }

    async fn abandon_goal(&self, user_id: Uuid, goal_id: Uuid) -> Result<Option<Goal>> {
        let mut goals = self.goals_by_user.write().await;
        let Some(user_goals) = goals.get_mut(&user_id) else {
            return Ok(None);
        };

        for existing in user_goals.iter_mut() {
            if existing.goal_id == goal_id && existing.status == GoalStatus::Active {
                debug!(goal_id = ?goal_id, user_id = ?user_id, "Abandoning goal");
                existing.status = GoalStatus::Abandoned;
                existing.updated_at = Utc::now();
                return Ok(Some(existing.clone()));
            }
        }
        Ok(None)
    }

    async fn active_goal(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<Option<Goal>> {
        let goals = self.goals_by_user.read().await;
        Ok(goals.get(&user_id).and_then(|user_goals| {
            user_goals
                .iter()
                .find(|g| g.status == GoalStatus::Active && g.period.contains(at))
                .cloned()
        }))
    }

    async fn record_transaction(&self, user_id: Uuid, txn: NewTransaction) -> Result<Transaction> {
        {
            let users = self.users.read().await;
            if !users.contains_key(&user_id) {
                return Err(GuardianError::UnknownUser(user_id));
            }
        }

        let goal_id = self
            .active_goal(user_id, txn.occurred_at)
            .await?
            .map(|g| g.goal_id);

        let stored = Transaction {
            txn_id: Uuid::new_v4(),
            user_id,
            goal_id,
            amount_minor: txn.amount_minor,
            currency: txn.currency,
            merchant: txn.merchant,
            category: txn.category,
            source: txn.source,
            occurred_at: txn.occurred_at,
            recorded_at: Utc::now(),
            event_ref: txn.event_ref,
        };

        let mut ledger = self.ledger_by_user.write().await;
        ledger
            .entry(user_id)
            .or_insert_with(Vec::new)
            .push(stored.clone());

        Ok(stored)
    }

    async fn transactions_in(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        let ledger = self.ledger_by_user.read().await;

        Ok(ledger
            .get(&user_id)
            .map(|txns| {
                txns.iter()
                    .filter(|t| from <= t.occurred_at && t.occurred_at <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, GoalPeriod, TxnSource};
    use chrono::TimeZone;

    fn month_goal(target: i64, budget: i64) -> NewGoal {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        NewGoal {
            title: None,
            target_minor: target,
            budget_minor: budget,
            currency: "INR".to_string(),
            period: GoalPeriod::calendar_month(at),
        }
    }

    fn txn_at(day: u32, amount: i64) -> NewTransaction {
        NewTransaction {
            amount_minor: amount,
            currency: "INR".to_string(),
            merchant: "test-merchant".to_string(),
            category: Category::NonEssential,
            source: TxnSource::BankFeed,
            occurred_at: Utc.with_ymd_and_hms(2025, 6, day, 12, 0, 0).unwrap(),
            event_ref: None,
        }
    }

    #[tokio::test]
    async fn test_set_goal_rejects_inverted_period() {
        let store = InMemoryGoalStore::new();
        let mut goal = month_goal(5000_00, 2000_00);
        std::mem::swap(&mut goal.period.start, &mut goal.period.end);

        let err = store.set_goal(Uuid::new_v4(), goal).await.unwrap_err();
        assert!(matches!(err, GuardianError::InvalidPeriod(_)));
    }

    #[tokio::test]
    async fn test_set_goal_rejects_zero_budget() {
        let store = InMemoryGoalStore::new();
        let err = store
            .set_goal(Uuid::new_v4(), month_goal(5000_00, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, GuardianError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn test_set_goal_rejects_negative_target() {
        let store = InMemoryGoalStore::new();
        let err = store
            .set_goal(Uuid::new_v4(), month_goal(-1, 2000_00))
            .await
            .unwrap_err();
        assert!(matches!(err, GuardianError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn test_overlapping_goal_supersedes_prior() {
        let store = InMemoryGoalStore::new();
        let user_id = Uuid::new_v4();
        let at = Utc::now();
        let period = GoalPeriod::calendar_month(at);

        let mut goal = month_goal(5000_00, 2000_00);
        goal.period = period;
        let first = store.set_goal(user_id, goal).await.unwrap();

        let mut goal = month_goal(8000_00, 3000_00);
        goal.period = period;
        let second = store.set_goal(user_id, goal).await.unwrap();

        let active = store.active_goal(user_id, at).await.unwrap().unwrap();
        assert_eq!(active.goal_id, second.goal_id);
        assert_ne!(active.goal_id, first.goal_id);

        // exactly one ACTIVE goal at any instant; the replaced one is
        // ABANDONED, not COMPLETED.
        let goals = store.goals_by_user.read().await;
        let active_count = goals[&user_id]
            .iter()
            .filter(|g| g.status == GoalStatus::Active)
            .count();
        assert_eq!(active_count, 1);
        let prior = goals[&user_id]
            .iter()
            .find(|g| g.goal_id == first.goal_id)
            .unwrap();
        assert_eq!(prior.status, GoalStatus::Abandoned);
    }

    #[tokio::test]
    async fn test_expired_goal_completed_on_next_set_goal() {
        let store = InMemoryGoalStore::new();
        let user_id = Uuid::new_v4();

        let june_goal = store
            .set_goal(user_id, month_goal(5000_00, 2000_00))
            .await
            .unwrap();

        // A later, non-overlapping declaration completes the ended goal.
        let mut next = month_goal(5000_00, 2000_00);
        next.period =
            GoalPeriod::calendar_month(Utc.with_ymd_and_hms(2025, 7, 10, 0, 0, 0).unwrap());
        store.set_goal(user_id, next).await.unwrap();

        let goals = store.goals_by_user.read().await;
        let stored = goals[&user_id]
            .iter()
            .find(|g| g.goal_id == june_goal.goal_id)
            .unwrap();
        assert_eq!(stored.status, GoalStatus::Completed);
    }

    #[tokio::test]
    async fn test_abandon_goal_explicit_cancellation() {
        let store = InMemoryGoalStore::new();
        let user_id = Uuid::new_v4();
        let at = Utc.with_ymd_and_hms(2025, 6, 15, 0, 0, 0).unwrap();

        let goal = store
            .set_goal(user_id, month_goal(5000_00, 2000_00))
            .await
            .unwrap();

        let abandoned = store
            .abandon_goal(user_id, goal.goal_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(abandoned.status, GoalStatus::Abandoned);
        assert!(store.active_goal(user_id, at).await.unwrap().is_none());

        // Terminal goals are not re-abandonable.
        assert!(store
            .abandon_goal(user_id, goal.goal_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_record_transaction_unknown_user() {
        let store = InMemoryGoalStore::new();
        let err = store
            .record_transaction(Uuid::new_v4(), txn_at(5, 1000_00))
            .await
            .unwrap_err();
        assert!(matches!(err, GuardianError::UnknownUser(_)));
    }

    #[tokio::test]
    async fn test_ledger_preserves_append_order() {
        let store = InMemoryGoalStore::new();
        let user_id = Uuid::new_v4();
        store.init_user(user_id).await.unwrap();

        // Same occurred_at day, appended in a fixed order.
        for amount in [100_00, 200_00, 300_00] {
            store.record_transaction(user_id, txn_at(5, amount)).await.unwrap();
        }

        let txns = store
            .transactions_in(
                user_id,
                Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 6, 30, 0, 0, 0).unwrap(),
            )
            .await
            .unwrap();
        let amounts: Vec<i64> = txns.iter().map(|t| t.amount_minor).collect();
        assert_eq!(amounts, vec![100_00, 200_00, 300_00]);
    }

    #[tokio::test]
    async fn test_transaction_stamped_with_active_goal() {
        let store = InMemoryGoalStore::new();
        let user_id = Uuid::new_v4();
        let goal = store.set_goal(user_id, month_goal(5000_00, 2000_00)).await.unwrap();

        let txn = store.record_transaction(user_id, txn_at(10, 500_00)).await.unwrap();
        assert_eq!(txn.goal_id, Some(goal.goal_id));
    }

    #[tokio::test]
    async fn test_archive_user_keeps_record() {
        let store = InMemoryGoalStore::new();
        let user_id = Uuid::new_v4();
        store.init_user(user_id).await.unwrap();
        store.archive_user(user_id).await.unwrap();

        let user = store.user(user_id).await.unwrap().unwrap();
        assert!(user.archived);
    }
}
