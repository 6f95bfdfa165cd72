//! Event ingestor
//!
//! Normalizes heterogeneous upstream events into ledger appends or goal
//! declarations, idempotently. Upstream webhooks may redeliver, so every
//! event carries a caller-supplied idempotency key; duplicates within the
//! window are dropped silently.

use crate::categorizer::Categorizer;
use crate::error::GuardianError;
use crate::models::{
    Category, Goal, InboundEvent, NewGoal, NewTransaction, Transaction, TxnSource,
};
use crate::parser::GoalParser;
use crate::store::GoalStore;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Idempotency keys are remembered for this long; a redelivery after the
/// window is treated as a new event.
const IDEMPOTENCY_WINDOW_HOURS: i64 = 24;

/// Rolling table of applied idempotency keys
pub struct IdempotencyLedger {
    applied: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
    window: Duration,
}

impl IdempotencyLedger {
    pub fn new() -> Self {
        Self {
            applied: Arc::new(RwLock::new(HashMap::new())),
            window: Duration::hours(IDEMPOTENCY_WINDOW_HOURS),
        }
    }

    pub async fn seen(&self, key: &str, now: DateTime<Utc>) -> bool {
        let applied = self.applied.read().await;
        match applied.get(key) {
            Some(applied_at) => now - *applied_at < self.window,
            None => false,
        }
    }

    /// Record a key after the event was applied; prunes expired entries to
    /// bound the table.
    pub async fn record(&self, key: &str, now: DateTime<Utc>) {
        let mut applied = self.applied.write().await;
        applied.retain(|_, applied_at| now - *applied_at < self.window);
        applied.insert(key.to_string(), now);
    }
}

impl Default for IdempotencyLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of normalizing one inbound event
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Recorded(Transaction),
    GoalSet(Goal),
    /// Idempotent no-op; not an error.
    Duplicate,
}

/// Normalizes inbound events and applies them through the goal store
pub struct EventIngestor {
    store: Arc<dyn GoalStore>,
    categorizer: Arc<dyn Categorizer>,
    parser: Arc<dyn GoalParser>,
    idempotency: IdempotencyLedger,
}

impl EventIngestor {
    pub fn new(
        store: Arc<dyn GoalStore>,
        categorizer: Arc<dyn Categorizer>,
        parser: Arc<dyn GoalParser>,
    ) -> Self {
        Self {
            store,
            categorizer,
            parser,
            idempotency: IdempotencyLedger::new(),
        }
    }

    pub async fn ingest(&self, event: &InboundEvent) -> Result<IngestOutcome> {
        let now = Utc::now();
        let key = event.idempotency_key();

        if self.idempotency.seen(key, now).await {
            debug!(idempotency_key = %key, "Duplicate event dropped");
            return Ok(IngestOutcome::Duplicate);
        }

        let outcome = match event {
            InboundEvent::BankFeed {
                user_id,
                amount_minor,
                currency,
                merchant,
                occurred_at,
                idempotency_key,
            } => {
                let category = self
                    .categorizer
                    .categorize(merchant, *amount_minor, TxnSource::BankFeed)
                    .await;

                let txn = self
                    .store
                    .record_transaction(
                        *user_id,
                        NewTransaction {
                            amount_minor: *amount_minor,
                            currency: currency.clone(),
                            merchant: merchant.clone(),
                            category,
                            source: TxnSource::BankFeed,
                            occurred_at: *occurred_at,
                            event_ref: Some(idempotency_key.clone()),
                        },
                    )
                    .await?;
                IngestOutcome::Recorded(txn)
            }

            InboundEvent::Checkout {
                user_id,
                amount_minor,
                currency,
                merchant,
                occurred_at,
                idempotency_key,
                ..
            } => {
                // Checkout pages are non-essential by default; the
                // categorizer may still override.
                let category = match self
                    .categorizer
                    .categorize(merchant, *amount_minor, TxnSource::PluginEvent)
                    .await
                {
                    Category::Unknown => Category::NonEssential,
                    resolved => resolved,
                };

                let txn = self
                    .store
                    .record_transaction(
                        *user_id,
                        NewTransaction {
                            amount_minor: *amount_minor,
                            currency: currency.clone(),
                            merchant: merchant.clone(),
                            category,
                            source: TxnSource::PluginEvent,
                            occurred_at: *occurred_at,
                            event_ref: Some(idempotency_key.clone()),
                        },
                    )
                    .await?;
                IngestOutcome::Recorded(txn)
            }

            InboundEvent::GoalDeclaration {
                user_id,
                text,
                declared_at,
                ..
            } => {
                let Some(parsed) = self.parser.parse(text, *declared_at).await? else {
                    warn!(user_id = ?user_id, "Goal declaration unparsable");
                    return Err(GuardianError::UnparsableGoal(
                        text.chars().take(120).collect(),
                    ));
                };

                let goal = self
                    .store
                    .set_goal(
                        *user_id,
                        NewGoal {
                            title: parsed.title,
                            target_minor: parsed.target_minor,
                            budget_minor: parsed.budget_minor,
                            currency: parsed.currency,
                            period: parsed.period,
                        },
                    )
                    .await?;
                IngestOutcome::GoalSet(goal)
            }
        };

        // The key is recorded only after the append succeeded, so a failed
        // cycle can be retried with the same key.
        self.idempotency.record(key, now).await;

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorizer::KeywordCategorizer;
    use crate::parser::MockGoalParser;
    use crate::store::InMemoryGoalStore;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn ingestor(store: Arc<InMemoryGoalStore>) -> EventIngestor {
        EventIngestor::new(store, Arc::new(KeywordCategorizer), Arc::new(MockGoalParser))
    }

    fn june(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, day, 12, 0, 0).unwrap()
    }

    fn bank_event(user_id: Uuid, merchant: &str, key: &str) -> InboundEvent {
        InboundEvent::BankFeed {
            idempotency_key: key.to_string(),
            user_id,
            amount_minor: 750_00,
            currency: "INR".to_string(),
            merchant: merchant.to_string(),
            occurred_at: june(5),
        }
    }

    #[tokio::test]
    async fn test_bank_feed_category_fallback_to_unknown() {
        let store = Arc::new(InMemoryGoalStore::new());
        let user_id = Uuid::new_v4();
        store.init_user(user_id).await.unwrap();
        let ingestor = ingestor(store);

        let outcome = ingestor
            .ingest(&bank_event(user_id, "ACME 0042", "evt-1"))
            .await
            .unwrap();
        let IngestOutcome::Recorded(txn) = outcome else {
            panic!("expected a recorded transaction");
        };
        assert_eq!(txn.category, Category::Unknown);
        assert_eq!(txn.source, TxnSource::BankFeed);
        assert_eq!(txn.event_ref.as_deref(), Some("evt-1"));
    }

    #[tokio::test]
    async fn test_checkout_defaults_to_non_essential() {
        let store = Arc::new(InMemoryGoalStore::new());
        let user_id = Uuid::new_v4();
        store.init_user(user_id).await.unwrap();
        let ingestor = ingestor(store);

        let outcome = ingestor
            .ingest(&InboundEvent::Checkout {
                idempotency_key: "evt-2".to_string(),
                user_id,
                amount_minor: 1200_00,
                currency: "INR".to_string(),
                merchant: "unbranded-store".to_string(),
                page_url: "https://shop.example/cart".to_string(),
                occurred_at: june(6),
            })
            .await
            .unwrap();
        let IngestOutcome::Recorded(txn) = outcome else {
            panic!("expected a recorded transaction");
        };
        assert_eq!(txn.category, Category::NonEssential);
        assert_eq!(txn.source, TxnSource::PluginEvent);
    }

    #[tokio::test]
    async fn test_checkout_categorizer_override() {
        let store = Arc::new(InMemoryGoalStore::new());
        let user_id = Uuid::new_v4();
        store.init_user(user_id).await.unwrap();
        let ingestor = ingestor(store);

        let outcome = ingestor
            .ingest(&InboundEvent::Checkout {
                idempotency_key: "evt-3".to_string(),
                user_id,
                amount_minor: 300_00,
                currency: "INR".to_string(),
                merchant: "City Pharmacy Online".to_string(),
                page_url: "https://pharmacy.example/checkout".to_string(),
                occurred_at: june(6),
            })
            .await
            .unwrap();
        let IngestOutcome::Recorded(txn) = outcome else {
            panic!("expected a recorded transaction");
        };
        assert_eq!(txn.category, Category::Essential);
    }

    #[tokio::test]
    async fn test_duplicate_key_is_silently_dropped() {
        let store = Arc::new(InMemoryGoalStore::new());
        let user_id = Uuid::new_v4();
        store.init_user(user_id).await.unwrap();
        let ingestor = ingestor(store.clone());

        let event = bank_event(user_id, "Swiggy", "evt-dup");
        assert!(matches!(
            ingestor.ingest(&event).await.unwrap(),
            IngestOutcome::Recorded(_)
        ));
        for _ in 0..3 {
            assert!(matches!(
                ingestor.ingest(&event).await.unwrap(),
                IngestOutcome::Duplicate
            ));
        }

        let txns = store
            .transactions_in(user_id, june(1), june(30))
            .await
            .unwrap();
        assert_eq!(txns.len(), 1);
    }

    #[tokio::test]
    async fn test_idempotency_window_expiry() {
        let ledger = IdempotencyLedger::new();
        let now = Utc::now();

        ledger.record("evt-1", now).await;
        assert!(ledger.seen("evt-1", now).await);
        assert!(ledger.seen("evt-1", now + Duration::hours(23)).await);
        // Redelivery after the window counts as a new event.
        assert!(!ledger.seen("evt-1", now + Duration::hours(25)).await);
    }

    #[tokio::test]
    async fn test_failed_ingestion_does_not_burn_the_key() {
        let store = Arc::new(InMemoryGoalStore::new());
        let user_id = Uuid::new_v4();
        // User never initialized: bank append fails with UnknownUser.
        let ingestor = ingestor(store.clone());

        let event = bank_event(user_id, "Swiggy", "evt-retry");
        assert!(ingestor.ingest(&event).await.is_err());

        store.init_user(user_id).await.unwrap();
        assert!(matches!(
            ingestor.ingest(&event).await.unwrap(),
            IngestOutcome::Recorded(_)
        ));
    }

    #[tokio::test]
    async fn test_unparsable_goal_declaration() {
        let store = Arc::new(InMemoryGoalStore::new());
        let ingestor = ingestor(store);

        let err = ingestor
            .ingest(&InboundEvent::GoalDeclaration {
                idempotency_key: "evt-4".to_string(),
                user_id: Uuid::new_v4(),
                text: "please help me save money".to_string(),
                declared_at: june(1),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GuardianError::UnparsableGoal(_)));
    }

    #[tokio::test]
    async fn test_goal_declaration_sets_goal() {
        let store = Arc::new(InMemoryGoalStore::new());
        let user_id = Uuid::new_v4();
        let ingestor = ingestor(store.clone());

        let outcome = ingestor
            .ingest(&InboundEvent::GoalDeclaration {
                idempotency_key: "evt-5".to_string(),
                user_id,
                text: "save 5000 this month".to_string(),
                declared_at: june(1),
            })
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::GoalSet(_)));
        assert!(store.active_goal(user_id, june(15)).await.unwrap().is_some());
    }
}
