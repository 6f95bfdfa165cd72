//! Core data models for the spend guardian

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//
// ================= Enums =================
//

/// Spending alignment of a user's ledger with their active goal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// No active goal; no evaluation possible.
    None,
    Green,
    Orange,
    Red,
}

/// Transaction category as resolved by the categorizer.
///
/// `SocialDiscretionary` counts as non-essential for budget totals but
/// additionally marks peer-pressure spend for the social policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Essential,
    NonEssential,
    SocialDiscretionary,
    Unknown,
}

impl Category {
    pub fn counts_as_non_essential(&self) -> bool {
        matches!(self, Category::NonEssential | Category::SocialDiscretionary)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxnSource {
    BankFeed,
    Manual,
    PluginEvent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum GoalStatus {
    Active,
    Completed,
    Abandoned,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Whatsapp,
    Telegram,
    Push,
}

//
// ================= User =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Users are soft-archived, never hard-deleted.
    pub archived: bool,
}

//
// ================= Goal =================
//

/// Time window over which a saving target and non-essential budget apply.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GoalPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl GoalPeriod {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The calendar month containing `at`, the typical goal period.
    pub fn calendar_month(at: DateTime<Utc>) -> Self {
        let start = Utc
            .with_ymd_and_hms(at.year(), at.month(), 1, 0, 0, 0)
            .single()
            .unwrap_or(at);
        let (next_year, next_month) = if at.month() == 12 {
            (at.year() + 1, 1)
        } else {
            (at.year(), at.month() + 1)
        };
        let end = Utc
            .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
            .single()
            .unwrap_or(at);
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    pub fn overlaps(&self, other: &GoalPeriod) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub goal_id: Uuid,
    pub user_id: Uuid,
    /// Free-text label, e.g. "Buy a laptop".
    pub title: Option<String>,
    /// Target saving amount in minor currency units (paise, cents).
    pub target_minor: i64,
    /// Non-essential spend budget for the period, minor units.
    pub budget_minor: i64,
    pub currency: String,
    pub period: GoalPeriod,
    pub status: GoalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Goal attributes supplied by the caller; ids and status are store-assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGoal {
    pub title: Option<String>,
    pub target_minor: i64,
    pub budget_minor: i64,
    pub currency: String,
    pub period: GoalPeriod,
}

//
// ================= Transaction =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub txn_id: Uuid,
    pub user_id: Uuid,
    /// Active goal at time of recording, if any.
    pub goal_id: Option<Uuid>,
    pub amount_minor: i64,
    pub currency: String,
    pub merchant: String,
    pub category: Category,
    pub source: TxnSource,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    /// Idempotency key of the raw upstream event, for audit.
    pub event_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub amount_minor: i64,
    pub currency: String,
    pub merchant: String,
    pub category: Category,
    pub source: TxnSource,
    pub occurred_at: DateTime<Utc>,
    pub event_ref: Option<String>,
}

//
// ================= Inbound events =================
//

/// Heterogeneous upstream events, normalized by the ingestor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    BankFeed {
        idempotency_key: String,
        user_id: Uuid,
        amount_minor: i64,
        currency: String,
        merchant: String,
        occurred_at: DateTime<Utc>,
    },
    Checkout {
        idempotency_key: String,
        user_id: Uuid,
        amount_minor: i64,
        currency: String,
        merchant: String,
        page_url: String,
        occurred_at: DateTime<Utc>,
    },
    GoalDeclaration {
        idempotency_key: String,
        user_id: Uuid,
        text: String,
        declared_at: DateTime<Utc>,
    },
}

impl InboundEvent {
    pub fn idempotency_key(&self) -> &str {
        match self {
            InboundEvent::BankFeed { idempotency_key, .. }
            | InboundEvent::Checkout { idempotency_key, .. }
            | InboundEvent::GoalDeclaration { idempotency_key, .. } => idempotency_key,
        }
    }

    pub fn user_id(&self) -> Uuid {
        match self {
            InboundEvent::BankFeed { user_id, .. }
            | InboundEvent::Checkout { user_id, .. }
            | InboundEvent::GoalDeclaration { user_id, .. } => *user_id,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InboundEvent::BankFeed { occurred_at, .. }
            | InboundEvent::Checkout { occurred_at, .. } => *occurred_at,
            InboundEvent::GoalDeclaration { declared_at, .. } => *declared_at,
        }
    }
}

/// Structured result of the language-understanding collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedGoal {
    pub title: Option<String>,
    pub target_minor: i64,
    pub budget_minor: i64,
    pub currency: String,
    pub period: GoalPeriod,
}

//
// ================= Evaluation =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub goal_id: Option<Uuid>,
    pub spent_non_essential_minor: i64,
    pub budget_minor: i64,
    /// spent / budget; 0.0 when no goal.
    pub ratio: f64,
    /// max(0, spent - budget), used by policies to size interventions.
    pub projected_overage_minor: i64,
    /// budget - spent; may be negative.
    pub remaining_minor: i64,
    pub evaluated_at: DateTime<Utc>,
}

impl Evaluation {
    pub fn none(at: DateTime<Utc>) -> Self {
        Self {
            verdict: Verdict::None,
            goal_id: None,
            spent_non_essential_minor: 0,
            budget_minor: 0,
            ratio: 0.0,
            projected_overage_minor: 0,
            remaining_minor: 0,
            evaluated_at: at,
        }
    }
}

//
// ================= Intervention directive =================
//

/// Structured facts for the message; phrasing is the delivery side's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    pub merchant: Option<String>,
    pub amount_minor: Option<i64>,
    pub currency: String,
    pub spent_minor: i64,
    pub remaining_minor: i64,
    pub target_minor: i64,
    pub overage_minor: i64,
    /// Placeholder reference; image generation is delegated externally.
    pub image_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionDirective {
    pub directive_id: Uuid,
    pub user_id: Uuid,
    pub policy: String,
    pub channel_hint: Channel,
    pub urgency: Urgency,
    pub payload: MessagePayload,
    /// `user:policy:day`, suppresses same-policy repeats within the day.
    pub dedup_key: String,
    pub created_at: DateTime<Utc>,
}

//
// ================= Cycle result =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleOutcome {
    Failed,
    NoneAct,
    Dispatched,
}

/// Structured result of one orchestrator cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub verdict: Verdict,
    pub directive_issued: bool,
    pub outcome: CycleOutcome,
    pub directive_id: Option<Uuid>,
    pub evaluation: Option<Evaluation>,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::None => "NONE",
            Verdict::Green => "GREEN",
            Verdict::Orange => "ORANGE",
            Verdict::Red => "RED",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CycleOutcome::Failed => "FAILED",
            CycleOutcome::NoneAct => "NONE_ACT",
            CycleOutcome::Dispatched => "DISPATCHED",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_calendar_month_period() {
        let at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        let period = GoalPeriod::calendar_month(at);
        assert_eq!(period.start, Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(period.end, Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap());
        assert!(period.contains(at));
        assert!(!period.contains(period.end));
    }

    #[test]
    fn test_calendar_month_december_rollover() {
        let at = Utc.with_ymd_and_hms(2025, 12, 31, 23, 0, 0).unwrap();
        let period = GoalPeriod::calendar_month(at);
        assert_eq!(period.end, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_period_overlap() {
        let march = GoalPeriod::calendar_month(Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap());
        let april = GoalPeriod::calendar_month(Utc.with_ymd_and_hms(2025, 4, 10, 0, 0, 0).unwrap());
        let mid = GoalPeriod::new(
            Utc.with_ymd_and_hms(2025, 3, 20, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 4, 20, 0, 0, 0).unwrap(),
        );
        assert!(!march.overlaps(&april));
        assert!(march.overlaps(&mid));
        assert!(april.overlaps(&mid));
    }

    #[test]
    fn test_social_counts_as_non_essential() {
        assert!(Category::SocialDiscretionary.counts_as_non_essential());
        assert!(Category::NonEssential.counts_as_non_essential());
        assert!(!Category::Essential.counts_as_non_essential());
        assert!(!Category::Unknown.counts_as_non_essential());
    }
}
