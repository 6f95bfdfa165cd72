//! Intervention policy registry
//!
//! Each policy is one pluggable reaction strategy: it may claim a verdict
//! and build a directive. Policies are tried in a fixed priority order and
//! the first claim wins, so a cycle yields at most one directive. Silence
//! is a valid, frequent outcome.

use crate::models::{
    Category, Channel, Evaluation, Goal, InterventionDirective, MessagePayload, Transaction,
    TxnSource, Urgency, Verdict,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Fraction of the target saving amount considered a comfortable buffer;
/// the future-self policy fires when the remaining budget climbs back
/// above it.
pub const COMFORT_MILESTONE_RATIO: f64 = 0.5;

/// Dispatched dedup keys are kept this long before expiry.
const DEDUP_TTL_HOURS: i64 = 48;

/// Everything a policy may look at for one evaluation cycle
pub struct PolicyContext<'a> {
    pub user_id: Uuid,
    pub goal: &'a Goal,
    pub evaluation: &'a Evaluation,
    /// Cached evaluation from the user's previous cycle, if any.
    pub previous: Option<&'a Evaluation>,
    /// The transaction that triggered this cycle; `None` for goal cycles.
    pub trigger: Option<&'a Transaction>,
    pub at: DateTime<Utc>,
}

/// Trait for a single intervention strategy
pub trait InterventionPolicy: Send + Sync {
    fn name(&self) -> &'static str;
    fn can_handle(&self, ctx: &PolicyContext<'_>) -> bool;
    fn build(&self, ctx: &PolicyContext<'_>) -> InterventionDirective;
}

/// `user:policy:day` — one directive per policy per user per day.
pub fn dedup_key(user_id: Uuid, policy: &str, at: DateTime<Utc>) -> String {
    format!("{}:{}:{}", user_id, policy, at.format("%Y-%m-%d"))
}

fn base_payload(ctx: &PolicyContext<'_>) -> MessagePayload {
    MessagePayload {
        merchant: ctx.trigger.map(|t| t.merchant.clone()),
        amount_minor: ctx.trigger.map(|t| t.amount_minor),
        currency: ctx.goal.currency.clone(),
        spent_minor: ctx.evaluation.spent_non_essential_minor,
        remaining_minor: ctx.evaluation.remaining_minor,
        target_minor: ctx.goal.target_minor,
        overage_minor: ctx.evaluation.projected_overage_minor,
        image_ref: None,
    }
}

fn directive(ctx: &PolicyContext<'_>, policy: &'static str, urgency: Urgency, payload: MessagePayload) -> InterventionDirective {
    InterventionDirective {
        directive_id: Uuid::new_v4(),
        user_id: ctx.user_id,
        policy: policy.to_string(),
        channel_hint: Channel::Whatsapp,
        urgency,
        payload,
        dedup_key: dedup_key(ctx.user_id, policy, ctx.at),
        created_at: Utc::now(),
    }
}

//
// ================= Impulse-Guard =================
//

/// Intercepts checkout-page spend while the goal is at risk.
pub struct ImpulseGuard;

impl InterventionPolicy for ImpulseGuard {
    fn name(&self) -> &'static str {
        "impulse_guard"
    }

    fn can_handle(&self, ctx: &PolicyContext<'_>) -> bool {
        let at_risk = matches!(ctx.evaluation.verdict, Verdict::Orange | Verdict::Red);
        let plugin_trigger = ctx
            .trigger
            .map(|t| t.source == TxnSource::PluginEvent)
            .unwrap_or(false);
        at_risk && plugin_trigger
    }

    fn build(&self, ctx: &PolicyContext<'_>) -> InterventionDirective {
        directive(ctx, self.name(), Urgency::High, base_payload(ctx))
    }
}

//
// ================= Social-Alternative =================
//

/// Suggests an alternative when peer-pressure spend pushes the goal over.
pub struct SocialAlternative;

impl InterventionPolicy for SocialAlternative {
    fn name(&self) -> &'static str {
        "social_alternative"
    }

    fn can_handle(&self, ctx: &PolicyContext<'_>) -> bool {
        ctx.evaluation.verdict == Verdict::Red
            && ctx
                .trigger
                .map(|t| t.category == Category::SocialDiscretionary)
                .unwrap_or(false)
    }

    fn build(&self, ctx: &PolicyContext<'_>) -> InterventionDirective {
        directive(ctx, self.name(), Urgency::Medium, base_payload(ctx))
    }
}

//
// ================= Future-Self =================
//

/// Positive reinforcement when the goal recovers or a savings milestone is
/// crossed. The image itself is generated externally; the directive only
/// carries a reference placeholder.
pub struct FutureSelf;

impl FutureSelf {
    fn comfort_minor(goal: &Goal) -> i64 {
        (goal.target_minor as f64 * COMFORT_MILESTONE_RATIO) as i64
    }
}

impl InterventionPolicy for FutureSelf {
    fn name(&self) -> &'static str {
        "future_self"
    }

    fn can_handle(&self, ctx: &PolicyContext<'_>) -> bool {
        let Some(previous) = ctx.previous else {
            return false;
        };

        let recovered = matches!(previous.verdict, Verdict::Orange | Verdict::Red)
            && ctx.evaluation.verdict == Verdict::Green;

        // A milestone only exists against the same goal's own history; a
        // pre-goal NONE baseline or a superseded goal is not progress.
        let same_goal =
            previous.verdict != Verdict::None && previous.goal_id == ctx.evaluation.goal_id;
        let comfort = Self::comfort_minor(ctx.goal);
        let milestone_crossed = same_goal
            && previous.remaining_minor < comfort
            && ctx.evaluation.remaining_minor >= comfort;

        recovered || milestone_crossed
    }

    fn build(&self, ctx: &PolicyContext<'_>) -> InterventionDirective {
        let mut payload = base_payload(ctx);
        payload.image_ref = Some(format!("future-self/{}", ctx.user_id));
        directive(ctx, self.name(), Urgency::Low, payload)
    }
}

//
// ================= Registry =================
//

/// Ordered set of policies; first claim wins.
pub struct PolicyRegistry {
    policies: Vec<Box<dyn InterventionPolicy>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self {
            policies: Vec::new(),
        }
    }

    pub fn register(&mut self, policy: Box<dyn InterventionPolicy>) {
        self.policies.push(policy);
    }

    /// Evaluate policies in registration order; at most one directive.
    pub fn select(&self, ctx: &PolicyContext<'_>) -> Option<InterventionDirective> {
        for policy in &self.policies {
            if policy.can_handle(ctx) {
                debug!(policy = policy.name(), user_id = ?ctx.user_id, "Policy claimed verdict");
                return Some(policy.build(ctx));
            }
        }
        None
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The standard priority order: Impulse-Guard > Social-Alternative >
/// Future-Self.
pub fn create_default_registry() -> PolicyRegistry {
    let mut registry = PolicyRegistry::new();
    registry.register(Box::new(ImpulseGuard));
    registry.register(Box::new(SocialAlternative));
    registry.register(Box::new(FutureSelf));
    registry
}

//
// ================= Dedup ledger =================
//

/// Rolling table of dispatched dedup keys; entries expire after
/// `DEDUP_TTL_HOURS` to bound its size.
pub struct DedupLedger {
    dispatched: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
    ttl: Duration,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self {
            dispatched: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::hours(DEDUP_TTL_HOURS),
        }
    }

    pub async fn seen(&self, key: &str, now: DateTime<Utc>) -> bool {
        let dispatched = self.dispatched.read().await;
        match dispatched.get(key) {
            Some(at) => now - *at < self.ttl,
            None => false,
        }
    }

    /// Record a key once the delivery collaborator accepted the directive.
    pub async fn record(&self, key: &str, now: DateTime<Utc>) {
        let mut dispatched = self.dispatched.write().await;
        dispatched.retain(|_, at| now - *at < self.ttl);
        dispatched.insert(key.to_string(), now);
    }
}

impl Default for DedupLedger {
    fn default() -> Self {
        Self::new()
    }
}
