use chrono::Utc;
use spend_guardian::{
    agent::Orchestrator,
    categorizer::KeywordCategorizer,
    delivery::RecordingDelivery,
    eval::EvalThresholds,
    models::{GoalPeriod, InboundEvent, NewGoal},
    parser::MockGoalParser,
    policy::create_default_registry,
    store::InMemoryGoalStore,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    info!("Spend Guardian starting");

    // Create components
    let delivery = Arc::new(RecordingDelivery::new());
    let orchestrator = Orchestrator::new(
        Arc::new(InMemoryGoalStore::new()),
        Arc::new(KeywordCategorizer),
        Arc::new(MockGoalParser),
        create_default_registry(),
        delivery.clone(),
        EvalThresholds::from_env(),
    );

    let user_id = Uuid::new_v4();
    let now = Utc::now();

    // Declare a monthly goal: save 5000.00, budget 2000.00 non-essential.
    let report = orchestrator
        .declare_goal(
            user_id,
            NewGoal {
                title: Some("Buy a laptop".to_string()),
                target_minor: 5000_00,
                budget_minor: 2000_00,
                currency: "INR".to_string(),
                period: GoalPeriod::calendar_month(now),
            },
            now,
        )
        .await?;
    info!(verdict = %report.verdict, outcome = %report.outcome, "Goal declared");

    // Replay a small burst of events.
    let events = vec![
        InboundEvent::BankFeed {
            idempotency_key: "demo-bank-1".to_string(),
            user_id,
            amount_minor: 1000_00,
            currency: "INR".to_string(),
            merchant: "Myntra Fashion".to_string(),
            occurred_at: now,
        },
        InboundEvent::BankFeed {
            idempotency_key: "demo-bank-2".to_string(),
            user_id,
            amount_minor: 600_00,
            currency: "INR".to_string(),
            merchant: "Swiggy".to_string(),
            occurred_at: now,
        },
        InboundEvent::Checkout {
            idempotency_key: "demo-checkout-1".to_string(),
            user_id,
            amount_minor: 1200_00,
            currency: "INR".to_string(),
            merchant: "gadget-cart".to_string(),
            page_url: "https://shop.example/checkout".to_string(),
            occurred_at: now,
        },
        // Webhook redelivery of the checkout event: idempotent no-op.
        InboundEvent::Checkout {
            idempotency_key: "demo-checkout-1".to_string(),
            user_id,
            amount_minor: 1200_00,
            currency: "INR".to_string(),
            merchant: "gadget-cart".to_string(),
            page_url: "https://shop.example/checkout".to_string(),
            occurred_at: now,
        },
    ];

    println!("\n=== CYCLE REPORTS ===");
    for event in events {
        let key = event.idempotency_key().to_string();
        let report = orchestrator.run_cycle(event).await?;
        println!(
            "{}: verdict={} outcome={} directive_issued={}",
            key, report.verdict, report.outcome, report.directive_issued
        );
    }

    println!("\n=== DISPATCHED DIRECTIVES ===");
    for directive in delivery.dispatched().await {
        println!(
            "policy={} urgency={:?} dedup_key={}",
            directive.policy, directive.urgency, directive.dedup_key
        );
    }

    Ok(())
}
