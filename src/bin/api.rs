use spend_guardian::{
    agent::Orchestrator,
    api::start_server,
    categorizer::KeywordCategorizer,
    delivery::{DeliveryChannel, HttpDelivery, RecordingDelivery},
    eval::EvalThresholds,
    parser::{GoalParser, HttpGoalParser, MockGoalParser},
    policy::create_default_registry,
    store::InMemoryGoalStore,
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("Spend Guardian - API Server");
    info!("Port: {}", api_port);

    let delivery: Arc<dyn DeliveryChannel> = match HttpDelivery::from_env() {
        Some(http) => Arc::new(http),
        None => {
            warn!("DELIVERY_API_BASE_URL not set; directives will only be recorded locally");
            Arc::new(RecordingDelivery::new())
        }
    };

    let parser: Arc<dyn GoalParser> = match HttpGoalParser::from_env() {
        Some(http) => Arc::new(http),
        None => {
            warn!("GOAL_PARSER_BASE_URL not set; falling back to the mock goal parser");
            Arc::new(MockGoalParser)
        }
    };

    // Create orchestrator
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(InMemoryGoalStore::new()),
        Arc::new(KeywordCategorizer),
        parser,
        create_default_registry(),
        delivery,
        EvalThresholds::from_env(),
    ));

    info!("Orchestrator initialized");
    info!("Starting API server...");

    // Start API server
    start_server(orchestrator, api_port).await?;

    Ok(())
}
