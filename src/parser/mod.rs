//! Goal-declaration parser trait and implementations
//!
//! Chat-declared goals are free text; turning them into a structured
//! `{target, budget, period}` is a language-understanding collaborator's
//! job. The ingestor never attempts its own NLP.

use crate::models::{GoalPeriod, ParsedGoal};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod http;
pub use http::HttpGoalParser;

/// Trait for structured goal parsing (language understanding external)
#[async_trait]
pub trait GoalParser: Send + Sync {
    /// `Ok(None)` means the collaborator could not produce a structured
    /// result; the ingestor surfaces that as `UnparsableGoal`.
    async fn parse(&self, text: &str, at: DateTime<Utc>) -> Result<Option<ParsedGoal>>;
}

/// Mock parser for development & testing
/// Keeps the system functional without an NLU dependency
pub struct MockGoalParser;

#[async_trait]
impl GoalParser for MockGoalParser {
    async fn parse(&self, text: &str, at: DateTime<Utc>) -> Result<Option<ParsedGoal>> {
        // A declaration with no digits has nothing to anchor amounts on.
        if !text.chars().any(|c| c.is_ascii_digit()) {
            return Ok(None);
        }

        Ok(Some(ParsedGoal {
            title: Some(text.chars().take(64).collect()),
            target_minor: 5000_00,
            budget_minor: 2000_00,
            currency: "INR".to_string(),
            period: GoalPeriod::calendar_month(at),
        }))
    }
}
