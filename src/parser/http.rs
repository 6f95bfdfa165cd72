//! HTTP-backed goal parser
//!
//! Calls the external language-understanding service that turns a chat
//! goal declaration into structured amounts and a period.

use crate::error::GuardianError;
use crate::models::{GoalPeriod, ParsedGoal};
use crate::parser::GoalParser;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ParseResponse {
    parsed: bool,
    title: Option<String>,
    target_minor: Option<i64>,
    budget_minor: Option<i64>,
    currency: Option<String>,
    period_start: Option<DateTime<Utc>>,
    period_end: Option<DateTime<Utc>>,
}

pub struct HttpGoalParser {
    client: Client,
    base_url: String,
}

impl HttpGoalParser {
    pub fn new(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build from `GOAL_PARSER_BASE_URL` (or `NLU_API_BASE_URL`); `None`
    /// when neither is configured.
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("GOAL_PARSER_BASE_URL")
            .or_else(|_| env::var("NLU_API_BASE_URL"))
            .ok()?;
        Self::new(base_url).ok()
    }
}

#[async_trait]
impl GoalParser for HttpGoalParser {
    async fn parse(&self, text: &str, at: DateTime<Utc>) -> Result<Option<ParsedGoal>> {
        let url = format!("{}/api/v1/goals/parse", self.base_url);

        let response = self
            .client
            .post(url)
            .json(&json!({ "text": text, "at": at }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GuardianError::CollaboratorError(format!(
                "goal parser returned {}",
                status
            )));
        }

        let body: ParseResponse = response.json().await?;
        if !body.parsed {
            return Ok(None);
        }

        // Amounts are mandatory in a parsed result; a period defaults to
        // the calendar month of the declaration.
        let (Some(target_minor), Some(budget_minor)) = (body.target_minor, body.budget_minor)
        else {
            return Ok(None);
        };

        let period = match (body.period_start, body.period_end) {
            (Some(start), Some(end)) => GoalPeriod::new(start, end),
            _ => GoalPeriod::calendar_month(at),
        };

        Ok(Some(ParsedGoal {
            title: body.title,
            target_minor,
            budget_minor,
            currency: body.currency.unwrap_or_else(|| "INR".to_string()),
            period,
        }))
    }
}
