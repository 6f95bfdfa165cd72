//! Spend Guardian
//!
//! The decision core of a conversational financial assistant:
//! - Normalizes bank-feed, checkout-detection, and chat-goal events
//! - Maintains per-user goals and an append-only transaction ledger
//! - Evaluates spending against the goal (GREEN / ORANGE / RED)
//! - Selects at most one pluggable intervention policy per cycle
//! - Hands directives to an external delivery collaborator
//!
//! UNIFIED LOOP:
//! EVENT → OBSERVE → REASON → ACT → (FAILED | NONE-ACT | DISPATCHED)

pub mod agent;
pub mod api;
pub mod audit;
pub mod categorizer;
pub mod delivery;
pub mod error;
pub mod eval;
pub mod ingest;
pub mod models;
pub mod parser;
pub mod policy;
pub mod store;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use policy::{create_default_registry, InterventionPolicy, PolicyRegistry};
