//! Transaction categorizer
//!
//! Resolves a merchant into a spend category. The categorizer never fails:
//! absence of a match yields `Unknown`, so ingestion cannot be blocked by a
//! lookup miss.

use crate::models::{Category, TxnSource};
use async_trait::async_trait;

/// Trait for merchant/category resolution
#[async_trait]
pub trait Categorizer: Send + Sync {
    async fn categorize(&self, merchant: &str, amount_minor: i64, source: TxnSource) -> Category;
}

/// Static keyword lists — zero allocation
const ESSENTIAL_KEYWORDS: &[&str] = &[
    // Household
    "grocery", "groceries", "supermarket", "rent", "utility", "electricity",
    "water", "gas", "fuel", "petrol",
    // Health
    "pharmacy", "hospital", "clinic", "insurance",
    // Commute
    "metro", "bus", "rail",
];

const SOCIAL_KEYWORDS: &[&str] = &[
    "bar", "pub", "club", "brewery", "lounge", "karaoke",
    "bowling", "concert", "nightlife",
];

const NON_ESSENTIAL_KEYWORDS: &[&str] = &[
    // Shopping
    "fashion", "apparel", "shoe", "electronics", "gadget",
    "amazon", "flipkart", "myntra",
    // Food delivery & entertainment
    "zomato", "swiggy", "restaurant", "cafe", "cinema", "game", "streaming",
];

/// Keyword-table categorizer used as the default collaborator.
///
/// A merchant-code lookup service can replace this behind the trait; the
/// contract stays the same — no match means `Unknown`, never an error.
pub struct KeywordCategorizer;

#[async_trait]
impl Categorizer for KeywordCategorizer {
    async fn categorize(&self, merchant: &str, _amount_minor: i64, _source: TxnSource) -> Category {
        let merchant = merchant.to_lowercase();

        if ESSENTIAL_KEYWORDS.iter().any(|kw| merchant.contains(kw)) {
            Category::Essential
        } else if SOCIAL_KEYWORDS.iter().any(|kw| merchant.contains(kw)) {
            Category::SocialDiscretionary
        } else if NON_ESSENTIAL_KEYWORDS.iter().any(|kw| merchant.contains(kw)) {
            Category::NonEssential
        } else {
            Category::Unknown
        }
    }
}
