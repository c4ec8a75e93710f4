use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub category: String,               // unique per user
    #[serde(with = "rust_decimal::serde::float")]
    pub monthly_limit: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Row shape upserted into the `budgets` table.
#[derive(Debug, Serialize)]
pub(crate) struct BudgetUpsert<'a> {
    pub category: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    pub monthly_limit: Decimal,
    pub user_id: Option<&'a str>,
}
