use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub category: String,
    pub description: String,
    pub date: NaiveDate,                // calendar day the money was spent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Expense as submitted by the user, before the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExpense {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub category: String,
    pub description: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_url: Option<String>,
}

impl NewExpense {
    pub fn new(
        amount: Decimal,
        category: impl Into<String>,
        description: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            amount,
            category: category.into(),
            description: description.into(),
            date,
            note: None,
            receipt_url: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Materializes the draft into a row that was never persisted.
    pub fn into_local(self, id: String, user_id: Option<String>, created_at: DateTime<Utc>) -> Expense {
        Expense {
            id,
            user_id,
            amount: self.amount,
            category: self.category,
            description: self.description,
            date: self.date,
            note: self.note,
            receipt_url: self.receipt_url,
            created_at,
        }
    }
}

/// Row shape written to the `expenses` table.
#[derive(Debug, Serialize)]
pub(crate) struct ExpenseInsert<'a> {
    #[serde(flatten)]
    pub draft: &'a NewExpense,
    pub user_id: Option<&'a str>,
}

/// Projection used by the monthly analytics queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendingRow {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub category: String,
    pub date: NaiveDate,
}
