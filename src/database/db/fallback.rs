//! Canned rows served when the expenses/budgets tables are not deployed, so
//! the UI stays usable before the schema is installed.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::database::models::{Budget, Expense, NewExpense};

pub const DEFAULT_BUDGETS: [(&str, i64); 5] = [
    ("Food & Dining", 6000),
    ("Transportation", 3000),
    ("Shopping", 4000),
    ("Rent & Bills", 12000),
    ("Entertainment", 2000),
];

/// Two sample expenses dated today and yesterday.
pub fn sample_expenses(now: DateTime<Utc>) -> Vec<Expense> {
    let yesterday = now - Duration::days(1);
    vec![
        Expense {
            id: "1".into(),
            user_id: None,
            amount: Decimal::from(456),
            category: "Food & Dining".into(),
            description: "Grocery Store".into(),
            date: now.date_naive(),
            note: None,
            receipt_url: None,
            created_at: now,
        },
        Expense {
            id: "2".into(),
            user_id: None,
            amount: Decimal::from(350),
            category: "Transportation".into(),
            description: "Petrol Pump".into(),
            date: yesterday.date_naive(),
            note: None,
            receipt_url: None,
            created_at: yesterday,
        },
    ]
}

pub fn default_budgets(now: DateTime<Utc>) -> Vec<Budget> {
    DEFAULT_BUDGETS
        .iter()
        .enumerate()
        .map(|(i, (category, limit))| Budget {
            id: (i + 1).to_string(),
            user_id: None,
            category: category.to_string(),
            monthly_limit: Decimal::from(*limit),
            created_at: now,
        })
        .collect()
}

/// Ids handed out for rows that were never persisted.
pub fn local_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn synthetic_expense(draft: &NewExpense, user_id: Option<&str>, now: DateTime<Utc>) -> Expense {
    draft
        .clone()
        .into_local(local_id(), user_id.map(str::to_string), now)
}

pub fn synthetic_budget(
    category: &str,
    limit: Decimal,
    user_id: Option<&str>,
    now: DateTime<Utc>,
) -> Budget {
    Budget {
        id: local_id(),
        user_id: user_id.map(str::to_string),
        category: category.to_string(),
        monthly_limit: limit,
        created_at: now,
    }
}

/// True when the expenses look like the canned sample rather than real data.
pub fn is_sample(expenses: &[Expense]) -> bool {
    expenses.len() == 2
        && expenses.iter().map(|e| e.id.as_str()).eq(["1", "2"])
        && expenses[0].description == "Grocery Store"
}
