/*
Reads and writes against the hosted tables.

Expense and budget calls degrade to canned data when the tables are not
deployed yet; every other failure is returned to the caller untouched.
 */

use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, error, warn};

use super::connection::Connection;
use super::fallback;
use super::rest::{Order, Table};
use crate::budget::aggregates::sum_by_category;
use crate::budget::Month;
use crate::database::error::StoreError;
use crate::database::models::budget::BudgetUpsert;
use crate::database::models::expense::ExpenseInsert;
use crate::database::models::{
    Budget, Expense, NewExpense, ProfileUpdate, SpendingRow, UserProfile,
};

pub const EXPENSES: &str = "expenses";
pub const BUDGETS: &str = "budgets";
pub const USER_PROFILES: &str = "user_profiles";

/// Newest-first page size for the expense list.
pub const EXPENSE_PAGE: usize = 50;

#[derive(Debug, Clone)]
pub struct DataService {
    conn: Connection,
}

impl DataService {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /* ==========Expenses=========== */

    pub async fn list_expenses(&self, user_id: Option<&str>) -> Result<Vec<Expense>, StoreError> {
        debug!(?user_id, "listing expenses");
        let mut query = Table::new(&self.conn, EXPENSES)
            .select("*")
            .order("date", Order::Descending)
            .limit(EXPENSE_PAGE);
        if let Some(uid) = user_id {
            query = query.eq("user_id", uid);
        }

        match query.fetch::<Expense>().await {
            Ok(rows) => Ok(rows),
            Err(err) if err.is_table_missing() => {
                warn!("expenses table is missing, serving sample data");
                Ok(fallback::sample_expenses(Utc::now()))
            }
            Err(err) => {
                error!(error = %err, "failed to list expenses");
                Err(err)
            }
        }
    }

    pub async fn create_expense(
        &self,
        draft: &NewExpense,
        user_id: Option<&str>,
    ) -> Result<Expense, StoreError> {
        if draft.amount <= Decimal::ZERO {
            return Err(StoreError::Invalid("amount must be greater than zero".into()));
        }
        debug!(?user_id, category = %draft.category, amount = %draft.amount, "adding expense");

        let row = ExpenseInsert { draft, user_id };
        match Table::new(&self.conn, EXPENSES).insert(&row).await {
            Ok(expense) => Ok(expense),
            Err(err) if err.is_table_missing() => {
                warn!("expenses table is missing, keeping expense locally");
                Ok(fallback::synthetic_expense(draft, user_id, Utc::now()))
            }
            Err(err) => {
                error!(error = %err, "failed to add expense");
                Err(err)
            }
        }
    }

    pub async fn delete_expense(&self, id: &str) -> Result<(), StoreError> {
        debug!(id, "deleting expense");
        Table::new(&self.conn, EXPENSES)
            .delete()
            .eq("id", id)
            .execute()
            .await
    }

    /* ==========Budgets=========== */

    pub async fn list_budgets(&self, user_id: Option<&str>) -> Result<Vec<Budget>, StoreError> {
        debug!(?user_id, "listing budgets");
        let mut query = Table::new(&self.conn, BUDGETS).select("*");
        if let Some(uid) = user_id {
            query = query.eq("user_id", uid);
        }

        match query.fetch::<Budget>().await {
            Ok(rows) => Ok(rows),
            Err(err) if err.is_table_missing() => {
                warn!("budgets table is missing, serving default budgets");
                Ok(fallback::default_budgets(Utc::now()))
            }
            Err(err) => {
                error!(error = %err, "failed to list budgets");
                Err(err)
            }
        }
    }

    /// Creates or replaces the limit for `category`. One row per
    /// (user, category); without a user the category alone is the key.
    pub async fn set_budget(
        &self,
        category: &str,
        limit: Decimal,
        user_id: Option<&str>,
    ) -> Result<Budget, StoreError> {
        if limit <= Decimal::ZERO {
            return Err(StoreError::Invalid("monthly limit must be greater than zero".into()));
        }
        debug!(?user_id, category, %limit, "setting budget");

        let row = BudgetUpsert {
            category,
            monthly_limit: limit,
            user_id,
        };
        let on_conflict = if user_id.is_some() { "user_id,category" } else { "category" };
        match Table::new(&self.conn, BUDGETS).upsert(&row, on_conflict).await {
            Ok(budget) => Ok(budget),
            Err(err) if err.is_table_missing() => {
                warn!("budgets table is missing, keeping budget locally");
                Ok(fallback::synthetic_budget(category, limit, user_id, Utc::now()))
            }
            Err(err) => {
                error!(error = %err, "failed to set budget");
                Err(err)
            }
        }
    }

    /* ==========User profile=========== */

    pub async fn get_user_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        Table::new(&self.conn, USER_PROFILES)
            .select("*")
            .eq("id", user_id)
            .maybe_single()
            .await
    }

    pub async fn update_user_profile(&self, profile: &ProfileUpdate) -> Result<UserProfile, StoreError> {
        Table::new(&self.conn, USER_PROFILES)
            .upsert(profile, "id")
            .await
    }

    /* ==========Analytics=========== */

    /// Raw rows dated inside the given calendar month.
    pub async fn monthly_spending(&self, year: i32, month: u32) -> Result<Vec<SpendingRow>, StoreError> {
        let period = Month::new(year, month)
            .ok_or_else(|| StoreError::Invalid(format!("no such month: {year}-{month}")))?;
        self.spending_in(period).await
    }

    /// Category totals for the current calendar month.
    pub async fn category_spending_this_month(&self) -> Result<BTreeMap<String, Decimal>, StoreError> {
        let rows = self.spending_in(Month::current()).await?;
        Ok(sum_by_category(
            rows.iter().map(|r| (r.category.as_str(), r.amount)),
        ))
    }

    async fn spending_in(&self, period: Month) -> Result<Vec<SpendingRow>, StoreError> {
        Table::new(&self.conn, EXPENSES)
            .select("amount,category,date")
            .gte("date", period.first_day())
            .lt("date", period.next().first_day())
            .fetch()
            .await
    }
}
