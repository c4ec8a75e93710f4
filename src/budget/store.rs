use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::database::models::{Budget, Expense, NewExpense};
use crate::database::{DataService, StoreError};

/// The slice of the data client the budget cache depends on.
#[async_trait]
pub trait ExpenseStore: Send + Sync {
    async fn list_expenses(&self, user_id: Option<&str>) -> Result<Vec<Expense>, StoreError>;

    async fn list_budgets(&self, user_id: Option<&str>) -> Result<Vec<Budget>, StoreError>;

    async fn create_expense(
        &self,
        draft: &NewExpense,
        user_id: Option<&str>,
    ) -> Result<Expense, StoreError>;

    async fn delete_expense(&self, id: &str) -> Result<(), StoreError>;

    async fn set_budget(
        &self,
        category: &str,
        limit: Decimal,
        user_id: Option<&str>,
    ) -> Result<Budget, StoreError>;
}

#[async_trait]
impl ExpenseStore for DataService {
    async fn list_expenses(&self, user_id: Option<&str>) -> Result<Vec<Expense>, StoreError> {
        DataService::list_expenses(self, user_id).await
    }

    async fn list_budgets(&self, user_id: Option<&str>) -> Result<Vec<Budget>, StoreError> {
        DataService::list_budgets(self, user_id).await
    }

    async fn create_expense(
        &self,
        draft: &NewExpense,
        user_id: Option<&str>,
    ) -> Result<Expense, StoreError> {
        DataService::create_expense(self, draft, user_id).await
    }

    async fn delete_expense(&self, id: &str) -> Result<(), StoreError> {
        DataService::delete_expense(self, id).await
    }

    async fn set_budget(
        &self,
        category: &str,
        limit: Decimal,
        user_id: Option<&str>,
    ) -> Result<Budget, StoreError> {
        DataService::set_budget(self, category, limit, user_id).await
    }
}
