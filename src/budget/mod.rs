//! Per-user cache of expenses and budgets with derived monthly aggregates.
//!
//! The cache belongs to one user identity at a time. Every identity change
//! starts a new generation: the arrays are cleared and any load or mutation
//! that started under an older generation is not allowed to write back.

pub mod aggregates;
mod month;
pub mod store;

use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::auth::session::SessionState;
use crate::database::db::fallback;
use crate::database::models::{Budget, Expense, NewExpense};
use crate::database::StoreError;

pub use aggregates::MonthlySummary;
pub use month::Month;
pub use store::ExpenseStore;

/// Point-in-time copy of the cache handed to views.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BudgetSnapshot {
    pub user_id: Option<String>,
    pub expenses: Vec<Expense>,
    pub budgets: Vec<Budget>,
    pub loading: bool,
    pub last_error: Option<String>,
}

impl BudgetSnapshot {
    pub fn summary(&self, month: Month) -> MonthlySummary {
        MonthlySummary::compute(&self.expenses, &self.budgets, month)
    }

    /// The store had no expenses table and served the canned rows.
    pub fn is_sample_data(&self) -> bool {
        fallback::is_sample(&self.expenses)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Committed,
    Failed,
    /// The user changed while the fetch was in flight; the result was dropped.
    Superseded,
}

#[derive(Debug, Default)]
struct CacheState {
    user_id: Option<String>,
    generation: u64,
    expenses: Vec<Expense>,
    budgets: Vec<Budget>,
    pending_loads: usize,
    last_error: Option<String>,
}

pub struct BudgetContext {
    store: Arc<dyn ExpenseStore>,
    state: Mutex<CacheState>,
    revision: watch::Sender<u64>,
}

impl BudgetContext {
    pub fn new(store: Arc<dyn ExpenseStore>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            store,
            state: Mutex::new(CacheState::default()),
            revision,
        }
    }

    /// Ticks every time the cache, the loading flag or the error changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn notify(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        let s = self.state.lock();
        BudgetSnapshot {
            user_id: s.user_id.clone(),
            expenses: s.expenses.clone(),
            budgets: s.budgets.clone(),
            loading: s.pending_loads > 0,
            last_error: s.last_error.clone(),
        }
    }

    pub fn user_id(&self) -> Option<String> {
        self.state.lock().user_id.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().pending_loads > 0
    }

    pub fn summary(&self, month: Month) -> MonthlySummary {
        let s = self.state.lock();
        MonthlySummary::compute(&s.expenses, &s.budgets, month)
    }

    /// Switches the cache to `user_id`. Returns false when the identity did
    /// not change; otherwise the cache is emptied and a new generation begins.
    pub fn set_user(&self, user_id: Option<String>) -> bool {
        {
            let mut s = self.state.lock();
            if s.user_id == user_id {
                return false;
            }
            debug!(from = ?s.user_id, to = ?user_id, "budget cache switching user");
            s.user_id = user_id;
            s.generation += 1;
            s.expenses.clear();
            s.budgets.clear();
            s.pending_loads = 0;
            s.last_error = None;
        }
        self.notify();
        true
    }

    /// Fetches expenses and budgets together and replaces the cache only
    /// when both arrive. A failed fetch keeps the previous data visible.
    pub async fn load(&self) -> LoadOutcome {
        let (generation, user_id) = {
            let mut s = self.state.lock();
            s.pending_loads += 1;
            (s.generation, s.user_id.clone())
        };
        self.notify();
        info!(user_id = ?user_id, "loading expenses and budgets");

        let uid = user_id.as_deref();
        let (expenses, budgets) = tokio::join!(
            self.store.list_expenses(uid),
            self.store.list_budgets(uid)
        );

        let outcome = {
            let mut s = self.state.lock();
            if s.generation != generation {
                debug!(user_id = ?user_id, "discarding load for a previous user");
                return LoadOutcome::Superseded;
            }
            s.pending_loads = s.pending_loads.saturating_sub(1);
            match (expenses, budgets) {
                (Ok(expenses), Ok(budgets)) => {
                    info!(expenses = expenses.len(), budgets = budgets.len(), "budget cache loaded");
                    s.expenses = expenses;
                    s.budgets = budgets;
                    s.last_error = None;
                    LoadOutcome::Committed
                }
                (Err(err), _) | (_, Err(err)) => {
                    error!(error = %err, "failed to load budget data");
                    s.last_error = Some(err.to_string());
                    LoadOutcome::Failed
                }
            }
        };
        self.notify();
        outcome
    }

    pub async fn refresh(&self) -> LoadOutcome {
        self.load().await
    }

    /// Persists the expense, then puts the stored row at the head of the cache.
    pub async fn add_expense(&self, draft: NewExpense) -> Result<Expense, StoreError> {
        let (generation, user_id) = self.current();
        let expense = self
            .store
            .create_expense(&draft, user_id.as_deref())
            .await
            .inspect_err(|err| error!(error = %err, "error adding expense"))?;

        if self.apply(generation, |s| s.expenses.insert(0, expense.clone())) {
            self.notify();
        }
        Ok(expense)
    }

    /// Upserts the limit, then replaces the cached row for the category or
    /// appends one.
    pub async fn set_budget_limit(&self, category: &str, limit: Decimal) -> Result<Budget, StoreError> {
        let (generation, user_id) = self.current();
        debug!(category, %limit, "setting budget limit");
        let budget = self
            .store
            .set_budget(category, limit, user_id.as_deref())
            .await
            .inspect_err(|err| error!(error = %err, "error setting budget"))?;

        let applied = self.apply(generation, |s| {
            match s.budgets.iter_mut().find(|b| b.category == category) {
                Some(existing) => *existing = budget.clone(),
                None => s.budgets.push(budget.clone()),
            }
        });
        if applied {
            self.notify();
        }
        Ok(budget)
    }

    pub async fn delete_expense(&self, id: &str) -> Result<(), StoreError> {
        let (generation, _) = self.current();
        self.store
            .delete_expense(id)
            .await
            .inspect_err(|err| error!(error = %err, id, "error deleting expense"))?;

        if self.apply(generation, |s| s.expenses.retain(|e| e.id != id)) {
            self.notify();
        }
        Ok(())
    }

    /// Keeps the cache on the user published by the session channel. Each
    /// identity change clears the cache and spawns a fresh load.
    pub fn watch_session(self: Arc<Self>, mut session: watch::Receiver<SessionState>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let user_id = session.borrow_and_update().user().map(|u| u.id.clone());
                let signed_in = user_id.is_some();
                if self.set_user(user_id) && signed_in {
                    let ctx = Arc::clone(&self);
                    tokio::spawn(async move {
                        ctx.load().await;
                    });
                }
                if session.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    fn current(&self) -> (u64, Option<String>) {
        let s = self.state.lock();
        (s.generation, s.user_id.clone())
    }

    fn apply(&self, generation: u64, f: impl FnOnce(&mut CacheState)) -> bool {
        let mut s = self.state.lock();
        if s.generation != generation {
            debug!("user changed during mutation, cache left alone");
            return false;
        }
        f(&mut s);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::types::{Session, User};
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeStore {
        expenses: Mutex<HashMap<String, Vec<Expense>>>,
        budgets: Mutex<Vec<Budget>>,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
        gate: Mutex<Option<(String, Arc<Notify>)>>,
        entered: Notify,
        next_id: AtomicU64,
    }

    fn key(user_id: Option<&str>) -> String {
        user_id.unwrap_or_default().to_string()
    }

    fn failure() -> StoreError {
        StoreError::Api {
            status: 500,
            code: Some("XX000".into()),
            message: "boom".into(),
            details: None,
            hint: None,
        }
    }

    impl FakeStore {
        fn seed(&self, user_id: &str, rows: Vec<Expense>) {
            self.expenses.lock().insert(user_id.to_string(), rows);
        }

        fn block_user(&self, user_id: &str) -> Arc<Notify> {
            let notify = Arc::new(Notify::new());
            *self.gate.lock() = Some((user_id.to_string(), Arc::clone(&notify)));
            notify
        }
    }

    #[async_trait]
    impl ExpenseStore for FakeStore {
        async fn list_expenses(&self, user_id: Option<&str>) -> Result<Vec<Expense>, StoreError> {
            let gate = self
                .gate
                .lock()
                .clone()
                .filter(|(uid, _)| Some(uid.as_str()) == user_id);
            if let Some((_, notify)) = gate {
                self.entered.notify_one();
                notify.notified().await;
            }
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(failure());
            }
            Ok(self.expenses.lock().get(&key(user_id)).cloned().unwrap_or_default())
        }

        async fn list_budgets(&self, user_id: Option<&str>) -> Result<Vec<Budget>, StoreError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(failure());
            }
            Ok(self
                .budgets
                .lock()
                .iter()
                .filter(|b| b.user_id.as_deref() == user_id)
                .cloned()
                .collect())
        }

        async fn create_expense(
            &self,
            draft: &NewExpense,
            user_id: Option<&str>,
        ) -> Result<Expense, StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(failure());
            }
            let id = format!("exp-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            let row = draft
                .clone()
                .into_local(id, user_id.map(str::to_string), Utc::now());
            self.expenses
                .lock()
                .entry(key(user_id))
                .or_default()
                .insert(0, row.clone());
            Ok(row)
        }

        async fn delete_expense(&self, id: &str) -> Result<(), StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(failure());
            }
            for rows in self.expenses.lock().values_mut() {
                rows.retain(|e| e.id != id);
            }
            Ok(())
        }

        async fn set_budget(
            &self,
            category: &str,
            limit: Decimal,
            user_id: Option<&str>,
        ) -> Result<Budget, StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(failure());
            }
            let mut budgets = self.budgets.lock();
            let position = budgets
                .iter()
                .position(|b| b.category == category && b.user_id.as_deref() == user_id);
            let row = match position {
                Some(i) => {
                    budgets[i].monthly_limit = limit;
                    budgets[i].clone()
                }
                None => {
                    let row = Budget {
                        id: format!("bud-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
                        user_id: user_id.map(str::to_string),
                        category: category.to_string(),
                        monthly_limit: limit,
                        created_at: Utc::now(),
                    };
                    budgets.push(row.clone());
                    row
                }
            };
            Ok(row)
        }
    }

    fn expense(id: &str, user: &str, amount: i64, date: &str) -> Expense {
        Expense {
            id: id.into(),
            user_id: Some(user.into()),
            amount: Decimal::from(amount),
            category: "Food & Dining".into(),
            description: "Lunch".into(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            note: None,
            receipt_url: None,
            created_at: Utc::now(),
        }
    }

    fn context() -> (Arc<FakeStore>, Arc<BudgetContext>) {
        let store = Arc::new(FakeStore::default());
        let ctx = Arc::new(BudgetContext::new(store.clone()));
        (store, ctx)
    }

    fn session_for(user_id: &str) -> SessionState {
        SessionState::Authenticated(Session {
            access_token: format!("token-{user_id}"),
            token_type: "bearer".into(),
            expires_in: 3600,
            expires_at: None,
            refresh_token: "refresh".into(),
            user: User {
                id: user_id.into(),
                email: Some(format!("{user_id}@example.com")),
                created_at: None,
            },
        })
    }

    async fn wait_until(ctx: &BudgetContext, cond: impl Fn(&BudgetSnapshot) -> bool) {
        let mut rx = ctx.subscribe();
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if cond(&ctx.snapshot()) {
                    return;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn load_replaces_cache_with_both_tables() {
        let (store, ctx) = context();
        store.seed("u1", vec![expense("a", "u1", 10, "2024-12-01")]);
        store.set_budget("Food & Dining", Decimal::from(100), Some("u1")).await.unwrap();

        ctx.set_user(Some("u1".into()));
        assert_eq!(ctx.load().await, LoadOutcome::Committed);

        let snap = ctx.snapshot();
        assert_eq!(snap.expenses.len(), 1);
        assert_eq!(snap.budgets.len(), 1);
        assert!(!snap.loading);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_stale_data() {
        let (store, ctx) = context();
        store.seed("u1", vec![expense("a", "u1", 10, "2024-12-01")]);
        ctx.set_user(Some("u1".into()));
        ctx.load().await;

        store.fail_reads.store(true, Ordering::SeqCst);
        assert_eq!(ctx.refresh().await, LoadOutcome::Failed);

        let snap = ctx.snapshot();
        assert_eq!(snap.expenses.len(), 1);
        assert!(!snap.loading);
        assert_eq!(snap.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn add_expense_prepends_acknowledged_row() {
        let (store, ctx) = context();
        store.seed("u1", vec![expense("old", "u1", 10, "2024-12-01")]);
        ctx.set_user(Some("u1".into()));
        ctx.load().await;

        let draft = NewExpense::new(
            Decimal::from(456),
            "Food & Dining",
            "Grocery Store",
            NaiveDate::from_ymd_opt(2024, 12, 5).unwrap(),
        );
        let row = ctx.add_expense(draft).await.unwrap();

        assert!(!row.id.is_empty());
        assert_eq!(row.user_id.as_deref(), Some("u1"));
        let snap = ctx.snapshot();
        assert_eq!(snap.expenses[0], row);
        assert_eq!(snap.expenses.len(), 2);
    }

    #[tokio::test]
    async fn failed_add_leaves_cache_unchanged() {
        let (store, ctx) = context();
        store.seed("u1", vec![expense("old", "u1", 10, "2024-12-01")]);
        ctx.set_user(Some("u1".into()));
        ctx.load().await;
        let before = ctx.snapshot();

        store.fail_writes.store(true, Ordering::SeqCst);
        let draft = NewExpense::new(Decimal::from(5), "Shopping", "Pen", Utc::now().date_naive());
        assert!(ctx.add_expense(draft).await.is_err());
        assert_eq!(ctx.snapshot(), before);
    }

    #[tokio::test]
    async fn budget_limit_is_replaced_not_appended() {
        let (_store, ctx) = context();
        ctx.set_user(Some("u1".into()));

        ctx.set_budget_limit("Food", Decimal::from(100)).await.unwrap();
        ctx.set_budget_limit("Food", Decimal::from(200)).await.unwrap();
        ctx.set_budget_limit("Rent", Decimal::from(900)).await.unwrap();
        ctx.set_budget_limit("Rent", Decimal::from(900)).await.unwrap();

        let budgets = ctx.snapshot().budgets;
        let food: Vec<_> = budgets.iter().filter(|b| b.category == "Food").collect();
        let rent: Vec<_> = budgets.iter().filter(|b| b.category == "Rent").collect();
        assert_eq!(food.len(), 1);
        assert_eq!(food[0].monthly_limit, Decimal::from(200));
        assert_eq!(rent.len(), 1);
        assert_eq!(rent[0].monthly_limit, Decimal::from(900));
    }

    #[tokio::test]
    async fn delete_removes_from_cache_after_store() {
        let (store, ctx) = context();
        store.seed(
            "u1",
            vec![expense("a", "u1", 10, "2024-12-01"), expense("b", "u1", 20, "2024-12-02")],
        );
        ctx.set_user(Some("u1".into()));
        ctx.load().await;

        ctx.delete_expense("a").await.unwrap();
        let ids: Vec<_> = ctx.snapshot().expenses.into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn switching_user_clears_cache() {
        let (store, ctx) = context();
        store.seed("u1", vec![expense("a", "u1", 10, "2024-12-01")]);
        ctx.set_user(Some("u1".into()));
        ctx.load().await;

        assert!(ctx.set_user(None));
        let snap = ctx.snapshot();
        assert!(snap.expenses.is_empty());
        assert!(snap.budgets.is_empty());
        assert!(!ctx.set_user(None));
    }

    #[tokio::test]
    async fn slow_load_for_previous_user_is_discarded() {
        let (store, ctx) = context();
        store.seed("u1", vec![expense("a", "u1", 10, "2024-12-01")]);
        store.seed("u2", vec![expense("b", "u2", 20, "2024-12-02")]);
        let gate = store.block_user("u1");

        ctx.set_user(Some("u1".into()));
        let slow = tokio::spawn({
            let ctx = Arc::clone(&ctx);
            async move { ctx.load().await }
        });
        store.entered.notified().await;

        ctx.set_user(Some("u2".into()));
        assert_eq!(ctx.load().await, LoadOutcome::Committed);

        gate.notify_one();
        assert_eq!(slow.await.unwrap(), LoadOutcome::Superseded);

        let snap = ctx.snapshot();
        assert_eq!(snap.user_id.as_deref(), Some("u2"));
        assert_eq!(snap.expenses.len(), 1);
        assert_eq!(snap.expenses[0].id, "b");
    }

    #[tokio::test]
    async fn follows_session_through_sign_out() {
        let (store, ctx) = context();
        store.seed("u1", vec![expense("a", "u1", 10, "2024-12-01")]);
        let (tx, rx) = watch::channel(SessionState::Loading);
        let task = Arc::clone(&ctx).watch_session(rx);

        tx.send(session_for("u1")).unwrap();
        wait_until(&ctx, |s| s.expenses.len() == 1 && !s.loading).await;

        tx.send(SessionState::Anonymous).unwrap();
        wait_until(&ctx, |s| s.user_id.is_none()).await;
        assert!(ctx.snapshot().expenses.is_empty());

        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn summary_uses_cached_rows() {
        let (store, ctx) = context();
        store.seed(
            "u1",
            vec![expense("a", "u1", 10, "2024-12-01"), expense("b", "u1", 20, "2024-11-30")],
        );
        ctx.set_user(Some("u1".into()));
        ctx.load().await;

        let s = ctx.summary(Month::new(2024, 12).unwrap());
        assert_eq!(s.total_spent, Decimal::from(10));
    }
}
