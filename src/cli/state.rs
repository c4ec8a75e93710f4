// src/cli/state.rs
use std::collections::BTreeMap;
use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::widgets::TableState;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::auth::{OAuthProvider, SessionContext, SessionState};
use crate::backend::BackendClient;
use crate::budget::{BudgetContext, BudgetSnapshot, Month};
use crate::cli::input::LineEdit;
use crate::cli::router::{self, Route};
use crate::cli::util::{iso, parse_date_any, parse_money, today};
use crate::database::models::{NewExpense, ProfileUpdate, UserProfile};
use crate::database::{DataService, StoreError};

pub const EXPENSE_CATEGORIES: [&str; 5] = [
    "Food & Dining",
    "Transportation",
    "Shopping",
    "Rent & Bills",
    "Entertainment",
];

/// Categories offered on the budget setup page with their starting limits.
pub const SETUP_CATEGORIES: [(&str, i64); 8] = [
    ("Food & Dining", 6000),
    ("Transportation", 3000),
    ("Shopping", 4000),
    ("Rent & Bills", 12000),
    ("Entertainment", 2000),
    ("Healthcare", 3000),
    ("Work Related", 1500),
    ("Gaming", 1000),
];

pub const DEFAULT_MONTHLY_INCOME: i64 = 45000;
pub const SAVINGS_GOAL: i64 = 15000;
pub const RECENT_COUNT: usize = 4;
pub const REPORT_MONTHS: usize = 6;

/* ==========Auth page=========== */

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthMode {
    #[default]
    SignIn,
    SignUp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthField {
    #[default]
    Email,
    Password,
    Redirect,
}

#[derive(Default)]
pub struct AuthPage {
    pub mode: AuthMode,
    pub email: LineEdit,
    pub password: LineEdit,
    pub redirect: LineEdit,
    pub focus: AuthField,
    pub editing: bool,
    pub oauth_url: Option<String>,
    pub error: Option<String>,
    pub success: Option<String>,
}

impl AuthPage {
    fn new() -> Self {
        Self {
            password: LineEdit::password(),
            ..Default::default()
        }
    }

    fn fields(&self) -> &'static [AuthField] {
        if self.oauth_url.is_some() {
            &[AuthField::Email, AuthField::Password, AuthField::Redirect]
        } else {
            &[AuthField::Email, AuthField::Password]
        }
    }

    fn move_focus(&mut self, delta: isize) {
        let fields = self.fields();
        let cur = fields.iter().position(|f| *f == self.focus).unwrap_or(0) as isize;
        let next = (cur + delta).rem_euclid(fields.len() as isize) as usize;
        self.focus = fields[next];
    }

    fn field_mut(&mut self) -> &mut LineEdit {
        match self.focus {
            AuthField::Email => &mut self.email,
            AuthField::Password => &mut self.password,
            AuthField::Redirect => &mut self.redirect,
        }
    }
}

/* ==========Add expense=========== */

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExpenseField {
    #[default]
    Amount,
    Category,
    Description,
    Date,
    Note,
}

impl ExpenseField {
    fn next(self) -> Self {
        use ExpenseField::*;
        match self { Amount => Category, Category => Description, Description => Date, Date => Note, Note => Amount }
    }
    fn prev(self) -> Self {
        use ExpenseField::*;
        match self { Amount => Note, Note => Date, Date => Description, Description => Category, Category => Amount }
    }
}

#[derive(Default)]
pub struct AddExpenseForm {
    pub amount: LineEdit,
    pub category: usize,
    pub description: LineEdit,
    pub date: LineEdit,
    pub note: LineEdit,
    pub focus: ExpenseField,
    pub editing: bool,
    pub error: Option<String>,
    pub success: Option<String>,
}

impl AddExpenseForm {
    fn new() -> Self {
        Self {
            date: LineEdit::with_value(iso(&today())),
            ..Default::default()
        }
    }

    pub fn category_name(&self) -> &'static str {
        EXPENSE_CATEGORIES[self.category % EXPENSE_CATEGORIES.len()]
    }

    fn cycle_category(&mut self, delta: isize) {
        let n = EXPENSE_CATEGORIES.len() as isize;
        self.category = (self.category as isize + delta).rem_euclid(n) as usize;
    }

    fn field_mut(&mut self) -> Option<&mut LineEdit> {
        match self.focus {
            ExpenseField::Amount => Some(&mut self.amount),
            ExpenseField::Category => None,
            ExpenseField::Description => Some(&mut self.description),
            ExpenseField::Date => Some(&mut self.date),
            ExpenseField::Note => Some(&mut self.note),
        }
    }

    /// Validates the form into a draft. Errors are phrased for the user.
    pub fn draft(&self) -> Result<NewExpense, String> {
        if self.amount.trimmed().is_empty() {
            return Err("Amount cannot be empty".into());
        }
        let amount = parse_money(&self.amount.value).ok_or("Invalid amount format")?;
        if amount <= Decimal::ZERO {
            return Err("Amount must be greater than zero".into());
        }
        let date = if self.date.trimmed().is_empty() {
            today()
        } else {
            parse_date_any(&self.date.value).ok_or("Format: YYYY-MM-DD")?
        };
        let category = self.category_name();
        let description = match self.description.trimmed() {
            "" => format!("{category} expense"),
            d => d.to_string(),
        };

        let draft = NewExpense::new(amount, category, description, date);
        Ok(match self.note.trimmed() {
            "" => draft,
            note => draft.with_note(note),
        })
    }
}

/* ==========Budget setup=========== */

pub struct BudgetRow {
    pub category: String,
    pub limit: LineEdit,
}

#[derive(Default)]
pub struct BudgetSetupPage {
    pub income: LineEdit,
    pub rows: Vec<BudgetRow>,
    /// 0 is the income field, 1.. are the category rows.
    pub sel: usize,
    pub editing: bool,
    /// Set once the user has typed into a field; stops store refreshes
    /// from overwriting the form.
    pub dirty: bool,
    pub error: Option<String>,
    pub success: Option<String>,
}

impl BudgetSetupPage {
    /// Starting limits come from the store where a budget exists, otherwise
    /// from the setup defaults.
    fn from_snapshot(snapshot: &BudgetSnapshot, income: Option<Decimal>) -> Self {
        let mut rows: Vec<BudgetRow> = SETUP_CATEGORIES
            .iter()
            .map(|(category, limit)| BudgetRow {
                category: category.to_string(),
                limit: LineEdit::with_value(limit.to_string()),
            })
            .collect();
        for budget in &snapshot.budgets {
            let limit = budget.monthly_limit.normalize().to_string();
            match rows.iter_mut().find(|r| r.category == budget.category) {
                Some(row) => row.limit.set(limit),
                None => rows.push(BudgetRow {
                    category: budget.category.clone(),
                    limit: LineEdit::with_value(limit),
                }),
            }
        }

        Self {
            income: income
                .map(|i| LineEdit::with_value(i.normalize().to_string()))
                .unwrap_or_default(),
            rows,
            ..Default::default()
        }
    }

    /// Picks up limits that arrived after the page was opened, unless the
    /// user has started editing.
    fn sync(&mut self, snapshot: &BudgetSnapshot, income: Option<Decimal>) {
        if self.editing || self.dirty {
            return;
        }
        let rebuilt = Self::from_snapshot(snapshot, income);
        self.sel = self.sel.min(rebuilt.rows.len());
        self.income = rebuilt.income;
        self.rows = rebuilt.rows;
    }

    pub fn total(&self) -> Decimal {
        self.rows
            .iter()
            .filter_map(|r| parse_money(&r.limit.value))
            .sum()
    }

    fn selected_field(&mut self) -> &mut LineEdit {
        match self.sel {
            0 => &mut self.income,
            i => &mut self.rows[i - 1].limit,
        }
    }
}

/* ==========Reports / backend test / dashboard=========== */

#[derive(Default)]
pub struct ReportsPage {
    pub month: Option<Month>,
    pub category_spending: BTreeMap<String, Decimal>,
    /// Oldest first.
    pub history: Vec<(Month, Decimal)>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub name: &'static str,
    pub outcome: Result<String, String>,
}

#[derive(Default)]
pub struct BackendTestPage {
    pub results: Vec<ProbeResult>,
}

#[derive(Default)]
pub struct DashboardPage {
    pub recent: TableState,
    pub cumulative: bool,
}

pub struct App {
    pub session: Arc<SessionContext>,
    pub budget: Arc<BudgetContext>,
    pub data: Arc<DataService>,
    pub backend: BackendClient,
    session_rx: watch::Receiver<SessionState>,
    budget_rx: watch::Receiver<u64>,

    pub session_state: SessionState,
    pub snapshot: BudgetSnapshot,
    pub profile: Option<UserProfile>,
    /// Page the user asked for; `route` is where the guard let them land.
    pub requested: Route,
    pub route: Option<Route>,
    /// Path as typed, kept for the not-found page.
    pub location: String,
    pub status: String,
    pub quit: bool,

    pub auth: AuthPage,
    pub dashboard: DashboardPage,
    pub add: AddExpenseForm,
    pub setup: BudgetSetupPage,
    pub reports: ReportsPage,
    pub backend_test: BackendTestPage,
    pub schema_scroll: u16,
}

impl App {
    pub fn new(
        session: Arc<SessionContext>,
        budget: Arc<BudgetContext>,
        data: Arc<DataService>,
        backend: BackendClient,
    ) -> Self {
        let session_rx = session.subscribe();
        let budget_rx = budget.subscribe();
        let session_state = session.state();
        let snapshot = budget.snapshot();
        let requested = Route::Dashboard;

        Self {
            route: router::resolve(requested, &session_state),
            session,
            budget,
            data,
            backend,
            session_rx,
            budget_rx,
            session_state,
            snapshot,
            profile: None,
            requested,
            location: requested.path().to_string(),
            status: "1-6: pages | r: refresh | o: sign out | q: quit".into(),
            quit: false,
            auth: AuthPage::new(),
            dashboard: DashboardPage::default(),
            add: AddExpenseForm::new(),
            setup: BudgetSetupPage::default(),
            reports: ReportsPage::default(),
            backend_test: BackendTestPage::default(),
            schema_scroll: 0,
        }
    }

    /// Picks up session and cache changes published since the last tick.
    pub async fn on_tick(&mut self) -> anyhow::Result<()> {
        if self.budget_rx.has_changed()? {
            self.budget_rx.borrow_and_update();
            self.snapshot = self.budget.snapshot();
            self.sync_setup();
        }

        if self.session_rx.has_changed()? {
            let next = self.session_rx.borrow_and_update().clone();
            let user_changed = next.user().map(|u| &u.id) != self.session_state.user().map(|u| &u.id);
            self.session_state = next;
            if user_changed {
                self.profile = None;
                self.load_profile().await;
                self.sync_setup();
            }
            self.apply_guard().await;
        }
        Ok(())
    }

    fn sync_setup(&mut self) {
        if self.route == Some(Route::BudgetSetup) {
            let income = self.profile.as_ref().and_then(|p| p.monthly_income);
            self.setup.sync(&self.snapshot, income);
        }
    }

    pub fn user_email(&self) -> Option<&str> {
        self.session_state.user().and_then(|u| u.email.as_deref())
    }

    pub fn monthly_income(&self) -> Decimal {
        self.profile
            .as_ref()
            .and_then(|p| p.monthly_income)
            .unwrap_or(Decimal::from(DEFAULT_MONTHLY_INCOME))
    }

    pub async fn navigate(&mut self, route: Route) {
        self.requested = route;
        self.location = route.path().to_string();
        self.apply_guard().await;
    }

    /// First page load: fetches the profile for a restored session and opens `path`.
    pub async fn start(&mut self, path: &str) {
        self.load_profile().await;
        self.open(path).await;
    }

    /// Navigates by path, e.g. `/reports`.
    pub async fn open(&mut self, path: &str) {
        self.requested = Route::from_path(path);
        self.location = path.to_string();
        self.apply_guard().await;
    }

    async fn apply_guard(&mut self) {
        let landed = router::resolve(self.requested, &self.session_state);
        if landed == self.route {
            return;
        }
        self.route = landed;
        if let Some(route) = landed {
            // Redirects become the new location, like a replaced history entry.
            if route != self.requested {
                self.requested = route;
                self.location = route.path().to_string();
            }
            self.enter(route).await;
        }
    }

    async fn enter(&mut self, route: Route) {
        match route {
            Route::Auth => {
                self.auth.error = None;
                self.auth.success = None;
            }
            Route::AddExpense => {
                self.add.error = None;
            }
            Route::BudgetSetup => {
                let income = self.profile.as_ref().and_then(|p| p.monthly_income);
                self.setup = BudgetSetupPage::from_snapshot(&self.snapshot, income);
            }
            Route::Reports => self.load_reports().await,
            Route::DatabaseSetup => self.schema_scroll = 0,
            _ => {}
        }
    }

    async fn load_profile(&mut self) {
        let Some(user_id) = self.session_state.user().map(|u| u.id.clone()) else {
            return;
        };
        match self.data.get_user_profile(&user_id).await {
            Ok(profile) => self.profile = profile,
            Err(e) => warn!(error = %e, "could not load user profile"),
        }
    }

    pub async fn load_reports(&mut self) {
        let month = Month::current();
        let mut months: Vec<Month> = std::iter::successors(Some(month), |m| Some(m.previous()))
            .take(REPORT_MONTHS)
            .collect();
        months.reverse();

        let data = Arc::clone(&self.data);
        let history = async {
            let mut out = Vec::with_capacity(months.len());
            for m in &months {
                let rows = data.monthly_spending(m.year(), m.month()).await?;
                out.push((*m, rows.iter().map(|r| r.amount).sum::<Decimal>()));
            }
            Ok::<_, StoreError>(out)
        };
        let (by_category, history) = tokio::join!(data.category_spending_this_month(), history);

        self.reports.month = Some(month);
        self.reports.error = None;
        match by_category {
            Ok(map) => self.reports.category_spending = map,
            Err(e) => self.reports.error = Some(format!("Failed to load report: {e}")),
        }
        match history {
            Ok(h) => self.reports.history = h,
            Err(e) => self.reports.error = Some(format!("Failed to load history: {e}")),
        }
    }

    /* ==========Keys=========== */

    pub async fn handle_key(&mut self, k: KeyEvent) -> anyhow::Result<()> {
        if k.kind != KeyEventKind::Press {
            return Ok(());
        }
        if k.modifiers.contains(KeyModifiers::CONTROL) && k.code == KeyCode::Char('c') {
            self.quit = true;
            return Ok(());
        }

        let Some(route) = self.route else {
            if k.code == KeyCode::Char('q') {
                self.quit = true;
            }
            return Ok(());
        };

        if self.is_editing() {
            match route {
                Route::Auth => self.handle_auth_input(k).await,
                Route::AddExpense => self.handle_expense_input(k).await,
                Route::BudgetSetup => self.handle_setup_input(k),
                _ => {}
            }
            return Ok(());
        }

        match k.code {
            KeyCode::Char('q') => {
                self.quit = true;
                return Ok(());
            }
            KeyCode::Char(c @ '1'..='6') if route.is_private() => {
                let idx = c as usize - '1' as usize;
                self.navigate(Route::NAV[idx]).await;
                return Ok(());
            }
            KeyCode::Char('o') if route.is_private() => {
                self.sign_out().await;
                return Ok(());
            }
            _ => {}
        }

        match route {
            Route::Auth => self.handle_auth_key(k).await,
            Route::Dashboard => self.handle_dashboard_key(k).await,
            Route::AddExpense => match k.code {
                KeyCode::Up | KeyCode::BackTab => self.add.focus = self.add.focus.prev(),
                KeyCode::Down | KeyCode::Tab => self.add.focus = self.add.focus.next(),
                KeyCode::Left if self.add.focus == ExpenseField::Category => self.add.cycle_category(-1),
                KeyCode::Right if self.add.focus == ExpenseField::Category => self.add.cycle_category(1),
                KeyCode::Enter if self.add.focus != ExpenseField::Category => self.add.editing = true,
                KeyCode::Char('s') => self.submit_expense().await,
                KeyCode::Esc | KeyCode::Char('b') => self.navigate(Route::Dashboard).await,
                _ => {}
            },
            Route::BudgetSetup => match k.code {
                KeyCode::Up => self.setup.sel = self.setup.sel.saturating_sub(1),
                KeyCode::Down => self.setup.sel = (self.setup.sel + 1).min(self.setup.rows.len()),
                KeyCode::Enter => self.setup.editing = true,
                KeyCode::Char('s') => self.save_budgets().await,
                KeyCode::Char('r') => self.enter(Route::BudgetSetup).await,
                KeyCode::Esc | KeyCode::Char('b') => self.navigate(Route::Dashboard).await,
                _ => {}
            },
            Route::Reports => match k.code {
                KeyCode::Char('r') => self.load_reports().await,
                KeyCode::Esc | KeyCode::Char('b') => self.navigate(Route::Dashboard).await,
                _ => {}
            },
            Route::DatabaseSetup => match k.code {
                KeyCode::Up => self.schema_scroll = self.schema_scroll.saturating_sub(1),
                KeyCode::Down => self.schema_scroll = self.schema_scroll.saturating_add(1),
                KeyCode::Char('r') => {
                    self.budget.refresh().await;
                    self.status = "Reloaded from the database".into();
                }
                KeyCode::Esc | KeyCode::Char('b') => self.navigate(Route::Dashboard).await,
                _ => {}
            },
            Route::BackendTest => match k.code {
                KeyCode::Enter | KeyCode::Char('t') => self.run_backend_test().await,
                KeyCode::Esc | KeyCode::Char('b') => self.navigate(Route::Dashboard).await,
                _ => {}
            },
            Route::NotFound => {
                if matches!(k.code, KeyCode::Enter | KeyCode::Esc) {
                    self.navigate(Route::Dashboard).await;
                }
            }
        }
        Ok(())
    }

    pub fn is_editing(&self) -> bool {
        match self.route {
            Some(Route::Auth) => self.auth.editing,
            Some(Route::AddExpense) => self.add.editing,
            Some(Route::BudgetSetup) => self.setup.editing,
            _ => false,
        }
    }

    async fn handle_dashboard_key(&mut self, k: KeyEvent) {
        let n = self.snapshot.expenses.len().min(RECENT_COUNT);
        match k.code {
            KeyCode::Up | KeyCode::Down if n > 0 => {
                let delta: isize = if k.code == KeyCode::Up { -1 } else { 1 };
                let cur = self.dashboard.recent.selected().unwrap_or(0) as isize;
                let next = (cur + delta).rem_euclid(n as isize) as usize;
                self.dashboard.recent.select(Some(next));
            }
            KeyCode::Char('c') => self.dashboard.cumulative = !self.dashboard.cumulative,
            KeyCode::Char('a') => self.navigate(Route::AddExpense).await,
            KeyCode::Char('r') => {
                self.budget.refresh().await;
                self.load_profile().await;
            }
            KeyCode::Char('x') | KeyCode::Delete => {
                let Some(id) = self
                    .dashboard
                    .recent
                    .selected()
                    .and_then(|i| self.snapshot.expenses.get(i))
                    .map(|e| e.id.clone())
                else {
                    return;
                };
                match self.budget.delete_expense(&id).await {
                    Ok(()) => {
                        self.status = "Expense deleted".into();
                        self.dashboard.recent.select(None);
                    }
                    Err(e) => self.status = format!("Delete failed: {e}"),
                }
            }
            _ => {}
        }
    }

    /* ==========Auth=========== */

    async fn handle_auth_key(&mut self, k: KeyEvent) {
        match k.code {
            KeyCode::Up | KeyCode::BackTab => self.auth.move_focus(-1),
            KeyCode::Down | KeyCode::Tab => self.auth.move_focus(1),
            KeyCode::Enter => self.auth.editing = true,
            KeyCode::Char('m') => {
                self.auth.mode = match self.auth.mode {
                    AuthMode::SignIn => AuthMode::SignUp,
                    AuthMode::SignUp => AuthMode::SignIn,
                };
                self.auth.error = None;
            }
            KeyCode::Char('s') => self.submit_auth().await,
            KeyCode::Char('f') => self.reset_password().await,
            KeyCode::Char('g') => self.start_oauth(OAuthProvider::Github),
            KeyCode::Char('G') => self.start_oauth(OAuthProvider::Google),
            _ => {}
        }
    }

    async fn handle_auth_input(&mut self, k: KeyEvent) {
        match k.code {
            KeyCode::Esc => self.auth.editing = false,
            KeyCode::Tab => self.auth.move_focus(1),
            KeyCode::BackTab => self.auth.move_focus(-1),
            KeyCode::Enter => {
                self.auth.editing = false;
                match self.auth.focus {
                    AuthField::Email => self.auth.focus = AuthField::Password,
                    AuthField::Password => self.submit_auth().await,
                    AuthField::Redirect => self.finish_oauth().await,
                }
            }
            code => {
                self.auth.field_mut().handle(code);
            }
        }
    }

    async fn submit_auth(&mut self) {
        let email = self.auth.email.trimmed().to_string();
        let password = self.auth.password.value.clone();
        self.auth.error = None;
        self.auth.success = None;
        if email.is_empty() || password.is_empty() {
            self.auth.error = Some("Email and password are required".into());
            return;
        }

        match self.auth.mode {
            AuthMode::SignIn => match self.session.sign_in(&email, &password).await {
                Ok(_) => {
                    self.auth.password.clear();
                    self.status = "Signed in".into();
                }
                Err(e) => self.auth.error = Some(e.to_string()),
            },
            AuthMode::SignUp => match self.session.sign_up(&email, &password).await {
                Ok(outcome) if outcome.session.is_some() => {
                    self.auth.password.clear();
                    self.status = "Account created".into();
                }
                Ok(_) => {
                    self.auth.success = Some("Check your email for the confirmation link!".into());
                    self.auth.mode = AuthMode::SignIn;
                }
                Err(e) => self.auth.error = Some(e.to_string()),
            },
        }
        // The session channel carries the result; pick it up without waiting a tick.
        if let Err(e) = self.on_tick().await {
            warn!(error = %e, "session channel closed");
        }
    }

    async fn reset_password(&mut self) {
        let email = self.auth.email.trimmed().to_string();
        if email.is_empty() {
            self.auth.error = Some("Enter your email first".into());
            return;
        }
        match self.session.reset_password(&email).await {
            Ok(()) => {
                self.auth.error = None;
                self.auth.success = Some("Password reset email sent".into());
            }
            Err(e) => self.auth.error = Some(e.to_string()),
        }
    }

    fn start_oauth(&mut self, provider: OAuthProvider) {
        match self.session.sign_in_with_provider(provider) {
            Ok(url) => {
                self.auth.oauth_url = Some(url.to_string());
                self.auth.redirect.clear();
                self.auth.focus = AuthField::Redirect;
                self.auth.editing = true;
                self.auth.error = None;
                self.auth.success = Some("Open the link, then paste the address you were sent back to".into());
            }
            Err(e) => self.auth.error = Some(e.to_string()),
        }
    }

    async fn finish_oauth(&mut self) {
        let redirect = self.auth.redirect.trimmed().to_string();
        if redirect.is_empty() {
            return;
        }
        match self.session.complete_provider_sign_in(&redirect).await {
            Ok(_) => {
                self.auth.oauth_url = None;
                self.auth.redirect.clear();
                self.auth.focus = AuthField::Email;
                self.status = "Signed in".into();
                if let Err(e) = self.on_tick().await {
                    warn!(error = %e, "session channel closed");
                }
            }
            Err(e) => self.auth.error = Some(e.to_string()),
        }
    }

    async fn sign_out(&mut self) {
        match self.session.sign_out().await {
            Ok(()) => {
                info!("user signed out from the ui");
                self.status = "Signed out".into();
                if let Err(e) = self.on_tick().await {
                    warn!(error = %e, "session channel closed");
                }
            }
            Err(e) => self.status = format!("Sign out failed: {e}"),
        }
    }

    /* ==========Expense form=========== */

    async fn handle_expense_input(&mut self, k: KeyEvent) {
        match k.code {
            KeyCode::Esc => self.add.editing = false,
            KeyCode::Enter => self.add.editing = false,
            KeyCode::Tab => {
                self.add.focus = self.add.focus.next();
                self.add.editing = self.add.focus != ExpenseField::Category;
            }
            KeyCode::BackTab => {
                self.add.focus = self.add.focus.prev();
                self.add.editing = self.add.focus != ExpenseField::Category;
            }
            code => {
                if let Some(field) = self.add.field_mut() {
                    field.handle(code);
                }
            }
        }
    }

    pub async fn submit_expense(&mut self) {
        self.add.success = None;
        let draft = match self.add.draft() {
            Ok(d) => d,
            Err(msg) => {
                self.add.error = Some(msg);
                return;
            }
        };

        match self.budget.add_expense(draft).await {
            Ok(expense) => {
                info!(id = %expense.id, "expense recorded");
                self.add = AddExpenseForm::new();
                self.add.success = Some("Expense Added!".into());
                self.status = "Your expense has been successfully recorded.".into();
            }
            Err(e) => {
                self.add.error = Some(format!("Failed to add expense: {e}"));
            }
        }
    }

    /* ==========Budget setup=========== */

    fn handle_setup_input(&mut self, k: KeyEvent) {
        match k.code {
            KeyCode::Esc | KeyCode::Enter => self.setup.editing = false,
            KeyCode::Tab => self.setup.sel = (self.setup.sel + 1).min(self.setup.rows.len()),
            KeyCode::BackTab => self.setup.sel = self.setup.sel.saturating_sub(1),
            KeyCode::Char(c) if !(c.is_ascii_digit() || c == '.') => {}
            code => {
                let edits = matches!(code, KeyCode::Char(_) | KeyCode::Backspace | KeyCode::Delete);
                if self.setup.selected_field().handle(code) && edits {
                    self.setup.dirty = true;
                }
            }
        }
    }

    pub async fn save_budgets(&mut self) {
        self.setup.error = None;
        self.setup.success = None;

        let mut limits = Vec::with_capacity(self.setup.rows.len());
        for row in &self.setup.rows {
            if row.limit.trimmed().is_empty() {
                continue;
            }
            match parse_money(&row.limit.value) {
                Some(limit) if limit > Decimal::ZERO => limits.push((row.category.clone(), limit)),
                _ => {
                    self.setup.error = Some(format!("Invalid limit for {}", row.category));
                    return;
                }
            }
        }
        let income = match self.setup.income.trimmed() {
            "" => None,
            raw => match parse_money(raw) {
                Some(v) if v >= Decimal::ZERO => Some(v),
                _ => {
                    self.setup.error = Some("Invalid monthly income".into());
                    return;
                }
            },
        };

        for (category, limit) in &limits {
            if let Err(e) = self.budget.set_budget_limit(category, *limit).await {
                self.setup.error = Some(format!("Error saving budget: {e}"));
                return;
            }
        }

        if let (Some(income), Some(user)) = (income, self.session_state.user()) {
            let update = ProfileUpdate {
                id: user.id.clone(),
                monthly_income: Some(income),
                currency: None,
            };
            match self.data.update_user_profile(&update).await {
                Ok(profile) => self.profile = Some(profile),
                Err(e) => {
                    self.setup.error = Some(format!("Budgets saved, income not saved: {e}"));
                    return;
                }
            }
        }
        self.setup.dirty = false;
        self.setup.success = Some(format!("Saved {} budget categories", limits.len()));
    }

    /* ==========Backend test=========== */

    pub async fn run_backend_test(&mut self) {
        let (health, ping, demo) = tokio::join!(self.backend.health(), self.backend.ping(), self.backend.demo());
        self.backend_test.results = vec![
            ProbeResult {
                name: "health",
                outcome: health
                    .map(|h| format!("{} ({} v{})", h.status, h.service, h.version))
                    .map_err(|e| e.to_string()),
            },
            ProbeResult {
                name: "ping",
                outcome: ping.map(|p| p.message).map_err(|e| e.to_string()),
            },
            ProbeResult {
                name: "demo",
                outcome: demo
                    .map(|d| format!("{} [{} {} / {}]", d.message, d.data.framework, d.data.version, d.data.api))
                    .map_err(|e| e.to_string()),
            },
        ];
    }
}
