//! Page table and the session guard in front of it.

use crate::auth::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Auth,
    Dashboard,
    AddExpense,
    BudgetSetup,
    DatabaseSetup,
    Reports,
    BackendTest,
    NotFound,
}

impl Route {
    /// Pages reachable from the tab bar, in tab order.
    pub const NAV: [Route; 6] = [
        Route::Dashboard,
        Route::AddExpense,
        Route::BudgetSetup,
        Route::Reports,
        Route::DatabaseSetup,
        Route::BackendTest,
    ];

    pub fn from_path(path: &str) -> Route {
        let path = path.split(['?', '#']).next().unwrap_or("");
        match path.trim_end_matches('/') {
            "" => Route::Dashboard,
            "/auth" => Route::Auth,
            "/add-expense" => Route::AddExpense,
            "/budget-setup" => Route::BudgetSetup,
            "/database-setup" => Route::DatabaseSetup,
            "/reports" => Route::Reports,
            "/django-test" | "/backend-test" => Route::BackendTest,
            _ => Route::NotFound,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Route::Auth => "/auth",
            Route::Dashboard => "/",
            Route::AddExpense => "/add-expense",
            Route::BudgetSetup => "/budget-setup",
            Route::DatabaseSetup => "/database-setup",
            Route::Reports => "/reports",
            Route::BackendTest => "/django-test",
            Route::NotFound => "/404",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Route::Auth => "Sign in",
            Route::Dashboard => "Dashboard",
            Route::AddExpense => "Add Expense",
            Route::BudgetSetup => "Budget Setup",
            Route::DatabaseSetup => "Database Setup",
            Route::Reports => "Reports",
            Route::BackendTest => "Backend Test",
            Route::NotFound => "Not Found",
        }
    }

    pub fn is_private(&self) -> bool {
        !matches!(self, Route::Auth | Route::NotFound)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Render(Route),
    Redirect(Route),
    /// Session still being restored; show the loading screen.
    Pending,
}

pub fn guard(route: Route, session: &SessionState) -> Navigation {
    match (route, session) {
        (r, SessionState::Loading) if r.is_private() => Navigation::Pending,
        (r, SessionState::Anonymous) if r.is_private() => Navigation::Redirect(Route::Auth),
        (Route::Auth, SessionState::Authenticated(_)) => Navigation::Redirect(Route::Dashboard),
        (r, _) => Navigation::Render(r),
    }
}

/// Follows redirects until a page can be shown. Returns `None` while the
/// session is still loading.
pub fn resolve(route: Route, session: &SessionState) -> Option<Route> {
    let mut current = route;
    // Redirects only ever point at `/auth` or `/`, so two hops settle it.
    for _ in 0..3 {
        match guard(current, session) {
            Navigation::Render(r) => return Some(r),
            Navigation::Redirect(next) => current = next,
            Navigation::Pending => return None,
        }
    }
    Some(current)
}
