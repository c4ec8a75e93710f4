//! Derived views over the cached expenses and budgets. Everything here is a
//! pure function of its inputs; callers pass the month explicitly.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::Month;
use crate::database::models::{Budget, Expense};

pub fn monthly<'a>(expenses: &'a [Expense], month: Month) -> impl Iterator<Item = &'a Expense> + 'a {
    expenses.iter().filter(move |e| month.contains(e.date))
}

pub fn total_spent(expenses: &[Expense], month: Month) -> Decimal {
    monthly(expenses, month).map(|e| e.amount).sum()
}

pub fn total_budget(budgets: &[Budget]) -> Decimal {
    budgets.iter().map(|b| b.monthly_limit).sum()
}

pub fn sum_by_category<'a, I>(rows: I) -> BTreeMap<String, Decimal>
where
    I: IntoIterator<Item = (&'a str, Decimal)>,
{
    let mut totals = BTreeMap::new();
    for (category, amount) in rows {
        *totals.entry(category.to_string()).or_insert(Decimal::ZERO) += amount;
    }
    totals
}

pub fn category_spending(expenses: &[Expense], month: Month) -> BTreeMap<String, Decimal> {
    sum_by_category(monthly(expenses, month).map(|e| (e.category.as_str(), e.amount)))
}

/// `part` as a percentage of `whole`; zero when there is nothing to compare to.
pub fn percent(part: Decimal, whole: Decimal) -> f64 {
    if whole <= Decimal::ZERO {
        return 0.0;
    }
    part.checked_div(whole)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .and_then(|pct| pct.to_f64())
        .unwrap_or(f64::INFINITY)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryProgress {
    pub category: String,
    pub spent: Decimal,
    pub limit: Decimal,
}

impl CategoryProgress {
    pub fn usage_percent(&self) -> f64 {
        percent(self.spent, self.limit)
    }

    pub fn over_budget(&self) -> bool {
        self.spent > self.limit
    }

    pub fn remaining(&self) -> Decimal {
        self.limit - self.spent
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlySummary {
    pub month: Month,
    pub total_spent: Decimal,
    pub total_budget: Decimal,
    pub category_spending: BTreeMap<String, Decimal>,
    /// One row per budget, in budget order.
    pub categories: Vec<CategoryProgress>,
}

impl MonthlySummary {
    pub fn compute(expenses: &[Expense], budgets: &[Budget], month: Month) -> Self {
        let category_spending = category_spending(expenses, month);
        let categories = budgets
            .iter()
            .map(|b| CategoryProgress {
                category: b.category.clone(),
                spent: category_spending
                    .get(&b.category)
                    .copied()
                    .unwrap_or(Decimal::ZERO),
                limit: b.monthly_limit,
            })
            .collect();

        Self {
            month,
            total_spent: category_spending.values().copied().sum(),
            total_budget: total_budget(budgets),
            category_spending,
            categories,
        }
    }

    pub fn remaining(&self) -> Decimal {
        self.total_budget - self.total_spent
    }

    pub fn progress_percent(&self) -> f64 {
        percent(self.total_spent, self.total_budget)
    }

    pub fn savings(&self, monthly_income: Decimal) -> Decimal {
        monthly_income - self.total_spent
    }

    /// Spending on categories that have no budget row.
    pub fn unbudgeted(&self) -> Vec<(&str, Decimal)> {
        self.category_spending
            .iter()
            .filter(|(c, _)| !self.categories.iter().any(|p| &p.category == *c))
            .map(|(c, v)| (c.as_str(), *v))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecentExpense {
    pub id: String,
    pub description: String,
    pub category: String,
    pub amount: Decimal,
    pub when: String,
}

/// "Today", "Yesterday" or "N days ago".
pub fn relative_day(date: NaiveDate, today: NaiveDate) -> String {
    match (today - date).num_days().abs() {
        0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        n => format!("{n} days ago"),
    }
}

/// The first `n` cached expenses (the cache is newest first).
pub fn recent(expenses: &[Expense], today: NaiveDate, n: usize) -> Vec<RecentExpense> {
    expenses
        .iter()
        .take(n)
        .map(|e| RecentExpense {
            id: e.id.clone(),
            description: e.description.clone(),
            category: e.category.clone(),
            amount: e.amount,
            when: relative_day(e.date, today),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub daily: Decimal,
    pub cumulative: Decimal,
}

/// Per-day totals for the `days` days ending at `end`, oldest first.
pub fn daily_series(expenses: &[Expense], end: NaiveDate, days: u32) -> Vec<DailyPoint> {
    let mut by_day: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
    for e in expenses {
        *by_day.entry(e.date).or_insert(Decimal::ZERO) += e.amount;
    }

    let mut cumulative = Decimal::ZERO;
    (0..days)
        .rev()
        .map(|back| {
            let date = end - Duration::days(i64::from(back));
            let daily = by_day.get(&date).copied().unwrap_or(Decimal::ZERO);
            cumulative += daily;
            DailyPoint { date, daily, cumulative }
        })
        .collect()
}
