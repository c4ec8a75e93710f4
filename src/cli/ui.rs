use chrono::Datelike;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        BarChart, Block, Borders, Cell, Clear, Gauge, List, ListItem, Paragraph, Row, Sparkline, Table, Tabs, Wrap,
    },
    Frame,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::budget::aggregates::{self, percent};
use crate::budget::Month;
use crate::cli::input::LineEdit;
use crate::cli::router::Route;
use crate::cli::state::{self, App, AuthField, AuthMode, ExpenseField};
use crate::cli::util::{fmt_money, today};

pub const SCHEMA_SQL: &str = include_str!("../../migrations/0001_expenses_budgets.sql");

pub fn draw(f: &mut Frame, app: &mut App) {
    let size = f.size();

    // top tabs | main content | bottom status bar
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(10), Constraint::Length(1)])
        .split(size);

    draw_header(f, root[0], app);

    match app.route {
        None => draw_loading(f, root[1]),
        Some(Route::Auth) => draw_auth(f, root[1], app),
        Some(Route::Dashboard) => draw_dashboard(f, root[1], app),
        Some(Route::AddExpense) => draw_add_expense(f, root[1], app),
        Some(Route::BudgetSetup) => draw_budget_setup(f, root[1], app),
        Some(Route::Reports) => draw_reports(f, root[1], app),
        Some(Route::DatabaseSetup) => draw_database_setup(f, root[1], app),
        Some(Route::BackendTest) => draw_backend_test(f, root[1], app),
        Some(Route::NotFound) => draw_not_found(f, root[1], app),
    }

    let status = Paragraph::new(app.status.as_str()).style(Style::default().fg(Color::DarkGray));
    f.render_widget(status, root[2]);
}

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
    let title = match app.user_email() {
        Some(email) => format!("Broke Buster  [{email}]"),
        None => "Broke Buster".to_string(),
    };

    let titles = Route::NAV
        .iter()
        .enumerate()
        .map(|(i, r)| Line::from(Span::raw(format!("{} {}", i + 1, r.title()))))
        .collect::<Vec<_>>();
    let selected = app
        .route
        .and_then(|r| Route::NAV.iter().position(|n| *n == r))
        .unwrap_or(0);
    let tabs = Tabs::new(titles)
        .select(selected)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan));
    f.render_widget(tabs, area);
}

fn draw_loading(f: &mut Frame, area: Rect) {
    let p = Paragraph::new("Loading…")
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(p, area);
}

/* ==========Auth=========== */

fn field_line(label: &str, edit: &LineEdit, focused: bool, editing: bool) -> Line<'static> {
    let marker = match (focused, editing) {
        (true, true) => "  <editing>",
        (true, false) => "  <",
        _ => "",
    };
    let style = if focused {
        Style::default().add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    Line::from(vec![
        Span::styled(format!("{label:<12}: "), style),
        Span::raw(edit.rendered()),
        Span::styled(marker.to_string(), Style::default().fg(Color::Yellow)),
    ])
}

fn draw_auth(f: &mut Frame, area: Rect, app: &mut App) {
    let auth = &app.auth;
    let area = center_rect(area, 72, 18);
    f.render_widget(Clear, area);

    let heading = match auth.mode {
        AuthMode::SignIn => "Welcome back",
        AuthMode::SignUp => "Create an account",
    };
    let mut lines = vec![
        Line::from(Span::styled(heading, Style::default().add_modifier(Modifier::BOLD))),
        Line::from(""),
        field_line("Email", &auth.email, auth.focus == AuthField::Email, auth.editing),
        field_line("Password", &auth.password, auth.focus == AuthField::Password, auth.editing),
    ];
    if let Some(url) = &auth.oauth_url {
        lines.push(Line::from(""));
        lines.push(Line::from("Open in a browser:"));
        lines.push(Line::from(Span::styled(url.clone(), Style::default().fg(Color::Cyan))));
        lines.push(field_line("Redirect URL", &auth.redirect, auth.focus == AuthField::Redirect, auth.editing));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(
        "Enter: edit | s: submit | m: sign in/sign up | f: forgot password | g: GitHub | G: Google",
    ));
    if let Some(err) = &auth.error {
        lines.push(Line::from(Span::styled(format!("Error: {err}"), Style::default().fg(Color::Red))));
    } else if let Some(msg) = &auth.success {
        lines.push(Line::from(Span::styled(msg.clone(), Style::default().fg(Color::Green))));
    }

    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(match auth.mode {
            AuthMode::SignIn => "Sign in",
            AuthMode::SignUp => "Sign up",
        }));
    f.render_widget(p, area);
}

/* ==========Dashboard=========== */

fn draw_dashboard(f: &mut Frame, area: Rect, app: &mut App) {
    let month = Month::current();
    let summary = app.snapshot.summary(month);
    let income = app.monthly_income();

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(8), Constraint::Length(9)])
        .split(area);

    // Totals
    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[0]);

    let mut totals = vec![
        Line::from(format!(
            "Spent {} of {}   Remaining {}",
            fmt_money(&summary.total_spent),
            fmt_money(&summary.total_budget),
            fmt_money(&summary.remaining())
        )),
        Line::from(format!(
            "Income {}   Savings {}",
            fmt_money(&income),
            fmt_money(&summary.savings(income))
        )),
    ];
    if app.snapshot.is_sample_data() {
        totals.push(Line::from(Span::styled(
            "Showing sample data: the database tables are not set up (page 5)",
            Style::default().fg(Color::Yellow),
        )));
    } else if let Some(err) = &app.snapshot.last_error {
        totals.push(Line::from(Span::styled(format!("Last refresh failed: {err}"), Style::default().fg(Color::Red))));
    }
    let title = if app.snapshot.loading {
        format!("{month} (loading…)")
    } else {
        month.to_string()
    };
    f.render_widget(
        Paragraph::new(totals).block(Block::default().borders(Borders::ALL).title(title)),
        top[0],
    );

    let gauges = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(2), Constraint::Length(3)])
        .split(top[1]);
    f.render_widget(
        percent_gauge("Budget used", summary.progress_percent(), summary.total_spent > summary.total_budget),
        gauges[0],
    );
    let savings_pct = percent(summary.savings(income).max(Decimal::ZERO), Decimal::from(state::SAVINGS_GOAL));
    f.render_widget(
        percent_gauge(
            &format!("Savings goal {}", fmt_money(&Decimal::from(state::SAVINGS_GOAL))),
            savings_pct,
            false,
        ),
        gauges[1],
    );

    // Categories | recent
    let mid = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(rows[1]);

    let items: Vec<ListItem> = summary
        .categories
        .iter()
        .map(|c| {
            let style = if c.over_budget() {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:<16}", c.category), style),
                Span::raw(format!(" {:>10} / {:<10} ", fmt_money(&c.spent), fmt_money(&c.limit))),
                Span::styled(bar(c.usage_percent(), 20), style),
                Span::raw(format!(" {:>3.0}%", c.usage_percent())),
            ]))
        })
        .collect();
    f.render_widget(
        List::new(items).block(Block::default().borders(Borders::ALL).title("Categories")),
        mid[0],
    );

    let recent = aggregates::recent(&app.snapshot.expenses, today(), state::RECENT_COUNT);
    let body: Vec<Row> = recent
        .iter()
        .map(|r| {
            Row::new(vec![
                Cell::from(r.description.clone()),
                Cell::from(r.category.clone()),
                Cell::from(format!("-{}", fmt_money(&r.amount))),
                Cell::from(r.when.clone()),
            ])
        })
        .collect();
    let widths = [
        Constraint::Percentage(35),
        Constraint::Percentage(25),
        Constraint::Length(10),
        Constraint::Length(12),
    ];
    let table = Table::new(body, widths)
        .header(Row::new(vec!["Description", "Category", "Amount", "When"]).height(1))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Recent  (Up/Down, x=delete, a=add, r=refresh)"),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    f.render_stateful_widget(table, mid[1], &mut app.dashboard.recent);

    // 30 day chart
    let series = aggregates::daily_series(&app.snapshot.expenses, today(), 30);
    let data: Vec<u64> = series
        .iter()
        .map(|p| {
            let v = if app.dashboard.cumulative { p.cumulative } else { p.daily };
            v.round().to_u64().unwrap_or(0)
        })
        .collect();
    let chart_title = if app.dashboard.cumulative {
        "Last 30 days, cumulative  (c=daily)"
    } else {
        "Last 30 days, daily  (c=cumulative)"
    };
    let sparkline = Sparkline::default()
        .block(Block::default().borders(Borders::ALL).title(chart_title))
        .data(&data)
        .style(Style::default().fg(Color::Cyan));
    f.render_widget(sparkline, rows[2]);
}

fn percent_gauge(label: &str, pct: f64, over: bool) -> Gauge<'static> {
    let color = if over { Color::Red } else { Color::Green };
    Gauge::default()
        .block(Block::default().title(label.to_string()))
        .gauge_style(Style::default().fg(color))
        .ratio((pct / 100.0).clamp(0.0, 1.0))
        .label(format!("{pct:.1}%"))
}

fn bar(pct: f64, width: usize) -> String {
    let filled = ((pct / 100.0).clamp(0.0, 1.0) * width as f64).round() as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

/* ==========Add expense=========== */

fn draw_add_expense(f: &mut Frame, area: Rect, app: &mut App) {
    let form = &app.add;
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    let focused = |field: ExpenseField| form.focus == field;
    let category = Line::from(vec![
        Span::styled(
            format!("{:<12}: ", "Category"),
            if focused(ExpenseField::Category) {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            },
        ),
        Span::raw(format!("◀ {} ▶", form.category_name())),
    ]);
    let mut lines = vec![
        field_line("Amount (₹)", &form.amount, focused(ExpenseField::Amount), form.editing),
        category,
        field_line("Description", &form.description, focused(ExpenseField::Description), form.editing),
        field_line("Date", &form.date, focused(ExpenseField::Date), form.editing),
        field_line("Note", &form.note, focused(ExpenseField::Note), form.editing),
        Line::from(""),
    ];
    if let Some(err) = &form.error {
        lines.push(Line::from(Span::styled(format!("Error: {err}"), Style::default().fg(Color::Red))));
    } else if let Some(msg) = &form.success {
        lines.push(Line::from(Span::styled(msg.clone(), Style::default().fg(Color::Green))));
    }
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Add Expense")),
        cols[0],
    );

    let help = [
        "Up/Down, Tab : switch field",
        "Enter        : edit field",
        "Left/Right   : choose category",
        "s            : save expense",
        "Esc          : back to dashboard",
    ]
    .join("\n");
    f.render_widget(
        Paragraph::new(help)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Help")),
        cols[1],
    );
}

/* ==========Budget setup=========== */

fn draw_budget_setup(f: &mut Frame, area: Rect, app: &mut App) {
    let setup = &app.setup;
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(6), Constraint::Length(3)])
        .split(area);

    let total = setup.total();
    let income = crate::cli::util::parse_money(&setup.income.value);
    let mut head = vec![field_line("Income (₹)", &setup.income, setup.sel == 0, setup.editing)];
    head.push(Line::from(format!("Total budget {}", fmt_money(&total))));
    if let Some(income) = income.filter(|i| *i > Decimal::ZERO) {
        let savings = income - total;
        head.push(Line::from(format!(
            "Projected savings {} ({:.1}% of income)",
            fmt_money(&savings),
            percent(savings, income)
        )));
    }
    f.render_widget(
        Paragraph::new(head).block(Block::default().borders(Borders::ALL).title("Monthly income")),
        rows[0],
    );

    let items: Vec<ListItem> = setup
        .rows
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let share = income
                .filter(|v| *v > Decimal::ZERO)
                .zip(crate::cli::util::parse_money(&r.limit.value))
                .map(|(inc, lim)| format!("  {:.1}% of income", percent(lim, inc)))
                .unwrap_or_default();
            let mut line = field_line(&r.category, &r.limit, setup.sel == i + 1, setup.editing);
            line.spans.push(Span::styled(share, Style::default().fg(Color::DarkGray)));
            ListItem::new(line)
        })
        .collect();
    f.render_widget(
        List::new(items).block(Block::default().borders(Borders::ALL).title("Category limits")),
        rows[1],
    );

    let footer = if let Some(err) = &setup.error {
        Line::from(Span::styled(format!("Error: {err}"), Style::default().fg(Color::Red)))
    } else if let Some(msg) = &setup.success {
        Line::from(Span::styled(msg.clone(), Style::default().fg(Color::Green)))
    } else {
        Line::from("Up/Down: select | Enter: edit | s: save all | r: reload")
    };
    f.render_widget(Paragraph::new(footer).block(Block::default().borders(Borders::ALL)), rows[2]);
}

/* ==========Reports=========== */

fn draw_reports(f: &mut Frame, area: Rect, app: &mut App) {
    let reports = &app.reports;
    let month = reports.month.unwrap_or_else(Month::current);
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    let mut categories: Vec<(String, Decimal, Option<Decimal>)> = app
        .snapshot
        .budgets
        .iter()
        .map(|b| {
            let spent = reports.category_spending.get(&b.category).copied().unwrap_or(Decimal::ZERO);
            (b.category.clone(), spent, Some(b.monthly_limit))
        })
        .collect();
    for (category, spent) in &reports.category_spending {
        if !categories.iter().any(|(c, _, _)| c == category) {
            categories.push((category.clone(), *spent, None));
        }
    }

    let total_spent: Decimal = reports.category_spending.values().copied().sum();
    let total_budget = aggregates::total_budget(&app.snapshot.budgets);
    let header = Row::new(vec!["Category", "Spent", "Limit", "Used"]).height(1);
    let mut body: Vec<Row> = categories
        .iter()
        .map(|(category, spent, limit)| {
            let used = limit.map(|l| format!("{:.0}%", percent(*spent, l))).unwrap_or_else(|| "-".into());
            let style = match limit {
                Some(l) if spent > l => Style::default().fg(Color::Red),
                _ => Style::default(),
            };
            Row::new(vec![
                Cell::from(category.clone()),
                Cell::from(fmt_money(spent)),
                Cell::from(limit.map(|l| fmt_money(&l)).unwrap_or_else(|| "-".into())),
                Cell::from(used),
            ])
            .style(style)
        })
        .collect();
    body.push(
        Row::new(vec![
            Cell::from("Total"),
            Cell::from(fmt_money(&total_spent)),
            Cell::from(fmt_money(&total_budget)),
            Cell::from(format!("{:.0}%", percent(total_spent, total_budget))),
        ])
        .style(Style::default().add_modifier(Modifier::BOLD)),
    );
    let widths = [
        Constraint::Percentage(40),
        Constraint::Length(12),
        Constraint::Length(12),
        Constraint::Length(6),
    ];
    let title = match &reports.error {
        Some(err) => format!("{month}  ({err})"),
        None => format!("{month}  (r=reload)"),
    };
    f.render_widget(
        Table::new(body, widths)
            .header(header)
            .block(Block::default().borders(Borders::ALL).title(title)),
        cols[0],
    );

    let labels: Vec<String> = reports
        .history
        .iter()
        .map(|(m, _)| m.first_day().format("%b").to_string())
        .collect();
    let bars: Vec<(&str, u64)> = reports
        .history
        .iter()
        .zip(&labels)
        .map(|((_, total), label)| (label.as_str(), total.round().to_u64().unwrap_or(0)))
        .collect();
    let chart = BarChart::default()
        .block(Block::default().borders(Borders::ALL).title(format!(
            "Last {} months ({})",
            state::REPORT_MONTHS,
            month.first_day().year()
        )))
        .data(bars.as_slice())
        .bar_width(6)
        .bar_gap(2)
        .bar_style(Style::default().fg(Color::Cyan))
        .value_style(Style::default().fg(Color::Black).bg(Color::Cyan));
    f.render_widget(chart, cols[1]);
}

/* ==========Database setup / backend test / 404=========== */

fn draw_database_setup(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(5)])
        .split(area);

    let status = if app.snapshot.is_sample_data() {
        Line::from(Span::styled(
            "Tables not found: the app is running on sample data. Run the script below, then press r.",
            Style::default().fg(Color::Yellow),
        ))
    } else {
        Line::from(Span::styled("Tables are set up.", Style::default().fg(Color::Green)))
    };
    f.render_widget(
        Paragraph::new(vec![status, Line::from("Up/Down: scroll | r: re-check")])
            .block(Block::default().borders(Borders::ALL).title("Database Setup")),
        rows[0],
    );
    f.render_widget(
        Paragraph::new(SCHEMA_SQL)
            .scroll((app.schema_scroll, 0))
            .block(Block::default().borders(Borders::ALL).title("SQL")),
        rows[1],
    );
}

fn draw_backend_test(f: &mut Frame, area: Rect, app: &mut App) {
    let mut lines = vec![
        Line::from(format!("Backend: {}", app.backend.base_url())),
        Line::from("Enter or t: run health, ping and demo"),
        Line::from(""),
    ];
    for result in &app.backend_test.results {
        let line = match &result.outcome {
            Ok(msg) => Line::from(vec![
                Span::styled(format!("{:<7} OK    ", result.name), Style::default().fg(Color::Green)),
                Span::raw(msg.clone()),
            ]),
            Err(err) => Line::from(vec![
                Span::styled(format!("{:<7} FAIL  ", result.name), Style::default().fg(Color::Red)),
                Span::raw(err.clone()),
            ]),
        };
        lines.push(line);
    }
    f.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Backend Test")),
        area,
    );
}

fn draw_not_found(f: &mut Frame, area: Rect, app: &App) {
    let p = Paragraph::new(format!(
        "404\n\nNo page at {}\n\nPress Enter to return home",
        app.location
    ))
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(p, area);
}

fn center_rect(rect: Rect, w: u16, h: u16) -> Rect {
    let x = rect.x + rect.width.saturating_sub(w) / 2;
    let y = rect.y + rect.height.saturating_sub(h) / 2;
    Rect { x, y, width: w.min(rect.width), height: h.min(rect.height) }
}
