//! TUI front-end entry (Ratatui + Crossterm)
//! - Connects to the hosted project and restores the saved session
//! - Wires the session and budget contexts together
//! - Sets up the terminal and runs the draw/key loop

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture, Event};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::task::JoinHandle;
use tracing::info;

use crate::auth::{AuthClient, SessionContext, SessionFile};
use crate::backend::BackendClient;
use crate::budget::BudgetContext;
use crate::config::AppConfig;
use crate::database::{connect, DataService};

pub mod input;
pub mod router;
pub mod state;
pub mod ui;
pub mod util;

pub async fn run(config: &AppConfig, path: &str) -> Result<()> {
    let (mut app, follower) = init_app(config).await?;
    app.start(path).await;

    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    crossterm::execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;
    follower.abort();
    result
}

async fn event_loop(terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>, app: &mut state::App) -> Result<()> {
    let tick_rate = Duration::from_millis(200);
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                app.handle_key(key).await?;
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.on_tick().await?;
            last_tick = Instant::now();
        }

        if app.quit {
            return Ok(());
        }
    }
}

/// Builds the clients and contexts, resolves the startup session and starts
/// the task that keeps the budget cache on the signed-in user.
pub async fn init_app(config: &AppConfig) -> Result<(state::App, JoinHandle<()>)> {
    let hosted = config.hosted()?;
    let conn = connect(&hosted)?;
    info!(project = %hosted.project_url, "connecting to hosted project");

    let auth = AuthClient::new(conn.clone(), config.auth_redirect_url.clone())
        .with_session_file(SessionFile::new(&config.session_file));
    let session = Arc::new(SessionContext::new(Arc::new(auth)));
    session.init().await;

    let data = Arc::new(DataService::new(conn));
    let budget = Arc::new(BudgetContext::new(data.clone()));
    let follower = Arc::clone(&budget).watch_session(session.subscribe());

    let backend = BackendClient::new(config.backend_api_url.clone())?;
    let app = state::App::new(session, budget, data, backend);

    Ok((app, follower))
}
