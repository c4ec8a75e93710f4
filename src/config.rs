use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;
use url::Url;

use crate::backend::DEFAULT_PING_MESSAGE;
use crate::database::HostedConfig;

#[derive(Parser, Debug)]
#[command(name = "broke-buster", version)]
#[command(about = "Track expenses against monthly budgets", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub app: AppConfig,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args, Debug, Clone)]
pub struct AppConfig {
    /// Hosted project URL
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// Public (anon) key of the hosted project
    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    pub supabase_anon_key: Option<String>,

    /// Base URL of the alternate backend API
    #[arg(long, env = "BACKEND_API_URL", default_value = "http://localhost:8000/api")]
    pub backend_api_url: String,

    /// Where provider sign-in redirects back to
    #[arg(long, env = "AUTH_REDIRECT_URL", default_value = "http://localhost:3000/")]
    pub auth_redirect_url: String,

    /// Session kept between runs
    #[arg(long, env = "SESSION_FILE", default_value = ".broke-buster/session.json")]
    pub session_file: PathBuf,

    /// Log file used while the terminal UI owns the screen
    #[arg(long, env = "LOG_FILE", default_value = "broke-buster.log")]
    pub log_file: PathBuf,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Terminal UI (default)
    Tui {
        /// Page to open, e.g. /reports
        #[arg(default_value = "/")]
        path: String,
    },
    /// Serve the alternate backend API
    Server {
        #[arg(long, env = "BACKEND_ADDR", default_value = "127.0.0.1:8000")]
        addr: SocketAddr,

        #[arg(long, env = "PING_MESSAGE", default_value = DEFAULT_PING_MESSAGE)]
        ping_message: String,
    },
    /// Check the hosted tables and the alternate backend, then exit
    Probe,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing {0}: set it in the environment or in .env")]
    Missing(&'static str),

    #[error("invalid SUPABASE_URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl AppConfig {
    pub fn hosted(&self) -> Result<HostedConfig, ConfigError> {
        let url = self
            .supabase_url
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("SUPABASE_URL"))?;
        let anon_key = self
            .supabase_anon_key
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("SUPABASE_ANON_KEY"))?;

        Ok(HostedConfig {
            project_url: Url::parse(url.trim())?,
            anon_key: anon_key.trim().to_string(),
        })
    }
}
