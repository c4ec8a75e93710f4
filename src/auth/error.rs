use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Message from the identity provider, passed through verbatim.
    #[error("{message}")]
    Provider {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("auth request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected auth response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no active session")]
    NoSession,

    #[error("invalid sign-in redirect: {0}")]
    InvalidRedirect(String),

    #[error("session file: {0}")]
    Storage(#[from] std::io::Error),
}

/// The identity API has used several error shapes over time.
#[derive(Debug, Default, Deserialize)]
struct ProviderErrorBody {
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
    error_code: Option<String>,
}

impl AuthError {
    pub(crate) fn from_response(status: u16, raw: &str) -> Self {
        let body: ProviderErrorBody = serde_json::from_str(raw).unwrap_or_default();
        let code = body.error_code.or_else(|| body.error.clone());
        let message = body
            .msg
            .or(body.message)
            .or(body.error_description)
            .or(body.error)
            .unwrap_or_else(|| format!("HTTP {status}: {}", raw.trim()));
        AuthError::Provider { status, code, message }
    }
}
