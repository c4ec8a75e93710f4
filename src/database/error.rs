use serde::Deserialize;
use thiserror::Error;

/// Error codes the hosted store uses when the requested relation is not
/// deployed: schema not exposed, relation missing from the schema cache, and
/// Postgres `undefined_table`.
const TABLE_MISSING_CODES: &[&str] = &["PGRST106", "PGRST205", "42P01"];

/// Returned by single-row reads that matched nothing.
pub const NO_ROWS_CODE: &str = "PGRST116";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("table `{table}` is not deployed: {message}")]
    TableMissing { table: String, message: String },

    #[error("{message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
        details: Option<String>,
        hint: Option<String>,
    },

    #[error("request to hosted store failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response from hosted store: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Invalid(String),

    #[error("hosted store returned no row")]
    EmptyResponse,
}

impl StoreError {
    pub fn is_table_missing(&self) -> bool {
        matches!(self, StoreError::TableMissing { .. })
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            StoreError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Error body of the hosted data API.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl ApiErrorBody {
    /// Classifies a failed response for `table`. Falls back to the raw body
    /// text when the payload is not the usual JSON error object.
    pub fn into_error(table: &str, status: u16, raw: &str) -> StoreError {
        let body: ApiErrorBody = serde_json::from_str(raw).unwrap_or_default();
        let message = body
            .message
            .clone()
            .unwrap_or_else(|| format!("HTTP {status}: {}", raw.trim()));

        match body.code.as_deref() {
            Some(code) if TABLE_MISSING_CODES.contains(&code) => StoreError::TableMissing {
                table: table.to_string(),
                message,
            },
            _ => StoreError::Api {
                status,
                code: body.code,
                message,
                details: body.details,
                hint: body.hint,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_cache_miss_is_table_missing() {
        let raw = r#"{"code":"PGRST205","details":null,"hint":null,"message":"Could not find the table 'public.expenses' in the schema cache"}"#;
        let err = ApiErrorBody::into_error("expenses", 404, raw);
        assert!(err.is_table_missing());
    }

    #[test]
    fn undefined_table_is_table_missing() {
        let raw = r#"{"code":"42P01","message":"relation \"public.budgets\" does not exist"}"#;
        assert!(ApiErrorBody::into_error("budgets", 404, raw).is_table_missing());
    }

    #[test]
    fn message_text_alone_does_not_trigger_fallback() {
        let raw = r#"{"code":"42703","message":"column expenses.colour does not exist"}"#;
        let err = ApiErrorBody::into_error("expenses", 400, raw);
        assert!(!err.is_table_missing());
        assert_eq!(err.code(), Some("42703"));
        assert_eq!(err.to_string(), "column expenses.colour does not exist");
    }

    #[test]
    fn non_json_body_keeps_status_and_text() {
        let err = ApiErrorBody::into_error("expenses", 502, "Bad Gateway\n");
        match err {
            StoreError::Api { status, message, code, .. } => {
                assert_eq!(status, 502);
                assert_eq!(code, None);
                assert_eq!(message, "HTTP 502: Bad Gateway");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
