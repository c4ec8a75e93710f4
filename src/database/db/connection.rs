use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::{Client, Method, RequestBuilder};
use url::Url;

/// Where the hosted project lives and the public key that identifies it.
#[derive(Debug, Clone)]
pub struct HostedConfig {
    pub project_url: Url,
    pub anon_key: String,
}

/// Bearer token of the signed-in user, shared between the auth client and
/// the data client. `None` means requests go out with the anonymous key.
#[derive(Debug, Clone, Default)]
pub struct AccessToken(Arc<RwLock<Option<String>>>);

impl AccessToken {
    pub fn set(&self, token: Option<String>) {
        *self.0.write() = token;
    }

    pub fn get(&self) -> Option<String> {
        self.0.read().clone()
    }
}

#[derive(Debug, Clone)]
pub struct Connection {
    http: Client,
    base: String,
    anon_key: String,
    token: AccessToken,
}

impl Connection {
    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base, table)
    }

    pub fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base, path.trim_start_matches('/'))
    }

    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    /// Request carrying the project key and the current bearer token.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let bearer = self.token.get().unwrap_or_else(|| self.anon_key.clone());
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    /// Same as [`Connection::request`] but with an explicit bearer token.
    pub fn request_as(&self, method: Method, url: &str, bearer: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }
}

pub fn connect(config: &HostedConfig) -> Result<Connection, reqwest::Error> {
    let http = Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("broke-buster/", env!("CARGO_PKG_VERSION")))
        .build()?;

    Ok(Connection {
        http,
        base: config.project_url.as_str().trim_end_matches('/').to_string(),
        anon_key: config.anon_key.clone(),
        token: AccessToken::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        connect(&HostedConfig {
            project_url: Url::parse("https://demo.example.co/").unwrap(),
            anon_key: "anon".into(),
        })
        .unwrap()
    }

    #[test]
    fn endpoints_are_built_under_project_url() {
        let c = conn();
        assert_eq!(c.rest_url("expenses"), "https://demo.example.co/rest/v1/expenses");
        assert_eq!(c.auth_url("/token"), "https://demo.example.co/auth/v1/token");
    }

    #[test]
    fn token_is_shared_between_clones() {
        let c = conn();
        let other = c.clone();
        c.token().set(Some("jwt".into()));
        assert_eq!(other.token().get().as_deref(), Some("jwt"));
        other.token().set(None);
        assert!(c.token().get().is_none());
    }
}
