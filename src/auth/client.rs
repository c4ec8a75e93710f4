//! Client for the hosted identity API. Holds the current session, mirrors it
//! into the shared access token so data calls run as the signed-in user, and
//! tells subscribers whenever it changes.

use chrono::Utc;
use parking_lot::Mutex;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use super::error::AuthError;
use super::listeners::{AuthCallback, Listeners, Subscription};
use super::storage::SessionFile;
use super::types::{AuthEvent, OAuthProvider, Session, SignUpOutcome, User};
use crate::database::Connection;

pub struct AuthClient {
    conn: Connection,
    redirect_to: String,
    session: Mutex<Option<Session>>,
    storage: Option<SessionFile>,
    listeners: Listeners,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(Session),
    User(User),
    Wrapped {
        user: Option<User>,
        session: Option<Session>,
    },
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

impl AuthClient {
    pub fn new(conn: Connection, redirect_to: impl Into<String>) -> Self {
        Self {
            conn,
            redirect_to: redirect_to.into(),
            session: Mutex::new(None),
            storage: None,
            listeners: Listeners::default(),
        }
    }

    pub fn with_session_file(mut self, file: SessionFile) -> Self {
        self.storage = Some(file);
        self
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError> {
        let response: SignUpResponse = self
            .post(
                "signup",
                &[("redirect_to", self.redirect_to.as_str())],
                &Credentials { email, password },
            )
            .await?;

        let outcome = match response {
            SignUpResponse::Session(session) => SignUpOutcome {
                user: Some(session.user.clone()),
                session: Some(session),
            },
            SignUpResponse::User(user) => SignUpOutcome {
                user: Some(user),
                session: None,
            },
            SignUpResponse::Wrapped { user, session } => SignUpOutcome { user, session },
        };

        let session = outcome.session.map(|s| s.stamped(Utc::now()));
        match &session {
            Some(session) => {
                info!(email, "signed up and signed in");
                self.install(Some(session.clone()), AuthEvent::SignedIn);
            }
            None => info!(email, "signed up, waiting for email confirmation"),
        }
        Ok(SignUpOutcome {
            user: outcome.user,
            session,
        })
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let session: Session = self
            .post(
                "token",
                &[("grant_type", "password")],
                &Credentials { email, password },
            )
            .await?;
        let session = session.stamped(Utc::now());
        info!(email, "signed in");
        self.install(Some(session.clone()), AuthEvent::SignedIn);
        Ok(session)
    }

    /// Authorization URL for the provider's redirect flow. The provider sends
    /// the browser back to the redirect URL with the tokens in the fragment;
    /// hand that URL to [`AuthClient::session_from_redirect`].
    pub fn sign_in_with_provider(&self, provider: OAuthProvider) -> Result<Url, AuthError> {
        Url::parse_with_params(
            &self.conn.auth_url("authorize"),
            &[
                ("provider", provider.as_str()),
                ("redirect_to", self.redirect_to.as_str()),
            ],
        )
        .map_err(|e| AuthError::InvalidRedirect(e.to_string()))
    }

    pub async fn session_from_redirect(&self, redirect: &str) -> Result<Session, AuthError> {
        let url = Url::parse(redirect.trim()).map_err(|e| AuthError::InvalidRedirect(e.to_string()))?;
        let params: Vec<(String, String)> = url
            .fragment()
            .map(|f| url::form_urlencoded::parse(f.as_bytes()).into_owned().collect())
            .unwrap_or_else(|| url.query_pairs().into_owned().collect());
        let param = |name: &str| {
            params
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };

        if let Some(description) = param("error_description") {
            return Err(AuthError::Provider {
                status: 400,
                code: param("error"),
                message: description,
            });
        }
        let access_token = param("access_token")
            .ok_or_else(|| AuthError::InvalidRedirect("no access_token in redirect".into()))?;
        let refresh_token = param("refresh_token")
            .ok_or_else(|| AuthError::InvalidRedirect("no refresh_token in redirect".into()))?;
        let expires_in = param("expires_in")
            .and_then(|v| v.parse().ok())
            .unwrap_or(3600);

        let user = self.fetch_user(&access_token).await?;
        let session = Session {
            access_token,
            token_type: param("token_type").unwrap_or_else(|| "bearer".into()),
            expires_in,
            expires_at: param("expires_at").and_then(|v| v.parse().ok()),
            refresh_token,
            user,
        }
        .stamped(Utc::now());

        // Password reset links land here too, tagged `type=recovery`.
        let event = match param("type").as_deref() {
            Some("recovery") => AuthEvent::PasswordRecovery,
            _ => AuthEvent::SignedIn,
        };
        info!(email = session.email(), ?event, "signed in through redirect");
        self.install(Some(session.clone()), event);
        Ok(session)
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let token = self.session.lock().as_ref().map(|s| s.access_token.clone());
        if let Some(token) = token {
            let response = self
                .conn
                .request_as(Method::POST, &self.conn.auth_url("logout"), &token)
                .send()
                .await?;
            let status = response.status();
            // An already revoked token is as good as signed out.
            if !status.is_success() && status.as_u16() != 401 && status.as_u16() != 404 {
                let body = response.text().await?;
                return Err(AuthError::from_response(status.as_u16(), &body));
            }
        }
        info!("signed out");
        self.install(None, AuthEvent::SignedOut);
        Ok(())
    }

    pub async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        let _: serde_json::Value = self
            .post(
                "recover",
                &[("redirect_to", self.redirect_to.as_str())],
                &json!({ "email": email }),
            )
            .await?;
        info!(email, "password reset requested");
        Ok(())
    }

    /// The live session, resuming it from the session file on first use.
    /// An expired session is refreshed once; if that fails it is dropped.
    pub async fn current_session(&self) -> Result<Option<Session>, AuthError> {
        let held = self.session.lock().clone();
        let session = match held {
            Some(session) => session,
            None => match self.load_stored() {
                Some(session) => {
                    debug!(email = session.email(), "resuming stored session");
                    self.conn.token().set(Some(session.access_token.clone()));
                    *self.session.lock() = Some(session.clone());
                    session
                }
                None => return Ok(None),
            },
        };

        if !session.is_expired(Utc::now()) {
            return Ok(Some(session));
        }
        match self.refresh_session().await {
            Ok(fresh) => Ok(Some(fresh)),
            Err(err) => {
                warn!(error = %err, "stored session expired and could not be refreshed");
                self.install(None, AuthEvent::SignedOut);
                Ok(None)
            }
        }
    }

    pub async fn current_user(&self) -> Result<Option<User>, AuthError> {
        match self.current_session().await? {
            Some(session) => Ok(Some(self.fetch_user(&session.access_token).await?)),
            None => Ok(None),
        }
    }

    pub async fn refresh_session(&self) -> Result<Session, AuthError> {
        let refresh_token = self
            .session
            .lock()
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .ok_or(AuthError::NoSession)?;
        let session: Session = self
            .post(
                "token",
                &[("grant_type", "refresh_token")],
                &json!({ "refresh_token": refresh_token }),
            )
            .await?;
        let session = session.stamped(Utc::now());
        debug!("session refreshed");
        self.install(Some(session.clone()), AuthEvent::TokenRefreshed);
        Ok(session)
    }

    pub fn on_auth_state_change(&self, callback: AuthCallback) -> Subscription {
        self.listeners.subscribe(callback)
    }

    async fn fetch_user(&self, access_token: &str) -> Result<User, AuthError> {
        let response = self
            .conn
            .request_as(Method::GET, &self.conn.auth_url("user"), access_token)
            .send()
            .await?;
        read_json(response).await
    }

    async fn post<B, T>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<T, AuthError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.conn.auth_url(path);
        let response = self
            .conn
            .request_as(Method::POST, &url, self.conn.anon_key())
            .query(query)
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }

    fn load_stored(&self) -> Option<Session> {
        let storage = self.storage.as_ref()?;
        storage
            .load()
            .inspect_err(|err| warn!(error = %err, path = %storage.path().display(), "ignoring unreadable session file"))
            .ok()
            .flatten()
    }

    fn install(&self, session: Option<Session>, event: AuthEvent) {
        *self.session.lock() = session.clone();
        self.conn
            .token()
            .set(session.as_ref().map(|s| s.access_token.clone()));

        if let Some(storage) = &self.storage {
            let written = match &session {
                Some(s) => storage.save(s),
                None => storage.clear(),
            };
            if let Err(err) = written {
                warn!(error = %err, "could not update session file");
            }
        }
        self.listeners.emit(event, session.as_ref());
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AuthError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(AuthError::from_response(status.as_u16(), &body));
    }
    if body.trim().is_empty() {
        return Ok(serde_json::from_str("{}")?);
    }
    Ok(serde_json::from_str(&body)?)
}
