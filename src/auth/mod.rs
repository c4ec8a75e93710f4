mod client;
pub mod error;
mod listeners;
pub mod session;
mod storage;
pub mod types;

use async_trait::async_trait;

pub use client::AuthClient;
pub use error::AuthError;
pub use listeners::{AuthCallback, Listeners, Subscription};
pub use session::{SessionContext, SessionState};
pub use storage::SessionFile;
pub use types::{AuthEvent, OAuthProvider, Session, SignUpOutcome, User};

/// The identity operations the session layer depends on.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_session(&self) -> Result<Option<Session>, AuthError>;
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;
    fn provider_url(&self, provider: OAuthProvider) -> Result<url::Url, AuthError>;
    async fn session_from_redirect(&self, redirect: &str) -> Result<Session, AuthError>;
    async fn sign_out(&self) -> Result<(), AuthError>;
    async fn reset_password(&self, email: &str) -> Result<(), AuthError>;
    fn on_auth_state_change(&self, callback: AuthCallback) -> Subscription;
}

#[async_trait]
impl IdentityProvider for AuthClient {
    async fn current_session(&self) -> Result<Option<Session>, AuthError> {
        AuthClient::current_session(self).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError> {
        AuthClient::sign_up(self, email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        AuthClient::sign_in(self, email, password).await
    }

    fn provider_url(&self, provider: OAuthProvider) -> Result<url::Url, AuthError> {
        self.sign_in_with_provider(provider)
    }

    async fn session_from_redirect(&self, redirect: &str) -> Result<Session, AuthError> {
        AuthClient::session_from_redirect(self, redirect).await
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        AuthClient::sign_out(self).await
    }

    async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        AuthClient::reset_password(self, email).await
    }

    fn on_auth_state_change(&self, callback: AuthCallback) -> Subscription {
        AuthClient::on_auth_state_change(self, callback)
    }
}
