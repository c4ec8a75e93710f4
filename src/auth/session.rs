use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};
use url::Url;

use super::listeners::Subscription;
use super::types::{OAuthProvider, Session, SignUpOutcome, User};
use super::{AuthError, IdentityProvider};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Loading,
    Anonymous,
    Authenticated(Session),
}

impl SessionState {
    pub fn user(&self) -> Option<&User> {
        self.session().map(|s| &s.user)
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    fn from_session(session: Option<Session>) -> Self {
        match session {
            Some(session) => Self::Authenticated(session),
            None => Self::Anonymous,
        }
    }
}

/// Process-wide view of who is signed in. Starts in `Loading` until
/// [`SessionContext::init`] has asked the provider once, then follows the
/// provider's change notifications.
pub struct SessionContext {
    provider: Arc<dyn IdentityProvider>,
    state: Arc<watch::Sender<SessionState>>,
    _subscription: Subscription,
}

impl SessionContext {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let state = Arc::new(watch::Sender::new(SessionState::Loading));
        let tx = Arc::clone(&state);
        let subscription = provider.on_auth_state_change(Arc::new(move |_event, session| {
            publish(&tx, SessionState::from_session(session.cloned()));
        }));

        Self {
            provider,
            state,
            _subscription: subscription,
        }
    }

    /// Startup fetch. Only resolves `Loading`; a change notification that
    /// arrived first wins.
    pub async fn init(&self) {
        let next = match self.provider.current_session().await {
            Ok(session) => SessionState::from_session(session),
            Err(err) => {
                warn!(error = %err, "could not restore session");
                SessionState::Anonymous
            }
        };
        self.state.send_if_modified(|current| {
            if current.is_loading() {
                *current = next;
                true
            } else {
                false
            }
        });
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError> {
        let outcome = self.provider.sign_up(email, password).await?;
        if let (Some(_), Some(session)) = (&outcome.user, &outcome.session) {
            publish(&self.state, SessionState::Authenticated(session.clone()));
        }
        Ok(outcome)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let session = self.provider.sign_in(email, password).await?;
        publish(&self.state, SessionState::Authenticated(session.clone()));
        Ok(session)
    }

    pub fn sign_in_with_provider(&self, provider: OAuthProvider) -> Result<Url, AuthError> {
        let url = self.provider.provider_url(provider)?;
        info!(provider = provider.as_str(), "provider sign-in started");
        Ok(url)
    }

    pub async fn complete_provider_sign_in(&self, redirect: &str) -> Result<Session, AuthError> {
        let session = self.provider.session_from_redirect(redirect).await?;
        publish(&self.state, SessionState::Authenticated(session.clone()));
        Ok(session)
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.provider.sign_out().await?;
        publish(&self.state, SessionState::Anonymous);
        Ok(())
    }

    pub async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        self.provider.reset_password(email).await
    }
}

fn publish(tx: &watch::Sender<SessionState>, next: SessionState) {
    tx.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::listeners::{AuthCallback, Listeners};
    use crate::auth::types::AuthEvent;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeProvider {
        stored: Mutex<Option<Session>>,
        listeners: Listeners,
        fail: Mutex<bool>,
        confirm_email: bool,
    }

    fn session(user: &str) -> Session {
        Session {
            access_token: format!("jwt-{user}"),
            token_type: "bearer".into(),
            expires_in: 3600,
            expires_at: None,
            refresh_token: format!("refresh-{user}"),
            user: User {
                id: user.into(),
                email: Some(format!("{user}@example.com")),
                created_at: None,
            },
        }
    }

    impl FakeProvider {
        fn check(&self) -> Result<(), AuthError> {
            if *self.fail.lock() {
                return Err(AuthError::Provider {
                    status: 400,
                    code: Some("invalid_grant".into()),
                    message: "Invalid login credentials".into(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        async fn current_session(&self) -> Result<Option<Session>, AuthError> {
            self.check()?;
            Ok(self.stored.lock().clone())
        }

        async fn sign_up(&self, email: &str, _password: &str) -> Result<SignUpOutcome, AuthError> {
            self.check()?;
            let s = session(email.split('@').next().unwrap_or(email));
            if self.confirm_email {
                return Ok(SignUpOutcome {
                    user: Some(s.user),
                    session: None,
                });
            }
            Ok(SignUpOutcome {
                user: Some(s.user.clone()),
                session: Some(s),
            })
        }

        async fn sign_in(&self, email: &str, _password: &str) -> Result<Session, AuthError> {
            self.check()?;
            Ok(session(email.split('@').next().unwrap_or(email)))
        }

        fn provider_url(&self, provider: OAuthProvider) -> Result<Url, AuthError> {
            Ok(Url::parse(&format!("https://id.example.com/authorize?provider={}", provider.as_str())).unwrap())
        }

        async fn session_from_redirect(&self, _redirect: &str) -> Result<Session, AuthError> {
            self.check()?;
            Ok(session("oauth-user"))
        }

        async fn sign_out(&self) -> Result<(), AuthError> {
            self.check()?;
            self.listeners.emit(AuthEvent::SignedOut, None);
            Ok(())
        }

        async fn reset_password(&self, _email: &str) -> Result<(), AuthError> {
            self.check()
        }

        fn on_auth_state_change(&self, callback: AuthCallback) -> Subscription {
            self.listeners.subscribe(callback)
        }
    }

    #[tokio::test]
    async fn init_resolves_loading_from_stored_session() {
        let provider = Arc::new(FakeProvider::default());
        *provider.stored.lock() = Some(session("u1"));
        let ctx = SessionContext::new(provider);

        assert!(ctx.state().is_loading());
        ctx.init().await;
        assert_eq!(ctx.state().user().map(|u| u.id.as_str()), Some("u1"));
    }

    #[tokio::test]
    async fn failed_startup_fetch_is_anonymous() {
        let provider = Arc::new(FakeProvider::default());
        *provider.fail.lock() = true;
        let ctx = SessionContext::new(provider);

        ctx.init().await;
        assert_eq!(ctx.state(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn change_notification_before_init_wins() {
        let provider = Arc::new(FakeProvider::default());
        let ctx = SessionContext::new(provider.clone());

        provider.listeners.emit(AuthEvent::SignedIn, Some(&session("u2")));
        ctx.init().await;
        assert_eq!(ctx.state().user().map(|u| u.id.as_str()), Some("u2"));
    }

    #[tokio::test]
    async fn failed_sign_in_leaves_state_untouched() {
        let provider = Arc::new(FakeProvider::default());
        let ctx = SessionContext::new(provider.clone());
        ctx.init().await;

        *provider.fail.lock() = true;
        let err = ctx.sign_in("u1@example.com", "wrong").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid login credentials");
        assert_eq!(ctx.state(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn sign_in_then_out_is_published() {
        let provider = Arc::new(FakeProvider::default());
        let ctx = SessionContext::new(provider);
        ctx.init().await;
        let mut rx = ctx.subscribe();
        let _ = rx.borrow_and_update();

        ctx.sign_in("u1@example.com", "pw").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().user().map(|u| u.id.clone()), Some("u1".to_string()));

        ctx.sign_out().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn sign_up_pending_confirmation_stays_anonymous() {
        let provider = Arc::new(FakeProvider {
            confirm_email: true,
            ..Default::default()
        });
        let ctx = SessionContext::new(provider);
        ctx.init().await;

        let outcome = ctx.sign_up("new@example.com", "pw").await.unwrap();
        assert!(outcome.user.is_some());
        assert!(outcome.session.is_none());
        assert_eq!(ctx.state(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn provider_redirect_completes_sign_in() {
        let provider = Arc::new(FakeProvider::default());
        let ctx = SessionContext::new(provider);
        ctx.init().await;

        let url = ctx.sign_in_with_provider(OAuthProvider::Github).unwrap();
        assert!(url.as_str().contains("provider=github"));
        ctx.complete_provider_sign_in("http://localhost:3000/#access_token=x")
            .await
            .unwrap();
        assert_eq!(ctx.state().user().map(|u| u.id.as_str()), Some("oauth-user"));
    }
}
