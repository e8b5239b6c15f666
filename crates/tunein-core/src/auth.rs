//! Session provider used to scope remote queries to one user.
//!
//! Sign-in itself happens elsewhere; the core only needs the current access
//! token and user id. No session is treated the same as an unreachable
//! remote store.

use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub user: AuthUser,
}

impl AuthSession {
    pub fn new(access_token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            user: AuthUser {
                id: user_id.into(),
                email: None,
            },
        }
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("user", &self.user)
            .finish()
    }
}

/// Supplies the signed-in user's session, if any.
pub trait SessionProvider: Send + Sync {
    fn current_session(&self) -> Option<AuthSession>;
}

/// Session held in memory, replaced on sign-in and cleared on sign-out.
#[derive(Debug, Default)]
pub struct StaticSessionProvider {
    session: RwLock<Option<AuthSession>>,
}

impl StaticSessionProvider {
    #[must_use]
    pub const fn new(session: Option<AuthSession>) -> Self {
        Self {
            session: RwLock::new(session),
        }
    }

    pub fn sign_in(&self, session: AuthSession) {
        tracing::debug!("Session set for user {}", session.user.id);
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    pub fn sign_out(&self) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl SessionProvider for StaticSessionProvider {
    fn current_session(&self) -> Option<AuthSession> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_session_debug_redacts_token() {
        let session = AuthSession::new("secret-token", "user-1");
        let debug = format!("{session:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("user-1"));
    }

    #[test]
    fn static_provider_tracks_sign_in_and_out() {
        let provider = StaticSessionProvider::default();
        assert!(provider.current_session().is_none());

        provider.sign_in(AuthSession::new("token", "user-1"));
        assert_eq!(
            provider.current_session().map(|session| session.user.id),
            Some("user-1".to_string())
        );

        provider.sign_out();
        assert!(provider.current_session().is_none());
    }
}
