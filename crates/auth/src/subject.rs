//! Subject resolution.
//!
//! A subject is recomputed for every authorization request from exactly one
//! read of the authentication source. Any failure to read it yields the
//! anonymous subject.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use taskdeck_core::UserId;

use crate::Role;

/// Failure of the external authentication-state source.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthSourceError {
    #[error("authentication source unavailable: {0}")]
    Unavailable(String),

    #[error("authentication source closed before producing a value")]
    Closed,
}

/// Identity of the signed-in user, as reported by the identity source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub role: Option<Role>,
}

impl Identity {
    pub fn new(id: UserId, role: impl Into<Role>) -> Self {
        Self {
            id,
            role: Some(role.into()),
        }
    }

    pub fn without_role(id: UserId) -> Self {
        Self { id, role: None }
    }
}

/// The party an authorization decision is made for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subject {
    pub id: UserId,
    pub role: Option<Role>,
    pub authenticated: bool,
}

impl Subject {
    pub fn anonymous() -> Self {
        Self {
            id: UserId::nil(),
            role: None,
            authenticated: false,
        }
    }

    pub fn authenticated(identity: Identity) -> Self {
        Self {
            id: identity.id,
            role: identity.role,
            authenticated: true,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        !self.authenticated
    }
}

/// One point-in-time reading of the authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub authenticated: bool,
    pub identity: Option<Identity>,
}

/// Source of the "is a user signed in" signal.
///
/// Implementations may suspend (e.g. waiting on a token refresh); the resolver
/// awaits exactly one value per request.
#[async_trait]
pub trait AuthStateSource: Send + Sync {
    async fn is_authenticated(&self) -> Result<bool, AuthSourceError>;
}

/// Source of the current user's id and role.
pub trait IdentitySource: Send + Sync {
    fn current_identity(&self) -> Option<Identity>;
}

/// Builds a [`Subject`] per request from the external sources.
#[derive(Clone)]
pub struct SubjectResolver {
    auth: Arc<dyn AuthStateSource>,
    identity: Arc<dyn IdentitySource>,
}

impl SubjectResolver {
    pub fn new(auth: Arc<dyn AuthStateSource>, identity: Arc<dyn IdentitySource>) -> Self {
        Self { auth, identity }
    }

    /// Resolver backed by a single [`SessionState`] for both signals.
    pub fn from_session(session: Arc<SessionState>) -> Self {
        Self {
            auth: session.clone(),
            identity: session,
        }
    }

    /// Take one snapshot. The identity is only read once the auth source has
    /// reported a signed-in user.
    pub async fn snapshot(&self) -> Result<AuthSnapshot, AuthSourceError> {
        let authenticated = self.auth.is_authenticated().await?;
        let identity = if authenticated {
            self.identity.current_identity()
        } else {
            None
        };
        Ok(AuthSnapshot {
            authenticated,
            identity,
        })
    }

    /// Snapshot and resolve in one step.
    pub async fn current_subject(&self) -> Subject {
        Self::resolve(self.snapshot().await)
    }

    /// Map a snapshot (or the failure to obtain one) to a subject.
    ///
    /// Signed in without a known identity resolves to anonymous.
    pub fn resolve(snapshot: Result<AuthSnapshot, AuthSourceError>) -> Subject {
        match snapshot {
            Err(err) => {
                tracing::warn!(error = %err, "auth source failed; treating subject as anonymous");
                Subject::anonymous()
            }
            Ok(AuthSnapshot {
                authenticated: true,
                identity: Some(identity),
            }) => Subject::authenticated(identity),
            Ok(AuthSnapshot {
                authenticated: true,
                identity: None,
            }) => {
                tracing::warn!("authenticated session has no identity; treating subject as anonymous");
                Subject::anonymous()
            }
            Ok(_) => Subject::anonymous(),
        }
    }
}

/// In-memory session holder, written by the login/logout flow.
///
/// Serves as both the auth-state and the identity source: a user is signed in
/// exactly when an identity is stored.
#[derive(Debug, Default)]
pub struct SessionState {
    current: RwLock<Option<Identity>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, identity: Identity) {
        tracing::debug!(user_id = %identity.id, "session signed in");
        *self.current.write() = Some(identity);
    }

    pub fn sign_out(&self) {
        *self.current.write() = None;
    }
}

#[async_trait]
impl AuthStateSource for SessionState {
    async fn is_authenticated(&self) -> Result<bool, AuthSourceError> {
        Ok(self.current.read().is_some())
    }
}

impl IdentitySource for SessionState {
    fn current_identity(&self) -> Option<Identity> {
        self.current.read().clone()
    }
}

/// Auth-state source fed by a `watch` channel.
///
/// `None` means "not known yet" (e.g. a token check still in flight). A read
/// waits for the first known value and ignores later updates.
#[derive(Debug, Clone)]
pub struct WatchAuthState {
    rx: watch::Receiver<Option<bool>>,
}

impl WatchAuthState {
    pub fn new(rx: watch::Receiver<Option<bool>>) -> Self {
        Self { rx }
    }

    /// Create a source together with the sender that drives it.
    pub fn channel() -> (watch::Sender<Option<bool>>, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { rx })
    }
}

#[async_trait]
impl AuthStateSource for WatchAuthState {
    async fn is_authenticated(&self) -> Result<bool, AuthSourceError> {
        let mut rx = self.rx.clone();
        let known = match rx.wait_for(Option::is_some).await {
            Ok(value) => *value,
            Err(_) => return Err(AuthSourceError::Closed),
        };
        Ok(known.unwrap_or(false))
    }
}
