//! Redirect/deny policy and the pending-redirect slot.
//!
//! Lifecycle of the slot: written by [`RedirectPolicy::on_deny`] when a
//! subject is denied for being unauthenticated, read and cleared by
//! [`LoginResume::resume`] after a successful sign-in. Last write wins.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::DenialReason;

/// Where denied subjects are sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectPaths {
    pub login_path: String,
    pub access_denied_path: String,
    pub return_url_param: String,
}

impl Default for RedirectPaths {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            access_denied_path: "/access-denied".to_string(),
            return_url_param: "returnUrl".to_string(),
        }
    }
}

/// Redirect instruction issued for a denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum RedirectTarget {
    Login {
        path: String,
        return_url_param: String,
        return_url: String,
    },
    AccessDenied {
        path: String,
    },
}

impl RedirectTarget {
    pub fn is_login(&self) -> bool {
        matches!(self, Self::Login { .. })
    }

    /// The URL the attempted navigation should resume at after login.
    pub fn return_url(&self) -> Option<&str> {
        match self {
            Self::Login { return_url, .. } => Some(return_url),
            Self::AccessDenied { .. } => None,
        }
    }

    /// Render as a navigable href (`/login?returnUrl=%2Freports`).
    pub fn to_href(&self) -> String {
        match self {
            Self::Login {
                path,
                return_url_param,
                return_url,
            } => {
                let query = form_urlencoded::Serializer::new(String::new())
                    .append_pair(return_url_param, return_url)
                    .finish();
                format!("{path}?{query}")
            }
            Self::AccessDenied { path } => path.clone(),
        }
    }
}

/// A remembered destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingRedirect {
    pub url: String,
    pub recorded_at: DateTime<Utc>,
}

/// Single-slot store for the URL to resume at after login.
#[derive(Debug, Default)]
pub struct PendingRedirectStore {
    slot: Mutex<Option<PendingRedirect>>,
}

impl PendingRedirectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the slot with `url`.
    pub fn remember(&self, url: impl Into<String>) {
        let url = url.into();
        let mut slot = self.slot.lock();
        if let Some(previous) = slot.as_ref() {
            tracing::debug!(previous = %previous.url, url = %url, "replacing pending redirect");
        }
        *slot = Some(PendingRedirect {
            url,
            recorded_at: Utc::now(),
        });
    }

    pub fn peek(&self) -> Option<PendingRedirect> {
        self.slot.lock().clone()
    }

    /// Read and clear the slot in one step.
    pub fn take(&self) -> Option<PendingRedirect> {
        self.slot.lock().take()
    }

    pub fn clear(&self) {
        *self.slot.lock() = None;
    }
}

/// Decides the redirect for a denial and remembers where to resume.
#[derive(Debug, Clone)]
pub struct RedirectPolicy {
    paths: RedirectPaths,
    pending: Arc<PendingRedirectStore>,
}

impl RedirectPolicy {
    pub fn new(paths: RedirectPaths, pending: Arc<PendingRedirectStore>) -> Self {
        Self { paths, pending }
    }

    pub fn paths(&self) -> &RedirectPaths {
        &self.paths
    }

    pub fn pending(&self) -> &Arc<PendingRedirectStore> {
        &self.pending
    }

    /// Redirect for a denial of `attempted_url`.
    ///
    /// Only `Unauthenticated` writes the pending slot; an authenticated subject
    /// has nothing to resume after signing in again.
    pub fn on_deny(&self, reason: DenialReason, attempted_url: &str) -> RedirectTarget {
        match reason {
            DenialReason::Unauthenticated => {
                self.pending.remember(attempted_url);
                RedirectTarget::Login {
                    path: self.paths.login_path.clone(),
                    return_url_param: self.paths.return_url_param.clone(),
                    return_url: attempted_url.to_string(),
                }
            }
            DenialReason::RoleMismatch | DenialReason::PermissionMismatch => {
                RedirectTarget::AccessDenied {
                    path: self.paths.access_denied_path.clone(),
                }
            }
        }
    }
}

/// Post-login step that picks where navigation continues.
#[derive(Debug, Clone)]
pub struct LoginResume {
    pending: Arc<PendingRedirectStore>,
}

impl LoginResume {
    pub fn new(pending: Arc<PendingRedirectStore>) -> Self {
        Self { pending }
    }

    /// Destination after a successful sign-in; consumes the pending slot.
    ///
    /// Preference: pending redirect, then the `returnUrl` query value, then
    /// `fallback`. Candidates that are not same-origin paths are skipped.
    pub fn resume(&self, query_return_url: Option<&str>, fallback: &str) -> String {
        let pending = self.pending.take().map(|p| p.url);

        [pending.as_deref(), query_return_url]
            .into_iter()
            .flatten()
            .find(|candidate| {
                let safe = is_safe_return_url(candidate);
                if !safe {
                    tracing::warn!(url = %candidate, "ignoring off-site return url");
                }
                safe
            })
            .unwrap_or(fallback)
            .to_string()
    }
}

/// Same-origin relative path: starts with `/` but not `//` or `/\`.
pub fn is_safe_return_url(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.starts_with("/\\")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> (RedirectPolicy, Arc<PendingRedirectStore>) {
        let pending = Arc::new(PendingRedirectStore::new());
        (RedirectPolicy::new(RedirectPaths::default(), pending.clone()), pending)
    }

    #[test]
    fn unauthenticated_goes_to_login_and_remembers_url() {
        let (policy, pending) = policy();
        let target = policy.on_deny(DenialReason::Unauthenticated, "/reports");

        assert!(target.is_login());
        assert_eq!(target.return_url(), Some("/reports"));
        assert_eq!(target.to_href(), "/login?returnUrl=%2Freports");
        assert_eq!(pending.peek().unwrap().url, "/reports");
    }

    #[test]
    fn mismatch_goes_to_access_denied_and_leaves_slot_alone() {
        let (policy, pending) = policy();
        pending.remember("/projects");

        for reason in [DenialReason::RoleMismatch, DenialReason::PermissionMismatch] {
            let target = policy.on_deny(reason, "/admin");
            assert_eq!(
                target,
                RedirectTarget::AccessDenied {
                    path: "/access-denied".to_string()
                }
            );
            assert_eq!(target.to_href(), "/access-denied");
        }
        assert_eq!(pending.peek().unwrap().url, "/projects");
    }

    #[test]
    fn last_denial_wins() {
        let (policy, pending) = policy();
        policy.on_deny(DenialReason::Unauthenticated, "/a");
        policy.on_deny(DenialReason::Unauthenticated, "/b");
        assert_eq!(pending.take().unwrap().url, "/b");
        assert!(pending.take().is_none());
    }

    #[test]
    fn href_encodes_query_characters() {
        let (policy, _) = policy();
        let target = policy.on_deny(DenialReason::Unauthenticated, "/tasks?filter=mine&page=2");
        assert_eq!(
            target.to_href(),
            "/login?returnUrl=%2Ftasks%3Ffilter%3Dmine%26page%3D2"
        );
    }

    #[test]
    fn resume_prefers_pending_and_clears_it() {
        let pending = Arc::new(PendingRedirectStore::new());
        pending.remember("/reports");
        let resume = LoginResume::new(pending.clone());

        assert_eq!(resume.resume(Some("/tasks"), "/dashboard"), "/reports");
        assert!(pending.peek().is_none());
        assert_eq!(resume.resume(Some("/tasks"), "/dashboard"), "/tasks");
        assert_eq!(resume.resume(None, "/dashboard"), "/dashboard");
    }

    #[test]
    fn resume_rejects_off_site_urls() {
        let pending = Arc::new(PendingRedirectStore::new());
        pending.remember("//evil.example/phish");
        let resume = LoginResume::new(pending);

        assert_eq!(
            resume.resume(Some("https://evil.example"), "/dashboard"),
            "/dashboard"
        );
    }

    #[test]
    fn safe_return_urls() {
        assert!(is_safe_return_url("/projects/1"));
        assert!(!is_safe_return_url("//host"));
        assert!(!is_safe_return_url("/\\host"));
        assert!(!is_safe_return_url("javascript:alert(1)"));
    }

    #[test]
    fn redirect_paths_fill_defaults_from_partial_json() {
        let paths: RedirectPaths = serde_json::from_str(r#"{ "login_path": "/sign-in" }"#).unwrap();
        assert_eq!(paths.login_path, "/sign-in");
        assert_eq!(paths.access_denied_path, "/access-denied");
        assert_eq!(paths.return_url_param, "returnUrl");
    }
}
