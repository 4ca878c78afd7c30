//! Guard chain: the entry points navigation calls before entering a route.
//!
//! All three entry points run the same check. They differ only in how the
//! attempted URL is obtained from their input.

use std::sync::Arc;

use thiserror::Error;

use crate::{
    DenialReason, PermissionCatalog, RedirectPolicy, RedirectTarget, RouteDef, RouteTable,
    SubjectResolver, evaluate, explain, requirement_for,
};

/// The router refused or failed to apply a redirect.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NavigationError {
    #[error("navigation rejected: {0}")]
    Rejected(String),
}

/// Navigation surface the guard chain issues redirects to.
pub trait Navigator: Send + Sync {
    fn redirect(&self, target: &RedirectTarget) -> Result<(), NavigationError>;
}

/// Which entry point ran a check (for logs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardKind {
    Activate,
    ActivateChild,
    Load,
}

impl GuardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardKind::Activate => "can_activate",
            GuardKind::ActivateChild => "can_activate_child",
            GuardKind::Load => "can_load",
        }
    }
}

/// Router state for an activation: the full URL being navigated to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterState {
    pub url: String,
}

impl RouterState {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// One path segment of a lazily loaded module's URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlSegment {
    pub path: String,
}

impl UrlSegment {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Rebuild the URL a lazy load was triggered for.
pub fn url_from_segments(segments: &[UrlSegment]) -> String {
    let joined: Vec<&str> = segments.iter().map(|s| s.path.as_str()).collect();
    format!("/{}", joined.join("/"))
}

pub struct GuardChain {
    resolver: SubjectResolver,
    catalog: Arc<PermissionCatalog>,
    policy: RedirectPolicy,
    navigator: Arc<dyn Navigator>,
}

impl GuardChain {
    pub fn new(
        resolver: SubjectResolver,
        catalog: Arc<PermissionCatalog>,
        policy: RedirectPolicy,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            resolver,
            catalog,
            policy,
            navigator,
        }
    }

    pub fn policy(&self) -> &RedirectPolicy {
        &self.policy
    }

    /// Pre-activation check for the route being entered.
    pub async fn can_activate(&self, route: &RouteDef, state: &RouterState) -> bool {
        self.check_access(GuardKind::Activate, route, &state.url).await
    }

    /// Child-activation check. Evaluated on its own; an allowed parent grants
    /// nothing here.
    pub async fn can_activate_child(&self, child: &RouteDef, state: &RouterState) -> bool {
        self.check_access(GuardKind::ActivateChild, child, &state.url).await
    }

    /// Check run before a lazily loaded module is fetched.
    pub async fn can_load(&self, route: &RouteDef, segments: &[UrlSegment]) -> bool {
        let url = url_from_segments(segments);
        self.check_access(GuardKind::Load, route, &url).await
    }

    /// Shared check: extract requirement, resolve subject, evaluate, and on
    /// deny issue exactly one redirect.
    ///
    /// The subject snapshot is the only suspension point; nothing is written
    /// before it completes.
    pub async fn check_access(&self, kind: GuardKind, route: &RouteDef, attempted_url: &str) -> bool {
        let requirement = requirement_for(route);
        let subject = self.resolver.current_subject().await;
        let decision = evaluate(&self.catalog, &subject, &requirement);

        let Some(reason) = decision.reason() else {
            tracing::debug!(
                guard = kind.as_str(),
                url = attempted_url,
                requirement = requirement.kind(),
                "access allowed"
            );
            return true;
        };

        let explanation = explain(&self.catalog, &subject, &requirement);
        tracing::info!(
            guard = kind.as_str(),
            url = attempted_url,
            reason = %reason,
            user_id = %subject.id,
            missing = ?explanation.missing_permissions,
            "access denied: {}",
            explanation.reason
        );

        self.issue_redirect(kind, reason, attempted_url);
        false
    }

    fn issue_redirect(&self, kind: GuardKind, reason: DenialReason, attempted_url: &str) {
        let target = self.policy.on_deny(reason, attempted_url);
        if let Err(err) = self.navigator.redirect(&target) {
            tracing::warn!(
                guard = kind.as_str(),
                target = %target.to_href(),
                error = %err,
                "redirect could not be applied; navigation stays blocked"
            );
        }
    }

    /// Run the guards for a full navigation to `url`.
    ///
    /// The outermost matched route gets the pre-activation check and each
    /// descendant its own child-activation check, stopping at the first deny.
    /// URLs outside `table` are public and never evaluated.
    pub async fn navigate(&self, table: &RouteTable, url: &str) -> bool {
        let Some(chain) = table.find_chain(url) else {
            tracing::debug!(url, "route outside guard chain");
            return true;
        };

        let state = RouterState::new(url);
        let mut routes = chain.into_iter();

        if let Some(root) = routes.next() {
            if !self.can_activate(root, &state).await {
                return false;
            }
        }

        for child in routes {
            if !self.can_activate_child(child, &state).await {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Identity, PendingRedirectStore, RedirectPaths, ResourceRequirement, SessionState};
    use parking_lot::Mutex;
    use taskdeck_core::UserId;

    #[derive(Default)]
    struct RecordingNavigator {
        redirects: Mutex<Vec<RedirectTarget>>,
    }

    impl Navigator for RecordingNavigator {
        fn redirect(&self, target: &RedirectTarget) -> Result<(), NavigationError> {
            self.redirects.lock().push(target.clone());
            Ok(())
        }
    }

    struct RejectingNavigator;

    impl Navigator for RejectingNavigator {
        fn redirect(&self, _target: &RedirectTarget) -> Result<(), NavigationError> {
            Err(NavigationError::Rejected("router busy".to_string()))
        }
    }

    struct Harness {
        guard: GuardChain,
        session: Arc<SessionState>,
        navigator: Arc<RecordingNavigator>,
        pending: Arc<PendingRedirectStore>,
    }

    fn harness() -> Harness {
        let session = Arc::new(SessionState::new());
        let navigator = Arc::new(RecordingNavigator::default());
        let pending = Arc::new(PendingRedirectStore::new());
        let guard = GuardChain::new(
            SubjectResolver::from_session(session.clone()),
            Arc::new(PermissionCatalog::builtin().unwrap()),
            RedirectPolicy::new(RedirectPaths::default(), pending.clone()),
            navigator.clone(),
        );
        Harness {
            guard,
            session,
            navigator,
            pending,
        }
    }

    #[test]
    fn lazy_url_is_rebuilt_from_segments() {
        let segments = [UrlSegment::new("projects"), UrlSegment::new("7")];
        assert_eq!(url_from_segments(&segments), "/projects/7");
        assert_eq!(url_from_segments(&[]), "/");
    }

    #[tokio::test]
    async fn allow_issues_no_redirect() {
        let h = harness();
        h.session.sign_in(Identity::new(UserId::new(), "DEVELOPER"));

        let allowed = h
            .guard
            .can_activate(&RouteDef::new("dashboard"), &RouterState::new("/dashboard"))
            .await;

        assert!(allowed);
        assert!(h.navigator.redirects.lock().is_empty());
    }

    #[tokio::test]
    async fn every_deny_issues_exactly_one_redirect() {
        let h = harness();
        h.session.sign_in(Identity::new(UserId::new(), "VIEWER"));
        let route = RouteDef::new("admin").with_requirement(ResourceRequirement::any_role(["ADMIN"]));

        assert!(!h.guard.can_activate(&route, &RouterState::new("/admin")).await);
        assert!(!h.guard.can_activate_child(&route, &RouterState::new("/admin")).await);
        assert!(!h.guard.can_load(&route, &[UrlSegment::new("admin")]).await);

        assert_eq!(h.navigator.redirects.lock().len(), 3);
        assert!(h.pending.peek().is_none());
    }

    #[tokio::test]
    async fn lazy_load_denial_remembers_rebuilt_url() {
        let h = harness();
        let route = RouteDef::new("reports");

        let allowed = h
            .guard
            .can_load(&route, &[UrlSegment::new("reports"), UrlSegment::new("weekly")])
            .await;

        assert!(!allowed);
        assert_eq!(h.pending.peek().unwrap().url, "/reports/weekly");
    }

    #[tokio::test]
    async fn failed_redirect_still_blocks() {
        let session = Arc::new(SessionState::new());
        let guard = GuardChain::new(
            SubjectResolver::from_session(session),
            Arc::new(PermissionCatalog::builtin().unwrap()),
            RedirectPolicy::new(RedirectPaths::default(), Arc::new(PendingRedirectStore::new())),
            Arc::new(RejectingNavigator),
        );

        assert!(
            !guard
                .can_activate(&RouteDef::new("tasks"), &RouterState::new("/tasks"))
                .await
        );
    }

    #[tokio::test]
    async fn navigate_checks_each_descendant_independently() {
        let h = harness();
        h.session.sign_in(Identity::new(UserId::new(), "DEVELOPER"));

        let table = RouteTable::new(vec![
            RouteDef::new("projects")
                .with_requirement(ResourceRequirement::all_permissions(["view_team_tasks"]))
                .with_child(RouteDef::new(":id"))
                .with_child(
                    RouteDef::new(":id/delete")
                        .with_requirement(ResourceRequirement::all_permissions(["delete_project"])),
                ),
        ]);

        assert!(h.guard.navigate(&table, "/projects/3").await);
        assert!(!h.guard.navigate(&table, "/projects/3/delete").await);
        assert!(h.guard.navigate(&table, "/about").await);

        let redirects = h.navigator.redirects.lock();
        assert_eq!(redirects.len(), 1);
        assert!(!redirects[0].is_login());
    }
}
