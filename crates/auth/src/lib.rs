//! `taskdeck-auth` — route authorization engine.
//!
//! Decides whether the signed-in subject may enter a guarded route and where
//! to send it when it may not. Decoupled from HTTP, storage and the router
//! itself: callers supply the auth-state/identity sources and a navigator.

pub mod authorize;
pub mod catalog;
pub mod config;
pub mod guard;
pub mod permissions;
pub mod redirect;
pub mod requirement;
pub mod roles;
pub mod subject;

pub use authorize::{
    AuthorizationExplanation, AuthzError, Decision, DenialReason, Outcome, SubjectState, evaluate,
    explain,
};
pub use catalog::{CatalogConfig, PermissionCatalog};
pub use config::{AccessConfig, AccessControl};
pub use guard::{
    GuardChain, GuardKind, NavigationError, Navigator, RouterState, UrlSegment, url_from_segments,
};
pub use permissions::Permission;
pub use redirect::{
    LoginResume, PendingRedirect, PendingRedirectStore, RedirectPaths, RedirectPolicy,
    RedirectTarget, is_safe_return_url,
};
pub use requirement::{ResourceRequirement, RouteDef, RouteTable, requirement_for, url_segments};
pub use roles::Role;
pub use subject::{
    AuthSnapshot, AuthSourceError, AuthStateSource, Identity, IdentitySource, SessionState,
    Subject, SubjectResolver, WatchAuthState,
};
