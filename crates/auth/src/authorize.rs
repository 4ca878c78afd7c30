use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

use taskdeck_core::UserId;

use crate::{Permission, PermissionCatalog, ResourceRequirement, Role, Subject};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Allow,
    Deny,
}

/// Why a subject was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    Unauthenticated,
    RoleMismatch,
    PermissionMismatch,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::RoleMismatch => "role_mismatch",
            Self::PermissionMismatch => "permission_mismatch",
        }
    }
}

impl core::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Denial as an error, for callers that prefer `Result` flow.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthzError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden: role not accepted")]
    RoleMismatch,

    #[error("forbidden: missing permission")]
    PermissionMismatch,
}

impl From<DenialReason> for AuthzError {
    fn from(value: DenialReason) -> Self {
        match value {
            DenialReason::Unauthenticated => Self::Unauthenticated,
            DenialReason::RoleMismatch => Self::RoleMismatch,
            DenialReason::PermissionMismatch => Self::PermissionMismatch,
        }
    }
}

/// Outcome of evaluating a subject against a requirement.
///
/// An `Allow` never carries a reason; a `Deny` always does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    outcome: Outcome,
    reason: Option<DenialReason>,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            outcome: Outcome::Allow,
            reason: None,
        }
    }

    pub fn deny(reason: DenialReason) -> Self {
        Self {
            outcome: Outcome::Deny,
            reason: Some(reason),
        }
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn reason(&self) -> Option<DenialReason> {
        self.reason
    }

    pub fn is_allowed(&self) -> bool {
        self.outcome == Outcome::Allow
    }

    pub fn into_result(self) -> Result<(), AuthzError> {
        match self.reason {
            None => Ok(()),
            Some(reason) => Err(reason.into()),
        }
    }
}

/// Evaluate `subject` against `requirement`.
///
/// - No IO
/// - No panics
/// - Checks run in a fixed order: public, authentication, then the
///   requirement kind
pub fn evaluate(
    catalog: &PermissionCatalog,
    subject: &Subject,
    requirement: &ResourceRequirement,
) -> Decision {
    if matches!(requirement, ResourceRequirement::Public) {
        return Decision::allow();
    }

    if !subject.authenticated {
        return Decision::deny(DenialReason::Unauthenticated);
    }

    match requirement {
        ResourceRequirement::Public | ResourceRequirement::AuthenticatedOnly => Decision::allow(),
        ResourceRequirement::RequiresAnyRole { roles } => {
            match &subject.role {
                Some(role) if roles.contains(role) => Decision::allow(),
                _ => Decision::deny(DenialReason::RoleMismatch),
            }
        }
        ResourceRequirement::RequiresAllPermissions { permissions } => {
            if missing_permissions(catalog, subject.role.as_ref(), permissions).is_empty() {
                Decision::allow()
            } else {
                Decision::deny(DenialReason::PermissionMismatch)
            }
        }
    }
}

fn owned_permissions<'c>(
    catalog: &'c PermissionCatalog,
    role: Option<&Role>,
) -> Option<&'c BTreeSet<Permission>> {
    role.map(|r| catalog.permissions_for(r))
}

fn missing_permissions<'r>(
    catalog: &PermissionCatalog,
    role: Option<&Role>,
    required: &'r BTreeSet<Permission>,
) -> Vec<&'r Permission> {
    let owned = owned_permissions(catalog, role);
    required
        .iter()
        .filter(|p| !owned.is_some_and(|o| o.contains(*p)))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
///
/// Always agrees with [`evaluate`]; it only adds context for logs and
/// debugging.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub requirement: ResourceRequirement,
    pub decision: Decision,

    /// Human-readable reason for the decision.
    pub reason: String,

    pub subject: SubjectState,

    /// Required permissions the subject's role lacks (permission checks only).
    pub missing_permissions: Vec<Permission>,

    pub suggestions: Vec<String>,
}

/// Current state of the subject being checked.
#[derive(Debug, Clone, Serialize)]
pub struct SubjectState {
    pub id: UserId,
    pub authenticated: bool,
    pub role: Option<Role>,
    pub effective_permissions: Vec<Permission>,
}

/// Explain why `subject` is allowed or denied `requirement`.
pub fn explain(
    catalog: &PermissionCatalog,
    subject: &Subject,
    requirement: &ResourceRequirement,
) -> AuthorizationExplanation {
    let decision = evaluate(catalog, subject, requirement);

    let effective_permissions: Vec<Permission> = if subject.authenticated {
        owned_permissions(catalog, subject.role.as_ref())
            .map(|perms| perms.iter().cloned().collect())
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    let state = SubjectState {
        id: subject.id,
        authenticated: subject.authenticated,
        role: subject.role.clone(),
        effective_permissions,
    };

    let role_label = subject
        .role
        .as_ref()
        .map(|r| r.as_str().to_string())
        .unwrap_or_else(|| "<none>".to_string());

    let mut missing = Vec::new();
    let mut suggestions = Vec::new();

    let reason = match (decision.reason(), requirement) {
        (None, ResourceRequirement::Public) => "Resource is public".to_string(),
        (None, ResourceRequirement::AuthenticatedOnly) => {
            "Subject is authenticated".to_string()
        }
        (None, ResourceRequirement::RequiresAnyRole { .. }) => {
            format!("Role '{role_label}' is accepted")
        }
        (None, ResourceRequirement::RequiresAllPermissions { .. }) => {
            format!("Role '{role_label}' holds every required permission")
        }
        (Some(DenialReason::Unauthenticated), _) => {
            suggestions.push("Sign in and retry the navigation".to_string());
            "Subject is not authenticated".to_string()
        }
        (Some(DenialReason::RoleMismatch), ResourceRequirement::RequiresAnyRole { roles }) => {
            let accepted: Vec<&str> = roles.iter().map(Role::as_str).collect();
            suggestions.push(format!("Assign one of the roles {accepted:?}"));
            format!("Role '{role_label}' is not one of {accepted:?}")
        }
        (
            Some(DenialReason::PermissionMismatch),
            ResourceRequirement::RequiresAllPermissions { permissions },
        ) => {
            missing = missing_permissions(catalog, subject.role.as_ref(), permissions)
                .into_iter()
                .cloned()
                .collect();
            for perm in &missing {
                let holders: Vec<&str> =
                    catalog.roles_granting(perm).into_iter().map(Role::as_str).collect();
                if !holders.is_empty() {
                    suggestions.push(format!("'{perm}' is granted by roles {holders:?}"));
                }
            }
            let names: Vec<&str> = missing.iter().map(Permission::as_str).collect();
            format!("Role '{role_label}' lacks required permissions {names:?}")
        }
        (Some(other), _) => format!("Denied: {other}"),
    };

    AuthorizationExplanation {
        requirement: requirement.clone(),
        decision,
        reason,
        subject: state,
        missing_permissions: missing,
        suggestions,
    }
}
