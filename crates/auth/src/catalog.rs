//! Role → permission catalog.
//!
//! The catalog is declarative data, validated once at load and immutable
//! afterwards. Lookups are total: a role the catalog does not know owns no
//! permissions.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use taskdeck_core::{ConfigError, ConfigResult};

use crate::{Permission, Role};

const BUILTIN_CATALOG: &str = include_str!("catalog.json");

static NO_PERMISSIONS: BTreeSet<Permission> = BTreeSet::new();

/// Serializable catalog declaration.
///
/// `roles` and `permissions` declare the closed sets; `grants` must contain an
/// entry for every declared role (possibly empty) and nothing else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
    pub grants: BTreeMap<Role, Vec<Permission>>,
}

impl CatalogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `role` together with its grants, declaring any permission not
    /// seen yet.
    pub fn with_role<I, P>(mut self, role: impl Into<Role>, grants: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        let role = role.into();
        let grants: Vec<Permission> = grants.into_iter().map(Into::into).collect();
        for perm in &grants {
            if !self.permissions.contains(perm) {
                self.permissions.push(perm.clone());
            }
        }
        if !self.roles.contains(&role) {
            self.roles.push(role.clone());
        }
        self.grants.insert(role, grants);
        self
    }
}

/// Immutable mapping `Role → Set<Permission>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionCatalog {
    roles: BTreeSet<Role>,
    permissions: BTreeSet<Permission>,
    grants: BTreeMap<Role, BTreeSet<Permission>>,
}

impl PermissionCatalog {
    /// Validate a declaration and build the catalog from it.
    pub fn from_config(config: CatalogConfig) -> ConfigResult<Self> {
        let roles: BTreeSet<Role> = config.roles.into_iter().collect();
        let permissions: BTreeSet<Permission> = config.permissions.into_iter().collect();

        if let Some(empty) = roles.iter().find(|r| r.as_str().trim().is_empty()) {
            return Err(ConfigError::validation(format!("empty role identifier '{empty}'")));
        }
        if let Some(empty) = permissions.iter().find(|p| p.as_str().trim().is_empty()) {
            return Err(ConfigError::validation(format!(
                "empty permission identifier '{empty}'"
            )));
        }

        let mut grants = BTreeMap::new();
        for (role, granted) in config.grants {
            if !roles.contains(&role) {
                return Err(ConfigError::UnknownRole(role.to_string()));
            }
            if let Some(unknown) = granted.iter().find(|p| !permissions.contains(*p)) {
                return Err(ConfigError::UnknownPermission(unknown.to_string()));
            }
            grants.insert(role, granted.into_iter().collect::<BTreeSet<_>>());
        }

        if let Some(missing) = roles.iter().find(|r| !grants.contains_key(*r)) {
            return Err(ConfigError::MissingRole(missing.to_string()));
        }

        tracing::info!(
            roles = roles.len(),
            permissions = permissions.len(),
            "permission catalog loaded"
        );

        Ok(Self {
            roles,
            permissions,
            grants,
        })
    }

    /// Parse and validate a JSON catalog declaration.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: CatalogConfig = serde_json::from_str(json)?;
        Self::from_config(config)
    }

    /// The catalog shipped with taskdeck.
    pub fn builtin() -> ConfigResult<Self> {
        Self::from_json_str(BUILTIN_CATALOG)
    }

    /// Permissions held by `role`; empty for roles the catalog does not know.
    pub fn permissions_for(&self, role: &Role) -> &BTreeSet<Permission> {
        self.grants.get(role).unwrap_or(&NO_PERMISSIONS)
    }

    pub fn role_has(&self, role: &Role, permission: &Permission) -> bool {
        self.permissions_for(role).contains(permission)
    }

    /// Declared roles whose grants include `permission`.
    pub fn roles_granting(&self, permission: &Permission) -> Vec<&Role> {
        self.grants
            .iter()
            .filter(|(_, perms)| perms.contains(permission))
            .map(|(role, _)| role)
            .collect()
    }

    pub fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    pub fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }

    pub fn is_declared_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }

    pub fn is_declared_permission(&self, permission: &Permission) -> bool {
        self.permissions.contains(permission)
    }
}
