//! Access configuration: catalog, guarded routes and redirect paths, loaded
//! once at startup.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use taskdeck_core::{ConfigError, ConfigResult};

use crate::{
    CatalogConfig, PermissionCatalog, RedirectPaths, ResourceRequirement, RouteDef, RouteTable,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessConfig {
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub routes: Vec<RouteDef>,

    #[serde(default)]
    pub redirects: RedirectPaths,
}

/// Validated, ready-to-use access configuration.
#[derive(Debug, Clone)]
pub struct AccessControl {
    pub catalog: Arc<PermissionCatalog>,
    pub routes: RouteTable,
    pub redirects: RedirectPaths,
}

impl AccessConfig {
    pub fn from_json_str(json: &str) -> ConfigResult<AccessControl> {
        let config: AccessConfig = serde_json::from_str(json)?;
        config.load()
    }

    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<AccessControl> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "loading access configuration");
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Validate everything and build the runtime pieces.
    pub fn load(self) -> ConfigResult<AccessControl> {
        let catalog = PermissionCatalog::from_config(self.catalog)?;
        let routes = RouteTable::new(self.routes);

        let mut failure = None;
        routes.walk(|route| {
            if failure.is_none() {
                failure = check_route(&catalog, route).err();
            }
        });
        if let Some(err) = failure {
            return Err(err);
        }

        for path in [&self.redirects.login_path, &self.redirects.access_denied_path] {
            if !path.starts_with('/') {
                return Err(ConfigError::validation(format!(
                    "redirect path '{path}' must be absolute"
                )));
            }
        }
        if self.redirects.return_url_param.trim().is_empty() {
            return Err(ConfigError::validation("return url parameter must not be empty"));
        }

        Ok(AccessControl {
            catalog: Arc::new(catalog),
            routes,
            redirects: self.redirects,
        })
    }
}

fn check_route(catalog: &PermissionCatalog, route: &RouteDef) -> ConfigResult<()> {
    match &route.requirement {
        Some(ResourceRequirement::RequiresAnyRole { roles }) => {
            if let Some(role) = roles.iter().find(|r| !catalog.is_declared_role(r)) {
                return Err(ConfigError::UnknownRole(role.to_string()));
            }
        }
        Some(ResourceRequirement::RequiresAllPermissions { permissions }) => {
            if let Some(perm) = permissions
                .iter()
                .find(|p| !catalog.is_declared_permission(p))
            {
                return Err(ConfigError::UnknownPermission(perm.to_string()));
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "catalog": {
            "roles": ["ADMIN", "DEVELOPER"],
            "permissions": ["create_task", "delete_task"],
            "grants": {
                "ADMIN": ["create_task", "delete_task"],
                "DEVELOPER": ["create_task"]
            }
        },
        "routes": [
            { "path": "login", "requirement": { "kind": "public" } },
            { "path": "tasks", "children": [
                { "path": ":id/delete", "requirement": { "kind": "requires_all_permissions", "permissions": ["delete_task"] } }
            ] },
            { "path": "admin", "requirement": { "kind": "requires_any_role", "roles": ["ADMIN"] } }
        ],
        "redirects": { "access_denied_path": "/forbidden" }
    }"#;

    #[test]
    fn loads_full_configuration() {
        let access = AccessConfig::from_json_str(CONFIG).unwrap();
        assert_eq!(access.catalog.roles().len(), 2);
        assert_eq!(access.routes.roots().len(), 3);
        assert_eq!(access.redirects.login_path, "/login");
        assert_eq!(access.redirects.access_denied_path, "/forbidden");
        assert!(access.routes.find_chain("/tasks/9/delete").is_some());
    }

    #[test]
    fn route_with_undeclared_role_is_rejected() {
        let json = CONFIG.replace(r#""roles": ["ADMIN"] }"#, r#""roles": ["ROOT"] }"#);
        let err = AccessConfig::from_json_str(&json).unwrap_err();
        assert_eq!(err, ConfigError::UnknownRole("ROOT".to_string()));
    }

    #[test]
    fn nested_route_with_undeclared_permission_is_rejected() {
        let json = CONFIG.replace(r#""permissions": ["delete_task"] }"#, r#""permissions": ["purge"] }"#);
        let err = AccessConfig::from_json_str(&json).unwrap_err();
        assert_eq!(err, ConfigError::UnknownPermission("purge".to_string()));
    }

    #[test]
    fn relative_redirect_path_is_rejected() {
        let json = CONFIG.replace("/forbidden", "forbidden");
        assert!(matches!(
            AccessConfig::from_json_str(&json),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = AccessConfig::from_path("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
