//! Resource requirements and the declarative route tree they hang off.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{Permission, Role};

/// What a protected resource demands of the subject. Exactly one kind per
/// resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceRequirement {
    Public,
    AuthenticatedOnly,
    /// Satisfied by holding any one of `roles`.
    RequiresAnyRole { roles: BTreeSet<Role> },
    /// Satisfied only when the subject's role grants every one of `permissions`.
    RequiresAllPermissions { permissions: BTreeSet<Permission> },
}

impl ResourceRequirement {
    pub fn any_role<I, R>(roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Role>,
    {
        Self::RequiresAnyRole {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn all_permissions<I, P>(permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        Self::RequiresAllPermissions {
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::AuthenticatedOnly => "authenticated_only",
            Self::RequiresAnyRole { .. } => "requires_any_role",
            Self::RequiresAllPermissions { .. } => "requires_all_permissions",
        }
    }
}

/// A navigable route behind the guard chain.
///
/// `path` is relative to the parent route (`"projects/:id"`); an empty path
/// groups children without consuming a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDef {
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement: Option<ResourceRequirement>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RouteDef>,
}

impl RouteDef {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            requirement: None,
            children: Vec::new(),
        }
    }

    pub fn with_requirement(mut self, requirement: ResourceRequirement) -> Self {
        self.requirement = Some(requirement);
        self
    }

    pub fn with_child(mut self, child: RouteDef) -> Self {
        self.children.push(child);
        self
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|s| !s.is_empty())
    }
}

/// The requirement a guarded route is checked against.
///
/// Undeclared means the route only needs a signed-in subject.
pub fn requirement_for(route: &RouteDef) -> ResourceRequirement {
    route
        .requirement
        .clone()
        .unwrap_or(ResourceRequirement::AuthenticatedOnly)
}

/// Path part of a URL split into segments (query and fragment dropped).
pub fn url_segments(url: &str) -> Vec<&str> {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    url[..end].split('/').filter(|s| !s.is_empty()).collect()
}

/// Lookup structure over the guarded route tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    roots: Vec<RouteDef>,
}

impl RouteTable {
    pub fn new(roots: Vec<RouteDef>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[RouteDef] {
        &self.roots
    }

    /// Route chain matching `url`, outermost route first.
    ///
    /// `None` means the URL is not behind the guard chain.
    pub fn find_chain(&self, url: &str) -> Option<Vec<&RouteDef>> {
        let segments = url_segments(url);
        self.roots
            .iter()
            .find_map(|route| match_route(route, &segments))
    }

    /// Visit every declared route, parents before children.
    pub fn walk(&self, mut visit: impl FnMut(&RouteDef)) {
        fn go<'a>(route: &'a RouteDef, visit: &mut impl FnMut(&'a RouteDef)) {
            visit(route);
            for child in &route.children {
                go(child, visit);
            }
        }
        for route in &self.roots {
            go(route, &mut visit);
        }
    }
}

fn match_route<'a>(route: &'a RouteDef, segments: &[&str]) -> Option<Vec<&'a RouteDef>> {
    let mut rest = segments;
    for pattern in route.segments() {
        let (head, tail) = rest.split_first()?;
        if !pattern.starts_with(':') && pattern != *head {
            return None;
        }
        rest = tail;
    }

    if rest.is_empty() {
        return Some(vec![route]);
    }

    route.children.iter().find_map(|child| {
        let mut chain = match_route(child, rest)?;
        chain.insert(0, route);
        Some(chain)
    })
}
