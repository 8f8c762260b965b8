//! Context resolver — maps a navigation path to a description of the screen.
//!
//! The module map is an ordered list of `(prefix, ModuleContext)` pairs. A
//! prefix matches when the path equals it or continues it with `/`. When
//! several prefixes match, the longest one wins.

use serde::{Deserialize, Serialize};

/// Static description of one dashboard module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleContext {
    pub name: String,
    pub description: String,
    pub features: Vec<String>,
}

impl ModuleContext {
    pub fn new(name: &str, description: &str, features: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            features: features.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Render the natural-language blob handed to the assistant.
    pub fn describe(&self) -> String {
        if self.features.is_empty() {
            format!("{}: {}.", self.name, self.description)
        } else {
            format!(
                "{}: {}. Key features: {}.",
                self.name,
                self.description,
                self.features.join(", ")
            )
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContextResolver {
    entries: Vec<(String, ModuleContext)>,
}

impl ContextResolver {
    pub fn new(entries: Vec<(String, ModuleContext)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(prefix, ctx)| (normalize_prefix(&prefix), ctx))
            .collect();
        Self { entries }
    }

    /// Resolver over the built-in dashboard module map.
    pub fn with_defaults() -> Self {
        Self::new(default_module_map())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the module record for `pathname` (longest matching prefix).
    pub fn lookup(&self, pathname: &str) -> Option<&ModuleContext> {
        let path = pathname.split(['?', '#']).next().unwrap_or(pathname);
        let path = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };

        self.entries
            .iter()
            .filter(|(prefix, _)| prefix_matches(prefix, path))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, ctx)| ctx)
    }

    /// Describe the screen at `pathname`, or `None` when no module matches.
    pub async fn resolve(&self, pathname: &str) -> Option<String> {
        self.lookup(pathname).map(ModuleContext::describe)
    }
}

impl Default for ContextResolver {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim();
    let with_slash = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };
    if with_slash.len() > 1 {
        with_slash.trim_end_matches('/').to_string()
    } else {
        with_slash
    }
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return path == "/";
    }
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Built-in module map for the dashboard platform.
pub fn default_module_map() -> Vec<(String, ModuleContext)> {
    vec![
        (
            "/dashboard".into(),
            ModuleContext::new(
                "Dashboard",
                "Overview of workspace activity, key metrics and recent events",
                &["metric cards", "activity feed", "quick actions"],
            ),
        ),
        (
            "/admin".into(),
            ModuleContext::new(
                "Admin Dashboard",
                "System administration for users, roles and platform settings",
                &["user management", "role assignment", "system health"],
            ),
        ),
        (
            "/admin/permissions".into(),
            ModuleContext::new(
                "Permissions",
                "Manage permission slugs granted to roles and workspace members",
                &["role defaults", "workspace overrides", "permission audit"],
            ),
        ),
        (
            "/organizations".into(),
            ModuleContext::new(
                "Organizations",
                "Create and manage organizations that own workspaces",
                &["organization list", "organization settings", "billing contact"],
            ),
        ),
        (
            "/workspaces".into(),
            ModuleContext::new(
                "Workspaces",
                "Browse and configure workspaces within an organization",
                &["workspace switcher", "workspace settings", "installed modules"],
            ),
        ),
        (
            "/workspace/members".into(),
            ModuleContext::new(
                "Workspace Members",
                "Invite, remove and change roles of workspace members",
                &["invitations", "role changes", "member search"],
            ),
        ),
        (
            "/workspace/permissions".into(),
            ModuleContext::new(
                "Workspace Permissions",
                "Review which roles may use each workspace permission",
                &["permission matrix", "role filters"],
            ),
        ),
        (
            "/users".into(),
            ModuleContext::new(
                "Users",
                "Directory of platform users and their roles",
                &["user search", "profile details", "role badges"],
            ),
        ),
        (
            "/settings".into(),
            ModuleContext::new(
                "Settings",
                "Personal preferences including theme and layout",
                &["theme switcher", "sidebar layout", "notifications"],
            ),
        ),
        (
            "/modules".into(),
            ModuleContext::new(
                "Modules",
                "Install, configure and remove workspace modules",
                &["module catalog", "module permissions", "module settings"],
            ),
        ),
        (
            "/ai-assistant".into(),
            ModuleContext::new(
                "AI Assistant",
                "Full-page chat with the workspace assistant and agent workflows",
                &["chat history", "voice input", "workflow runs"],
            ),
        ),
        (
            "/brand".into(),
            ModuleContext::new(
                "Brand Showcase",
                "Design tokens, themes and component samples of the design system",
                &["color tokens", "typography", "light, dark and cyberpunk skins"],
            ),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prefix_match_equals_exact_match() {
        let resolver = ContextResolver::with_defaults();
        let exact = resolver.resolve("/dashboard").await;
        assert!(exact.is_some());
        assert_eq!(resolver.resolve("/dashboard/reports").await, exact);
    }

    #[tokio::test]
    async fn unknown_path_is_none() {
        let resolver = ContextResolver::with_defaults();
        assert!(resolver.resolve("/unknown-path").await.is_none());
        assert!(resolver.resolve("/").await.is_none());
    }

    #[tokio::test]
    async fn sibling_with_shared_text_does_not_match() {
        let resolver = ContextResolver::with_defaults();
        assert!(resolver.resolve("/dashboards").await.is_none());
    }

    #[tokio::test]
    async fn longest_prefix_wins_regardless_of_order() {
        let resolver = ContextResolver::new(vec![
            ("/admin".into(), ModuleContext::new("Admin", "general", &[])),
            (
                "/admin/permissions".into(),
                ModuleContext::new("Perms", "specific", &[]),
            ),
        ]);
        let reversed = ContextResolver::new(vec![
            (
                "/admin/permissions".into(),
                ModuleContext::new("Perms", "specific", &[]),
            ),
            ("/admin".into(), ModuleContext::new("Admin", "general", &[])),
        ]);

        for r in [&resolver, &reversed] {
            assert_eq!(r.lookup("/admin/permissions/roles").unwrap().name, "Perms");
            assert_eq!(r.lookup("/admin/users").unwrap().name, "Admin");
        }
    }

    #[tokio::test]
    async fn trailing_slash_and_query_are_ignored() {
        let resolver = ContextResolver::with_defaults();
        let base = resolver.resolve("/settings").await;
        assert_eq!(resolver.resolve("/settings/").await, base);
        assert_eq!(resolver.resolve("/settings?tab=theme").await, base);
    }

    #[test]
    fn describe_is_deterministic() {
        let ctx = ModuleContext::new("Users", "Directory of users", &["search", "roles"]);
        assert_eq!(
            ctx.describe(),
            "Users: Directory of users. Key features: search, roles."
        );
        let bare = ModuleContext::new("Users", "Directory of users", &[]);
        assert_eq!(bare.describe(), "Users: Directory of users.");
    }

    #[test]
    fn prefixes_are_normalized() {
        let resolver = ContextResolver::new(vec![(
            "reports/".into(),
            ModuleContext::new("Reports", "r", &[]),
        )]);
        assert!(resolver.lookup("/reports/q1").is_some());
    }
}
