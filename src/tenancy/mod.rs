//! Tenancy directory — organizations, workspaces, users and memberships.

pub mod model;
pub mod routes;

pub use model::{Organization, User, UserRole, Workspace, WorkspaceMember, slugify};
pub use routes::{TenancyState, tenancy_routes};
