//! Group hierarchy resolution for role checks.
//!
//! [`HierarchyRoleManager`] answers "is this user a transitive member of that
//! group?" by walking the group tree in a [`GroupDirectory`] and caching the
//! resulting ancestor sets in a [`RoleCache`].

pub mod cache;
pub mod catalog;
pub mod directory;
pub mod error;
pub mod role_manager;

pub use cache::RoleCache;
pub use catalog::CatalogDirectory;
pub use directory::{
    normalize_group_ref, GroupDirectory, GroupEntity, GroupRelation, StaticDirectory, StaticGroup,
};
pub use error::{HierarchyError, Result};
pub use role_manager::{HierarchyRoleManager, RoleManager, DEFAULT_MAX_DEPTH};
