//! Role-based access control core.
//!
//! This crate holds the rule model, the in-process [`RuleEngine`], the
//! [`PolicyStoreDelegate`] that keeps the engine and the metadata store in
//! step, and the fail-closed [`PermissionPolicy`] decision handler.
//!
//! # Architecture Overview
//!
//! 1. A caller asks [`PermissionPolicy::handle`] for a decision.
//! 2. The handler picks the rule key and action from the permission and asks
//!    the enforcer, normally the delegate.
//! 3. The [`RuleEngine`] matches rules by subject, resolving group ancestry
//!    through the `hierarchy` crate's role manager.
//! 4. A positive answer on a resource permission may be replaced by a stored
//!    conditional decision.
//!
//! Rule and metadata writes only go through the delegate. Each one is a single
//! store transaction, and the engine sees the change once it has committed.
//!
//! # Security Note
//! The decision handler never fails open. Store or directory failures during a
//! check are logged and answered with a deny.

pub mod audit;
pub mod conditional;
pub mod decision;
pub mod delegate;
pub mod engine;
pub mod error;
pub mod permission;
pub mod types;

pub use conditional::{ConditionalDecision, ConditionalStorage, MemoryConditionalStorage};
pub use decision::{PermissionPolicy, PolicyEnforcer};
pub use delegate::{PolicyBatch, PolicyStoreDelegate};
pub use engine::{RuleChanges, RuleEngine};
pub use error::{AuthzError, ErrorKind, Result};
pub use permission::{AuthorizeResult, Identity, Permission, PolicyDecision, PolicyQuery};
pub use types::{
    Effect, EntityRef, PolicyRule, RoleAssignment, Source, SourcedAssignment, SourcedPolicy,
    USE_ACTION,
};
