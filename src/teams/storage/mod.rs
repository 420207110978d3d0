//! Storage traits for teams.
//!
//! Every method takes `&mut self` on a transaction handle obtained from a
//! [`TransactionRunner`]; nothing is visible to other transactions until
//! [`TeamTransaction::commit`] succeeds.

mod access;
mod audit;
mod collaborators;
mod relationship;
mod transaction;

pub use access::{AccessChecker, AccessStore, RepositoryStore};
pub use audit::{OptionalAuditStore, TeamAuditStore, WithAuditStore};
pub use collaborators::{
    BranchProtectionStore, IssueAssignmentService, OrgMembershipService, OrganizationStore,
    WatchService,
};
pub use relationship::RelationshipStore;
pub use transaction::{TeamTransaction, TransactionRunner};
