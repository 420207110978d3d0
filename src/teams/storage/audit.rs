//! Team audit storage trait.

use crate::error::Result;
use crate::teams::audit::TeamAuditEntry;
use crate::teams::types::{OrgId, TeamId};
use async_trait::async_trait;
use std::future::Future;

/// Trait for team audit storage.
///
/// Audit storage is independent of team transactions: entries are written
/// after the operation commits.
#[async_trait]
pub trait TeamAuditStore: Send + Sync {
    /// Record an audit entry.
    async fn record_audit(&self, entry: &TeamAuditEntry) -> Result<()>;

    /// Get audit log for a team, newest first.
    async fn get_team_audit_log(&self, team_id: TeamId, limit: usize)
    -> Result<Vec<TeamAuditEntry>>;

    /// Get audit log for every team of an organization, newest first.
    async fn get_org_audit_log(&self, org_id: OrgId, limit: usize) -> Result<Vec<TeamAuditEntry>>;
}

/// Optional audit store for fire-and-forget audit logging.
pub trait OptionalAuditStore: Send + Sync + Clone + 'static {
    /// Record an audit entry. Errors are logged, not propagated.
    fn record(&self, entry: TeamAuditEntry) -> impl Future<Output = ()> + Send;
}

/// No-op implementation for when audit logging is disabled.
impl OptionalAuditStore for () {
    async fn record(&self, _entry: TeamAuditEntry) {}
}

/// Wrapper to enable audit logging with a real store.
#[derive(Clone)]
pub struct WithAuditStore<A: TeamAuditStore + Clone>(pub A);

impl<A: TeamAuditStore + Clone + 'static> OptionalAuditStore for WithAuditStore<A> {
    async fn record(&self, entry: TeamAuditEntry) {
        if let Err(e) = self.0.record_audit(&entry).await {
            tracing::warn!(
                error = %e,
                event = %entry.event,
                team_id = entry.team_id,
                "Failed to record audit entry"
            );
        }
    }
}
