//! Collaborator handles passed into every capability execution.

use std::sync::Arc;

use crate::clock::Clock;
use crate::collab::{
    Calendar, DirectiveIndex, MaintenanceLog, MaintenanceLogSink, NotificationSink, Outbox,
    Retrieval, SchedulingSink,
};
use crate::store::{MemStore, RecordStore};

/// Everything a capability may touch.
///
/// Cheap to clone; all handles are shared. Sessions running in parallel share
/// one context.
#[derive(Clone)]
pub struct AuditContext {
    pub store: Arc<dyn RecordStore>,
    pub retrieval: Arc<dyn Retrieval>,
    pub notifier: Arc<dyn NotificationSink>,
    pub scheduler: Arc<dyn SchedulingSink>,
    pub maintenance_log: Arc<dyn MaintenanceLogSink>,
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AuditContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditContext")
            .field("now", &self.clock.now())
            .finish_non_exhaustive()
    }
}

/// The in-memory reference collaborators, with typed handles for inspection.
#[derive(Debug, Clone)]
pub struct InMemoryCollaborators {
    pub store: Arc<MemStore>,
    pub directives: Arc<DirectiveIndex>,
    pub outbox: Arc<Outbox>,
    pub calendar: Arc<Calendar>,
    pub maintenance_log: Arc<MaintenanceLog>,
}

impl InMemoryCollaborators {
    /// Seeded store, bundled directives, empty sinks.
    pub fn seeded(now: chrono::DateTime<chrono::Utc>) -> Self {
        Self::with_directives(MemStore::seeded(now), DirectiveIndex::builtin())
    }

    /// Custom store and directive index, empty sinks.
    pub fn with_directives(store: MemStore, directives: DirectiveIndex) -> Self {
        Self {
            store: Arc::new(store),
            directives: Arc::new(directives),
            outbox: Arc::new(Outbox::new()),
            calendar: Arc::new(Calendar::new()),
            maintenance_log: Arc::new(MaintenanceLog::new()),
        }
    }

    /// Build a context over these collaborators.
    pub fn context(&self, clock: Arc<dyn Clock>) -> AuditContext {
        AuditContext {
            store: self.store.clone(),
            retrieval: self.directives.clone(),
            notifier: self.outbox.clone(),
            scheduler: self.calendar.clone(),
            maintenance_log: self.maintenance_log.clone(),
            clock,
        }
    }

    /// Restore the seeded records and empty every sink.
    pub fn reset(&self) {
        self.store.reset();
        self.outbox.reset();
        self.calendar.reset();
        self.maintenance_log.reset();
    }
}
