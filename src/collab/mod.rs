//! External collaborators consumed by capabilities.
//!
//! - [`retrieval`]: regulatory passage search (query → ranked passages)
//! - [`sinks`]: notification, scheduling and maintenance-log side effects
//!
//! Only the traits are part of the orchestration contract; the in-memory
//! implementations exist so sessions can run and be inspected offline.

pub mod retrieval;
pub mod sinks;

pub use retrieval::{DirectiveIndex, Passage, Retrieval};
pub use sinks::{
    Calendar, MaintenanceLog, MaintenanceLogSink, NotificationSink, Outbox, Receipt,
    SchedulingSink,
};
