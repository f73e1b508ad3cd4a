// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # facility-audit
//!
//! A goal-driven compliance audit agent. An operator states a goal ("audit
//! FAC-AB-001"); a controller asks a decision oracle which capability to run
//! next, executes it, and feeds the observation back until the goal is done or
//! the iteration budget runs out.
//!
//! ## Architecture
//!
//! - **Compliance evaluator** (`compliance`): pure calibration verdicts
//! - **Record store** (`store`): facilities and equipment, in memory
//! - **Collaborators** (`collab`): directive retrieval and action sinks
//! - **Agent** (`agent`): capability registry, oracles, controller, transcripts
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use facility_audit::agent::{AuditPlanner, Controller, InMemoryCollaborators};
//! use facility_audit::clock::SystemClock;
//!
//! let clock = Arc::new(SystemClock);
//! let collab = InMemoryCollaborators::seeded(chrono::Utc::now());
//! let planner = AuditPlanner::new("officer@example.com", 30, clock.clone());
//! let controller = Controller::with_builtins(Arc::new(planner), collab.context(clock)).unwrap();
//! let session = controller.run("Audit facility FAC-AB-001");
//! println!("{}", session.render());
//! ```

pub mod agent;
pub mod clock;
pub mod collab;
pub mod compliance;
pub mod config;
pub mod error;
pub mod message;
pub mod model;
pub mod paths;
pub mod store;
