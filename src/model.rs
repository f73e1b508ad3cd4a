//! Facility and equipment records, plus the derived compliance record.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Days in the default (annual) calibration interval.
pub const DEFAULT_INTERVAL_DAYS: u32 = 365;

/// A registered facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facility {
    /// Unique facility id (e.g. `FAC-AB-001`).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Human-readable location.
    pub location: String,
    /// Operating company.
    #[serde(default)]
    pub operator: String,
    /// Equipment ids in registration order.
    #[serde(default)]
    pub equipment_ids: Vec<String>,
}

/// How critical a piece of equipment is to safe operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Criticality {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Criticality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

/// Calibration interval policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalPolicy {
    Annual,
    SemiAnnual,
    Quarterly,
    Monthly,
    /// Explicit interval length in days.
    Days(u32),
}

impl IntervalPolicy {
    /// Interval length in days.
    pub fn days(self) -> u32 {
        match self {
            Self::Annual => DEFAULT_INTERVAL_DAYS,
            Self::SemiAnnual => 182,
            Self::Quarterly => 91,
            Self::Monthly => 30,
            Self::Days(d) => d,
        }
    }
}

impl std::fmt::Display for IntervalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Annual => write!(f, "annual"),
            Self::SemiAnnual => write!(f, "semi-annual"),
            Self::Quarterly => write!(f, "quarterly"),
            Self::Monthly => write!(f, "monthly"),
            Self::Days(d) => write!(f, "every {d} days"),
        }
    }
}

/// A piece of equipment owned by a facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    /// Equipment id, unique within its facility.
    pub id: String,
    /// Type/category label (e.g. "Gas Flow Meter").
    pub equipment_type: String,
    /// Regulatory directive the equipment falls under.
    #[serde(default)]
    pub directive: String,
    /// Operational status (e.g. "Active", "Out of Service").
    #[serde(default = "default_status")]
    pub status: String,
    pub criticality: Criticality,
    /// When the equipment was last calibrated or proved.
    pub last_calibration: DateTime<Utc>,
    /// `None` means the annual default applies.
    #[serde(default)]
    pub interval: Option<IntervalPolicy>,
}

fn default_status() -> String {
    "Active".into()
}

impl Equipment {
    /// Effective calibration interval in days.
    pub fn interval_days(&self) -> u32 {
        self.interval
            .map(IntervalPolicy::days)
            .unwrap_or(DEFAULT_INTERVAL_DAYS)
    }

    /// The instant at which the next calibration falls due.
    pub fn calibration_due(&self) -> DateTime<Utc> {
        self.last_calibration + chrono::Duration::days(i64::from(self.interval_days()))
    }
}

/// Result of evaluating one equipment item at a point in time.
///
/// Derived on every call and never stored: source equipment may change
/// between evaluations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceRecord {
    pub equipment_id: String,
    pub is_compliant: bool,
    /// Whole days past the due date; 0 when compliant.
    pub days_overdue: u32,
    pub evaluated_at: DateTime<Utc>,
    /// Date the calibration fell (or falls) due.
    pub due_on: NaiveDate,
    /// Whole days since the last calibration.
    pub days_since_calibration: i64,
}
