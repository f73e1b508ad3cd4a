//! Reference facilities seeded into [`MemStore`](super::MemStore).
//!
//! Calibration dates are expressed relative to `now`, so verdicts are stable no
//! matter when the store is built:
//!
//! - `FAC-AB-001`: two overdue items (400 and 380 days since calibration) and
//!   two compliant ones.
//! - `FAC-AB-002`: fully compliant.
//! - `FAC-AB-003`: one semi-annual valve past due.

use chrono::{DateTime, Duration, Utc};

use crate::model::{Criticality, Equipment, Facility, IntervalPolicy};

fn item(
    id: &str,
    equipment_type: &str,
    directive: &str,
    criticality: Criticality,
    calibrated_days_ago: i64,
    interval: Option<IntervalPolicy>,
    now: DateTime<Utc>,
) -> Equipment {
    Equipment {
        id: id.into(),
        equipment_type: equipment_type.into(),
        directive: directive.into(),
        status: "Active".into(),
        criticality,
        last_calibration: now - Duration::days(calibrated_days_ago),
        interval,
    }
}

fn facility(id: &str, name: &str, location: &str) -> Facility {
    Facility {
        id: id.into(),
        name: name.into(),
        location: location.into(),
        operator: "PetroLab Energy".into(),
        equipment_ids: Vec::new(),
    }
}

/// The seeded facilities with their equipment.
pub fn reference_facilities(now: DateTime<Utc>) -> Vec<(Facility, Vec<Equipment>)> {
    vec![
        (
            facility("FAC-AB-001", "Edmonton South Terminal", "Edmonton, AB"),
            vec![
                item("EQ-PUMP-01", "Glycol Pump", "Directive 017", Criticality::High, 400, None, now),
                item(
                    "EQ-METER-04",
                    "Gas Flow Meter",
                    "Directive 017",
                    Criticality::Critical,
                    120,
                    Some(IntervalPolicy::Annual),
                    now,
                ),
                item(
                    "EQ-FLARE-02",
                    "Flare Stack",
                    "Directive 060",
                    Criticality::High,
                    20,
                    Some(IntervalPolicy::Quarterly),
                    now,
                ),
                item(
                    "EQ-METER-05",
                    "Differential Pressure Meter",
                    "Directive 017",
                    Criticality::High,
                    380,
                    None,
                    now,
                ),
            ],
        ),
        (
            facility("FAC-AB-002", "Calgary Processing Plant", "Calgary, AB"),
            vec![item(
                "EQ-METER-10",
                "Turbine Meter",
                "Directive 017",
                Criticality::Critical,
                90,
                None,
                now,
            )],
        ),
        (
            facility("FAC-AB-003", "Red Deer Compressor Station", "Red Deer, AB"),
            vec![
                item(
                    "EQ-VALVE-07",
                    "Pressure Relief Valve",
                    "Directive 077",
                    Criticality::Critical,
                    200,
                    Some(IntervalPolicy::SemiAnnual),
                    now,
                ),
                item(
                    "EQ-METER-21",
                    "Orifice Meter",
                    "Directive 017",
                    Criticality::Medium,
                    30,
                    None,
                    now,
                ),
            ],
        ),
    ]
}
