//! Calibration compliance evaluation.
//!
//! [`evaluate`] is a pure function of an equipment record and an instant. It
//! never caches and performs no I/O, so a fixed `now` and fixed fixtures give
//! fully reproducible verdicts.

use std::fmt::Write as _;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ComplianceRecord, Criticality, Equipment};

/// Evaluate one equipment item against its calibration interval.
///
/// `days_overdue = max(0, whole days of (now - (last_calibration + interval)))`.
/// An item is compliant exactly when `days_overdue == 0`, so an item that
/// fell due less than a full day ago is still within its grace day.
pub fn evaluate(equipment: &Equipment, now: DateTime<Utc>) -> ComplianceRecord {
    let due = equipment.calibration_due();
    let overdue = (now - due).num_days().max(0);
    let days_overdue = u32::try_from(overdue).unwrap_or(u32::MAX);

    ComplianceRecord {
        equipment_id: equipment.id.clone(),
        is_compliant: days_overdue == 0,
        days_overdue,
        evaluated_at: now,
        due_on: due.date_naive(),
        days_since_calibration: (now - equipment.last_calibration).num_days(),
    }
}

/// One evaluated item with the equipment details a report needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemVerdict {
    pub equipment_type: String,
    pub criticality: Criticality,
    pub last_calibration: NaiveDate,
    pub interval_days: u32,
    pub record: ComplianceRecord,
}

/// Compliance verdicts for every item of one facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityCompliance {
    pub facility_id: String,
    pub evaluated_at: DateTime<Utc>,
    /// Verdicts in equipment order.
    pub items: Vec<ItemVerdict>,
}

impl FacilityCompliance {
    /// Items past their calibration due date.
    pub fn non_compliant(&self) -> impl Iterator<Item = &ItemVerdict> {
        self.items.iter().filter(|i| !i.record.is_compliant)
    }

    /// Items within their calibration interval.
    pub fn compliant(&self) -> impl Iterator<Item = &ItemVerdict> {
        self.items.iter().filter(|i| i.record.is_compliant)
    }

    /// Whether every item is compliant.
    pub fn all_compliant(&self) -> bool {
        self.items.iter().all(|i| i.record.is_compliant)
    }

    /// Render the human-readable calibration compliance report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Calibration Compliance Report for {}", self.facility_id);
        let _ = writeln!(out, "Date: {}", self.evaluated_at.format("%Y-%m-%d"));
        out.push('\n');

        let failing: Vec<&ItemVerdict> = self.non_compliant().collect();
        if failing.is_empty() {
            out.push_str("ALL EQUIPMENT IS COMPLIANT\n");
        } else {
            out.push_str("NON-COMPLIANT EQUIPMENT (past calibration interval):\n");
            for item in &failing {
                let _ = writeln!(
                    out,
                    "\n[FAIL] {} (ID: {})",
                    item.equipment_type, item.record.equipment_id
                );
                let _ = writeln!(
                    out,
                    "   Last Calibrated: {} ({} days ago, interval {} days)",
                    item.last_calibration, item.record.days_since_calibration, item.interval_days
                );
                let _ = writeln!(out, "   Days Overdue: {}", item.record.days_overdue);
                let _ = writeln!(out, "   Criticality: {}", item.criticality);
            }
            let _ = writeln!(out, "\nTotal Non-Compliant: {} items", failing.len());
        }

        let passing: Vec<&ItemVerdict> = self.compliant().collect();
        if !passing.is_empty() {
            let _ = writeln!(out, "\nCompliant Equipment ({} items):", passing.len());
            for item in passing {
                let _ = writeln!(
                    out,
                    "  [OK] {} (ID: {}) - due {}",
                    item.equipment_type, item.record.equipment_id, item.record.due_on
                );
            }
        }
        out
    }
}

/// Evaluate every item of a facility.
pub fn evaluate_all(
    facility_id: &str,
    equipment: &[Equipment],
    now: DateTime<Utc>,
) -> FacilityCompliance {
    let items = equipment
        .iter()
        .map(|eq| ItemVerdict {
            equipment_type: eq.equipment_type.clone(),
            criticality: eq.criticality,
            last_calibration: eq.last_calibration.date_naive(),
            interval_days: eq.interval_days(),
            record: evaluate(eq, now),
        })
        .collect();

    FacilityCompliance {
        facility_id: facility_id.to_string(),
        evaluated_at: now,
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IntervalPolicy;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn meter(days_ago: i64, interval: Option<IntervalPolicy>) -> Equipment {
        Equipment {
            id: "EQ-TEST".into(),
            equipment_type: "Gas Flow Meter".into(),
            directive: "Directive 017".into(),
            status: "Active".into(),
            criticality: Criticality::High,
            last_calibration: now() - Duration::days(days_ago),
            interval,
        }
    }

    #[test]
    fn overdue_item_reports_whole_days() {
        let rec = evaluate(&meter(400, None), now());
        assert!(!rec.is_compliant);
        assert_eq!(rec.days_overdue, 35);
        assert_eq!(rec.days_since_calibration, 400);
    }

    #[test]
    fn item_inside_interval_is_compliant() {
        let rec = evaluate(&meter(120, None), now());
        assert!(rec.is_compliant);
        assert_eq!(rec.days_overdue, 0);
    }

    #[test]
    fn exactly_due_is_compliant_with_zero_overdue() {
        let rec = evaluate(&meter(365, None), now());
        assert_eq!(rec.days_overdue, 0);
        assert!(rec.is_compliant);
    }

    #[test]
    fn partial_day_past_due_stays_compliant() {
        let mut eq = meter(365, None);
        eq.last_calibration -= Duration::hours(23);
        let rec = evaluate(&eq, now());
        assert_eq!(rec.days_overdue, 0);
        assert!(rec.is_compliant);
    }

    #[test]
    fn one_full_day_past_due_is_overdue() {
        let rec = evaluate(&meter(366, None), now());
        assert_eq!(rec.days_overdue, 1);
        assert!(!rec.is_compliant);
    }

    #[test]
    fn unspecified_interval_defaults_to_annual() {
        let eq = meter(0, None);
        assert_eq!(eq.interval_days(), 365);
        assert_eq!(
            eq.calibration_due(),
            eq.last_calibration + Duration::days(365)
        );
    }

    #[test]
    fn explicit_policies_shorten_interval() {
        let rec = evaluate(&meter(100, Some(IntervalPolicy::Quarterly)), now());
        assert_eq!(rec.days_overdue, 9);
        let rec = evaluate(&meter(100, Some(IntervalPolicy::Days(120))), now());
        assert!(rec.is_compliant);
    }

    #[test]
    fn compliance_matches_overdue_across_range() {
        for days_ago in 0..800 {
            let rec = evaluate(&meter(days_ago, None), now());
            assert_eq!(rec.is_compliant, rec.days_overdue == 0, "days_ago={days_ago}");
            let expected = (days_ago - 365).max(0) as u32;
            assert_eq!(rec.days_overdue, expected, "days_ago={days_ago}");
        }
    }

    #[test]
    fn evaluation_is_idempotent() {
        let eq = meter(380, None);
        assert_eq!(evaluate(&eq, now()), evaluate(&eq, now()));
    }

    #[test]
    fn facility_report_partitions_items() {
        let mut a = meter(400, None);
        a.id = "EQ-A".into();
        let mut b = meter(10, None);
        b.id = "EQ-B".into();
        let report = evaluate_all("FAC-T", &[a, b], now());
        assert_eq!(report.non_compliant().count(), 1);
        assert_eq!(report.compliant().count(), 1);
        assert!(!report.all_compliant());

        let text = report.render();
        assert!(text.contains("Calibration Compliance Report for FAC-T"));
        assert!(text.contains("EQ-A"));
        assert!(text.contains("Days Overdue: 35"));
        assert!(text.contains("Total Non-Compliant: 1 items"));
    }

    #[test]
    fn all_compliant_report_says_so() {
        let report = evaluate_all("FAC-T", &[meter(5, None)], now());
        assert!(report.all_compliant());
        assert!(report.render().contains("ALL EQUIPMENT IS COMPLIANT"));
    }
}
