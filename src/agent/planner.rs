//! Rule-based decision oracle for facility audits.
//!
//! [`AuditPlanner`] reads the goal and the session history and picks the next
//! capability with fixed rules, so the audit flow runs without a language
//! model. All planner state is derived from the history on every call; the
//! planner itself holds only configuration.
//!
//! For each facility named in the goal:
//!
//! 1. search the directive index once for calibration requirements,
//! 2. fetch the equipment inventory,
//! 3. check calibration compliance,
//! 4. if anything is overdue: send one report, schedule one follow-up and log
//!    one maintenance entry per overdue item.
//!
//! A step that was already attempted is never retried, whether it succeeded or
//! not; a failed lookup ends that facility's audit. Attempts are matched on
//! exact argument values: a log entry belongs to one (facility, equipment)
//! pair, since equipment ids are only unique within a facility.
//!
//! Goals that mention every facility fan out to an audit of each only when
//! they also ask for one ("audit", "check", "inspect", ...). "List all
//! facilities" lists them and stops. An email address in the goal overrides
//! the configured report recipient.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};

use chrono::Duration;
use regex::Regex;
use serde_json::{Value, json};

use super::oracle::{Decision, DecisionOracle, DecisionRequest, OracleError};
use super::session::Step;
use crate::clock::Clock;
use crate::collab::Passage;
use crate::compliance::FacilityCompliance;

static RE_FACILITY_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bFAC-[A-Z]{2}-\d{3}\b").unwrap());

static RE_ALL_FACILITIES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(all|every|each)\s+(of\s+the\s+)?facilit(y|ies)\b").unwrap()
});

static RE_LIST_FACILITIES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(list|show)\b.*\bfacilities\b").unwrap());

static RE_AUDIT_INTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(audit\w*|check\w*|inspect\w*|review\w*|verif\w*)\b").unwrap()
});

static RE_EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9-]+(\.[A-Z0-9-]+)*\.[A-Z]{2,}\b").unwrap()
});

const CALIBRATION_QUERY: &str = "calibration frequency requirements for measurement equipment";

/// Facility ids mentioned in `goal`, upper-cased, first mention first.
pub fn facility_ids_in(goal: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    RE_FACILITY_ID
        .find_iter(goal)
        .map(|m| m.as_str().to_uppercase())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Whether `goal` asks about every facility.
pub fn wants_all_facilities(goal: &str) -> bool {
    RE_ALL_FACILITIES.is_match(goal)
}

/// Whether `goal` needs the facility list: it names every facility or asks
/// for the list.
pub fn wants_facility_list(goal: &str) -> bool {
    wants_all_facilities(goal) || RE_LIST_FACILITIES.is_match(goal)
}

/// Whether `goal` asks for an audit rather than information.
pub fn requests_audit(goal: &str) -> bool {
    RE_AUDIT_INTENT.is_match(goal)
}

/// The first email address in `goal`.
pub fn recipient_in(goal: &str) -> Option<String> {
    RE_EMAIL.find(goal).map(|m| m.as_str().to_string())
}

/// Deterministic audit planner.
pub struct AuditPlanner {
    recipient: String,
    follow_up_offset_days: i64,
    clock: Arc<dyn Clock>,
}

impl AuditPlanner {
    pub fn new(
        recipient: impl Into<String>,
        follow_up_offset_days: i64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            follow_up_offset_days,
            clock,
        }
    }

    fn plan_facility(&self, fid: &str, recipient: &str, view: &HistoryView<'_>) -> FacilityPlan {
        let by_facility = |capability: &str| view.attempt(capability, &[("facility_id", fid)]);

        match by_facility("get_facility_equipment") {
            None => {
                return FacilityPlan::Next(
                    Decision::invoke("get_facility_equipment", json!({ "facility_id": fid }))
                        .because(format!("Fetch the equipment inventory of {fid}.")),
                );
            }
            Some(step) if !step.observation.is_success() => {
                return FacilityPlan::Done(format!(
                    "{fid}: audit could not proceed ({})",
                    first_line(&step.observation.text)
                ));
            }
            Some(_) => {}
        }

        let report = match by_facility("check_calibration_compliance") {
            None => {
                return FacilityPlan::Next(
                    Decision::invoke("check_calibration_compliance", json!({ "facility_id": fid }))
                        .because(format!("Evaluate calibration dates at {fid}.")),
                );
            }
            Some(step) => match compliance_of(step) {
                Some(report) => report,
                None => {
                    return FacilityPlan::Done(format!(
                        "{fid}: compliance check failed ({})",
                        first_line(&step.observation.text)
                    ));
                }
            },
        };

        let overdue: Vec<_> = report.non_compliant().collect();
        if overdue.is_empty() {
            return FacilityPlan::Done(format!(
                "{fid}: all {} items compliant, no action needed",
                report.items.len()
            ));
        }

        let report_step = by_facility("send_compliance_report");
        if report_step.is_none() {
            let mut body = report.render();
            if let Some(passage) = view.passages().first() {
                let _ = write!(
                    body,
                    "\nRegulatory basis ({}):\n{}\n",
                    passage.source, passage.text
                );
            }
            return FacilityPlan::Next(
                Decision::invoke(
                    "send_compliance_report",
                    json!({
                        "recipient": recipient,
                        "facility_id": fid,
                        "subject": format!(
                            "Calibration Compliance Audit: {fid} - {} non-compliant item(s)",
                            overdue.len()
                        ),
                        "report_body": body,
                    }),
                )
                .because("Notify the compliance officer of the violations."),
            );
        }

        let follow_up_step = by_facility("schedule_follow_up");
        if follow_up_step.is_none() {
            let date = self.clock.today() + Duration::days(self.follow_up_offset_days);
            return FacilityPlan::Next(
                Decision::invoke(
                    "schedule_follow_up",
                    json!({
                        "task": format!("Re-audit calibration at {fid} ({} items overdue)", overdue.len()),
                        "date": date.format("%Y-%m-%d").to_string(),
                        "facility_id": fid,
                    }),
                )
                .because(format!(
                    "Schedule a follow-up {} days out.",
                    self.follow_up_offset_days
                )),
            );
        }

        let mut logged = 0;
        for item in &overdue {
            let eid = &item.record.equipment_id;
            let pair = [("facility_id", fid), ("equipment_id", eid.as_str())];
            match view.attempt("log_maintenance_action", &pair) {
                None => {
                    return FacilityPlan::Next(
                        Decision::invoke(
                            "log_maintenance_action",
                            json!({
                                "equipment_id": eid,
                                "facility_id": fid,
                                "action": "Calibration required",
                                "notes": format!(
                                    "{} days overdue; last calibrated {}; interval {} days",
                                    item.record.days_overdue, item.last_calibration, item.interval_days
                                ),
                            }),
                        )
                        .because(format!("Record the overdue calibration of {eid} at {fid}.")),
                    );
                }
                Some(step) if step.observation.is_success() => logged += 1,
                Some(_) => {}
            }
        }

        let ids: Vec<String> = overdue
            .iter()
            .map(|i| format!("{} {} days overdue", i.record.equipment_id, i.record.days_overdue))
            .collect();
        let mut summary = format!(
            "{fid}: {} of {} items non-compliant ({})",
            overdue.len(),
            report.items.len(),
            ids.join(", ")
        );
        summary.push_str(&describe_receipt(report_step, "report sent"));
        summary.push_str(&describe_receipt(follow_up_step, "follow-up scheduled"));
        let _ = write!(summary, "; {logged} maintenance entries logged");
        FacilityPlan::Done(summary)
    }
}

enum FacilityPlan {
    Next(Decision),
    Done(String),
}

impl DecisionOracle for AuditPlanner {
    fn name(&self) -> &str {
        "rules"
    }

    fn decide(&self, request: &DecisionRequest) -> Result<Decision, OracleError> {
        let view = HistoryView {
            history: &request.history,
        };
        let goal = request.goal.as_str();
        let mut targets = facility_ids_in(goal);
        let listing = targets.is_empty() && wants_facility_list(goal);
        let fan_out = listing && wants_all_facilities(goal) && requests_audit(goal);

        if listing && !fan_out {
            return Ok(match view.last("list_facilities") {
                None => Decision::invoke("list_facilities", json!({}))
                    .because("The goal asks for the facility list."),
                Some(step) if step.observation.is_success() => {
                    Decision::finish(step.observation.text.clone())
                }
                Some(step) => Decision::finish(format!(
                    "Could not list facilities: {}",
                    first_line(&step.observation.text)
                )),
            });
        }

        if view.last("search_directives").is_none() {
            let query = if targets.is_empty() && !fan_out {
                goal
            } else {
                CALIBRATION_QUERY
            };
            return Ok(Decision::invoke("search_directives", json!({ "query": query }))
                .because("Look up the applicable directive requirements."));
        }

        if fan_out {
            match view.last("list_facilities") {
                None => {
                    return Ok(Decision::invoke("list_facilities", json!({}))
                        .because("The goal covers every facility; list them first."));
                }
                Some(step) => match listed_facility_ids(step) {
                    Some(ids) => targets = ids,
                    None => {
                        return Ok(Decision::finish(format!(
                            "Could not list facilities: {}",
                            first_line(&step.observation.text)
                        )));
                    }
                },
            }
        }

        if targets.is_empty() {
            return Ok(Decision::finish(directive_answer(&view)));
        }

        let recipient = recipient_in(goal).unwrap_or_else(|| self.recipient.clone());
        let mut lines = Vec::with_capacity(targets.len());
        for fid in &targets {
            match self.plan_facility(fid, &recipient, &view) {
                FacilityPlan::Next(decision) => return Ok(decision),
                FacilityPlan::Done(line) => lines.push(line),
            }
        }
        Ok(Decision::finish(format!(
            "Audit complete.\n{}",
            lines.join("\n")
        )))
    }
}

/// Read-only queries over a session history.
struct HistoryView<'a> {
    history: &'a [Step],
}

impl<'a> HistoryView<'a> {
    fn last(&self, capability: &str) -> Option<&'a Step> {
        self.history
            .iter()
            .rev()
            .find(|s| s.invocation.capability == capability)
    }

    /// Latest call of `capability` whose string arguments equal every
    /// `(key, value)` pair.
    fn attempt(&self, capability: &str, keys: &[(&str, &str)]) -> Option<&'a Step> {
        self.history.iter().rev().find(|s| {
            s.invocation.capability == capability
                && keys.iter().all(|(key, value)| {
                    s.invocation.arguments.get(*key).and_then(Value::as_str) == Some(*value)
                })
        })
    }

    fn passages(&self) -> Vec<Passage> {
        self.last("search_directives")
            .filter(|s| s.observation.is_success())
            .and_then(|s| s.observation.data.get("passages").cloned())
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }
}

fn compliance_of(step: &Step) -> Option<FacilityCompliance> {
    if !step.observation.is_success() {
        return None;
    }
    serde_json::from_value(step.observation.data.clone()).ok()
}

fn listed_facility_ids(step: &Step) -> Option<Vec<String>> {
    if !step.observation.is_success() {
        return None;
    }
    let facilities = step.observation.data.get("facilities")?.as_array()?;
    Some(
        facilities
            .iter()
            .filter_map(|f| f.get("id").and_then(Value::as_str).map(str::to_string))
            .collect(),
    )
}

fn describe_receipt(step: Option<&Step>, what: &str) -> String {
    match step {
        Some(s) if s.observation.is_success() => {
            let id = s.observation.data["receipt"]["id"].as_str().unwrap_or("?");
            format!("; {what} ({id})")
        }
        Some(s) => format!("; {what} FAILED ({})", first_line(&s.observation.text)),
        None => String::new(),
    }
}

fn directive_answer(view: &HistoryView<'_>) -> String {
    let passages = view.passages();
    match passages.first() {
        Some(p) => {
            let mut answer = format!("{} (Source: {})", p.text, p.source);
            for other in passages.iter().skip(1) {
                let _ = write!(answer, "\nSee also {}.", other.source);
            }
            answer
        }
        None => "No matching directive guidance was found.".into(),
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::capability::Arguments;
    use crate::agent::session::{FailureKind, Outcome, SessionRecord};
    use crate::clock::FixedClock;
    use chrono::{DateTime, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
    }

    fn planner() -> AuditPlanner {
        AuditPlanner::new("compliance@petrolab.example", 30, Arc::new(FixedClock(now())))
    }

    fn request(goal: &str, history: &[Step]) -> DecisionRequest {
        DecisionRequest {
            goal: goal.into(),
            contracts: Arc::from(Vec::new()),
            history: history.to_vec(),
        }
    }

    fn capability_of(d: &Decision) -> &str {
        match d {
            Decision::Invoke { capability, .. } => capability,
            Decision::Finish { .. } => "<finish>",
        }
    }

    fn push(rec: &mut SessionRecord, d: &Decision, outcome: Outcome, data: Value) {
        let Decision::Invoke {
            capability,
            arguments,
            ..
        } = d
        else {
            panic!("expected invoke");
        };
        let inv = rec.invoke(capability.clone(), arguments.clone(), None, now());
        rec.observe(inv, outcome, "observed", data);
    }

    #[test]
    fn extracts_facility_ids() {
        assert_eq!(
            facility_ids_in("Audit fac-ab-001 and FAC-AB-002, then FAC-AB-001 again"),
            vec!["FAC-AB-001", "FAC-AB-002"]
        );
        assert!(facility_ids_in("audit everything").is_empty());
        assert!(wants_all_facilities("Check all facilities for overdue meters"));
        assert!(wants_all_facilities("audit every facility"));
        assert!(!wants_all_facilities("audit FAC-AB-001"));
    }

    #[test]
    fn listing_is_not_an_audit_request() {
        assert!(wants_facility_list("List all facilities"));
        assert!(wants_facility_list("show me the facilities"));
        assert!(!requests_audit("List all facilities"));
        assert!(requests_audit("Check all facilities for overdue meters"));
        assert!(requests_audit("Perform full audit of FAC-AB-002"));
    }

    #[test]
    fn extracts_recipient_address() {
        assert_eq!(
            recipient_in("Check FAC-AB-001 and email results to safety@petolab.com."),
            Some("safety@petolab.com".to_string())
        );
        assert_eq!(recipient_in("Audit FAC-AB-001"), None);
    }

    #[test]
    fn list_goal_finishes_with_the_listing() {
        let p = planner();
        let mut rec = SessionRecord::open("t", "List all facilities", now());
        let d = p.decide(&request(rec.goal(), rec.steps())).unwrap();
        assert_eq!(capability_of(&d), "list_facilities");
        let Decision::Invoke { capability, arguments, .. } = d else {
            unreachable!()
        };
        let inv = rec.invoke(capability, arguments, None, now());
        rec.observe(
            inv,
            Outcome::Success,
            "Available Facilities:\n- FAC-AB-001: Edmonton South Terminal (Edmonton, AB)\n",
            json!({ "facilities": [{ "id": "FAC-AB-001" }] }),
        );
        let d = p.decide(&request(rec.goal(), rec.steps())).unwrap();
        assert_eq!(
            d,
            Decision::finish(
                "Available Facilities:\n- FAC-AB-001: Edmonton South Terminal (Edmonton, AB)\n"
            )
        );
    }

    #[test]
    fn first_step_is_directive_search() {
        let d = planner().decide(&request("Audit FAC-AB-001", &[])).unwrap();
        assert_eq!(capability_of(&d), "search_directives");
    }

    #[test]
    fn failed_inventory_finishes_with_failure() {
        let p = planner();
        let mut rec = SessionRecord::open("t", "Audit FAC-ZZ-999", now());
        let d = p.decide(&request(rec.goal(), rec.steps())).unwrap();
        push(&mut rec, &d, Outcome::Success, json!({ "passages": [] }));
        let d = p.decide(&request(rec.goal(), rec.steps())).unwrap();
        assert_eq!(capability_of(&d), "get_facility_equipment");
        push(
            &mut rec,
            &d,
            Outcome::Failure {
                kind: FailureKind::NotFound,
            },
            Value::Null,
        );
        let d = p.decide(&request(rec.goal(), rec.steps())).unwrap();
        match d {
            Decision::Finish { answer } => {
                assert!(answer.contains("FAC-ZZ-999: audit could not proceed"));
            }
            other => panic!("expected finish, got {other:?}"),
        }
    }

    #[test]
    fn all_facilities_goal_lists_first() {
        let p = planner();
        let mut rec = SessionRecord::open("t", "Audit all facilities", now());
        let d = p.decide(&request(rec.goal(), rec.steps())).unwrap();
        push(&mut rec, &d, Outcome::Success, json!({ "passages": [] }));
        let d = p.decide(&request(rec.goal(), rec.steps())).unwrap();
        assert_eq!(capability_of(&d), "list_facilities");
        push(
            &mut rec,
            &d,
            Outcome::Success,
            json!({ "facilities": [{ "id": "FAC-AB-002" }] }),
        );
        let d = p.decide(&request(rec.goal(), rec.steps())).unwrap();
        assert_eq!(capability_of(&d), "get_facility_equipment");
        if let Decision::Invoke { arguments, .. } = d {
            assert_eq!(arguments["facility_id"], "FAC-AB-002");
        }
    }

    #[test]
    fn question_without_facility_answers_from_passages() {
        let p = planner();
        let mut rec = SessionRecord::open("t", "How often must gas meters be calibrated?", now());
        let d = p.decide(&request(rec.goal(), rec.steps())).unwrap();
        if let Decision::Invoke { arguments, .. } = &d {
            assert_eq!(arguments["query"], "How often must gas meters be calibrated?");
        }
        push(
            &mut rec,
            &d,
            Outcome::Success,
            json!({ "passages": [{ "text": "Meters annually.", "source": "Directive 017, Section 2.1", "score": 0.8 }] }),
        );
        let d = p.decide(&request(rec.goal(), rec.steps())).unwrap();
        assert_eq!(
            d,
            Decision::finish("Meters annually. (Source: Directive 017, Section 2.1)")
        );
    }

    #[test]
    fn attempted_steps_are_not_repeated() {
        let view_steps = {
            let mut rec = SessionRecord::open("t", "g", now());
            let mut args = Arguments::new();
            args.insert("facility_id".into(), json!("FAC-AB-001"));
            let inv = rec.invoke("get_facility_equipment", args, None, now());
            rec.observe(inv, Outcome::Success, "ok", Value::Null);
            rec.steps().to_vec()
        };
        let view = HistoryView {
            history: &view_steps,
        };
        let by = |fid: &str| view.attempt("get_facility_equipment", &[("facility_id", fid)]);
        assert!(by("FAC-AB-001").is_some());
        assert!(by("FAC-AB-002").is_none());
        assert!(by("FAC-AB-00").is_none());
    }
}
