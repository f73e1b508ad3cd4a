//! Outward-facing actions: report email, follow-up scheduling, maintenance log,
//! equipment status changes.
//!
//! Each call reaches its sink exactly once. A sink failure becomes the
//! capability's error; retrying is the oracle's decision.

use serde_json::json;

use crate::agent::capability::{
    Capability, CapabilityArgs, CapabilityContract, CapabilityOutput, ParamSchema, ParamType,
    SideEffect,
};
use crate::agent::context::AuditContext;
use crate::agent::error::{AgentError, AgentResult};
use crate::model::Equipment;

/// Resolve an equipment item, within `facility_id` when one is given.
fn locate(
    ctx: &AuditContext,
    equipment_id: &str,
    facility_id: Option<&str>,
) -> AgentResult<(String, Equipment)> {
    match facility_id {
        Some(fid) => Ok((fid.to_string(), ctx.store.find_equipment_in(fid, equipment_id)?)),
        None => Ok(ctx.store.find_equipment(equipment_id)?),
    }
}

/// Email an audit report to a compliance officer.
pub struct SendComplianceReport;

impl Capability for SendComplianceReport {
    fn contract(&self) -> CapabilityContract {
        CapabilityContract {
            name: "send_compliance_report".into(),
            description: "Send the audit report by email to the compliance officer. Use after \
                          completing an audit to notify stakeholders."
                .into(),
            side_effect: SideEffect::WriteExternal,
            parameters: vec![
                ParamSchema::required("recipient", ParamType::String, "Email address of the compliance officer."),
                ParamSchema::required("subject", ParamType::String, "Subject line of the email."),
                ParamSchema::required("report_body", ParamType::String, "Full text of the compliance report."),
                ParamSchema::optional("cc", ParamType::StringList, "CC recipients."),
                ParamSchema::optional("facility_id", ParamType::String, "Facility the report covers."),
            ],
        }
    }

    fn execute(&self, ctx: &AuditContext, args: CapabilityArgs) -> AgentResult<CapabilityOutput> {
        let recipient = args.require_str("recipient")?;
        if !recipient.contains('@') {
            return Err(AgentError::InvalidArguments {
                capability: "send_compliance_report".into(),
                message: format!("recipient is not an email address: {recipient}"),
            });
        }
        let subject = args.require_str("subject")?;
        let body = args.require_str("report_body")?;
        let cc = args.string_list("cc");
        let facility_id = args.get_str("facility_id");

        let receipt = ctx.notifier.send(recipient, subject, body, &cc)?;
        Ok(CapabilityOutput::with_data(
            format!("Report emailed to {recipient}. Email ID: {}", receipt.id),
            json!({
                "recipient": recipient,
                "cc": cc,
                "facility_id": facility_id,
                "receipt": receipt,
            }),
        ))
    }
}

/// Put a follow-up task in the calendar.
pub struct ScheduleFollowUp;

impl Capability for ScheduleFollowUp {
    fn contract(&self) -> CapabilityContract {
        CapabilityContract {
            name: "schedule_follow_up".into(),
            description: "Schedule a follow-up audit, maintenance task or inspection in the \
                          calendar. The date must be today or later, in YYYY-MM-DD format."
                .into(),
            side_effect: SideEffect::WriteExternal,
            parameters: vec![
                ParamSchema::required("task", ParamType::String, "Task description for the scheduled item."),
                ParamSchema::required("date", ParamType::Date, "Date of the follow-up (YYYY-MM-DD)."),
                ParamSchema::optional("facility_id", ParamType::String, "Associated facility id."),
            ],
        }
    }

    fn execute(&self, ctx: &AuditContext, args: CapabilityArgs) -> AgentResult<CapabilityOutput> {
        let task = args.require_str("task")?;
        let date = args.require_date("date")?;
        let today = ctx.clock.today();
        if date < today {
            return Err(AgentError::InvalidArguments {
                capability: "schedule_follow_up".into(),
                message: format!("date {date} is before today ({today})"),
            });
        }
        let facility_id = args.get_str("facility_id");
        let details = match facility_id {
            Some(fid) => format!("Facility: {fid}"),
            None => String::new(),
        };

        let receipt = ctx.scheduler.create(task, date, &details)?;
        Ok(CapabilityOutput::with_data(
            format!(
                "Follow-up scheduled: {task} on {date}. Confirmation ID: {}",
                receipt.id
            ),
            json!({ "task": task, "date": date, "facility_id": facility_id, "receipt": receipt }),
        ))
    }
}

/// Append a maintenance entry for one equipment item.
pub struct LogMaintenanceAction;

impl Capability for LogMaintenanceAction {
    fn contract(&self) -> CapabilityContract {
        CapabilityContract {
            name: "log_maintenance_action".into(),
            description: "Log a maintenance action for one equipment item, creating an audit \
                          trail entry. Log each non-compliant item separately."
                .into(),
            side_effect: SideEffect::WriteExternal,
            parameters: vec![
                ParamSchema::required("equipment_id", ParamType::String, "Equipment id."),
                ParamSchema::required("action", ParamType::String, "Maintenance action taken or required."),
                ParamSchema::required("notes", ParamType::String, "Additional notes."),
                ParamSchema::optional(
                    "facility_id",
                    ParamType::String,
                    "Facility holding the item. Equipment ids are only unique within a facility.",
                ),
            ],
        }
    }

    fn execute(&self, ctx: &AuditContext, args: CapabilityArgs) -> AgentResult<CapabilityOutput> {
        let equipment_id = args.require_str("equipment_id")?;
        let action = args.require_str("action")?;
        let notes = args.require_str("notes")?;
        let (facility_id, _) = locate(ctx, equipment_id, args.get_str("facility_id"))?;

        let description = format!("{action}: {notes}");
        let receipt = ctx
            .maintenance_log
            .append(equipment_id, &description, ctx.clock.now())?;
        Ok(CapabilityOutput::with_data(
            format!("Maintenance logged for {equipment_id}. Log ID: {}", receipt.id),
            json!({ "equipment_id": equipment_id, "facility_id": facility_id, "receipt": receipt }),
        ))
    }
}

/// Change an item's operational status, recording the change in the log.
pub struct UpdateEquipmentStatus;

impl Capability for UpdateEquipmentStatus {
    fn contract(&self) -> CapabilityContract {
        CapabilityContract {
            name: "update_equipment_status".into(),
            description: "Change an equipment item's operational status (e.g. \"Out of Service\" \
                          for a critical overdue meter). The change is written to the \
                          maintenance log."
                .into(),
            side_effect: SideEffect::WriteExternal,
            parameters: vec![
                ParamSchema::required("equipment_id", ParamType::String, "Equipment id."),
                ParamSchema::required("status", ParamType::String, "New operational status."),
                ParamSchema::optional(
                    "facility_id",
                    ParamType::String,
                    "Facility holding the item. Equipment ids are only unique within a facility.",
                ),
            ],
        }
    }

    fn execute(&self, ctx: &AuditContext, args: CapabilityArgs) -> AgentResult<CapabilityOutput> {
        let equipment_id = args.require_str("equipment_id")?;
        let status = args.require_str("status")?;
        if status.trim().is_empty() {
            return Err(AgentError::InvalidArguments {
                capability: "update_equipment_status".into(),
                message: "status must not be empty".into(),
            });
        }

        let (facility_id, before) = locate(ctx, equipment_id, args.get_str("facility_id"))?;
        let updated = ctx
            .store
            .update_equipment_status(&facility_id, equipment_id, status)?;
        let receipt = ctx.maintenance_log.append(
            equipment_id,
            &format!("Status changed: {} -> {}", before.status, updated.status),
            ctx.clock.now(),
        )?;
        Ok(CapabilityOutput::with_data(
            format!(
                "{equipment_id} status set to {}. Log ID: {}",
                updated.status, receipt.id
            ),
            json!({
                "equipment": updated,
                "facility_id": facility_id,
                "previous_status": before.status,
                "receipt": receipt,
            }),
        ))
    }
}
