//! Record lookups: facility listing, facility info, equipment inventory.

use serde_json::json;

use crate::agent::capability::{
    Capability, CapabilityArgs, CapabilityContract, CapabilityOutput, ParamSchema, ParamType,
    SideEffect,
};
use crate::agent::context::AuditContext;
use crate::agent::error::AgentResult;

fn facility_id_param(purpose: &str) -> ParamSchema {
    ParamSchema::required(
        "facility_id",
        ParamType::String,
        format!("The id of the facility {purpose} (e.g. FAC-AB-001)."),
    )
}

/// List every facility that can be audited.
pub struct ListFacilities;

impl Capability for ListFacilities {
    fn contract(&self) -> CapabilityContract {
        CapabilityContract {
            name: "list_facilities".into(),
            description: "Get a list of all available facilities that can be audited.".into(),
            side_effect: SideEffect::Read,
            parameters: vec![],
        }
    }

    fn execute(&self, ctx: &AuditContext, _args: CapabilityArgs) -> AgentResult<CapabilityOutput> {
        let facilities = ctx.store.list_facilities()?;
        if facilities.is_empty() {
            return Ok(CapabilityOutput::with_data(
                "No facilities found in the system.",
                json!({ "facilities": [] }),
            ));
        }

        let mut text = String::from("Available Facilities:\n");
        for fac in &facilities {
            text.push_str(&format!("- {}: {} ({})\n", fac.id, fac.name, fac.location));
        }
        Ok(CapabilityOutput::with_data(
            text,
            json!({ "facilities": facilities }),
        ))
    }
}

/// Basic facility information with an equipment count.
pub struct GetFacilityInfo;

impl Capability for GetFacilityInfo {
    fn contract(&self) -> CapabilityContract {
        CapabilityContract {
            name: "get_facility_info".into(),
            description: "Get name, location, operator and equipment count for one facility."
                .into(),
            side_effect: SideEffect::Read,
            parameters: vec![facility_id_param("to describe")],
        }
    }

    fn execute(&self, ctx: &AuditContext, args: CapabilityArgs) -> AgentResult<CapabilityOutput> {
        let facility_id = args.require_str("facility_id")?;
        let facility = ctx.store.get_facility(facility_id)?;
        let text = format!(
            "{}: {}\n  Location: {}\n  Operator: {}\n  Equipment count: {}",
            facility.id,
            facility.name,
            facility.location,
            facility.operator,
            facility.equipment_ids.len()
        );
        let count = facility.equipment_ids.len();
        Ok(CapabilityOutput::with_data(
            text,
            json!({ "facility": facility, "equipment_count": count }),
        ))
    }
}

/// The full equipment inventory of one facility.
pub struct GetFacilityEquipment;

impl Capability for GetFacilityEquipment {
    fn contract(&self) -> CapabilityContract {
        CapabilityContract {
            name: "get_facility_equipment".into(),
            description: "Fetch the complete list of equipment for a specific facility to check \
                          against directives."
                .into(),
            side_effect: SideEffect::Read,
            parameters: vec![facility_id_param("to inventory")],
        }
    }

    fn execute(&self, ctx: &AuditContext, args: CapabilityArgs) -> AgentResult<CapabilityOutput> {
        let facility_id = args.require_str("facility_id")?;
        let equipment = ctx.store.get_equipment(facility_id)?;

        let text = if equipment.is_empty() {
            format!("Facility {facility_id} has no registered equipment.")
        } else {
            let mut text = format!("Equipment at {facility_id}:\n");
            for item in &equipment {
                text.push_str(&format!(
                    "\n- ID: {}\n  Type: {}\n  Directive: {}\n  Status: {}\n  Last Calibration: {}\n  Interval: {} days\n  Criticality: {}\n",
                    item.id,
                    item.equipment_type,
                    item.directive,
                    item.status,
                    item.last_calibration.format("%Y-%m-%d"),
                    item.interval_days(),
                    item.criticality,
                ));
            }
            text
        };

        Ok(CapabilityOutput::with_data(
            text,
            json!({ "facility_id": facility_id, "equipment": equipment }),
        ))
    }
}
