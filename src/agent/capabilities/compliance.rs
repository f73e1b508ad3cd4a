//! Calibration compliance check over a facility's equipment.

use crate::agent::capability::{
    Capability, CapabilityArgs, CapabilityContract, CapabilityOutput, ParamSchema, ParamType,
    SideEffect,
};
use crate::agent::context::AuditContext;
use crate::agent::error::{AgentError, AgentResult};
use crate::compliance;

/// Evaluate every item of a facility against its calibration interval.
///
/// Structured output is a serialized [`compliance::FacilityCompliance`].
pub struct CheckCalibrationCompliance;

impl Capability for CheckCalibrationCompliance {
    fn contract(&self) -> CapabilityContract {
        CapabilityContract {
            name: "check_calibration_compliance".into(),
            description: "Check every equipment item of a facility against its calibration \
                          interval (365 days unless the item's policy says otherwise). Returns \
                          non-compliant items with days overdue."
                .into(),
            side_effect: SideEffect::Pure,
            parameters: vec![ParamSchema::required(
                "facility_id",
                ParamType::String,
                "The id of the facility to check (e.g. FAC-AB-001).",
            )],
        }
    }

    fn execute(&self, ctx: &AuditContext, args: CapabilityArgs) -> AgentResult<CapabilityOutput> {
        let facility_id = args.require_str("facility_id")?;
        let equipment = ctx.store.get_equipment(facility_id)?;
        let report = compliance::evaluate_all(facility_id, &equipment, ctx.clock.now());

        let data = serde_json::to_value(&report).map_err(|e| AgentError::CapabilityFailed {
            capability: "check_calibration_compliance".into(),
            message: format!("failed to encode report: {e}"),
        })?;
        Ok(CapabilityOutput::with_data(report.render(), data))
    }
}
