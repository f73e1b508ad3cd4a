//! Built-in capabilities: facility lookups, compliance check, directive search,
//! report email, follow-up scheduling, maintenance log, status update.

pub mod actions;
pub mod compliance;
pub mod directives;
pub mod facilities;

use std::sync::Arc;

pub use actions::{LogMaintenanceAction, ScheduleFollowUp, SendComplianceReport, UpdateEquipmentStatus};
pub use compliance::CheckCalibrationCompliance;
pub use directives::SearchDirectives;
pub use facilities::{GetFacilityEquipment, GetFacilityInfo, ListFacilities};

use super::capability::{Capability, CapabilityRegistry};
use super::error::AgentResult;

/// The closed set of capabilities shipped with the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinCapability {
    ListFacilities,
    GetFacilityInfo,
    GetFacilityEquipment,
    CheckCalibrationCompliance,
    SearchDirectives,
    SendComplianceReport,
    ScheduleFollowUp,
    LogMaintenanceAction,
    UpdateEquipmentStatus,
}

impl BuiltinCapability {
    /// Every builtin, in registration order.
    pub const ALL: [BuiltinCapability; 9] = [
        Self::ListFacilities,
        Self::GetFacilityInfo,
        Self::GetFacilityEquipment,
        Self::CheckCalibrationCompliance,
        Self::SearchDirectives,
        Self::SendComplianceReport,
        Self::ScheduleFollowUp,
        Self::LogMaintenanceAction,
        Self::UpdateEquipmentStatus,
    ];

    /// Registered name.
    pub fn name(self) -> &'static str {
        match self {
            Self::ListFacilities => "list_facilities",
            Self::GetFacilityInfo => "get_facility_info",
            Self::GetFacilityEquipment => "get_facility_equipment",
            Self::CheckCalibrationCompliance => "check_calibration_compliance",
            Self::SearchDirectives => "search_directives",
            Self::SendComplianceReport => "send_compliance_report",
            Self::ScheduleFollowUp => "schedule_follow_up",
            Self::LogMaintenanceAction => "log_maintenance_action",
            Self::UpdateEquipmentStatus => "update_equipment_status",
        }
    }

    /// Look up a builtin by its registered name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    /// A fresh implementation handle.
    pub fn implementation(self) -> Arc<dyn Capability> {
        match self {
            Self::ListFacilities => Arc::new(ListFacilities),
            Self::GetFacilityInfo => Arc::new(GetFacilityInfo),
            Self::GetFacilityEquipment => Arc::new(GetFacilityEquipment),
            Self::CheckCalibrationCompliance => Arc::new(CheckCalibrationCompliance),
            Self::SearchDirectives => Arc::new(SearchDirectives),
            Self::SendComplianceReport => Arc::new(SendComplianceReport),
            Self::ScheduleFollowUp => Arc::new(ScheduleFollowUp),
            Self::LogMaintenanceAction => Arc::new(LogMaintenanceAction),
            Self::UpdateEquipmentStatus => Arc::new(UpdateEquipmentStatus),
        }
    }
}

impl std::fmt::Display for BuiltinCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Register every builtin into `registry`.
pub fn register_builtins(registry: &mut CapabilityRegistry) -> AgentResult<()> {
    for builtin in BuiltinCapability::ALL {
        registry.register_capability(builtin.implementation())?;
    }
    Ok(())
}

/// A registry holding exactly the builtins.
pub fn builtin_registry() -> AgentResult<CapabilityRegistry> {
    let mut registry = CapabilityRegistry::new();
    register_builtins(&mut registry)?;
    Ok(registry)
}
