//! Facility and equipment record store.
//!
//! The orchestration loop only ever sees the [`RecordStore`] trait. The
//! in-memory [`MemStore`] is the reference implementation used by the CLI and
//! tests; [`fixtures`] holds the seeded facilities.

pub mod fixtures;
pub mod mem;

pub use mem::MemStore;

use crate::error::{StoreError, StoreResult};
use crate::model::{Equipment, Facility};

/// Read-mostly access to facility records.
///
/// Implementations must tolerate concurrent readers from parallel sessions
/// and serialize writes per equipment item.
pub trait RecordStore: Send + Sync {
    /// All facilities in registration order.
    fn list_facilities(&self) -> StoreResult<Vec<Facility>>;

    /// One facility by id.
    fn get_facility(&self, facility_id: &str) -> StoreResult<Facility>;

    /// Equipment of a facility in registration order.
    ///
    /// Fails with `FacilityNotFound` for an unknown id. A known facility with
    /// no equipment yields an empty list.
    fn get_equipment(&self, facility_id: &str) -> StoreResult<Vec<Equipment>>;

    /// Locate an equipment item by id, returning its facility id alongside.
    ///
    /// Equipment ids are only unique within a facility; this returns the
    /// first facility in registration order that holds `equipment_id`.
    fn find_equipment(&self, equipment_id: &str) -> StoreResult<(String, Equipment)>;

    /// One equipment item of one facility.
    fn find_equipment_in(&self, facility_id: &str, equipment_id: &str) -> StoreResult<Equipment> {
        self.get_equipment(facility_id)?
            .into_iter()
            .find(|eq| eq.id == equipment_id)
            .ok_or_else(|| StoreError::EquipmentNotInFacility {
                facility_id: facility_id.into(),
                equipment_id: equipment_id.into(),
            })
    }

    /// Set the operational status of an equipment item of a facility,
    /// returning the updated record.
    fn update_equipment_status(
        &self,
        facility_id: &str,
        equipment_id: &str,
        status: &str,
    ) -> StoreResult<Equipment>;
}
