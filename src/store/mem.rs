//! In-memory record store backed by DashMap.
//!
//! Each facility lives in its own map entry; writes take the entry's shard
//! lock, so concurrent status updates to the same equipment never lose a
//! write. All data is lost on process exit.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::RecordStore;
use crate::error::{StoreError, StoreResult};
use crate::model::{Equipment, Facility};

#[derive(Debug, Clone)]
struct FacilityEntry {
    /// Registration order, for deterministic listing.
    seq: u64,
    facility: Facility,
    equipment: Vec<Equipment>,
}

/// Concurrent in-memory facility store.
#[derive(Debug)]
pub struct MemStore {
    facilities: DashMap<String, FacilityEntry>,
    next_seq: AtomicU64,
    /// Snapshot restored by [`MemStore::reset`].
    seed: Vec<(Facility, Vec<Equipment>)>,
}

impl MemStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            facilities: DashMap::new(),
            next_seq: AtomicU64::new(0),
            seed: Vec::new(),
        }
    }

    /// Create a store holding the given facilities, which also become the
    /// state [`reset`](Self::reset) returns to.
    pub fn with_seed(seed: Vec<(Facility, Vec<Equipment>)>) -> StoreResult<Self> {
        let mut store = Self::new();
        for (facility, equipment) in &seed {
            store.insert_facility(facility.clone(), equipment.clone())?;
        }
        store.seed = seed;
        Ok(store)
    }

    /// Create a store seeded with the reference facilities, dated relative to `now`.
    pub fn seeded(now: chrono::DateTime<chrono::Utc>) -> Self {
        let seed = super::fixtures::reference_facilities(now);
        let store = Self::new();
        for (facility, equipment) in &seed {
            store.insert_unchecked(facility.clone(), equipment.clone());
        }
        Self { seed, ..store }
    }

    /// Register a facility with its equipment.
    ///
    /// The facility's `equipment_ids` are rewritten from `equipment` so the two
    /// can never disagree.
    pub fn insert_facility(&self, facility: Facility, equipment: Vec<Equipment>) -> StoreResult<()> {
        if self.facilities.contains_key(&facility.id) {
            return Err(StoreError::DuplicateFacility {
                facility_id: facility.id,
            });
        }
        let mut seen = std::collections::HashSet::new();
        for eq in &equipment {
            if !seen.insert(eq.id.as_str()) {
                return Err(StoreError::DuplicateEquipment {
                    facility_id: facility.id.clone(),
                    equipment_id: eq.id.clone(),
                });
            }
        }
        self.insert_unchecked(facility, equipment);
        Ok(())
    }

    fn insert_unchecked(&self, mut facility: Facility, equipment: Vec<Equipment>) {
        facility.equipment_ids = equipment.iter().map(|e| e.id.clone()).collect();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.facilities.insert(
            facility.id.clone(),
            FacilityEntry {
                seq,
                facility,
                equipment,
            },
        );
    }

    /// Restore the seeded state, discarding every change made since.
    pub fn reset(&self) {
        self.facilities.clear();
        self.next_seq.store(0, Ordering::Relaxed);
        for (facility, equipment) in &self.seed {
            self.insert_unchecked(facility.clone(), equipment.clone());
        }
        tracing::debug!(facilities = self.seed.len(), "record store reset");
    }

    /// Number of facilities.
    pub fn len(&self) -> usize {
        self.facilities.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }

    fn ordered_entries(&self) -> Vec<FacilityEntry> {
        let mut entries: Vec<FacilityEntry> =
            self.facilities.iter().map(|e| e.value().clone()).collect();
        entries.sort_by_key(|e| e.seq);
        entries
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemStore {
    fn list_facilities(&self) -> StoreResult<Vec<Facility>> {
        Ok(self
            .ordered_entries()
            .into_iter()
            .map(|e| e.facility)
            .collect())
    }

    fn get_facility(&self, facility_id: &str) -> StoreResult<Facility> {
        self.facilities
            .get(facility_id)
            .map(|e| e.facility.clone())
            .ok_or_else(|| StoreError::FacilityNotFound {
                facility_id: facility_id.into(),
            })
    }

    fn get_equipment(&self, facility_id: &str) -> StoreResult<Vec<Equipment>> {
        self.facilities
            .get(facility_id)
            .map(|e| e.equipment.clone())
            .ok_or_else(|| StoreError::FacilityNotFound {
                facility_id: facility_id.into(),
            })
    }

    fn find_equipment(&self, equipment_id: &str) -> StoreResult<(String, Equipment)> {
        self.ordered_entries()
            .into_iter()
            .find_map(|entry| {
                entry
                    .equipment
                    .into_iter()
                    .find(|eq| eq.id == equipment_id)
                    .map(|eq| (entry.facility.id, eq))
            })
            .ok_or_else(|| StoreError::EquipmentNotFound {
                equipment_id: equipment_id.into(),
            })
    }

    fn update_equipment_status(
        &self,
        facility_id: &str,
        equipment_id: &str,
        status: &str,
    ) -> StoreResult<Equipment> {
        // The entry guard holds the shard write lock for the whole mutation.
        let mut entry = self
            .facilities
            .get_mut(facility_id)
            .ok_or_else(|| StoreError::FacilityNotFound {
                facility_id: facility_id.into(),
            })?;
        let eq = entry
            .equipment
            .iter_mut()
            .find(|eq| eq.id == equipment_id)
            .ok_or_else(|| StoreError::EquipmentNotInFacility {
                facility_id: facility_id.into(),
                equipment_id: equipment_id.into(),
            })?;
        eq.status = status.to_string();
        Ok(eq.clone())
    }
}
