//! Eager, single-assignment data table: one slot per data-node id, each
//! accepting exactly one write (or a repeated write of an identical value);
//! reads block until a write occurs.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::error::ConstellationError;
use crate::value::{CType, CValue, RawValue};

struct Slot {
    value: RwLock<Option<CValue>>,
    notify: Notify,
}

impl Slot {
    fn new() -> Self {
        Self {
            value: RwLock::new(None),
            notify: Notify::new(),
        }
    }

    fn set(&self, value: CValue) -> Result<(), ConstellationError> {
        let mut guard = self.value.write();
        match &*guard {
            Some(existing) if *existing == value => Ok(()),
            Some(_) => Err(ConstellationError::DomainError(
                "slot already completed with a different value".to_string(),
            )),
            None => {
                *guard = Some(value);
                drop(guard);
                self.notify.notify_waiters();
                Ok(())
            }
        }
    }

    async fn get(&self) -> CValue {
        loop {
            if let Some(v) = self.value.read().clone() {
                return v;
            }
            let notified = self.notify.notified();
            if let Some(v) = self.value.read().clone() {
                return v;
            }
            notified.await;
        }
    }

    fn is_filled(&self) -> bool {
        self.value.read().is_some()
    }
}

/// Single-assignment slot table keyed by data-node id.
pub struct DataTable {
    slots: DashMap<String, Arc<Slot>>,
}

impl DataTable {
    pub fn new() -> Self {
        Self { slots: DashMap::new() }
    }

    /// Creates slots for every id in `data_ids` that doesn't already have
    /// one. Called once when a `Runtime::State` is constructed from a DAG.
    pub fn register_all<'a>(&self, data_ids: impl IntoIterator<Item = &'a str>) {
        for id in data_ids {
            self.slots.entry(id.to_string()).or_insert_with(|| Arc::new(Slot::new()));
        }
    }

    /// Completes the slot. Completing twice is allowed only with an
    /// identical value.
    pub fn set_table_data(&self, data_id: &str, value: CValue) -> Result<(), ConstellationError> {
        let slot = self
            .slots
            .get(data_id)
            .ok_or_else(|| ConstellationError::NotFoundError(format!("data node '{data_id}' not found")))?;
        slot.set(value)
    }

    /// Waits for the slot to be written, then returns its value.
    pub async fn get_table_data(&self, data_id: &str) -> Result<CValue, ConstellationError> {
        let slot = self
            .slots
            .get(data_id)
            .map(|e| Arc::clone(&e))
            .ok_or_else(|| ConstellationError::NotFoundError(format!("data node '{data_id}' not found")))?;
        Ok(slot.get().await)
    }

    /// Writes a `CValue` directly. In the passthrough (no-slot-registered)
    /// case this silently succeeds rather than failing.
    pub fn set_table_data_cvalue(&self, data_id: &str, value: CValue) -> Result<(), ConstellationError> {
        match self.slots.get(data_id) {
            Some(slot) => slot.set(value),
            None => Ok(()),
        }
    }

    /// Writes an unboxed `RawValue`, reconstructing a `CValue` from `ty`
    /// first. Passthrough case silently succeeds.
    pub fn set_table_data_raw_value(&self, data_id: &str, raw: RawValue, ty: &CType) -> Result<(), ConstellationError> {
        let Some(slot) = self.slots.get(data_id) else {
            return Ok(());
        };
        let value = raw.into_cvalue(ty).map_err(|_| ConstellationError::NodeTypeMismatchError {
            name: data_id.to_string(),
            expected: ty.clone(),
            actual: ty.clone(),
        })?;
        slot.set(value)
    }

    pub fn is_filled(&self, data_id: &str) -> bool {
        self.slots.get(data_id).map(|s| s.is_filled()).unwrap_or(false)
    }

    pub fn contains(&self, data_id: &str) -> bool {
        self.slots.contains_key(data_id)
    }
}

impl Default for DataTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_not_found_for_unregistered_id() {
        let table = DataTable::new();
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let err = rt.block_on(table.get_table_data("missing")).unwrap_err();
        assert!(matches!(err, ConstellationError::NotFoundError(_)));
    }

    #[test]
    fn repeated_identical_write_succeeds() {
        let table = DataTable::new();
        table.register_all(["d1"]);
        table.set_table_data("d1", CValue::CInt(1)).unwrap();
        assert!(table.set_table_data("d1", CValue::CInt(1)).is_ok());
    }

    #[test]
    fn repeated_different_write_fails() {
        let table = DataTable::new();
        table.register_all(["d1"]);
        table.set_table_data("d1", CValue::CInt(1)).unwrap();
        assert!(table.set_table_data("d1", CValue::CInt(2)).is_err());
    }

    #[test]
    fn passthrough_write_to_unregistered_id_silently_succeeds() {
        let table = DataTable::new();
        assert!(table.set_table_data_cvalue("ghost", CValue::CInt(1)).is_ok());
    }

    #[tokio::test]
    async fn get_waits_for_write() {
        let table = Arc::new(DataTable::new());
        table.register_all(["d1"]);
        let reader = {
            let table = Arc::clone(&table);
            tokio::spawn(async move { table.get_table_data("d1").await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        table.set_table_data("d1", CValue::CString("done".to_string())).unwrap();
        let value = reader.await.unwrap().unwrap();
        assert_eq!(value, CValue::CString("done".to_string()));
    }
}
