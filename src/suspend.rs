//! Suspension snapshots: a durable capture of an execution whose required
//! inputs are not all present, keyed by an opaque handle.

use std::collections::BTreeMap;

use dashmap::DashMap;
use uuid::Uuid;

use crate::runtime::ModuleStatus;
use crate::value::{CType, CValue};

pub type SuspensionHandle = Uuid;

/// Everything resume needs to pick an execution back up: every input
/// supplied so far, every data node already resolved, and a monotone
/// snapshot of module statuses.
#[derive(Debug, Clone)]
pub struct SuspendedExecution {
    pub execution_id: Uuid,
    pub dag_name: String,
    pub structural_hash: String,
    /// Keyed by input name (matches `DataNodeSpec.name`).
    pub provided_inputs: BTreeMap<String, CValue>,
    /// Keyed by data-node id.
    pub computed_values: BTreeMap<String, CValue>,
    pub module_statuses: BTreeMap<String, ModuleStatus>,
    pub missing_inputs: BTreeMap<String, CType>,
    pub resumption_count: u32,
}

#[derive(Debug, Clone)]
pub struct SuspensionSummary {
    pub handle: SuspensionHandle,
    pub dag_name: String,
    pub missing_inputs: BTreeMap<String, CType>,
}

/// In-memory store of suspended executions. `save` is atomic: a subsequent
/// `load` either returns the full snapshot or the handle is absent, never a
/// partial entry.
#[derive(Default)]
pub struct SuspensionStore {
    entries: DashMap<SuspensionHandle, SuspendedExecution>,
}

impl SuspensionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, suspended: SuspendedExecution) -> SuspensionHandle {
        let handle = Uuid::new_v4();
        self.entries.insert(handle, suspended);
        handle
    }

    pub fn load(&self, handle: &SuspensionHandle) -> Option<SuspendedExecution> {
        self.entries.get(handle).map(|e| e.clone())
    }

    pub fn remove(&self, handle: &SuspensionHandle) -> Option<SuspendedExecution> {
        self.entries.remove(handle).map(|(_, v)| v)
    }

    pub fn list(&self) -> Vec<SuspensionSummary> {
        self.entries
            .iter()
            .map(|e| SuspensionSummary {
                handle: *e.key(),
                dag_name: e.value().dag_name.clone(),
                missing_inputs: e.value().missing_inputs.clone(),
            })
            .collect()
    }
}
