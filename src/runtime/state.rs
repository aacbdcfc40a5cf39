//! `Runtime.State`: the lazy, diagnostics-facing half of an execution's
//! state — module statuses and observed data values, read after (or during,
//! for instrumentation) the run rather than awaited by consumers. The eager,
//! awaited half is [`super::table::DataTable`].

use std::collections::BTreeMap;

use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::dag::DagSpec;
use crate::error::ConstellationError;
use crate::value::CValue;

/// A module's lifecycle status. Once a module reaches `Fired`, `Failed`, or
/// `Timed` its status is terminal — callers must not overwrite a terminal
/// status with another.
#[derive(Debug, Clone)]
pub enum ModuleStatus {
    Unfired,
    Fired {
        latency_ms: u64,
        context: Option<String>,
    },
    Failed {
        error: ConstellationError,
    },
    Timed {
        latency_ms: u64,
    },
}

impl ModuleStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ModuleStatus::Unfired)
    }
}

/// A read-only snapshot of `RuntimeState`, returned by `close`.
#[derive(Debug, Clone)]
pub struct RuntimeStateSnapshot {
    pub process_uuid: Uuid,
    pub module_status: BTreeMap<String, ModuleStatus>,
    pub data: BTreeMap<String, CValue>,
    pub latency_ms: Option<u64>,
}

/// Lazy, per-execution state: module statuses and observed data values.
pub struct RuntimeState {
    pub process_uuid: Uuid,
    pub dag: DagSpec,
    module_status: DashMap<String, ModuleStatus>,
    data: DashMap<String, CValue>,
    latency_ms: Mutex<Option<u64>>,
}

impl RuntimeState {
    pub fn new(dag: DagSpec) -> Self {
        let module_status = DashMap::new();
        for module_id in dag.modules.keys() {
            module_status.insert(module_id.clone(), ModuleStatus::Unfired);
        }
        Self {
            process_uuid: Uuid::new_v4(),
            dag,
            module_status,
            data: DashMap::new(),
            latency_ms: Mutex::new(None),
        }
    }

    /// Sets a module's status. Ignored (with a debug assertion) if the
    /// module already holds a terminal status — the scheduler should never
    /// attempt this, but state must not silently corrupt if it does.
    pub fn set_module_status(&self, module_id: impl Into<String>, status: ModuleStatus) {
        let module_id = module_id.into();
        if let Some(existing) = self.module_status.get(&module_id) {
            debug_assert!(
                !existing.is_terminal(),
                "module '{module_id}' status is already terminal"
            );
            if existing.is_terminal() {
                return;
            }
        }
        self.module_status.insert(module_id, status);
    }

    pub fn module_status(&self, module_id: &str) -> Option<ModuleStatus> {
        self.module_status.get(module_id).map(|e| e.clone())
    }

    pub fn all_module_statuses(&self) -> BTreeMap<String, ModuleStatus> {
        self.module_status
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Always writes into the lazy state map, regardless of prior value.
    pub fn set_state_data(&self, data_id: impl Into<String>, value: CValue) {
        self.data.insert(data_id.into(), value);
    }

    pub fn get_state_data(&self, data_id: &str) -> Option<CValue> {
        self.data.get(data_id).map(|e| e.clone())
    }

    /// Records the final latency and returns the final state snapshot.
    pub fn close(&self, latency_ms: u64) -> RuntimeStateSnapshot {
        *self.latency_ms.lock() = Some(latency_ms);
        RuntimeStateSnapshot {
            process_uuid: self.process_uuid,
            module_status: self.all_module_statuses(),
            data: self.data.iter().map(|e| (e.key().clone(), e.value().clone())).collect(),
            latency_ms: Some(latency_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::ComponentMetadata;

    #[test]
    fn new_state_marks_every_module_unfired() {
        let mut dag = DagSpec::new(ComponentMetadata::new("x"));
        dag.modules.insert(
            "m1".to_string(),
            crate::dag::ModuleNodeSpec {
                metadata: ComponentMetadata::new("m"),
                consumes: BTreeMap::new(),
                produces: BTreeMap::new(),
            },
        );
        let state = RuntimeState::new(dag);
        assert!(matches!(state.module_status("m1"), Some(ModuleStatus::Unfired)));
    }

    #[test]
    fn close_returns_snapshot_with_latency() {
        let state = RuntimeState::new(DagSpec::new(ComponentMetadata::new("x")));
        state.set_state_data("d1", CValue::CInt(1));
        let snapshot = state.close(42);
        assert_eq!(snapshot.latency_ms, Some(42));
        assert_eq!(snapshot.data.get("d1"), Some(&CValue::CInt(1)));
    }

    #[test]
    fn terminal_status_is_not_overwritten() {
        let state = RuntimeState::new(DagSpec::new(ComponentMetadata::new("x")));
        state.set_module_status("m1", ModuleStatus::Fired { latency_ms: 5, context: None });
        state.set_module_status("m1", ModuleStatus::Unfired);
        assert!(matches!(
            state.module_status("m1"),
            Some(ModuleStatus::Fired { .. })
        ));
    }
}
