//! `DataSignature`: the final, user-facing projection of an execution —
//! assembled once from a `RuntimeStateSnapshot` plus the scheduler's
//! outcome, never mutated afterward.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::dag::DagSpec;
use crate::execution::ExecutionOptions;
use crate::runtime::{ModuleStatus, RuntimeStateSnapshot};
use crate::scheduler::{PipelineStatus, ResolutionSource};
use crate::suspend::SuspendedExecution;
use crate::value::CValue;

#[derive(Debug, Clone, Default)]
pub struct DataSignatureMetadata {
    pub node_timings: Option<BTreeMap<String, u64>>,
    pub provenance: Option<BTreeMap<String, String>>,
    pub resolution_sources: Option<BTreeMap<String, ResolutionSource>>,
}

/// Immutable, fully-assembled result of a run (or a resume).
#[derive(Debug, Clone)]
pub struct DataSignature {
    pub execution_id: Uuid,
    pub dag_name: String,
    pub structural_hash: String,
    pub status: PipelineStatus,
    inputs: BTreeMap<String, CValue>,
    outputs: BTreeMap<String, CValue>,
    nodes: BTreeMap<String, CValue>,
    pending_outputs: Vec<String>,
    missing_inputs: Vec<String>,
    declared_output_count: usize,
    pub resumption_count: u32,
    pub suspended_state: Option<SuspendedExecution>,
    pub metadata: DataSignatureMetadata,
}

impl DataSignature {
    /// `1.0` once `Completed`; otherwise `computedOutputs / totalDeclaredOutputs`,
    /// with `0/0` treated as `1.0`.
    pub fn progress(&self) -> f64 {
        if self.is_complete() || self.declared_output_count == 0 {
            return 1.0;
        }
        self.outputs.len() as f64 / self.declared_output_count as f64
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.status, PipelineStatus::Completed)
    }

    pub fn output(&self, name: &str) -> Option<&CValue> {
        self.outputs.get(name)
    }

    pub fn node(&self, name: &str) -> Option<&CValue> {
        self.nodes.get(name)
    }

    /// The inputs originally provided to `run`/`resume`, keyed by name.
    pub fn inputs(&self) -> &BTreeMap<String, CValue> {
        &self.inputs
    }

    /// Declared outputs not yet computed.
    pub fn pending_outputs(&self) -> &[String] {
        &self.pending_outputs
    }

    /// Ordered names of external inputs still missing (non-empty only when
    /// `status` is `Suspended`).
    pub fn missing_inputs(&self) -> &[String] {
        &self.missing_inputs
    }

    /// Names of the modules that failed, empty unless `status` is `Failed`.
    pub fn failed_nodes(&self) -> Vec<String> {
        match &self.status {
            PipelineStatus::Failed { failures } => failures.iter().map(|f| f.module_name.clone()).collect(),
            _ => Vec::new(),
        }
    }
}

/// Everything `assemble` needs from a completed scheduler run.
pub struct AssemblyInput<'a> {
    pub dag: &'a DagSpec,
    pub execution_id: Uuid,
    pub structural_hash: String,
    pub status: PipelineStatus,
    pub state: RuntimeStateSnapshot,
    pub resolution_sources: BTreeMap<String, ResolutionSource>,
    pub options: &'a ExecutionOptions,
    pub provided_inputs: BTreeMap<String, CValue>,
    pub resumption_count: u32,
}

pub fn assemble(input: AssemblyInput<'_>) -> DataSignature {
    let AssemblyInput {
        dag,
        execution_id,
        structural_hash,
        status,
        state,
        resolution_sources,
        options,
        provided_inputs,
        resumption_count,
    } = input;

    let mut outputs = BTreeMap::new();
    for name in &dag.declared_outputs {
        if let Some(data_id) = dag.output_bindings.get(name) {
            if let Some(value) = state.data.get(data_id) {
                outputs.insert(name.clone(), value.clone());
            }
        }
    }

    let pending_outputs: Vec<String> = dag
        .declared_outputs
        .iter()
        .filter(|name| !outputs.contains_key(*name))
        .cloned()
        .collect();

    let nodes: BTreeMap<String, CValue> = state
        .data
        .iter()
        .filter_map(|(data_id, value)| Some((dag.data.get(data_id)?.name.clone(), value.clone())))
        .collect();

    let missing_inputs: Vec<String> = match &status {
        PipelineStatus::Suspended { missing_inputs } => missing_inputs.keys().cloned().collect(),
        _ => Vec::new(),
    };

    let metadata = DataSignatureMetadata {
        node_timings: options.include_timings.then(|| node_timings(&state)),
        provenance: options.include_provenance.then(|| provenance(dag)),
        resolution_sources: options.include_resolution_sources.then(|| resolution_sources.clone()),
    };

    let inputs = provided_inputs.clone();

    let suspended_state = match &status {
        PipelineStatus::Suspended { missing_inputs } => Some(SuspendedExecution {
            execution_id,
            dag_name: dag.metadata.name.clone(),
            structural_hash: structural_hash.clone(),
            provided_inputs,
            computed_values: state.data.clone(),
            module_statuses: state.module_status.clone(),
            missing_inputs: missing_inputs.clone(),
            resumption_count,
        }),
        _ => None,
    };

    DataSignature {
        execution_id,
        dag_name: dag.metadata.name.clone(),
        structural_hash,
        declared_output_count: dag.declared_outputs.len(),
        status,
        inputs,
        outputs,
        nodes,
        pending_outputs,
        missing_inputs,
        resumption_count,
        suspended_state,
        metadata,
    }
}

fn node_timings(state: &RuntimeStateSnapshot) -> BTreeMap<String, u64> {
    state
        .module_status
        .iter()
        .filter_map(|(id, status)| match status {
            ModuleStatus::Fired { latency_ms, .. } | ModuleStatus::Timed { latency_ms } => Some((id.clone(), *latency_ms)),
            _ => None,
        })
        .collect()
}

fn provenance(dag: &DagSpec) -> BTreeMap<String, String> {
    dag.declared_outputs
        .iter()
        .filter_map(|name| {
            let data_id = dag.output_bindings.get(name)?;
            let module_id = dag.out_edges.iter().find(|(_, d)| d == data_id).map(|(m, _)| m)?;
            let module_name = dag.modules.get(module_id)?.metadata.name.clone();
            Some((name.clone(), module_name))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::ComponentMetadata;
    use uuid::Uuid;

    fn empty_dag() -> DagSpec {
        DagSpec::new(ComponentMetadata::new("x"))
    }

    #[test]
    fn completed_status_is_full_progress() {
        let signature = assemble(AssemblyInput {
            dag: &empty_dag(),
            execution_id: Uuid::new_v4(),
            structural_hash: "h".to_string(),
            status: PipelineStatus::Completed,
            state: RuntimeStateSnapshot {
                process_uuid: Uuid::new_v4(),
                module_status: BTreeMap::new(),
                data: BTreeMap::new(),
                latency_ms: Some(1),
            },
            resolution_sources: BTreeMap::new(),
            options: &ExecutionOptions::default(),
            provided_inputs: BTreeMap::new(),
            resumption_count: 0,
        });
        assert!(signature.is_complete());
        assert_eq!(signature.progress(), 1.0);
        assert!(signature.failed_nodes().is_empty());
    }

    #[test]
    fn zero_declared_outputs_is_full_progress_even_if_suspended() {
        let signature = assemble(AssemblyInput {
            dag: &empty_dag(),
            execution_id: Uuid::new_v4(),
            structural_hash: "h".to_string(),
            status: PipelineStatus::Suspended { missing_inputs: BTreeMap::new() },
            state: RuntimeStateSnapshot {
                process_uuid: Uuid::new_v4(),
                module_status: BTreeMap::new(),
                data: BTreeMap::new(),
                latency_ms: Some(1),
            },
            resolution_sources: BTreeMap::new(),
            options: &ExecutionOptions::default(),
            provided_inputs: BTreeMap::new(),
            resumption_count: 0,
        });
        assert_eq!(signature.progress(), 1.0);
        assert!(!signature.is_complete());
    }

    #[test]
    fn node_is_keyed_by_name_not_data_id() {
        let mut dag = empty_dag();
        dag.data.insert(
            "d_text".to_string(),
            crate::dag::DataNodeSpec {
                name: "text".to_string(),
                bindings: BTreeMap::new(),
                ty: crate::value::CType::CString,
            },
        );
        let signature = assemble(AssemblyInput {
            dag: &dag,
            execution_id: Uuid::new_v4(),
            structural_hash: "h".to_string(),
            status: PipelineStatus::Completed,
            state: RuntimeStateSnapshot {
                process_uuid: Uuid::new_v4(),
                module_status: BTreeMap::new(),
                data: BTreeMap::from([("d_text".to_string(), CValue::CString("hi".to_string()))]),
                latency_ms: Some(1),
            },
            resolution_sources: BTreeMap::new(),
            options: &ExecutionOptions::default(),
            provided_inputs: BTreeMap::new(),
            resumption_count: 0,
        });
        assert_eq!(signature.node("text"), Some(&CValue::CString("hi".to_string())));
        assert_eq!(signature.node("d_text"), None);
    }

    #[test]
    fn pending_outputs_and_inputs_and_missing_inputs_are_populated() {
        let mut dag = empty_dag();
        dag.declared_outputs.push("result".to_string());
        let provided = BTreeMap::from([("text".to_string(), CValue::CString("hi".to_string()))]);
        let signature = assemble(AssemblyInput {
            dag: &dag,
            execution_id: Uuid::new_v4(),
            structural_hash: "h".to_string(),
            status: PipelineStatus::Suspended {
                missing_inputs: BTreeMap::from([("suffix".to_string(), crate::value::CType::CString)]),
            },
            state: RuntimeStateSnapshot {
                process_uuid: Uuid::new_v4(),
                module_status: BTreeMap::new(),
                data: BTreeMap::new(),
                latency_ms: Some(1),
            },
            resolution_sources: BTreeMap::new(),
            options: &ExecutionOptions::default(),
            provided_inputs: provided.clone(),
            resumption_count: 0,
        });
        assert_eq!(signature.pending_outputs(), &["result".to_string()]);
        assert_eq!(signature.inputs(), &provided);
        assert_eq!(signature.missing_inputs(), &["suffix".to_string()]);
    }
}
