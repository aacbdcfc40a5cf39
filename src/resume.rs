//! Resume: validate new inputs/resolutions against a `SuspendedExecution`,
//! merge, and re-run the scheduler with slots pre-populated.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::backends::Backends;
use crate::dag::DagSpec;
use crate::error::ConstellationError;
use crate::execution::{ExecutionDeadline, ExecutionOptions};
use crate::module::InitializedModule;
use crate::runtime::{DataTable, RuntimeState};
use crate::scheduler::{self, ExecutionOutcome};
use crate::suspend::SuspendedExecution;
use crate::value::CValue;

/// Guards against concurrent resumes of the same `executionId`. Released on
/// every exit path via `Drop`, including early returns from validation
/// failure.
#[derive(Default)]
pub struct ResumeLocks {
    in_flight: DashMap<Uuid, ()>,
}

pub struct ResumeLockGuard<'a> {
    locks: &'a ResumeLocks,
    execution_id: Uuid,
}

impl Drop for ResumeLockGuard<'_> {
    fn drop(&mut self) {
        self.locks.in_flight.remove(&self.execution_id);
    }
}

impl ResumeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, execution_id: Uuid) -> Result<ResumeLockGuard<'_>, ConstellationError> {
        if self.in_flight.insert(execution_id, ()).is_some() {
            return Err(ConstellationError::DomainError(format!(
                "execution '{execution_id}' is already being resumed"
            )));
        }
        Ok(ResumeLockGuard { locks: self, execution_id })
    }
}

pub struct ResumeResult {
    pub state: Arc<RuntimeState>,
    pub table: Arc<DataTable>,
    pub outcome: ExecutionOutcome,
    pub resumption_count: u32,
    pub merged_inputs: BTreeMap<String, CValue>,
}

/// Implements §4.J's `resume` steps 2–6 (the in-flight lock, step 1, is the
/// caller's responsibility via [`ResumeLocks::acquire`]).
pub async fn resume(
    suspended: &SuspendedExecution,
    additional_inputs: BTreeMap<String, CValue>,
    resolved_nodes: BTreeMap<String, CValue>,
    dag: &DagSpec,
    modules: &BTreeMap<String, InitializedModule>,
    options: &ExecutionOptions,
    backends: &Arc<Backends>,
) -> Result<ResumeResult, ConstellationError> {
    let produced: BTreeSet<&str> = dag.out_edges.iter().map(|(_, d)| d.as_str()).collect();
    let name_to_id: BTreeMap<&str, &str> = dag.data.iter().map(|(id, spec)| (spec.name.as_str(), id.as_str())).collect();

    let mut merged_inputs = suspended.provided_inputs.clone();
    for (name, value) in &additional_inputs {
        let Some(&data_id) = name_to_id.get(name.as_str()) else {
            return Err(ConstellationError::UnknownNodeError { name: name.clone() });
        };
        if produced.contains(data_id) {
            return Err(ConstellationError::UnknownNodeError { name: name.clone() });
        }
        let expected = dag.data[data_id].ty.clone();
        if value.ctype() != expected {
            return Err(ConstellationError::InputTypeMismatchError {
                name: name.clone(),
                expected,
                actual: value.ctype(),
            });
        }
        match merged_inputs.get(name) {
            Some(existing) if existing != value => {
                return Err(ConstellationError::InputAlreadyProvidedError { name: name.clone() });
            }
            Some(_) => {}
            None => {
                merged_inputs.insert(name.clone(), value.clone());
            }
        }
    }

    let mut merged_computed = suspended.computed_values.clone();
    for (name, value) in &resolved_nodes {
        let Some(&data_id) = name_to_id.get(name.as_str()) else {
            return Err(ConstellationError::UnknownNodeError { name: name.clone() });
        };
        let expected = dag.data[data_id].ty.clone();
        if value.ctype() != expected {
            return Err(ConstellationError::NodeTypeMismatchError {
                name: name.clone(),
                expected,
                actual: value.ctype(),
            });
        }
        if merged_computed.contains_key(data_id) {
            return Err(ConstellationError::NodeAlreadyResolvedError { name: name.clone() });
        }
        merged_computed.insert(data_id.to_string(), value.clone());
    }

    let state = Arc::new(RuntimeState::new(dag.clone()));
    let table = Arc::new(DataTable::new());
    let deadline = ExecutionDeadline::new(options.deadline);

    let outcome = scheduler::execute(
        dag,
        modules,
        &state,
        &table,
        &merged_inputs,
        &merged_computed,
        options,
        backends,
        &deadline,
    )
    .await?;

    Ok(ResumeResult {
        state,
        table,
        outcome,
        resumption_count: suspended.resumption_count + 1,
        merged_inputs,
    })
}
