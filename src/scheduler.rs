//! Topology-aware, concurrency-bounded module scheduler (§4.I).
//!
//! Readiness is driven by the data table rather than a pre-computed
//! topological order: each round collects every not-yet-fired module whose
//! input slots are all filled, runs that wave concurrently (bounded by an
//! optional `Semaphore`), then recomputes readiness. The loop reaches a
//! fixed point either when every module has fired (`Completed`, modulo
//! declared-output resolution) or when a round produces no newly-ready
//! module while required inputs remain missing (`Suspended`).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::backends::{Backends, Tags};
use crate::dag::DagSpec;
use crate::error::ConstellationError;
use crate::execution::{ExecutionDeadline, ExecutionOptions};
use crate::module::InitializedModule;
use crate::runtime::{DataTable, ModuleStatus, RuntimeState};
use crate::value::{CType, CValue};

/// Where a resolved data node's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    FromInput,
    FromModuleExecution,
    FromManualResolution,
    FromCache,
}

#[derive(Debug, Clone)]
pub struct ModuleFailure {
    pub module_id: String,
    pub module_name: String,
    pub error: ConstellationError,
}

#[derive(Debug, Clone)]
pub enum PipelineStatus {
    Completed,
    Suspended { missing_inputs: BTreeMap<String, CType> },
    Failed { failures: Vec<ModuleFailure> },
}

pub struct ExecutionOutcome {
    pub status: PipelineStatus,
    pub resolution_sources: BTreeMap<String, ResolutionSource>,
}

/// Runs `modules` against `dag`. `inputs` seeds external input data nodes;
/// `precomputed` seeds already-resolved nodes (resume's fast path — modules
/// whose every output is already in `precomputed` are marked `Fired`
/// without executing).
pub async fn execute(
    dag: &DagSpec,
    modules: &BTreeMap<String, InitializedModule>,
    state: &Arc<RuntimeState>,
    table: &Arc<DataTable>,
    inputs: &BTreeMap<String, CValue>,
    precomputed: &BTreeMap<String, CValue>,
    options: &ExecutionOptions,
    backends: &Arc<Backends>,
    deadline: &ExecutionDeadline,
) -> Result<ExecutionOutcome, ConstellationError> {
    table.register_all(dag.data.keys().map(String::as_str));

    let resolution_sources = Arc::new(Mutex::new(BTreeMap::new()));

    for (data_id, value) in precomputed {
        table.set_table_data_cvalue(data_id, value.clone())?;
        state.set_state_data(data_id.clone(), value.clone());
        resolution_sources
            .lock()
            .insert(data_id.clone(), ResolutionSource::FromManualResolution);
    }

    let produced: BTreeSet<&str> = dag.out_edges.iter().map(|(_, d)| d.as_str()).collect();
    let mut missing_inputs = BTreeMap::new();
    for (data_id, data_spec) in &dag.data {
        if produced.contains(data_id.as_str()) || table.is_filled(data_id) {
            continue;
        }
        match inputs.get(&data_spec.name) {
            Some(value) => {
                if value.ctype() != data_spec.ty {
                    return Err(ConstellationError::InputTypeMismatchError {
                        name: data_spec.name.clone(),
                        expected: data_spec.ty.clone(),
                        actual: value.ctype(),
                    });
                }
                table.set_table_data(data_id, value.clone())?;
                state.set_state_data(data_id.clone(), value.clone());
                resolution_sources.lock().insert(data_id.clone(), ResolutionSource::FromInput);
            }
            None => {
                missing_inputs.insert(data_spec.name.clone(), data_spec.ty.clone());
            }
        }
    }

    let mut fired: BTreeSet<String> = BTreeSet::new();
    for (module_id, module) in modules {
        let has_outputs = !module.output_ports.is_empty();
        if has_outputs && module.output_ports.values().all(|d| table.is_filled(d)) {
            state.set_module_status(
                module_id.clone(),
                ModuleStatus::Fired {
                    latency_ms: 0,
                    context: Some("FromManualResolution".to_string()),
                },
            );
            fired.insert(module_id.clone());
        }
    }

    let semaphore = options.max_concurrency.map(|n| Arc::new(Semaphore::new(n.max(1))));
    let failures: Arc<Mutex<Vec<ModuleFailure>>> = Arc::new(Mutex::new(Vec::new()));

    loop {
        if deadline.check().is_err() {
            break;
        }

        let ready: Vec<String> = modules
            .keys()
            .filter(|id| !fired.contains(*id))
            .filter(|id| modules[*id].input_ports.values().all(|d| table.is_filled(d)))
            .cloned()
            .collect();

        if ready.is_empty() {
            break;
        }

        let mut join_set: JoinSet<()> = JoinSet::new();
        for module_id in &ready {
            fired.insert(module_id.clone());
            let module = modules[module_id].clone();
            let module_id = module_id.clone();
            let table = Arc::clone(table);
            let state = Arc::clone(state);
            let backends = Arc::clone(backends);
            let failures = Arc::clone(&failures);
            let resolution_sources = Arc::clone(&resolution_sources);
            let permit_fut = semaphore.clone();

            join_set.spawn(async move {
                let _permit = match permit_fut {
                    Some(sem) => Some(sem.acquire_owned().await.expect("semaphore never closed")),
                    None => None,
                };
                run_module(module_id, module, table, state, backends, failures, resolution_sources).await;
            });
        }
        while join_set.join_next().await.is_some() {}
    }

    let all_fired = modules.keys().all(|id| fired.contains(id));
    let any_failed = !failures.lock().is_empty();

    let status = if any_failed {
        PipelineStatus::Failed {
            failures: failures.lock().clone(),
        }
    } else if !all_fired {
        PipelineStatus::Suspended { missing_inputs }
    } else {
        let declared_resolved = dag.declared_outputs.iter().all(|name| {
            dag.output_bindings
                .get(name)
                .map(|d| table.is_filled(d))
                .unwrap_or(false)
        });
        if declared_resolved {
            PipelineStatus::Completed
        } else {
            PipelineStatus::Suspended { missing_inputs }
        }
    };

    Ok(ExecutionOutcome {
        status,
        resolution_sources: resolution_sources.lock().clone(),
    })
}

async fn run_module(
    module_id: String,
    module: InitializedModule,
    table: Arc<DataTable>,
    state: Arc<RuntimeState>,
    backends: Arc<Backends>,
    failures: Arc<Mutex<Vec<ModuleFailure>>>,
    resolution_sources: Arc<Mutex<BTreeMap<String, ResolutionSource>>>,
) {
    // Every input port's data id was registered by `table.register_all` before
    // any module could become ready, so this can't hit `NotFoundError`.
    let mut gathered = BTreeMap::new();
    for (port, data_id) in &module.input_ports {
        let value = table.get_table_data(data_id).await.expect("input data id registered before scheduling");
        gathered.insert(port.clone(), value);
    }

    let module_name = module.metadata.name.clone();
    backends.listener.on_module_start(&module_name);
    let start = Instant::now();

    let span_name = format!("module({module_name})");
    let attrs = Tags::from([("module.name".to_string(), module_name.clone())]);

    let body: std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> = Box::pin(async move {
        let result = module.run(&gathered);
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(outputs) => {
                for (port, value) in outputs {
                    if let Some(data_id) = module.output_ports.get(&port) {
                        let _ = table.set_table_data(data_id, value.clone());
                        state.set_state_data(data_id.clone(), value);
                        resolution_sources
                            .lock()
                            .insert(data_id.clone(), ResolutionSource::FromModuleExecution);
                    }
                }
                state.set_module_status(
                    module_id.clone(),
                    ModuleStatus::Fired { latency_ms: duration_ms, context: None },
                );
                backends.listener.on_module_complete(&module_name, duration_ms);
                backends.metrics.histogram(
                    "constellation.module.duration_ms",
                    duration_ms as f64,
                    &Tags::from([
                        ("module.name".to_string(), module_name.clone()),
                        ("status".to_string(), "success".to_string()),
                    ]),
                );
            }
            Err(error) => {
                state.set_module_status(module_id.clone(), ModuleStatus::Failed { error: error.clone() });
                backends.listener.on_module_failed(&module_name, &error);
                backends.metrics.histogram(
                    "constellation.module.duration_ms",
                    duration_ms as f64,
                    &Tags::from([
                        ("module.name".to_string(), module_name.clone()),
                        ("status".to_string(), "failure".to_string()),
                    ]),
                );
                failures.lock().push(ModuleFailure {
                    module_id: module_id.clone(),
                    module_name: module_name.clone(),
                    error,
                });
            }
        }
    });

    backends.tracer.span(span_name, attrs, body).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{NoopExecutionListener, NoopMetricsProvider, NoopTracerProvider};
    use crate::dag::{ComponentMetadata, DataNodeSpec, ModuleNodeSpec};
    use crate::module::{ModuleBody, UninitializedModule};

    struct Uppercase;
    impl ModuleBody for Uppercase {
        fn call(&self, inputs: &BTreeMap<String, CValue>) -> Result<BTreeMap<String, CValue>, ConstellationError> {
            let CValue::CString(text) = inputs.get("text").expect("declared input") else {
                unreachable!()
            };
            Ok(BTreeMap::from([("result".to_string(), CValue::CString(text.to_uppercase()))]))
        }
    }

    fn uppercase_dag() -> DagSpec {
        let mut dag = DagSpec::new(ComponentMetadata::new("uppercase"));
        dag.modules.insert(
            "m1".to_string(),
            ModuleNodeSpec {
                metadata: ComponentMetadata::new("Uppercase"),
                consumes: BTreeMap::from([("text".to_string(), CType::CString)]),
                produces: BTreeMap::from([("result".to_string(), CType::CString)]),
            },
        );
        dag.data.insert(
            "d_text".to_string(),
            DataNodeSpec {
                name: "text".to_string(),
                bindings: BTreeMap::from([("m1".to_string(), "text".to_string())]),
                ty: CType::CString,
            },
        );
        dag.data.insert(
            "d_result".to_string(),
            DataNodeSpec {
                name: "result".to_string(),
                bindings: BTreeMap::from([("m1".to_string(), "result".to_string())]),
                ty: CType::CString,
            },
        );
        dag.in_edges.insert(("d_text".to_string(), "m1".to_string()));
        dag.out_edges.insert(("m1".to_string(), "d_result".to_string()));
        dag.declared_outputs.push("result".to_string());
        dag.output_bindings.insert("result".to_string(), "d_result".to_string());
        dag
    }

    fn backends() -> Arc<Backends> {
        Arc::new(Backends {
            metrics: Arc::new(NoopMetricsProvider),
            tracer: Arc::new(NoopTracerProvider),
            listener: Arc::new(NoopExecutionListener),
        })
    }

    #[tokio::test]
    async fn completes_a_linear_pipeline() {
        let dag = uppercase_dag();
        let uninitialized = UninitializedModule::new(
            ComponentMetadata::new("Uppercase"),
            BTreeMap::from([("text".to_string(), CType::CString)]),
            BTreeMap::from([("result".to_string(), CType::CString)]),
            Arc::new(Uppercase),
        );
        let modules = BTreeMap::from([("m1".to_string(), uninitialized.init("m1", &dag).unwrap())]);
        let state = Arc::new(RuntimeState::new(dag.clone()));
        let table = Arc::new(DataTable::new());
        let inputs = BTreeMap::from([("text".to_string(), CValue::CString("hello".to_string()))]);

        let outcome = execute(
            &dag,
            &modules,
            &state,
            &table,
            &inputs,
            &BTreeMap::new(),
            &ExecutionOptions::default(),
            &backends(),
            &ExecutionDeadline::none(),
        )
        .await
        .unwrap();

        assert!(matches!(outcome.status, PipelineStatus::Completed));
        assert_eq!(
            table.get_table_data("d_result").await.unwrap(),
            CValue::CString("HELLO".to_string())
        );
    }

    #[tokio::test]
    async fn missing_external_input_suspends() {
        let dag = uppercase_dag();
        let uninitialized = UninitializedModule::new(
            ComponentMetadata::new("Uppercase"),
            BTreeMap::from([("text".to_string(), CType::CString)]),
            BTreeMap::from([("result".to_string(), CType::CString)]),
            Arc::new(Uppercase),
        );
        let modules = BTreeMap::from([("m1".to_string(), uninitialized.init("m1", &dag).unwrap())]);
        let state = Arc::new(RuntimeState::new(dag.clone()));
        let table = Arc::new(DataTable::new());

        let outcome = execute(
            &dag,
            &modules,
            &state,
            &table,
            &BTreeMap::new(),
            &BTreeMap::new(),
            &ExecutionOptions::default(),
            &backends(),
            &ExecutionDeadline::none(),
        )
        .await
        .unwrap();

        match outcome.status {
            PipelineStatus::Suspended { missing_inputs } => {
                assert_eq!(missing_inputs.get("text"), Some(&CType::CString));
            }
            _ => panic!("expected Suspended"),
        }
    }

    #[tokio::test]
    async fn module_failure_is_contained() {
        struct AlwaysFails;
        impl ModuleBody for AlwaysFails {
            fn call(&self, _inputs: &BTreeMap<String, CValue>) -> Result<BTreeMap<String, CValue>, ConstellationError> {
                Err(ConstellationError::ModuleExecutionError {
                    module_name: "Uppercase".to_string(),
                    module_id: "m1".to_string(),
                    message: "boom".to_string(),
                })
            }
        }
        let dag = uppercase_dag();
        let uninitialized = UninitializedModule::new(
            ComponentMetadata::new("Uppercase"),
            BTreeMap::from([("text".to_string(), CType::CString)]),
            BTreeMap::from([("result".to_string(), CType::CString)]),
            Arc::new(AlwaysFails),
        );
        let modules = BTreeMap::from([("m1".to_string(), uninitialized.init("m1", &dag).unwrap())]);
        let state = Arc::new(RuntimeState::new(dag.clone()));
        let table = Arc::new(DataTable::new());
        let inputs = BTreeMap::from([("text".to_string(), CValue::CString("hello".to_string()))]);

        let outcome = execute(
            &dag,
            &modules,
            &state,
            &table,
            &inputs,
            &BTreeMap::new(),
            &ExecutionOptions::default(),
            &backends(),
            &ExecutionDeadline::none(),
        )
        .await
        .unwrap();

        assert!(matches!(outcome.status, PipelineStatus::Failed { .. }));
    }
}
