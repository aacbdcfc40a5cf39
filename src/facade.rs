//! `Constellation`: the single external entry point (§6). Wraps the
//! process-wide registries, the pluggable backends, and the suspension
//! store behind one handle a host application owns explicitly — no
//! module-level globals.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::backends::{Backends, ExecutionListener, MetricsProvider, Tags, TracerProvider};
use crate::dag::{DagSpec, PipelineImage};
use crate::error::ConstellationError;
use crate::execution::{ExecutionDeadline, ExecutionOptions};
use crate::hashing::compute_structural_hash;
use crate::module::InitializedModule;
use crate::registry::{DagRegistry, ModuleRegistry, PipelineStore};
use crate::resume::{self, ResumeLocks};
use crate::runtime::{DataTable, RuntimeState};
use crate::scheduler::{self, PipelineStatus};
use crate::signature::{self, AssemblyInput, DataSignature};
use crate::suspend::{SuspensionHandle, SuspensionStore, SuspensionSummary};
use crate::synthetic::synthesize_branch_modules;
use crate::value::CValue;

/// Process-wide handle: module/DAG registries, the content-addressed image
/// store, installed backends, and (optionally) a suspension store.
pub struct Constellation {
    module_registry: ModuleRegistry,
    dag_registry: DagRegistry,
    pipeline_store: PipelineStore,
    backends: Arc<Backends>,
    suspension_store: Option<Arc<SuspensionStore>>,
    resume_locks: ResumeLocks,
}

impl Constellation {
    pub fn builder() -> ConstellationBuilder {
        ConstellationBuilder::default()
    }

    pub fn set_module(&self, uninitialized: crate::module::UninitializedModule) {
        self.module_registry.register(uninitialized.metadata.name.clone(), uninitialized);
    }

    pub fn set_dag(&self, name: impl Into<String>, dag: DagSpec) {
        self.dag_registry.register(name, dag);
    }

    /// Validates the named DAG, computes its structural hash, and stores
    /// (and aliases) the resulting `PipelineImage`.
    pub fn compile(&self, name: &str) -> Result<PipelineImage, ConstellationError> {
        let dag = self
            .dag_registry
            .retrieve(name, None)
            .ok_or_else(|| ConstellationError::NotFoundError(format!("dag '{name}' not found")))?;
        dag.validate().map_err(|e| ConstellationError::DomainError(e.to_string()))?;

        let structural_hash = compute_structural_hash(&dag);
        let image = PipelineImage {
            structural_hash: structural_hash.clone(),
            syntactic_hash: None,
            dag_spec: dag,
            module_options: BTreeMap::new(),
            compiled_at: Utc::now(),
        };
        self.pipeline_store.store(image.clone());
        self.pipeline_store.alias(name, structural_hash);
        Ok(image)
    }

    /// Resolves every module referenced by `dag`: named registrations via
    /// `ModuleRegistry`, plus `branch-*` modules synthesized purely from
    /// their signature.
    fn init_modules(&self, dag: &DagSpec) -> BTreeMap<String, InitializedModule> {
        let mut modules = self.module_registry.init_modules(dag);
        for (module_id, uninitialized) in synthesize_branch_modules(dag) {
            if let std::collections::btree_map::Entry::Vacant(entry) = modules.entry(module_id.clone()) {
                if let Ok(initialized) = uninitialized.init(&module_id, dag) {
                    entry.insert(initialized);
                }
            }
        }
        modules
    }

    pub async fn run(
        &self,
        loaded: &PipelineImage,
        inputs: BTreeMap<String, CValue>,
        options: Option<ExecutionOptions>,
    ) -> Result<DataSignature, ConstellationError> {
        let options = options.unwrap_or_default();
        let dag = &loaded.dag_spec;
        let modules = self.init_modules(dag);
        let state = Arc::new(RuntimeState::new(dag.clone()));
        let table = Arc::new(DataTable::new());
        let deadline = ExecutionDeadline::new(options.deadline);

        self.backends.listener.on_execution_start(&dag.metadata.name);
        let start = Instant::now();

        let outcome = scheduler::execute(
            dag,
            &modules,
            &state,
            &table,
            &inputs,
            &BTreeMap::new(),
            &options,
            &self.backends,
            &deadline,
        )
        .await?;

        let duration_ms = start.elapsed().as_millis() as u64;
        self.emit_execution_instrumentation(&dag.metadata.name, &outcome.status, duration_ms);

        let snapshot = state.close(duration_ms);
        let signature = signature::assemble(AssemblyInput {
            dag,
            execution_id: snapshot.process_uuid,
            structural_hash: loaded.structural_hash.clone(),
            status: outcome.status,
            state: snapshot,
            resolution_sources: outcome.resolution_sources,
            options: &options,
            provided_inputs: inputs,
            resumption_count: 0,
        });

        self.maybe_persist_suspension(&signature);
        Ok(signature)
    }

    /// Empty if no store was installed.
    pub fn list_suspensions(&self) -> Vec<SuspensionSummary> {
        self.suspension_store.as_ref().map(|store| store.list()).unwrap_or_default()
    }

    /// Fails with `ConfigurationError("No SuspensionStore configured")` if
    /// no store was installed, or `NotFoundError("Suspension not found")`
    /// for an unknown handle.
    pub async fn resume_from_store(
        &self,
        handle: SuspensionHandle,
        additional_inputs: Option<BTreeMap<String, CValue>>,
        resolved_nodes: Option<BTreeMap<String, CValue>>,
        options: Option<ExecutionOptions>,
    ) -> Result<DataSignature, ConstellationError> {
        let store = self
            .suspension_store
            .as_ref()
            .ok_or_else(|| ConstellationError::ConfigurationError("No SuspensionStore configured".to_string()))?;
        let suspended = store
            .load(&handle)
            .ok_or_else(|| ConstellationError::NotFoundError("Suspension not found".to_string()))?;

        let _guard = self.resume_locks.acquire(suspended.execution_id)?;

        let image = self
            .pipeline_store
            .get(&suspended.structural_hash)
            .ok_or_else(|| ConstellationError::NotFoundError(format!("pipeline image '{}' not found", suspended.structural_hash)))?;
        let dag = &image.dag_spec;
        let modules = self.init_modules(dag);
        let options = options.unwrap_or_default();

        let start = Instant::now();
        let result = resume::resume(
            &suspended,
            additional_inputs.unwrap_or_default(),
            resolved_nodes.unwrap_or_default(),
            dag,
            &modules,
            &options,
            &self.backends,
        )
        .await?;

        let duration_ms = start.elapsed().as_millis() as u64;
        self.emit_execution_instrumentation(&dag.metadata.name, &result.outcome.status, duration_ms);

        let snapshot = result.state.close(duration_ms);
        let signature = signature::assemble(AssemblyInput {
            dag,
            execution_id: snapshot.process_uuid,
            structural_hash: suspended.structural_hash.clone(),
            status: result.outcome.status,
            state: snapshot,
            resolution_sources: result.outcome.resolution_sources,
            options: &options,
            provided_inputs: result.merged_inputs,
            resumption_count: result.resumption_count,
        });

        store.remove(&handle);
        self.maybe_persist_suspension(&signature);
        Ok(signature)
    }

    fn emit_execution_instrumentation(&self, dag_name: &str, status: &PipelineStatus, duration_ms: u64) {
        let succeeded = matches!(status, PipelineStatus::Completed);
        self.backends.listener.on_execution_complete(dag_name, succeeded, duration_ms);
        self.backends.metrics.counter(
            "constellation.execution.total",
            &Tags::from([
                ("dag.name".to_string(), dag_name.to_string()),
                ("status".to_string(), if succeeded { "success" } else { "failure" }.to_string()),
            ]),
        );
        self.backends.metrics.histogram(
            "constellation.execution.duration_ms",
            duration_ms as f64,
            &Tags::from([("dag.name".to_string(), dag_name.to_string())]),
        );
    }

    fn maybe_persist_suspension(&self, signature: &DataSignature) {
        if let (Some(store), Some(suspended)) = (&self.suspension_store, &signature.suspended_state) {
            store.save(suspended.clone());
        }
    }
}

#[derive(Default)]
pub struct ConstellationBuilder {
    metrics: Option<Arc<dyn MetricsProvider>>,
    tracer: Option<Arc<dyn TracerProvider>>,
    listener: Option<Arc<dyn ExecutionListener>>,
    suspension_store: Option<Arc<SuspensionStore>>,
}

impl ConstellationBuilder {
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsProvider>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn TracerProvider>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn ExecutionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_suspension_store(mut self, store: Arc<SuspensionStore>) -> Self {
        self.suspension_store = Some(store);
        self
    }

    pub fn build(self) -> Constellation {
        let defaults = Backends::default();
        Constellation {
            module_registry: ModuleRegistry::new(),
            dag_registry: DagRegistry::new(),
            pipeline_store: PipelineStore::new(),
            backends: Arc::new(Backends {
                metrics: self.metrics.unwrap_or(defaults.metrics),
                tracer: self.tracer.unwrap_or(defaults.tracer),
                listener: self.listener.unwrap_or(defaults.listener),
            }),
            suspension_store: self.suspension_store,
            resume_locks: ResumeLocks::new(),
        }
    }
}
