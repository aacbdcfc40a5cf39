//! Module bodies and the uninitialized → initialized lifecycle.
//!
//! Per the design notes, a module body is a plain function from an input
//! record to an output record — no monadic "effect" wrapper. `Uninitialized`
//! modules are factories keyed by metadata name (see
//! [`crate::registry::modules`]); `init` binds one to a specific DAG's data
//! nodes, producing an `Initialized` module the scheduler can run.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::dag::{ComponentMetadata, DagSpec};
use crate::error::ConstellationError;
use crate::value::{CType, CValue};

/// The computation a module performs: inputs named by consume-port, outputs
/// named by produce-port.
pub trait ModuleBody: Send + Sync {
    fn call(&self, inputs: &BTreeMap<String, CValue>) -> Result<BTreeMap<String, CValue>, ConstellationError>;
}

/// A registered, DAG-agnostic module: its declared port surface plus the
/// body that computes outputs from inputs.
#[derive(Clone)]
pub struct UninitializedModule {
    pub metadata: ComponentMetadata,
    pub consumes: BTreeMap<String, CType>,
    pub produces: BTreeMap<String, CType>,
    pub body: Arc<dyn ModuleBody>,
}

impl UninitializedModule {
    pub fn new(
        metadata: ComponentMetadata,
        consumes: BTreeMap<String, CType>,
        produces: BTreeMap<String, CType>,
        body: Arc<dyn ModuleBody>,
    ) -> Self {
        Self {
            metadata,
            consumes,
            produces,
            body,
        }
    }

    /// Binds this factory to `module_id` within `dag`, resolving each
    /// declared port to the data node it's wired to.
    pub fn init(&self, module_id: &str, dag: &DagSpec) -> Result<InitializedModule, ConstellationError> {
        let mut input_ports = BTreeMap::new();
        for port in self.consumes.keys() {
            let data_id = dag
                .in_edges
                .iter()
                .filter(|(_, m)| m == module_id)
                .map(|(d, _)| d.clone())
                .find(|d| {
                    dag.data
                        .get(d)
                        .and_then(|spec| spec.bindings.get(module_id))
                        == Some(port)
                })
                .ok_or_else(|| ConstellationError::UnknownNodeError {
                    name: format!("{module_id}.{port}"),
                })?;
            input_ports.insert(port.clone(), data_id);
        }

        let mut output_ports = BTreeMap::new();
        for port in self.produces.keys() {
            let data_id = dag
                .out_edges
                .iter()
                .filter(|(m, _)| m == module_id)
                .map(|(_, d)| d.clone())
                .find(|d| {
                    dag.data
                        .get(d)
                        .and_then(|spec| spec.bindings.get(module_id))
                        == Some(port)
                })
                .ok_or_else(|| ConstellationError::UnknownNodeError {
                    name: format!("{module_id}.{port}"),
                })?;
            output_ports.insert(port.clone(), data_id);
        }

        Ok(InitializedModule {
            module_id: module_id.to_string(),
            metadata: self.metadata.clone(),
            input_ports,
            output_ports,
            body: Arc::clone(&self.body),
        })
    }
}

/// A module bound to one DAG's data nodes: `input_ports`/`output_ports` map
/// port name → data-node id, resolved once at init time.
#[derive(Clone)]
pub struct InitializedModule {
    pub module_id: String,
    pub metadata: ComponentMetadata,
    pub input_ports: BTreeMap<String, String>,
    pub output_ports: BTreeMap<String, String>,
    body: Arc<dyn ModuleBody>,
}

impl InitializedModule {
    /// Invokes the body and checks it didn't produce more outputs than it
    /// declared — the spec's recommended fail-fast behavior for the "extra
    /// outputs" open question.
    pub fn run(&self, inputs: &BTreeMap<String, CValue>) -> Result<BTreeMap<String, CValue>, ConstellationError> {
        let outputs = self.body.call(inputs)?;
        if outputs.len() > self.output_ports.len() {
            return Err(ConstellationError::ModuleExecutionError {
                module_name: self.metadata.name.clone(),
                module_id: self.module_id.clone(),
                message: format!(
                    "declares {} outputs, produced {}",
                    self.output_ports.len(),
                    outputs.len()
                ),
            });
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::DataNodeSpec;

    struct Uppercase;

    impl ModuleBody for Uppercase {
        fn call(&self, inputs: &BTreeMap<String, CValue>) -> Result<BTreeMap<String, CValue>, ConstellationError> {
            let CValue::CString(text) = inputs.get("text").expect("declared input") else {
                return Err(ConstellationError::ModuleExecutionError {
                    module_name: "Uppercase".to_string(),
                    module_id: "m1".to_string(),
                    message: "text is not a string".to_string(),
                });
            };
            let mut out = BTreeMap::new();
            out.insert("result".to_string(), CValue::CString(text.to_uppercase()));
            Ok(out)
        }
    }

    fn uppercase_dag() -> DagSpec {
        let mut dag = DagSpec::new(ComponentMetadata::new("uppercase-demo"));
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
        dag
    }

    #[test]
    fn init_resolves_ports_to_data_ids() {
        let uninitialized = UninitializedModule::new(
            ComponentMetadata::new("Uppercase"),
            BTreeMap::from([("text".to_string(), CType::CString)]),
            BTreeMap::from([("result".to_string(), CType::CString)]),
            Arc::new(Uppercase),
        );
        let dag = uppercase_dag();
        let initialized = uninitialized.init("m1", &dag).unwrap();
        assert_eq!(initialized.input_ports.get("text"), Some(&"d_text".to_string()));
        assert_eq!(initialized.output_ports.get("result"), Some(&"d_result".to_string()));
    }

    #[test]
    fn run_invokes_body() {
        let uninitialized = UninitializedModule::new(
            ComponentMetadata::new("Uppercase"),
            BTreeMap::from([("text".to_string(), CType::CString)]),
            BTreeMap::from([("result".to_string(), CType::CString)]),
            Arc::new(Uppercase),
        );
        let dag = uppercase_dag();
        let initialized = uninitialized.init("m1", &dag).unwrap();
        let mut inputs = BTreeMap::new();
        inputs.insert("text".to_string(), CValue::CString("hello".to_string()));
        let outputs = initialized.run(&inputs).unwrap();
        assert_eq!(
            outputs.get("result"),
            Some(&CValue::CString("HELLO".to_string()))
        );
    }

    #[test]
    fn extra_outputs_fail_fast() {
        struct TooMany;
        impl ModuleBody for TooMany {
            fn call(&self, _inputs: &BTreeMap<String, CValue>) -> Result<BTreeMap<String, CValue>, ConstellationError> {
                let mut out = BTreeMap::new();
                out.insert("result".to_string(), CValue::CString("a".to_string()));
                out.insert("extra".to_string(), CValue::CString("b".to_string()));
                Ok(out)
            }
        }
        let uninitialized = UninitializedModule::new(
            ComponentMetadata::new("Uppercase"),
            BTreeMap::from([("text".to_string(), CType::CString)]),
            BTreeMap::from([("result".to_string(), CType::CString)]),
            Arc::new(TooMany),
        );
        let dag = uppercase_dag();
        let initialized = uninitialized.init("m1", &dag).unwrap();
        let mut inputs = BTreeMap::new();
        inputs.insert("text".to_string(), CValue::CString("hello".to_string()));
        assert!(initialized.run(&inputs).is_err());
    }
}
