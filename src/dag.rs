//! DAG specification types: the content a `PipelineImage` hashes and the
//! shape the scheduler walks.
//!
//! A `DagSpec` is pure data — no behavior lives here. Behavior (module
//! bodies) is supplied separately through the [`crate::module`] registry and
//! looked up by `ModuleNodeSpec.metadata.name` at init time.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value::CType;

/// Descriptive metadata shared by DAGs and modules: name, free-text
/// description, tags, and a major/minor version pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub major: u32,
    #[serde(default)]
    pub minor: u32,
}

impl ComponentMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            major: 0,
            minor: 0,
        }
    }
}

/// A module's declared port surface: the types it consumes and produces,
/// keyed by port name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleNodeSpec {
    pub metadata: ComponentMetadata,
    pub consumes: BTreeMap<String, CType>,
    pub produces: BTreeMap<String, CType>,
}

/// A data node: a named, typed slot in the DAG, plus the set of owners
/// (module ports or external inputs) bound to it.
///
/// `bindings` maps an owner id (a module id for a module port, or the data
/// node's own id for an external input) to the port name at that owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataNodeSpec {
    pub name: String,
    pub bindings: BTreeMap<String, String>,
    #[serde(rename = "type")]
    pub ty: CType,
}

/// An error in a `DagSpec`'s structure, surfaced at compile time rather than
/// left to crash the scheduler later.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DagValidationError {
    #[error("DAG contains a cycle")]
    Cycle,
    #[error("module '{module_id}' port '{port}' has no matching edge")]
    UnboundPort { module_id: String, port: String },
    #[error(
        "edge between data node '{data_id}' and module '{module_id}' has type mismatch: data is {data_type}, port declares {port_type}"
    )]
    PortTypeMismatch {
        data_id: String,
        module_id: String,
        data_type: CType,
        port_type: CType,
    },
    #[error("declared output '{name}' has no entry in outputBindings")]
    UnboundDeclaredOutput { name: String },
    #[error("outputBindings entry '{name}' refers to unknown data node '{data_id}'")]
    UnknownOutputBinding { name: String, data_id: String },
}

/// The full specification of a dataflow DAG: modules, data nodes, edges, and
/// declared outputs. Pure data — content-hashed by [`crate::hashing`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagSpec {
    pub metadata: ComponentMetadata,
    pub modules: BTreeMap<String, ModuleNodeSpec>,
    pub data: BTreeMap<String, DataNodeSpec>,
    pub in_edges: BTreeSet<(String, String)>,
    pub out_edges: BTreeSet<(String, String)>,
    pub declared_outputs: Vec<String>,
    pub output_bindings: BTreeMap<String, String>,
}

impl DagSpec {
    pub fn new(metadata: ComponentMetadata) -> Self {
        Self {
            metadata,
            modules: BTreeMap::new(),
            data: BTreeMap::new(),
            in_edges: BTreeSet::new(),
            out_edges: BTreeSet::new(),
            declared_outputs: Vec::new(),
            output_bindings: BTreeMap::new(),
        }
    }

    /// Checks the invariants from the data model: acyclicity, port/edge
    /// correspondence with matching types, and declared-output bindings.
    pub fn validate(&self) -> Result<(), DagValidationError> {
        self.check_acyclic()?;

        for (module_id, module) in &self.modules {
            for port in module.consumes.keys() {
                let bound = self
                    .in_edges
                    .iter()
                    .any(|(data_id, m)| m == module_id && self.port_of(data_id, module_id) == Some(port.clone()));
                if !bound {
                    return Err(DagValidationError::UnboundPort {
                        module_id: module_id.clone(),
                        port: port.clone(),
                    });
                }
            }
            for port in module.produces.keys() {
                let bound = self
                    .out_edges
                    .iter()
                    .any(|(m, data_id)| m == module_id && self.port_of(data_id, module_id) == Some(port.clone()));
                if !bound {
                    return Err(DagValidationError::UnboundPort {
                        module_id: module_id.clone(),
                        port: port.clone(),
                    });
                }
            }
        }

        for (data_id, module_id) in &self.in_edges {
            self.check_port_type(data_id, module_id, false)?;
        }
        for (module_id, data_id) in &self.out_edges {
            self.check_port_type(data_id, module_id, true)?;
        }

        for name in &self.declared_outputs {
            let data_id = self
                .output_bindings
                .get(name)
                .ok_or_else(|| DagValidationError::UnboundDeclaredOutput { name: name.clone() })?;
            if !self.data.contains_key(data_id) {
                return Err(DagValidationError::UnknownOutputBinding {
                    name: name.clone(),
                    data_id: data_id.clone(),
                });
            }
        }

        Ok(())
    }

    fn port_of(&self, data_id: &str, owner_id: &str) -> Option<String> {
        self.data.get(data_id)?.bindings.get(owner_id).cloned()
    }

    fn check_port_type(
        &self,
        data_id: &str,
        module_id: &str,
        is_output: bool,
    ) -> Result<(), DagValidationError> {
        let data = self.data.get(data_id);
        let module = self.modules.get(module_id);
        let (Some(data), Some(module)) = (data, module) else {
            return Ok(());
        };
        let Some(port) = self.port_of(data_id, module_id) else {
            return Ok(());
        };
        let port_type = if is_output {
            module.produces.get(&port)
        } else {
            module.consumes.get(&port)
        };
        if let Some(port_type) = port_type {
            if *port_type != data.ty {
                return Err(DagValidationError::PortTypeMismatch {
                    data_id: data_id.to_string(),
                    module_id: module_id.to_string(),
                    data_type: data.ty.clone(),
                    port_type: port_type.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_acyclic(&self) -> Result<(), DagValidationError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let mut marks: BTreeMap<&str, Mark> = self
            .modules
            .keys()
            .map(|id| (id.as_str(), Mark::Unvisited))
            .collect();

        fn visit<'a>(
            module_id: &'a str,
            dag: &'a DagSpec,
            marks: &mut BTreeMap<&'a str, Mark>,
        ) -> Result<(), DagValidationError> {
            match marks.get(module_id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::InProgress) => return Err(DagValidationError::Cycle),
                _ => {}
            }
            marks.insert(module_id, Mark::InProgress);
            let downstream_data: Vec<&str> = dag
                .out_edges
                .iter()
                .filter(|(m, _)| m == module_id)
                .map(|(_, d)| d.as_str())
                .collect();
            for data_id in downstream_data {
                let downstream_modules: Vec<&str> = dag
                    .in_edges
                    .iter()
                    .filter(|(d, _)| d == data_id)
                    .map(|(_, m)| m.as_str())
                    .collect();
                for next in downstream_modules {
                    visit(next, dag, marks)?;
                }
            }
            marks.insert(module_id, Mark::Done);
            Ok(())
        }

        let ids: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        for module_id in ids {
            visit(module_id, self, &mut marks)?;
        }
        Ok(())
    }
}

/// A compiled, content-hashed snapshot of a `DagSpec`.
///
/// Deduplicated by `structural_hash` in the `PipelineStore`; `syntactic_hash`
/// is carried opaquely and never participates in that computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineImage {
    pub structural_hash: String,
    pub syntactic_hash: Option<String>,
    pub dag_spec: DagSpec,
    pub module_options: BTreeMap<String, serde_json::Value>,
    pub compiled_at: DateTime<Utc>,
}

impl PipelineImage {
    pub fn component_metadata(&self) -> ComponentMetadata {
        self.dag_spec.metadata.clone()
    }
}
