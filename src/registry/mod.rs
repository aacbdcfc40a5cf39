//! Process-wide registries: modules by name, DAGs by name, pipeline images
//! by content hash.

pub mod modules;
pub mod pipelines;

pub use modules::ModuleRegistry;
pub use pipelines::{DagRegistry, PipelineStore};
