//! # Constellation
//!
//! A typed dataflow execution engine: register module bodies and DAG
//! specifications, compile a DAG into a content-addressed `PipelineImage`,
//! then run it against a set of named inputs to get back a `DataSignature`.
//!
//! ## Pipeline
//!
//! ```text
//! UninitializedModule ──┐
//!                       ├─ ModuleRegistry ─┐
//! DagSpec ──────────────┴─ DagRegistry ────┼─ compile() ─ PipelineImage
//!                                          │                  │
//!                                          └─ synthetic::*    │ run()
//!                                                             ▼
//!                                          scheduler::execute ─ DataSignature
//! ```
//!
//! `value` defines the closed `CType`/`CValue` algebra every port and data
//! node is typed over; `json` adaptively converts between that algebra and
//! wire JSON; `hashing` gives every `DagSpec` a canonical, permutation-
//! invariant content hash; `runtime` holds one execution's state (module
//! statuses plus the single-assignment data table); `scheduler` drives
//! modules to completion as their inputs become ready; `suspend`/`resume`
//! let an incomplete execution be captured and continued later;
//! `backends` are the pluggable, fire-and-forget instrumentation sinks;
//! `signature` assembles the final result; `facade` is the one type a host
//! application talks to.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use constellation_engine::facade::Constellation;
//! use constellation_engine::dag::{ComponentMetadata, DagSpec};
//! use constellation_engine::value::CValue;
//! use std::collections::BTreeMap;
//!
//! # async fn run() -> Result<(), constellation_engine::error::ConstellationError> {
//! let engine = Constellation::builder().build();
//! // engine.set_module(...); engine.set_dag("demo", DagSpec::new(ComponentMetadata::new("demo")));
//! let image = engine.compile("demo")?;
//! let signature = engine.run(&image, BTreeMap::new(), None).await?;
//! println!("complete: {}", signature.is_complete());
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod dag;
pub mod error;
pub mod execution;
pub mod facade;
pub mod hashing;
pub mod json;
pub mod module;
pub mod registry;
pub mod resume;
pub mod runtime;
pub mod scheduler;
pub mod signature;
pub mod suspend;
pub mod synthetic;
pub mod value;

pub use config::EngineConfig;
pub use error::ConstellationError;
pub use facade::{Constellation, ConstellationBuilder};
