//! DAG registry (name → `DagSpec`) and content-addressed pipeline store
//! (`structuralHash` → `PipelineImage`, with name aliases and a syntactic
//! index).

use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::sync::Arc;

use crate::dag::{ComponentMetadata, DagSpec, PipelineImage};

/// Registry of named DAGs, process-wide and concurrent.
#[derive(Default)]
pub struct DagRegistry {
    dags: DashMap<String, DagSpec>,
}

impl DagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites any existing DAG registered under `name`.
    pub fn register(&self, name: impl Into<String>, dag: DagSpec) {
        self.dags.insert(name.into(), dag);
    }

    /// `_version` is accepted but ignored under the current contract.
    pub fn retrieve(&self, name: &str, _version: Option<&str>) -> Option<DagSpec> {
        self.dags.get(name).map(|e| e.clone())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.dags.contains_key(name)
    }

    pub fn list(&self) -> std::collections::BTreeMap<String, ComponentMetadata> {
        self.dags
            .iter()
            .map(|e| (e.key().clone(), e.value().metadata.clone()))
            .collect()
    }
}

/// Content-addressed image store: `store` is idempotent on
/// `structural_hash`; `alias` binds human names to a hash; a syntactic index
/// maps `(source_hash, registration_hash)` pairs to the structural hash they
/// produced, kept orthogonal to `structural_hash` itself.
#[derive(Default)]
pub struct PipelineStore {
    images: DashMap<String, PipelineImage>,
    aliases: DashMap<String, ArcSwap<String>>,
    syntactic_index: DashMap<(String, String), String>,
}

impl PipelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent on `structural_hash`: storing the same image twice leaves
    /// `list_images().len()` unchanged.
    pub fn store(&self, image: PipelineImage) -> String {
        let hash = image.structural_hash.clone();
        self.images.entry(hash.clone()).or_insert(image);
        hash
    }

    pub fn get(&self, hash: &str) -> Option<PipelineImage> {
        self.images.get(hash).map(|e| e.clone())
    }

    pub fn list_images(&self) -> Vec<PipelineImage> {
        self.images.iter().map(|e| e.value().clone()).collect()
    }

    /// Sets or rewrites a name → hash pointer.
    pub fn alias(&self, name: impl Into<String>, hash: impl Into<String>) {
        let name = name.into();
        let hash = Arc::new(hash.into());
        match self.aliases.get(&name) {
            Some(existing) => existing.store(hash),
            None => {
                self.aliases.insert(name, ArcSwap::new(hash));
            }
        }
    }

    pub fn resolve(&self, name: &str) -> Option<String> {
        self.aliases.get(name).map(|e| (**e.load()).clone())
    }

    pub fn get_by_name(&self, name: &str) -> Option<PipelineImage> {
        let hash = self.resolve(name)?;
        self.get(&hash)
    }

    /// Returns true iff an image was actually removed.
    pub fn remove(&self, hash: &str) -> bool {
        self.images.remove(hash).is_some()
    }

    pub fn index_syntactic(&self, source_hash: impl Into<String>, registration_hash: impl Into<String>, structural_hash: impl Into<String>) {
        self.syntactic_index
            .insert((source_hash.into(), registration_hash.into()), structural_hash.into());
    }

    pub fn lookup_syntactic(&self, source_hash: &str, registration_hash: &str) -> Option<String> {
        self.syntactic_index
            .get(&(source_hash.to_string(), registration_hash.to_string()))
            .map(|e| e.clone())
    }
}
