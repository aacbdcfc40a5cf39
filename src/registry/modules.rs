//! Name-indexed store of uninitialized modules, with prefix-stripping alias
//! lookup for dot-separated names.

use dashmap::DashMap;

use crate::dag::DagSpec;
use crate::module::{InitializedModule, UninitializedModule};

/// Process-wide, concurrent registry of module factories keyed by
/// registered name. Last write wins on re-registration.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: DashMap<String, UninitializedModule>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, module: UninitializedModule) {
        self.modules.insert(name.into(), module);
    }

    /// Exact match always beats prefix-stripped match. If `name` contains a
    /// `.`, and no exact match exists, the last dot-separated segment is
    /// tried as an alias.
    pub fn get(&self, name: &str) -> Option<UninitializedModule> {
        if let Some(entry) = self.modules.get(name) {
            return Some(entry.clone());
        }
        if let Some(idx) = name.rfind('.') {
            let alias = &name[idx + 1..];
            return self.modules.get(alias).map(|e| e.clone());
        }
        None
    }

    /// Initializes every module in `dag` whose `metadata.name` resolves
    /// under `get`'s rules. Module ids that don't resolve are omitted — the
    /// scheduler rejects them at run time rather than this failing compile.
    pub fn init_modules(&self, dag: &DagSpec) -> std::collections::BTreeMap<String, InitializedModule> {
        let mut out = std::collections::BTreeMap::new();
        for (module_id, spec) in &dag.modules {
            if let Some(uninitialized) = self.get(&spec.metadata.name) {
                if let Ok(initialized) = uninitialized.init(module_id, dag) {
                    out.insert(module_id.clone(), initialized);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::ComponentMetadata;
    use crate::error::ConstellationError;
    use crate::value::{CType, CValue};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    struct Noop;
    impl crate::module::ModuleBody for Noop {
        fn call(&self, _inputs: &BTreeMap<String, CValue>) -> Result<BTreeMap<String, CValue>, ConstellationError> {
            Ok(BTreeMap::new())
        }
    }

    fn sample_module() -> UninitializedModule {
        UninitializedModule::new(
            ComponentMetadata::new("my.pkg.Uppercase"),
            BTreeMap::new(),
            BTreeMap::new(),
            Arc::new(Noop),
        )
    }

    #[test]
    fn exact_match_wins_over_alias() {
        let registry = ModuleRegistry::new();
        registry.register("my.pkg.Uppercase", sample_module());
        registry.register("Uppercase", {
            let mut m = sample_module();
            m.metadata = ComponentMetadata::new("Uppercase-direct");
            m
        });
        let found = registry.get("Uppercase").unwrap();
        assert_eq!(found.metadata.name, "Uppercase-direct");
    }

    #[test]
    fn dotted_name_falls_back_to_last_segment() {
        let registry = ModuleRegistry::new();
        registry.register("Uppercase", sample_module());
        let found = registry.get("my.pkg.Uppercase").unwrap();
        assert_eq!(found.metadata.name, "my.pkg.Uppercase");
    }

    #[test]
    fn unregistered_name_is_none() {
        let registry = ModuleRegistry::new();
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn last_write_wins() {
        let registry = ModuleRegistry::new();
        registry.register("X", sample_module());
        registry.register("X", {
            let mut m = sample_module();
            m.metadata = ComponentMetadata::new("second");
            m
        });
        assert_eq!(registry.get("X").unwrap().metadata.name, "second");
    }
}
