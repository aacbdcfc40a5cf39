//! Reconstructs `branch-*` modules purely from their `ModuleNodeSpec`
//! signature — no user-supplied body is ever registered for these; the
//! engine derives the conditional-select behavior from the port names
//! alone.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::dag::{DagSpec, ModuleNodeSpec};
use crate::error::ConstellationError;
use crate::module::{ModuleBody, UninitializedModule};
use crate::value::{CType, CValue};

/// Matches `ModuleNodeSpec.metadata.name` the way the spec does: a
/// case-sensitive substring match for `"branch"`.
pub fn is_branch_module(spec: &ModuleNodeSpec) -> bool {
    spec.metadata.name.contains("branch")
}

/// Number of `(condK, exprK)` pairs inferred from the `consumes` map.
fn case_count(consumes: &BTreeMap<String, CType>) -> usize {
    (0..)
        .take_while(|i| consumes.contains_key(&format!("cond{i}")))
        .count()
}

struct BranchBody {
    case_count: usize,
    out_type: CType,
}

impl ModuleBody for BranchBody {
    fn call(&self, inputs: &BTreeMap<String, CValue>) -> Result<BTreeMap<String, CValue>, ConstellationError> {
        for i in 0..self.case_count {
            let cond_key = format!("cond{i}");
            let expr_key = format!("expr{i}");
            let cond = inputs.get(&cond_key).ok_or_else(|| ConstellationError::UnknownNodeError {
                name: cond_key.clone(),
            })?;
            if matches!(cond, CValue::CBoolean(true)) {
                let expr = inputs.get(&expr_key).ok_or_else(|| ConstellationError::UnknownNodeError {
                    name: expr_key.clone(),
                })?;
                return Ok(coerced_output(expr, &self.out_type));
            }
        }
        let otherwise = inputs
            .get("otherwise")
            .ok_or_else(|| ConstellationError::UnknownNodeError {
                name: "otherwise".to_string(),
            })?;
        Ok(coerced_output(otherwise, &self.out_type))
    }
}

fn coerced_output(value: &CValue, out_type: &CType) -> BTreeMap<String, CValue> {
    let mut out = BTreeMap::new();
    let coerced = coerce(value, out_type);
    out.insert("out".to_string(), coerced);
    out
}

/// Coerces `value` to `ty` when it doesn't already match: currently the
/// only coercion needed is "stringify anything for a `CString` output",
/// matching `produces.out` defaulting to `CString` when absent.
fn coerce(value: &CValue, ty: &CType) -> CValue {
    if &value.ctype() == ty {
        return value.clone();
    }
    if *ty == CType::CString {
        return CValue::CString(display_value(value));
    }
    value.clone()
}

fn display_value(value: &CValue) -> String {
    match value {
        CValue::CInt(i) => i.to_string(),
        CValue::CFloat(f) => f.to_string(),
        CValue::CString(s) => s.clone(),
        CValue::CBoolean(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Builds the uninitialized factory for a single branch `ModuleNodeSpec`.
pub fn build_branch_module(spec: &ModuleNodeSpec) -> UninitializedModule {
    let case_count = case_count(&spec.consumes);
    let out_type = spec.produces.get("out").cloned().unwrap_or(CType::CString);
    let body = Arc::new(BranchBody {
        case_count,
        out_type: out_type.clone(),
    });
    UninitializedModule::new(
        spec.metadata.clone(),
        spec.consumes.clone(),
        BTreeMap::from([("out".to_string(), out_type)]),
        body,
    )
}

/// Reconstructs every branch module in `dag`, keyed by module id.
pub fn synthesize_branch_modules(dag: &DagSpec) -> BTreeMap<String, UninitializedModule> {
    dag.modules
        .iter()
        .filter(|(_, spec)| is_branch_module(spec))
        .map(|(id, spec)| (id.clone(), build_branch_module(spec)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::ComponentMetadata;

    fn branch_spec() -> ModuleNodeSpec {
        ModuleNodeSpec {
            metadata: ComponentMetadata::new("branch-select"),
            consumes: BTreeMap::from([
                ("cond0".to_string(), CType::CBoolean),
                ("expr0".to_string(), CType::CInt),
                ("cond1".to_string(), CType::CBoolean),
                ("expr1".to_string(), CType::CInt),
                ("otherwise".to_string(), CType::CInt),
            ]),
            produces: BTreeMap::from([("out".to_string(), CType::CInt)]),
        }
    }

    #[test]
    fn detects_branch_by_substring() {
        assert!(is_branch_module(&branch_spec()));
        let mut not_branch = branch_spec();
        not_branch.metadata.name = "Uppercase".to_string();
        assert!(!is_branch_module(&not_branch));
    }

    #[test]
    fn infers_case_count_from_consumes() {
        assert_eq!(case_count(&branch_spec().consumes), 2);
    }

    #[test]
    fn selects_first_true_condition() {
        let module = build_branch_module(&branch_spec());

        // Exercise the body directly, bypassing DAG wiring.
        let mut inputs = BTreeMap::new();
        inputs.insert("cond0".to_string(), CValue::CBoolean(false));
        inputs.insert("expr0".to_string(), CValue::CInt(10));
        inputs.insert("cond1".to_string(), CValue::CBoolean(true));
        inputs.insert("expr1".to_string(), CValue::CInt(20));
        inputs.insert("otherwise".to_string(), CValue::CInt(30));
        let outputs = module.body.call(&inputs).unwrap();
        assert_eq!(outputs.get("out"), Some(&CValue::CInt(20)));
    }

    #[test]
    fn falls_back_to_otherwise() {
        let module = build_branch_module(&branch_spec());
        let mut inputs = BTreeMap::new();
        inputs.insert("cond0".to_string(), CValue::CBoolean(false));
        inputs.insert("expr0".to_string(), CValue::CInt(10));
        inputs.insert("cond1".to_string(), CValue::CBoolean(false));
        inputs.insert("expr1".to_string(), CValue::CInt(20));
        inputs.insert("otherwise".to_string(), CValue::CInt(30));
        let outputs = module.body.call(&inputs).unwrap();
        assert_eq!(outputs.get("out"), Some(&CValue::CInt(30)));
    }

    #[test]
    fn defaults_output_type_to_cstring_when_missing() {
        let mut spec = branch_spec();
        spec.produces.clear();
        let module = build_branch_module(&spec);
        assert_eq!(module.produces.get("out"), Some(&CType::CString));
    }
}
