//! Resume's input-merging contract: re-providing an identical value is
//! idempotent, a differing value is rejected, and unknown names/nodes are
//! rejected before the scheduler ever runs again.

use std::collections::BTreeMap;
use std::sync::Arc;

use constellation_engine::dag::{ComponentMetadata, DagSpec, DataNodeSpec, ModuleNodeSpec};
use constellation_engine::error::ConstellationError;
use constellation_engine::facade::Constellation;
use constellation_engine::module::{ModuleBody, UninitializedModule};
use constellation_engine::suspend::SuspensionStore;
use constellation_engine::value::{CType, CValue};

struct Concat;
impl ModuleBody for Concat {
    fn call(&self, inputs: &BTreeMap<String, CValue>) -> Result<BTreeMap<String, CValue>, ConstellationError> {
        let CValue::CString(text) = inputs.get("text").unwrap() else { unreachable!() };
        let CValue::CString(suffix) = inputs.get("suffix").unwrap() else { unreachable!() };
        Ok(BTreeMap::from([("result".to_string(), CValue::CString(format!("{text}{suffix}")))]))
    }
}

fn greeting_dag() -> DagSpec {
    let mut dag = DagSpec::new(ComponentMetadata::new("greeting"));
    dag.modules.insert(
        "m1".to_string(),
        ModuleNodeSpec {
            metadata: ComponentMetadata::new("Concat"),
            consumes: BTreeMap::from([
                ("text".to_string(), CType::CString),
                ("suffix".to_string(), CType::CString),
            ]),
            produces: BTreeMap::from([("result".to_string(), CType::CString)]),
        },
    );
    for (id, name) in [("d_text", "text"), ("d_suffix", "suffix")] {
        dag.data.insert(
            id.to_string(),
            DataNodeSpec {
                name: name.to_string(),
                bindings: BTreeMap::from([("m1".to_string(), name.to_string())]),
                ty: CType::CString,
            },
        );
        dag.in_edges.insert((id.to_string(), "m1".to_string()));
    }
    dag.data.insert(
        "d_result".to_string(),
        DataNodeSpec {
            name: "result".to_string(),
            bindings: BTreeMap::from([("m1".to_string(), "result".to_string())]),
            ty: CType::CString,
        },
    );
    dag.out_edges.insert(("m1".to_string(), "d_result".to_string()));
    dag.declared_outputs.push("result".to_string());
    dag.output_bindings.insert("result".to_string(), "d_result".to_string());
    dag
}

async fn suspend_greeting(engine: &Constellation) -> uuid::Uuid {
    let image = engine.compile("greeting").unwrap();
    let inputs = BTreeMap::from([("text".to_string(), CValue::CString("hello".to_string()))]);
    let suspended = engine.run(&image, inputs, None).await.unwrap();
    assert!(!suspended.is_complete());
    engine.list_suspensions().into_iter().find(|s| s.dag_name == "greeting").unwrap().handle
}

fn build_engine() -> Constellation {
    let engine = Constellation::builder().with_suspension_store(Arc::new(SuspensionStore::new())).build();
    engine.set_module(UninitializedModule::new(
        ComponentMetadata::new("Concat"),
        BTreeMap::from([
            ("text".to_string(), CType::CString),
            ("suffix".to_string(), CType::CString),
        ]),
        BTreeMap::from([("result".to_string(), CType::CString)]),
        Arc::new(Concat),
    ));
    engine.set_dag("greeting", greeting_dag());
    engine
}

#[tokio::test]
async fn unknown_input_name_is_rejected() {
    let engine = build_engine();
    let handle = suspend_greeting(&engine).await;

    let err = engine
        .resume_from_store(
            handle,
            Some(BTreeMap::from([("nonexistent".to_string(), CValue::CString("x".to_string()))])),
            None,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ConstellationError::UnknownNodeError { .. }));
}

#[tokio::test]
async fn conflicting_resubmission_of_an_already_provided_input_is_rejected() {
    let engine = build_engine();
    let handle = suspend_greeting(&engine).await;

    let err = engine
        .resume_from_store(
            handle,
            Some(BTreeMap::from([("text".to_string(), CValue::CString("goodbye".to_string()))])),
            None,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ConstellationError::InputAlreadyProvidedError { .. }));
}

#[tokio::test]
async fn type_mismatched_input_is_rejected() {
    let engine = build_engine();
    let handle = suspend_greeting(&engine).await;

    let err = engine
        .resume_from_store(handle, Some(BTreeMap::from([("suffix".to_string(), CValue::CInt(1))])), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ConstellationError::InputTypeMismatchError { .. }));
}

#[tokio::test]
async fn resuming_an_unknown_handle_fails_not_found() {
    let engine = build_engine();
    let err = engine.resume_from_store(uuid::Uuid::new_v4(), None, None, None).await.unwrap_err();
    assert!(matches!(err, ConstellationError::NotFoundError(_)));
}
