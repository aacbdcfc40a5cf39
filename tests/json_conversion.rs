//! Exercises the adaptive JSON converter and streaming limits through the
//! public `json` module API.

use std::collections::BTreeMap;

use constellation_engine::json::streaming::{self, StreamingError, StreamingLimits};
use constellation_engine::json::{AdaptiveConverter, Strategy};
use constellation_engine::value::{CType, CValue};

#[test]
fn adaptive_converter_picks_strategy_by_custom_thresholds() {
    let converter = AdaptiveConverter::new(10, 100, StreamingLimits::default());

    let small = converter.convert(b"1", &CType::CInt, None).unwrap();
    assert_eq!(small, CValue::CInt(1));
    assert_eq!(converter.last_strategy(), Strategy::Eager);

    let medium = converter.convert(br#""0123456789012345""#, &CType::CString, None).unwrap();
    assert_eq!(medium, CValue::CString("0123456789012345".to_string()));
    assert_eq!(converter.last_strategy(), Strategy::Lazy);

    let huge_hint = converter.convert(b"1", &CType::CInt, Some(10_000)).unwrap();
    assert_eq!(huge_hint, CValue::CInt(1));
    assert_eq!(converter.last_strategy(), Strategy::Streaming);
}

#[test]
fn streaming_tolerates_unknown_product_fields() {
    let mut structure = BTreeMap::new();
    structure.insert("id".to_string(), CType::CInt);
    let ty = CType::CProduct(structure.clone());

    let result = streaming::convert(
        br#"{"id":1,"extra_field_the_schema_does_not_know_about":"ignored"}"#,
        &ty,
        &StreamingLimits::default(),
    )
    .unwrap();

    match result {
        CValue::CProduct { fields, .. } => assert_eq!(fields.get("id"), Some(&CValue::CInt(1))),
        _ => panic!("expected product"),
    }
}

#[test]
fn streaming_union_requires_tag_before_value() {
    let mut structure = BTreeMap::new();
    structure.insert("Ok".to_string(), CType::CInt);
    structure.insert("Err".to_string(), CType::CString);
    let ty = CType::CUnion(structure);

    let err = streaming::convert(br#"{"value":1,"tag":"Ok"}"#, &ty, &StreamingLimits::default()).unwrap_err();
    assert_eq!(err, StreamingError::ValueMustComeAfterTag);
}

#[test]
fn three_strategies_agree_on_a_nested_shape() {
    let ty = CType::CList(Box::new(CType::COptional(Box::new(CType::CInt))));
    let input = b"[1,null,3]";

    let converter = AdaptiveConverter::new(1_000_000, 2_000_000, StreamingLimits::default());
    let via_eager = converter.convert(input, &ty, Some(1)).unwrap();
    let via_streaming = streaming::convert(input, &ty, &StreamingLimits::default()).unwrap();
    assert_eq!(via_eager, via_streaming);
}
