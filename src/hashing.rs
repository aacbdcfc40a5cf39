//! Deterministic structural hashing of a [`DagSpec`].
//!
//! Two DAGs that differ only in collection iteration order or insertion
//! order must hash identically: every collection is walked in an explicit,
//! sorted order before any bytes reach the digest. No `HashMap` (whose
//! iteration order is unspecified) appears on the hashing path.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::dag::DagSpec;
use crate::value::CType;

const TAG_MODULE: &[u8] = b"module\0";
const TAG_DATA: &[u8] = b"data\0";
const TAG_EDGE_IN: &[u8] = b"in_edge\0";
const TAG_EDGE_OUT: &[u8] = b"out_edge\0";
const TAG_OUTPUT: &[u8] = b"output\0";

const TY_INT: &[u8] = b"Int";
const TY_FLOAT: &[u8] = b"Float";
const TY_STRING: &[u8] = b"String";
const TY_BOOL: &[u8] = b"Boolean";
const TY_LIST: &[u8] = b"List";
const TY_OPTIONAL: &[u8] = b"Optional";
const TY_PRODUCT: &[u8] = b"Product";
const TY_UNION: &[u8] = b"Union";

fn hash_type(ty: &CType, out: &mut Sha256) {
    match ty {
        CType::CInt => out.update(TY_INT),
        CType::CFloat => out.update(TY_FLOAT),
        CType::CString => out.update(TY_STRING),
        CType::CBoolean => out.update(TY_BOOL),
        CType::CList(elem) => {
            out.update(TY_LIST);
            hash_type(elem, out);
        }
        CType::COptional(inner) => {
            out.update(TY_OPTIONAL);
            hash_type(inner, out);
        }
        CType::CProduct(fields) => {
            out.update(TY_PRODUCT);
            hash_sorted_field_map(fields, out);
        }
        CType::CUnion(variants) => {
            out.update(TY_UNION);
            hash_sorted_field_map(variants, out);
        }
    }
}

// `CType`'s own maps are already `BTreeMap`, so field order is already
// alphabetical; this just walks them explicitly rather than relying on it.
fn hash_sorted_field_map(fields: &BTreeMap<String, CType>, out: &mut Sha256) {
    out.update((fields.len() as u64).to_le_bytes());
    for (name, ty) in fields {
        out.update((name.len() as u64).to_le_bytes());
        out.update(name.as_bytes());
        hash_type(ty, out);
    }
}

/// Computes a deterministic structural hash of `dag`, stable across
/// insertion order in every collection `DagSpec` holds.
///
/// Returns a lowercase hex string.
pub fn compute_structural_hash(dag: &DagSpec) -> String {
    let mut h = Sha256::new();

    // `DagSpec`'s maps and sets are `BTreeMap`/`BTreeSet`, so iterating them
    // already yields id order; we hash explicitly tagged, length-prefixed
    // fields regardless so the format doesn't depend on that guarantee.
    for (module_id, module) in &dag.modules {
        h.update(TAG_MODULE);
        h.update((module_id.len() as u64).to_le_bytes());
        h.update(module_id.as_bytes());
        hash_sorted_field_map(&module.consumes, &mut h);
        hash_sorted_field_map(&module.produces, &mut h);
    }

    for (data_id, data) in &dag.data {
        h.update(TAG_DATA);
        h.update((data_id.len() as u64).to_le_bytes());
        h.update(data_id.as_bytes());
        h.update((data.name.len() as u64).to_le_bytes());
        h.update(data.name.as_bytes());
        hash_type(&data.ty, &mut h);
    }

    for (data_id, module_id) in &dag.in_edges {
        h.update(TAG_EDGE_IN);
        h.update((data_id.len() as u64).to_le_bytes());
        h.update(data_id.as_bytes());
        h.update((module_id.len() as u64).to_le_bytes());
        h.update(module_id.as_bytes());
    }

    for (module_id, data_id) in &dag.out_edges {
        h.update(TAG_EDGE_OUT);
        h.update((module_id.len() as u64).to_le_bytes());
        h.update(module_id.as_bytes());
        h.update((data_id.len() as u64).to_le_bytes());
        h.update(data_id.as_bytes());
    }

    let mut declared_outputs: Vec<&str> = dag.declared_outputs.iter().map(String::as_str).collect();
    declared_outputs.sort_unstable();
    for name in declared_outputs {
        h.update(TAG_OUTPUT);
        h.update((name.len() as u64).to_le_bytes());
        h.update(name.as_bytes());
        if let Some(data_id) = dag.output_bindings.get(name) {
            h.update((data_id.len() as u64).to_le_bytes());
            h.update(data_id.as_bytes());
        }
    }

    hex_encode(&h.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        s.push_str(&format!("{byte:02x}"));
    }
    s
}
