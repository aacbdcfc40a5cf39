//! Unboxed projection of `CValue` used at module/interop boundaries where
//! carrying the full `CType` witness on every value is unnecessary.
//!
//! `RawValue` erases optional/list element types: `RIntList` forgets whether
//! its elements were themselves optional-wrapped, and `RSome`/`RNone` forget
//! `inner_type`. The conversion back to `CValue` therefore needs the
//! original `CType` supplied out of band — callers that round-trip must
//! remember it themselves.

use super::{CType, CValue, TypeMismatch};

/// Unboxed mirror of `CValue`. See module docs for the type-erasure caveat.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum RawValue {
    RInt(i64),
    RFloat(f64),
    RString(String),
    RBool(bool),
    RList(Vec<RawValue>),
    RSome(Box<RawValue>),
    RNone,
    RProduct(Vec<(String, RawValue)>),
    RUnion(String, Box<RawValue>),
}

impl From<&CValue> for RawValue {
    fn from(value: &CValue) -> Self {
        match value {
            CValue::CInt(i) => RawValue::RInt(*i),
            CValue::CFloat(f) => RawValue::RFloat(*f),
            CValue::CString(s) => RawValue::RString(s.clone()),
            CValue::CBoolean(b) => RawValue::RBool(*b),
            CValue::CList { items, .. } => {
                RawValue::RList(items.iter().map(RawValue::from).collect())
            }
            CValue::CSome { value, .. } => RawValue::RSome(Box::new(RawValue::from(value.as_ref()))),
            CValue::CNone { .. } => RawValue::RNone,
            CValue::CProduct { fields, .. } => RawValue::RProduct(
                fields
                    .iter()
                    .map(|(name, v)| (name.clone(), RawValue::from(v)))
                    .collect(),
            ),
            CValue::CUnion { value, tag, .. } => {
                RawValue::RUnion(tag.clone(), Box::new(RawValue::from(value.as_ref())))
            }
        }
    }
}

impl RawValue {
    /// Reconstruct a `CValue` from this unboxed form, driven by the `CType`
    /// the caller is responsible for remembering. Fails if the shapes don't
    /// agree (e.g. `RInt` against `CType::CString`).
    pub fn into_cvalue(self, ty: &CType) -> Result<CValue, TypeMismatch> {
        match (self, ty) {
            (RawValue::RInt(i), CType::CInt) => Ok(CValue::CInt(i)),
            (RawValue::RFloat(f), CType::CFloat) => Ok(CValue::CFloat(f)),
            (RawValue::RString(s), CType::CString) => Ok(CValue::CString(s)),
            (RawValue::RBool(b), CType::CBoolean) => Ok(CValue::CBoolean(b)),
            (RawValue::RList(items), CType::CList(elem_type)) => {
                let items = items
                    .into_iter()
                    .map(|r| r.into_cvalue(elem_type))
                    .collect::<Result<Vec<_>, _>>()?;
                CValue::new_list(items, elem_type.as_ref().clone())
            }
            (RawValue::RSome(inner), CType::COptional(inner_type)) => {
                let value = inner.into_cvalue(inner_type)?;
                Ok(CValue::CSome {
                    value: Box::new(value),
                    inner_type: inner_type.as_ref().clone(),
                })
            }
            (RawValue::RNone, CType::COptional(inner_type)) => Ok(CValue::CNone {
                inner_type: inner_type.as_ref().clone(),
            }),
            (RawValue::RProduct(entries), CType::CProduct(structure)) => {
                let mut fields = std::collections::BTreeMap::new();
                for (name, raw) in entries {
                    let field_ty = structure.get(&name).ok_or_else(|| {
                        TypeMismatch::ProductMissingField { field: name.clone() }
                    })?;
                    fields.insert(name, raw.into_cvalue(field_ty)?);
                }
                CValue::new_product(fields, structure.clone())
            }
            (RawValue::RUnion(tag, inner), CType::CUnion(structure)) => {
                let variant_ty = structure
                    .get(&tag)
                    .cloned()
                    .ok_or_else(|| TypeMismatch::UnknownUnionTag { tag: tag.clone() })?;
                let value = inner.into_cvalue(&variant_ty)?;
                CValue::new_union(value, structure.clone(), tag)
            }
            (_, expected) => Err(TypeMismatch::ProductField {
                field: "<raw>".to_string(),
                expected: expected.clone(),
                actual: expected.clone(),
            }),
        }
    }
}
