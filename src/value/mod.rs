//! # Core Type & Value Model
//!
//! `CType` is the closed algebra of types a dataflow module can declare on
//! its ports; `CValue` is its inhabitant. Every `CValue` carries enough of
//! its own type witness to answer `CValue::ctype()` in O(1) — lists and
//! optionals store their element/inner type alongside the data, products
//! and unions store their declared structure.
//!
//! ```rust
//! use constellation_engine::value::{CType, CValue};
//!
//! let val = CValue::CList {
//!     items: vec![CValue::CInt(1), CValue::CInt(2)],
//!     elem_type: CType::CInt,
//! };
//! assert_eq!(val.ctype(), CType::CList(Box::new(CType::CInt)));
//! ```

mod raw;

pub use raw::RawValue;

use std::collections::BTreeMap;
use std::fmt;

/// The closed sum of types a data node or module port can carry.
///
/// Two `CType`s are equal iff structurally equal; field order inside
/// `CProduct`/`CUnion` is immaterial (`BTreeMap` gives us that for free).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CType {
    CInt,
    CFloat,
    CString,
    CBoolean,
    CList(Box<CType>),
    COptional(Box<CType>),
    CProduct(BTreeMap<String, CType>),
    CUnion(BTreeMap<String, CType>),
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CType::CInt => write!(f, "Int"),
            CType::CFloat => write!(f, "Float"),
            CType::CString => write!(f, "String"),
            CType::CBoolean => write!(f, "Boolean"),
            CType::CList(elem) => write!(f, "List[{elem}]"),
            CType::COptional(inner) => write!(f, "Optional[{inner}]"),
            CType::CProduct(fields) => {
                write!(f, "Product{{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                write!(f, "}}")
            }
            CType::CUnion(variants) => {
                write!(f, "Union{{")?;
                for (i, (tag, ty)) in variants.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{tag}: {ty}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// The closed sum of runtime values.
///
/// Invariant: every item of a `CList` has type equal to `elem_type`; every
/// field in a `CProduct` has the type its `structure` declares; the `tag`
/// of a `CUnion` appears among the variants of its `structure`. Constructors
/// that could violate this (`new_list`, `new_product`, `new_union`) check it
/// and return a `TypeMismatch` error instead of panicking.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum CValue {
    CInt(i64),
    CFloat(f64),
    CString(String),
    CBoolean(bool),
    CList {
        items: Vec<CValue>,
        elem_type: CType,
    },
    CSome {
        value: Box<CValue>,
        inner_type: CType,
    },
    CNone {
        inner_type: CType,
    },
    CProduct {
        fields: BTreeMap<String, CValue>,
        structure: BTreeMap<String, CType>,
    },
    CUnion {
        value: Box<CValue>,
        structure: BTreeMap<String, CType>,
        tag: String,
    },
}

/// A value did not match the type it was supposed to inhabit.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TypeMismatch {
    #[error("list element at index {index} has type {actual}, expected {expected}")]
    ListElement {
        index: usize,
        expected: CType,
        actual: CType,
    },
    #[error("product field '{field}' has type {actual}, expected {expected}")]
    ProductField {
        field: String,
        expected: CType,
        actual: CType,
    },
    #[error("product is missing declared field '{field}'")]
    ProductMissingField { field: String },
    #[error("union tag '{tag}' is not among the declared variants")]
    UnknownUnionTag { tag: String },
    #[error("union value has type {actual}, expected {expected} for tag '{tag}'")]
    UnionValue {
        tag: String,
        expected: CType,
        actual: CType,
    },
}

impl CValue {
    /// Compute this value's type. O(1) for scalars and containers (the
    /// witness is stored alongside the data); O(fields) for products/unions
    /// since the declared structure is already a `BTreeMap`.
    pub fn ctype(&self) -> CType {
        match self {
            CValue::CInt(_) => CType::CInt,
            CValue::CFloat(_) => CType::CFloat,
            CValue::CString(_) => CType::CString,
            CValue::CBoolean(_) => CType::CBoolean,
            CValue::CList { elem_type, .. } => CType::CList(Box::new(elem_type.clone())),
            CValue::CSome { inner_type, .. } | CValue::CNone { inner_type } => {
                CType::COptional(Box::new(inner_type.clone()))
            }
            CValue::CProduct { structure, .. } => CType::CProduct(structure.clone()),
            CValue::CUnion { structure, .. } => CType::CUnion(structure.clone()),
        }
    }

    /// Build a `CList`, checking every element matches `elem_type`.
    pub fn new_list(items: Vec<CValue>, elem_type: CType) -> Result<CValue, TypeMismatch> {
        for (index, item) in items.iter().enumerate() {
            let actual = item.ctype();
            if actual != elem_type {
                return Err(TypeMismatch::ListElement {
                    index,
                    expected: elem_type,
                    actual,
                });
            }
        }
        Ok(CValue::CList { items, elem_type })
    }

    /// Build a `CProduct`, checking every declared field is present and
    /// matches its declared type.
    pub fn new_product(
        fields: BTreeMap<String, CValue>,
        structure: BTreeMap<String, CType>,
    ) -> Result<CValue, TypeMismatch> {
        for (name, expected) in &structure {
            match fields.get(name) {
                None => {
                    return Err(TypeMismatch::ProductMissingField {
                        field: name.clone(),
                    })
                }
                Some(value) => {
                    let actual = value.ctype();
                    if actual != *expected {
                        return Err(TypeMismatch::ProductField {
                            field: name.clone(),
                            expected: expected.clone(),
                            actual,
                        });
                    }
                }
            }
        }
        Ok(CValue::CProduct { fields, structure })
    }

    /// Build a `CUnion`, checking the tag is declared and the payload
    /// matches the tag's declared type.
    pub fn new_union(
        value: CValue,
        structure: BTreeMap<String, CType>,
        tag: String,
    ) -> Result<CValue, TypeMismatch> {
        let expected = structure
            .get(&tag)
            .cloned()
            .ok_or_else(|| TypeMismatch::UnknownUnionTag { tag: tag.clone() })?;
        let actual = value.ctype();
        if actual != expected {
            return Err(TypeMismatch::UnionValue {
                tag,
                expected,
                actual,
            });
        }
        Ok(CValue::CUnion {
            value: Box::new(value),
            structure,
            tag,
        })
    }
}
