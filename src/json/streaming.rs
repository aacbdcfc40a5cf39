//! Single-pass, limit-enforcing JSON→`CValue` converter.
//!
//! Unlike the eager/lazy paths (`src/json/mod.rs`), this walks the input
//! byte-by-byte against the target `CType` without ever materialising a
//! generic `serde_json::Value` tree, so a hostile payload's memory cost is
//! bounded by the limits below rather than by the payload itself.
//!
//! The cursor borrows its input and holds no other resource, so "release
//! guaranteed on every exit path" is automatic — a failed parse simply drops
//! the cursor; there is no accumulator that survives an `Err` return.

use std::collections::BTreeMap;

use crate::value::{CType, CValue};

/// Required-positive limits for the streaming converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamingLimits {
    pub max_payload_size: usize,
    pub max_array_elements: usize,
    pub max_nesting_depth: usize,
}

impl StreamingLimits {
    pub fn new(
        max_payload_size: usize,
        max_array_elements: usize,
        max_nesting_depth: usize,
    ) -> Result<Self, StreamingError> {
        if max_payload_size == 0 || max_array_elements == 0 || max_nesting_depth == 0 {
            return Err(StreamingError::DomainError(
                "StreamingLimits fields must all be > 0".to_string(),
            ));
        }
        Ok(Self {
            max_payload_size,
            max_array_elements,
            max_nesting_depth,
        })
    }
}

impl Default for StreamingLimits {
    fn default() -> Self {
        Self {
            max_payload_size: 100 * 1024 * 1024,
            max_array_elements: 1_000_000,
            max_nesting_depth: 50,
        }
    }
}

/// Errors the streaming converter can return. `Display` text for the
/// limit-violation variants matches the contract exactly: callers that
/// pattern-match on message text (tests, logs) see "Payload too large",
/// "Array element limit exceeded", "Nesting depth limit exceeded".
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StreamingError {
    #[error("Payload too large")]
    PayloadTooLarge,
    #[error("Array element limit exceeded")]
    ArrayElementLimitExceeded,
    #[error("Nesting depth limit exceeded")]
    NestingDepthLimitExceeded,
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingRequiredFields(Vec<String>),
    #[error("'value' must come after 'tag'")]
    ValueMustComeAfterTag,
    #[error("union object missing 'tag'")]
    MissingTag,
    #[error("Unknown union tag: {0}")]
    UnknownUnionTag(String),
    #[error("union object missing 'value'")]
    MissingValue,
    #[error("unexpected token at byte {0}: {1}")]
    UnexpectedToken(usize, String),
    #[error("invalid number at byte {0}")]
    InvalidNumber(usize),
    #[error("invalid UTF-8 in input")]
    InvalidUtf8,
    #[error("{0}")]
    DomainError(String),
}

/// Parses `input` as JSON against `ty`, enforcing `limits` throughout.
pub fn convert(input: &[u8], ty: &CType, limits: &StreamingLimits) -> Result<CValue, StreamingError> {
    if input.len() > limits.max_payload_size {
        return Err(StreamingError::PayloadTooLarge);
    }
    let text = std::str::from_utf8(input).map_err(|_| StreamingError::InvalidUtf8)?;
    let mut cursor = Cursor {
        bytes: text.as_bytes(),
        pos: 0,
        limits,
        array_elements_seen: 0,
    };
    cursor.skip_ws();
    let value = cursor.parse_value(ty, 0)?;
    cursor.skip_ws();
    Ok(value)
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    limits: &'a StreamingLimits,
    array_elements_seen: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), StreamingError> {
        self.skip_ws();
        if self.bump() == Some(byte) {
            Ok(())
        } else {
            Err(StreamingError::UnexpectedToken(
                self.pos,
                format!("expected '{}'", byte as char),
            ))
        }
    }

    fn expect_literal(&mut self, lit: &str) -> Result<(), StreamingError> {
        for b in lit.bytes() {
            if self.bump() != Some(b) {
                return Err(StreamingError::UnexpectedToken(
                    self.pos,
                    format!("expected literal '{lit}'"),
                ));
            }
        }
        Ok(())
    }

    fn check_depth(&self, depth: usize) -> Result<(), StreamingError> {
        if depth > self.limits.max_nesting_depth {
            Err(StreamingError::NestingDepthLimitExceeded)
        } else {
            Ok(())
        }
    }

    fn count_array_element(&mut self) -> Result<(), StreamingError> {
        self.array_elements_seen += 1;
        if self.array_elements_seen > self.limits.max_array_elements {
            Err(StreamingError::ArrayElementLimitExceeded)
        } else {
            Ok(())
        }
    }

    fn parse_string_raw(&mut self) -> Result<String, StreamingError> {
        self.skip_ws();
        self.expect(b'"')?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(StreamingError::UnexpectedToken(
                        self.pos,
                        "unterminated string".to_string(),
                    ))
                }
                Some(b'"') => return Ok(out),
                Some(b'\\') => match self.bump() {
                    Some(b'"') => out.push('"'),
                    Some(b'\\') => out.push('\\'),
                    Some(b'/') => out.push('/'),
                    Some(b'n') => out.push('\n'),
                    Some(b't') => out.push('\t'),
                    Some(b'r') => out.push('\r'),
                    Some(b'b') => out.push('\u{8}'),
                    Some(b'f') => out.push('\u{c}'),
                    Some(b'u') => {
                        let mut code = 0u32;
                        for _ in 0..4 {
                            let hex = self.bump().ok_or_else(|| {
                                StreamingError::UnexpectedToken(
                                    self.pos,
                                    "truncated unicode escape".to_string(),
                                )
                            })?;
                            let digit = (hex as char).to_digit(16).ok_or_else(|| {
                                StreamingError::UnexpectedToken(
                                    self.pos,
                                    "invalid unicode escape".to_string(),
                                )
                            })?;
                            code = code * 16 + digit;
                        }
                        out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                    }
                    _ => {
                        return Err(StreamingError::UnexpectedToken(
                            self.pos,
                            "invalid escape sequence".to_string(),
                        ))
                    }
                },
                Some(b) => {
                    // Safe: source text is valid UTF-8 and we only split on
                    // ASCII control bytes above.
                    out.push(b as char);
                }
            }
        }
    }

    fn parse_number_raw(&mut self) -> Result<String, StreamingError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        if self.pos == start {
            return Err(StreamingError::InvalidNumber(self.pos));
        }
        Ok(std::str::from_utf8(&self.bytes[start..self.pos])
            .unwrap()
            .to_string())
    }

    /// Skips over one JSON value without interpreting it, still counting
    /// array elements and nesting depth against the limits.
    fn skip_value(&mut self, depth: usize) -> Result<(), StreamingError> {
        self.skip_ws();
        match self.peek() {
            Some(b'"') => {
                self.parse_string_raw()?;
                Ok(())
            }
            Some(b'{') => {
                self.check_depth(depth + 1)?;
                self.pos += 1;
                self.skip_ws();
                if self.peek() == Some(b'}') {
                    self.pos += 1;
                    return Ok(());
                }
                loop {
                    self.parse_string_raw()?;
                    self.expect(b':')?;
                    self.skip_value(depth + 1)?;
                    self.skip_ws();
                    match self.bump() {
                        Some(b',') => continue,
                        Some(b'}') => break,
                        _ => {
                            return Err(StreamingError::UnexpectedToken(
                                self.pos,
                                "expected ',' or '}'".to_string(),
                            ))
                        }
                    }
                }
                Ok(())
            }
            Some(b'[') => {
                self.check_depth(depth + 1)?;
                self.pos += 1;
                self.skip_ws();
                if self.peek() == Some(b']') {
                    self.pos += 1;
                    return Ok(());
                }
                loop {
                    self.count_array_element()?;
                    self.skip_value(depth + 1)?;
                    self.skip_ws();
                    match self.bump() {
                        Some(b',') => continue,
                        Some(b']') => break,
                        _ => {
                            return Err(StreamingError::UnexpectedToken(
                                self.pos,
                                "expected ',' or ']'".to_string(),
                            ))
                        }
                    }
                }
                Ok(())
            }
            Some(b't') => self.expect_literal("true"),
            Some(b'f') => self.expect_literal("false"),
            Some(b'n') => self.expect_literal("null"),
            Some(b'-' | b'0'..=b'9') => {
                self.parse_number_raw()?;
                Ok(())
            }
            _ => Err(StreamingError::UnexpectedToken(
                self.pos,
                "unexpected token".to_string(),
            )),
        }
    }

    fn parse_value(&mut self, ty: &CType, depth: usize) -> Result<CValue, StreamingError> {
        self.skip_ws();
        match ty {
            CType::CInt => {
                let raw = self.parse_number_raw()?;
                let i: i64 = raw
                    .parse()
                    .map_err(|_| StreamingError::InvalidNumber(self.pos))?;
                Ok(CValue::CInt(i))
            }
            CType::CFloat => {
                let raw = self.parse_number_raw()?;
                let f: f64 = raw
                    .parse()
                    .map_err(|_| StreamingError::InvalidNumber(self.pos))?;
                Ok(CValue::CFloat(f))
            }
            CType::CString => Ok(CValue::CString(self.parse_string_raw()?)),
            CType::CBoolean => match self.peek() {
                Some(b't') => {
                    self.expect_literal("true")?;
                    Ok(CValue::CBoolean(true))
                }
                Some(b'f') => {
                    self.expect_literal("false")?;
                    Ok(CValue::CBoolean(false))
                }
                _ => Err(StreamingError::UnexpectedToken(
                    self.pos,
                    "expected boolean".to_string(),
                )),
            },
            CType::COptional(inner) => {
                if self.peek() == Some(b'n') {
                    self.expect_literal("null")?;
                    Ok(CValue::CNone {
                        inner_type: inner.as_ref().clone(),
                    })
                } else {
                    let value = self.parse_value(inner, depth)?;
                    Ok(CValue::CSome {
                        value: Box::new(value),
                        inner_type: inner.as_ref().clone(),
                    })
                }
            }
            CType::CList(elem) => {
                self.check_depth(depth + 1)?;
                self.expect(b'[')?;
                let mut items = Vec::new();
                self.skip_ws();
                if self.peek() == Some(b']') {
                    self.pos += 1;
                    return Ok(CValue::CList {
                        items,
                        elem_type: elem.as_ref().clone(),
                    });
                }
                loop {
                    self.count_array_element()?;
                    items.push(self.parse_value(elem, depth + 1)?);
                    self.skip_ws();
                    match self.bump() {
                        Some(b',') => continue,
                        Some(b']') => break,
                        _ => {
                            return Err(StreamingError::UnexpectedToken(
                                self.pos,
                                "expected ',' or ']'".to_string(),
                            ))
                        }
                    }
                }
                Ok(CValue::CList {
                    items,
                    elem_type: elem.as_ref().clone(),
                })
            }
            CType::CProduct(structure) => {
                self.check_depth(depth + 1)?;
                self.expect(b'{')?;
                let mut fields = BTreeMap::new();
                self.skip_ws();
                if self.peek() != Some(b'}') {
                    loop {
                        let key = self.parse_string_raw()?;
                        self.expect(b':')?;
                        match structure.get(&key) {
                            Some(field_ty) => {
                                let value = self.parse_value(field_ty, depth + 1)?;
                                fields.insert(key, value);
                            }
                            None => self.skip_value(depth + 1)?,
                        }
                        self.skip_ws();
                        match self.bump() {
                            Some(b',') => {
                                self.skip_ws();
                                continue;
                            }
                            Some(b'}') => break,
                            _ => {
                                return Err(StreamingError::UnexpectedToken(
                                    self.pos,
                                    "expected ',' or '}'".to_string(),
                                ))
                            }
                        }
                    }
                } else {
                    self.pos += 1;
                }
                let missing: Vec<String> = structure
                    .keys()
                    .filter(|k| !fields.contains_key(*k))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    return Err(StreamingError::MissingRequiredFields(missing));
                }
                Ok(CValue::CProduct {
                    fields,
                    structure: structure.clone(),
                })
            }
            CType::CUnion(structure) => {
                self.check_depth(depth + 1)?;
                self.expect(b'{')?;
                self.skip_ws();
                let first_key = self.parse_string_raw()?;
                if first_key == "value" {
                    return Err(StreamingError::ValueMustComeAfterTag);
                }
                if first_key != "tag" {
                    return Err(StreamingError::MissingTag);
                }
                self.expect(b':')?;
                let tag = self.parse_string_raw()?;
                let variant_ty = structure
                    .get(&tag)
                    .ok_or_else(|| StreamingError::UnknownUnionTag(tag.clone()))?
                    .clone();
                self.skip_ws();
                match self.bump() {
                    Some(b',') => {}
                    _ => {
                        return Err(StreamingError::MissingValue);
                    }
                }
                self.skip_ws();
                let second_key = self.parse_string_raw()?;
                if second_key != "value" {
                    return Err(StreamingError::MissingValue);
                }
                self.expect(b':')?;
                let value = self.parse_value(&variant_ty, depth + 1)?;
                self.skip_ws();
                self.expect(b'}')?;
                Ok(CValue::CUnion {
                    value: Box::new(value),
                    structure: structure.clone(),
                    tag,
                })
            }
        }
    }
}
