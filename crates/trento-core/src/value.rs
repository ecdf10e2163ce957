// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The polymorphic fact value tree.
//!
//! Gatherers produce [`FactValue`]s, the mapper puts them on the wire, and
//! checks navigate them with dotted paths. The tree is built from generic
//! JSON-like data, optionally coercing stringly-typed leaves (command output
//! is mostly strings) into integers, booleans and floats.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use serde::de::Error as _;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};
use thiserror::Error;

use crate::error::FactGatheringError;

/// A typed, possibly nested fact payload.
///
/// Maps are ordered by key so that rendering and comparison are stable.
#[derive(Debug, Clone, PartialEq)]
pub enum FactValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    List(Vec<FactValue>),
    Map(BTreeMap<String, FactValue>),
}

/// Errors raised while building a tree from generic data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FactValueError {
    #[error("invalid type: {0}")]
    UnsupportedType(String),
}

/// How generic data is turned into a tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Parse numeric-looking and boolean-looking strings into typed leaves.
    pub coerce_strings: bool,
    /// Lowercase map keys and turn camel-case and space boundaries into `_`.
    pub snake_case_keys: bool,
}

impl ParseOptions {
    pub fn coerced() -> Self {
        Self {
            coerce_strings: true,
            snake_case_keys: false,
        }
    }

    pub fn with_coerce_strings(mut self, coerce: bool) -> Self {
        self.coerce_strings = coerce;
        self
    }

    pub fn with_snake_case_keys(mut self, snake_case: bool) -> Self {
        self.snake_case_keys = snake_case;
        self
    }
}

impl FactValue {
    /// Build a tree from a JSON value. `null` anywhere in the input is rejected.
    pub fn from_json(value: &Value, options: ParseOptions) -> Result<Self, FactValueError> {
        match value {
            Value::Null => Err(FactValueError::UnsupportedType("null".to_string())),
            Value::Bool(b) => Ok(FactValue::Bool(*b)),
            Value::Number(n) => Ok(number_to_value(n)),
            Value::String(s) if options.coerce_strings => Ok(parse_string(s)),
            Value::String(s) => Ok(FactValue::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| FactValue::from_json(item, options))
                .collect::<Result<Vec<_>, _>>()
                .map(FactValue::List),
            Value::Object(fields) => {
                let mut map = BTreeMap::new();
                for (key, item) in fields {
                    let key = if options.snake_case_keys {
                        to_snake_case(key)
                    } else {
                        key.clone()
                    };
                    map.insert(key, FactValue::from_json(item, options)?);
                }
                Ok(FactValue::Map(map))
            }
        }
    }

    /// Build a tree from any serializable structure.
    ///
    /// Structures that do not map onto the tree (maps with non-string keys,
    /// unit values, ...) fail with an error naming the offending type.
    pub fn from_serializable<T: Serialize + ?Sized>(
        value: &T,
        options: ParseOptions,
    ) -> Result<Self, FactValueError> {
        let json = serde_json::to_value(value).map_err(|_| {
            FactValueError::UnsupportedType(std::any::type_name::<T>().to_string())
        })?;
        if json.is_null() {
            return Err(FactValueError::UnsupportedType(
                std::any::type_name::<T>().to_string(),
            ));
        }
        FactValue::from_json(&json, options)
    }

    /// Parse a single string leaf, trying integer, boolean and float in turn.
    pub fn parse_str(value: &str) -> Self {
        parse_string(value)
    }

    /// Convert back to generic JSON. Non-finite floats become `null`.
    pub fn as_json(&self) -> Value {
        match self {
            FactValue::Int(i) => Value::Number((*i).into()),
            FactValue::Float(f) => Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FactValue::Bool(b) => Value::Bool(*b),
            FactValue::String(s) => Value::String(s.clone()),
            FactValue::List(items) => Value::Array(items.iter().map(FactValue::as_json).collect()),
            FactValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.as_json()))
                    .collect(),
            ),
        }
    }

    /// Navigate a dotted path such as `a.b.0.c`.
    ///
    /// Map segments are literal keys, list segments decimal indexes. Any miss
    /// yields one `value-not-found` error carrying the full path.
    pub fn get(&self, path: &str) -> Result<&FactValue, FactGatheringError> {
        if path.is_empty() {
            return Ok(self);
        }

        let mut current = self;
        for segment in path.split('.') {
            let next = match current {
                FactValue::Map(map) => map.get(segment),
                FactValue::List(items) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| items.get(index)),
                _ => None,
            };
            current = next.ok_or_else(|| FactGatheringError::value_not_found().wrap(path))?;
        }
        Ok(current)
    }

    /// Short name of the variant, used in logs and error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FactValue::Int(_) => "int",
            FactValue::Float(_) => "float",
            FactValue::Bool(_) => "bool",
            FactValue::String(_) => "string",
            FactValue::List(_) => "list",
            FactValue::Map(_) => "map",
        }
    }

    /// Stable human-readable rendering, as consumed by the checks scripting
    /// engine. Maps print as `#{...}` with keys in ascending order.
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        self.write_pretty(&mut out, 0);
        out
    }

    fn write_pretty(&self, out: &mut String, indent: usize) {
        match self {
            FactValue::Int(i) => {
                let _ = write!(out, "{}", i);
            }
            FactValue::Float(f) => {
                let _ = write!(out, "{:?}", f);
            }
            FactValue::Bool(b) => {
                let _ = write!(out, "{}", b);
            }
            FactValue::String(s) => {
                let _ = write!(out, "{:?}", s);
            }
            FactValue::List(items) if items.is_empty() => out.push_str("[]"),
            FactValue::List(items) => {
                out.push_str("[\n");
                for (i, item) in items.iter().enumerate() {
                    push_indent(out, indent + 1);
                    item.write_pretty(out, indent + 1);
                    if i + 1 < items.len() {
                        out.push(',');
                    }
                    out.push('\n');
                }
                push_indent(out, indent);
                out.push(']');
            }
            FactValue::Map(map) if map.is_empty() => out.push_str("#{}"),
            FactValue::Map(map) => {
                out.push_str("#{\n");
                let len = map.len();
                for (i, (key, item)) in map.iter().enumerate() {
                    push_indent(out, indent + 1);
                    let _ = write!(out, "{:?}: ", key);
                    item.write_pretty(out, indent + 1);
                    if i + 1 < len {
                        out.push(',');
                    }
                    out.push('\n');
                }
                push_indent(out, indent);
                out.push('}');
            }
        }
    }
}

/// Render an optional value, printing an absent leaf as `()`.
pub fn pretty_print(value: Option<&FactValue>) -> String {
    match value {
        Some(value) => value.pretty(),
        None => "()".to_string(),
    }
}

fn push_indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str("  ");
    }
}

fn number_to_value(n: &Number) -> FactValue {
    if let Some(i) = n.as_i64() {
        FactValue::Int(i)
    } else if let Some(u) = n.as_u64() {
        // Above i64::MAX
        FactValue::Float(u as f64)
    } else {
        FactValue::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

fn parse_string(s: &str) -> FactValue {
    if let Ok(i) = s.parse::<i64>() {
        return FactValue::Int(i);
    }
    if let Some(b) = parse_bool(s) {
        return FactValue::Bool(b);
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() => FactValue::Float(f),
        _ => FactValue::String(s.to_string()),
    }
}

/// Case-insensitive `true`/`false`/`1`/`0`.
pub fn parse_bool(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") || s == "1" {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") || s == "0" {
        Some(false)
    } else {
        None
    }
}

/// `ResourceName` -> `resource_name`, `HTTPServer` -> `http_server`,
/// `Node Name` -> `node_name`.
pub fn to_snake_case(key: &str) -> String {
    let chars: Vec<char> = key.trim().chars().collect();
    let mut out = String::with_capacity(key.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_whitespace() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }

        if c.is_uppercase() {
            let boundary = match i.checked_sub(1).map(|p| chars[p]) {
                Some(prev) if prev.is_lowercase() || prev.is_ascii_digit() => true,
                Some(prev) if prev.is_uppercase() => {
                    chars.get(i + 1).is_some_and(|next| next.is_lowercase())
                }
                _ => false,
            };
            if boundary && !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pretty())
    }
}

impl Serialize for FactValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FactValue::Int(i) => serializer.serialize_i64(*i),
            FactValue::Float(f) => serializer.serialize_f64(*f),
            FactValue::Bool(b) => serializer.serialize_bool(*b),
            FactValue::String(s) => serializer.serialize_str(s),
            FactValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            FactValue::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, item) in map {
                    out.serialize_entry(key, item)?;
                }
                out.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for FactValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = Value::deserialize(deserializer)?;
        FactValue::from_json(&json, ParseOptions::default()).map_err(D::Error::custom)
    }
}

impl From<i64> for FactValue {
    fn from(value: i64) -> Self {
        FactValue::Int(value)
    }
}

impl From<i32> for FactValue {
    fn from(value: i32) -> Self {
        FactValue::Int(value.into())
    }
}

impl From<u32> for FactValue {
    fn from(value: u32) -> Self {
        FactValue::Int(value.into())
    }
}

impl From<f64> for FactValue {
    fn from(value: f64) -> Self {
        FactValue::Float(value)
    }
}

impl From<bool> for FactValue {
    fn from(value: bool) -> Self {
        FactValue::Bool(value)
    }
}

impl From<&str> for FactValue {
    fn from(value: &str) -> Self {
        FactValue::String(value.to_string())
    }
}

impl From<String> for FactValue {
    fn from(value: String) -> Self {
        FactValue::String(value)
    }
}

impl From<Vec<FactValue>> for FactValue {
    fn from(value: Vec<FactValue>) -> Self {
        FactValue::List(value)
    }
}

impl From<BTreeMap<String, FactValue>> for FactValue {
    fn from(value: BTreeMap<String, FactValue>) -> Self {
        FactValue::Map(value)
    }
}
