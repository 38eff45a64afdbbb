//! Structured property map of a log record.
//!
//! Values only enter the map through [`Properties::set`] /
//! [`Properties::safe_set`], which sanitize text (including text nested in
//! maps) on the way in and reject duplicate keys.

use serde::Serialize;
use serde_json::{Map, Value};
use std::panic::{self, AssertUnwindSafe};

use crate::error::{BoxError, BuildError};
use crate::sanitize::{Sanitizer, SCRUBBED};

/// Keys whose array values are concatenated instead of colliding.
pub const MERGE_KEYS: &[&str] = &["Tags"];

/// A value on its way into a [`Properties`] map.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Sanitized before storage.
    Text(String),
    /// String entries are sanitized recursively, null entries dropped.
    Map(Map<String, Value>),
    /// Any other JSON document, sanitized like [`PropertyValue::Map`].
    Json(Value),
    /// Stored as-is; the producer is responsible for sanitizing it.
    Structured(Value),
}

impl PropertyValue {
    /// Serialize an already-sanitized value such as an
    /// [`ExceptionInfo`](crate::exception::ExceptionInfo).
    pub fn structured<T: Serialize>(value: &T) -> Result<Self, BuildError> {
        Ok(PropertyValue::Structured(serde_json::to_value(value)?))
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<Map<String, Value>> for PropertyValue {
    fn from(value: Map<String, Value>) -> Self {
        PropertyValue::Map(value)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(value: Vec<String>) -> Self {
        PropertyValue::Structured(Value::from(value))
    }
}

impl From<Value> for PropertyValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => PropertyValue::Text(s),
            Value::Object(map) => PropertyValue::Map(map),
            array @ Value::Array(_) => PropertyValue::Json(array),
            other => PropertyValue::Structured(other),
        }
    }
}

macro_rules! structured_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for PropertyValue {
            fn from(value: $ty) -> Self {
                PropertyValue::Structured(Value::from(value))
            }
        })*
    };
}

structured_from!(bool, i32, i64, u16, u32, u64);

/// Insertion-ordered, key-unique property map.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Properties(Map<String, Value>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Convenience accessor for text-valued properties.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    /// Sanitize `value` and store it under `key`. Any value stored under a
    /// sensitive field name is replaced by the scrub marker.
    ///
    /// A second write to an existing key is a [`BuildError::Collision`]
    /// (except for [`MERGE_KEYS`] holding arrays); the map is left untouched.
    pub fn set(
        &mut self,
        sanitizer: &Sanitizer,
        key: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<(), BuildError> {
        let value = sanitize_value(sanitizer, key, value.into());
        match self.0.get_mut(key) {
            None => {
                self.0.insert(key.to_string(), value);
                Ok(())
            }
            Some(Value::Array(existing)) if MERGE_KEYS.contains(&key) && value.is_array() => {
                if let Value::Array(more) = value {
                    existing.extend(more);
                }
                Ok(())
            }
            Some(existing) => Err(BuildError::Collision {
                key: key.to_string(),
                existing: existing.clone(),
                attempted: value,
            }),
        }
    }

    /// Evaluate `getter` and store its value; a failure (or panic) inside the
    /// getter stores a diagnostic string instead of propagating.
    pub fn safe_set<F>(&mut self, sanitizer: &Sanitizer, key: &str, getter: F) -> Result<(), BuildError>
    where
        F: FnOnce() -> Result<PropertyValue, BoxError>,
    {
        let value = match panic::catch_unwind(AssertUnwindSafe(getter)) {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => PropertyValue::Text(failure_message(key, &e.to_string())),
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "a panic".to_string());
                PropertyValue::Text(failure_message(key, &reason))
            }
        };
        self.set(sanitizer, key, value)
    }

    /// Overwriting insert, used only when assembling the fallback record.
    pub(crate) fn replace(&mut self, sanitizer: &Sanitizer, key: &str, value: impl Into<PropertyValue>) {
        let value = sanitize_value(sanitizer, key, value.into());
        self.0.insert(key.to_string(), value);
    }
}

fn failure_message(key: &str, reason: &str) -> String {
    format!("Failed setting {key} key in logger because {reason}")
}

fn sanitize_value(sanitizer: &Sanitizer, key: &str, value: PropertyValue) -> Value {
    if sanitizer.is_sensitive_field(key) {
        return Value::String(SCRUBBED.to_string());
    }
    match value {
        PropertyValue::Text(text) => Value::String(sanitizer.sanitize_property(&text)),
        PropertyValue::Map(map) => Value::Object(sanitize_map(sanitizer, map)),
        PropertyValue::Json(value) => sanitize_nested(sanitizer, value),
        PropertyValue::Structured(value) => value,
    }
}

/// Sanitize every string in `map` (recursively), dropping null entries.
/// Entries under a sensitive field name are scrubbed whole.
pub fn sanitize_map(sanitizer: &Sanitizer, map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let v = if sanitizer.is_sensitive_field(&k) {
                Value::String(SCRUBBED.to_string())
            } else {
                sanitize_nested(sanitizer, v)
            };
            (k, v)
        })
        .collect()
}

fn sanitize_nested(sanitizer: &Sanitizer, value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitizer.sanitize_property(&s)),
        Value::Object(map) => Value::Object(sanitize_map(sanitizer, map)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| sanitize_nested(sanitizer, v))
                .collect(),
        ),
        other => other,
    }
}
