//! The flat, namespaced parameter store feeding the entity graph.
//!
//! Parameters are dotted string keys mapping to loosely typed values
//! (strings, floats, float arrays; integer arrays are widened element-wise
//! to floats). The store is serialized in the RON format:
//!
//! ```ron
//! {
//!     "type": "sim",
//!     "dynamics_configurations.default.max_velocity": [2.0, 2.0, 3.0],
//!     "marker_configurations.default.offset": [0.0, 0.0, -0.04],
//!     "marker_configurations.default.points.0": [0.0177, 0.0177, 0.0],
//!     "rigid_bodies.cf1.initial_position": [0.0, 0.0, 0.0],
//!     "rigid_bodies.cf1.marker": "default",
//!     "rigid_bodies.cf1.dynamics": "default",
//! }
//! ```
//!
//! Typed lookups return a structured [`ConfigError`] instead of panicking:
//! a bad parameter file must abort startup with a message naming the key.

use ron::extensions::Extensions;
use ron::value::Value as RonValue;
use ron::Options;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fmt::Display;
use std::fs::read_to_string;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read parameter file '{path}': {reason}")]
    Io { path: String, reason: String },

    #[error("syntax error in parameter file: {0}")]
    Syntax(String),

    #[error("missing required parameter '{0}'")]
    MissingKey(String),

    #[error("parameter '{key}' has the wrong type (expected {expected})")]
    WrongType { key: String, expected: &'static str },

    #[error("parameter '{key}' has {got} elements, expected {expected}")]
    BadArity {
        key: String,
        expected: usize,
        got: usize,
    },

    #[error("rigid body '{body}' references unknown {namespace} '{name}'")]
    UnresolvedReference {
        body: String,
        namespace: &'static str,
        name: String,
    },
}

/// Wrapper around the ron::Value to keep the rest of the crate independent
/// of the underlying representation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Value(RonValue);

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value(RonValue::Number(value.into()))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value(RonValue::Number(value.into()))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value(RonValue::String(value.to_string()))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value(RonValue::String(value))
    }
}

impl From<Vec<f64>> for Value {
    fn from(values: Vec<f64>) -> Self {
        Value(RonValue::Seq(
            values
                .into_iter()
                .map(|v| RonValue::Number(v.into()))
                .collect(),
        ))
    }
}

impl From<[f64; 3]> for Value {
    fn from(values: [f64; 3]) -> Self {
        Vec::from(values).into()
    }
}

impl From<Vec<i64>> for Value {
    fn from(values: Vec<i64>) -> Self {
        Value(RonValue::Seq(
            values
                .into_iter()
                .map(|v| RonValue::Number(v.into()))
                .collect(),
        ))
    }
}

fn number_as_f64(number: &ron::value::Number) -> f64 {
    match number {
        ron::value::Number::Integer(i) => *i as f64,
        ron::value::Number::Float(f) => f.get(),
    }
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match &self.0 {
            RonValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Scalar as f64; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match &self.0 {
            RonValue::Number(n) => Some(number_as_f64(n)),
            _ => None,
        }
    }

    /// Sequence of scalars as f64; integer arrays are widened element-wise.
    pub fn as_f64_array(&self) -> Option<Vec<f64>> {
        match &self.0 {
            RonValue::Seq(seq) => seq
                .iter()
                .map(|v| match v {
                    RonValue::Number(n) => Some(number_as_f64(n)),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            RonValue::Number(n) => write!(f, "{}", number_as_f64(n)),
            RonValue::String(s) => write!(f, "{s}"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// The flat dotted-key parameter store.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ParamStore(pub HashMap<String, Value>);

fn ron_options() -> Options {
    Options::default()
        .with_default_extension(Extensions::IMPLICIT_SOME)
        .with_default_extension(Extensions::UNWRAP_NEWTYPES)
        .with_default_extension(Extensions::UNWRAP_VARIANT_NEWTYPES)
}

impl ParamStore {
    pub fn new() -> Self {
        ParamStore(HashMap::new())
    }

    /// Parse a RON map of dotted keys to values.
    pub fn from_ron(ron: &str) -> Result<Self, ConfigError> {
        ron_options()
            .from_str(ron)
            .map_err(|e| ConfigError::Syntax(e.to_string()))
    }

    /// Read a parameter store from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_ron(&content)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    fn require(&self, key: &str) -> Result<&Value, ConfigError> {
        self.0
            .get(key)
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
    }

    pub fn get_str(&self, key: &str) -> Result<&str, ConfigError> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| ConfigError::WrongType {
                key: key.to_string(),
                expected: "string",
            })
    }

    pub fn get_f64(&self, key: &str) -> Result<f64, ConfigError> {
        self.require(key)?
            .as_f64()
            .ok_or_else(|| ConfigError::WrongType {
                key: key.to_string(),
                expected: "float",
            })
    }

    pub fn get_f64s(&self, key: &str) -> Result<Vec<f64>, ConfigError> {
        self.require(key)?
            .as_f64_array()
            .ok_or_else(|| ConfigError::WrongType {
                key: key.to_string(),
                expected: "float array",
            })
    }

    /// A 3-vector parameter; anything but exactly 3 scalars is an error.
    pub fn get_vec3(&self, key: &str) -> Result<[f64; 3], ConfigError> {
        let values = self.get_f64s(key)?;
        if values.len() != 3 {
            return Err(ConfigError::BadArity {
                key: key.to_string(),
                expected: 3,
                got: values.len(),
            });
        }
        Ok([values[0], values[1], values[2]])
    }

    /// The distinct first-level names immediately following `prefix + "."`
    /// in the key space, sorted. Sorting makes the index assignment done by
    /// the entity graph deterministic across runs.
    pub fn extract_names(&self, prefix: &str) -> BTreeSet<String> {
        let mut result = BTreeSet::new();
        for key in self.0.keys() {
            if let Some(rest) = key.strip_prefix(prefix) {
                if let Some(rest) = rest.strip_prefix('.') {
                    let name = match rest.find('.') {
                        Some(end) => &rest[..end],
                        None => rest,
                    };
                    if !name.is_empty() {
                        result.insert(name.to_string());
                    }
                }
            }
        }
        result
    }

    /// All keys starting with the literal `prefix` (used for `points*`
    /// sub-key scans).
    pub fn keys_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> {
        self.0
            .keys()
            .filter(move |k| k.starts_with(prefix))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_flat_ron_map() {
        let store = ParamStore::from_ron(
            r#"{
                "type": "sim",
                "rigid_bodies.cf1.initial_position": [0.0, 0.0, 1.0],
            }"#,
        )
        .unwrap();
        assert_eq!(store.get_str("type").unwrap(), "sim");
        assert_eq!(
            store.get_vec3("rigid_bodies.cf1.initial_position").unwrap(),
            [0.0, 0.0, 1.0]
        );
    }

    #[test]
    fn integer_arrays_are_widened() {
        let mut store = ParamStore::new();
        store.set("offset", vec![1i64, 2, 3]);
        assert_eq!(store.get_vec3("offset").unwrap(), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn missing_key_is_reported_by_name() {
        let store = ParamStore::new();
        let err = store.get_f64("dynamics_configurations.default.max_roll");
        assert!(matches!(err, Err(ConfigError::MissingKey(k))
            if k == "dynamics_configurations.default.max_roll"));
    }

    #[test]
    fn wrong_type_and_arity_are_rejected() {
        let mut store = ParamStore::new();
        store.set("name", 4.0);
        assert!(matches!(
            store.get_str("name"),
            Err(ConfigError::WrongType { .. })
        ));
        store.set("offset", vec![1.0, 2.0]);
        assert!(matches!(
            store.get_vec3("offset"),
            Err(ConfigError::BadArity { got: 2, .. })
        ));
    }

    #[test]
    fn extract_names_is_sorted_and_distinct() {
        let mut store = ParamStore::new();
        store.set("rigid_bodies.cf2.marker", "default");
        store.set("rigid_bodies.cf1.marker", "default");
        store.set("rigid_bodies.cf1.dynamics", "default");
        store.set("rigid_bodies_other.cf3.marker", "default");
        let names: Vec<String> = store.extract_names("rigid_bodies").into_iter().collect();
        assert_eq!(names, ["cf1", "cf2"]);
    }
}
