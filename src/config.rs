use std::collections::BTreeMap;
use std::fs;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::kind::Kind;

/// A single validated setting value.
///
/// This is the shape the external schema validator hands over: scalars are
/// already range-checked, durations are normalized to milliseconds, and
/// cross-references are explicitly tagged so they cannot be confused with
/// plain strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A time period with millisecond resolution, the wire resolution of the
    /// generated firmware.
    Millis(u64),
    /// A cross-reference to another instance by identifier.
    Ref(String),
    /// An ordered collection; order is semantically meaningful.
    List(Vec<Value>),
    /// A nested key/value group, e.g. an optional feature block.
    Section(BTreeMap<String, Value>),
}

impl Value {
    pub(crate) fn as_ref_name(&self) -> Option<&str> {
        match self {
            Value::Ref(name) => Some(name),
            _ => None,
        }
    }

    pub(crate) fn as_millis(&self) -> Option<u64> {
        match self {
            Value::Millis(ms) => Some(*ms),
            _ => None,
        }
    }

    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub(crate) fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub(crate) fn as_section(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Section(map) => Some(map),
            _ => None,
        }
    }
}

/// One declared component instance: a kind, an optional explicit identifier,
/// and the kind-specific parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub kind: Kind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
}

impl Instance {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            id: None,
            params: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Human-readable name for diagnostics, before identifiers are assigned.
    pub(crate) fn describe(&self, index: usize) -> String {
        match &self.id {
            Some(id) => format!("{} '{}'", self.kind, id),
            None => format!("{} #{}", self.kind, index),
        }
    }
}

/// The validated configuration tree: instance declarations in declaration
/// order. Declaration order is load-bearing — it seeds the scheduler's
/// selection policy and therefore the deterministic output order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigTree {
    pub instances: Vec<Instance>,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instance(mut self, instance: Instance) -> Self {
        self.instances.push(instance);
        self
    }

    pub fn from_json_str(text: &str) -> Result<Self, CompileError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file(path: impl AsRef<Utf8Path>) -> Result<Self, CompileError> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let tree = ConfigTree::from_json_str(
            r#"{
                "instances": [
                    {"kind": "switch", "id": "pump", "params": {"pin": {"int": 4}}},
                    {"kind": "controller", "params": {"pump_switch": {"ref": "pump"}}}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(tree.instances.len(), 2);
        assert_eq!(tree.instances[0].id.as_deref(), Some("pump"));
        assert_eq!(tree.instances[0].params["pin"], Value::Int(4));
        assert_eq!(
            tree.instances[1].params["pump_switch"].as_ref_name(),
            Some("pump")
        );
    }

    #[test]
    fn test_list_order_preserved() {
        let tree = ConfigTree::from_json_str(
            r#"{
                "instances": [
                    {"kind": "switch", "id": "a", "params": {
                        "interlock": {"list": [{"ref": "c"}, {"ref": "b"}]}
                    }}
                ]
            }"#,
        )
        .unwrap();

        let items = tree.instances[0].params["interlock"].as_list().unwrap();
        let names: Vec<_> = items.iter().filter_map(Value::as_ref_name).collect();
        assert_eq!(names, ["c", "b"]);
    }

    #[test]
    fn test_bad_json_is_a_parse_error() {
        let err = ConfigTree::from_json_str("{").unwrap_err();
        assert!(matches!(err, CompileError::ConfigParse(_)));
    }

    #[test]
    fn test_describe() {
        let named = Instance::new(Kind::Switch).with_id("pump");
        assert_eq!(named.describe(0), "switch 'pump'");

        let anon = Instance::new(Kind::Select);
        assert_eq!(anon.describe(3), "select #3");
    }
}
