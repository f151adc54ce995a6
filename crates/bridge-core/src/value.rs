//! PLC values and the nested value tree.
//!
//! The PLC speaks in flat symbols carrying scalar values. Consumers see those
//! values arranged as a [`ValueTree`]: maps for structs, sequences for arrays.
//! Arrays that have only been read partially contain *holes* (`None`), which
//! serialize as JSON `null` and are distinct from every real value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::path::VariablePath;

// =============================================================================
// Scalar Values
// =============================================================================

/// A scalar value as exchanged with the PLC.
///
/// Serialized untagged so that `{"MAIN.x": 7}` round-trips through JSON and
/// TOML without wrapper objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlcValue {
    /// BOOL
    Bool(bool),
    /// Any integer type (SINT..LINT, BYTE..ULINT up to i64 range)
    Int(i64),
    /// REAL / LREAL
    Float(f64),
    /// STRING / WSTRING
    String(String),
}

impl PlcValue {
    /// Short type label used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            PlcValue::Bool(_) => "bool",
            PlcValue::Int(_) => "int",
            PlcValue::Float(_) => "float",
            PlcValue::String(_) => "string",
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PlcValue::Int(v) => Some(*v as f64),
            PlcValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean view of the value, if it is a BOOL.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PlcValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for PlcValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlcValue::Bool(v) => write!(f, "{}", v),
            PlcValue::Int(v) => write!(f, "{}", v),
            PlcValue::Float(v) => write!(f, "{}", v),
            PlcValue::String(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<bool> for PlcValue {
    fn from(v: bool) -> Self {
        PlcValue::Bool(v)
    }
}

impl From<i64> for PlcValue {
    fn from(v: i64) -> Self {
        PlcValue::Int(v)
    }
}

impl From<i32> for PlcValue {
    fn from(v: i32) -> Self {
        PlcValue::Int(i64::from(v))
    }
}

impl From<f64> for PlcValue {
    fn from(v: f64) -> Self {
        PlcValue::Float(v)
    }
}

impl From<&str> for PlcValue {
    fn from(v: &str) -> Self {
        PlcValue::String(v.to_string())
    }
}

impl From<String> for PlcValue {
    fn from(v: String) -> Self {
        PlcValue::String(v)
    }
}

/// Flat symbol name → value mapping, as read from or written to a driver.
pub type FlatValues = BTreeMap<String, PlcValue>;

// =============================================================================
// Nested Tree
// =============================================================================

/// One node of the nested value tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    /// Leaf value.
    Scalar(PlcValue),
    /// Array; `None` entries are holes.
    Sequence(Vec<Option<Node>>),
    /// Struct or program scope.
    Map(BTreeMap<String, Node>),
}

impl Node {
    /// Leaf value, if this node is one.
    pub fn as_scalar(&self) -> Option<&PlcValue> {
        match self {
            Node::Scalar(v) => Some(v),
            _ => None,
        }
    }

    /// Members, if this node is a map.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Node>> {
        match self {
            Node::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Elements, if this node is a sequence.
    pub fn as_sequence(&self) -> Option<&[Option<Node>]> {
        match self {
            Node::Sequence(items) => Some(items),
            _ => None,
        }
    }
}

impl<T: Into<PlcValue>> From<T> for Node {
    fn from(v: T) -> Self {
        Node::Scalar(v.into())
    }
}

/// Root of the nested representation of a PLC's variables.
///
/// Keys are kept ordered so that serialization and [`flatten`](crate::codec::flatten)
/// are deterministic. Mutation goes through [`crate::codec`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueTree {
    pub(crate) root: BTreeMap<String, Node>,
}

impl ValueTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing has been merged yet.
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        self.root.len()
    }

    /// Top-level entry by name.
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.root.get(name)
    }

    /// Iterate over top-level entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Node)> {
        self.root.iter()
    }

    /// Node addressed by `path`, if every segment and index along it exists.
    pub fn get(&self, path: &VariablePath) -> Option<&Node> {
        let mut members = &self.root;
        let mut found: Option<&Node> = None;

        for (i, segment) in path.segments().iter().enumerate() {
            if i > 0 {
                members = found?.as_map()?;
            }
            let mut node = members.get(segment.name())?;
            for &index in segment.indices() {
                node = node.as_sequence()?.get(index)?.as_ref()?;
            }
            found = Some(node);
        }

        found
    }

    /// Scalar addressed by `path`.
    pub fn get_value(&self, path: &VariablePath) -> Option<&PlcValue> {
        self.get(path)?.as_scalar()
    }

    /// JSON rendering, used for logging and presentation layers.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl From<BTreeMap<String, Node>> for ValueTree {
    fn from(root: BTreeMap<String, Node>) -> Self {
        Self { root }
    }
}
