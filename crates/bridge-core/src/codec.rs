//! Flat ⇄ nested transcoding.
//!
//! The PLC addresses every variable by a flat symbol name. This module merges
//! `(name, value)` pairs into a [`ValueTree`] and flattens a tree back into
//! pairs.
//!
//! Merging rules:
//!
//! - A plain final segment overwrites whatever lives at that key. The last
//!   write defines the type, so a scalar replaces a whole struct or array.
//! - An indexed segment turns its key into a sequence, replacing any other
//!   node there, and pads with holes up to the index. It never truncates.
//! - An intermediate segment turns its node into a map, replacing any other
//!   node there, while sibling array elements stay untouched.
//!
//! ```rust
//! use bridge_core::codec::{flatten, merge};
//! use bridge_core::value::{PlcValue, ValueTree};
//!
//! let tree = merge(ValueTree::new(), "MAIN.axis[1].pos", PlcValue::Float(2.5)).unwrap();
//! assert_eq!(
//!     tree.to_json(),
//!     serde_json::json!({"MAIN": {"axis": [null, {"pos": 2.5}]}})
//! );
//! assert_eq!(flatten(&tree), vec![("MAIN.axis[1].pos".to_string(), PlcValue::Float(2.5))]);
//! ```

use std::collections::BTreeMap;

use crate::path::{PathError, Segment, VariablePath, MAX_INDEX};
use crate::value::{Node, PlcValue, ValueTree};

/// A flat name that was skipped during [`merge_flat`].
#[derive(Debug, Clone, PartialEq)]
pub struct PathRejection {
    /// The name as received.
    pub name: String,
    /// Why it was rejected.
    pub error: PathError,
}

/// Merge one flat variable into `tree` and return the updated tree.
pub fn merge(mut tree: ValueTree, path: &str, value: PlcValue) -> Result<ValueTree, PathError> {
    let path = VariablePath::parse(path)?;
    tree.insert(&path, value);
    Ok(tree)
}

/// Merge a batch of flat variables into `tree`.
///
/// Names that fail to parse are skipped and returned; every other pair is
/// merged in iteration order.
pub fn merge_flat<I, K>(tree: &mut ValueTree, values: I) -> Vec<PathRejection>
where
    I: IntoIterator<Item = (K, PlcValue)>,
    K: AsRef<str>,
{
    let mut rejected = Vec::new();
    for (name, value) in values {
        let name = name.as_ref();
        match VariablePath::parse(name) {
            Ok(path) => tree.insert(&path, value),
            Err(error) => rejected.push(PathRejection {
                name: name.to_string(),
                error,
            }),
        }
    }
    rejected
}

/// Flatten `tree` into `(name, value)` pairs, in key order.
///
/// Holes are skipped; map keys are joined with `.`, indices with `[i]`.
pub fn flatten(tree: &ValueTree) -> Vec<(String, PlcValue)> {
    let mut out = Vec::new();
    for (key, node) in tree.iter() {
        flatten_node(key.clone(), node, &mut out);
    }
    out
}

fn flatten_node(prefix: String, node: &Node, out: &mut Vec<(String, PlcValue)>) {
    match node {
        Node::Scalar(value) => out.push((prefix, value.clone())),
        Node::Map(members) => {
            for (key, child) in members {
                flatten_node(format!("{}.{}", prefix, key), child, out);
            }
        }
        Node::Sequence(items) => {
            for (index, item) in items.iter().enumerate() {
                if let Some(child) = item {
                    flatten_node(format!("{}[{}]", prefix, index), child, out);
                }
            }
        }
    }
}

impl ValueTree {
    /// Set `value` at an already parsed `path`, creating or replacing the
    /// intermediate nodes along the way.
    pub fn insert(&mut self, path: &VariablePath, value: PlcValue) {
        insert_into(&mut self.root, path.segments(), value);
    }
}

fn insert_into(members: &mut BTreeMap<String, Node>, segments: &[Segment], value: PlcValue) {
    let Some((segment, rest)) = segments.split_first() else {
        return;
    };

    let Some(slot) = slot_for(members, segment) else {
        return;
    };
    if rest.is_empty() {
        *slot = Node::Scalar(value);
    } else {
        insert_into(ensure_map(slot), rest, value);
    }
}

/// Node addressed by `segment` inside `members`, following its index chain.
/// Missing entries are created as empty maps; the caller overwrites them.
/// `None` when an index is beyond [`MAX_INDEX`], leaving `members` untouched.
fn slot_for<'a>(
    members: &'a mut BTreeMap<String, Node>,
    segment: &Segment,
) -> Option<&'a mut Node> {
    if segment.indices().iter().any(|&index| index > MAX_INDEX) {
        return None;
    }

    let mut node = members
        .entry(segment.name().to_string())
        .or_insert_with(empty_map);

    for &index in segment.indices() {
        let items = ensure_sequence(node);
        let len = index.checked_add(1)?;
        if items.len() < len {
            items.resize_with(len, || None);
        }
        node = items[index].get_or_insert_with(empty_map);
    }

    Some(node)
}

fn empty_map() -> Node {
    Node::Map(BTreeMap::new())
}

fn ensure_map(node: &mut Node) -> &mut BTreeMap<String, Node> {
    if !matches!(node, Node::Map(_)) {
        *node = empty_map();
    }
    match node {
        Node::Map(members) => members,
        _ => unreachable!("node was just replaced by a map"),
    }
}

fn ensure_sequence(node: &mut Node) -> &mut Vec<Option<Node>> {
    if !matches!(node, Node::Sequence(_)) {
        *node = Node::Sequence(Vec::new());
    }
    match node {
        Node::Sequence(items) => items,
        _ => unreachable!("node was just replaced by a sequence"),
    }
}
