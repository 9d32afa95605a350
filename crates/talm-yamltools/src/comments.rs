//! Moves comments between independently parsed trees.
//!
//! Nodes are correlated by their [`NodePath`]. A comment whose path does not exist in the
//! target (because the structure was renamed or reshaped) is dropped, never attached somewhere
//! else.
use std::collections::BTreeMap;

use crate::node::{Comments, Node, NodePath, Value};

/// The commented nodes of a donor tree, keyed by path.
///
/// Key nodes of mapping entries are tracked apart from value nodes since both share the path of
/// the entry.
#[derive(Debug, Default)]
pub struct CommentMap<'a> {
    keys: BTreeMap<NodePath, &'a Node>,
    nodes: BTreeMap<NodePath, &'a Node>,
}

impl<'a> CommentMap<'a> {
    /// The key node of the mapping entry at `path`, if it carries comments.
    pub fn key(&self, path: &NodePath) -> Option<&'a Node> {
        self.keys.get(path).copied()
    }

    /// The value, sequence item or root node at `path`, if it carries comments.
    pub fn node(&self, path: &NodePath) -> Option<&'a Node> {
        self.nodes.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len() + self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.nodes.is_empty()
    }
}

/// Records every node of `source` which has at least one comment.
pub fn capture(source: &Node) -> CommentMap<'_> {
    let mut map = CommentMap::default();
    capture_into(source, &NodePath::root(), &mut map);
    map
}

fn capture_into<'a>(node: &'a Node, path: &NodePath, map: &mut CommentMap<'a>) {
    if !node.comments.is_empty() {
        map.nodes.insert(path.clone(), node);
    }
    match &node.value {
        Value::Mapping(entries) => {
            for (key, value) in entries {
                let child = path.key(&key.key_str());
                if !key.comments.is_empty() {
                    map.keys.insert(child.clone(), key);
                }
                capture_into(value, &child, map);
            }
        }
        Value::Sequence(items) => {
            for (index, item) in items.iter().enumerate() {
                capture_into(item, &path.index(index), map);
            }
        }
        Value::Scalar(_) => {}
    }
}

/// Merges the comments recorded in `map` into the nodes of `target` at the same paths.
///
/// Each channel is merged on its own with [`merge_comments`], existing comments of `target`
/// come first.
pub fn apply(target: &mut Node, map: &CommentMap<'_>) {
    apply_at(target, &NodePath::root(), map);
}

fn apply_at(node: &mut Node, path: &NodePath, map: &CommentMap<'_>) {
    if let Some(source) = map.node(path) {
        merge_into(&mut node.comments, &source.comments);
    }
    match &mut node.value {
        Value::Mapping(entries) => {
            for (key, value) in entries {
                let child = path.key(&key.key_str());
                if let Some(source) = map.key(&child) {
                    merge_into(&mut key.comments, &source.comments);
                }
                apply_at(value, &child, map);
            }
        }
        Value::Sequence(items) => {
            for (index, item) in items.iter_mut().enumerate() {
                apply_at(item, &path.index(index), map);
            }
        }
        Value::Scalar(_) => {}
    }
}

fn merge_into(target: &mut Comments, source: &Comments) {
    target.head = merge_comments(&target.head, &source.head);
    target.line = merge_comments(&target.line, &source.line);
    target.foot = merge_comments(&target.foot, &source.foot);
}

/// Combines two comments of the same channel, separated by a blank line.
pub fn merge_comments(existing: &str, incoming: &str) -> String {
    if existing.is_empty() {
        incoming.to_owned()
    } else if incoming.is_empty() {
        existing.to_owned()
    } else {
        format!("{}\n\n{}", existing.trim(), incoming.trim())
    }
}

/// Copies the comments of `source` onto `target`.
pub fn copy(source: &Node, target: &mut Node) {
    apply(target, &capture(source));
}

/// Removes all comments from the tree.
pub fn clear(node: &mut Node) {
    node.comments = Comments::default();
    match &mut node.value {
        Value::Mapping(entries) => {
            for (key, value) in entries {
                key.comments = Comments::default();
                clear(value);
            }
        }
        Value::Sequence(items) => items.iter_mut().for_each(clear),
        Value::Scalar(_) => {}
    }
}
