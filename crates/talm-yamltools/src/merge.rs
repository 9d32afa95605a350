//! Applies patch documents the way their consumer merges them.
use std::collections::HashSet;

use crate::{
    diff::is_deletion_marker,
    node::{Node, Value},
};

/// Merges `patch` into `base`.
///
/// - Mappings merge key by key. A deletion marker removes its key. A nested patch made only of
///   deletions which leaves its mapping empty removes the key as well.
/// - Sequences get the items appended which they do not contain yet.
/// - Anything else replaces the value of `base`, keeping its comments.
pub fn apply_patch(base: &mut Node, patch: &Node) {
    if let (Value::Mapping(entries), Value::Mapping(changes)) = (&mut base.value, &patch.value) {
        merge_mappings(entries, changes);
        return;
    }
    if let (Value::Sequence(items), Value::Sequence(additions)) = (&mut base.value, &patch.value)
    {
        let mut present: HashSet<String> = items.iter().map(Node::canonical_string).collect();
        for addition in additions {
            if present.insert(addition.canonical_string()) {
                items.push(addition.clone());
            }
        }
        return;
    }
    base.value = patch.value.clone();
}

fn merge_mappings(entries: &mut Vec<(Node, Node)>, changes: &[(Node, Node)]) {
    for (key, change) in changes {
        let name = key.key_str();
        let position = entries.iter().position(|(key, _)| key.key_str() == name);

        match position {
            Some(index) if is_deletion_marker(change) => {
                entries.remove(index);
            }
            Some(index) => {
                let value = &mut entries[index].1;
                apply_patch(value, change);
                if deletes_only(change) && value.as_mapping().is_some_and(<[_]>::is_empty) {
                    entries.remove(index);
                }
            }
            None if is_deletion_marker(change) || deletes_only(change) => {}
            None => entries.push((key.clone(), change.clone())),
        }
    }
}

/// A non-empty mapping whose leaves are all deletion markers.
fn deletes_only(node: &Node) -> bool {
    node.as_mapping().is_some_and(|entries| {
        !entries.is_empty()
            && entries
                .iter()
                .all(|(_, value)| is_deletion_marker(value) || deletes_only(value))
    })
}
