//! Structural diff of two node trees into a patch document.
//!
//! The patch is shaped around a merge format which is additive by default: changed and added
//! values are written out, removed mapping keys are marked with `{$patch: delete}` and sequences
//! only ever grow. Removing a whole mapping deletes each of its keys individually.
use std::collections::HashSet;

use indexmap::IndexMap;
use snafu::{ResultExt, Snafu};
use tracing::instrument;

use crate::{
    comments,
    node::{Node, Value},
    parse::{self, parse},
};

/// The key of a deletion marker.
pub const PATCH_KEY: &str = "$patch";

/// The value of a deletion marker.
pub const DELETE: &str = "delete";

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse the original document"))]
    ParseOriginal { source: parse::Error },

    #[snafu(display("failed to parse the modified document"))]
    ParseModified { source: parse::Error },
}

/// The mapping `{$patch: delete}`, which removes the key it is stored under.
pub fn deletion_marker() -> Node {
    Node::mapping(vec![(Node::plain(PATCH_KEY), Node::plain(DELETE))])
}

pub fn is_deletion_marker(node: &Node) -> bool {
    match node.as_mapping() {
        Some([(key, value)]) => key.as_str() == Some(PATCH_KEY) && value.as_str() == Some(DELETE),
        _ => false,
    }
}

/// Computes the delta turning `original` into `modified`, or [`None`] if there is none.
///
/// - Nodes of different kinds are replaced by `modified` as a whole.
/// - Scalars are compared by value, their style does not matter.
/// - Mappings are walked in the order of `modified`. Keys only in `modified` are added verbatim,
///   keys only in `original` are deleted.
/// - Sequences yield the items of `modified` which are not part of `original`. Removed or
///   reordered items are not represented.
pub fn diff(original: &Node, modified: &Node) -> Option<Node> {
    match (&original.value, &modified.value) {
        (Value::Mapping(original), Value::Mapping(modified)) => diff_mappings(original, modified),
        (Value::Sequence(original), Value::Sequence(modified)) => {
            diff_sequences(original, modified)
        }
        (Value::Scalar(a), Value::Scalar(b)) => (a.value != b.value).then(|| modified.clone()),
        _ => Some(modified.clone()),
    }
}

/// Parses both documents and diffs their roots. Comments of either document are not part of
/// the result.
#[instrument(skip_all)]
pub fn diff_documents(original: &str, modified: &str) -> Result<Option<Node>> {
    let mut original = parse(original).context(ParseOriginalSnafu)?;
    let mut modified = parse(modified).context(ParseModifiedSnafu)?;
    comments::clear(&mut original);
    comments::clear(&mut modified);

    let patch = diff(&original, &modified);
    tracing::debug!(
        changed_keys = patch.as_ref().and_then(Node::as_mapping).map_or(0, <[_]>::len),
        "computed structural diff"
    );
    Ok(patch)
}

fn diff_mappings(original: &[(Node, Node)], modified: &[(Node, Node)]) -> Option<Node> {
    let original: IndexMap<String, (&Node, &Node)> = original
        .iter()
        .map(|(key, value)| (key.key_str(), (key, value)))
        .collect();
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for (key, value) in modified {
        let name = key.key_str();
        match original.get(&name) {
            Some((_, original_value)) => {
                if let Some(delta) = diff(original_value, value) {
                    entries.push((key.clone(), delta));
                }
                seen.insert(name);
            }
            None => entries.push((key.clone(), value.clone())),
        }
    }

    for (name, (key, value)) in &original {
        if seen.contains(name) {
            continue;
        }
        let deletion = match value.as_mapping() {
            Some(nested) => Node::mapping(
                nested
                    .iter()
                    .map(|(nested_key, _)| (nested_key.clone(), deletion_marker()))
                    .collect(),
            ),
            None => deletion_marker(),
        };
        entries.push(((*key).clone(), deletion));
    }

    (!entries.is_empty()).then(|| Node::mapping(entries))
}

fn diff_sequences(original: &[Node], modified: &[Node]) -> Option<Node> {
    let present: HashSet<String> = original.iter().map(Node::canonical_string).collect();
    let additions: Vec<Node> = modified
        .iter()
        .filter(|item| !present.contains(&item.canonical_string()))
        .cloned()
        .collect();

    (!additions.is_empty()).then(|| Node::sequence(additions))
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;
    use crate::{
        emit::{EmitOptions, to_string},
        merge::apply_patch,
    };

    fn yaml(text: &str) -> Node {
        parse(text).expect("test YAML is valid")
    }

    fn patch_text(original: &str, modified: &str) -> Option<String> {
        diff_documents(original, modified)
            .expect("test YAML is valid")
            .map(|patch| to_string(&patch, &EmitOptions::default()).expect("patch is serializable"))
    }

    #[rstest]
    #[case("{}")]
    #[case("a: 1")]
    #[case(indoc! {"
        machine:
          type: controlplane
          certSANs: [a, b]
          network:
            interfaces:
              - interface: eth0
                dhcp: true
    "})]
    #[case("- x\n- y\n")]
    #[case("just a scalar")]
    fn diff_with_itself_is_empty(#[case] document: &str) {
        let node = yaml(document);
        assert_eq!(diff(&node, &node), None);
    }

    #[rstest]
    #[case("{}", "a: 1\n", Some("a: 1\n"))]
    #[case("a: 1\n", "{}", Some("a:\n  $patch: delete\n"))]
    #[case("a: 1\n", "a: 2\n", Some("a: 2\n"))]
    #[case("a: '1'\n", "a: 1\n", None)]
    #[case("a: [1, 2]\n", "a: {x: 1}\n", Some("a:\n  x: 1\n"))]
    #[case("a: 1\n", "a: [1]\n", Some("a:\n  - 1\n"))]
    #[case("a: []\n", "a: [x]\n", Some("a:\n  - x\n"))]
    #[case("a:\n  - 1.10\n  - 0x5dc\n", "a: [1.10, 0x5dc]\n", None)]
    #[case("a: {v: 1.20}\n", "a:\n  v: 1.20\n", None)]
    #[case("a: [1.10]\n", "a: [1.10, 1.1]\n", Some("a:\n  - 1.10\n  - 1.1\n"))]
    #[case("{}", "mtu: {v: 0x10, ver: 1.20}\n", Some("mtu:\n  v: 0x10\n  ver: 1.20\n"))]
    fn kinds_and_scalars(
        #[case] original: &str,
        #[case] modified: &str,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(patch_text(original, modified).as_deref(), expected);
    }

    #[test]
    fn sequences_are_addition_only() {
        let short = yaml("[a, b]");
        let long = yaml("[a, b, c]");

        assert_eq!(
            diff(&short, &long).map(|patch| patch.canonical_string()),
            Some("[c]".to_owned())
        );
        assert_eq!(diff(&long, &short), None);
        assert_eq!(diff(&yaml("[a, b, c]"), &yaml("[c, a, b]")), None);
    }

    #[test]
    fn sequences_compare_collections_by_content() {
        let original = yaml("- {name: eth0, dhcp: true}\n- [1, 2]\n");
        let modified = yaml("- {name: eth0, dhcp: true}\n- {name: eth1}\n- [1, 2]\n");

        assert_eq!(
            diff(&original, &modified).map(|patch| patch.canonical_string()),
            Some("[{name: eth1}]".to_owned())
        );
    }

    #[test]
    fn removed_mappings_are_deleted_key_by_key() {
        assert_eq!(
            patch_text("a:\n  x: 1\n  y: 2\n", "{}").as_deref(),
            Some(indoc! {"
                a:
                  x:
                    $patch: delete
                  y:
                    $patch: delete
            "})
        );
    }

    #[test]
    fn key_order_follows_the_modified_document() {
        let patch = patch_text(
            "gone: 1\nkept: 1\nchanged: 1\n",
            "changed: 2\nkept: 1\nadded: 3\n",
        );

        assert_eq!(
            patch.as_deref(),
            Some(indoc! {"
                changed: 2
                added: 3
                gone:
                  $patch: delete
            "})
        );
    }

    #[test]
    fn controlplane_against_neutral_baseline() {
        let patch = patch_text(
            "machine:\n  type: unknown\n",
            indoc! {"
                machine:
                  type: controlplane
                  network:
                    hostname: node1
            "},
        );

        assert_eq!(
            patch.as_deref(),
            Some(indoc! {"
                machine:
                  type: controlplane
                  network:
                    hostname: node1
            "})
        );
    }

    #[test]
    fn comments_are_ignored() {
        assert_eq!(
            diff_documents("# note\na: 1 # one\n", "a: 1\n").expect("test YAML is valid"),
            None
        );
        let patch = diff_documents("a: 1\n", "# note\nb: 2 # two\n")
            .expect("test YAML is valid")
            .expect("documents differ");
        assert!(
            patch
                .as_mapping()
                .expect("patch is a mapping")
                .iter()
                .all(|(key, value)| key.comments.is_empty() && value.comments.is_empty())
        );
    }

    #[rstest]
    #[case("a: 1\nb: {x: 1, y: [1, 2]}\n", "a: 2\nb: {x: 1, y: [1, 2, 3]}\nc: new\n")]
    #[case("a:\n  x: 1\n  y: 2\nb: 1\n", "b: 1\n")]
    #[case("a: {x: {deep: 1}}\n", "a: {x: 1}\n")]
    #[case("a: scalar\n", "a: {now: mapping}\n")]
    #[case("{}", "a: {x: 1}\n")]
    #[case("mtu: {v: 0x5dc}\n", "mtu: {v: 0x5dc, ver: 1.20}\nversions: [1.10, 010]\n")]
    fn patch_round_trips(#[case] original: &str, #[case] modified: &str) {
        let mut base = yaml(original);
        let target = yaml(modified);

        // Through the written text, so scalars must survive emit and parse unchanged
        if let Some(patch) = patch_text(original, modified) {
            apply_patch(&mut base, &yaml(&patch));
        }
        assert!(
            base.structurally_eq(&target),
            "{} != {}",
            base.canonical_string(),
            target.canonical_string()
        );
    }

    #[test]
    fn deletion_markers() {
        assert!(is_deletion_marker(&deletion_marker()));
        assert!(is_deletion_marker(&yaml("$patch: delete")));
        assert!(!is_deletion_marker(&yaml("$patch: replace")));
        assert!(!is_deletion_marker(&yaml("{$patch: delete, other: 1}")));
    }

    #[test]
    fn parse_errors_name_the_document() {
        assert!(matches!(
            diff_documents("a: [", "a: 1"),
            Err(Error::ParseOriginal { .. })
        ));
        assert!(matches!(
            diff_documents("a: 1", "a: \"open"),
            Err(Error::ParseModified { .. })
        ));
    }
}
