//! The in-memory YAML node tree.
//!
//! A [`Node`] is a tagged value (mapping, sequence or scalar) plus the three comment channels a
//! YAML emitter knows about. The comments of a mapping entry always live on the entry's key node,
//! sequence items and the document root carry their own.
use std::fmt;

use strum::{Display, EnumDiscriminants};

/// A single node of a YAML document together with its comments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub value: Value,
    pub comments: Comments,
}

/// The three comment channels of a [`Node`]. An empty string means "no comment".
///
/// Comment text is stored without the leading `# ` marker, one line per comment line. Blank
/// lines inside a comment block are kept as empty lines.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Comments {
    /// Comment block directly above the node.
    pub head: String,

    /// Comment at the end of the node's line.
    pub line: String,

    /// Comment block directly below the node.
    pub foot: String,
}

impl Comments {
    pub fn is_empty(&self) -> bool {
        self.head.is_empty() && self.line.is_empty() && self.foot.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, EnumDiscriminants)]
#[strum_discriminants(name(NodeKind), derive(Display, Hash))]
pub enum Value {
    /// Ordered `(key, value)` pairs. Keys are unique.
    Mapping(Vec<(Node, Node)>),
    Sequence(Vec<Node>),
    Scalar(Scalar),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scalar {
    pub value: String,
    pub style: ScalarStyle,
}

/// How a scalar was (or should be) written. Only relevant for serialization, two scalars with
/// the same value but different styles are considered equal by the differ.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display)]
pub enum ScalarStyle {
    #[default]
    Plain,
    SingleQuoted,
    DoubleQuoted,
    Literal,
    Folded,
}

impl Node {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            comments: Comments::default(),
        }
    }

    pub fn mapping(entries: Vec<(Self, Self)>) -> Self {
        Self::new(Value::Mapping(entries))
    }

    pub fn empty_mapping() -> Self {
        Self::mapping(Vec::new())
    }

    pub fn sequence(items: Vec<Self>) -> Self {
        Self::new(Value::Sequence(items))
    }

    /// A scalar written exactly as given, without quotes.
    ///
    /// Use this for values which are meant to be read back with their YAML type, like numbers,
    /// booleans or `null`.
    pub fn plain(value: impl Into<String>) -> Self {
        Self::scalar(value, ScalarStyle::Plain)
    }

    /// A scalar which reads back as the given string.
    ///
    /// It is written plain when that is unambiguous and double-quoted otherwise, so `"true"` or
    /// `""` stay strings.
    pub fn string(value: impl Into<String>) -> Self {
        let value = value.into();
        let style = if is_unambiguous_plain_string(&value) {
            ScalarStyle::Plain
        } else {
            ScalarStyle::DoubleQuoted
        };
        Self::scalar(value, style)
    }

    pub fn scalar(value: impl Into<String>, style: ScalarStyle) -> Self {
        Self::new(Value::Scalar(Scalar {
            value: value.into(),
            style,
        }))
    }

    pub fn kind(&self) -> NodeKind {
        NodeKind::from(&self.value)
    }

    pub fn as_mapping(&self) -> Option<&[(Self, Self)]> {
        match &self.value {
            Value::Mapping(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Vec<(Self, Self)>> {
        match &mut self.value {
            Value::Mapping(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Self]> {
        match &self.value {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the value of a scalar node.
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::Scalar(scalar) => Some(&scalar.value),
            _ => None,
        }
    }

    /// Looks up the value stored under `key` if this is a mapping.
    pub fn get(&self, key: &str) -> Option<&Self> {
        self.as_mapping()?
            .iter()
            .find(|(k, _)| k.key_str() == key)
            .map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Self> {
        self.as_mapping_mut()?
            .iter_mut()
            .find(|(k, _)| k.key_str() == key)
            .map(|(_, v)| v)
    }

    /// Sets `key` to `value`, keeping the position (and key comments) of an existing entry.
    ///
    /// Does nothing if this is not a mapping.
    pub fn insert(&mut self, key: &str, value: Self) {
        let Some(entries) = self.as_mapping_mut() else {
            return;
        };
        match entries.iter_mut().find(|(k, _)| k.key_str() == key) {
            Some((_, existing)) => *existing = value,
            None => entries.push((Self::string(key), value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Self> {
        let entries = self.as_mapping_mut()?;
        let index = entries.iter().position(|(k, _)| k.key_str() == key)?;
        Some(entries.remove(index).1)
    }

    /// The string a key node is correlated by: the scalar value, or the canonical form of a
    /// complex key.
    pub fn key_str(&self) -> String {
        match &self.value {
            Value::Scalar(scalar) => scalar.value.clone(),
            _ => self.canonical_string(),
        }
    }

    /// Single-line representation of the node's content, ignoring comments and styles.
    ///
    /// Two nodes with the same canonical string hold the same data. Used to compare sequence
    /// items as set members.
    pub fn canonical_string(&self) -> String {
        let mut out = String::new();
        self.write_canonical(&mut out);
        out
    }

    fn write_canonical(&self, out: &mut String) {
        match &self.value {
            Value::Scalar(scalar) => out.push_str(&scalar.value),
            Value::Sequence(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_canonical(out);
                }
                out.push(']');
            }
            Value::Mapping(entries) => {
                out.push('{');
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    key.write_canonical(out);
                    out.push_str(": ");
                    value.write_canonical(out);
                }
                out.push('}');
            }
        }
    }

    /// Compares the data of two trees, ignoring comments, scalar styles and the order of
    /// mapping keys.
    pub fn structurally_eq(&self, other: &Self) -> bool {
        match (&self.value, &other.value) {
            (Value::Scalar(a), Value::Scalar(b)) => a.value == b.value,
            (Value::Sequence(a), Value::Sequence(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.structurally_eq(b))
            }
            (Value::Mapping(a), Value::Mapping(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(key, value)| {
                        other
                            .get(&key.key_str())
                            .is_some_and(|theirs| value.structurally_eq(theirs))
                    })
            }
            _ => false,
        }
    }
}

/// A structural position inside a tree.
///
/// The root is the empty path, mapping children append `/<key>` and sequence children append
/// `/<index>`. Nodes of two independently parsed trees correlate when their paths are equal.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodePath(String);

impl NodePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn key(&self, key: &str) -> Self {
        Self(format!("{}/{key}", self.0))
    }

    pub fn index(&self, index: usize) -> Self {
        Self(format!("{}/{index}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

const INDICATORS: &[char] = &[
    '-', '?', ':', ',', '[', ']', '{', '}', '#', '&', '*', '!', '|', '>', '\'', '"', '%', '@', '`',
];

/// Whether `value` can be written as a plain scalar without changing the document structure.
///
/// This says nothing about the type a reader infers (`1` stays a number), see
/// [`is_unambiguous_plain_string`] for that.
pub(crate) fn is_well_formed_plain(value: &str) -> bool {
    let Some(first) = value.chars().next() else {
        return false;
    };
    if value.trim() != value || value.contains(['\n', '\r', '\t']) {
        return false;
    }
    if value.contains(": ") || value.contains(" #") || value.ends_with(':') {
        return false;
    }
    if first == '-' {
        // `-1`, `-foo` are fine, `- foo` and `---` are not
        return value.len() > 1 && !value.starts_with("- ") && !value.starts_with("--");
    }
    if matches!(first, '?' | ':') {
        return value.len() > 1 && !value[1..].starts_with(' ');
    }
    !INDICATORS.contains(&first)
}

/// Whether `value` written as a plain scalar reads back as the string `value`.
pub(crate) fn is_unambiguous_plain_string(value: &str) -> bool {
    if !is_well_formed_plain(value) {
        return false;
    }
    let lower = value.to_ascii_lowercase();
    if matches!(
        lower.as_str(),
        "~" | "null" | "true" | "false" | "yes" | "no" | "on" | "off" | "y" | "n"
    ) {
        return false;
    }
    let looks_numeric = value.parse::<f64>().is_ok()
        || lower.starts_with("0x")
        || lower.starts_with("0o")
        || matches!(lower.as_str(), ".inf" | "-.inf" | "+.inf" | ".nan");
    !looks_numeric
}
