//! Writes [`Node`] trees as block-style YAML, including their comments.
use std::io::Write;

use snafu::{ResultExt, Snafu, ensure};

use crate::{
    comments::merge_comments,
    node::{Node, NodeKind, Scalar, ScalarStyle, Value, is_well_formed_plain},
};

type Result<T, E = Error> = std::result::Result<T, E>;

/// Represents every error which can be encountered during YAML serialization.
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("mapping keys must be scalars, found a {kind}"))]
    ComplexKey { kind: NodeKind },

    #[snafu(display("indentation must be between 2 and 9 spaces, got {indent}"))]
    InvalidIndent { indent: usize },

    #[snafu(display("failed to encode double-quoted scalar"))]
    EncodeScalar { source: serde_json::Error },

    #[snafu(display("failed to write YAML document separator"))]
    WriteDocumentSeparator { source: std::io::Error },

    #[snafu(display("failed to write YAML"))]
    WriteYaml { source: std::io::Error },
}

/// Provides configurable options during YAML serialization.
///
/// The default writes two-space indentation without a leading document separator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmitOptions {
    /// Spaces per nesting level of mappings and of sequences below a key.
    pub indent: usize,

    /// Adds leading triple dashes (`---`) to the output string.
    pub explicit_document: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            indent: 2,
            explicit_document: false,
        }
    }
}

/// Serializes `node` as a YAML document.
pub fn to_string(node: &Node, options: &EmitOptions) -> Result<String> {
    ensure!(
        (2..=9).contains(&options.indent),
        InvalidIndentSnafu {
            indent: options.indent
        }
    );

    let mut emitter = Emitter {
        out: String::new(),
        step: options.indent,
    };
    emitter.document(node)?;
    Ok(emitter.out)
}

/// Serializes `node` and writes it to a [`Writer`](Write).
pub fn serialize<W>(node: &Node, mut writer: W, options: &EmitOptions) -> Result<()>
where
    W: Write,
{
    if options.explicit_document {
        writer
            .write_all(b"---\n")
            .context(WriteDocumentSeparatorSnafu)?;
    }
    let options = EmitOptions {
        explicit_document: false,
        ..options.clone()
    };
    writer
        .write_all(to_string(node, &options)?.as_bytes())
        .context(WriteYamlSnafu)
}

struct Emitter {
    out: String,
    step: usize,
}

impl Emitter {
    fn document(&mut self, root: &Node) -> Result<()> {
        if !root.comments.head.is_empty() {
            self.comment_block(&root.comments.head, 0);
            self.out.push('\n');
        }

        match &root.value {
            Value::Mapping(entries) if !entries.is_empty() => self.mapping(entries, 0)?,
            Value::Sequence(items) if !items.is_empty() => self.sequence(items, 0)?,
            _ => {
                self.inline_value(root)?;
                self.out.push_str(&line_comment(&root.comments.line));
                self.out.push('\n');
            }
        }

        if !root.comments.foot.is_empty() {
            self.out.push('\n');
            self.comment_block(&root.comments.foot, 0);
        }
        Ok(())
    }

    fn mapping(&mut self, entries: &[(Node, Node)], indent: usize) -> Result<()> {
        for (i, (key, value)) in entries.iter().enumerate() {
            self.comment_block(&key.comments.head, indent);
            pad(&mut self.out, indent);
            self.out.push_str(&key_text(key)?);
            self.out.push(':');

            let comment = merge_comments(&key.comments.line, &value.comments.line);
            self.value_after_indicator(value, &comment, indent + self.step, self.step)?;

            if !key.comments.foot.is_empty() {
                self.comment_block(&key.comments.foot, indent);
                if i + 1 < entries.len() {
                    self.out.push('\n');
                }
            }
        }
        Ok(())
    }

    fn sequence(&mut self, items: &[Node], indent: usize) -> Result<()> {
        for (i, item) in items.iter().enumerate() {
            self.comment_block(&item.comments.head, indent);
            pad(&mut self.out, indent);
            self.out.push('-');

            let compact = item.comments.line.is_empty()
                && match &item.value {
                    Value::Mapping(entries) => entries
                        .first()
                        .is_some_and(|(key, _)| key.comments.head.is_empty()),
                    Value::Sequence(items) => items
                        .first()
                        .is_some_and(|first| first.comments.head.is_empty()),
                    Value::Scalar(_) => false,
                };

            if compact {
                // Write the nested collection at its own column and pull its first line up
                // behind the dash
                let mut nested = Self {
                    out: String::new(),
                    step: self.step,
                };
                match &item.value {
                    Value::Mapping(entries) => nested.mapping(entries, indent + 2)?,
                    Value::Sequence(items) => nested.sequence(items, indent + 2)?,
                    Value::Scalar(_) => {}
                }
                self.out.push(' ');
                self.out.push_str(&nested.out[indent + 2..]);
            } else {
                self.value_after_indicator(item, &item.comments.line, indent + 2, 2)?;
            }

            if !item.comments.foot.is_empty() {
                self.comment_block(&item.comments.foot, indent);
                if i + 1 < items.len() {
                    self.out.push('\n');
                }
            }
        }
        Ok(())
    }

    /// Writes whatever follows `key:` or `-`, up to and including the line break of the last
    /// line of the value. `nested` is the column of block content below the indicator,
    /// `relative` its distance to the indicator's own column.
    fn value_after_indicator(
        &mut self,
        value: &Node,
        comment: &str,
        nested: usize,
        relative: usize,
    ) -> Result<()> {
        match &value.value {
            Value::Mapping(entries) if !entries.is_empty() => {
                self.out.push_str(&line_comment(comment));
                self.out.push('\n');
                self.mapping(entries, nested)
            }
            Value::Sequence(items) if !items.is_empty() => {
                self.out.push_str(&line_comment(comment));
                self.out.push('\n');
                self.sequence(items, nested)
            }
            Value::Scalar(scalar) if is_block(scalar) => {
                self.out.push(' ');
                self.block_scalar(scalar, comment, nested, relative);
                Ok(())
            }
            _ => {
                let start = self.out.len();
                self.out.push(' ');
                self.inline_value(value)?;
                if self.out.len() == start + 1 {
                    // Empty plain scalar, keep `key:` without a trailing space
                    self.out.truncate(start);
                }
                self.out.push_str(&line_comment(comment));
                self.out.push('\n');
                Ok(())
            }
        }
    }

    /// Writes a scalar or an empty collection on the current line.
    fn inline_value(&mut self, node: &Node) -> Result<()> {
        match &node.value {
            Value::Mapping(_) => self.out.push_str("{}"),
            Value::Sequence(_) => self.out.push_str("[]"),
            Value::Scalar(scalar) => self.out.push_str(&scalar_text(scalar)?),
        }
        Ok(())
    }

    /// Writes a literal block scalar whose content lines start at column `indent`.
    fn block_scalar(&mut self, scalar: &Scalar, comment: &str, indent: usize, relative: usize) {
        let content = scalar.value.trim_end_matches('\n');
        let chomping = match scalar.value.len() - content.len() {
            0 => "-",
            1 => "",
            _ => "+",
        };

        self.out.push('|');
        if content.starts_with(' ') {
            self.out.push_str(&relative.to_string());
        }
        self.out.push_str(chomping);
        self.out.push_str(&line_comment(comment));
        self.out.push('\n');

        for line in content.split('\n') {
            if !line.is_empty() {
                pad(&mut self.out, indent);
                self.out.push_str(line);
            }
            self.out.push('\n');
        }
        for _ in 1..scalar.value.len() - content.len() {
            self.out.push('\n');
        }
    }

    fn comment_block(&mut self, text: &str, indent: usize) {
        for line in text.lines() {
            if !line.is_empty() {
                pad(&mut self.out, indent);
                self.out.push_str("# ");
                self.out.push_str(line);
            }
            self.out.push('\n');
        }
    }
}

fn pad(out: &mut String, indent: usize) {
    out.extend(std::iter::repeat_n(' ', indent));
}

fn line_comment(text: &str) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.is_empty()).collect();
    if lines.is_empty() {
        String::new()
    } else {
        format!(" # {}", lines.join(" # "))
    }
}

/// Whether a scalar is written as a `|` block.
fn is_block(scalar: &Scalar) -> bool {
    matches!(scalar.style, ScalarStyle::Literal | ScalarStyle::Folded)
        && !scalar.value.trim_end_matches('\n').is_empty()
        && !scalar
            .value
            .chars()
            .any(|c| c.is_control() && c != '\n' && c != '\t')
}

fn key_text(key: &Node) -> Result<String> {
    match &key.value {
        Value::Scalar(scalar) => match scalar.style {
            ScalarStyle::Plain | ScalarStyle::SingleQuoted => scalar_text(scalar),
            _ => double_quoted(&scalar.value),
        },
        _ => ComplexKeySnafu { kind: key.kind() }.fail(),
    }
}

fn scalar_text(scalar: &Scalar) -> Result<String> {
    let value = &scalar.value;
    match scalar.style {
        ScalarStyle::Plain if value.is_empty() || is_well_formed_plain(value) => Ok(value.clone()),
        ScalarStyle::SingleQuoted if !value.contains(['\n', '\r']) => {
            Ok(format!("'{}'", value.replace('\'', "''")))
        }
        _ => double_quoted(value),
    }
}

/// JSON strings are valid YAML double-quoted scalars.
fn double_quoted(value: &str) -> Result<String> {
    serde_json::to_string(value).context(EncodeScalarSnafu)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;
    use crate::parse::parse;

    fn emit(node: &Node) -> String {
        to_string(node, &EmitOptions::default()).expect("node can be serialized")
    }

    fn reformat(text: &str) -> String {
        emit(&parse(text).expect("test YAML is valid"))
    }

    #[test]
    fn block_structure() {
        let input = indoc! {"
            machine:
              type: controlplane
              certSANs:
                - 10.0.0.1
                - example.org
              network:
                interfaces:
                  - interface: eth0
                    addresses:
                      - 192.168.0.2/24
                  - deviceSelector:
                      driver: virtio
                nameservers: []
              kubelet: {}
            cluster:
              clusterName: \"\"
              note: 'quoted'
              empty:
        "};

        assert_eq!(reformat(input), input);
    }

    #[test]
    fn comments_round_trip() {
        let input = indoc! {"
            # Document header

            # About machine
            machine: # machine line
              # About type
              type: worker # type line
              # Foot of type
            cluster:
              name: demo
            # Trailing about cluster

            last: true

            # Document footer
        "};

        assert_eq!(reformat(input), input);
    }

    #[rstest]
    #[case(Node::plain("worker"), "type: worker # from key # from value\n")]
    #[case(
        Node::mapping(vec![(Node::plain("disk"), Node::plain("/dev/sda"))]),
        "type: # from key # from value\n  disk: /dev/sda\n"
    )]
    fn key_and_value_line_comments_are_merged(#[case] mut value: Node, #[case] expected: &str) {
        let mut key = Node::plain("type");
        key.comments.line = "from key".to_owned();
        value.comments.line = "from value".to_owned();

        assert_eq!(emit(&Node::mapping(vec![(key, value)])), expected);
    }

    #[test]
    fn sequences_under_keys_are_indented() {
        let input = indoc! {"
            podSubnets:
            - 10.244.0.0/16
            serviceSubnets: [10.96.0.0/12]
        "};

        assert_eq!(
            reformat(input),
            indoc! {"
                podSubnets:
                  - 10.244.0.0/16
                serviceSubnets:
                  - 10.96.0.0/12
            "}
        );
    }

    #[rstest]
    #[case("key: |\n  line one\n  line two\n")]
    #[case("key: |-\n  no newline\n")]
    #[case("key: |+\n  kept\n\n")]
    #[case("key: |2-\n    indented first\n  second\n")]
    #[case("items:\n  - |\n    in a sequence\n")]
    fn block_scalars_round_trip(#[case] input: &str) {
        assert_eq!(reformat(input), input);
    }

    #[test]
    fn folded_scalars_are_written_literally() {
        assert_eq!(reformat("key: >\n  folded\n  text\n"), "key: |\n  folded text\n");
    }

    #[rstest]
    #[case(Node::string("true"), "\"true\"\n")]
    #[case(Node::string(""), "\"\"\n")]
    #[case(Node::plain("a: b"), "\"a: b\"\n")]
    #[case(Node::scalar("multi\nline", ScalarStyle::SingleQuoted), "\"multi\\nline\"\n")]
    #[case(Node::plain("1.30"), "1.30\n")]
    #[case(Node::empty_mapping(), "{}\n")]
    #[case(Node::sequence(vec![]), "[]\n")]
    fn scalars_and_empty_documents(#[case] node: Node, #[case] expected: &str) {
        assert_eq!(emit(&node), expected);
    }

    #[test]
    fn wider_indentation() {
        let node = parse("a:\n  b:\n    - c\n").expect("test YAML is valid");
        let options = EmitOptions {
            indent: 4,
            explicit_document: true,
        };
        let mut buffer = Vec::new();
        serialize(&node, &mut buffer, &options).expect("node can be serialized");
        assert_eq!(
            String::from_utf8(buffer).expect("output is UTF-8"),
            "---\na:\n    b:\n        - c\n"
        );
    }

    #[test]
    fn complex_keys_are_rejected() {
        let node = Node::mapping(vec![(Node::sequence(vec![]), Node::plain("x"))]);
        assert!(matches!(
            to_string(&node, &EmitOptions::default()),
            Err(Error::ComplexKey {
                kind: NodeKind::Sequence
            })
        ));
    }

    #[test]
    fn invalid_indentation_is_rejected() {
        let options = EmitOptions {
            indent: 1,
            ..EmitOptions::default()
        };
        assert!(matches!(
            to_string(&Node::empty_mapping(), &options),
            Err(Error::InvalidIndent { indent: 1 })
        ));
    }
}
