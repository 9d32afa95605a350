//! Reads YAML documents into [`Node`] trees, keeping comments.
//!
//! The syntax tree comes from [`yaml_edit`], which is lossless: every token of the input,
//! comments included, is part of it. The tree provides the structure and the source text of
//! each scalar, so plain scalars like `1.10` or `0x5dc` are kept exactly as written. Quoted and
//! block scalars are decoded with [`serde_yaml`].
//!
//! Comments are attached by their position, the way go-yaml does:
//!
//! - a comment block directly above an entry is its head comment,
//! - a comment after the content of a line is the line comment of that entry,
//! - a comment block directly below the last entry of a collection (indented at least as deep
//!   as the collection), or directly below an entry and followed by a blank line, is the foot
//!   comment of that entry,
//! - a comment block at the top of the document followed by a blank line is the head comment of
//!   the root node, trailing comments after a blank line are its foot comment.
//!
//! Anchors, aliases, tags, complex keys and multi-document streams are rejected.
use std::collections::BTreeMap;

use rowan::{NodeOrToken, ast::AstNode};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use yaml_edit::{Mapping, Scalar, Sequence, Yaml};

use crate::node::{Node, ScalarStyle, Value};

mod pending;

use pending::{PendingComments, Trivia, comment_text};

type Result<T, E = Error> = std::result::Result<T, E>;

type SyntaxNode = rowan::SyntaxNode<<Yaml as AstNode>::Language>;
type SyntaxToken = rowan::SyntaxToken<<Yaml as AstNode>::Language>;

/// Errors which can be encountered while reading a document. Line numbers are 1-based.
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("invalid YAML syntax"))]
    Syntax { source: yaml_edit::ParseError },

    #[snafu(display("line {line}: tabs are not allowed for indentation"))]
    TabIndentation { line: usize },

    #[snafu(display("line {line}: inconsistent indentation"))]
    BadIndentation { line: usize },

    #[snafu(display("line {line}: duplicate mapping key {key:?}"))]
    DuplicateKey { line: usize, key: String },

    #[snafu(display("line {line}: invalid mapping key {key:?}"))]
    InvalidKey { line: usize, key: String },

    #[snafu(display("line {line}: failed to decode scalar"))]
    DecodeScalar {
        source: serde_yaml::Error,
        line: usize,
    },

    #[snafu(display("line {line}: {feature} are not supported"))]
    Unsupported { line: usize, feature: &'static str },

    #[snafu(display("line {line}: unexpected content {content:?}"))]
    UnexpectedContent { line: usize, content: String },

    #[snafu(display("line {line}: multi-document streams are not supported"))]
    MultipleDocuments { line: usize },
}

/// Parses a single YAML document. An empty document yields an empty mapping.
pub fn parse(text: &str) -> Result<Node> {
    check_indentation(text)?;

    let yaml: Yaml = text.parse().context(SyntaxSnafu)?;
    let source = Source::new(text, yaml.syntax());
    source.check_coverage(text, yaml.syntax())?;
    source.check_supported(yaml.syntax())?;

    Reader {
        source,
        cursor: 0,
        pending: PendingComments::default(),
    }
    .read_document(&yaml)
}

fn check_indentation(text: &str) -> Result<()> {
    for (number, line) in text.lines().enumerate() {
        let content = line.trim_start_matches([' ', '\t']);
        let prefix = &line[..line.len() - content.len()];
        ensure!(
            content.is_empty() || content.starts_with('#') || !prefix.contains('\t'),
            TabIndentationSnafu { line: number + 1 }
        );
    }
    Ok(())
}

fn offset(range_start: rowan::TextSize) -> usize {
    usize::from(range_start)
}

fn indentation(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

/// Whether the token belongs to a scalar, whose text is content even if it looks like a
/// comment or an indicator.
fn inside_scalar(token: &SyntaxToken) -> bool {
    token
        .parent()
        .is_some_and(|parent| parent.ancestors().any(|node| Scalar::can_cast(node.kind())))
}

/// The value below a document, key, value or sequence entry.
enum Content {
    Mapping(Mapping),
    Sequence(Sequence),
    Scalar(Scalar),
}

impl Content {
    /// Empty scalars are skipped: the tree holds one in front of a nested collection when a
    /// comment follows the indicator.
    fn of(container: &SyntaxNode) -> Option<Self> {
        container
            .children()
            .filter_map(|child| {
                Mapping::cast(child.clone())
                    .map(Self::Mapping)
                    .or_else(|| Sequence::cast(child.clone()).map(Self::Sequence))
                    .or_else(|| Scalar::cast(child).map(Self::Scalar))
            })
            .find(|content| !content.is_empty_scalar())
    }

    fn syntax(&self) -> &SyntaxNode {
        match self {
            Self::Mapping(mapping) => mapping.syntax(),
            Self::Sequence(sequence) => sequence.syntax(),
            Self::Scalar(scalar) => scalar.syntax(),
        }
    }

    fn is_empty_scalar(&self) -> bool {
        matches!(self, Self::Scalar(scalar) if scalar.value().trim().is_empty())
    }

    fn is_block_collection(&self) -> bool {
        match self {
            Self::Scalar(_) => false,
            Self::Mapping(_) | Self::Sequence(_) => !self
                .syntax()
                .first_token()
                .is_some_and(|token| matches!(token.text(), "{" | "[")),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Line {
    Blank,
    /// Nothing but a comment.
    Comment {
        column: usize,
        text: String,
    },
    Content,
}

/// The input split into lines, with the comments of the syntax tree placed on them.
struct Source<'a> {
    /// Byte offset of the first character of each line.
    starts: Vec<usize>,
    texts: Vec<&'a str>,
    lines: Vec<Line>,
    /// Comments following content, by line.
    trailing: BTreeMap<usize, String>,
}

impl<'a> Source<'a> {
    fn new(text: &'a str, root: &SyntaxNode) -> Self {
        let mut starts = vec![0];
        starts.extend(
            text.match_indices('\n')
                .map(|(index, _)| index + 1)
                .filter(|start| *start < text.len()),
        );
        let texts: Vec<&str> = text.lines().collect();
        let lines = texts
            .iter()
            .map(|line| {
                if line.trim().is_empty() {
                    Line::Blank
                } else {
                    Line::Content
                }
            })
            .collect();

        let mut source = Self {
            starts,
            texts,
            lines,
            trailing: BTreeMap::new(),
        };

        let comments = root
            .descendants_with_tokens()
            .filter_map(NodeOrToken::into_token)
            .filter(|token| token.text().starts_with('#') && !inside_scalar(token));
        for token in comments {
            let (line, column) = source.position(offset(token.text_range().start()));
            let text = comment_text(token.text());
            let before = source.line_text(line).get(..column).unwrap_or_default();
            if !before.trim().is_empty() {
                source.trailing.insert(line, text);
            } else if let Some(slot) = source.lines.get_mut(line) {
                *slot = Line::Comment { column, text };
            }
        }
        source
    }

    /// Line and column of a byte offset, both 0-based.
    fn position(&self, offset: usize) -> (usize, usize) {
        let line = self
            .starts
            .partition_point(|start| *start <= offset)
            .saturating_sub(1);
        let start = self.starts.get(line).copied().unwrap_or_default();
        (line, offset - start)
    }

    fn start(&self, node: &SyntaxNode) -> (usize, usize) {
        self.position(offset(node.text_range().start()))
    }

    /// First and last line of a node.
    fn lines_of(&self, node: &SyntaxNode) -> (usize, usize) {
        let range = node.text_range();
        let start = offset(range.start());
        let end = offset(range.end()).saturating_sub(1).max(start);
        (self.position(start).0, self.position(end).0)
    }

    fn line_text(&self, line: usize) -> &'a str {
        self.texts.get(line).copied().unwrap_or_default()
    }

    fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// The last comment following content on the lines `first..=last`.
    fn line_comment(&self, first: usize, last: usize) -> String {
        self.trailing
            .range(first..=last)
            .next_back()
            .map(|(_, text)| text.clone())
            .unwrap_or_default()
    }

    /// The tree leaves out whatever its parser could not place.
    fn check_coverage(&self, text: &str, root: &SyntaxNode) -> Result<()> {
        let rest = text
            .get(offset(root.text_range().end())..)
            .unwrap_or_default()
            .trim_start();
        if rest.is_empty() {
            return Ok(());
        }
        let (line, _) = self.position(text.len() - rest.len());
        UnexpectedContentSnafu {
            line: line + 1,
            content: self.line_text(line).trim(),
        }
        .fail()
    }

    fn check_supported(&self, root: &SyntaxNode) -> Result<()> {
        for token in root
            .descendants_with_tokens()
            .filter_map(NodeOrToken::into_token)
        {
            let scalar = token
                .parent()
                .and_then(|parent| parent.ancestors().find(|node| Scalar::can_cast(node.kind())));
            // Only the first token of a plain scalar can be an indicator
            let leading = scalar
                .as_ref()
                .is_none_or(|scalar| scalar.first_token().as_ref() == Some(&token));
            let feature = match token.text().chars().next() {
                Some('&') if leading => "anchors",
                Some('*') if leading => "aliases",
                Some('!') if leading => "tags",
                Some('%') if scalar.is_none() => "directives",
                Some('?') if scalar.is_none() && token.text() == "?" => "complex mapping keys",
                _ => continue,
            };
            let (line, _) = self.position(offset(token.text_range().start()));
            return UnsupportedSnafu {
                line: line + 1,
                feature,
            }
            .fail();
        }
        Ok(())
    }

    /// A plain scalar keeps its source text, quoted scalars are decoded.
    fn scalar_node(&self, scalar: &Scalar) -> Result<Node> {
        let raw = scalar.value();
        let raw = raw.trim();
        let style = match raw.chars().next() {
            Some('"') => ScalarStyle::DoubleQuoted,
            Some('\'') => ScalarStyle::SingleQuoted,
            _ => return Ok(Node::plain(raw)),
        };
        let (line, _) = self.start(scalar.syntax());
        let value: String =
            serde_yaml::from_str(raw).context(DecodeScalarSnafu { line: line + 1 })?;
        Ok(Node::scalar(value, style))
    }

    /// The key of a mapping entry, and the line and column it starts at.
    fn entry_key(
        &self,
        mapping: &Mapping,
        key: Option<&SyntaxNode>,
        value: Option<&SyntaxNode>,
    ) -> Result<(Node, usize, usize)> {
        let anchor = key.or(value).unwrap_or_else(|| mapping.syntax());
        let (line, column) = self.start(anchor);
        match key.and_then(Content::of) {
            Some(Content::Scalar(scalar)) => Ok((self.scalar_node(&scalar)?, line, column)),
            Some(Content::Mapping(_) | Content::Sequence(_)) => UnsupportedSnafu {
                line: line + 1,
                feature: "complex mapping keys",
            }
            .fail(),
            None => InvalidKeySnafu {
                line: line + 1,
                key: anchor.text().to_string().trim().to_owned(),
            }
            .fail(),
        }
    }

    /// Flow collections are decoded as a whole, comments inside them are not kept.
    fn flow_node(&self, content: &Content) -> Result<Node> {
        match content {
            Content::Scalar(scalar) => self.scalar_node(scalar),
            Content::Sequence(sequence) => sequence
                .syntax()
                .children()
                .map(|entry| match Content::of(&entry) {
                    Some(item) => self.flow_node(&item),
                    None => Ok(Node::plain("")),
                })
                .collect::<Result<_>>()
                .map(Node::sequence),
            Content::Mapping(mapping) => {
                let mut entries: Vec<(Node, Node)> = Vec::new();
                for (key, value) in mapping.pairs() {
                    let (key, line, _) = self.entry_key(mapping, key.as_ref(), value.as_ref())?;
                    ensure_unique(&entries, &key, line)?;
                    let value = match value.as_ref().and_then(Content::of) {
                        Some(value) => self.flow_node(&value)?,
                        None => Node::plain(""),
                    };
                    entries.push((key, value));
                }
                Ok(Node::mapping(entries))
            }
        }
    }
}

fn ensure_unique(entries: &[(Node, Node)], key: &Node, line: usize) -> Result<()> {
    let name = key.key_str();
    ensure!(
        entries.iter().all(|(existing, _)| existing.key_str() != name),
        DuplicateKeySnafu {
            line: line + 1,
            key: name
        }
    );
    Ok(())
}

fn is_empty_value(node: &Node) -> bool {
    matches!(&node.value, Value::Scalar(scalar) if scalar.value.is_empty() && scalar.style == ScalarStyle::Plain)
}

/// The entries of one block mapping, all starting at `column`.
struct Level {
    column: usize,
    entries: Vec<(Node, Node)>,
}

impl Level {
    fn new(column: usize) -> Self {
        Self {
            column,
            entries: Vec::new(),
        }
    }
}

/// Walks the syntax tree top to bottom. Blank and comment lines are collected while moving past
/// them and handed out as head and foot comments once the node they belong to is known.
struct Reader<'a> {
    source: Source<'a>,
    /// The first line which has not been looked at yet.
    cursor: usize,
    pending: PendingComments,
}

impl Reader<'_> {
    fn read_document(mut self, yaml: &Yaml) -> Result<Node> {
        let mut documents = yaml.documents();
        let document = documents.next();
        if let Some(extra) = documents.find(|document| Content::of(document.syntax()).is_some()) {
            let (line, _) = self.source.start(extra.syntax());
            return MultipleDocumentsSnafu { line: line + 1 }.fail();
        }

        let content = document
            .as_ref()
            .and_then(|document| Content::of(document.syntax()));
        let Some(content) = content else {
            return Ok(self.finish(Node::empty_mapping()));
        };

        let (first, _) = self.source.start(content.syntax());
        let marker = document
            .as_ref()
            .and_then(|document| document.syntax().first_token())
            .filter(|token| token.text() == "---")
            .map(|token| self.source.position(offset(token.text_range().start())).0)
            .filter(|line| *line < first);
        if let Some(line) = marker {
            self.gather(line);
            if let Some(text) = self.source.trailing.get(&line) {
                self.pending.push(Trivia::Comment {
                    column: 0,
                    text: text.clone(),
                });
            }
            self.skip_to(line + 1);
        }
        self.gather(first);

        let detached = self.take_root_head();
        let mut root = if content.is_block_collection() {
            self.read_block(&content)?
        } else {
            let head = self.pending.take_text();
            let (mut node, line_comment) = self.read_inline(&content, 0)?;
            node.comments.head = head;
            node.comments.line = line_comment;
            node
        };
        if !detached.is_empty() {
            root.comments.head = detached;
        }
        Ok(self.finish(root))
    }

    /// Comments at the top of the document which are separated from the first node by a blank
    /// line describe the whole document.
    fn take_root_head(&mut self) -> String {
        if self.pending.has_comments() && self.pending.blank_after() {
            self.pending.take_text()
        } else {
            self.pending.take_detached()
        }
    }

    fn finish(mut self, mut root: Node) -> Node {
        self.gather(self.source.line_count());
        let foot = self.pending.take_text();
        if !foot.is_empty() {
            root.comments.foot = foot;
        }
        root
    }

    /// Collects the blank and comment lines up to `line` into the pending comments.
    fn gather(&mut self, line: usize) {
        let end = line.min(self.source.line_count());
        while self.cursor < end {
            match &self.source.lines[self.cursor] {
                Line::Blank => self.pending.push(Trivia::Blank),
                Line::Comment { column, text } => self.pending.push(Trivia::Comment {
                    column: *column,
                    text: text.clone(),
                }),
                Line::Content => {}
            }
            self.cursor += 1;
        }
    }

    fn gather_until_content(&mut self) {
        let next = (self.cursor..self.source.line_count())
            .find(|line| self.source.lines[*line] == Line::Content)
            .unwrap_or(self.source.line_count());
        self.gather(next);
    }

    fn skip_to(&mut self, line: usize) {
        self.cursor = self.cursor.max(line);
    }

    fn read_block(&mut self, content: &Content) -> Result<Node> {
        match content {
            Content::Mapping(mapping) => self.read_mapping(mapping),
            Content::Sequence(sequence) => self.read_sequence(sequence),
            Content::Scalar(scalar) => Ok(self.read_scalar(scalar, 0)?.0),
        }
    }

    fn read_mapping(&mut self, mapping: &Mapping) -> Result<Node> {
        // Entries below `key: # comment` end up next to that key in the tree instead of in its
        // value, so the nesting is rebuilt from the key columns
        let mut current = Level::new(self.source.start(mapping.syntax()).1);
        let mut parents: Vec<Level> = Vec::new();

        for (key, value) in mapping.pairs() {
            let (mut key, line, column) =
                self.source
                    .entry_key(mapping, key.as_ref(), value.as_ref())?;

            self.gather(line);
            while column < current.column {
                let parent = parents
                    .pop()
                    .context(BadIndentationSnafu { line: line + 1 })?;
                self.close_level(&mut current, parent);
            }
            if column > current.column {
                ensure!(
                    current
                        .entries
                        .last()
                        .is_some_and(|(_, value)| is_empty_value(value)),
                    BadIndentationSnafu { line: line + 1 }
                );
                parents.push(std::mem::replace(&mut current, Level::new(column)));
            }
            ensure_unique(&current.entries, &key, line)?;

            key.comments.head = self
                .pending
                .take_between(current.entries.last_mut().map(|(key, _)| key));

            let value = match value.as_ref().and_then(Content::of) {
                Some(content) if content.is_block_collection() => {
                    key.comments.line = self.source.line_comment(line, line);
                    self.skip_to(line + 1);
                    self.read_block(&content)?
                }
                Some(content) => {
                    let (value, line_comment) = self.read_inline(&content, column + 1)?;
                    key.comments.line = line_comment;
                    value
                }
                None => {
                    key.comments.line = self.source.line_comment(line, line);
                    self.skip_to(line + 1);
                    Node::plain("")
                }
            };
            current.entries.push((key, value));
        }

        self.gather_until_content();
        while let Some(parent) = parents.pop() {
            self.close_level(&mut current, parent);
        }
        Ok(self.finish_level(current))
    }

    /// Replaces `current` with `parent` and stores the finished mapping as the value of the
    /// last entry of `parent`.
    fn close_level(&mut self, current: &mut Level, parent: Level) {
        let nested = std::mem::replace(current, parent);
        let node = self.finish_level(nested);
        if let Some((_, value)) = current.entries.last_mut() {
            *value = node;
        }
    }

    fn finish_level(&mut self, mut level: Level) -> Node {
        if let Some((key, _)) = level.entries.last_mut() {
            if let Some(foot) = self.pending.take_foot(level.column) {
                key.comments.foot = foot;
            }
        }
        Node::mapping(level.entries)
    }

    fn read_sequence(&mut self, sequence: &Sequence) -> Result<Node> {
        let (_, column) = self.source.start(sequence.syntax());
        let mut items: Vec<Node> = Vec::new();

        for entry in sequence.syntax().children() {
            let (line, dash) = self.source.start(&entry);
            ensure!(dash == column, BadIndentationSnafu { line: line + 1 });

            self.gather(line);
            let head = self.pending.take_between(items.last_mut());

            let mut item = match Content::of(&entry) {
                Some(content) if content.is_block_collection() => {
                    if self.source.start(content.syntax()).0 > line {
                        let line_comment = self.source.line_comment(line, line);
                        self.skip_to(line + 1);
                        let mut item = self.read_block(&content)?;
                        item.comments.line = line_comment;
                        item
                    } else {
                        // `- key: value` starts the collection behind the dash
                        self.read_block(&content)?
                    }
                }
                Some(content) => {
                    let (mut item, line_comment) = self.read_inline(&content, column + 1)?;
                    item.comments.line = line_comment;
                    item
                }
                None => {
                    let mut item = Node::plain("");
                    item.comments.line = self.source.line_comment(line, line);
                    self.skip_to(line + 1);
                    item
                }
            };

            if !head.is_empty() {
                item.comments.head = head;
            }
            items.push(item);
        }

        self.gather_until_content();
        if let Some(item) = items.last_mut() {
            if let Some(foot) = self.pending.take_foot(column) {
                item.comments.foot = foot;
            }
        }
        Ok(Node::sequence(items))
    }

    /// Reads a scalar or flow collection, continuation lines of block scalars must be indented by
    /// at least `min_indent`.
    ///
    /// Returns the node and its line comment.
    fn read_inline(&mut self, content: &Content, min_indent: usize) -> Result<(Node, String)> {
        match content {
            Content::Scalar(scalar) => self.read_scalar(scalar, min_indent),
            Content::Mapping(_) | Content::Sequence(_) => {
                let (first, last) = self.source.lines_of(content.syntax());
                let node = self.source.flow_node(content)?;
                self.skip_to(last + 1);
                Ok((node, self.source.line_comment(first, last)))
            }
        }
    }

    fn read_scalar(&mut self, scalar: &Scalar, min_indent: usize) -> Result<(Node, String)> {
        if scalar.value().starts_with(['|', '>']) {
            return self.read_block_scalar(scalar, min_indent);
        }
        let (first, last) = self.source.lines_of(scalar.syntax());
        let node = self.source.scalar_node(scalar)?;
        self.skip_to(last + 1);
        Ok((node, self.source.line_comment(first, last)))
    }

    /// Block scalars are cut from the source lines: the first non-blank line fixes the content
    /// indentation, the first line indented less ends the scalar.
    fn read_block_scalar(&mut self, scalar: &Scalar, min_indent: usize) -> Result<(Node, String)> {
        let (line, column) = self.source.start(scalar.syntax());
        let header = self.source.line_text(line).get(column..).unwrap_or_default();
        let (header, line_comment) = match header.split_once('#') {
            Some((header, comment)) => (header.trim_end(), comment_text(comment)),
            None => (header.trim_end(), String::new()),
        };

        let style = if header.starts_with('|') {
            ScalarStyle::Literal
        } else {
            ScalarStyle::Folded
        };
        let chomping = if header.contains('-') {
            "-"
        } else if header.contains('+') {
            "+"
        } else {
            ""
        };
        let explicit_indent = header
            .chars()
            .find_map(|c| c.to_digit(10))
            .map(|digit| (min_indent + digit as usize).saturating_sub(1));

        let start = line + 1;
        let mut end = start;
        let mut content_indent = explicit_indent;
        while end < self.source.line_count() {
            let text = self.source.line_text(end);
            if !text.trim().is_empty() {
                let indent = indentation(text);
                if indent < content_indent.unwrap_or(min_indent) {
                    break;
                }
                content_indent.get_or_insert(indent);
            }
            end += 1;
        }
        self.skip_to(end);
        let Some(content_indent) = content_indent else {
            return Ok((Node::scalar("", style), line_comment));
        };

        // Re-indent the content to a fixed two spaces and let serde_yaml apply the chomping and
        // folding rules
        let mut body = String::new();
        let mut leading_space = None;
        for number in start..end {
            let text = self.source.line_text(number);
            if text.trim().is_empty() {
                body.push('\n');
                continue;
            }
            let content = text.get(content_indent..).unwrap_or_default();
            leading_space.get_or_insert(content.starts_with(' '));
            body.push_str("  ");
            body.push_str(content);
            body.push('\n');
        }
        let indicator = if leading_space == Some(true) { "2" } else { "" };
        let style_char = if style == ScalarStyle::Literal { '|' } else { '>' };
        let document = format!("{style_char}{indicator}{chomping}\n{body}");

        let value: String =
            serde_yaml::from_str(&document).context(DecodeScalarSnafu { line: line + 1 })?;
        Ok((Node::scalar(value, style), line_comment))
    }
}
