//! Blank and comment lines waiting to be attached to a node.

/// A line without content.
#[derive(Debug)]
pub(super) enum Trivia {
    Blank,
    Comment { column: usize, text: String },
}

#[derive(Debug, Default)]
pub(super) struct PendingComments(Vec<Trivia>);

impl PendingComments {
    pub(super) fn push(&mut self, trivia: Trivia) {
        self.0.push(trivia);
    }

    pub(super) fn has_comments(&self) -> bool {
        self.0.iter().any(|t| matches!(t, Trivia::Comment { .. }))
    }

    /// A blank line separates the comments from the content above.
    fn blank_before(&self) -> bool {
        matches!(self.0.first(), Some(Trivia::Blank))
    }

    /// A blank line separates the comments from the content below.
    pub(super) fn blank_after(&self) -> bool {
        matches!(self.0.last(), Some(Trivia::Blank))
    }

    /// Takes all pending comments as one text. Blank lines inside the block are kept as a
    /// single empty line, blank lines around it are dropped.
    pub(super) fn take_text(&mut self) -> String {
        render(&std::mem::take(&mut self.0))
    }

    /// Takes the comments above the last blank line, leaving the block directly above the next
    /// content pending.
    pub(super) fn take_detached(&mut self) -> String {
        let last_comment = self
            .0
            .iter()
            .rposition(|t| matches!(t, Trivia::Comment { .. }));
        let Some(last_comment) = last_comment else {
            return String::new();
        };
        let Some(split) = self.0[..last_comment]
            .iter()
            .rposition(|t| matches!(t, Trivia::Blank))
        else {
            return String::new();
        };
        let rest = self.0.split_off(split);
        render(&std::mem::replace(&mut self.0, rest))
    }

    /// Takes the comments directly following the last entry of a collection at `indent`, which
    /// form that entry's foot comment.
    pub(super) fn take_foot(&mut self, indent: usize) -> Option<String> {
        if !self.has_comments() || self.blank_before() {
            return None;
        }
        let mut split = self
            .0
            .iter()
            .position(|t| matches!(t, Trivia::Comment { column, .. } if *column < indent))
            .unwrap_or(self.0.len());
        while split > 0 && matches!(self.0[split - 1], Trivia::Blank) {
            split -= 1;
        }
        let rest = self.0.split_off(split);
        let foot = render(&std::mem::replace(&mut self.0, rest));
        (!foot.is_empty()).then_some(foot)
    }

    /// Decides where the comments above the next sibling belong: a block directly below the
    /// previous sibling and followed by a blank line is its foot, the rest is the head of the
    /// next sibling.
    pub(super) fn take_between(&mut self, previous: Option<&mut crate::node::Node>) -> String {
        let Some(previous) = previous else {
            return self.take_text();
        };
        if self.blank_before() || !self.has_comments() {
            return self.take_text();
        }
        let Some(split) = self.0.iter().position(|t| matches!(t, Trivia::Blank)) else {
            return self.take_text();
        };

        let rest = self.0.split_off(split);
        let foot = render(&std::mem::replace(&mut self.0, rest));
        if previous.comments.foot.is_empty() {
            previous.comments.foot = foot;
        } else {
            previous.comments.foot = format!("{}\n{foot}", previous.comments.foot);
        }
        self.take_text()
    }
}

fn render(trivia: &[Trivia]) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for t in trivia {
        match t {
            Trivia::Comment { text, .. } => lines.push(text),
            Trivia::Blank => {
                if lines.last().is_some_and(|l| !l.is_empty()) {
                    lines.push("");
                }
            }
        }
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

/// Strips the `#` and the single space conventionally following it.
pub(super) fn comment_text(raw: &str) -> String {
    let raw = raw.strip_prefix('#').unwrap_or(raw);
    raw.strip_prefix(' ').unwrap_or(raw).trim_end().to_owned()
}
