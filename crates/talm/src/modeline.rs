//! The `# talm: ...` first line of node configuration files.
//!
//! A modeline records which nodes and endpoints a configuration file is meant for and which
//! templates it was rendered from:
//!
//! ```text
//! # talm: nodes=["192.168.100.2"], endpoints=["192.168.100.2"], templates=["templates/controlplane.yaml"]
//! ```
use std::{
    fmt,
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    str::FromStr,
};

use snafu::{OptionExt, ResultExt, Snafu};

pub const PREFIX: &str = "# talm: ";

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("modeline prefix {PREFIX:?} not found"))]
    MissingPrefix,

    #[snafu(display("invalid modeline part {part:?}, expected key=[...]"))]
    InvalidPart { part: String },

    #[snafu(display("failed to parse the JSON array of modeline key {key:?}"))]
    ParseValues {
        source: serde_json::Error,
        key: String,
    },

    #[snafu(display("failed to read the first line of {path:?}"))]
    ReadFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("{path:?} is empty"))]
    EmptyFile { path: PathBuf },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Modeline {
    pub nodes: Vec<String>,
    pub endpoints: Vec<String>,
    pub templates: Vec<String>,
}

impl Modeline {
    /// Parses the modeline on the first line of the file at `path`.
    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).context(ReadFileSnafu { path })?;
        let first_line = BufReader::new(file)
            .lines()
            .next()
            .context(EmptyFileSnafu { path })?
            .context(ReadFileSnafu { path })?;

        first_line.parse()
    }
}

impl FromStr for Modeline {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let content = line.trim().strip_prefix(PREFIX).context(MissingPrefixSnafu)?;

        let mut modeline = Self::default();
        for part in split_parts(content) {
            let (key, values) = part
                .trim()
                .split_once('=')
                .context(InvalidPartSnafu { part })?;
            let values: Vec<String> =
                serde_json::from_str(values).context(ParseValuesSnafu { key })?;

            match key {
                "nodes" => modeline.nodes = values,
                "endpoints" => modeline.endpoints = values,
                "templates" => modeline.templates = values,
                _ => tracing::debug!(key, "ignoring unknown modeline key"),
            }
        }
        Ok(modeline)
    }
}

impl fmt::Display for Modeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{PREFIX}nodes={}, endpoints={}, templates={}",
            serde_json::Value::from(self.nodes.clone()),
            serde_json::Value::from(self.endpoints.clone()),
            serde_json::Value::from(self.templates.clone()),
        )
    }
}

/// Splits at the commas which are not part of a JSON array.
fn split_parts(content: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0;

    for (index, c) in content.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '[' if !in_string => depth += 1,
            ']' if !in_string => depth = depth.saturating_sub(1),
            ',' if !in_string && depth == 0 => {
                parts.push(&content[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&content[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rstest::rstest;
    use tempfile::NamedTempFile;

    use super::*;

    #[rstest]
    #[case(
        r#"# talm: nodes=["192.168.100.2"], endpoints=["1.2.3.4","127.0.0.1","192.168.100.2"], templates=["templates/controlplane.yaml","templates/worker.yaml"]"#,
        Modeline {
            nodes: vec!["192.168.100.2".to_owned()],
            endpoints: vec!["1.2.3.4".to_owned(), "127.0.0.1".to_owned(), "192.168.100.2".to_owned()],
            templates: vec!["templates/controlplane.yaml".to_owned(), "templates/worker.yaml".to_owned()],
        }
    )]
    #[case(
        r#"# talm: nodes=["192.168.100.2"], endpoints=["1.2.3.4"], unknown=["value"]"#,
        Modeline {
            nodes: vec!["192.168.100.2".to_owned()],
            endpoints: vec!["1.2.3.4".to_owned()],
            templates: vec![],
        }
    )]
    #[case(
        r#"  # talm: templates=["a.yaml", "b, c.yaml"]  "#,
        Modeline {
            templates: vec!["a.yaml".to_owned(), "b, c.yaml".to_owned()],
            ..Modeline::default()
        }
    )]
    fn parses_modelines(#[case] line: &str, #[case] expected: Modeline) {
        assert_eq!(line.parse::<Modeline>().expect("modeline is valid"), expected);
    }

    #[rstest]
    #[case("nodes=[\"a\"]", "MissingPrefix")]
    #[case("# talm: nodes", "InvalidPart")]
    #[case("# talm: nodes=[\"a\"], endpoints", "InvalidPart")]
    #[case("# talm: nodes=a", "ParseValues")]
    #[case("# talm: nodes=[1]", "ParseValues")]
    fn rejects_invalid_modelines(#[case] line: &str, #[case] variant: &str) {
        let error = line.parse::<Modeline>().expect_err("modeline is invalid");
        assert!(
            format!("{error:?}").starts_with(variant),
            "unexpected error: {error:?}"
        );
    }

    #[test]
    fn generated_modelines_parse_back() {
        let modeline = Modeline {
            nodes: vec!["192.168.100.2".to_owned()],
            endpoints: vec![],
            templates: vec!["templates/controlplane.yaml".to_owned()],
        };
        let line = modeline.to_string();

        assert_eq!(
            line,
            r#"# talm: nodes=["192.168.100.2"], endpoints=[], templates=["templates/controlplane.yaml"]"#
        );
        assert_eq!(line.parse::<Modeline>().expect("modeline is valid"), modeline);
    }

    #[test]
    fn reads_the_first_line_of_a_file() {
        let mut file = NamedTempFile::new().expect("create temporary file");
        writeln!(file, r#"# talm: nodes=["node1"], templates=["templates/worker.yaml"]"#)
            .expect("write modeline");
        writeln!(file, "machine:\n  type: worker").expect("write configuration");

        let modeline = Modeline::read_from_file(file.path()).expect("modeline is valid");
        assert_eq!(modeline.nodes, ["node1"]);
        assert_eq!(modeline.templates, ["templates/worker.yaml"]);
    }

    #[test]
    fn empty_and_missing_files_are_errors() {
        let file = NamedTempFile::new().expect("create temporary file");
        assert!(matches!(
            Modeline::read_from_file(file.path()),
            Err(Error::EmptyFile { .. })
        ));

        let directory = tempfile::tempdir().expect("create temporary directory");
        assert!(matches!(
            Modeline::read_from_file(directory.path().join("missing.yaml")),
            Err(Error::ReadFile { .. })
        ));
    }
}
