//! Project settings read from the `Chart.yaml` at the project root.
use std::path::{Path, PathBuf};

use serde::Deserialize;
use snafu::{ResultExt, Snafu};

/// The file holding the project settings, relative to the project root.
pub const PROJECT_FILE: &str = "Chart.yaml";

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read project file {path:?}"))]
    ReadProjectFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse project file {path:?}"))]
    ParseProjectFile {
        source: serde_yaml::Error,
        path: PathBuf,
    },
}

/// The parts of `Chart.yaml` which influence rendering. Everything else in the file is ignored.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(default)]
    pub template_options: TemplateOptions,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateOptions {
    /// Output complete configurations instead of patches.
    #[serde(default)]
    pub full: bool,
}

impl ProjectConfig {
    /// Loads `Chart.yaml` from `root`. A missing or empty file yields the defaults.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let path = root.as_ref().join(PROJECT_FILE);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "project file not found, using defaults");
                return Ok(Self::default());
            }
            Err(error) => return Err(error).context(ReadProjectFileSnafu { path }),
        };

        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents).context(ParseProjectFileSnafu { path })
    }
}
