//! Command line interface of the `talm` binary.
//!
//! `talm template` reduces a rendered node configuration to a patch against a rendered
//! baseline, commented with the rendered template fragments it was assembled from:
//!
//! ```console
//! $ talm template --file nodes/node1.yaml --target rendered.yaml --baseline baseline.yaml \
//!     --fragments rendered/
//! ```
use std::{io::Write, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use snafu::{OptionExt, ResultExt, Snafu};

use crate::{
    config::ProjectConfig,
    engine::{self, ConfigRenderer, Fragment, ReduceOptions, baseline},
    modeline::{self, Modeline},
};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read the modeline of node file {path:?}"))]
    ReadModeline {
        source: modeline::Error,
        path: PathBuf,
    },

    #[snafu(display("no templates given, pass them as arguments or via the modeline of --file"))]
    NoTemplates,

    #[snafu(display("failed to load the project configuration"))]
    LoadProjectConfig { source: crate::config::Error },

    #[snafu(display("failed to reduce the node configuration"))]
    Reduce { source: engine::Error },

    #[snafu(display("failed to write node file {path:?}"))]
    WriteNodeFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to write the configuration to stdout"))]
    WriteStdout { source: std::io::Error },
}

#[derive(Debug, Snafu)]
pub enum RenderError {
    #[snafu(display("failed to read rendered configuration {path:?}"))]
    ReadRendered {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("no baseline rendering given, pass --baseline or request --full output"))]
    NoBaselineFile,

    #[snafu(display("failed to neutralize the identity of baseline {path:?}"))]
    Neutralize {
        source: baseline::Error,
        path: PathBuf,
    },
}

#[derive(Debug, Parser)]
#[command(name = "talm", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Reduce a rendered node configuration to a commented patch.
    Template(TemplateArguments),
}

#[derive(Debug, Args)]
pub struct TemplateArguments {
    /// Project root, holding `Chart.yaml`.
    #[arg(long, env = "TALM_ROOT", value_name = "DIR", default_value = ".")]
    pub root: PathBuf,

    /// Node configuration file whose modeline lists the templates to use.
    #[arg(long, short = 'f', value_name = "NODE_FILE")]
    pub file: Option<PathBuf>,

    /// Write the result back to the node file instead of stdout.
    #[arg(long, short = 'i', requires = "file")]
    pub in_place: bool,

    /// Output the complete configuration instead of a patch.
    #[arg(long)]
    pub full: bool,

    /// The rendered configuration of the node.
    #[arg(long, value_name = "FILE")]
    pub target: PathBuf,

    /// The rendered baseline configuration, required unless the full configuration is requested.
    #[arg(long, value_name = "FILE")]
    pub baseline: Option<PathBuf>,

    /// Use the baseline as it is, without resetting its identity fields.
    #[arg(long)]
    pub keep_identity: bool,

    /// Directory holding each template rendered on its own, at the template's path. Their
    /// comments decorate the patch. Without it the patch carries no template comments.
    #[arg(long, value_name = "DIR")]
    pub fragments: Option<PathBuf>,

    /// Templates the configuration was rendered from, relative to the project root.
    /// Defaults to the templates listed in the modeline of the node file.
    #[arg(value_name = "TEMPLATE")]
    pub templates: Vec<String>,
}

impl TemplateArguments {
    /// Renders the configuration and writes it to the node file or stdout.
    pub fn run(&self) -> Result<()> {
        let output = self.render()?;

        match (&self.file, self.in_place) {
            (Some(path), true) => {
                std::fs::write(path, output).context(WriteNodeFileSnafu { path })?;
                tracing::info!(path = %path.display(), "updated node file");
                Ok(())
            }
            _ => std::io::stdout()
                .lock()
                .write_all(output.as_bytes())
                .context(WriteStdoutSnafu),
        }
    }

    /// Renders the configuration, prefixed with the node file's modeline if one is given.
    pub fn render(&self) -> Result<String> {
        let node_modeline = self
            .file
            .as_ref()
            .map(|path| Modeline::read_from_file(path).context(ReadModelineSnafu { path }))
            .transpose()?;

        let templates = if self.templates.is_empty() {
            node_modeline
                .as_ref()
                .map(|modeline| modeline.templates.clone())
                .filter(|templates| !templates.is_empty())
                .context(NoTemplatesSnafu)?
        } else {
            self.templates.clone()
        };

        let project = ProjectConfig::load(&self.root).context(LoadProjectConfigSnafu)?;
        let options = ReduceOptions {
            full: self.full || project.template_options.full,
            ..ReduceOptions::default()
        };

        let renderer = PreRenderedFiles {
            target: self.target.clone(),
            baseline: self.baseline.clone(),
            fragments: self.fragments.clone(),
            keep_identity: self.keep_identity,
        };
        let configuration =
            engine::render_and_reduce(&renderer, &templates, &options).context(ReduceSnafu)?;

        Ok(match node_modeline {
            Some(node_modeline) => {
                let modeline = Modeline {
                    templates,
                    ..node_modeline
                };
                format!("{modeline}\n{configuration}")
            }
            None => configuration,
        })
    }
}

/// Configurations rendered ahead of time by the template engine, read from disk.
#[derive(Clone, Debug)]
pub struct PreRenderedFiles {
    pub target: PathBuf,
    pub baseline: Option<PathBuf>,

    /// Rendered fragments, found at the path of their template below this directory.
    pub fragments: Option<PathBuf>,

    /// Skip [`baseline::neutralize_text`] for baselines which are already neutral.
    pub keep_identity: bool,
}

impl ConfigRenderer for PreRenderedFiles {
    type Error = RenderError;

    fn render_target(&self, _templates: &[String]) -> Result<String, RenderError> {
        std::fs::read_to_string(&self.target).context(ReadRenderedSnafu { path: &self.target })
    }

    fn render_baseline(&self, _templates: &[String]) -> Result<String, RenderError> {
        let path = self.baseline.as_ref().context(NoBaselineFileSnafu)?;
        let rendered = std::fs::read_to_string(path).context(ReadRenderedSnafu { path })?;

        if self.keep_identity {
            return Ok(rendered);
        }
        baseline::neutralize_text(&rendered).context(NeutralizeSnafu { path })
    }

    fn render_fragments(&self, templates: &[String]) -> Result<Vec<Fragment>, RenderError> {
        let Some(directory) = &self.fragments else {
            tracing::debug!("no rendered fragments given, the patch carries no template comments");
            return Ok(Vec::new());
        };

        templates
            .iter()
            .map(|template| {
                let path = directory.join(template);
                let text = std::fs::read_to_string(&path).context(ReadRenderedSnafu { path })?;
                Ok(Fragment::new(template.as_str(), text))
            })
            .collect()
    }
}
