//! The render-and-reduce pipeline.
//!
//! Rendering itself happens outside of this module, behind [`ConfigRenderer`]. The engine takes
//! the rendered target and baseline, diffs them and layers the comments of every rendered
//! fragment onto the patch, one fragment at a time. Template sources are never parsed as YAML.
use snafu::{OptionExt, ResultExt, Snafu};
use talm_yamltools::{
    Node, comments, diff,
    emit::{self, EmitOptions},
};
use tracing::instrument;

pub mod baseline;

type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by a [`ConfigRenderer`], boxed so renderers can bring their own error types.
pub type RenderError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("a baseline rendering is required unless the full configuration is requested"))]
    MissingBaseline,

    #[snafu(display("failed to diff the target configuration against the baseline"))]
    Diff { source: diff::Error },

    #[snafu(display("failed to serialize the patch"))]
    SerializePatch { source: emit::Error },

    #[snafu(display("failed to render the target configuration"))]
    RenderTarget { source: RenderError },

    #[snafu(display("failed to render the baseline configuration"))]
    RenderBaseline { source: RenderError },

    #[snafu(display("failed to render the template fragments"))]
    RenderFragments { source: RenderError },
}

/// One rendered template file which contributed to a configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
    /// Used to identify the fragment in log messages, usually its template path.
    pub name: String,
    pub text: String,
}

impl Fragment {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReduceOptions {
    /// Return the complete target configuration instead of a patch.
    pub full: bool,

    /// Formatting of the patch document.
    pub emit: EmitOptions,
}

/// Produces configurations from templates, named by their path below the project root.
///
/// Implementations own everything the templates need (values, facts gathered from the node,
/// secrets) and hand it to the template engine explicitly.
pub trait ConfigRenderer {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Renders the configuration described by `templates`.
    fn render_target(&self, templates: &[String]) -> Result<String, Self::Error>;

    /// Renders the same configuration with neutral identity fields, see
    /// [`baseline::neutralize_identity`].
    fn render_baseline(&self, templates: &[String]) -> Result<String, Self::Error>;

    /// Renders every template on its own. The results only donate their comments to the patch,
    /// in the order they are returned.
    fn render_fragments(&self, templates: &[String]) -> Result<Vec<Fragment>, Self::Error>;
}

/// Reduces `target` to a patch against `baseline`, commented with the comments of `fragments`.
///
/// With [`ReduceOptions::full`] set, `target` is returned as it is. Otherwise both documents
/// must parse; fragments which fail to parse only lose their comments.
#[instrument(skip_all, fields(fragments = fragments.len(), full = options.full))]
pub fn reduce(
    fragments: &[Fragment],
    baseline: Option<&str>,
    target: &str,
    options: &ReduceOptions,
) -> Result<String> {
    if options.full {
        tracing::debug!("returning the full target configuration");
        return Ok(target.to_owned());
    }

    let baseline = baseline.context(MissingBaselineSnafu)?;
    let mut patch = diff::diff_documents(baseline, target)
        .context(DiffSnafu)?
        .unwrap_or_else(Node::empty_mapping);

    for fragment in fragments {
        let donor = match talm_yamltools::parse(&fragment.text) {
            Ok(donor) => donor,
            Err(error) => {
                tracing::warn!(
                    fragment = %fragment.name,
                    error = &error as &dyn std::error::Error,
                    "skipping comments of fragment which is not valid YAML"
                );
                continue;
            }
        };

        let captured = comments::capture(&donor);
        tracing::debug!(
            fragment = %fragment.name,
            comments = captured.len(),
            "applying fragment comments"
        );
        comments::apply(&mut patch, &captured);
    }

    emit::to_string(&patch, &options.emit).context(SerializePatchSnafu)
}

/// Renders the target and, if a patch is requested, the baseline and the fragments, then
/// reduces them.
pub fn render_and_reduce<R>(
    renderer: &R,
    templates: &[String],
    options: &ReduceOptions,
) -> Result<String>
where
    R: ConfigRenderer,
{
    let target = renderer
        .render_target(templates)
        .boxed()
        .context(RenderTargetSnafu)?;
    if options.full {
        return reduce(&[], None, &target, options);
    }

    let baseline = renderer
        .render_baseline(templates)
        .boxed()
        .context(RenderBaselineSnafu)?;
    let fragments = renderer
        .render_fragments(templates)
        .boxed()
        .context(RenderFragmentsSnafu)?;

    reduce(&fragments, Some(&baseline), &target, options)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use indoc::indoc;
    use rstest::rstest;

    use super::*;

    const BASELINE: &str = indoc! {"
        machine:
          type: unknown
          install:
            disk: /dev/sda
        cluster:
          clusterName: \"\"
    "};

    const TARGET: &str = indoc! {"
        machine:
          type: controlplane
          install:
            disk: /dev/nvme0n1
        cluster:
          clusterName: demo
    "};

    fn reduce_patch(fragments: &[Fragment], baseline: &str, target: &str) -> String {
        reduce(fragments, Some(baseline), target, &ReduceOptions::default())
            .expect("documents can be reduced")
    }

    #[test]
    fn patch_carries_fragment_comments() {
        let fragment = Fragment::new(
            "templates/controlplane.yaml",
            indoc! {"
                machine:
                  # Role of this node
                  type: controlplane
                  install:
                    disk: /dev/nvme0n1 # fastest disk
            "},
        );

        assert_eq!(
            reduce_patch(&[fragment], BASELINE, TARGET),
            indoc! {"
                machine:
                  # Role of this node
                  type: controlplane
                  install:
                    disk: /dev/nvme0n1 # fastest disk
                cluster:
                  clusterName: demo
            "}
        );
    }

    #[test]
    fn comments_of_later_fragments_are_appended() {
        let fragments = [
            Fragment::new("first", "# first\nmachine: {}\n"),
            Fragment::new("broken", "machine: [\n"),
            Fragment::new("second", "# second\nmachine: {}\n"),
        ];

        assert_eq!(
            reduce_patch(&fragments, "machine:\n  type: unknown\n", "machine:\n  type: worker\n"),
            indoc! {"
                # first

                # second
                machine:
                  type: worker
            "}
        );
    }

    #[rstest]
    #[case(BASELINE)]
    #[case("{}")]
    fn empty_patch_is_an_empty_mapping(#[case] document: &str) {
        assert_eq!(reduce_patch(&[], document, document), "{}\n");
    }

    #[test]
    fn full_output_is_the_target_verbatim() {
        let options = ReduceOptions {
            full: true,
            ..ReduceOptions::default()
        };
        let target = "# kept as is\nmachine: {type: worker}\n";

        assert_eq!(
            reduce(&[], None, target, &options).expect("full output never fails"),
            target
        );
    }

    #[rstest]
    #[case(None, TARGET, "MissingBaseline")]
    #[case(Some("machine: [\n"), TARGET, "Diff")]
    #[case(Some(BASELINE), "machine: \"open\n", "Diff")]
    fn fatal_errors(#[case] baseline: Option<&str>, #[case] target: &str, #[case] variant: &str) {
        let error = reduce(&[], baseline, target, &ReduceOptions::default())
            .expect_err("reduction must fail");
        assert!(
            format!("{error:?}").starts_with(variant),
            "unexpected error: {error:?}"
        );
    }

    #[derive(Debug, Snafu)]
    enum FakeError {
        #[snafu(display("renderer exploded"))]
        Exploded,
    }

    /// Renders a fragment per template with a comment naming it.
    struct FakeRenderer {
        baseline_renders: Cell<usize>,
        fragment_renders: Cell<usize>,
        fail_baseline: bool,
    }

    impl FakeRenderer {
        fn new(fail_baseline: bool) -> Self {
            Self {
                baseline_renders: Cell::new(0),
                fragment_renders: Cell::new(0),
                fail_baseline,
            }
        }
    }

    impl ConfigRenderer for FakeRenderer {
        type Error = FakeError;

        fn render_target(&self, _templates: &[String]) -> Result<String, Self::Error> {
            Ok(TARGET.to_owned())
        }

        fn render_baseline(&self, _templates: &[String]) -> Result<String, Self::Error> {
            self.baseline_renders.set(self.baseline_renders.get() + 1);
            if self.fail_baseline {
                return Err(FakeError::Exploded);
            }
            Ok(BASELINE.to_owned())
        }

        fn render_fragments(&self, templates: &[String]) -> Result<Vec<Fragment>, Self::Error> {
            self.fragment_renders.set(self.fragment_renders.get() + 1);
            Ok(templates
                .iter()
                .map(|template| {
                    Fragment::new(
                        template.as_str(),
                        format!("machine:\n  type: controlplane # from {template}\n"),
                    )
                })
                .collect())
        }
    }

    #[test]
    fn rendered_fragments_comment_the_patch() {
        let renderer = FakeRenderer::new(false);
        let templates = ["templates/a.yaml".to_owned(), "templates/b.yaml".to_owned()];

        let patch = render_and_reduce(&renderer, &templates, &ReduceOptions::default())
            .expect("rendering succeeds");
        assert!(
            patch.contains("type: controlplane # from templates/a.yaml # from templates/b.yaml\n"),
            "unexpected patch\n{patch}"
        );
    }

    #[test]
    fn baseline_is_only_rendered_for_patches() {
        let renderer = FakeRenderer::new(false);
        let full = ReduceOptions {
            full: true,
            ..ReduceOptions::default()
        };

        assert_eq!(
            render_and_reduce(&renderer, &[], &full).expect("rendering succeeds"),
            TARGET
        );
        assert_eq!(renderer.baseline_renders.get(), 0);
        assert_eq!(renderer.fragment_renders.get(), 0);

        let patch = render_and_reduce(&renderer, &[], &ReduceOptions::default())
            .expect("rendering succeeds");
        assert_eq!(renderer.baseline_renders.get(), 1);
        assert!(patch.contains("disk: /dev/nvme0n1"));
        assert!(!patch.contains("unknown"));
    }

    #[test]
    fn renderer_failures_are_fatal() {
        let renderer = FakeRenderer::new(true);
        let error = render_and_reduce(&renderer, &[], &ReduceOptions::default())
            .expect_err("rendering must fail");

        assert!(matches!(error, Error::RenderBaseline { .. }));
        assert_eq!(
            std::error::Error::source(&error).map(ToString::to_string),
            Some("renderer exploded".to_owned())
        );
    }
}
