//! Identity neutralization of baseline renderings.
//!
//! The baseline is generated with the node's real identity so it matches the target wherever
//! the templates do not touch it. The identity fields are then reset, which makes them show up
//! in every patch.
use snafu::{ResultExt, Snafu};
use talm_yamltools::{
    Node,
    emit::{self, EmitOptions},
    parse,
};

/// The machine type of a baseline, which no real node has.
pub const NEUTRAL_MACHINE_TYPE: &str = "unknown";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse the baseline configuration"))]
    ParseBaseline { source: parse::Error },

    #[snafu(display("failed to serialize the neutralized baseline configuration"))]
    SerializeBaseline { source: emit::Error },
}

/// Resets `machine.type`, `cluster.clusterName` and `cluster.controlPlane.endpoint`.
///
/// Only existing `machine` and `cluster` mappings are changed. A missing (or non-mapping)
/// `cluster.controlPlane` is replaced by a mapping holding the endpoint.
pub fn neutralize_identity(config: &mut Node) {
    if let Some(machine) = config.get_mut("machine") {
        machine.insert("type", Node::string(NEUTRAL_MACHINE_TYPE));
    }

    let Some(cluster) = config
        .get_mut("cluster")
        .filter(|cluster| cluster.as_mapping().is_some())
    else {
        return;
    };
    cluster.insert("clusterName", Node::string(""));
    if cluster
        .get("controlPlane")
        .is_none_or(|control_plane| control_plane.as_mapping().is_none())
    {
        cluster.insert("controlPlane", Node::empty_mapping());
    }
    if let Some(control_plane) = cluster.get_mut("controlPlane") {
        control_plane.insert("endpoint", Node::string(""));
    }
}

/// Applies [`neutralize_identity`] to a rendered document.
pub fn neutralize_text(config: &str) -> Result<String, Error> {
    let mut node = parse(config).context(ParseBaselineSnafu)?;
    neutralize_identity(&mut node);
    emit::to_string(&node, &EmitOptions::default()).context(SerializeBaselineSnafu)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;

    #[test]
    fn resets_identity_fields() {
        let neutral = neutralize_text(indoc! {"
            version: v1alpha1
            machine:
              type: controlplane
              token: abc.def
            cluster:
              clusterName: demo
              controlPlane:
                endpoint: https://192.168.100.10:6443
              network:
                dnsDomain: cluster.local
        "})
        .expect("baseline is valid YAML");

        assert_eq!(
            neutral,
            indoc! {"
                version: v1alpha1
                machine:
                  type: unknown
                  token: abc.def
                cluster:
                  clusterName: \"\"
                  controlPlane:
                    endpoint: \"\"
                  network:
                    dnsDomain: cluster.local
            "}
        );
    }

    #[rstest]
    #[case(
        "cluster:\n  clusterName: demo\n",
        "cluster:\n  clusterName: \"\"\n  controlPlane:\n    endpoint: \"\"\n"
    )]
    #[case(
        "cluster:\n  controlPlane: https://old\n",
        "cluster:\n  controlPlane:\n    endpoint: \"\"\n  clusterName: \"\"\n"
    )]
    #[case("machine:\n  install: {}\n", "machine:\n  install: {}\n  type: unknown\n")]
    #[case("cluster: disabled\nmachine: []\n", "cluster: disabled\nmachine: []\n")]
    #[case("other: 1\n", "other: 1\n")]
    fn only_existing_sections_are_touched(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(
            neutralize_text(input).expect("baseline is valid YAML"),
            expected
        );
    }

    #[test]
    fn invalid_baselines_are_rejected() {
        assert!(matches!(
            neutralize_text("machine: [\n"),
            Err(Error::ParseBaseline { .. })
        ));
    }
}
