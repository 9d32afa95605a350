//! This crate provides YAML node trees which keep their comments, and the
//! operations needed to reduce a rendered configuration to a patch:
//!
//! - [`parse`](mod@parse) reads a document into a [`Node`] tree on top of the lossless
//!   [`yaml_edit`] syntax tree,
//! - [`diff`] computes a deletion-aware patch between two trees,
//! - [`comments`] carries comments from one tree onto another by path,
//! - [`merge`] applies a patch the way its consumer does,
//! - [`emit`] writes a tree back out, comments included.
//!
//! ```
//! use talm_yamltools::{comments, diff, emit};
//!
//! let mut patch = diff::diff_documents("machine:\n  type: unknown\n", "machine:\n  type: worker\n")
//!     .expect("documents are valid YAML")
//!     .expect("documents differ");
//!
//! let fragment = talm_yamltools::parse("machine:\n  # role of the node\n  type: worker\n")
//!     .expect("fragment is valid YAML");
//! comments::copy(&fragment, &mut patch);
//!
//! let output = emit::to_string(&patch, &emit::EmitOptions::default())
//!     .expect("patch is serializable");
//! assert_eq!(output, "machine:\n  # role of the node\n  type: worker\n");
//! ```
pub mod comments;
pub mod diff;
pub mod emit;
pub mod merge;
pub mod node;
pub mod parse;

pub use crate::{
    node::{Comments, Node, NodeKind, NodePath, Scalar, ScalarStyle, Value},
    parse::parse,
};
