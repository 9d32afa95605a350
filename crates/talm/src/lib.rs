//! Reduces rendered machine configurations to minimal patches.
//!
//! A node's configuration is rendered twice: once for real ("target") and once with its
//! identity fields neutralized ("baseline"). The [`engine`] diffs both renderings and decorates
//! the resulting patch with the comments of the template fragments it was rendered from, so the
//! patch stays readable for humans.
pub mod cli;
pub mod config;
pub mod engine;
pub mod logging;
pub mod modeline;
