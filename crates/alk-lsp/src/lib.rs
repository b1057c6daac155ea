//! Language Server Protocol adapter for Alk sources, answered by the interpreter's
//! language-server mode.
pub mod capabilities;
pub mod completions;
pub mod document;
pub mod goto_definition;
pub mod hover;
pub mod references;
pub mod server;
pub mod signature_help;

#[cfg(test)]
mod test_utils;

pub use server::{LspConfig, start};
