//! Editor features built on the parsed sls tree
//!
//! - [`node_finder`]: cursor to node lookup and coordinate conversion
//! - [`completion`]: cursor intent and schema-driven suggestions
//! - [`goto_definition`]: requisite and include targets across files

pub mod completion;
pub mod goto_definition;
pub mod node_finder;
