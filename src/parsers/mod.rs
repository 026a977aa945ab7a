//! Parsers for Salt state files.

pub mod position_utils;
pub mod sls;

pub use position_utils::LineIndex;
pub use sls::parse;
