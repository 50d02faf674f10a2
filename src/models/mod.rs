//! Model alias table
//!
//! Maps the public model names this service advertises onto the upstream's
//! internal identifiers.

pub mod alias;

pub use alias::{ModelAlias, convert_model};
