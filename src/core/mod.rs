//! Module loading: declaration types, parsing, source positions, provider
//! schemas, remote module storage and the module tree.

pub mod parser;
pub mod schema;
pub mod source;
pub mod storage;
pub mod template;
pub mod tree;
pub mod types;
