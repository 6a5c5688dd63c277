//! iacgen: convert declarative infrastructure modules into programs.
//!
//! A module tree is loaded from YAML, bound into one graph per module
//! instance, and rendered by a TypeScript or Python backend.

pub mod cli;
pub mod convert;
pub mod core;
pub mod error;
pub mod gen;
pub mod il;
