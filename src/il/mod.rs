//! Bound intermediate representation: one `Graph` per module instance.

pub mod binder;
pub mod bound;
pub mod graph;
pub mod order;

pub use binder::build_graph;
pub use bound::{BoundNode, Literal, RefTarget, Reference};
pub use graph::*;

use crate::core::schema::ProviderInfoSource;
use std::sync::Arc;

/// Knobs for binding a module into a graph.
#[derive(Clone, Default)]
pub struct BuildOptions {
    /// Bind resources whose provider is not declared to an unknown provider
    pub allow_missing_providers: bool,
    /// Bind references to undeclared variables to placeholders
    pub allow_missing_variables: bool,
    /// Continue when comments cannot be extracted
    pub allow_missing_comments: bool,
    /// Schema lookup for resources; `None` leaves every schema empty
    pub provider_info: Option<Arc<dyn ProviderInfoSource>>,
    /// Diagnostic sink for tolerated problems
    pub logger: Option<tracing::Dispatch>,
}
