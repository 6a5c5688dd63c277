//! CV-013: Location annotations.
//!
//! Records where each node was originally declared as a leading comment, so
//! generated code can be traced back to the module files.

use crate::il::{Comments, Graph, Location, Node};

/// Append ` Originally defined at <file>:<line>` to the leading comments.
/// Existing leading comments are separated from the annotation by an empty
/// line. Nodes with an unknown location are left alone.
pub fn add_location_annotation(location: &Location, comments: &mut Option<Comments>) {
    if !location.is_valid() {
        return;
    }
    let comments = comments.get_or_insert_with(Comments::default);
    if !comments.leading.is_empty() {
        comments.leading.push(String::new());
    }
    comments
        .leading
        .push(format!(" Originally defined at {}:{}", location.file, location.line));
}

fn annotate<N: Node>(node: &mut N) {
    let location = node.location().clone();
    add_location_annotation(&location, node.comments_mut());
}

/// Annotate every node of one graph: modules, providers, resources,
/// outputs, locals, then variables.
pub fn annotate_graph(graph: &mut Graph) {
    graph.modules.values_mut().for_each(annotate);
    graph.providers.values_mut().for_each(annotate);
    graph.resources.values_mut().for_each(annotate);
    graph.outputs.values_mut().for_each(annotate);
    graph.locals.values_mut().for_each(annotate);
    graph.variables.values_mut().for_each(annotate);
}

/// Annotate every graph of the forest. Not idempotent; run once.
pub fn annotate_locations(forest: &mut [Graph]) {
    for graph in forest.iter_mut() {
        annotate_graph(graph);
    }
}
