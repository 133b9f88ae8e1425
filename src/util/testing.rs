//! Test support: logging setup and taxonomy fixtures.

use std::env;
use std::sync::Once;

use tracing::{debug, info};
use tracing_subscriber::{
    filter::filter_fn,
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::domain::{TaxonId, TaxonNode};

static TEST_SETUP: Once = Once::new();

pub fn init_test_setup() {
    TEST_SETUP.call_once(|| {
        if env::var("RUST_LOG").is_err() {
            env::set_var("RUST_LOG", "debug");
        }
        // global logging subscriber, used by all tracing log macros
        setup_test_logging();
        info!("Test Setup complete");
    });
}

fn setup_test_logging() {
    debug!("INIT: Attempting logger init from testing.rs");

    // reqwest and its pool are chatty at trace
    let noisy_modules = ["hyper", "reqwest", "rustls"];
    let module_filter = filter_fn(move |metadata| {
        !noisy_modules
            .iter()
            .any(|name| metadata.target().starts_with(name))
    });

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_target(true)
            .with_thread_names(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_test_writer()
            .with_filter(module_filter)
            .with_filter(env_filter),
    );

    // Only set if we haven't already set a global subscriber
    if tracing::dispatcher::has_been_set() {
        debug!("Tracing subscriber already set");
    } else {
        subscriber.try_init().unwrap_or_else(|e| {
            eprintln!("Error: Failed to set up logging: {}", e);
        });
    }
}

/// Named node `t<id>` with rank "no rank".
pub fn taxon(id: TaxonId, parent: Option<TaxonId>) -> TaxonNode {
    let node = TaxonNode::new(id, format!("t{id}"), "no rank");
    match parent {
        Some(p) => node.with_parent(p),
        None => node,
    }
}

/// Flat node list from `(parent, child)` edges; `child_ids` follow edge order.
pub fn nodes_from_edges(root: TaxonId, edges: &[(TaxonId, TaxonId)]) -> Vec<TaxonNode> {
    let mut nodes = vec![taxon(root, None)];
    for &(parent, child) in edges {
        nodes.push(taxon(child, Some(parent)));
    }
    for &(parent, child) in edges {
        if let Some(p) = nodes.iter_mut().find(|n| n.id == parent) {
            p.child_ids.push(child);
        }
    }
    nodes
}

/// Path `1 -> 2 -> ... -> n`.
pub fn chain(n: u64) -> Vec<TaxonNode> {
    let edges: Vec<(TaxonId, TaxonId)> = (2..=n).map(|id| (id - 1, id)).collect();
    nodes_from_edges(1, &edges)
}

/// Root `1` with leaves `2..=leaves + 1`.
pub fn star(leaves: u64) -> Vec<TaxonNode> {
    let edges: Vec<(TaxonId, TaxonId)> = (2..=leaves + 1).map(|id| (1, id)).collect();
    nodes_from_edges(1, &edges)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_setup() {
        init_test_setup();
    }

    #[test]
    fn given_edges_when_building_nodes_then_links_children_in_order() {
        let nodes = nodes_from_edges(1, &[(1, 3), (1, 2), (3, 4)]);
        assert_eq!(nodes.len(), 4);
        assert_eq!(nodes[0].child_ids, vec![3, 2]);
        assert_eq!(nodes[3].parent_id, Some(3));
    }
}
