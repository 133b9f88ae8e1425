//! Tests for TreeFlattener against arguson fixtures

use std::collections::HashMap;
use std::fs;

use rstest::rstest;

use cladesync::domain::{ArgusonNode, ArgusonTaxon, TaxonId, TaxonNode, TaxonTree, TreeFlattener};
use cladesync::infrastructure::otol::decode_subtree;
use cladesync::util::testing::init_test_setup;

fn load(name: &str) -> ArgusonNode {
    let path = format!("tests/resources/arguson/{name}.json");
    let text = fs::read_to_string(&path).unwrap();
    serde_json::from_str(&text).unwrap()
}

fn by_id(nodes: &[TaxonNode]) -> HashMap<TaxonId, &TaxonNode> {
    nodes.iter().map(|n| (n.id, n)).collect()
}

fn named(id: TaxonId, children: Vec<ArgusonNode>) -> ArgusonNode {
    ArgusonNode {
        node_id: Some(format!("ott{id}")),
        taxon: Some(ArgusonTaxon {
            ott_id: Some(id),
            name: Some(format!("n{id}")),
            ..Default::default()
        }),
        num_tips: None,
        children,
    }
}

#[test]
fn given_fixture_when_flattening_then_preorder_with_anonymous_nodes_collapsed() {
    init_test_setup();
    let nodes = TreeFlattener::new().flatten(&load("small_clade"));

    let ids: Vec<TaxonId> = nodes.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![100, 101, 102, 110, 111, 112, 120]);

    let nodes = by_id(&nodes);
    assert_eq!(nodes[&100].parent_id, None);
    assert_eq!(nodes[&101].parent_id, Some(100));
    assert_eq!(nodes[&102].parent_id, Some(100));
    // two anonymous levels between 110 and 112
    assert_eq!(nodes[&112].parent_id, Some(110));
    assert_eq!(nodes[&100].child_ids, vec![101, 102, 110, 120]);
    assert_eq!(nodes[&110].child_ids, vec![111, 112]);
}

#[test]
fn given_fixture_when_flattening_then_counts_and_attributes_are_filled() {
    let nodes = TreeFlattener::new().flatten(&load("small_clade"));
    let nodes = by_id(&nodes);

    assert_eq!(nodes[&100].descendant_count, 7);
    assert_eq!(nodes[&110].descendant_count, 3);
    assert_eq!(nodes[&101].descendant_count, 1);
    assert_eq!(nodes[&100].num_tips, 6);
    assert_eq!(nodes[&100].rank, "family");
    assert_eq!(nodes[&101].name, "Testus alpha");
    assert!(nodes.values().all(|n| n.common_name.is_none()));
}

#[test]
fn given_taxon_without_name_or_rank_when_flattening_then_falls_back() {
    let nodes = TreeFlattener::new().flatten(&load("small_clade"));
    let nodes = by_id(&nodes);

    assert_eq!(nodes[&120].name, "ott120");
    assert_eq!(nodes[&120].rank, "no rank");
}

#[test]
fn given_root_without_taxon_id_when_flattening_then_empty() {
    let nodes = TreeFlattener::new().flatten(&load("anonymous_root"));
    assert!(nodes.is_empty());
}

#[rstest]
#[case(Some(0), vec![100])]
#[case(Some(1), vec![100, 110, 120])]
#[case(Some(2), vec![100, 101, 102, 110, 111, 120])]
#[case(Some(4), vec![100, 101, 102, 110, 111, 112, 120])]
#[case(None, vec![100, 101, 102, 110, 111, 112, 120])]
fn given_max_depth_when_flattening_then_anonymous_levels_count(
    #[case] max_depth: Option<usize>,
    #[case] expected: Vec<TaxonId>,
) {
    let nodes = TreeFlattener::with_max_depth(max_depth).flatten(&load("small_clade"));

    let ids: Vec<TaxonId> = nodes.iter().map(|n| n.id).collect();
    assert_eq!(ids, expected);
    // child lists never point past the cut
    for node in &nodes {
        assert!(node.child_ids.iter().all(|c| ids.contains(c)));
    }
}

#[test]
fn given_flattened_fixture_when_indexing_then_forms_valid_tree() {
    let nodes = TreeFlattener::new().flatten(&load("small_clade"));

    let tree = TaxonTree::from_nodes(nodes).unwrap();

    assert_eq!(tree.root_id(), 100);
    assert_eq!(tree.subtree_size(110), Some(3));
}

#[test]
fn given_deep_chain_when_flattening_then_does_not_recurse() {
    let depth: TaxonId = 2_000;
    let mut tree = named(depth, Vec::new());
    for id in (1..depth).rev() {
        tree = named(id, vec![tree]);
    }

    let nodes = TreeFlattener::new().flatten(&tree);

    assert_eq!(nodes.len(), 2_000);
    assert_eq!(nodes[0].descendant_count, 2_000);
    assert_eq!(nodes[1_999].parent_id, Some(1_999));
}

/// `{"arguson": ...}` body `levels` deep; odd levels named, even levels anonymous.
fn deep_subtree_body(levels: u64) -> String {
    let mut json = String::new();
    for level in 1..=levels {
        if level % 2 == 0 {
            json.push_str(&format!(r#"{{"node_id":"mrcaott{level}","children":["#));
        } else {
            json.push_str(&format!(
                r#"{{"node_id":"ott{level}","taxon":{{"ott_id":{level},"name":"n{level}"}},"children":["#
            ));
        }
    }
    json.push_str(&"]}".repeat(levels as usize));
    format!(r#"{{"arguson":{json}}}"#)
}

#[test]
fn given_deeply_nested_response_when_decoding_then_flattens_every_named_level() {
    let body = deep_subtree_body(301);
    assert!(serde_json::from_str::<serde_json::Value>(&body).is_err());

    let tree = decode_subtree(body.as_bytes()).unwrap().unwrap();
    let nodes = TreeFlattener::new().flatten(&tree);

    assert_eq!(nodes.len(), 151);
    assert_eq!(nodes[0].id, 1);
    assert_eq!(nodes[0].descendant_count, 151);
    // anonymous levels in between are collapsed
    assert_eq!(nodes[1].parent_id, Some(1));
    assert_eq!(nodes[150].id, 301);
    assert_eq!(nodes[150].parent_id, Some(299));
}

#[test]
fn given_response_without_tree_when_decoding_then_none() {
    let tree = decode_subtree(br#"{"arguson": null}"#).unwrap();
    assert!(tree.is_none());
}
