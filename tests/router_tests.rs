//! Template matching and precedence through the public API
//!
//! # Test Coverage
//!
//! - Capture values and remainders of compiled templates
//! - Precedence between competing root templates
//! - Media type negotiation on the declared-produces example

use std::sync::Arc;

use resrouter::dispatcher::{Dispatcher, Reply, Request};
use resrouter::media::{best_producer, parse_accept, MediaType};
use resrouter::resource::{MethodSpec, ResourceBuilder, ResourceTree};
use resrouter::router::PathMatcher;

#[test]
fn test_greedy_last_parameter_consumes_rest() {
    let m = PathMatcher::new("/a/{x}/{y:.*}").unwrap();
    let found = m.matches("/a/b/c/d/e").unwrap();
    assert_eq!(found.captures(), vec![Some("b"), Some("c/d/e"), None]);
}

#[test]
fn test_remainder_left_for_children() {
    let m = PathMatcher::new("/widgets/{id}").unwrap();
    let found = m.matches("/widgets/10/parts/3").unwrap();
    assert_eq!(found.params[0].1, "10");
    assert_eq!(found.remainder.as_deref(), Some("/parts/3"));
    assert!(!found.is_exact());

    let found = m.matches("/widgets/10/").unwrap();
    assert!(found.is_exact());
    assert!(m.matches("/gadgets/10").is_none());
}

#[test]
fn test_sorting_puts_most_specific_first() {
    let mut templates: Vec<PathMatcher> = ["/{a}/{b}", "/a/{b}", "/a/b", "/{a}", "/"]
        .iter()
        .map(|t| PathMatcher::new(t).unwrap())
        .collect();
    templates.sort();
    let order: Vec<&str> = templates.iter().map(PathMatcher::as_str).collect();
    assert_eq!(order, vec!["/a/b", "/a/{b}", "/{a}/{b}", "/{a}", "/"]);
}

struct First;
struct Second;

#[test]
fn test_more_literal_characters_win_between_roots() {
    let tree = Arc::new(ResourceTree::new());
    tree.add_singleton(
        ResourceBuilder::at("/a/{y}/c")
            .method(MethodSpec::get(|_: &Second, _| Ok(Reply::entity("second".to_string())))),
        Second,
    )
    .unwrap();
    tree.add_singleton(
        ResourceBuilder::at("/a/b/{x}")
            .method(MethodSpec::get(|_: &First, _| Ok(Reply::entity("first".to_string())))),
        First,
    )
    .unwrap();

    let resp = Dispatcher::new(tree).handle(Request::new("GET", "/a/b/c"));
    assert_eq!(resp.status, 200);
    assert_eq!(resp.entity_as::<String>().unwrap(), "first");
}

#[test]
fn test_concrete_accept_beats_wildcard_on_equal_quality() {
    let declared: Vec<MediaType> = ["text/plain", "application/xml"]
        .iter()
        .map(|m| m.parse().unwrap())
        .collect();
    let accept = parse_accept(["application/*;q=0.5, text/plain;q=0.5"]).unwrap();
    let chosen = best_producer(&declared, &accept).unwrap();
    assert_eq!(chosen.media_type.essence(), "text/plain");
}
