//! Resource tree registration, removal and introspection
//!
//! # Test Coverage
//!
//! - Registration errors surfaced to the caller
//! - Removal by template and by type while the dispatcher keeps serving
//! - Concurrent dispatch during registration
//! - `describe()` output

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use common::{bookstore_tree, BookResource, Library};
use resrouter::dispatcher::{Dispatcher, Reply, Request};
use resrouter::error::RegistrationError;
use resrouter::resource::{
    MethodSpec, ResourceBuilder, ResourceClass, ResourceListener, ResourceTree,
};

struct Probe;
struct Other;

#[test]
fn test_tie_with_existing_root_is_rejected() {
    let tree = bookstore_tree();
    tree.add_singleton(
        ResourceBuilder::at("/{section}")
            .method(MethodSpec::get(|_: &Probe, _| Ok(Reply::NoContent))),
        Probe,
    )
    .unwrap();
    assert_eq!(tree.root_count(), 2);

    let err = tree
        .add_singleton(
            ResourceBuilder::at("/{kind}")
                .method(MethodSpec::get(|_: &Other, _| Ok(Reply::NoContent))),
            Other,
        )
        .unwrap_err();
    assert!(matches!(err, RegistrationError::PrecedenceTie { .. }));
    assert_eq!(tree.root_count(), 2);
}

#[test]
fn test_malformed_template_is_reported() {
    let tree = ResourceTree::new();
    let err = tree
        .add_singleton(
            ResourceBuilder::at("/a/{b")
                .method(MethodSpec::get(|_: &Probe, _| Ok(Reply::NoContent))),
            Probe,
        )
        .unwrap_err();
    assert!(matches!(err, RegistrationError::Template(_)));
    assert_eq!(tree.root_count(), 0);
}

#[test]
fn test_remove_by_template() {
    let tree = bookstore_tree();
    let d = Dispatcher::new(Arc::clone(&tree));
    assert_eq!(d.handle(Request::new("GET", "/books")).status, 200);

    assert!(tree.remove_resource("/books/").unwrap());
    assert!(!tree.remove_resource("/books").unwrap());
    assert_eq!(d.handle(Request::new("GET", "/books")).status, 404);
}

#[test]
fn test_removed_sub_resource_type_fails_locator() {
    let tree = bookstore_tree();
    let d = Dispatcher::new(Arc::clone(&tree));
    assert!(tree.remove_type::<BookResource>());
    assert!(!tree.remove_type::<BookResource>());
    assert_eq!(d.handle(Request::new("GET", "/books/1")).status, 500);
    assert_eq!(d.handle(Request::new("GET", "/books")).status, 200);

    assert!(tree.remove_type::<Library>());
    assert_eq!(tree.root_count(), 0);
}

#[derive(Default)]
struct Counting {
    added: AtomicUsize,
    removed: AtomicUsize,
}

impl ResourceListener for Counting {
    fn on_add(&self, _class: &ResourceClass) {
        self.added.fetch_add(1, Ordering::SeqCst);
    }

    fn on_remove(&self, _class: &ResourceClass) {
        self.removed.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_listener_sees_add_and_remove() {
    let tree = ResourceTree::new();
    let listener = Arc::new(Counting::default());
    tree.add_listener(Arc::clone(&listener) as Arc<dyn ResourceListener>);
    tree.add_singleton(
        ResourceBuilder::at("/probe").method(MethodSpec::get(|_: &Probe, _| Ok(Reply::NoContent))),
        Probe,
    )
    .unwrap();
    assert!(tree.remove_resource("/probe").unwrap());
    assert_eq!(listener.added.load(Ordering::SeqCst), 1);
    assert_eq!(listener.removed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_registration_while_serving() {
    let tree = bookstore_tree();
    let d = Dispatcher::new(Arc::clone(&tree));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let d = d.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    assert_eq!(d.handle(Request::new("GET", "/books/1")).status, 200);
                }
            })
        })
        .collect();

    tree.add_singleton(
        ResourceBuilder::at("/probe").method(MethodSpec::get(|_: &Probe, _| Ok(Reply::NoContent))),
        Probe,
    )
    .unwrap();
    for w in workers {
        w.join().unwrap();
    }
    assert_eq!(d.handle(Request::new("GET", "/probe")).status, 204);
}

#[test]
fn test_describe_serializes() {
    let summary = bookstore_tree().describe();
    assert_eq!(summary.len(), 1);
    let books = &summary[0];
    assert_eq!(books.template, "/books");
    assert_eq!(books.locators, vec!["/books/{id}".to_string()]);

    let json = serde_json::to_value(&summary).unwrap();
    let methods = json[0]["methods"].as_array().unwrap();
    assert!(methods
        .iter()
        .any(|m| m["method"] == "GET" && m["template"] == "/books/latest"));
    assert!(methods
        .iter()
        .any(|m| m["method"] == "POST" && m["consumes"][0] == "application/json"));
}
