//! # Resource Module
//!
//! Resources are plain Rust types whose handlers are declared once, at
//! registration, with a [`ResourceBuilder`]. Building produces a
//! [`ResourceClass`]: an immutable table of the type's path template,
//! resource methods, sub-resource methods and sub-resource locators, sorted
//! by template precedence.
//!
//! A [`ResourceTree`] holds the root classes (those with a path) together
//! with the [`ObjectFactory`] supplying their instances, the classes reached
//! through locators, the entity providers and the filters. When a locator
//! returns an object, the dispatcher looks up its class by type identity.
//!
//! ## Example
//!
//! ```rust
//! use resrouter::dispatcher::Reply;
//! use resrouter::resource::{LocatorSpec, MethodSpec, ParamSpec, ResourceBuilder, ResourceTree};
//!
//! struct Library;
//! struct Book { id: u32 }
//!
//! let tree = ResourceTree::new();
//! tree.add_singleton(
//!     ResourceBuilder::at("/library").locator(
//!         LocatorSpec::new("books/{id}", |_: &Library, args| Ok(Book { id: args.take("id")? }))
//!             .param(ParamSpec::path::<u32>("id")),
//!     ),
//!     Library,
//! )
//! .unwrap();
//! tree.add_sub_resource(
//!     ResourceBuilder::<Book>::new()
//!         .method(MethodSpec::get(|book: &Book, _| Ok(Reply::entity(format!("book {}", book.id))))),
//! )
//! .unwrap();
//! assert_eq!(tree.describe()[0].locators, vec!["/library/books/{id}"]);
//! ```

mod class;
mod factory;
mod param;
mod tree;

pub use class::{
    LocatorDescriptor, LocatorSpec, MethodDescriptor, MethodGroup, MethodSpec, ResourceBuilder,
    ResourceClass, ResourceInstance, SubResource,
};
pub use factory::{ObjectFactory, PerRequestFactory, SingletonFactory};
pub use param::{Arguments, ParamSource, ParamSpec, BODY};
pub use tree::{
    Binding, MethodSummary, ResourceListener, ResourceSummary, ResourceTree, RootResource,
};

pub(crate) use param::resolve_all;
pub(crate) use tree::TreeState;
