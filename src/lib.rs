//! # resrouter
//!
//! **resrouter** routes HTTP requests to resource handlers: URI templates are
//! compiled once, matched by specificity, walked through sub-resource
//! locators and finished with content negotiation on the request and
//! response media types.
//!
//! ## Overview
//!
//! The crate is transport-agnostic. A transport adapter hands over a
//! [`Request`](dispatcher::Request) (method, URI, base URI, headers, body)
//! and receives a [`Response`](dispatcher::Response), or lets the dispatcher
//! write the response itself through a
//! [`ContainerResponseWriter`](dispatcher::ContainerResponseWriter).
//!
//! ## Architecture
//!
//! - **[`router`]** - URI template compiler, path matching and template precedence
//! - **[`media`]** - Media type parsing and quality/specificity based negotiation
//! - **[`resource`]** - Resource classes, parameter bindings, object factories and the resource tree
//! - **[`provider`]** - Entity readers and writers keyed by Rust type and media type
//! - **[`filter`]** - Request, response and method-invocation filters
//! - **[`dispatcher`]** - The dispatch state machine, request context and response assembly
//! - **[`config`]** - Dispatcher settings from the environment or YAML
//! - **[`logging`]** - `tracing` subscriber setup
//!
//! ### Request Lifecycle
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Transport
//!     participant Dispatcher
//!     participant Tree as ResourceTree
//!     participant Filters
//!     participant Handler
//!     participant Providers
//!
//!     Transport->>Dispatcher: handle(Request)
//!     Dispatcher->>Tree: read lock
//!     Dispatcher->>Filters: request filters
//!     Dispatcher->>Tree: ROOT_LOOKUP (precedence order)
//!     loop LOCATOR_CHAIN
//!         Dispatcher->>Handler: locator(instance, args)
//!         Handler-->>Dispatcher: next object
//!         Dispatcher->>Tree: class of next object
//!     end
//!     Dispatcher->>Dispatcher: METHOD_MATCH + negotiation
//!     Dispatcher->>Filters: method filters (before)
//!     Dispatcher->>Providers: read body
//!     Dispatcher->>Handler: INVOKE
//!     Handler-->>Dispatcher: Reply
//!     Dispatcher->>Filters: method filters (after), response filters
//!     Dispatcher-->>Transport: Response
//!     Transport->>Providers: write entity
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use resrouter::dispatcher::{Dispatcher, Reply, Request};
//! use resrouter::resource::{MethodSpec, ParamSpec, ResourceBuilder, ResourceTree};
//!
//! struct Orders;
//!
//! let tree = Arc::new(ResourceTree::new());
//! tree.add_singleton(
//!     ResourceBuilder::at("/orders")
//!         .method(MethodSpec::get(|_: &Orders, _| Ok(Reply::entity("[]".to_string()))))
//!         .method(
//!             MethodSpec::get(|_: &Orders, args| {
//!                 let id: u64 = args.take("id")?;
//!                 Ok(Reply::entity(format!("order {id}")))
//!             })
//!             .path("{id:\\d+}")
//!             .param(ParamSpec::path::<u64>("id")),
//!         ),
//!     Orders,
//! )
//! .unwrap();
//!
//! let dispatcher = Dispatcher::new(tree);
//! let response = dispatcher.handle(Request::new("GET", "/orders/17"));
//! assert_eq!(response.status, 200);
//! assert_eq!(response.entity_as::<String>().unwrap(), "order 17");
//! assert_eq!(dispatcher.handle(Request::new("GET", "/orders/x")).status, 404);
//! ```
//!
//! ## Concurrency
//!
//! The resource tree is shared behind a reader/writer lock. Requests take the
//! read side and run in parallel; registration takes the write side. Request
//! state lives in a [`RequestContext`](dispatcher::RequestContext) owned by
//! the handling thread. Dispatch is synchronous.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod ids;
pub mod logging;
pub mod media;
pub mod provider;
pub mod resource;
pub mod router;

pub use config::DispatcherConfig;
pub use dispatcher::{Dispatcher, Reply, Request, RequestContext, Response};
pub use error::{DispatchError, HandlerError, RegistrationError, TemplateError};
pub use ids::RequestId;
pub use resource::{LocatorSpec, MethodSpec, ParamSpec, ResourceBuilder, ResourceTree};
