//! # Dispatcher Module
//!
//! The dispatcher turns a [`Request`] into a [`Response`] by walking the
//! [`ResourceTree`](crate::resource::ResourceTree).
//!
//! ## Request Flow
//!
//! 1. **Request filters** run against the [`RequestContext`]; a rejection ends
//!    the request with the filter's status.
//! 2. **Root lookup**: the root templates are tried in precedence order. A
//!    root whose match leaves more than a trailing `/` is skipped when the
//!    class has nothing below it.
//! 3. **Locator chain**: while the path is not exhausted, the first matching
//!    sub-resource method group or locator of the current class (most
//!    specific template first, a method group ahead of a locator it ties
//!    with) is taken. A locator returns the next object; its class is found
//!    by type.
//! 4. **Method match**: the request method selects the descriptors (`HEAD`
//!    falls back to `GET`, `OPTIONS` is answered automatically), then the
//!    content type and `Accept` header select one of them.
//! 5. **Method filters** run before and after the **handler**.
//! 6. **Response filters** run on the assembled response.
//!
//! Every failure along the way becomes an ordinary response with the status
//! of its [`DispatchError`](crate::error::DispatchError).
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use resrouter::dispatcher::{Dispatcher, Reply, Request};
//! use resrouter::resource::{MethodSpec, ParamSpec, ResourceBuilder, ResourceTree};
//!
//! struct Greeter;
//!
//! let tree = Arc::new(ResourceTree::new());
//! tree.add_singleton(
//!     ResourceBuilder::at("/hello/{name}").method(
//!         MethodSpec::get(|_: &Greeter, args| {
//!             let name: String = args.take("name")?;
//!             Ok(Reply::entity(format!("hello {name}")))
//!         })
//!         .produces(&["text/plain"])
//!         .param(ParamSpec::path::<String>("name")),
//!     ),
//!     Greeter,
//! )
//! .unwrap();
//!
//! let response = Dispatcher::new(tree).handle(Request::new("GET", "/hello/world"));
//! assert_eq!(response.status, 200);
//! assert_eq!(response.entity_as::<String>().unwrap(), "hello world");
//! ```

mod context;
mod core;
mod response;

pub use context::{Request, RequestContext, DEFAULT_BASE_URI};
pub use core::Dispatcher;
pub use response::{
    BufferedResponseWriter, ContainerResponseWriter, HeaderVec, Reply, Response,
    MAX_INLINE_HEADERS,
};
