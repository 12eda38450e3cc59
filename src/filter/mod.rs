//! # Filter Module
//!
//! Hooks around dispatch, run in registration order:
//!
//! - [`RequestFilter`]: before root lookup, may reject the request
//! - [`MethodInvokerFilter`]: immediately before and after the handler
//! - [`ResponseFilter`]: on the assembled response, error responses included
//!
//! Request and response filters can be limited to a path template with
//! [`FilterEntry::scoped`]. A [`Rejection`] ends dispatch for that request
//! with the filter's status; it never touches the resource tree.
//!
//! ## Example
//!
//! ```rust
//! use resrouter::dispatcher::RequestContext;
//! use resrouter::filter::{FilterEntry, Rejection, RequestFilter};
//! use resrouter::router::PathMatcher;
//!
//! struct RequireToken;
//!
//! impl RequestFilter for RequireToken {
//!     fn filter(&self, ctx: &mut RequestContext) -> Result<(), Rejection> {
//!         match ctx.get_header("authorization") {
//!             Some(_) => Ok(()),
//!             None => Err(Rejection::new(401, "missing token")),
//!         }
//!     }
//! }
//!
//! let entry = FilterEntry::request(RequireToken).scoped(PathMatcher::new("/admin").unwrap());
//! ```

mod core;
mod tracing;

pub use core::{
    FilterChain, FilterEntry, MethodInvokerFilter, Rejection, RequestFilter, ResponseFilter,
};
pub use tracing::TracingFilter;
