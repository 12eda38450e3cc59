//! # Router Module
//!
//! The router module compiles URI templates and matches request paths against
//! them. It is the lowest layer of request routing: it knows nothing about
//! resources, HTTP methods or media types.
//!
//! ## Overview
//!
//! The router is responsible for:
//! - Compiling URI templates (`/orders/{id}`, `/files/{path:.*}`) into regexes
//! - Matching request paths and extracting named parameters
//! - Returning the unmatched remainder of the path for sub-resource matching
//! - Ordering competing templates by precedence
//!
//! ## Architecture
//!
//! The router uses a two-phase approach:
//!
//! 1. **Compilation**: At registration, a template is normalized (leading
//!    slash added, trailing slash dropped), literal text is percent-encoded and
//!    escaped, and every `{name}` / `{name:regex}` becomes a capturing group.
//!    An optional remainder group `(/.*)?` is appended to every template.
//!
//! 2. **Matching**: For each request, the path is tested against the anchored
//!    regex. A match yields one value per parameter plus the remainder.
//!
//! ## Example
//!
//! ```rust
//! use resrouter::router::PathMatcher;
//!
//! let matcher = PathMatcher::new("/a/{x}/{y:.*}").unwrap();
//! let m = matcher.matches("/a/b/c/d/e").unwrap();
//! assert_eq!(m.captures(), vec![Some("b"), Some("c/d/e"), None]);
//! ```
//!
//! ## Precedence
//!
//! When several templates match the same path the most specific one wins:
//! more literal characters first, then fewer parameters, then the regex text
//! (descending). Templates that tie on all three keys are rejected when they
//! are registered side by side.

mod pattern;
pub mod template;

pub use pattern::{ParamVec, PathMatch, PathMatcher, MAX_INLINE_PARAMS};
pub use template::{compile, UriTemplate, DEFAULT_PARAM_REGEX, REMAINDER_REGEX};
