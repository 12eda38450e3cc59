use std::sync::Arc;
use std::time::Duration;

use crate::dispatcher::{RequestContext, Response};
use crate::error::DispatchError;
use crate::resource::MethodDescriptor;
use crate::router::PathMatcher;

/// A filter refusing the request. Terminal for that request only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: u16,
    pub message: String,
}

impl Rejection {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<Rejection> for DispatchError {
    fn from(r: Rejection) -> Self {
        DispatchError::Rejected {
            status: r.status,
            message: r.message,
        }
    }
}

/// Runs before root lookup. May inspect or adjust the request context.
pub trait RequestFilter: Send + Sync {
    /// # Errors
    ///
    /// A [`Rejection`] ends dispatch with the rejection's status.
    fn filter(&self, ctx: &mut RequestContext) -> Result<(), Rejection>;
}

/// Runs on every assembled response, error responses included.
pub trait ResponseFilter: Send + Sync {
    fn filter(&self, ctx: &RequestContext, response: &mut Response);
}

/// Wraps handler invocation.
pub trait MethodInvokerFilter: Send + Sync {
    /// # Errors
    ///
    /// A [`Rejection`] skips the handler.
    fn before(&self, _ctx: &RequestContext, _method: &MethodDescriptor) -> Result<(), Rejection> {
        Ok(())
    }

    /// # Errors
    ///
    /// A [`Rejection`] replaces the handler's response and skips the
    /// remaining `after` hooks.
    fn after(
        &self,
        _ctx: &RequestContext,
        _method: &MethodDescriptor,
        _response: &mut Response,
        _latency: Duration,
    ) -> Result<(), Rejection> {
        Ok(())
    }
}

/// A registered filter. Request and response filters may be scoped to the
/// paths matched by a template.
#[derive(Clone)]
pub enum FilterEntry {
    Request {
        scope: Option<PathMatcher>,
        filter: Arc<dyn RequestFilter>,
    },
    Response {
        scope: Option<PathMatcher>,
        filter: Arc<dyn ResponseFilter>,
    },
    Method(Arc<dyn MethodInvokerFilter>),
}

impl FilterEntry {
    pub fn request(filter: impl RequestFilter + 'static) -> Self {
        FilterEntry::Request {
            scope: None,
            filter: Arc::new(filter),
        }
    }

    pub fn response(filter: impl ResponseFilter + 'static) -> Self {
        FilterEntry::Response {
            scope: None,
            filter: Arc::new(filter),
        }
    }

    pub fn method(filter: impl MethodInvokerFilter + 'static) -> Self {
        FilterEntry::Method(Arc::new(filter))
    }

    /// Restrict a request or response filter to paths matched by `matcher`.
    /// Method filters are unaffected.
    #[must_use]
    pub fn scoped(self, matcher: PathMatcher) -> Self {
        match self {
            FilterEntry::Request { filter, .. } => FilterEntry::Request {
                scope: Some(matcher),
                filter,
            },
            FilterEntry::Response { filter, .. } => FilterEntry::Response {
                scope: Some(matcher),
                filter,
            },
            method @ FilterEntry::Method(_) => method,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            FilterEntry::Request { .. } => "request",
            FilterEntry::Response { .. } => "response",
            FilterEntry::Method(_) => "method",
        }
    }
}

impl std::fmt::Debug for FilterEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scope = match self {
            FilterEntry::Request { scope, .. } | FilterEntry::Response { scope, .. } => {
                scope.as_ref().map(PathMatcher::as_str)
            }
            FilterEntry::Method(_) => None,
        };
        f.debug_struct("FilterEntry")
            .field("kind", &self.kind())
            .field("scope", &scope)
            .finish()
    }
}

fn in_scope(scope: Option<&PathMatcher>, path: &str) -> bool {
    scope.map_or(true, |m| m.matches(path).is_some())
}

/// Filters in registration order.
#[derive(Clone, Default, Debug)]
pub struct FilterChain {
    entries: Vec<FilterEntry>,
}

impl FilterChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: FilterEntry) {
        self.entries.push(entry);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run request filters whose scope matches; the first rejection wins.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Rejected`] from the rejecting filter.
    pub fn apply_request(&self, ctx: &mut RequestContext) -> Result<(), DispatchError> {
        for entry in &self.entries {
            if let FilterEntry::Request { scope, filter } = entry {
                if in_scope(scope.as_ref(), ctx.path()) {
                    filter.filter(ctx)?;
                }
            }
        }
        Ok(())
    }

    pub fn apply_response(&self, ctx: &RequestContext, response: &mut Response) {
        for entry in &self.entries {
            if let FilterEntry::Response { scope, filter } = entry {
                if in_scope(scope.as_ref(), ctx.path()) {
                    filter.filter(ctx, response);
                }
            }
        }
    }

    /// # Errors
    ///
    /// [`DispatchError::Rejected`] from the rejecting filter.
    pub fn before_invoke(
        &self,
        ctx: &RequestContext,
        method: &MethodDescriptor,
    ) -> Result<(), DispatchError> {
        for entry in &self.entries {
            if let FilterEntry::Method(filter) = entry {
                filter.before(ctx, method)?;
            }
        }
        Ok(())
    }

    /// # Errors
    ///
    /// [`DispatchError::Rejected`] from the rejecting filter.
    pub fn after_invoke(
        &self,
        ctx: &RequestContext,
        method: &MethodDescriptor,
        response: &mut Response,
        latency: Duration,
    ) -> Result<(), DispatchError> {
        for entry in &self.entries {
            if let FilterEntry::Method(filter) = entry {
                filter.after(ctx, method, response, latency)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Request;
    use crate::ids::RequestId;

    struct DenyAll;

    impl RequestFilter for DenyAll {
        fn filter(&self, _ctx: &mut RequestContext) -> Result<(), Rejection> {
            Err(Rejection::new(401, "denied"))
        }
    }

    struct Stamp;

    impl ResponseFilter for Stamp {
        fn filter(&self, _ctx: &RequestContext, response: &mut Response) {
            response.set_header("x-stamp", "1".to_string());
        }
    }

    fn ctx(path: &str) -> RequestContext {
        RequestContext::new(Request::new("GET", path), RequestId::new()).unwrap()
    }

    #[test]
    fn test_scoped_request_filter() {
        let mut chain = FilterChain::new();
        chain.push(FilterEntry::request(DenyAll).scoped(PathMatcher::new("/admin").unwrap()));

        assert!(chain.apply_request(&mut ctx("/public")).is_ok());
        let err = chain.apply_request(&mut ctx("/admin/users")).unwrap_err();
        assert_eq!(err.status(), 401);
    }

    #[test]
    fn test_response_filter_runs_in_scope() {
        let mut chain = FilterChain::new();
        chain.push(FilterEntry::response(Stamp).scoped(PathMatcher::new("/a").unwrap()));

        let mut resp = Response::no_content();
        chain.apply_response(&ctx("/a/1"), &mut resp);
        assert_eq!(resp.get_header("x-stamp"), Some("1"));

        let mut resp = Response::no_content();
        chain.apply_response(&ctx("/b"), &mut resp);
        assert_eq!(resp.get_header("x-stamp"), None);
    }
}
