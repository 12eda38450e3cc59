//! Error taxonomy for template compilation, resource registration and dispatch.
//!
//! Registration-time failures ([`TemplateError`], [`RegistrationError`]) are
//! returned to the caller registering a resource and never affect resources
//! that are already bound. Dispatch-time failures ([`DispatchError`]) are
//! recovered at the [`Dispatcher`](crate::dispatcher::Dispatcher) boundary and
//! converted into an ordinary [`Response`](crate::dispatcher::Response).

use std::sync::Arc;

use thiserror::Error;

use crate::dispatcher::{HeaderVec, Response};
use crate::provider::Entity;

/// A URI template could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A parameter name contains a character outside `[A-Za-z0-9_.-]`.
    #[error("malformed template '{template}': illegal character '{found}' in parameter '{segment}'")]
    IllegalCharacter {
        template: String,
        segment: String,
        found: char,
    },
    /// The same parameter name is declared twice.
    #[error("malformed template '{template}': parameter '{name}' is declared more than once")]
    DuplicateName { template: String, name: String },
    /// A parameter segment has no name (`{}` or `{:regex}`).
    #[error("malformed template '{template}': parameter without a name")]
    EmptyName { template: String },
    /// `{` without a matching `}` or a stray `}`.
    #[error("malformed template '{template}': unbalanced braces")]
    UnbalancedBraces { template: String },
    /// The regex attached to a parameter does not compile.
    #[error("malformed template '{template}': invalid regex for parameter '{name}': {reason}")]
    InvalidRegex {
        template: String,
        name: String,
        reason: String,
    },
}

/// A resource, provider or filter could not be bound into the tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    /// Two templates compare equal on every precedence key.
    #[error("template '{template}' has the same precedence as already registered '{existing}'")]
    PrecedenceTie { template: String, existing: String },
    /// The same HTTP method is declared twice for one template with identical media types.
    #[error("method {method} is declared twice for template '{template}'")]
    DuplicateMethod { method: String, template: String },
    /// A root resource must have a path template.
    #[error("resource type '{type_name}' has no path template and cannot be bound as a root")]
    MissingPath { type_name: &'static str },
    /// A declared HTTP method is not a valid token.
    #[error("invalid HTTP method '{method}' declared on '{template}'")]
    InvalidMethod { method: String, template: String },
    /// A declared media type could not be parsed.
    #[error("invalid media type '{value}' declared on '{template}'")]
    InvalidMediaType { value: String, template: String },
}

/// A request could not be dispatched to a handler, or the handler failed.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("{0}")]
    NotFound(String),
    #[error("{method} method is not allowed for resource {path}")]
    MethodNotAllowed {
        method: String,
        path: String,
        allow: Vec<String>,
    },
    #[error("{0}")]
    NotAcceptable(String),
    #[error("{0}")]
    UnsupportedMediaType(String),
    #[error("{0}")]
    BadRequest(String),
    /// A filter refused the request with its own status.
    #[error("{message}")]
    Rejected { status: u16, message: String },
    /// The handler raised an error that already carries a status.
    #[error("{message}")]
    Handler { status: u16, message: String },
    #[error("{0}")]
    Internal(String),
}

impl DispatchError {
    /// HTTP status code this error maps to.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            DispatchError::NotFound(_) => 404,
            DispatchError::MethodNotAllowed { .. } => 405,
            DispatchError::NotAcceptable(_) => 406,
            DispatchError::UnsupportedMediaType(_) => 415,
            DispatchError::BadRequest(_) => 400,
            DispatchError::Rejected { status, .. } | DispatchError::Handler { status, .. } => {
                *status
            }
            DispatchError::Internal(_) => 500,
        }
    }

    /// Convert into a `text/plain` response. `with_entity` controls whether the
    /// message is included as the body.
    #[must_use]
    pub fn into_response(self, with_entity: bool) -> Response {
        let status = self.status();
        let mut headers = HeaderVec::new();
        if let DispatchError::MethodNotAllowed { allow, .. } = &self {
            headers.push((Arc::from("allow"), allow.join(",")));
        }
        let entity = if with_entity {
            headers.push((Arc::from("content-type"), "text/plain".to_string()));
            Some(Entity::new(self.to_string()))
        } else {
            None
        };
        Response::new(status, headers, entity)
    }
}

/// Failure raised by handler or locator code.
///
/// A status set by the handler is passed through to the response unchanged;
/// without one the failure becomes a 500.
#[derive(Debug)]
pub struct HandlerError {
    status: Option<u16>,
    source: anyhow::Error,
}

impl HandlerError {
    /// Error carrying an explicit HTTP status.
    pub fn with_status<M>(status: u16, message: M) -> Self
    where
        M: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        Self {
            status: Some(status),
            source: anyhow::Error::msg(message),
        }
    }

    /// Error without a status, reported as 500.
    pub fn internal<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            status: None,
            source: anyhow::Error::new(error),
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// The wrapped error.
    #[must_use]
    pub fn inner(&self) -> &anyhow::Error {
        &self.source
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.source)
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(source: anyhow::Error) -> Self {
        Self {
            status: None,
            source,
        }
    }
}

impl From<HandlerError> for DispatchError {
    fn from(err: HandlerError) -> Self {
        match err.status {
            Some(status) => DispatchError::Handler {
                status,
                message: err.to_string(),
            },
            None => DispatchError::Internal(err.to_string()),
        }
    }
}
