//! Parameter bindings and their resolution against a [`RequestContext`].

use std::any::{Any, TypeId};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::dispatcher::RequestContext;
use crate::error::{DispatchError, HandlerError};
use crate::media::MediaType;
use crate::provider::EntityProviders;

/// Argument name used for the request entity.
pub const BODY: &str = "body";

/// Where a parameter value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSource {
    Path,
    Query,
    Matrix,
    Header,
    Cookie,
    Form,
    Body,
    Context,
}

impl ParamSource {
    /// Conversion failures for values taken from the URI are reported as 404,
    /// everything else as 400.
    fn failure(self, message: String) -> DispatchError {
        match self {
            ParamSource::Path | ParamSource::Query | ParamSource::Matrix => {
                DispatchError::NotFound(message)
            }
            _ => DispatchError::BadRequest(message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cardinality {
    One,
    Optional,
    List,
}

type Value = Box<dyn Any + Send>;
type Convert = Arc<dyn Fn(&[String], Cardinality) -> Result<Value, String> + Send + Sync>;
type ContextFn = Arc<dyn Fn(&RequestContext) -> Result<Value, HandlerError> + Send + Sync>;

#[derive(Clone)]
enum Extract {
    Text(Convert),
    Body(TypeId, &'static str),
    Context(ContextFn),
}

/// Declaration of one handler or locator argument.
///
/// Text parameters convert through [`FromStr`]. By default a single value is
/// required and produces `T`; [`optional`](Self::optional) produces
/// `Option<T>` and [`list`](Self::list) produces `Vec<T>`.
#[derive(Clone)]
pub struct ParamSpec {
    name: Arc<str>,
    source: ParamSource,
    default: Option<String>,
    encoded: bool,
    cardinality: Cardinality,
    extract: Extract,
}

fn converter<T>() -> Convert
where
    T: FromStr + Send + 'static,
    T::Err: fmt::Display,
{
    Arc::new(|values: &[String], cardinality: Cardinality| -> Result<Value, String> {
        let parse = |v: &String| v.parse::<T>().map_err(|e| format!("'{v}': {e}"));
        let value: Value = match cardinality {
            Cardinality::One => {
                let last = values.last().ok_or("value is missing")?;
                Box::new(parse(last)?)
            }
            Cardinality::Optional => Box::new(values.last().map(parse).transpose()?),
            Cardinality::List => Box::new(values.iter().map(parse).collect::<Result<Vec<T>, _>>()?),
        };
        Ok(value)
    })
}

impl ParamSpec {
    fn text<T>(source: ParamSource, name: &str) -> Self
    where
        T: FromStr + Send + 'static,
        T::Err: fmt::Display,
    {
        Self {
            name: Arc::from(name),
            source,
            default: None,
            encoded: false,
            cardinality: Cardinality::One,
            extract: Extract::Text(converter::<T>()),
        }
    }

    /// Value captured by `{name}` in a matched template. The innermost match
    /// wins when a name repeats along the locator chain.
    #[must_use]
    pub fn path<T>(name: &str) -> Self
    where
        T: FromStr + Send + 'static,
        T::Err: fmt::Display,
    {
        Self::text::<T>(ParamSource::Path, name)
    }

    #[must_use]
    pub fn query<T>(name: &str) -> Self
    where
        T: FromStr + Send + 'static,
        T::Err: fmt::Display,
    {
        Self::text::<T>(ParamSource::Query, name)
    }

    /// `;name=value` parameter of the last path segment.
    #[must_use]
    pub fn matrix<T>(name: &str) -> Self
    where
        T: FromStr + Send + 'static,
        T::Err: fmt::Display,
    {
        Self::text::<T>(ParamSource::Matrix, name)
    }

    #[must_use]
    pub fn header<T>(name: &str) -> Self
    where
        T: FromStr + Send + 'static,
        T::Err: fmt::Display,
    {
        Self::text::<T>(ParamSource::Header, name)
    }

    #[must_use]
    pub fn cookie<T>(name: &str) -> Self
    where
        T: FromStr + Send + 'static,
        T::Err: fmt::Display,
    {
        Self::text::<T>(ParamSource::Cookie, name)
    }

    /// Field of an `application/x-www-form-urlencoded` body.
    #[must_use]
    pub fn form<T>(name: &str) -> Self
    where
        T: FromStr + Send + 'static,
        T::Err: fmt::Display,
    {
        Self::text::<T>(ParamSource::Form, name)
    }

    /// Request entity read through the provider registry, available under
    /// [`BODY`].
    ///
    /// A request without `Content-Type` is read as `*/*`, so only readers
    /// registered for any media type apply; a method that consumes
    /// `application/json` answers 415 to such a request.
    #[must_use]
    pub fn body<T: Any + Send>() -> Self {
        Self {
            name: Arc::from(BODY),
            source: ParamSource::Body,
            default: None,
            encoded: false,
            cardinality: Cardinality::One,
            extract: Extract::Body(TypeId::of::<T>(), std::any::type_name::<T>()),
        }
    }

    /// Value computed from the request context. A failure without an
    /// explicit status answers 400.
    pub fn context<T, F>(name: &str, make: F) -> Self
    where
        T: Any + Send,
        F: Fn(&RequestContext) -> Result<T, HandlerError> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            source: ParamSource::Context,
            default: None,
            encoded: false,
            cardinality: Cardinality::One,
            extract: Extract::Context(Arc::new(move |ctx: &RequestContext| {
                make(ctx).map(|v| Box::new(v) as Value)
            })),
        }
    }

    /// Produce `Option<T>` instead of requiring a value.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.cardinality = Cardinality::Optional;
        self
    }

    /// Produce `Vec<T>` holding every value.
    #[must_use]
    pub fn list(mut self) -> Self {
        self.cardinality = Cardinality::List;
        self
    }

    /// Value used when the request carries none.
    #[must_use]
    pub fn default_value(mut self, value: &str) -> Self {
        self.default = Some(value.to_string());
        self
    }

    /// Skip percent-decoding of path, query, matrix and form values.
    #[must_use]
    pub fn encoded(mut self) -> Self {
        self.encoded = true;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn source(&self) -> ParamSource {
        self.source
    }

    fn raw_values(&self, ctx: &mut RequestContext) -> Result<Vec<String>, DispatchError> {
        let name = self.name.as_ref();
        let values = match self.source {
            ParamSource::Path => ctx.path_values(name, self.encoded),
            ParamSource::Query => ctx.query_values(name, self.encoded),
            ParamSource::Matrix => ctx.matrix_values(name, self.encoded),
            ParamSource::Header => ctx.header_values(name).map(str::to_string).collect(),
            ParamSource::Cookie => ctx.cookie_values(name),
            ParamSource::Form => ctx.form_values(name, self.encoded)?,
            ParamSource::Body | ParamSource::Context => Vec::new(),
        };
        Ok(match (&self.default, values.is_empty()) {
            (Some(default), true) => vec![default.clone()],
            _ => values,
        })
    }

    fn resolve(
        &self,
        ctx: &mut RequestContext,
        providers: &dyn EntityProviders,
    ) -> Result<Value, DispatchError> {
        match &self.extract {
            Extract::Text(convert) => {
                let values = self.raw_values(ctx)?;
                convert(&values, self.cardinality).map_err(|reason| {
                    self.source.failure(format!(
                        "{:?} parameter '{}' is invalid: {reason}",
                        self.source, self.name
                    ))
                })
            }
            Extract::Body(type_id, type_name) => read_body(ctx, providers, *type_id, type_name),
            Extract::Context(make) => make(ctx).map_err(|err| match err.status() {
                Some(_) => DispatchError::from(err),
                None => self.source.failure(format!(
                    "{:?} parameter '{}' could not be resolved: {err}",
                    self.source, self.name
                )),
            }),
        }
    }
}

impl fmt::Debug for ParamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamSpec")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("default", &self.default)
            .field("encoded", &self.encoded)
            .field("cardinality", &self.cardinality)
            .finish()
    }
}

fn read_body(
    ctx: &mut RequestContext,
    providers: &dyn EntityProviders,
    type_id: TypeId,
    type_name: &str,
) -> Result<Value, DispatchError> {
    let media = ctx
        .content_type()
        .cloned()
        .unwrap_or_else(MediaType::wildcard);
    let reader = providers.find_reader(type_id, &media).ok_or_else(|| {
        DispatchError::UnsupportedMediaType(format!(
            "no reader for {type_name} as {}",
            media.essence()
        ))
    })?;
    let mut body = ctx
        .take_body()
        .unwrap_or_else(|| Box::new(std::io::empty()) as Box<dyn std::io::Read + Send>);
    let entity = reader
        .read(&media, &mut body)
        .map_err(|e| DispatchError::BadRequest(format!("unable to read {type_name}: {e:#}")))?;
    if entity.type_id() != type_id {
        return Err(DispatchError::Internal(format!(
            "reader produced {} instead of {type_name}",
            entity.type_name()
        )));
    }
    Ok(Box::new(entity) as Value)
}

/// Resolve every declared parameter in order.
pub(crate) fn resolve_all(
    specs: &[ParamSpec],
    ctx: &mut RequestContext,
    providers: &dyn EntityProviders,
) -> Result<Vec<(Arc<str>, Option<Value>)>, DispatchError> {
    specs
        .iter()
        .map(|spec| Ok((Arc::clone(&spec.name), Some(spec.resolve(ctx, providers)?))))
        .collect()
}

/// Resolved arguments handed to a handler or locator.
pub struct Arguments<'a> {
    ctx: &'a RequestContext,
    values: Vec<(Arc<str>, Option<Value>)>,
}

impl<'a> Arguments<'a> {
    pub(crate) fn new(ctx: &'a RequestContext, values: Vec<(Arc<str>, Option<Value>)>) -> Self {
        Self { ctx, values }
    }

    /// The request being handled.
    #[must_use]
    pub fn context(&self) -> &RequestContext {
        self.ctx
    }

    /// Borrow argument `name` as `T`.
    ///
    /// # Errors
    ///
    /// A 500 when the argument is not declared, was already taken or has a
    /// different type.
    pub fn get<T: Any>(&self, name: &str) -> Result<&T, HandlerError> {
        self.values
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .and_then(|(_, v)| v.as_ref())
            .and_then(|v| downcast_ref::<T>(v.as_ref()))
            .ok_or_else(|| mismatch::<T>(name))
    }

    /// Move argument `name` out as `T`.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub fn take<T: Any>(&mut self, name: &str) -> Result<T, HandlerError> {
        let slot = self
            .values
            .iter_mut()
            .find(|(n, v)| n.as_ref() == name && v.is_some())
            .ok_or_else(|| mismatch::<T>(name))?;
        let Some(value) = slot.1.take() else {
            return Err(mismatch::<T>(name));
        };
        match unbox::<T>(value) {
            Ok(v) => Ok(v),
            Err(value) => {
                slot.1 = Some(value);
                Err(mismatch::<T>(name))
            }
        }
    }

    /// Move the request entity out as `T`.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub fn body<T: Any>(&mut self) -> Result<T, HandlerError> {
        self.take(BODY)
    }
}

/// Body values are stored as an [`Entity`](crate::provider::Entity) so
/// they carry their type; text and context values are stored directly.
fn downcast_ref<T: Any>(value: &(dyn Any + Send)) -> Option<&T> {
    value.downcast_ref::<T>().or_else(|| {
        value
            .downcast_ref::<crate::provider::Entity>()
            .and_then(crate::provider::Entity::downcast_ref::<T>)
    })
}

fn unbox<T: Any>(value: Value) -> Result<T, Value> {
    let value = match value.downcast::<T>() {
        Ok(v) => return Ok(*v),
        Err(value) => value,
    };
    match value.downcast::<crate::provider::Entity>() {
        Ok(entity) => (*entity).downcast::<T>().map_err(|e| Box::new(e) as Value),
        Err(value) => Err(value),
    }
}

fn mismatch<T>(name: &str) -> HandlerError {
    HandlerError::from(anyhow::anyhow!(
        "argument '{name}' is not available as {}",
        std::any::type_name::<T>()
    ))
}
