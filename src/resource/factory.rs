use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use super::class::ResourceInstance;
use crate::dispatcher::RequestContext;
use crate::error::HandlerError;

/// Supplies the object a root resource's handlers run against.
pub trait ObjectFactory: Send + Sync {
    /// Instance for the request being dispatched.
    ///
    /// # Errors
    ///
    /// A failure to build the object; reported like a handler error.
    fn instance(&self, ctx: &RequestContext) -> Result<ResourceInstance, HandlerError>;
}

/// One shared instance for every request.
pub struct SingletonFactory {
    instance: ResourceInstance,
}

impl SingletonFactory {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            instance: Arc::new(value),
        }
    }
}

impl ObjectFactory for SingletonFactory {
    fn instance(&self, _ctx: &RequestContext) -> Result<ResourceInstance, HandlerError> {
        Ok(Arc::clone(&self.instance))
    }
}

/// A fresh instance per request, built from the request context.
pub struct PerRequestFactory<T, F> {
    make: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> PerRequestFactory<T, F>
where
    T: Any + Send + Sync,
    F: Fn(&RequestContext) -> Result<T, HandlerError> + Send + Sync,
{
    pub fn new(make: F) -> Self {
        Self {
            make,
            _marker: PhantomData,
        }
    }
}

impl<T, F> ObjectFactory for PerRequestFactory<T, F>
where
    T: Any + Send + Sync,
    F: Fn(&RequestContext) -> Result<T, HandlerError> + Send + Sync,
{
    fn instance(&self, ctx: &RequestContext) -> Result<ResourceInstance, HandlerError> {
        (self.make)(ctx).map(|value| Arc::new(value) as ResourceInstance)
    }
}
