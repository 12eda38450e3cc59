//! Resource classes: the immutable capability table built for each handler
//! type at registration time.

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use http::Method;

use super::param::{Arguments, ParamSpec};
use crate::dispatcher::Reply;
use crate::error::{HandlerError, RegistrationError};
use crate::media::MediaType;
use crate::router::PathMatcher;

/// A live resource object. Locators return one; the dispatcher looks up its
/// class by the concrete type behind the `Any`.
pub type ResourceInstance = Arc<dyn Any + Send + Sync>;

type HandlerFn =
    dyn Fn(&ResourceInstance, &mut Arguments<'_>) -> Result<Reply, HandlerError> + Send + Sync;
type LocatorFn = dyn Fn(&ResourceInstance, &mut Arguments<'_>) -> Result<ResourceInstance, HandlerError>
    + Send
    + Sync;

/// A handler bound to an HTTP method.
pub struct MethodDescriptor {
    name: Arc<str>,
    http_method: Method,
    consumes: Vec<MediaType>,
    produces: Vec<MediaType>,
    params: Vec<ParamSpec>,
    handler: Arc<HandlerFn>,
}

impl MethodDescriptor {
    /// `Type::METHOD template`, used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn http_method(&self) -> &Method {
        &self.http_method
    }

    /// Declared request media types; empty means any.
    #[must_use]
    pub fn consumes(&self) -> &[MediaType] {
        &self.consumes
    }

    /// Declared response media types; empty means any.
    #[must_use]
    pub fn produces(&self) -> &[MediaType] {
        &self.produces
    }

    #[must_use]
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub(crate) fn invoke(
        &self,
        instance: &ResourceInstance,
        args: &mut Arguments<'_>,
    ) -> Result<Reply, HandlerError> {
        (self.handler)(instance, args)
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Methods sharing one template.
#[derive(Debug, Default)]
pub struct MethodGroup {
    methods: Vec<Arc<MethodDescriptor>>,
}

impl MethodGroup {
    #[must_use]
    pub fn methods(&self) -> &[Arc<MethodDescriptor>] {
        &self.methods
    }

    /// Value of the `Allow` header: declared methods in declaration order,
    /// plus `HEAD` when `GET` is declared, plus `OPTIONS`.
    #[must_use]
    pub fn allow(&self) -> Vec<String> {
        let mut allow: Vec<String> = Vec::new();
        for m in &self.methods {
            let name = m.http_method.as_str();
            if !allow.iter().any(|a| a == name) {
                allow.push(name.to_string());
            }
        }
        if allow.iter().any(|a| a == "GET") && !allow.iter().any(|a| a == "HEAD") {
            allow.push("HEAD".to_string());
        }
        if !allow.iter().any(|a| a == "OPTIONS") {
            allow.push("OPTIONS".to_string());
        }
        allow
    }
}

/// A sub-resource locator: matched against the remaining path, it returns the
/// object that routing continues with.
pub struct LocatorDescriptor {
    name: Arc<str>,
    matcher: PathMatcher,
    params: Vec<ParamSpec>,
    locate: Arc<LocatorFn>,
}

impl LocatorDescriptor {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn matcher(&self) -> &PathMatcher {
        &self.matcher
    }

    #[must_use]
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub(crate) fn locate(
        &self,
        instance: &ResourceInstance,
        args: &mut Arguments<'_>,
    ) -> Result<ResourceInstance, HandlerError> {
        (self.locate)(instance, args)
    }
}

impl fmt::Debug for LocatorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocatorDescriptor")
            .field("name", &self.name)
            .field("template", &self.matcher.as_str())
            .finish_non_exhaustive()
    }
}

/// Something reachable below a class path.
#[derive(Debug)]
pub enum SubResource {
    Methods {
        matcher: PathMatcher,
        group: MethodGroup,
    },
    Locator(LocatorDescriptor),
}

impl SubResource {
    #[must_use]
    pub fn matcher(&self) -> &PathMatcher {
        match self {
            SubResource::Methods { matcher, .. } => matcher,
            SubResource::Locator(locator) => &locator.matcher,
        }
    }

    /// Methods sort ahead of a locator they tie with.
    fn rank(&self) -> u8 {
        match self {
            SubResource::Methods { .. } => 0,
            SubResource::Locator(_) => 1,
        }
    }
}

/// Capability table of one handler type.
#[derive(Debug)]
pub struct ResourceClass {
    type_id: TypeId,
    type_name: &'static str,
    matcher: Option<PathMatcher>,
    resource_methods: Option<MethodGroup>,
    sub_resources: Vec<SubResource>,
}

impl ResourceClass {
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Class-level template; required for root resources.
    #[must_use]
    pub fn matcher(&self) -> Option<&PathMatcher> {
        self.matcher.as_ref()
    }

    /// Methods that apply when nothing but an optional `/` is left.
    #[must_use]
    pub fn resource_methods(&self) -> Option<&MethodGroup> {
        self.resource_methods.as_ref()
    }

    /// Sub-resource methods and locators, most specific first.
    #[must_use]
    pub fn sub_resources(&self) -> &[SubResource] {
        &self.sub_resources
    }
}

type TypedHandler<T> =
    Arc<dyn Fn(&T, &mut Arguments<'_>) -> Result<Reply, HandlerError> + Send + Sync>;
type TypedLocator<T> =
    Arc<dyn Fn(&T, &mut Arguments<'_>) -> Result<ResourceInstance, HandlerError> + Send + Sync>;

/// Declaration of a handler method on `T`.
pub struct MethodSpec<T> {
    method: String,
    path: Option<String>,
    consumes: Vec<String>,
    produces: Vec<String>,
    params: Vec<ParamSpec>,
    handler: TypedHandler<T>,
}

impl<T: Any + Send + Sync> MethodSpec<T> {
    pub fn new<F>(method: &str, handler: F) -> Self
    where
        F: Fn(&T, &mut Arguments<'_>) -> Result<Reply, HandlerError> + Send + Sync + 'static,
    {
        Self {
            method: method.to_ascii_uppercase(),
            path: None,
            consumes: Vec::new(),
            produces: Vec::new(),
            params: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn get<F>(handler: F) -> Self
    where
        F: Fn(&T, &mut Arguments<'_>) -> Result<Reply, HandlerError> + Send + Sync + 'static,
    {
        Self::new("GET", handler)
    }

    pub fn post<F>(handler: F) -> Self
    where
        F: Fn(&T, &mut Arguments<'_>) -> Result<Reply, HandlerError> + Send + Sync + 'static,
    {
        Self::new("POST", handler)
    }

    pub fn put<F>(handler: F) -> Self
    where
        F: Fn(&T, &mut Arguments<'_>) -> Result<Reply, HandlerError> + Send + Sync + 'static,
    {
        Self::new("PUT", handler)
    }

    pub fn delete<F>(handler: F) -> Self
    where
        F: Fn(&T, &mut Arguments<'_>) -> Result<Reply, HandlerError> + Send + Sync + 'static,
    {
        Self::new("DELETE", handler)
    }

    /// Make this a sub-resource method below `path`.
    #[must_use]
    pub fn path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    #[must_use]
    pub fn consumes(mut self, types: &[&str]) -> Self {
        self.consumes.extend(types.iter().map(|t| (*t).to_string()));
        self
    }

    #[must_use]
    pub fn produces(mut self, types: &[&str]) -> Self {
        self.produces.extend(types.iter().map(|t| (*t).to_string()));
        self
    }

    #[must_use]
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }
}

/// Declaration of a sub-resource locator on `T`.
pub struct LocatorSpec<T> {
    path: String,
    params: Vec<ParamSpec>,
    locate: TypedLocator<T>,
}

impl<T: Any + Send + Sync> LocatorSpec<T> {
    /// Locator returning a concrete resource type `R`. `R` must be registered
    /// with [`ResourceTree::add_sub_resource`](super::ResourceTree::add_sub_resource).
    pub fn new<R, F>(path: &str, locate: F) -> Self
    where
        R: Any + Send + Sync,
        F: Fn(&T, &mut Arguments<'_>) -> Result<R, HandlerError> + Send + Sync + 'static,
    {
        Self {
            path: path.to_string(),
            params: Vec::new(),
            locate: Arc::new(move |this: &T, args: &mut Arguments<'_>| {
                locate(this, args).map(|r| Arc::new(r) as ResourceInstance)
            }),
        }
    }

    /// Locator choosing the resource type at run time.
    pub fn dynamic<F>(path: &str, locate: F) -> Self
    where
        F: Fn(&T, &mut Arguments<'_>) -> Result<ResourceInstance, HandlerError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            path: path.to_string(),
            params: Vec::new(),
            locate: Arc::new(locate),
        }
    }

    #[must_use]
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }
}

/// Builds the [`ResourceClass`] of `T`.
///
/// ```rust
/// use resrouter::dispatcher::Reply;
/// use resrouter::resource::{MethodSpec, ParamSpec, ResourceBuilder};
///
/// struct Orders;
///
/// let class = ResourceBuilder::<Orders>::at("/orders")
///     .method(MethodSpec::get(|_, _| Ok(Reply::entity("all".to_string()))))
///     .method(
///         MethodSpec::get(|_, args| {
///             let id: u64 = args.take("id")?;
///             Ok(Reply::entity(format!("order {id}")))
///         })
///         .path("{id}")
///         .produces(&["text/plain"])
///         .param(ParamSpec::path::<u64>("id")),
///     )
///     .build()
///     .unwrap();
/// assert_eq!(class.sub_resources().len(), 1);
/// ```
pub struct ResourceBuilder<T> {
    path: Option<String>,
    methods: Vec<MethodSpec<T>>,
    locators: Vec<LocatorSpec<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> Default for ResourceBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Any + Send + Sync> ResourceBuilder<T> {
    /// Class without a path, for types only reached through locators.
    #[must_use]
    pub fn new() -> Self {
        Self {
            path: None,
            methods: Vec::new(),
            locators: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Class mounted at `path`.
    #[must_use]
    pub fn at(path: &str) -> Self {
        let mut builder = Self::new();
        builder.path = Some(path.to_string());
        builder
    }

    #[must_use]
    pub fn method(mut self, spec: MethodSpec<T>) -> Self {
        self.methods.push(spec);
        self
    }

    #[must_use]
    pub fn locator(mut self, spec: LocatorSpec<T>) -> Self {
        self.locators.push(spec);
        self
    }

    /// Compile templates, parse media types and validate the table.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::Template`] for a malformed template
    /// - [`RegistrationError::InvalidMethod`] / [`RegistrationError::InvalidMediaType`]
    /// - [`RegistrationError::DuplicateMethod`] when one template declares the
    ///   same method twice with identical media types
    /// - [`RegistrationError::PrecedenceTie`] when two different method
    ///   templates, or two locators, cannot be ordered
    pub fn build(self) -> Result<ResourceClass, RegistrationError> {
        let type_name = std::any::type_name::<T>();
        let matcher = self.path.as_deref().map(PathMatcher::new).transpose()?;
        let class_path = matcher
            .as_ref()
            .map_or_else(String::new, |m| m.as_str().to_string());

        let mut resource_methods: Option<MethodGroup> = None;
        let mut groups: Vec<(PathMatcher, MethodGroup)> = Vec::new();
        for spec in self.methods {
            let sub = spec.path.as_deref().map(PathMatcher::new).transpose()?;
            let template = format!(
                "{class_path}{}",
                sub.as_ref().map_or("", |m| m.as_str())
            );
            let descriptor = Arc::new(method_descriptor(spec, type_name, &template)?);

            let group = match sub {
                None => resource_methods.get_or_insert_with(MethodGroup::default),
                Some(sub) => {
                    match groups.iter().position(|(m, _)| m.as_str() == sub.as_str()) {
                        Some(i) => &mut groups[i].1,
                        None => {
                            if let Some((tie, _)) = groups.iter().find(|(m, _)| m.ties_with(&sub)) {
                                return Err(RegistrationError::PrecedenceTie {
                                    template: sub.as_str().to_string(),
                                    existing: tie.as_str().to_string(),
                                });
                            }
                            groups.push((sub, MethodGroup::default()));
                            let last = groups.len() - 1;
                            &mut groups[last].1
                        }
                    }
                }
            };
            if group.methods.iter().any(|m| same_binding(m, &descriptor)) {
                return Err(RegistrationError::DuplicateMethod {
                    method: descriptor.http_method.to_string(),
                    template,
                });
            }
            group.methods.push(descriptor);
        }

        let mut locators: Vec<LocatorDescriptor> = Vec::new();
        for spec in self.locators {
            let matcher = PathMatcher::new(&spec.path)?;
            if let Some(tie) = locators.iter().find(|l| l.matcher.ties_with(&matcher)) {
                return Err(RegistrationError::PrecedenceTie {
                    template: matcher.as_str().to_string(),
                    existing: tie.matcher.as_str().to_string(),
                });
            }
            let typed = spec.locate;
            let name: Arc<str> = Arc::from(format!("{type_name}::locator {}", matcher.as_str()));
            let locate_name = Arc::clone(&name);
            locators.push(LocatorDescriptor {
                name,
                matcher,
                params: spec.params,
                locate: Arc::new(move |instance: &ResourceInstance, args: &mut Arguments<'_>| {
                    let this = downcast::<T>(instance, &locate_name)?;
                    typed(this, args)
                }),
            });
        }

        let mut sub_resources: Vec<SubResource> = groups
            .into_iter()
            .map(|(matcher, group)| SubResource::Methods { matcher, group })
            .chain(locators.into_iter().map(SubResource::Locator))
            .collect();
        sub_resources.sort_by(|a, b| {
            a.matcher()
                .precedence(b.matcher())
                .then(a.rank().cmp(&b.rank()))
                .then_with(|| a.matcher().as_str().cmp(b.matcher().as_str()))
        });

        Ok(ResourceClass {
            type_id: TypeId::of::<T>(),
            type_name,
            matcher,
            resource_methods,
            sub_resources,
        })
    }
}

fn method_descriptor<T: Any + Send + Sync>(
    spec: MethodSpec<T>,
    type_name: &'static str,
    template: &str,
) -> Result<MethodDescriptor, RegistrationError> {
    let http_method =
        Method::from_bytes(spec.method.as_bytes()).map_err(|_| RegistrationError::InvalidMethod {
            method: spec.method.clone(),
            template: template.to_string(),
        })?;
    let parse = |list: &[String]| -> Result<Vec<MediaType>, RegistrationError> {
        list.iter()
            .map(|value| {
                value
                    .parse::<MediaType>()
                    .map(|m| m.with_quality(1.0))
                    .map_err(|_| RegistrationError::InvalidMediaType {
                        value: value.clone(),
                        template: template.to_string(),
                    })
            })
            .collect()
    };
    let consumes = parse(&spec.consumes)?;
    let produces = parse(&spec.produces)?;

    let name: Arc<str> = Arc::from(format!("{type_name}::{http_method} {template}"));
    let handler_name = Arc::clone(&name);
    let typed = spec.handler;
    Ok(MethodDescriptor {
        name,
        http_method,
        consumes,
        produces,
        params: spec.params,
        handler: Arc::new(move |instance: &ResourceInstance, args: &mut Arguments<'_>| {
            let this = downcast::<T>(instance, &handler_name)?;
            typed(this, args)
        }),
    })
}

fn same_binding(a: &MethodDescriptor, b: &MethodDescriptor) -> bool {
    a.http_method == b.http_method && a.consumes == b.consumes && a.produces == b.produces
}

fn downcast<'a, T: Any>(instance: &'a ResourceInstance, name: &str) -> Result<&'a T, HandlerError> {
    instance.downcast_ref::<T>().ok_or_else(|| {
        HandlerError::from(anyhow::anyhow!(
            "{name} was given an instance of the wrong type"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Books;
    struct Chapter;

    fn ok(_: &Books, _: &mut Arguments<'_>) -> Result<Reply, HandlerError> {
        Ok(Reply::NoContent)
    }

    #[test]
    fn test_sub_resources_sorted_by_precedence() {
        let class = ResourceBuilder::<Books>::at("/books")
            .method(MethodSpec::get(ok).path("{id}"))
            .method(MethodSpec::get(ok).path("latest"))
            .locator(LocatorSpec::new("{id}/chapters", |_: &Books, _| Ok(Chapter)))
            .method(MethodSpec::get(ok))
            .build()
            .unwrap();
        let order: Vec<&str> = class.sub_resources().iter().map(|s| s.matcher().as_str()).collect();
        assert_eq!(order, vec!["/{id}/chapters", "/latest", "/{id}"]);
        assert!(class.resource_methods().is_some());
        assert_eq!(class.matcher().unwrap().as_str(), "/books");
    }

    #[test]
    fn test_method_sorts_ahead_of_tying_locator() {
        let class = ResourceBuilder::<Books>::at("/books")
            .locator(LocatorSpec::new("{id}", |_: &Books, _| Ok(Chapter)))
            .method(MethodSpec::get(ok).path("{id}"))
            .build()
            .unwrap();
        assert!(matches!(class.sub_resources()[0], SubResource::Methods { .. }));
        assert!(matches!(class.sub_resources()[1], SubResource::Locator(_)));
    }

    #[test]
    fn test_methods_with_same_template_share_a_group() {
        let class = ResourceBuilder::<Books>::at("/books")
            .method(MethodSpec::get(ok).path("{id}").produces(&["application/json"]))
            .method(MethodSpec::get(ok).path("{id}/").produces(&["text/plain"]))
            .method(MethodSpec::delete(ok).path("{id}"))
            .build()
            .unwrap();
        assert_eq!(class.sub_resources().len(), 1);
        let SubResource::Methods { group, .. } = &class.sub_resources()[0] else {
            panic!("expected a method group");
        };
        assert_eq!(group.methods().len(), 3);
        assert_eq!(group.allow(), vec!["GET", "DELETE", "HEAD", "OPTIONS"]);
    }

    #[test]
    fn test_registration_errors() {
        let err = ResourceBuilder::<Books>::at("/books")
            .method(MethodSpec::get(ok).path("{id}"))
            .method(MethodSpec::get(ok).path("{name}"))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistrationError::PrecedenceTie { .. }));

        let err = ResourceBuilder::<Books>::at("/books")
            .locator(LocatorSpec::new("{id}", |_: &Books, _| Ok(Chapter)))
            .locator(LocatorSpec::new("{id}", |_: &Books, _| Ok(Chapter)))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistrationError::PrecedenceTie { .. }));

        let err = ResourceBuilder::<Books>::at("/books")
            .method(MethodSpec::get(ok))
            .method(MethodSpec::get(ok))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicateMethod { .. }));

        let err = ResourceBuilder::<Books>::at("/books")
            .method(MethodSpec::get(ok).produces(&["nonsense"]))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidMediaType { .. }));

        let err = ResourceBuilder::<Books>::at("/books/{a}/{a}")
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Template(_)));

        let err = ResourceBuilder::<Books>::at("/books")
            .method(MethodSpec::new("NOT VALID", ok))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidMethod { .. }));
    }
}
