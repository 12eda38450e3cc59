use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use serde::Serialize;
use tracing::{debug, info};

use super::class::{ResourceBuilder, ResourceClass, SubResource};
use super::factory::{ObjectFactory, PerRequestFactory, SingletonFactory};
use crate::dispatcher::RequestContext;
use crate::error::{HandlerError, RegistrationError};
use crate::filter::{FilterChain, FilterEntry};
use crate::provider::{ProviderBinder, ProviderEntry};
use crate::router::PathMatcher;

/// A class mounted at its path together with the factory supplying its
/// instances.
#[derive(Clone)]
pub struct RootResource {
    pub class: Arc<ResourceClass>,
    pub factory: Arc<dyn ObjectFactory>,
}

impl RootResource {
    /// Root resources always carry a path; checked when bound.
    fn matcher(&self) -> Option<&PathMatcher> {
        self.class.matcher()
    }
}

/// Everything that can be bound into a [`ResourceTree`].
pub enum Binding {
    /// Root resource, reachable from the request path.
    Resource {
        class: ResourceClass,
        factory: Arc<dyn ObjectFactory>,
    },
    /// Class only reachable through a locator.
    SubResource(ResourceClass),
    Provider(ProviderEntry),
    Filter(FilterEntry),
}

/// Notified after a resource class is added to or removed from the tree.
pub trait ResourceListener: Send + Sync {
    fn on_add(&self, _class: &ResourceClass) {}
    fn on_remove(&self, _class: &ResourceClass) {}
}

pub(crate) struct TreeState {
    /// Sorted by template precedence, most specific first.
    pub(crate) roots: Vec<RootResource>,
    pub(crate) classes: HashMap<TypeId, Arc<ResourceClass>>,
    pub(crate) providers: ProviderBinder,
    pub(crate) filters: FilterChain,
}

impl TreeState {
    pub(crate) fn class_of(&self, type_id: TypeId) -> Option<&Arc<ResourceClass>> {
        self.classes.get(&type_id)
    }
}

/// Registered resources, providers and filters.
///
/// Dispatch holds the read lock for the whole request, so registration waits
/// for in-flight requests and blocks new ones until it completes.
pub struct ResourceTree {
    state: RwLock<TreeState>,
    listeners: RwLock<Vec<Arc<dyn ResourceListener>>>,
}

impl Default for ResourceTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceTree {
    /// Tree with the built-in entity providers.
    #[must_use]
    pub fn new() -> Self {
        Self::with_providers(ProviderBinder::with_defaults())
    }

    #[must_use]
    pub fn with_providers(providers: ProviderBinder) -> Self {
        Self {
            state: RwLock::new(TreeState {
                roots: Vec::new(),
                classes: HashMap::new(),
                providers,
                filters: FilterChain::new(),
            }),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, TreeState> {
        self.state.read()
    }

    /// Bind one entry.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::MissingPath`] for a root without a template,
    /// [`RegistrationError::PrecedenceTie`] when a root template cannot be
    /// ordered against an existing one. The tree is unchanged on error.
    pub fn bind(&self, binding: Binding) -> Result<(), RegistrationError> {
        match binding {
            Binding::Resource { class, factory } => self.bind_root(class, factory),
            Binding::SubResource(class) => {
                let class = Arc::new(class);
                self.state
                    .write()
                    .classes
                    .insert(class.type_id(), Arc::clone(&class));
                info!(resource = class.type_name(), "sub-resource class registered");
                self.notify(|l| l.on_add(&class));
                Ok(())
            }
            Binding::Provider(entry) => {
                self.state.write().providers.add(entry);
                Ok(())
            }
            Binding::Filter(entry) => {
                debug!(filter = ?entry, "filter registered");
                self.state.write().filters.push(entry);
                Ok(())
            }
        }
    }

    fn bind_root(
        &self,
        class: ResourceClass,
        factory: Arc<dyn ObjectFactory>,
    ) -> Result<(), RegistrationError> {
        let Some(matcher) = class.matcher().cloned() else {
            return Err(RegistrationError::MissingPath {
                type_name: class.type_name(),
            });
        };
        let template = matcher.as_str().to_string();
        let class = Arc::new(class);
        {
            let mut state = self.state.write();
            if let Some(existing) = state
                .roots
                .iter()
                .filter_map(RootResource::matcher)
                .find(|m| m.ties_with(&matcher))
            {
                return Err(RegistrationError::PrecedenceTie {
                    template,
                    existing: existing.as_str().to_string(),
                });
            }
            state.roots.push(RootResource {
                class: Arc::clone(&class),
                factory,
            });
            state.roots.sort_by(|a, b| a.matcher().cmp(&b.matcher()));
            state.classes.insert(class.type_id(), Arc::clone(&class));
            info!(
                template = %template,
                resource = class.type_name(),
                total_roots = state.roots.len(),
                "root resource registered"
            );
        }
        self.notify(|l| l.on_add(&class));
        Ok(())
    }

    /// Bind a root resource.
    ///
    /// # Errors
    ///
    /// See [`bind`](Self::bind).
    pub fn add_resource(
        &self,
        class: ResourceClass,
        factory: Arc<dyn ObjectFactory>,
    ) -> Result<(), RegistrationError> {
        self.bind(Binding::Resource { class, factory })
    }

    /// Build `builder` and mount it with one shared instance.
    ///
    /// # Errors
    ///
    /// Any error from [`ResourceBuilder::build`] or [`bind`](Self::bind).
    pub fn add_singleton<T: Any + Send + Sync>(
        &self,
        builder: ResourceBuilder<T>,
        value: T,
    ) -> Result<(), RegistrationError> {
        let class = builder.build()?;
        self.add_resource(class, Arc::new(SingletonFactory::new(value)))
    }

    /// Build `builder` and mount it with an instance created per request.
    ///
    /// # Errors
    ///
    /// Any error from [`ResourceBuilder::build`] or [`bind`](Self::bind).
    pub fn add_per_request<T, F>(
        &self,
        builder: ResourceBuilder<T>,
        make: F,
    ) -> Result<(), RegistrationError>
    where
        T: Any + Send + Sync,
        F: Fn(&RequestContext) -> Result<T, HandlerError> + Send + Sync + 'static,
    {
        let class = builder.build()?;
        self.add_resource(class, Arc::new(PerRequestFactory::new(make)))
    }

    /// Register the class of a type returned by locators.
    ///
    /// # Errors
    ///
    /// Any error from [`ResourceBuilder::build`].
    pub fn add_sub_resource<T: Any + Send + Sync>(
        &self,
        builder: ResourceBuilder<T>,
    ) -> Result<(), RegistrationError> {
        self.bind(Binding::SubResource(builder.build()?))
    }

    pub fn add_provider(&self, entry: ProviderEntry) {
        self.state.write().providers.add(entry);
    }

    /// Register JSON reading and writing for `T`.
    pub fn json<T>(&self)
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Send + 'static,
    {
        self.state.write().providers.json::<T>();
    }

    pub fn add_filter(&self, entry: FilterEntry) {
        debug!(filter = ?entry, "filter registered");
        self.state.write().filters.push(entry);
    }

    pub fn add_listener(&self, listener: Arc<dyn ResourceListener>) {
        self.listeners.write().push(listener);
    }

    /// Remove the root mounted at `template`. Returns whether one was found.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::Template`] when `template` does not compile.
    pub fn remove_resource(&self, template: &str) -> Result<bool, RegistrationError> {
        let normalized = PathMatcher::new(template)?;
        let removed = {
            let mut state = self.state.write();
            let Some(pos) = state
                .roots
                .iter()
                .position(|r| r.matcher() == Some(&normalized))
            else {
                return Ok(false);
            };
            let root = state.roots.remove(pos);
            let type_id = root.class.type_id();
            if state.roots.iter().all(|r| r.class.type_id() != type_id) {
                state.classes.remove(&type_id);
            }
            info!(
                template = %normalized.as_str(),
                resource = root.class.type_name(),
                "root resource removed"
            );
            root.class
        };
        self.notify(|l| l.on_remove(&removed));
        Ok(true)
    }

    /// Remove every root and sub-resource class of type `T`.
    pub fn remove_type<T: Any>(&self) -> bool {
        let type_id = TypeId::of::<T>();
        let removed = {
            let mut state = self.state.write();
            state.roots.retain(|r| r.class.type_id() != type_id);
            state.classes.remove(&type_id)
        };
        match removed {
            Some(class) => {
                info!(resource = class.type_name(), "resource type removed");
                self.notify(|l| l.on_remove(&class));
                true
            }
            None => false,
        }
    }

    /// Number of root resources.
    #[must_use]
    pub fn root_count(&self) -> usize {
        self.state.read().roots.len()
    }

    /// Roots in precedence order with their methods and locators.
    #[must_use]
    pub fn describe(&self) -> Vec<ResourceSummary> {
        let state = self.state.read();
        state
            .roots
            .iter()
            .map(|root| ResourceSummary::of(&root.class))
            .collect()
    }

    fn notify(&self, f: impl Fn(&dyn ResourceListener)) {
        for listener in self.listeners.read().iter() {
            f(listener.as_ref());
        }
    }
}

/// Serializable view of a root resource.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResourceSummary {
    pub template: String,
    pub resource: String,
    pub methods: Vec<MethodSummary>,
    pub locators: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MethodSummary {
    pub method: String,
    pub template: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub consumes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub produces: Vec<String>,
}

impl ResourceSummary {
    fn of(class: &ResourceClass) -> Self {
        let template = class.matcher().map_or("/", PathMatcher::as_str);
        let base = template.trim_end_matches('/');
        let join = |sub: &str| match format!("{base}{sub}") {
            full if full.is_empty() => "/".to_string(),
            full => full,
        };
        let summarize = |sub: &str, group: &super::class::MethodGroup| {
            group
                .methods()
                .iter()
                .map(|m| MethodSummary {
                    method: m.http_method().to_string(),
                    template: join(sub),
                    consumes: m.consumes().iter().map(ToString::to_string).collect(),
                    produces: m.produces().iter().map(ToString::to_string).collect(),
                })
                .collect::<Vec<_>>()
        };

        let mut methods = class
            .resource_methods()
            .map(|g| summarize("", g))
            .unwrap_or_default();
        let mut locators = Vec::new();
        for sub in class.sub_resources() {
            match sub {
                SubResource::Methods { matcher, group } => {
                    methods.extend(summarize(matcher.as_str(), group));
                }
                SubResource::Locator(locator) => {
                    locators.push(join(locator.matcher().as_str()));
                }
            }
        }
        Self {
            template: template.to_string(),
            resource: class.type_name().to_string(),
            methods,
            locators,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::dispatcher::Reply;
    use crate::resource::{LocatorSpec, MethodSpec};

    struct A;
    struct B;
    struct Child;

    fn a() -> ResourceBuilder<A> {
        ResourceBuilder::at("/a/b/{x}").method(MethodSpec::get(|_: &A, _| Ok(Reply::NoContent)))
    }

    #[test]
    fn test_roots_sorted_by_precedence() {
        let tree = ResourceTree::new();
        tree.add_singleton(
            ResourceBuilder::at("/a/{y}/c").method(MethodSpec::get(|_: &B, _| Ok(Reply::NoContent))),
            B,
        )
        .unwrap();
        tree.add_singleton(a(), A).unwrap();
        let templates: Vec<String> = tree.describe().into_iter().map(|s| s.template).collect();
        assert_eq!(templates, vec!["/a/b/{x}", "/a/{y}/c"]);
    }

    #[test]
    fn test_tying_roots_rejected() {
        let tree = ResourceTree::new();
        tree.add_singleton(a(), A).unwrap();
        let err = tree
            .add_singleton(
                ResourceBuilder::at("/a/b/{z}").method(MethodSpec::get(|_: &B, _| Ok(Reply::NoContent))),
                B,
            )
            .unwrap_err();
        assert!(matches!(err, RegistrationError::PrecedenceTie { .. }));
        assert_eq!(tree.root_count(), 1);
    }

    #[test]
    fn test_root_needs_path() {
        let tree = ResourceTree::new();
        let err = tree.add_singleton(ResourceBuilder::<A>::new(), A).unwrap_err();
        assert!(matches!(err, RegistrationError::MissingPath { .. }));
    }

    #[test]
    fn test_remove_by_template_and_type() {
        let tree = ResourceTree::new();
        tree.add_singleton(a(), A).unwrap();
        assert!(tree.remove_resource("a/b/{x}/").unwrap());
        assert!(!tree.remove_resource("/a/b/{x}").unwrap());
        tree.add_singleton(a(), A).unwrap();
        assert!(tree.remove_type::<A>());
        assert_eq!(tree.root_count(), 0);
        assert!(!tree.remove_type::<A>());
    }

    #[test]
    fn test_listeners_notified() {
        #[derive(Default)]
        struct Counter {
            added: AtomicUsize,
            removed: AtomicUsize,
        }
        impl ResourceListener for Counter {
            fn on_add(&self, _class: &ResourceClass) {
                self.added.fetch_add(1, Ordering::SeqCst);
            }
            fn on_remove(&self, _class: &ResourceClass) {
                self.removed.fetch_add(1, Ordering::SeqCst);
            }
        }

        let tree = ResourceTree::new();
        let counter = Arc::new(Counter::default());
        tree.add_listener(Arc::clone(&counter) as Arc<dyn ResourceListener>);
        tree.add_singleton(a(), A).unwrap();
        tree.add_sub_resource(ResourceBuilder::<Child>::new()).unwrap();
        tree.remove_type::<A>();
        assert_eq!(counter.added.load(Ordering::SeqCst), 2);
        assert_eq!(counter.removed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_describe_lists_methods_and_locators() {
        let tree = ResourceTree::new();
        tree.add_singleton(
            ResourceBuilder::at("/shelf")
                .method(MethodSpec::get(|_: &A, _| Ok(Reply::NoContent)).produces(&["application/json"]))
                .method(MethodSpec::delete(|_: &A, _| Ok(Reply::NoContent)).path("{id}"))
                .locator(LocatorSpec::new("{id}/child", |_: &A, _| Ok(Child))),
            A,
        )
        .unwrap();
        let summary = &tree.describe()[0];
        assert_eq!(summary.template, "/shelf");
        assert_eq!(summary.methods.len(), 2);
        assert_eq!(summary.methods[0].produces, vec!["application/json"]);
        assert_eq!(summary.methods[1].template, "/shelf/{id}");
        assert_eq!(summary.locators, vec!["/shelf/{id}/child"]);
    }
}
