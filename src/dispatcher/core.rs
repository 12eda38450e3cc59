//! Request dispatch: root lookup, the sub-resource locator chain, method
//! selection, filters, handler invocation and response writing.

use std::any::Any;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use std::time::Instant;

use http::Method;
use tracing::{debug, error, info, warn};

use super::context::{Request, RequestContext};
use super::response::{ContainerResponseWriter, Response};
use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::ids::RequestId;
use crate::media::{best_consumer, best_producer, MediaType, Negotiated};
use crate::provider::EntityProviders;
use crate::resource::{
    resolve_all, Arguments, MethodDescriptor, MethodGroup, ResourceClass, ResourceInstance,
    ResourceTree, SubResource, TreeState,
};
use crate::router::PathMatch;

/// Routes requests through a [`ResourceTree`].
///
/// Every failure is turned into an ordinary [`Response`]; nothing but the
/// response leaves [`handle`](Self::handle).
#[derive(Clone)]
pub struct Dispatcher {
    tree: Arc<ResourceTree>,
    config: DispatcherConfig,
}

impl Dispatcher {
    #[must_use]
    pub fn new(tree: Arc<ResourceTree>) -> Self {
        Self::with_config(tree, DispatcherConfig::default())
    }

    #[must_use]
    pub fn with_config(tree: Arc<ResourceTree>, config: DispatcherConfig) -> Self {
        Self { tree, config }
    }

    #[must_use]
    pub fn tree(&self) -> &Arc<ResourceTree> {
        &self.tree
    }

    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Dispatch one request and assemble its response.
    ///
    /// The response always carries the request id header. For `HEAD` the
    /// entity is dropped, status and headers are kept.
    #[must_use]
    pub fn handle(&self, request: Request) -> Response {
        let start = Instant::now();
        let request_id =
            RequestId::from_header_or_new(request.get_header(&self.config.request_id_header));
        let is_head = request.method.eq_ignore_ascii_case("HEAD");
        let method = request.method.clone();
        let uri = request.uri.clone();

        let mut response = {
            let tree = self.tree.read();
            match RequestContext::new(request, request_id) {
                Ok(mut ctx) => {
                    let mut response = match self.dispatch(&tree, &mut ctx) {
                        Ok(response) => response,
                        Err(err) => self.failure(request_id, &method, &uri, err),
                    };
                    tree.filters.apply_response(&ctx, &mut response);
                    response
                }
                Err(err) => self.failure(request_id, &method, &uri, err),
            }
        };

        if is_head {
            response.entity = None;
        }
        response.set_header(&self.config.request_id_header, request_id.to_string());

        info!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            status = response.status,
            duration_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX),
            "request handled"
        );
        response
    }

    /// [`handle`](Self::handle) for transports that hand over raw parts.
    #[must_use]
    pub fn handle_parts(
        &self,
        method: &str,
        request_uri: &str,
        base_uri: &str,
        headers: &HashMap<String, Vec<String>>,
        body: Option<Box<dyn Read + Send>>,
    ) -> Response {
        let mut request = Request::new(method, request_uri).base_uri(base_uri);
        for (name, values) in headers {
            for value in values {
                request = request.header(name, value);
            }
        }
        request.body = body;
        self.handle(request)
    }

    /// Handle `request` and write the response through `writer`.
    ///
    /// The entity is serialized before anything is written, so a missing
    /// writer or a serialization failure still produces a clean 500. I/O
    /// failures while writing mean the client is gone; they are logged and
    /// otherwise ignored. Returns the status that was sent.
    pub fn handle_and_write(
        &self,
        request: Request,
        writer: &mut dyn ContainerResponseWriter,
    ) -> u16 {
        let mut response = self.handle(request);
        let body = match self.render(&mut response) {
            Ok(body) => body,
            Err(err) => {
                error!(
                    status = 500,
                    entity = response.entity_type().unwrap_or_default(),
                    error = %err,
                    "response entity could not be written"
                );
                let request_id = response
                    .get_header(&self.config.request_id_header)
                    .map(str::to_string);
                response = err.into_response(self.config.error_entities);
                if let Some(id) = request_id {
                    response.set_header(&self.config.request_id_header, id);
                }
                self.render(&mut response).unwrap_or_else(|_| {
                    response.entity = None;
                    Vec::new()
                })
            }
        };
        if response.entity.is_some() {
            response.set_header("content-length", body.len().to_string());
        }

        let status = response.status;
        let written = write_out(writer, status, &response, &body);
        if let Err(e) = written {
            warn!(
                status = status,
                error = %e,
                "client went away while the response was written"
            );
        }
        status
    }

    /// Serialize the entity through the provider registry, filling in
    /// `content-type` when it is missing.
    fn render(&self, response: &mut Response) -> Result<Vec<u8>, DispatchError> {
        let Some(entity) = &response.entity else {
            return Ok(Vec::new());
        };
        let media = response
            .media_type
            .clone()
            .or_else(|| {
                response
                    .get_header("content-type")
                    .and_then(|v| v.parse::<MediaType>().ok())
            })
            .unwrap_or_else(MediaType::octet_stream);
        let writer = self
            .tree
            .read()
            .providers
            .find_writer(entity.type_id(), &media)
            .ok_or_else(|| {
                DispatchError::Internal(format!(
                    "no writer for {} as {}",
                    entity.type_name(),
                    media.essence()
                ))
            })?;
        let mut out = Vec::new();
        writer.write(entity, &media, &mut out).map_err(|e| {
            DispatchError::Internal(format!("unable to write {}: {e:#}", entity.type_name()))
        })?;
        if response.get_header("content-type").is_none() {
            response.set_header("content-type", media.to_string());
        }
        Ok(out)
    }

    fn failure(
        &self,
        request_id: RequestId,
        method: &str,
        uri: &str,
        err: DispatchError,
    ) -> Response {
        let status = err.status();
        if status >= 500 {
            error!(
                request_id = %request_id,
                method = %method,
                uri = %uri,
                status,
                error = %err,
                "request failed"
            );
        } else if matches!(status, 400 | 401 | 403) {
            warn!(
                request_id = %request_id,
                method = %method,
                uri = %uri,
                status,
                error = %err,
                "request rejected"
            );
        } else {
            debug!(
                request_id = %request_id,
                method = %method,
                uri = %uri,
                status,
                error = %err,
                "request not routed"
            );
        }
        err.into_response(self.config.error_entities)
    }

    fn dispatch(
        &self,
        tree: &TreeState,
        ctx: &mut RequestContext,
    ) -> Result<Response, DispatchError> {
        tree.filters.apply_request(ctx)?;

        let path = ctx.path().to_string();
        let (root, mut matched) = tree
            .roots
            .iter()
            .find_map(|root| {
                let m = root.class.matcher()?.matches(&path)?;
                if !m.is_exact() && root.class.sub_resources().is_empty() {
                    debug!(
                        path = %path,
                        template = root.class.matcher().map(|t| t.as_str()).unwrap_or_default(),
                        "root skipped, nothing below it can match"
                    );
                    return None;
                }
                Some((root, m))
            })
            .ok_or_else(|| DispatchError::NotFound(format!("no resource matches {path}")))?;

        debug!(
            request_id = %ctx.request_id(),
            path = %path,
            resource = root.class.type_name(),
            "root resource matched"
        );
        let mut instance = root.factory.instance(ctx)?;
        let mut class = Arc::clone(&root.class);
        enter(ctx, &path, &matched, &instance);

        let mut depth = 0usize;
        loop {
            if matched.is_exact() {
                if let Some(group) = class.resource_methods() {
                    return self.invoke_group(tree, ctx, &instance, group);
                }
            }

            let tail = matched.tail().to_string();
            let (sub, sub_match) = class
                .sub_resources()
                .iter()
                .find_map(|sub| {
                    let m = sub.matcher().matches(&tail)?;
                    match sub {
                        SubResource::Methods { .. } if !m.is_exact() => None,
                        _ => Some((sub, m)),
                    }
                })
                .ok_or_else(|| DispatchError::NotFound(format!("no resource matches {path}")))?;

            match sub {
                SubResource::Methods { group, .. } => {
                    record_uri(ctx, &path, &sub_match);
                    ctx.push_path_params(sub_match.params);
                    return self.invoke_group(tree, ctx, &instance, group);
                }
                SubResource::Locator(locator) => {
                    depth += 1;
                    if depth > self.config.max_locator_depth {
                        return Err(DispatchError::Internal(format!(
                            "sub-resource locator chain for {path} exceeds {} levels",
                            self.config.max_locator_depth
                        )));
                    }
                    record_uri(ctx, &path, &sub_match);
                    ctx.push_path_params(sub_match.params.clone());

                    let values = resolve_all(locator.params(), ctx, &tree.providers)?;
                    let next = {
                        let mut args = Arguments::new(ctx, values);
                        locator.locate(&instance, &mut args)?
                    };
                    let next_class = lookup_class(tree, &next).ok_or_else(|| {
                        DispatchError::Internal(format!(
                            "{} returned a resource type with no registered class",
                            locator.name()
                        ))
                    })?;
                    debug!(
                        request_id = %ctx.request_id(),
                        locator = locator.name(),
                        resource = next_class.type_name(),
                        remaining = %sub_match.tail(),
                        "sub-resource located"
                    );
                    ctx.push_matched_resource(Arc::clone(&next));
                    class = next_class;
                    instance = next;
                    matched = sub_match;
                }
            }
        }
    }

    /// METHOD_MATCH: pick the descriptor for the request method and the
    /// negotiated media types, then invoke it.
    fn invoke_group(
        &self,
        tree: &TreeState,
        ctx: &mut RequestContext,
        instance: &ResourceInstance,
        group: &MethodGroup,
    ) -> Result<Response, DispatchError> {
        let method = ctx.method().clone();
        let mut candidates: Vec<&Arc<MethodDescriptor>> = group
            .methods()
            .iter()
            .filter(|m| *m.http_method() == method)
            .collect();
        if candidates.is_empty() && method == Method::HEAD && self.config.head_fallback {
            candidates = group
                .methods()
                .iter()
                .filter(|m| *m.http_method() == Method::GET)
                .collect();
        }
        if candidates.is_empty() {
            let allow = group.allow();
            if method == Method::OPTIONS && self.config.auto_options {
                return Ok(Response::status(200).header("allow", allow.join(",")));
            }
            return Err(DispatchError::MethodNotAllowed {
                method: method.to_string(),
                path: ctx.path().to_string(),
                allow,
            });
        }

        let (descriptor, negotiated) = select(&candidates, ctx)?;
        debug!(
            request_id = %ctx.request_id(),
            handler = descriptor.name(),
            media_type = %negotiated.media_type,
            "method selected"
        );
        ctx.set_response_media_type(negotiated.media_type.clone());
        self.invoke(tree, ctx, instance, descriptor, negotiated.media_type)
    }

    /// FILTER_PRE, INVOKE, FILTER_POST.
    fn invoke(
        &self,
        tree: &TreeState,
        ctx: &mut RequestContext,
        instance: &ResourceInstance,
        method: &MethodDescriptor,
        media: MediaType,
    ) -> Result<Response, DispatchError> {
        tree.filters.before_invoke(ctx, method)?;
        let values = resolve_all(method.params(), ctx, &tree.providers)?;

        let start = Instant::now();
        let result = {
            let mut args = Arguments::new(ctx, values);
            method.invoke(instance, &mut args)
        };
        let latency = start.elapsed();

        let mut response = match result {
            Ok(reply) => {
                let mut response = reply.into_response();
                if response.entity.is_some() {
                    if response.media_type.is_none() {
                        response.media_type = Some(media);
                    }
                    if response.get_header("content-type").is_none() {
                        if let Some(m) = &response.media_type {
                            let value = m.to_string();
                            response.set_header("content-type", value);
                        }
                    }
                }
                response
            }
            Err(err) => {
                let err = DispatchError::from(err);
                if err.status() >= 500 {
                    error!(
                        request_id = %ctx.request_id(),
                        handler = method.name(),
                        error = %err,
                        "handler failed"
                    );
                } else {
                    debug!(
                        request_id = %ctx.request_id(),
                        handler = method.name(),
                        status = err.status(),
                        error = %err,
                        "handler returned an error status"
                    );
                }
                err.into_response(self.config.error_entities)
            }
        };
        tree.filters.after_invoke(ctx, method, &mut response, latency)?;
        Ok(response)
    }
}

fn write_out(
    writer: &mut dyn ContainerResponseWriter,
    status: u16,
    response: &Response,
    body: &[u8],
) -> std::io::Result<()> {
    writer.write_head(status, &response.headers)?;
    if !body.is_empty() {
        writer.write_body(body)?;
    }
    writer.finish()
}

/// Record the part of the path matched so far, plus the root's captures and
/// instance.
fn enter(ctx: &mut RequestContext, path: &str, matched: &PathMatch, instance: &ResourceInstance) {
    record_uri(ctx, path, matched);
    ctx.push_path_params(matched.params.clone());
    ctx.push_matched_resource(Arc::clone(instance));
}

fn record_uri(ctx: &mut RequestContext, path: &str, matched: &PathMatch) {
    let consumed = path.len().saturating_sub(matched.tail().len());
    let uri = match &path[..consumed] {
        "" => "/",
        prefix => prefix,
    };
    ctx.push_matched_uri(uri.to_string());
}

/// Quality, then accept and declared specificity, then consumer specificity.
fn compare(a: &Negotiated, a_consumer: u8, b: &Negotiated, b_consumer: u8) -> Ordering {
    a.score
        .quality
        .partial_cmp(&b.score.quality)
        .unwrap_or(Ordering::Equal)
        .then(a.score.accept_specificity.cmp(&b.score.accept_specificity))
        .then(a.score.declared_specificity.cmp(&b.score.declared_specificity))
        .then(a_consumer.cmp(&b_consumer))
}

fn lookup_class(tree: &TreeState, instance: &ResourceInstance) -> Option<Arc<ResourceClass>> {
    let type_id = Any::type_id(instance.as_ref());
    tree.class_of(type_id).map(Arc::clone)
}

/// Among methods allowed for the request, keep those consuming the request
/// content type and choose the best producer. Ties go to the more specific
/// consumer, then to declaration order.
fn select<'a>(
    candidates: &[&'a Arc<MethodDescriptor>],
    ctx: &RequestContext,
) -> Result<(&'a MethodDescriptor, Negotiated), DispatchError> {
    let consuming: Vec<(&'a MethodDescriptor, u8)> = match ctx.content_type() {
        Some(content_type) => candidates
            .iter()
            .filter_map(|&m| {
                best_consumer(m.consumes(), content_type).map(|c| (&**m, c.specificity()))
            })
            .collect(),
        None => candidates.iter().map(|&m| (&**m, 0)).collect(),
    };
    if consuming.is_empty() {
        return Err(DispatchError::UnsupportedMediaType(format!(
            "content type {} is not consumed by {}",
            ctx.content_type().map(MediaType::essence).unwrap_or_default(),
            ctx.path()
        )));
    }

    let mut best: Option<(&'a MethodDescriptor, u8, Negotiated)> = None;
    for (method, consumer) in consuming {
        let Some(negotiated) = best_producer(method.produces(), ctx.accept()) else {
            continue;
        };
        let better = best.as_ref().map_or(true, |(_, c, n)| {
            compare(&negotiated, consumer, n, *c) == Ordering::Greater
        });
        if better {
            best = Some((method, consumer, negotiated));
        }
    }
    best.map(|(m, _, n)| (m, n)).ok_or_else(|| {
        let accepted: Vec<String> = ctx.accept().iter().map(ToString::to_string).collect();
        DispatchError::NotAcceptable(format!(
            "{} cannot produce any of [{}]",
            ctx.path(),
            accepted.join(", ")
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{BufferedResponseWriter, Reply};
    use crate::error::HandlerError;
    use crate::resource::{LocatorSpec, MethodSpec, ParamSpec, ResourceBuilder};

    struct Items;
    struct Item {
        id: u32,
    }

    fn dispatcher() -> Dispatcher {
        let tree = Arc::new(ResourceTree::new());
        tree.add_singleton(
            ResourceBuilder::at("/items")
                .method(MethodSpec::get(|_: &Items, _| Ok(Reply::entity("all".to_string()))))
                .method(
                    MethodSpec::post(|_: &Items, args| {
                        let body: String = args.body()?;
                        Ok(Response::status(201).header("location", format!("/items/{body}")).into())
                    })
                    .consumes(&["text/plain"])
                    .param(ParamSpec::body::<String>()),
                )
                .locator(
                    LocatorSpec::new("{id}", |_: &Items, args| Ok(Item { id: args.take("id")? }))
                        .param(ParamSpec::path::<u32>("id")),
                ),
            Items,
        )
        .unwrap();
        tree.add_sub_resource(
            ResourceBuilder::<Item>::new()
                .method(
                    MethodSpec::get(|item: &Item, _| Ok(Reply::entity(format!("item {}", item.id))))
                        .produces(&["text/plain"]),
                )
                .method(MethodSpec::delete(|item: &Item, _| {
                    if item.id == 0 {
                        Err(HandlerError::with_status(409, "item 0 is permanent"))
                    } else {
                        Ok(Reply::NoContent)
                    }
                })),
        )
        .unwrap();
        Dispatcher::new(tree)
    }

    fn text(resp: &Response) -> Option<&String> {
        resp.entity_as::<String>()
    }

    #[test]
    fn test_resource_method() {
        let resp = dispatcher().handle(Request::new("GET", "/items"));
        assert_eq!(resp.status, 200);
        assert_eq!(text(&resp).map(String::as_str), Some("all"));
        assert!(resp.get_header("x-request-id").is_some());
    }

    #[test]
    fn test_locator_chain() {
        let resp = dispatcher().handle(Request::new("GET", "/items/7"));
        assert_eq!(resp.status, 200);
        assert_eq!(text(&resp).map(String::as_str), Some("item 7"));
        assert_eq!(resp.get_header("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_locator_param_failure_is_not_found() {
        let resp = dispatcher().handle(Request::new("GET", "/items/abc"));
        assert_eq!(resp.status, 404);
    }

    #[test]
    fn test_handler_status_passes_through() {
        let resp = dispatcher().handle(Request::new("DELETE", "/items/0"));
        assert_eq!(resp.status, 409);
        let resp = dispatcher().handle(Request::new("DELETE", "/items/1"));
        assert_eq!(resp.status, 204);
    }

    #[test]
    fn test_method_not_allowed_and_options() {
        let d = dispatcher();
        let resp = d.handle(Request::new("PUT", "/items/1"));
        assert_eq!(resp.status, 405);
        assert_eq!(resp.get_header("allow"), Some("GET,DELETE,HEAD,OPTIONS"));

        let resp = d.handle(Request::new("OPTIONS", "/items"));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.get_header("allow"), Some("GET,POST,HEAD,OPTIONS"));
    }

    #[test]
    fn test_head_served_by_get() {
        let resp = dispatcher().handle(Request::new("HEAD", "/items/3"));
        assert_eq!(resp.status, 200);
        assert!(resp.entity.is_none());
        assert_eq!(resp.get_header("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_consumes_and_produces() {
        let d = dispatcher();
        let resp = d.handle(
            Request::new("POST", "/items")
                .header("Content-Type", "application/json")
                .body_bytes("{}"),
        );
        assert_eq!(resp.status, 415);

        let resp = d.handle(
            Request::new("POST", "/items")
                .header("Content-Type", "text/plain")
                .body_bytes("9"),
        );
        assert_eq!(resp.status, 201);
        assert_eq!(resp.get_header("location"), Some("/items/9"));

        let resp = d.handle(Request::new("GET", "/items/1").header("Accept", "application/json"));
        assert_eq!(resp.status, 406);
    }

    #[test]
    fn test_incoming_request_id_reused() {
        let id = RequestId::new().to_string();
        let resp = dispatcher().handle(Request::new("GET", "/missing").header("X-Request-Id", &id));
        assert_eq!(resp.status, 404);
        assert_eq!(resp.get_header("x-request-id"), Some(id.as_str()));
    }

    #[test]
    fn test_handle_and_write() {
        let mut out = BufferedResponseWriter::new();
        let status = dispatcher().handle_and_write(Request::new("GET", "/items/5"), &mut out);
        assert_eq!(status, 200);
        assert_eq!(out.status, Some(200));
        assert_eq!(out.body_text(), "item 5");
        assert_eq!(out.get_header("content-length"), Some("6"));
        assert!(out.finished);
    }

    #[test]
    fn test_missing_writer_becomes_500() {
        struct Opaque;
        struct Odd;
        let tree = Arc::new(ResourceTree::new());
        tree.add_singleton(
            ResourceBuilder::at("/odd").method(MethodSpec::get(|_: &Odd, _| Ok(Reply::entity(Opaque)))),
            Odd,
        )
        .unwrap();
        let mut out = BufferedResponseWriter::new();
        let status = Dispatcher::new(tree).handle_and_write(Request::new("GET", "/odd"), &mut out);
        assert_eq!(status, 500);
        assert_eq!(out.get_header("content-type"), Some("text/plain"));
        assert!(out.get_header("x-request-id").is_some());
    }
}
