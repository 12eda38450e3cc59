use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

use http::Method;
use url::Url;

use super::response::HeaderVec;
use crate::error::DispatchError;
use crate::ids::RequestId;
use crate::media::{parse_accept, MediaType};
use crate::resource::ResourceInstance;
use crate::router::ParamVec;

/// Base URI used when the request does not provide one.
pub const DEFAULT_BASE_URI: &str = "http://localhost/";

const FORM_MEDIA: &str = "application/x-www-form-urlencoded";

/// Incoming request as handed over by the transport adapter.
pub struct Request {
    pub method: String,
    /// Absolute URI or absolute path, query included.
    pub uri: String,
    /// Base the resource paths are relative to.
    pub base_uri: String,
    pub headers: HeaderVec,
    pub body: Option<Box<dyn Read + Send>>,
}

impl Request {
    #[must_use]
    pub fn new(method: &str, uri: &str) -> Self {
        Self {
            method: method.to_string(),
            uri: uri.to_string(),
            base_uri: DEFAULT_BASE_URI.to_string(),
            headers: HeaderVec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn base_uri(mut self, base: &str) -> Self {
        self.base_uri = base.to_string();
        self
    }

    /// Append a header. Repeated names keep every value.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .push((Arc::from(name.to_ascii_lowercase()), value.to_string()));
        self
    }

    #[must_use]
    pub fn body<R: Read + Send + 'static>(mut self, body: R) -> Self {
        self.body = Some(Box::new(body));
        self
    }

    #[must_use]
    pub fn body_bytes(self, body: impl Into<Vec<u8>>) -> Self {
        self.body(std::io::Cursor::new(body.into()))
    }

    /// First value of a header (case-insensitive).
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("base_uri", &self.base_uri)
            .field("headers", &self.headers)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Per-request state shared by the dispatch stages.
///
/// Owned by the thread handling the request and never shared. Path, query,
/// matrix and form values are stored in their encoded form; accessors decode
/// unless asked not to.
pub struct RequestContext {
    request_id: RequestId,
    method: Method,
    request_uri: Url,
    base_uri: Url,
    path: String,
    headers: HeaderVec,
    query: ParamVec,
    matrix: ParamVec,
    path_params: ParamVec,
    form: Option<ParamVec>,
    content_type: Option<MediaType>,
    accept: Vec<MediaType>,
    response_media: Option<MediaType>,
    matched_uris: Vec<String>,
    matched_resources: Vec<ResourceInstance>,
    properties: HashMap<String, Box<dyn Any + Send + Sync>>,
    body: Option<Box<dyn Read + Send>>,
}

impl RequestContext {
    /// Build the context for `request`.
    ///
    /// # Errors
    ///
    /// - `BadRequest` for an unknown method, an unparsable URI or malformed
    ///   `Content-Type` / `Accept` headers
    /// - `NotFound` when the request URI is not below the base URI
    pub fn new(request: Request, request_id: RequestId) -> Result<Self, DispatchError> {
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| DispatchError::BadRequest(format!("invalid method '{}'", request.method)))?;

        let base_uri = parse_base(&request.base_uri)?;
        let request_uri = base_uri
            .join(&request.uri)
            .map_err(|e| DispatchError::BadRequest(format!("invalid request URI '{}': {e}", request.uri)))?;
        let relative = relative_path(&base_uri, &request_uri).ok_or_else(|| {
            DispatchError::NotFound(format!(
                "{} is not below base URI {}",
                request_uri, base_uri
            ))
        })?;
        let (path, matrix) = split_matrix(&relative);
        let query = request_uri.query().map(parse_pairs).unwrap_or_default();

        let content_type = request
            .get_header("content-type")
            .map(str::parse::<MediaType>)
            .transpose()
            .map_err(|e| DispatchError::BadRequest(e.to_string()))?;
        let accept = parse_accept(
            request
                .headers
                .iter()
                .filter(|(k, _)| k.eq_ignore_ascii_case("accept"))
                .map(|(_, v)| v.as_str()),
        )
        .map_err(|e| DispatchError::BadRequest(e.to_string()))?;

        Ok(Self {
            request_id,
            method,
            request_uri,
            base_uri,
            path,
            headers: request.headers,
            query,
            matrix,
            path_params: ParamVec::new(),
            form: None,
            content_type,
            accept,
            response_media: None,
            matched_uris: Vec::new(),
            matched_resources: Vec::new(),
            properties: HashMap::new(),
            body: request.body,
        })
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn request_uri(&self) -> &Url {
        &self.request_uri
    }

    #[must_use]
    pub fn base_uri(&self) -> &Url {
        &self.base_uri
    }

    /// Encoded path relative to the base URI, always starting with `/`,
    /// matrix parameters removed.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    /// First value of a header (case-insensitive per RFC 7230)
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a header, in arrival order.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Cookie values from every `Cookie` header.
    #[must_use]
    pub fn cookie_values(&self, name: &str) -> Vec<String> {
        self.header_values("cookie")
            .flat_map(|h| h.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .filter(|(k, _)| *k == name)
            .map(|(_, v)| v.trim_matches('"').to_string())
            .collect()
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&MediaType> {
        self.content_type.as_ref()
    }

    /// Parsed `Accept` ranges; empty when the header is absent.
    #[must_use]
    pub fn accept(&self) -> &[MediaType] {
        &self.accept
    }

    /// Media type chosen for the response entity.
    #[must_use]
    pub fn response_media_type(&self) -> Option<&MediaType> {
        self.response_media.as_ref()
    }

    pub(crate) fn set_response_media_type(&mut self, media: MediaType) {
        self.response_media = Some(media);
    }

    /// Path parameter by name. Uses "last write wins": when a name repeats
    /// along the locator chain the innermost value is returned.
    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every path parameter matched so far, outermost first.
    #[must_use]
    pub fn path_params(&self) -> &ParamVec {
        &self.path_params
    }

    pub(crate) fn push_path_params(&mut self, params: ParamVec) {
        self.path_params.extend(params);
    }

    /// Query values for `name`, decoded unless `encoded` is set.
    #[must_use]
    pub fn query_values(&self, name: &str, encoded: bool) -> Vec<String> {
        lookup_all(&self.query, name, encoded, true)
    }

    /// Matrix values of the last path segment.
    #[must_use]
    pub fn matrix_values(&self, name: &str, encoded: bool) -> Vec<String> {
        lookup_all(&self.matrix, name, encoded, false)
    }

    /// Path values for `name`, innermost last.
    #[must_use]
    pub fn path_values(&self, name: &str, encoded: bool) -> Vec<String> {
        lookup_all(&self.path_params, name, encoded, false)
    }

    /// Values of an `application/x-www-form-urlencoded` body field. Reading the
    /// form consumes the body on first use.
    ///
    /// # Errors
    ///
    /// `BadRequest` when the body cannot be read.
    pub fn form_values(&mut self, name: &str, encoded: bool) -> Result<Vec<String>, DispatchError> {
        if self.form.is_none() {
            let is_form = self
                .content_type
                .as_ref()
                .is_some_and(|ct| ct.essence() == FORM_MEDIA);
            let mut raw = String::new();
            if is_form {
                if let Some(mut body) = self.body.take() {
                    body.read_to_string(&mut raw).map_err(|e| {
                        DispatchError::BadRequest(format!("unable to read form body: {e}"))
                    })?;
                }
            }
            self.form = Some(parse_pairs(&raw));
        }
        Ok(self
            .form
            .as_ref()
            .map(|form| lookup_all(form, name, encoded, true))
            .unwrap_or_default())
    }

    /// Take the request body. Returns `None` once consumed.
    pub fn take_body(&mut self) -> Option<Box<dyn Read + Send>> {
        self.body.take()
    }

    /// Path prefixes matched so far, outermost first.
    #[must_use]
    pub fn matched_uris(&self) -> &[String] {
        &self.matched_uris
    }

    pub(crate) fn push_matched_uri(&mut self, uri: String) {
        self.matched_uris.push(uri);
    }

    /// Resource instances visited along the locator chain, outermost first.
    #[must_use]
    pub fn matched_resources(&self) -> &[ResourceInstance] {
        &self.matched_resources
    }

    pub(crate) fn push_matched_resource(&mut self, instance: ResourceInstance) {
        self.matched_resources.push(instance);
    }

    /// Attach a value for later filters or handlers.
    pub fn set_property<T: Any + Send + Sync>(&mut self, name: &str, value: T) {
        self.properties.insert(name.to_string(), Box::new(value));
    }

    #[must_use]
    pub fn property<T: Any>(&self, name: &str) -> Option<&T> {
        self.properties.get(name).and_then(|v| v.downcast_ref::<T>())
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("path_params", &self.path_params)
            .field("matched_uris", &self.matched_uris)
            .finish_non_exhaustive()
    }
}

fn parse_base(base: &str) -> Result<Url, DispatchError> {
    let fallback = || {
        Url::parse(DEFAULT_BASE_URI).and_then(|root| root.join(base))
    };
    Url::parse(base)
        .or_else(|_| fallback())
        .map_err(|e| DispatchError::BadRequest(format!("invalid base URI '{base}': {e}")))
}

/// Path of `uri` relative to `base`, or `None` when `uri` is not below it.
fn relative_path(base: &Url, uri: &Url) -> Option<String> {
    if base.scheme() != uri.scheme() || base.host_str() != uri.host_str() || base.port() != uri.port() {
        return None;
    }
    let prefix = base.path().trim_end_matches('/');
    let rest = uri.path().strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/".to_string())
    } else if rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        None
    }
}

/// Strip `;name=value` parameters from every segment, keeping those of the
/// last segment.
fn split_matrix(path: &str) -> (String, ParamVec) {
    let mut stripped = String::with_capacity(path.len());
    let mut matrix = ParamVec::new();
    let segments: Vec<&str> = path.split('/').collect();
    let last = segments.len().saturating_sub(1);
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            stripped.push('/');
        }
        let mut parts = segment.split(';');
        stripped.push_str(parts.next().unwrap_or_default());
        if i == last {
            for param in parts.filter(|p| !p.is_empty()) {
                let (k, v) = param.split_once('=').unwrap_or((param, ""));
                matrix.push((Arc::from(k), v.to_string()));
            }
        }
    }
    (stripped, matrix)
}

/// Split `a=1&b=2` into encoded pairs.
fn parse_pairs(raw: &str) -> ParamVec {
    raw.split('&')
        .filter(|p| !p.is_empty())
        .map(|p| {
            let (k, v) = p.split_once('=').unwrap_or((p, ""));
            (Arc::from(decode(k, true).as_str()), v.to_string())
        })
        .collect()
}

fn lookup_all(params: &ParamVec, name: &str, encoded: bool, plus_is_space: bool) -> Vec<String> {
    params
        .iter()
        .filter(|(k, _)| k.as_ref() == name)
        .map(|(_, v)| {
            if encoded {
                v.clone()
            } else {
                decode(v, plus_is_space)
            }
        })
        .collect()
}

/// Percent-decode, leaving malformed input as-is.
pub(crate) fn decode(value: &str, plus_is_space: bool) -> String {
    let value = if plus_is_space {
        value.replace('+', " ")
    } else {
        value.to_string()
    };
    match urlencoding::decode(&value) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => value,
    }
}
