use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::media::MediaType;
use crate::provider::Entity;

/// Maximum inline headers before heap allocation
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header storage. Names are `Arc<str>` so repeated names are
/// shared, values are per-request.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Response assembled by the dispatcher and handed to the transport adapter.
#[derive(Debug)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    pub headers: HeaderVec,
    /// Body, written through the provider registry
    pub entity: Option<Entity>,
    /// Media type the entity is written as. Filled from content negotiation
    /// when the handler leaves it unset.
    pub media_type: Option<MediaType>,
}

impl Response {
    #[must_use]
    pub fn new(status: u16, headers: HeaderVec, entity: Option<Entity>) -> Self {
        Self {
            status,
            headers,
            entity,
            media_type: None,
        }
    }

    /// `200 OK` carrying `value`.
    #[must_use]
    pub fn ok<T: std::any::Any + Send>(value: T) -> Self {
        Self::new(200, HeaderVec::new(), Some(Entity::new(value)))
    }

    /// Bodiless response with the given status.
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self::new(status, HeaderVec::new(), None)
    }

    #[must_use]
    pub fn no_content() -> Self {
        Self::status(204)
    }

    /// Builder form of [`Response::set_header`].
    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value.into());
        self
    }

    #[must_use]
    pub fn with_media_type(mut self, media: MediaType) -> Self {
        self.media_type = Some(media);
        self
    }

    /// Get a header by name (case-insensitive)
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or replace a header
    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name.to_ascii_lowercase()), value));
    }

    /// Headers grouped by name, values in insertion order.
    #[must_use]
    pub fn header_map(&self) -> HashMap<String, Vec<String>> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (k, v) in &self.headers {
            map.entry(k.to_string()).or_default().push(v.clone());
        }
        map
    }

    /// Rust type name of the entity, if any.
    #[must_use]
    pub fn entity_type(&self) -> Option<&'static str> {
        self.entity.as_ref().map(Entity::type_name)
    }

    /// Borrow the entity as `T`.
    #[must_use]
    pub fn entity_as<T: std::any::Any>(&self) -> Option<&T> {
        self.entity.as_ref().and_then(Entity::downcast_ref::<T>)
    }
}

/// What a handler hands back to the dispatcher.
#[derive(Debug)]
pub enum Reply {
    /// `200` with a body, media type chosen by negotiation.
    Entity(Entity),
    /// `204` without a body.
    NoContent,
    /// A fully built response.
    Response(Response),
}

impl Reply {
    #[must_use]
    pub fn entity<T: std::any::Any + Send>(value: T) -> Self {
        Reply::Entity(Entity::new(value))
    }

    pub(crate) fn into_response(self) -> Response {
        match self {
            Reply::Entity(entity) => Response::new(200, HeaderVec::new(), Some(entity)),
            Reply::NoContent => Response::no_content(),
            Reply::Response(response) => response,
        }
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Reply::Response(response)
    }
}

/// Transport side of response writing.
///
/// The dispatcher calls [`write_head`](Self::write_head) once, then
/// [`write_body`](Self::write_body) for a non-empty body, then
/// [`finish`](Self::finish).
pub trait ContainerResponseWriter {
    /// Write status line and headers.
    ///
    /// # Errors
    ///
    /// I/O failure, typically the client going away.
    fn write_head(&mut self, status: u16, headers: &HeaderVec) -> io::Result<()>;

    /// Write the serialized body.
    ///
    /// # Errors
    ///
    /// I/O failure, typically the client going away.
    fn write_body(&mut self, body: &[u8]) -> io::Result<()>;

    /// Flush and complete the response.
    ///
    /// # Errors
    ///
    /// I/O failure.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// In-memory [`ContainerResponseWriter`].
#[derive(Debug, Default, Clone)]
pub struct BufferedResponseWriter {
    pub status: Option<u16>,
    pub headers: HeaderVec,
    pub body: Vec<u8>,
    pub finished: bool,
}

impl BufferedResponseWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body as UTF-8, lossy.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl ContainerResponseWriter for BufferedResponseWriter {
    fn write_head(&mut self, status: u16, headers: &HeaderVec) -> io::Result<()> {
        self.status = Some(status);
        self.headers = headers.clone();
        Ok(())
    }

    fn write_body(&mut self, body: &[u8]) -> io::Result<()> {
        self.body.extend_from_slice(body);
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.finished = true;
        Ok(())
    }
}
