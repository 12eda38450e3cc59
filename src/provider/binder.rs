use std::any::TypeId;
use std::io::{Read, Write};
use std::sync::Arc;

use tracing::debug;

use super::builtin::{BytesProvider, JsonProvider, TextProvider};
use super::Entity;
use crate::media::{MediaType, WILDCARD};

/// Turns a request body into an [`Entity`] of one Rust type.
pub trait EntityReader: Send + Sync {
    /// Type this reader produces.
    fn target(&self) -> TypeId;
    /// Media types this reader declares, wildcards allowed.
    fn media_types(&self) -> &[MediaType];
    /// Read the whole body as `media`.
    ///
    /// # Errors
    ///
    /// Any I/O or decoding failure.
    fn read(&self, media: &MediaType, body: &mut dyn Read) -> anyhow::Result<Entity>;
}

/// Serializes an [`Entity`] of one Rust type.
pub trait EntityWriter: Send + Sync {
    /// Type this writer accepts.
    fn source(&self) -> TypeId;
    fn media_types(&self) -> &[MediaType];
    /// Write `entity` as `media`.
    ///
    /// # Errors
    ///
    /// Any I/O or encoding failure, or an entity of the wrong type.
    fn write(&self, entity: &Entity, media: &MediaType, out: &mut dyn Write) -> anyhow::Result<()>;
}

/// Lookup side of the provider registry used during dispatch.
pub trait EntityProviders: Send + Sync {
    fn find_reader(&self, type_id: TypeId, media: &MediaType) -> Option<Arc<dyn EntityReader>>;
    fn find_writer(&self, type_id: TypeId, media: &MediaType) -> Option<Arc<dyn EntityWriter>>;
}

/// A provider bound into the resource tree next to resources and filters.
#[derive(Clone)]
pub enum ProviderEntry {
    Reader(Arc<dyn EntityReader>),
    Writer(Arc<dyn EntityWriter>),
}

/// Registry of entity readers and writers.
///
/// Lookup tries the exact media type, then `type/*`, then `*/*`. Within one
/// probe the most recently added provider wins, so application providers
/// override the built-in ones.
#[derive(Clone, Default)]
pub struct ProviderBinder {
    readers: Vec<Arc<dyn EntityReader>>,
    writers: Vec<Arc<dyn EntityWriter>>,
}

impl ProviderBinder {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the text, bytes and `serde_json::Value` providers.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut binder = Self::new();
        binder.add(ProviderEntry::Reader(Arc::new(BytesProvider::new())));
        binder.add(ProviderEntry::Writer(Arc::new(BytesProvider::new())));
        binder.add(ProviderEntry::Reader(Arc::new(TextProvider::new())));
        binder.add(ProviderEntry::Writer(Arc::new(TextProvider::new())));
        binder.json::<serde_json::Value>();
        binder
    }

    pub fn add(&mut self, entry: ProviderEntry) {
        match entry {
            ProviderEntry::Reader(reader) => {
                debug!(media = ?reader.media_types(), "entity reader added");
                self.readers.push(reader);
            }
            ProviderEntry::Writer(writer) => {
                debug!(media = ?writer.media_types(), "entity writer added");
                self.writers.push(writer);
            }
        }
    }

    /// Register JSON reading and writing for `T` as `application/json`.
    pub fn json<T>(&mut self) -> &mut Self
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Send + 'static,
    {
        self.add(ProviderEntry::Reader(Arc::new(JsonProvider::<T>::new())));
        self.add(ProviderEntry::Writer(Arc::new(JsonProvider::<T>::new())));
        self
    }

    #[must_use]
    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }

    #[must_use]
    pub fn writer_count(&self) -> usize {
        self.writers.len()
    }
}

/// `media`, then `type/*`, then `*/*`, skipping probes that repeat.
fn probes(media: &MediaType) -> Vec<MediaType> {
    let mut out = vec![media.without_params()];
    if !media.is_wildcard_subtype() {
        out.push(MediaType::new(media.kind(), WILDCARD));
    }
    if !media.is_wildcard_type() {
        out.push(MediaType::wildcard());
    }
    out
}

fn declares(list: &[MediaType], probe: &MediaType) -> bool {
    list.iter().any(|m| m.kind() == probe.kind() && m.subtype() == probe.subtype())
}

impl EntityProviders for ProviderBinder {
    fn find_reader(&self, type_id: TypeId, media: &MediaType) -> Option<Arc<dyn EntityReader>> {
        probes(media).iter().find_map(|probe| {
            self.readers
                .iter()
                .rev()
                .find(|r| r.target() == type_id && declares(r.media_types(), probe))
                .map(Arc::clone)
        })
    }

    fn find_writer(&self, type_id: TypeId, media: &MediaType) -> Option<Arc<dyn EntityWriter>> {
        probes(media).iter().find_map(|probe| {
            self.writers
                .iter()
                .rev()
                .find(|w| w.source() == type_id && declares(w.media_types(), probe))
                .map(Arc::clone)
        })
    }
}
