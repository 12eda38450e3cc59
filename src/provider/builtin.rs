use std::any::TypeId;
use std::io::{Read, Write};
use std::marker::PhantomData;

use anyhow::{anyhow, Context};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Entity, EntityReader, EntityWriter};
use crate::media::MediaType;

/// `String` bodies, UTF-8 only.
pub struct TextProvider {
    media: Vec<MediaType>,
}

impl TextProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            media: vec![MediaType::new("text", "*"), MediaType::wildcard()],
        }
    }
}

impl Default for TextProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityReader for TextProvider {
    fn target(&self) -> TypeId {
        TypeId::of::<String>()
    }

    fn media_types(&self) -> &[MediaType] {
        &self.media
    }

    fn read(&self, _media: &MediaType, body: &mut dyn Read) -> anyhow::Result<Entity> {
        let mut text = String::new();
        body.read_to_string(&mut text)
            .context("request body is not valid UTF-8 text")?;
        Ok(Entity::new(text))
    }
}

impl EntityWriter for TextProvider {
    fn source(&self) -> TypeId {
        TypeId::of::<String>()
    }

    fn media_types(&self) -> &[MediaType] {
        &self.media
    }

    fn write(&self, entity: &Entity, _media: &MediaType, out: &mut dyn Write) -> anyhow::Result<()> {
        let text = entity
            .downcast_ref::<String>()
            .ok_or_else(|| anyhow!("text writer cannot write {}", entity.type_name()))?;
        out.write_all(text.as_bytes())?;
        Ok(())
    }
}

/// Raw `Vec<u8>` bodies for any media type.
pub struct BytesProvider {
    media: Vec<MediaType>,
}

impl BytesProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            media: vec![MediaType::wildcard()],
        }
    }
}

impl Default for BytesProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityReader for BytesProvider {
    fn target(&self) -> TypeId {
        TypeId::of::<Vec<u8>>()
    }

    fn media_types(&self) -> &[MediaType] {
        &self.media
    }

    fn read(&self, _media: &MediaType, body: &mut dyn Read) -> anyhow::Result<Entity> {
        let mut bytes = Vec::new();
        body.read_to_end(&mut bytes)?;
        Ok(Entity::new(bytes))
    }
}

impl EntityWriter for BytesProvider {
    fn source(&self) -> TypeId {
        TypeId::of::<Vec<u8>>()
    }

    fn media_types(&self) -> &[MediaType] {
        &self.media
    }

    fn write(&self, entity: &Entity, _media: &MediaType, out: &mut dyn Write) -> anyhow::Result<()> {
        let bytes = entity
            .downcast_ref::<Vec<u8>>()
            .ok_or_else(|| anyhow!("bytes writer cannot write {}", entity.type_name()))?;
        out.write_all(bytes)?;
        Ok(())
    }
}

/// `application/json` bodies for one serde type.
pub struct JsonProvider<T> {
    media: Vec<MediaType>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonProvider<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            media: vec![MediaType::new("application", "json")],
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonProvider<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EntityReader for JsonProvider<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn target(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn media_types(&self) -> &[MediaType] {
        &self.media
    }

    fn read(&self, _media: &MediaType, body: &mut dyn Read) -> anyhow::Result<Entity> {
        let value: T = serde_json::from_reader(body).context("invalid JSON request body")?;
        Ok(Entity::new(value))
    }
}

impl<T> EntityWriter for JsonProvider<T>
where
    T: Serialize + Send + 'static,
{
    fn source(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn media_types(&self) -> &[MediaType] {
        &self.media
    }

    fn write(&self, entity: &Entity, _media: &MediaType, out: &mut dyn Write) -> anyhow::Result<()> {
        let value = entity.downcast_ref::<T>().ok_or_else(|| {
            anyhow!(
                "JSON writer for {} cannot write {}",
                std::any::type_name::<T>(),
                entity.type_name()
            )
        })?;
        serde_json::to_writer(out, value)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_rejects_invalid_utf8() {
        let err = TextProvider::new()
            .read(&MediaType::new("text", "plain"), &mut &[0xff, 0xfe][..])
            .unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn test_writer_type_mismatch_is_an_error() {
        let mut out = Vec::new();
        assert!(TextProvider::new()
            .write(&Entity::new(5u32), &MediaType::wildcard(), &mut out)
            .is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn test_json_value_round_trip() {
        let json = MediaType::new("application", "json");
        let p = JsonProvider::<serde_json::Value>::new();
        let e = p.read(&json, &mut &br#"{"a":[1,2]}"#[..]).unwrap();
        let mut out = Vec::new();
        p.write(&e, &json, &mut out).unwrap();
        assert_eq!(out, br#"{"a":[1,2]}"#);
    }
}
