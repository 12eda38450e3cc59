//! # Provider Module
//!
//! Entity readers and writers. The dispatcher never parses or serializes a
//! body itself; it asks the registry for a reader or writer matching a Rust
//! type and a media type.
//!
//! Built-in providers cover `String` (`text/*`), `Vec<u8>` (`*/*`) and, per
//! registered type, JSON through `serde_json`:
//!
//! ```rust
//! use std::any::TypeId;
//! use resrouter::media::MediaType;
//! use resrouter::provider::{EntityProviders, ProviderBinder};
//!
//! #[derive(serde::Serialize, serde::Deserialize)]
//! struct Pet { name: String }
//!
//! let mut binder = ProviderBinder::with_defaults();
//! binder.json::<Pet>();
//! let json = MediaType::new("application", "json");
//! assert!(binder.find_writer(TypeId::of::<Pet>(), &json).is_some());
//! ```

mod binder;
mod builtin;
mod entity;

pub use binder::{EntityProviders, EntityReader, EntityWriter, ProviderBinder, ProviderEntry};
pub use builtin::{BytesProvider, JsonProvider, TextProvider};
pub use entity::Entity;
