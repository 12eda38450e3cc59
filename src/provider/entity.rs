use std::any::{Any, TypeId};
use std::fmt;

/// A type-erased request or response body.
///
/// Entities carry the Rust type they were created from so that the provider
/// registry can pick a reader or writer by type identity.
pub struct Entity {
    value: Box<dyn Any + Send>,
    type_id: TypeId,
    type_name: &'static str,
}

impl Entity {
    #[must_use]
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Type identity of the wrapped value.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Unwrap into the concrete value, handing the entity back on a type
    /// mismatch.
    ///
    /// # Errors
    ///
    /// Returns `self` unchanged when the entity does not hold a `T`.
    pub fn downcast<T: Any>(self) -> Result<T, Entity> {
        if self.is::<T>() {
            match self.value.downcast::<T>() {
                Ok(v) => Ok(*v),
                Err(value) => Err(Entity {
                    value,
                    type_id: self.type_id,
                    type_name: self.type_name,
                }),
            }
        } else {
            Err(self)
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast() {
        let e = Entity::new(String::from("hello"));
        assert!(e.is::<String>());
        assert_eq!(e.downcast_ref::<String>().map(String::as_str), Some("hello"));
        let e = e.downcast::<Vec<u8>>().unwrap_err();
        assert_eq!(e.downcast::<String>().unwrap(), "hello");
    }
}
