//! Tri-state field values
//!
//! A model field declared as `Field<T>` is either `Undefined`, meaning the key
//! is omitted from the stored document, or `Defined(T)`. Nullable fields use
//! `Field<Option<T>>` and can therefore be absent, null, or set.

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

/// Key of the marker document an undefined value serializes to
pub const UNDEFINED_MARKER: &str = "$undefined";

/// A value that may be left undefined
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Field<T> {
    Undefined,
    Defined(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Undefined
    }
}

impl<T> Field<T> {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Field::Undefined)
    }

    pub fn is_defined(&self) -> bool {
        !self.is_undefined()
    }

    pub fn as_ref(&self) -> Field<&T> {
        match self {
            Field::Undefined => Field::Undefined,
            Field::Defined(value) => Field::Defined(value),
        }
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            Field::Undefined => None,
            Field::Defined(value) => Some(value),
        }
    }

    pub fn as_mut_option(&mut self) -> Option<&mut T> {
        match self {
            Field::Undefined => None,
            Field::Defined(value) => Some(value),
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Field::Undefined => None,
            Field::Defined(value) => Some(value),
        }
    }

    /// Assign a value, returning the previous one
    pub fn set(&mut self, value: T) -> Field<T> {
        std::mem::replace(self, Field::Defined(value))
    }

    /// Mark the field undefined so the next save removes the key
    pub fn unset(&mut self) -> Field<T> {
        std::mem::take(self)
    }

    pub fn take(&mut self) -> Option<T> {
        std::mem::take(self).into_option()
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Field<U> {
        match self {
            Field::Undefined => Field::Undefined,
            Field::Defined(value) => Field::Defined(f(value)),
        }
    }

    pub fn unwrap_or(self, default: T) -> T {
        self.into_option().unwrap_or(default)
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Field::Defined(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Undefined => f.write_str("Undefined"),
            Field::Defined(value) => value.fmt(f),
        }
    }
}

impl<T: fmt::Display> fmt::Display for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Undefined => f.write_str("Undefined"),
            Field::Defined(value) => value.fmt(f),
        }
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Defined(value) => value.serialize(serializer),
            Field::Undefined => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(UNDEFINED_MARKER, &true)?;
                map.end()
            }
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Field::Defined)
    }
}
