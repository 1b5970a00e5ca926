//! 12-byte document identifier

use bson::{oid, Bson};
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{ValidationError, ValidationErrorKind};

/// Document identifier, rendered as 24 lowercase hex characters
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(oid::ObjectId);

impl ObjectId {
    /// Generate a fresh identifier
    pub fn new() -> Self {
        Self(oid::ObjectId::new())
    }

    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(oid::ObjectId::from_bytes(bytes))
    }

    pub const fn bytes(&self) -> [u8; 12] {
        self.0.bytes()
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    pub fn parse_str(text: impl AsRef<str>) -> Result<Self, ValidationError> {
        let text = text.as_ref();
        oid::ObjectId::parse_str(text).map(Self).map_err(|_| {
            ValidationError::new(
                Vec::<String>::new(),
                ValidationErrorKind::InvalidIdentifier,
                format!("invalid objectid `{}`", text),
            )
        })
    }

    /// Validate a raw value bound for the field `field`
    pub fn validate(field: &str, value: &Bson) -> Result<Self, ValidationError> {
        match value {
            Bson::ObjectId(oid) => Ok(Self(*oid)),
            Bson::String(text) => Self::parse_str(text).map_err(|err| err.within(field)),
            _ => Err(ValidationError::at(
                field,
                ValidationErrorKind::IdentifierType,
                format!("expected objectid, got {:?}", value.element_type()),
            )),
        }
    }

    pub fn as_bson_oid(&self) -> oid::ObjectId {
        self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ObjectId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl From<oid::ObjectId> for ObjectId {
    fn from(oid: oid::ObjectId) -> Self {
        Self(oid)
    }
}

impl From<ObjectId> for oid::ObjectId {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl From<ObjectId> for Bson {
    fn from(id: ObjectId) -> Self {
        Bson::ObjectId(id.0)
    }
}

impl TryFrom<&Bson> for ObjectId {
    type Error = ValidationError;

    fn try_from(value: &Bson) -> Result<Self, Self::Error> {
        match value {
            Bson::ObjectId(oid) => Ok(Self(*oid)),
            Bson::String(text) => Self::parse_str(text),
            _ => Err(ValidationError::new(
                Vec::<String>::new(),
                ValidationErrorKind::IdentifierType,
                format!("expected objectid, got {:?}", value.element_type()),
            )),
        }
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

struct ObjectIdVisitor;

impl<'de> Visitor<'de> for ObjectIdVisitor {
    type Value = ObjectId;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an objectid, 24 hex characters, or 12 bytes")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        ObjectId::parse_str(v).map_err(|err| E::custom(err.message))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        let bytes: [u8; 12] = v
            .try_into()
            .map_err(|_| E::invalid_length(v.len(), &"12 bytes"))?;
        Ok(ObjectId::from_bytes(bytes))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut bytes = [0u8; 12];
        for (i, slot) in bytes.iter_mut().enumerate() {
            *slot = seq
                .next_element()?
                .ok_or_else(|| de::Error::invalid_length(i, &"12 bytes"))?;
        }
        Ok(ObjectId::from_bytes(bytes))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut found = None;
        while let Some(key) = map.next_key::<String>()? {
            if key == "$oid" {
                let hex: String = map.next_value()?;
                found = Some(ObjectId::parse_str(&hex).map_err(|err| de::Error::custom(err.message))?);
            } else {
                map.next_value::<de::IgnoredAny>()?;
            }
        }
        found.ok_or_else(|| de::Error::missing_field("$oid"))
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ObjectIdVisitor)
    }
}
