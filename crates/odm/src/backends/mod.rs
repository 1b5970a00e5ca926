//! Document Store Backends
//!
//! Driver abstractions plus the bundled implementations: an in-memory store
//! used for tests and development, and a MongoDB adapter behind the
//! `mongodb` feature.

pub mod core;
pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongodb;

pub use core::*;
pub use memory::{MemoryClient, MemoryCollection, MemoryDatabase, MemoryFileBucket, WriteCounts};
#[cfg(feature = "mongodb")]
pub use self::mongodb::{connect, MongoClient};

/// Document store backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentBackendType {
    Memory,
    MongoDb,
}

impl std::fmt::Display for DocumentBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentBackendType::Memory => write!(f, "memory"),
            DocumentBackendType::MongoDb => write!(f, "mongodb"),
        }
    }
}

impl std::str::FromStr for DocumentBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "in-memory" => Ok(DocumentBackendType::Memory),
            "mongodb" | "mongo" => Ok(DocumentBackendType::MongoDb),
            _ => Err(format!("Unsupported document backend: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_type_parse() {
        assert_eq!("Mongo".parse::<DocumentBackendType>(), Ok(DocumentBackendType::MongoDb));
        assert_eq!("memory".parse::<DocumentBackendType>(), Ok(DocumentBackendType::Memory));
        assert!("sqlite".parse::<DocumentBackendType>().is_err());
        assert_eq!(DocumentBackendType::MongoDb.to_string(), "mongodb");
    }
}
