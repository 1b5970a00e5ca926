//! Value types stored in documents

pub mod file;
pub mod object_id;
pub mod reference;

pub use file::{BsonCoder, DataFile, FileCoder, FileField, FileHandle, JsonCoder};
pub use object_id::ObjectId;
pub use reference::{AnyReference, Reference};
