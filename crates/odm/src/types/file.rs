//! Document fields pointing at stored files

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use bson::{doc, Bson};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ObjectId;
use crate::backends::{FileBucket, FileInfo};
use crate::error::{ModelError, ModelResult, StorageError, ValidationError, ValidationErrorKind};

/// Identifier of a file in a model's file bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileField(ObjectId);

impl FileField {
    /// Point at a file that does not exist yet
    pub fn new() -> Self {
        Self(ObjectId::new())
    }

    pub fn from_id(id: ObjectId) -> Self {
        Self(id)
    }

    pub fn id(&self) -> ObjectId {
        self.0
    }

    pub fn validate(field: &str, value: &Bson) -> Result<Self, ValidationError> {
        ObjectId::validate(field, value).map(Self)
    }

    pub fn open(&self, bucket: Arc<dyn FileBucket>) -> FileHandle {
        FileHandle { id: self.0, bucket }
    }
}

impl Default for FileField {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ObjectId> for FileField {
    fn from(id: ObjectId) -> Self {
        Self(id)
    }
}

/// Open file of a [`FileField`]
#[derive(Clone)]
pub struct FileHandle {
    id: ObjectId,
    bucket: Arc<dyn FileBucket>,
}

impl FileHandle {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub async fn read(&self) -> ModelResult<Vec<u8>> {
        self.bucket.download(self.id).await
    }

    /// Store the content; fails if the file already exists
    pub async fn write(&self, filename: &str, data: Vec<u8>) -> ModelResult<()> {
        self.bucket.upload_with_id(self.id, filename, data, None).await
    }

    /// Store the content, discarding any previous version
    pub async fn replace(&self, filename: &str, data: Vec<u8>) -> ModelResult<()> {
        if self.exists().await? {
            self.bucket.delete(self.id).await?;
        }
        self.write(filename, data).await
    }

    pub async fn delete(&self) -> ModelResult<()> {
        self.bucket.delete(self.id).await
    }

    pub async fn info(&self) -> ModelResult<FileInfo> {
        self.bucket.info(self.id).await
    }

    pub async fn exists(&self) -> ModelResult<bool> {
        match self.bucket.info(self.id).await {
            Ok(_) => Ok(true),
            Err(ModelError::Storage(StorageError::FileNotFound(_))) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle").field("id", &self.id).finish()
    }
}

/// Byte format of a [`DataFile`]
pub trait FileCoder: Send + Sync + 'static {
    const CONTENT_TYPE: &'static str;

    fn encode<T: Serialize>(value: &T) -> ModelResult<Vec<u8>>;

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, String>;
}

/// JSON payloads
pub struct JsonCoder;

impl FileCoder for JsonCoder {
    const CONTENT_TYPE: &'static str = "application/json";

    fn encode<T: Serialize>(value: &T) -> ModelResult<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, String> {
        serde_json::from_slice(bytes).map_err(|e| e.to_string())
    }
}

/// BSON payloads, wrapped as `{v: value}` so any value can be stored
pub struct BsonCoder;

#[derive(Serialize)]
struct Envelope<'a, T> {
    v: &'a T,
}

#[derive(Deserialize)]
struct OwnedEnvelope<T> {
    v: T,
}

impl FileCoder for BsonCoder {
    const CONTENT_TYPE: &'static str = "application/bson";

    fn encode<T: Serialize>(value: &T) -> ModelResult<Vec<u8>> {
        Ok(bson::to_vec(&Envelope { v: value })?)
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, String> {
        bson::from_slice::<OwnedEnvelope<T>>(bytes)
            .map(|envelope| envelope.v)
            .map_err(|e| e.to_string())
    }
}

/// File holding one serialized value of type `T`
pub struct DataFile<T, C = JsonCoder> {
    file: FileField,
    payload: PhantomData<fn() -> (T, C)>,
}

impl<T, C> DataFile<T, C>
where
    T: Serialize + DeserializeOwned,
    C: FileCoder,
{
    pub fn new() -> Self {
        Self::from_id(ObjectId::new())
    }

    pub fn from_id(id: ObjectId) -> Self {
        Self {
            file: FileField::from_id(id),
            payload: PhantomData,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.file.id()
    }

    /// Read and decode the stored value
    ///
    /// Content that does not decode as `T` is a validation error.
    pub async fn load(&self, bucket: &dyn FileBucket) -> ModelResult<T> {
        let bytes = bucket.download(self.id()).await?;
        C::decode(&bytes).map_err(|message| {
            ValidationError::new(Vec::<String>::new(), ValidationErrorKind::Deserialization, message).into()
        })
    }

    /// Encode and store `value`
    pub async fn dump(&self, bucket: &dyn FileBucket, filename: &str, value: &T) -> ModelResult<()> {
        let bytes = C::encode(value)?;
        bucket
            .upload_with_id(self.id(), filename, bytes, Some(doc! { "contentType": C::CONTENT_TYPE }))
            .await
    }
}

impl<T, C> Default for DataFile<T, C>
where
    T: Serialize + DeserializeOwned,
    C: FileCoder,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, C> Clone for DataFile<T, C> {
    fn clone(&self) -> Self {
        Self {
            file: self.file,
            payload: PhantomData,
        }
    }
}

impl<T, C> PartialEq for DataFile<T, C> {
    fn eq(&self, other: &Self) -> bool {
        self.file == other.file
    }
}

impl<T, C> fmt::Debug for DataFile<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataFile({})", self.file.id())
    }
}

impl<T, C> Serialize for DataFile<T, C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.file.serialize(serializer)
    }
}

impl<'de, T, C> Deserialize<'de> for DataFile<T, C> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        FileField::deserialize(deserializer).map(|file| Self {
            file,
            payload: PhantomData,
        })
    }
}
