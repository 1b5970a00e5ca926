//! In-memory file bucket

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bson::Document;
use chrono::Utc;

use crate::backends::core::{FileBucket, FileInfo};
use crate::error::{ModelResult, StorageError};
use crate::types::ObjectId;

/// Default chunk size of stored files, matching GridFS
pub const DEFAULT_CHUNK_SIZE: u32 = 255 * 1024;

struct StoredFile {
    info: FileInfo,
    chunks: Vec<Vec<u8>>,
}

/// File bucket keeping chunked files in memory
pub struct MemoryFileBucket {
    chunk_size: u32,
    files: RwLock<HashMap<ObjectId, StoredFile>>,
}

impl Default for MemoryFileBucket {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFileBucket {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: u32) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            files: RwLock::new(HashMap::new()),
        }
    }

    /// Number of files currently stored
    pub fn len(&self) -> ModelResult<usize> {
        Ok(self.read_files()?.len())
    }

    pub fn is_empty(&self) -> ModelResult<bool> {
        Ok(self.len()? == 0)
    }

    fn read_files(&self) -> ModelResult<std::sync::RwLockReadGuard<'_, HashMap<ObjectId, StoredFile>>> {
        self.files
            .read()
            .map_err(|_| StorageError::Operation("lock poisoned".into()).into())
    }

    fn write_files(&self) -> ModelResult<std::sync::RwLockWriteGuard<'_, HashMap<ObjectId, StoredFile>>> {
        self.files
            .write()
            .map_err(|_| StorageError::Operation("lock poisoned".into()).into())
    }

    fn store(&self, id: ObjectId, filename: &str, data: Vec<u8>, metadata: Option<Document>) -> ModelResult<()> {
        let mut files = self.write_files()?;
        if files.contains_key(&id) {
            return Err(StorageError::FileExists(id.to_hex()).into());
        }

        let content_type = metadata
            .as_ref()
            .and_then(|meta| meta.get_str("contentType").ok())
            .map(str::to_string);

        let info = FileInfo {
            id,
            filename: filename.to_string(),
            length: data.len() as u64,
            chunk_size: self.chunk_size,
            upload_date: Utc::now(),
            content_type,
            metadata,
        };
        let chunks = data
            .chunks(self.chunk_size as usize)
            .map(<[u8]>::to_vec)
            .collect();

        files.insert(id, StoredFile { info, chunks });
        Ok(())
    }
}

#[async_trait]
impl FileBucket for MemoryFileBucket {
    async fn upload_with_id(
        &self,
        id: ObjectId,
        filename: &str,
        data: Vec<u8>,
        metadata: Option<Document>,
    ) -> ModelResult<()> {
        tracing::debug!("Storing file {} ({} bytes)", id, data.len());
        self.store(id, filename, data, metadata)
    }

    async fn download(&self, id: ObjectId) -> ModelResult<Vec<u8>> {
        let files = self.read_files()?;
        let file = files
            .get(&id)
            .ok_or_else(|| StorageError::FileNotFound(id.to_hex()))?;
        Ok(file.chunks.concat())
    }

    async fn delete(&self, id: ObjectId) -> ModelResult<()> {
        let mut files = self.write_files()?;
        files
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StorageError::FileNotFound(id.to_hex()).into())
    }

    async fn info(&self, id: ObjectId) -> ModelResult<FileInfo> {
        let files = self.read_files()?;
        files
            .get(&id)
            .map(|file| file.info.clone())
            .ok_or_else(|| StorageError::FileNotFound(id.to_hex()).into())
    }
}
