//! Lazy query cursor

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{BoxStream, Stream, StreamExt};

use super::core_trait::Model;
use super::tracked::Tracked;
use crate::backends::DocumentStream;
use crate::error::ModelResult;
use crate::meta::ModelMeta;

/// Forward-only, single-pass cursor of hydrated documents
pub struct ModelCursor<M> {
    inner: BoxStream<'static, ModelResult<Tracked<M>>>,
}

impl<M: Model> ModelCursor<M> {
    pub(crate) fn new(meta: Arc<ModelMeta<M>>, stream: DocumentStream) -> Self {
        let inner = stream
            .map(move |raw| raw.and_then(|doc| Tracked::load(meta.clone(), doc)))
            .boxed();
        Self { inner }
    }

    /// Next document, or `None` when the cursor is exhausted
    pub async fn next(&mut self) -> Option<ModelResult<Tracked<M>>> {
        self.inner.next().await
    }

    /// Collect up to `limit` documents, or all of them
    pub async fn to_list(mut self, limit: Option<usize>) -> ModelResult<Vec<Tracked<M>>> {
        let mut documents = Vec::new();
        while limit.map_or(true, |limit| documents.len() < limit) {
            match self.inner.next().await {
                Some(doc) => documents.push(doc?),
                None => break,
            }
        }
        Ok(documents)
    }
}

impl<M> Stream for ModelCursor<M> {
    type Item = ModelResult<Tracked<M>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl<M> std::fmt::Debug for ModelCursor<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCursor").finish_non_exhaustive()
    }
}
