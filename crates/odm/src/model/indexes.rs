use tracing::info;

use super::core_trait::Model;
use crate::error::ModelResult;
use crate::meta::ModelMeta;

impl<M: Model> ModelMeta<M> {
    /// Create every declared index in declaration order
    pub async fn ensure_indexes(&self) -> ModelResult<Vec<String>> {
        let collection = self.collection()?;
        let mut names = Vec::with_capacity(self.indexes().len());

        for index in self.indexes() {
            let name = collection
                .create_index(index.keys_document(), index.options_document())
                .await?;
            names.push(name);
        }

        info!(
            "Ensured {} indexes for {} on {}.{}",
            names.len(),
            self.name(),
            self.database_name()?,
            collection.name()
        );
        Ok(names)
    }
}
