//! Model metadata: declarations, composition and the model registry

pub mod declaration;
pub mod model_meta;
pub mod registry;

pub use declaration::MetaDeclaration;
pub use model_meta::ModelMeta;
pub use registry::{ModelRegistry, RegisteredModel};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::backends::{DocumentClient, MemoryClient};
    use crate::error::ModelError;
    use crate::field::Field;
    use crate::index::{Index, IndexValue};
    use crate::model::Model;
    use crate::triggers::{before_save, TriggerPhase};
    use crate::types::ObjectId;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Base {
        #[serde(rename = "_id", default, skip_serializing_if = "Field::is_undefined")]
        id: Field<ObjectId>,
        #[serde(default)]
        a: i32,
    }

    impl Model for Base {
        type Id = Field<ObjectId>;

        fn id(&self) -> &Self::Id {
            &self.id
        }

        fn id_mut(&mut self) -> &mut Self::Id {
            &mut self.id
        }

        fn declare() -> MetaDeclaration<Self> {
            MetaDeclaration::new()
                .collection_name("base")
                .index("a")
                .trigger(before_save(|_: &mut Base, _| Ok(())).named("t1"))
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Child {
        #[serde(flatten)]
        base: Base,
        #[serde(default)]
        b: i32,
    }

    impl Model for Child {
        type Id = Field<ObjectId>;

        fn id(&self) -> &Self::Id {
            &self.base.id
        }

        fn id_mut(&mut self) -> &mut Self::Id {
            &mut self.base.id
        }

        fn declare() -> MetaDeclaration<Self> {
            MetaDeclaration::<Self>::new()
                .extends::<Base>(|child| &mut child.base)
                .index("-b")
                .trigger(before_save(|_: &mut Child, _| Ok(())).named("t2"))
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Twice {
        #[serde(flatten)]
        base: Base,
    }

    impl Model for Twice {
        type Id = Field<ObjectId>;

        fn id(&self) -> &Self::Id {
            &self.base.id
        }

        fn id_mut(&mut self) -> &mut Self::Id {
            &mut self.base.id
        }

        fn declare() -> MetaDeclaration<Self> {
            MetaDeclaration::<Self>::new()
                .extends::<Base>(|twice| &mut twice.base)
                .extends::<Base>(|twice| &mut twice.base)
        }
    }

    fn registry() -> ModelRegistry {
        let client: Arc<dyn DocumentClient> = MemoryClient::shared();
        ModelRegistry::new().with_client(client).with_database_name("meta_tests")
    }

    #[test]
    fn test_child_concatenates_parent_sequences() {
        let registry = registry();
        let base = registry.register::<Base>().unwrap();
        let child = registry.register::<Child>().unwrap();

        assert_eq!(child.indexes(), &[Index::parse("a").unwrap(), Index::parse("-b").unwrap()][..]);
        let names: Vec<_> = child.triggers().iter().filter_map(|t| t.name()).collect();
        assert_eq!(names, vec!["t1", "t2"]);

        assert_eq!(base.indexes().len(), 1);
        assert_eq!(base.triggers().len(), 1);
        assert_eq!(child.indexes()[1].keys.iter().next(), Some(("b", IndexValue::Descending)));
    }

    #[test]
    fn test_scalars_fall_back_to_parent_and_registry() {
        let registry = registry();
        registry.register::<Base>().unwrap();
        let child = registry.register::<Child>().unwrap();

        assert_eq!(child.collection_name().unwrap(), "base");
        assert_eq!(child.database_name().unwrap(), "meta_tests");
        assert!(child.is_bound());
        assert!(child.is_subclass_of::<Base>());
        assert!(child.is_subclass_of::<Child>());
        assert_eq!(child.bases(), &["Base"][..]);
        assert_eq!(child.triggers().matching(TriggerPhase::BeforeSave).count(), 2);
    }

    #[test]
    fn test_parent_must_be_registered_first() {
        let registry = registry();
        let err = registry.register::<Child>().unwrap_err();
        assert!(matches!(err, ModelError::ModelType { ref base, .. } if base == "Base"));
        assert!(!registry.is_registered::<Child>());
    }

    #[test]
    fn test_same_base_twice_is_rejected() {
        let registry = registry();
        registry.register::<Base>().unwrap();

        let err = registry.register::<Twice>().unwrap_err();
        assert!(matches!(err, ModelError::Configuration { ref message, .. } if message.contains("Base")));
        assert!(!registry.is_registered::<Twice>());
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = registry();
        let first = registry.register::<Base>().unwrap();
        let second = registry.register::<Base>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.models().len(), 1);

        assert!(matches!(registry.get::<Child>(), Err(ModelError::NotRegistered(_))));
    }

    #[test]
    fn test_missing_bindings_are_reported() {
        let registry = ModelRegistry::new();
        let base = registry.register::<Base>().unwrap();
        assert!(!base.is_bound());
        assert!(matches!(base.client(), Err(ModelError::Client(_))));
        assert!(matches!(base.database_name(), Err(ModelError::DatabaseName(_))));
        assert!(matches!(base.collection(), Err(ModelError::Client(_))));
    }
}
