//! Integration tests for configuration inheritance and index management

use std::sync::Arc;

use bson::doc;
use elif_odm::backends::DocumentCollection;
use elif_odm::prelude::*;
use elif_odm::OdmConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Animal {
    #[serde(rename = "_id", default, skip_serializing_if = "Field::is_undefined")]
    id: Field<ObjectId>,
    name: String,
    #[serde(default)]
    legs: i32,
}

impl Model for Animal {
    type Id = Field<ObjectId>;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn id_mut(&mut self) -> &mut Self::Id {
        &mut self.id
    }

    fn declare() -> MetaDeclaration<Self> {
        MetaDeclaration::new()
            .collection_name("animals")
            .index("name")
            .trigger(triggers::before_save(|animal: &mut Animal, _| {
                animal.name = animal.name.trim().to_string();
                Ok(())
            }))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Dog {
    #[serde(flatten)]
    animal: Animal,
    #[serde(default)]
    good: bool,
    #[serde(default)]
    renamed: bool,
}

impl Model for Dog {
    type Id = Field<ObjectId>;

    fn id(&self) -> &Self::Id {
        &self.animal.id
    }

    fn id_mut(&mut self) -> &mut Self::Id {
        &mut self.animal.id
    }

    fn declare() -> MetaDeclaration<Self> {
        MetaDeclaration::<Self>::new()
            .extends::<Animal>(|dog| &mut dog.animal)
            .collection_name("dogs")
            .index("-legs")
            .trigger(triggers::before_save(|dog: &mut Dog, _| {
                dog.good = true;
                dog.renamed = dog.animal.name == "rex";
                Ok(())
            }))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Puppy {
    #[serde(flatten)]
    dog: Dog,
}

impl Model for Puppy {
    type Id = Field<ObjectId>;

    fn id(&self) -> &Self::Id {
        &self.dog.animal.id
    }

    fn id_mut(&mut self) -> &mut Self::Id {
        &mut self.dog.animal.id
    }

    fn declare() -> MetaDeclaration<Self> {
        MetaDeclaration::<Self>::new()
            .extends::<Dog>(|puppy| &mut puppy.dog)
            .collection_name("puppies")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Plant {
    #[serde(rename = "_id", default, skip_serializing_if = "Field::is_undefined")]
    id: Field<ObjectId>,
}

impl Model for Plant {
    type Id = Field<ObjectId>;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn id_mut(&mut self) -> &mut Self::Id {
        &mut self.id
    }

    fn declare() -> MetaDeclaration<Self> {
        MetaDeclaration::new().index(("species", doc! { "unique": true }))
    }
}

fn client() -> Arc<MemoryClient> {
    MemoryClient::shared()
}

fn registry(client: &Arc<MemoryClient>) -> ModelRegistry {
    let shared: Arc<dyn DocumentClient> = client.clone();
    ModelRegistry::new().with_client(shared).with_database_name("zoo")
}

#[test]
fn test_child_extends_parent_sequences() {
    let client = client();
    let registry = registry(&client);
    let animals = registry.register::<Animal>().unwrap();
    let dogs = registry.register::<Dog>().unwrap();

    let names: Vec<String> = dogs.indexes().iter().map(|index| index.name()).collect();
    assert_eq!(names, vec!["name_1", "legs_-1"]);
    assert_eq!(dogs.triggers().len(), 2);

    assert_eq!(animals.indexes().len(), 1);
    assert_eq!(animals.triggers().len(), 1);
    assert_eq!(dogs.collection_name().unwrap(), "dogs");
    assert_eq!(dogs.bases(), &["Animal"]);
}

#[test]
fn test_grandchild_inherits_transitively() {
    let client = client();
    let registry = registry(&client);
    registry.register::<Animal>().unwrap();
    registry.register::<Dog>().unwrap();
    let puppies = registry.register::<Puppy>().unwrap();

    assert_eq!(puppies.indexes().len(), 2);
    assert_eq!(puppies.triggers().len(), 2);
    assert!(puppies.is_subclass_of::<Animal>());
    assert!(puppies.is_subclass_of::<Dog>());
    assert!(!puppies.is_subclass_of::<Plant>());
    assert_eq!(puppies.lineage().len(), 3);
}

#[test]
fn test_unregistered_parent_is_rejected() {
    let client = client();
    let registry = registry(&client);

    let err = registry.register::<Dog>().unwrap_err();
    assert!(matches!(err, ModelError::ModelType { ref base, .. } if base == "Animal"));
    assert!(!registry.is_registered::<Dog>());
}

#[tokio::test]
async fn test_inherited_triggers_run_parent_first() {
    let client = client();
    let registry = registry(&client);
    registry.register::<Animal>().unwrap();
    let dogs = registry.register::<Dog>().unwrap();

    let mut dog = dogs.document(Dog {
        animal: Animal {
            id: Field::Undefined,
            name: "  rex ".to_string(),
            legs: 4,
        },
        good: false,
        renamed: false,
    });
    dog.save().await.unwrap();

    assert_eq!(dog.animal.name, "rex");
    assert!(dog.good);
    assert!(dog.renamed);

    let stored = dogs.find_one(doc! { "name": "rex" }).await.unwrap().unwrap();
    assert_eq!(stored.id(), dog.id());
    assert!(stored.good);
}

#[tokio::test]
async fn test_ensure_all_indexes_covers_subclasses() {
    let client = client();
    let registry = registry(&client);
    let animals = registry.register::<Animal>().unwrap();
    let dogs = registry.register::<Dog>().unwrap();

    let created = registry.ensure_all_indexes::<Dog>().await.unwrap();
    assert_eq!(created, vec!["name_1", "legs_-1"]);
    assert_eq!(animals.list_indexes().await.unwrap().len(), 1);

    let created = registry.ensure_all_indexes::<Animal>().await.unwrap();
    assert_eq!(created, vec!["name_1", "name_1", "legs_-1"]);

    let listed: Vec<String> = dogs
        .list_indexes()
        .await
        .unwrap()
        .iter()
        .map(|index| index.get_str("name").unwrap().to_string())
        .collect();
    assert_eq!(listed, vec!["_id_", "name_1", "legs_-1"]);
}

#[tokio::test]
async fn test_unbound_models_are_skipped() {
    let client = client();
    let registry = registry(&client);
    registry.register::<Animal>().unwrap();
    let plants = registry.register::<Plant>().unwrap();

    assert!(!plants.is_bound());
    assert!(matches!(plants.collection(), Err(ModelError::CollectionName(_))));

    let created = registry.ensure_every_index().await.unwrap();
    assert_eq!(created, vec!["name_1"]);
}

#[tokio::test]
async fn test_registry_lists_models_in_registration_order() {
    let client = client();
    let registry = registry(&client);
    registry.register::<Animal>().unwrap();
    registry.register::<Plant>().unwrap();
    registry.register::<Dog>().unwrap();
    registry.register::<Animal>().unwrap();

    let names: Vec<&str> = registry.models().iter().map(|model| model.name()).collect();
    assert_eq!(names, vec!["Animal", "Plant", "Dog"]);
    assert_eq!(registry.len(), 3);
}

#[tokio::test]
async fn test_initialize_ensures_indexes_when_configured() {
    let client = client();
    let shared: Arc<dyn DocumentClient> = client.clone();
    let config = OdmConfig::new()
        .with_database_name("startup")
        .ensure_indexes_on_startup(true);
    let registry = ModelRegistry::from_config(&config, shared).unwrap();
    let animals = registry.register::<Animal>().unwrap();

    registry.initialize().await.unwrap();
    assert_eq!(animals.database_name().unwrap(), "startup");
    assert_eq!(animals.list_indexes().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_unique_index_rejects_duplicates() {
    let client = client();
    let registry = registry(&client);
    registry.register::<Animal>().unwrap();
    let dogs = registry.register::<Dog>().unwrap();
    let unique = Index::parse("name").unwrap().with_options(IndexOptions::new().unique(true).name("dog_name"));
    dogs.collection()
        .unwrap()
        .create_index(unique.keys_document(), unique.options_document())
        .await
        .unwrap();

    dogs.insert_one(doc! { "name": "rex" }).await.unwrap();
    let err = dogs.insert_one(doc! { "name": "rex" }).await.unwrap_err();
    assert!(matches!(err, ModelError::Storage(_)));
}
