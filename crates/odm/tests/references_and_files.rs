//! Integration tests for typed references and file storage

use std::sync::Arc;

use bson::{doc, Bson};
use elif_odm::prelude::*;
use elif_odm::types::{DataFile, FileField};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Author {
    #[serde(rename = "_id", default, skip_serializing_if = "Field::is_undefined")]
    id: Field<ObjectId>,
    name: String,
}

impl Model for Author {
    type Id = Field<ObjectId>;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn id_mut(&mut self) -> &mut Self::Id {
        &mut self.id
    }

    fn declare() -> MetaDeclaration<Self> {
        MetaDeclaration::new().collection_name("authors")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Layout {
    columns: u32,
    dark: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Book {
    #[serde(rename = "_id", default, skip_serializing_if = "Field::is_undefined")]
    id: Field<ObjectId>,
    title: String,
    author: Reference<Author>,
    #[serde(default)]
    cover: Field<FileField>,
    #[serde(default)]
    layout: Field<DataFile<Layout>>,
}

impl Model for Book {
    type Id = Field<ObjectId>;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn id_mut(&mut self) -> &mut Self::Id {
        &mut self.id
    }

    fn declare() -> MetaDeclaration<Self> {
        MetaDeclaration::new().collection_name("books")
    }
}

fn registry() -> ModelRegistry {
    let client: Arc<dyn DocumentClient> = MemoryClient::shared();
    ModelRegistry::new().with_client(client).with_database_name("library")
}

#[tokio::test]
async fn test_reference_round_trips_through_store() {
    let registry = registry();
    let authors = registry.register::<Author>().unwrap();
    let books = registry.register::<Book>().unwrap();

    let mut author = authors.document(Author {
        id: Field::Undefined,
        name: "Le Guin".to_string(),
    });
    assert!(author.reference().is_err());
    author.save().await.unwrap();

    let mut book = books.document(Book {
        id: Field::Undefined,
        title: "The Dispossessed".to_string(),
        author: author.reference().unwrap(),
        cover: Field::Undefined,
        layout: Field::Undefined,
    });
    book.save().await.unwrap();

    let stored = books.find_one(doc! { "title": "The Dispossessed" }).await.unwrap().unwrap();
    assert!(matches!(stored.snapshot().get("author"), Some(Bson::ObjectId(_))));

    let loaded = stored.author.load(&registry).await.unwrap().unwrap();
    assert_eq!(loaded.name, "Le Guin");
    assert_eq!(loaded.id, author.id);
}

#[tokio::test]
async fn test_reference_to_unregistered_model_fails_to_load() {
    let registry = registry();
    let reference: Reference<Author> = Reference::new(ObjectId::new());

    let err = reference.load(&registry).await.unwrap_err();
    assert!(matches!(err, ModelError::NotRegistered(_)));

    registry.register::<Author>().unwrap();
    assert!(reference.load(&registry).await.unwrap().is_none());
}

#[tokio::test]
async fn test_reference_rejects_other_models() {
    let registry = registry();
    let authors = registry.register::<Author>().unwrap();
    let books = registry.register::<Book>().unwrap();

    let mut author = authors.document(Author {
        id: Field::Undefined,
        name: "Herbert".to_string(),
    });
    author.save().await.unwrap();
    let mut book = books.document(Book {
        id: Field::Undefined,
        title: "Dune".to_string(),
        author: author.reference().unwrap(),
        cover: Field::Undefined,
        layout: Field::Undefined,
    });
    book.save().await.unwrap();

    let err = Reference::<Author>::from_document(&*book).unwrap_err();
    assert_eq!(err.kind, ValidationErrorKind::ReferenceTypeInvalid);
}

#[tokio::test]
async fn test_model_files_share_database_bucket() {
    let registry = registry();
    registry.register::<Author>().unwrap();
    let books = registry.register::<Book>().unwrap();

    let id = books.upload_file("cover.png", vec![1, 2, 3]).await.unwrap();
    let cover = FileField::from_id(id);
    let handle = cover.open(books.files().unwrap());
    assert_eq!(handle.read().await.unwrap(), vec![1, 2, 3]);
    assert_eq!(handle.info().await.unwrap().filename, "cover.png");

    let mut book = books.document(Book {
        id: Field::Undefined,
        title: "Illustrated".to_string(),
        author: Reference::new(ObjectId::new()),
        cover: Field::Defined(cover),
        layout: Field::Undefined,
    });
    book.save().await.unwrap();

    let stored = books.find_by_id(book.id.clone().into_option().unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.cover.as_option().map(FileField::id), Some(id));
}

#[tokio::test]
async fn test_data_file_field_stores_typed_payload() {
    let registry = registry();
    let books = registry.register::<Book>().unwrap();
    let bucket = books.files().unwrap();

    let layout = DataFile::<Layout>::new();
    let value = Layout {
        columns: 2,
        dark: true,
    };
    layout.dump(bucket.as_ref(), "layout.json", &value).await.unwrap();

    let mut book = books.document(Book {
        id: Field::Undefined,
        title: "Typeset".to_string(),
        author: Reference::new(ObjectId::new()),
        cover: Field::Undefined,
        layout: Field::Defined(layout),
    });
    book.save().await.unwrap();

    let stored = books.find_one(doc! { "title": "Typeset" }).await.unwrap().unwrap();
    let file = stored.layout.as_option().unwrap();
    assert_eq!(file.load(bucket.as_ref()).await.unwrap(), value);
}
