//! Index declarations
//!
//! Models declare indexes in several loose forms: a sigil string such as
//! `"-created +title"`, a list of tokens or pairs, a key mapping, or any of
//! those paired with options. [`Index::parse`] normalizes them into one
//! canonical [`Index`] that can be handed to `create_index`.

use std::fmt;

use bson::{Bson, Document};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::IndexError;

static TOKEN: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| Regex::new(r"^([-+#@])?(\w+(?:\.\w+)*)$"));

/// Direction or kind of an indexed key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexValue {
    Ascending,
    Descending,
    Text,
    Hashed,
}

impl IndexValue {
    fn from_sigil(sigil: Option<&str>) -> Self {
        match sigil {
            Some("-") => IndexValue::Descending,
            Some("#") => IndexValue::Hashed,
            Some("@") => IndexValue::Text,
            _ => IndexValue::Ascending,
        }
    }

    /// Interpret a raw value as an index direction or kind
    pub fn from_bson(value: &Bson) -> Result<Self, IndexError> {
        let number = match value {
            Bson::Int32(n) => Some(i64::from(*n)),
            Bson::Int64(n) => Some(*n),
            Bson::Double(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        };

        match (number, value) {
            (Some(1), _) => Ok(IndexValue::Ascending),
            (Some(-1), _) => Ok(IndexValue::Descending),
            (_, Bson::String(s)) if s == "text" => Ok(IndexValue::Text),
            (_, Bson::String(s)) if s == "hashed" => Ok(IndexValue::Hashed),
            _ => Err(IndexError::Value(format!("invalid index value {}", value))),
        }
    }

    pub fn to_bson(self) -> Bson {
        match self {
            IndexValue::Ascending => Bson::Int32(1),
            IndexValue::Descending => Bson::Int32(-1),
            IndexValue::Text => Bson::String("text".to_string()),
            IndexValue::Hashed => Bson::String("hashed".to_string()),
        }
    }
}

impl From<IndexValue> for Bson {
    fn from(value: IndexValue) -> Self {
        value.to_bson()
    }
}

impl fmt::Display for IndexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexValue::Ascending => f.write_str("1"),
            IndexValue::Descending => f.write_str("-1"),
            IndexValue::Text => f.write_str("text"),
            IndexValue::Hashed => f.write_str("hashed"),
        }
    }
}

/// Ordered, duplicate-free set of indexed keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexKeys(Vec<(String, IndexValue)>);

impl IndexKeys {
    fn build(pairs: Vec<(String, IndexValue)>) -> Result<Self, IndexError> {
        if pairs.is_empty() {
            return Err(IndexError::Value("index keys must not be empty".to_string()));
        }

        for (position, (name, _)) in pairs.iter().enumerate() {
            if pairs[..position].iter().any(|(seen, _)| seen == name) {
                return Err(IndexError::Value(format!("duplicate index key `{}`", name)));
            }
        }

        Ok(Self(pairs))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, IndexValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_document(&self) -> Document {
        self.0
            .iter()
            .map(|(name, value)| (name.clone(), value.to_bson()))
            .collect()
    }
}

/// Options of an index, limited to what the driver understands
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IndexOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse: Option<bool>,
    #[serde(default, alias = "bucket_size", skip_serializing_if = "Option::is_none")]
    pub bucket_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(default, alias = "expire_after_seconds", skip_serializing_if = "Option::is_none")]
    pub expire_after_seconds: Option<i64>,
    #[serde(default, alias = "partial_filter_expression", skip_serializing_if = "Option::is_none")]
    pub partial_filter_expression: Option<Bson>,
    #[serde(default, alias = "wildcard_pattern", skip_serializing_if = "Option::is_none")]
    pub wildcard_pattern: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
}

impl IndexOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a raw options mapping
    pub fn from_document(options: Document) -> Result<Self, IndexError> {
        bson::from_document(options).map_err(|e| IndexError::Value(format!("invalid index options: {}", e)))
    }

    /// Render the options for the driver, dropping unset ones
    pub fn to_document(&self) -> Document {
        bson::to_document(self).unwrap_or_default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = Some(unique);
        self
    }

    pub fn sparse(mut self, sparse: bool) -> Self {
        self.sparse = Some(sparse);
        self
    }

    pub fn expire_after_seconds(mut self, seconds: i64) -> Self {
        self.expire_after_seconds = Some(seconds);
        self
    }
}

/// Canonical index declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub keys: IndexKeys,
    pub options: IndexOptions,
}

/// Any accepted source form of an index declaration
#[derive(Debug, Clone, PartialEq)]
pub enum IndexSpec {
    Index(Index),
    /// Whitespace separated sigil tokens
    Text(String),
    List(Vec<IndexItem>),
    Map(Document),
    WithOptions(Box<IndexSpec>, Document),
    /// Untyped value, e.g. from a configuration file
    Raw(Bson),
}

/// One element of a list declaration
#[derive(Debug, Clone, PartialEq)]
pub enum IndexItem {
    Token(String),
    Pair(String, Bson),
    /// Single-entry mapping
    Entry(Document),
}

impl Index {
    /// Parse any accepted declaration form
    pub fn parse(spec: impl Into<IndexSpec>) -> Result<Self, IndexError> {
        match spec.into() {
            IndexSpec::Index(index) => Ok(index),
            IndexSpec::WithOptions(keys, options) => Ok(Self {
                keys: parse_keys(*keys)?,
                options: IndexOptions::from_document(options)?,
            }),
            IndexSpec::Raw(value) => Self::parse(IndexSpec::from_bson(value)?),
            other => Ok(Self {
                keys: parse_keys(other)?,
                options: IndexOptions::default(),
            }),
        }
    }

    pub fn with_options(mut self, options: IndexOptions) -> Self {
        self.options = options;
        self
    }

    pub fn keys_document(&self) -> Document {
        self.keys.to_document()
    }

    pub fn options_document(&self) -> Document {
        self.options.to_document()
    }

    /// Explicit name, or the driver-style default name
    pub fn name(&self) -> String {
        self.options
            .name
            .clone()
            .unwrap_or_else(|| default_index_name(&self.keys_document()))
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Driver-style default index name such as `title_1_score_-1`
pub fn default_index_name(keys: &Document) -> String {
    keys.iter()
        .map(|(key, value)| {
            let value = match value {
                Bson::Int32(n) => n.to_string(),
                Bson::Int64(n) => n.to_string(),
                Bson::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("{}_{}", key, value)
        })
        .collect::<Vec<_>>()
        .join("_")
}

impl IndexSpec {
    /// Interpret an untyped value
    ///
    /// A document of the form `{keys: .., options: {..}}` carries options;
    /// any other document is a key mapping.
    pub fn from_bson(value: Bson) -> Result<Self, IndexError> {
        match value {
            Bson::String(text) => Ok(IndexSpec::Text(text)),
            Bson::Array(items) => items
                .into_iter()
                .map(IndexItem::from_bson)
                .collect::<Result<Vec<_>, _>>()
                .map(IndexSpec::List),
            Bson::Document(doc) if is_keys_with_options(&doc) => {
                let mut doc = doc;
                let keys = doc.remove("keys").unwrap_or(Bson::Null);
                let options = match doc.remove("options") {
                    None => Document::new(),
                    Some(Bson::Document(options)) => options,
                    Some(other) => {
                        return Err(IndexError::Type(format!("index options must be a mapping, got {}", other)))
                    }
                };
                Ok(IndexSpec::WithOptions(Box::new(IndexSpec::from_bson(keys)?), options))
            }
            Bson::Document(doc) => Ok(IndexSpec::Map(doc)),
            other => Err(IndexError::Type(format!("{}", other))),
        }
    }
}

fn is_keys_with_options(doc: &Document) -> bool {
    match doc.get("keys") {
        Some(keys) => {
            IndexValue::from_bson(keys).is_err() && doc.keys().all(|key| key == "keys" || key == "options")
        }
        None => false,
    }
}

impl IndexItem {
    fn from_bson(value: Bson) -> Result<Self, IndexError> {
        match value {
            Bson::String(token) => Ok(IndexItem::Token(token)),
            Bson::Document(entry) => Ok(IndexItem::Entry(entry)),
            Bson::Array(mut pair) if pair.len() == 2 => {
                let value = pair.pop().unwrap_or(Bson::Null);
                match pair.pop() {
                    Some(Bson::String(name)) => Ok(IndexItem::Pair(name, value)),
                    Some(other) => Err(IndexError::Type(format!("index key name must be a string, got {}", other))),
                    None => Err(IndexError::Value("empty index pair".to_string())),
                }
            }
            Bson::Array(items) => Err(IndexError::Value(format!("{}", Bson::Array(items)))),
            other => Err(IndexError::Type(format!("{}", other))),
        }
    }

    fn into_pair(self) -> Result<(String, IndexValue), IndexError> {
        match self {
            IndexItem::Token(token) => parse_token(&token),
            IndexItem::Pair(name, value) => Ok((key_name(&name)?, IndexValue::from_bson(&value)?)),
            IndexItem::Entry(entry) => {
                if entry.len() != 1 {
                    return Err(IndexError::Value(format!("index entry must have exactly one key: {}", entry)));
                }
                let (name, value) = entry
                    .into_iter()
                    .next()
                    .ok_or_else(|| IndexError::Value("empty index entry".to_string()))?;
                Ok((key_name(&name)?, IndexValue::from_bson(&value)?))
            }
        }
    }
}

fn parse_token(token: &str) -> Result<(String, IndexValue), IndexError> {
    let pattern = TOKEN
        .as_ref()
        .map_err(|e| IndexError::Value(format!("index token pattern failed to compile: {}", e)))?;
    let captures = pattern
        .captures(token)
        .ok_or_else(|| IndexError::Value(format!("invalid index token `{}`", token)))?;
    let sigil = captures.get(1).map(|m| m.as_str());
    let name = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
    Ok((name.to_string(), IndexValue::from_sigil(sigil)))
}

fn key_name(name: &str) -> Result<String, IndexError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(IndexError::Value("index key name must not be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

fn parse_keys(spec: IndexSpec) -> Result<IndexKeys, IndexError> {
    let pairs = match spec {
        IndexSpec::Text(text) => text
            .split_whitespace()
            .map(parse_token)
            .collect::<Result<Vec<_>, _>>()?,
        IndexSpec::List(items) => items
            .into_iter()
            .map(IndexItem::into_pair)
            .collect::<Result<Vec<_>, _>>()?,
        IndexSpec::Map(doc) => doc
            .into_iter()
            .map(|(name, value)| Ok((key_name(&name)?, IndexValue::from_bson(&value)?)))
            .collect::<Result<Vec<_>, IndexError>>()?,
        IndexSpec::Raw(value) => return parse_keys(IndexSpec::from_bson(value)?),
        IndexSpec::Index(_) | IndexSpec::WithOptions(..) => {
            return Err(IndexError::Type("index keys must be a string, list or mapping".to_string()))
        }
    };

    IndexKeys::build(pairs)
}

impl From<&str> for IndexSpec {
    fn from(text: &str) -> Self {
        IndexSpec::Text(text.to_string())
    }
}

impl From<String> for IndexSpec {
    fn from(text: String) -> Self {
        IndexSpec::Text(text)
    }
}

impl From<Vec<&str>> for IndexSpec {
    fn from(tokens: Vec<&str>) -> Self {
        IndexSpec::List(tokens.into_iter().map(IndexItem::from).collect())
    }
}

impl From<Vec<(&str, IndexValue)>> for IndexSpec {
    fn from(pairs: Vec<(&str, IndexValue)>) -> Self {
        IndexSpec::List(pairs.into_iter().map(IndexItem::from).collect())
    }
}

impl From<Vec<IndexItem>> for IndexSpec {
    fn from(items: Vec<IndexItem>) -> Self {
        IndexSpec::List(items)
    }
}

impl From<Document> for IndexSpec {
    fn from(doc: Document) -> Self {
        IndexSpec::Map(doc)
    }
}

impl From<Bson> for IndexSpec {
    fn from(value: Bson) -> Self {
        IndexSpec::Raw(value)
    }
}

impl From<Index> for IndexSpec {
    fn from(index: Index) -> Self {
        IndexSpec::Index(index)
    }
}

impl<S: Into<IndexSpec>> From<(S, Document)> for IndexSpec {
    fn from((keys, options): (S, Document)) -> Self {
        IndexSpec::WithOptions(Box::new(keys.into()), options)
    }
}

impl From<&str> for IndexItem {
    fn from(token: &str) -> Self {
        IndexItem::Token(token.to_string())
    }
}

impl From<(&str, IndexValue)> for IndexItem {
    fn from((name, value): (&str, IndexValue)) -> Self {
        IndexItem::Pair(name.to_string(), value.to_bson())
    }
}

impl From<Document> for IndexItem {
    fn from(entry: Document) -> Self {
        IndexItem::Entry(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{bson, doc};

    fn keys(index: &Index) -> Document {
        index.keys_document()
    }

    #[test]
    fn test_sigil_tokens() {
        let cases = [
            ("_id", doc! { "_id": 1 }),
            ("+key", doc! { "key": 1 }),
            ("-key", doc! { "key": -1 }),
            ("@key", doc! { "key": "text" }),
            ("#key", doc! { "key": "hashed" }),
            ("-a +b #c @d", doc! { "a": -1, "b": 1, "c": "hashed", "d": "text" }),
            ("address.city", doc! { "address.city": 1 }),
        ];

        for (spec, expected) in cases {
            let index = Index::parse(spec).unwrap();
            assert_eq!(keys(&index), expected, "parsing {:?}", spec);
            assert_eq!(index.options_document(), Document::new());
        }
    }

    #[test]
    fn test_token_must_match_completely() {
        let index = Index::parse("a  -b\t#c").unwrap();
        assert_eq!(keys(&index), doc! { "a": 1, "b": -1, "c": "hashed" });

        for spec in ["a-b", "a b!", "-a.", "+"] {
            let err = Index::parse(spec).unwrap_err();
            assert!(matches!(err, IndexError::Value(_)), "{:?} gave {:?}", spec, err);
        }
    }

    #[test]
    fn test_list_map_and_pairs() {
        let index = Index::parse(vec!["a", "b", "c"]).unwrap();
        assert_eq!(keys(&index), doc! { "a": 1, "b": 1, "c": 1 });

        let index = Index::parse(doc! { "a": 1, "b": 1, "c": 1 }).unwrap();
        assert_eq!(keys(&index), doc! { "a": 1, "b": 1, "c": 1 });

        let index = Index::parse(vec![
            ("a", IndexValue::Descending),
            ("b", IndexValue::Ascending),
            ("c", IndexValue::Hashed),
        ])
        .unwrap();
        assert_eq!(keys(&index), doc! { "a": -1, "b": 1, "c": "hashed" });

        let index = Index::parse(vec![IndexItem::from(doc! { "a": 1 })]).unwrap();
        assert_eq!(keys(&index), doc! { "a": 1 });
    }

    #[test]
    fn test_with_options() {
        let index = Index::parse(("-a", doc! { "unique": true })).unwrap();
        assert_eq!(keys(&index), doc! { "a": -1 });
        assert_eq!(index.options_document(), doc! { "unique": true });
        assert_eq!(index.options.unique, Some(true));

        let index = Index::parse(("ttl", doc! { "expire_after_seconds": 30 })).unwrap();
        assert_eq!(index.options_document(), doc! { "expireAfterSeconds": 30_i64 });
    }

    #[test]
    fn test_raw_values() {
        let index = Index::parse(bson!([["a", -1], "+b", { "c": "text" }])).unwrap();
        assert_eq!(keys(&index), doc! { "a": -1, "b": 1, "c": "text" });

        let index = Index::parse(bson!({ "keys": "-created", "options": { "name": "recent" } })).unwrap();
        assert_eq!(keys(&index), doc! { "created": -1 });
        assert_eq!(index.name(), "recent");

        let index = Index::parse(bson!({ "keys": 1 })).unwrap();
        assert_eq!(keys(&index), doc! { "keys": 1 });
    }

    #[test]
    fn test_value_errors() {
        let cases: Vec<IndexSpec> = vec![
            doc! { "key": 2 }.into(),
            doc! { "key": -2 }.into(),
            doc! { "key": "asf" }.into(),
            doc! { "key": "hashedd" }.into(),
            "!key".into(),
            "".into(),
            "a-b".into(),
            doc! { "": 1 }.into(),
            (doc! {}, doc! { "unique": true }).into(),
            (doc! { "key": 1 }, doc! { "unique": "error" }).into(),
            ("a", doc! { "index2": true }).into(),
            ("a", doc! { "index": "True" }).into(),
            vec!["+a", "-a"].into(),
            vec![IndexItem::from(doc! { "a": 1, "b": 1 })].into(),
            bson!([1, 1]).into(),
        ];

        for spec in cases {
            let shown = format!("{:?}", spec);
            assert!(Index::parse(spec).is_err(), "expected failure for {}", shown);
        }
    }

    #[test]
    fn test_type_errors() {
        for value in [bson!(1), Bson::Null, bson!(true), bson!([[1, 1]])] {
            let err = Index::parse(value.clone()).unwrap_err();
            assert!(matches!(err, IndexError::Type(_)), "{} gave {:?}", value, err);
        }
    }

    #[test]
    fn test_default_name() {
        let index = Index::parse("title -score").unwrap();
        assert_eq!(index.name(), "title_1_score_-1");
        assert_eq!(Index::parse("@body").unwrap().to_string(), "body_text");
    }

    #[test]
    fn test_identity() {
        let index = Index::parse("a").unwrap();
        assert_eq!(Index::parse(index.clone()).unwrap(), index);
    }
}
