//! Custom value conversions applied at the storage boundary

use std::fmt;
use std::sync::Arc;

use bson::{Bson, Document};

/// Converts application values to and from their stored form
///
/// `encode` and `decode` return `None` for values the codec does not handle,
/// letting the next codec or the default representation take over.
pub trait TypeCodec: Send + Sync {
    fn name(&self) -> &str;

    fn encode(&self, value: &Bson) -> Option<Bson>;

    fn decode(&self, value: &Bson) -> Option<Bson>;
}

impl fmt::Debug for dyn TypeCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeCodec({})", self.name())
    }
}

/// Ordered set of codecs, most recently declared first
#[derive(Clone, Copy)]
pub struct CodecChain<'a> {
    codecs: &'a [Arc<dyn TypeCodec>],
}

impl<'a> CodecChain<'a> {
    pub fn new(codecs: &'a [Arc<dyn TypeCodec>]) -> Self {
        Self { codecs }
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    pub fn encode_value(&self, value: Bson) -> Bson {
        self.convert(value, |codec, value| codec.encode(value))
    }

    pub fn decode_value(&self, value: Bson) -> Bson {
        self.convert(value, |codec, value| codec.decode(value))
    }

    pub fn encode_document(&self, doc: Document) -> Document {
        if self.is_empty() {
            return doc;
        }
        doc.into_iter()
            .map(|(key, value)| (key, self.encode_value(value)))
            .collect()
    }

    pub fn decode_document(&self, doc: Document) -> Document {
        if self.is_empty() {
            return doc;
        }
        doc.into_iter()
            .map(|(key, value)| (key, self.decode_value(value)))
            .collect()
    }

    fn convert(&self, value: Bson, apply: impl Fn(&dyn TypeCodec, &Bson) -> Option<Bson> + Copy) -> Bson {
        if let Some(converted) = self.codecs.iter().rev().find_map(|codec| apply(codec.as_ref(), &value)) {
            return converted;
        }

        match value {
            Bson::Document(doc) => Bson::Document(
                doc.into_iter()
                    .map(|(key, value)| (key, self.convert(value, apply)))
                    .collect(),
            ),
            Bson::Array(items) => Bson::Array(items.into_iter().map(|item| self.convert(item, apply)).collect()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    /// Stores booleans as "Y"/"N"
    struct YesNo;

    impl TypeCodec for YesNo {
        fn name(&self) -> &str {
            "yes_no"
        }

        fn encode(&self, value: &Bson) -> Option<Bson> {
            match value {
                Bson::Boolean(flag) => Some(Bson::String(if *flag { "Y" } else { "N" }.to_string())),
                _ => None,
            }
        }

        fn decode(&self, value: &Bson) -> Option<Bson> {
            match value {
                Bson::String(s) if s == "Y" => Some(Bson::Boolean(true)),
                Bson::String(s) if s == "N" => Some(Bson::Boolean(false)),
                _ => None,
            }
        }
    }

    /// Overrides booleans as integers
    struct OneZero;

    impl TypeCodec for OneZero {
        fn name(&self) -> &str {
            "one_zero"
        }

        fn encode(&self, value: &Bson) -> Option<Bson> {
            value.as_bool().map(|flag| Bson::Int32(flag as i32))
        }

        fn decode(&self, _value: &Bson) -> Option<Bson> {
            None
        }
    }

    #[test]
    fn test_encode_decode_nested() {
        let codecs: Vec<Arc<dyn TypeCodec>> = vec![Arc::new(YesNo)];
        let chain = CodecChain::new(&codecs);

        let encoded = chain.encode_document(doc! { "a": true, "n": { "b": false }, "l": [true, 1] });
        assert_eq!(encoded, doc! { "a": "Y", "n": { "b": "N" }, "l": ["Y", 1] });
        assert_eq!(chain.decode_document(encoded), doc! { "a": true, "n": { "b": false }, "l": [true, 1] });
    }

    #[test]
    fn test_later_codec_wins() {
        let codecs: Vec<Arc<dyn TypeCodec>> = vec![Arc::new(YesNo), Arc::new(OneZero)];
        let chain = CodecChain::new(&codecs);
        assert_eq!(chain.encode_value(Bson::Boolean(true)), Bson::Int32(1));
        assert_eq!(chain.decode_value(Bson::String("N".into())), Bson::Boolean(false));
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let chain = CodecChain::new(&[]);
        let doc = doc! { "a": 1 };
        assert_eq!(chain.encode_document(doc.clone()), doc);
    }
}
