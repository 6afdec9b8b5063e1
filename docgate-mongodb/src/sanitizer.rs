//! Field name sanitization for MongoDB compatibility.
//!
//! Gateway documents are schema-less, so a client may send keys that MongoDB cannot
//! store or would read as query syntax. Keys are escaped on the way in and restored
//! on the way out. Values are stored untouched.

use bson::{Bson, Document};


/// Escapes and restores document keys around MongoDB's field name restrictions.
///
/// MongoDB does not allow field names (document keys) to contain:
/// - Dots (`.`) - used for nested field access in queries
/// - Dollar signs (`$`) - used for operators in queries
/// - Null bytes (`\0`) - field name terminators
pub(crate) struct ValueSanitizer;

impl ValueSanitizer {
    const REPLACEMENTS: [(&'static str, &'static str); 3] = [
        (".", "__dot__"),
        ("$", "__dollar__"),
        ("\0", "__null__"),
    ];

    /// Escapes every key of `document`, recursing into nested documents and arrays.
    pub(crate) fn sanitize_document(document: &Document) -> Document {
        document
            .iter()
            .map(|(k, v)| (Self::sanitize_key(k), Self::sanitize_value(v)))
            .collect()
    }

    fn sanitize_value(value: &Bson) -> Bson {
        match value {
            Bson::Array(arr) => Bson::Array(arr.iter().map(Self::sanitize_value).collect()),
            Bson::Document(doc) => Bson::Document(Self::sanitize_document(doc)),
            _ => value.clone(),
        }
    }

    pub(crate) fn sanitize_key(input: &str) -> String {
        let mut sanitized = input.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter() {
            sanitized = sanitized.replace(*target, *replacement);
        }
        sanitized
    }

    /// Inverse of [`ValueSanitizer::sanitize_document`].
    pub(crate) fn restore_document(document: &Document) -> Document {
        document
            .iter()
            .map(|(k, v)| (Self::restore_key(k), Self::restore_value(v)))
            .collect()
    }

    fn restore_value(value: &Bson) -> Bson {
        match value {
            Bson::Array(arr) => Bson::Array(arr.iter().map(Self::restore_value).collect()),
            Bson::Document(doc) => Bson::Document(Self::restore_document(doc)),
            _ => value.clone(),
        }
    }

    pub(crate) fn restore_key(input: &str) -> String {
        let mut restored = input.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter().rev() {
            restored = restored.replace(*replacement, *target);
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn escapes_nested_keys_but_not_values() {
        let document = doc! {
            "a.b": "$keep.me",
            "nested": { "$op": 1, "list": [{ "x.y": 2 }] },
        };

        let sanitized = ValueSanitizer::sanitize_document(&document);

        assert_eq!(
            sanitized,
            doc! {
                "a__dot__b": "$keep.me",
                "nested": { "__dollar__op": 1, "list": [{ "x__dot__y": 2 }] },
            }
        );
        assert_eq!(ValueSanitizer::restore_document(&sanitized), document);
    }

    #[test]
    fn plain_keys_pass_through() {
        assert_eq!(ValueSanitizer::sanitize_key("_id"), "_id");
        assert_eq!(ValueSanitizer::restore_key("createdAt"), "createdAt");
    }
}
