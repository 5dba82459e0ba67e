// ABOUTME: Shape validation for whole-document JSON records.
// ABOUTME: Enforces depth, key-count, array, string, and serialized-size bounds before any write.

use serde_json::Value;
use thiserror::Error;

use crate::Document;

/// Maximum nesting depth of values below the document root.
pub const MAX_DEPTH: usize = 50;
/// Maximum number of keys in any single object.
pub const MAX_OBJECT_KEYS: usize = 10_000;
/// Maximum number of items in any single array.
pub const MAX_ARRAY_ITEMS: usize = 10_000;
/// Maximum length of any string value, in characters.
pub const MAX_STRING_LEN: usize = 100_000;
/// Maximum length of any object key, in characters.
pub const MAX_KEY_LEN: usize = 1_000;
/// Maximum serialized size of a document accepted for writing.
pub const MAX_SERIALIZED_BYTES: usize = 10 * 1024 * 1024;
/// Maximum on-disk file size accepted for parsing on load.
pub const MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;

/// Errors describing which shape bound a document violated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("document exceeds the maximum nesting depth")]
    TooDeep,

    #[error("object has too many keys ({0})")]
    TooManyKeys(usize),

    #[error("array has too many items ({0})")]
    ArrayTooLong(usize),

    #[error("string value too long ({0} chars)")]
    StringTooLong(usize),

    #[error("object key too long ({0} chars)")]
    KeyTooLong(usize),

    #[error("serialized document too large ({0} bytes)")]
    DocumentTooLarge(usize),
}

/// Walk a document and check every shape bound. Runs before any file
/// mutation on save, and again on every parsed document on load.
pub fn validate_document(document: &Document) -> Result<(), ValidationError> {
    check_object(document, 0)
}

/// Check the serialized-size ceiling for a document about to be written.
pub fn validate_serialized_len(len: usize) -> Result<(), ValidationError> {
    if len > MAX_SERIALIZED_BYTES {
        return Err(ValidationError::DocumentTooLarge(len));
    }
    Ok(())
}

fn check_value(value: &Value, depth: usize) -> Result<(), ValidationError> {
    if depth > MAX_DEPTH {
        return Err(ValidationError::TooDeep);
    }

    match value {
        Value::Object(map) => check_object(map, depth),
        Value::Array(items) => {
            if items.len() > MAX_ARRAY_ITEMS {
                return Err(ValidationError::ArrayTooLong(items.len()));
            }
            for item in items {
                check_value(item, depth + 1)?;
            }
            Ok(())
        }
        Value::String(s) => {
            let chars = s.chars().count();
            if chars > MAX_STRING_LEN {
                return Err(ValidationError::StringTooLong(chars));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn check_object(
    map: &serde_json::Map<String, Value>,
    depth: usize,
) -> Result<(), ValidationError> {
    if map.len() > MAX_OBJECT_KEYS {
        return Err(ValidationError::TooManyKeys(map.len()));
    }

    for (key, value) in map {
        let key_chars = key.chars().count();
        if key_chars > MAX_KEY_LEN {
            return Err(ValidationError::KeyTooLong(key_chars));
        }
        check_value(value, depth + 1)?;
    }

    Ok(())
}
