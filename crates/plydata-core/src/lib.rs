// ABOUTME: Shared document model for plydata stores and caches.
// ABOUTME: Defines the whole-document JSON root type and its shape validation.

pub mod validation;

pub use validation::{ValidationError, validate_document, validate_serialized_len};

/// The root of every store file: stringified entity id mapped to that
/// entity's record. Always an object, never a bare array or scalar.
pub type Document = serde_json::Map<String, serde_json::Value>;
