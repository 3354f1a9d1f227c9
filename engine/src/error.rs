//! Error types for the Parse engine.

use crate::ClassName;
use thiserror::Error;

/// All possible errors from the Parse engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Construction errors
    #[error("{operation} requires an array of objects")]
    NotAnArray { operation: &'static str },

    #[error("cannot create a relation operation with no objects")]
    EmptyRelation,

    // Merge and apply errors
    #[error("Operation is invalid after previous operation.")]
    InvalidMerge {
        operation: &'static str,
        previous: &'static str,
    },

    #[error("Cannot increment a non-number type.")]
    TypeConflict { found: &'static str },

    #[error("related object must be of class {expected}, but {found} was passed in")]
    RelationClassMismatch {
        expected: ClassName,
        found: ClassName,
    },

    // Encoding errors
    #[error("object references are not allowed here")]
    ObjectsNotAllowed,

    #[error("cannot reference an unsaved {0} object")]
    UnsavedObject(ClassName),

    #[error("invalid wire value: {0}")]
    InvalidWireValue(String),

    #[error("invalid geo point: latitude {latitude}, longitude {longitude}")]
    InvalidGeoPoint { latitude: String, longitude: String },

    #[error("number is not representable: {0}")]
    InvalidNumber(String),

    // Object model errors
    #[error("key '{0}' is reserved and cannot be modified")]
    ReservedKey(String),

    #[error("{0} object has no objectId")]
    MissingObjectId(ClassName),

    #[error("relation is not attached to an object field")]
    DetachedRelation,

    #[error("a save of this {0} object is already in flight")]
    SaveInProgress(ClassName),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
