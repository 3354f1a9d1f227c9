//! # Parse Engine
//!
//! The object model of the Parse SDK: field operations, dirty tracking and
//! the wire codec.
//!
//! This crate turns local mutations of remote objects into the operation
//! documents a Parse Server understands, and folds server responses back into
//! local state. It performs no IO; the `parse-client` crate moves the bytes.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine never touches the network
//! - **Operations, not writes**: every mutation is recorded as a [`FieldOp`]
//! - **One pending op per field**: new mutations merge into the pending one
//! - **Immutable algebra**: merge and apply return new values
//!
//! ## Core Concepts
//!
//! ### Field operations
//!
//! - [`SetOp`] - Overwrite a field
//! - [`FieldOp::Delete`] - Remove a field
//! - [`IncrementOp`] - Add to a number
//! - [`AddOp`] / [`AddUniqueOp`] / [`RemoveOp`] - Array edits
//! - [`RelationOp`] - Add and remove relation members
//!
//! Each can be encoded, applied to a previous value, and merged with the
//! operation already pending on the same field.
//!
//! ### Objects
//!
//! A [`ParseObject`] tracks server data, pending operations and the estimated
//! view that getters read. Saves go through [`ParseObject::begin_save`],
//! [`ParseObject::finish_save`] and [`ParseObject::abort_save`].
//!
//! ## Quick Start
//!
//! ```rust
//! use parse_engine::{FieldOp, IncrementOp, ParseObject, Value};
//! use serde_json::json;
//!
//! let score = ParseObject::new("GameScore");
//! score.set("playerName", "Sean Plott").unwrap();
//! score.increment("score", 1).unwrap();
//! score.increment("score", 2).unwrap();
//!
//! // the two increments fold into one pending operation
//! assert_eq!(
//!     score.pending_op("score"),
//!     Some(FieldOp::Increment(IncrementOp::new(3)))
//! );
//! assert_eq!(score.get("score"), Some(Value::from(3)));
//!
//! let batch = score.begin_save().unwrap();
//! assert_eq!(
//!     batch.body,
//!     json!({
//!         "playerName": "Sean Plott",
//!         "score": {"__op": "Increment", "amount": 3}
//!     })
//! );
//!
//! let response = json!({"objectId": "xWMyZ4YEGZ", "createdAt": "2024-02-01T12:30:00.000Z"});
//! score.finish_save(response.as_object().unwrap()).unwrap();
//! assert!(!score.is_dirty());
//! ```

pub mod acl;
pub mod encode;
pub mod error;
pub mod object;
pub mod operation;
pub mod relation;
pub mod value;

// Re-export main types at crate root
pub use acl::{Acl, Permissions, PUBLIC_KEY};
pub use error::Error;
pub use object::{ParseObject, SaveBatch, WeakParseObject, ACL_KEY, RESERVED_KEYS};
pub use operation::{AddOp, AddUniqueOp, FieldOp, IncrementOp, RemoveOp, SetOp};
pub use relation::{Relation, RelationKey, RelationOp, RelationSet};
pub use value::{Equivalence, GeoPoint, ParseFile, Value};

/// Type aliases for clarity
pub type ObjectId = String;
pub type ClassName = String;
