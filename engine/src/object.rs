//! Local proxy for a remote object.
//!
//! A [`ParseObject`] keeps three views of its fields:
//!
//! - **server data**: the last values confirmed by the server
//! - **pending operations**: at most one [`FieldOp`] per field, folded with
//!   [`FieldOp::merge_with_previous`] as mutators are called
//! - **estimated data**: server data with pending operations applied, which
//!   is what getters return
//!
//! While a save is in flight its operations are parked separately, so that
//! mutators called during the request start a fresh pending map:
//!
//! ```text
//! begin_save   pending ──move──▶ in_flight
//! finish_save  in_flight ──apply──▶ server data
//! abort_save   in_flight ◀──merge── pending
//! ```
//!
//! `ParseObject` is a shared handle. Clones refer to the same instance, and
//! instance identity is what strict equality of object references means.

use crate::{
    encode::{decode, decode_acl, encode, format_date, parse_date},
    error::Result,
    Acl, AddOp, AddUniqueOp, ClassName, Error, FieldOp, IncrementOp, ObjectId, Relation,
    RemoveOp, SetOp, Value,
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value as Json};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

/// Keys managed by the server that mutators may not touch.
pub const RESERVED_KEYS: [&str; 3] = ["objectId", "createdAt", "updatedAt"];

/// Field holding the object's access control list.
pub const ACL_KEY: &str = "ACL";

type Fields = BTreeMap<String, Value>;
type Operations = BTreeMap<String, FieldOp>;

#[derive(Clone)]
struct ObjectState {
    class_name: ClassName,
    object_id: Option<ObjectId>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    server_data: Fields,
    in_flight: Operations,
    pending: Operations,
    estimated: Fields,
    data_available: bool,
    /// Bumped on every committed change.
    generation: u64,
}

impl ObjectState {
    fn new(class_name: ClassName, object_id: Option<ObjectId>) -> Self {
        Self {
            data_available: object_id.is_none(),
            class_name,
            object_id,
            created_at: None,
            updated_at: None,
            server_data: Fields::new(),
            in_flight: Operations::new(),
            pending: Operations::new(),
            estimated: Fields::new(),
            generation: 0,
        }
    }
}

/// Server-managed attributes carried by a save or fetch response.
#[derive(Default)]
struct ServerMeta {
    object_id: Option<ObjectId>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl ServerMeta {
    fn apply(&self, state: &mut ObjectState) {
        if let Some(id) = &self.object_id {
            state.object_id = Some(id.clone());
        }
        if let Some(created_at) = self.created_at {
            state.created_at = Some(created_at);
            if self.updated_at.is_none() {
                state.updated_at = Some(created_at);
            }
        }
        if let Some(updated_at) = self.updated_at {
            state.updated_at = Some(updated_at);
        }
    }
}

/// The body of a save request, taken by [`ParseObject::begin_save`].
#[derive(Debug, Clone, PartialEq)]
pub struct SaveBatch {
    pub class_name: ClassName,
    /// `None` when the object is being created.
    pub object_id: Option<ObjectId>,
    /// Encoded pending operations keyed by field.
    pub body: Json,
}

impl SaveBatch {
    pub fn is_new(&self) -> bool {
        self.object_id.is_none()
    }
}

/// A local proxy for a server-side object.
#[derive(Clone)]
pub struct ParseObject {
    inner: Arc<RwLock<ObjectState>>,
}

/// A non-owning reference to a [`ParseObject`].
#[derive(Clone)]
pub struct WeakParseObject {
    inner: Weak<RwLock<ObjectState>>,
}

impl WeakParseObject {
    pub fn upgrade(&self) -> Option<ParseObject> {
        self.inner.upgrade().map(|inner| ParseObject { inner })
    }

    pub fn ptr_eq(&self, other: &WeakParseObject) -> bool {
        Weak::ptr_eq(&self.inner, &other.inner)
    }
}

impl ParseObject {
    /// A new, unsaved object.
    pub fn new(class_name: impl Into<ClassName>) -> Self {
        Self::with_state(ObjectState::new(class_name.into(), None))
    }

    /// A reference to an existing object whose fields are not loaded.
    pub fn create_without_data(
        class_name: impl Into<ClassName>,
        object_id: impl Into<ObjectId>,
    ) -> Self {
        Self::with_state(ObjectState::new(class_name.into(), Some(object_id.into())))
    }

    /// An object built from a complete server representation.
    pub fn from_server(class_name: impl Into<ClassName>, fields: &Map<String, Json>) -> Result<Self> {
        let object = Self::new(class_name);
        object.merge_after_fetch(fields, true)?;
        Ok(object)
    }

    fn with_state(state: ObjectState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ObjectState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ObjectState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn class_name(&self) -> ClassName {
        self.read().class_name.clone()
    }

    pub fn object_id(&self) -> Option<ObjectId> {
        self.read().object_id.clone()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.read().created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.read().updated_at
    }

    /// Whether field data has been loaded (always true for new objects).
    pub fn is_data_available(&self) -> bool {
        self.read().data_available
    }

    /// The estimated value of a field.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().estimated.get(key).cloned()
    }

    pub fn has(&self, key: &str) -> bool {
        self.read().estimated.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.read().estimated.keys().cloned().collect()
    }

    pub fn acl(&self) -> Option<Acl> {
        match self.get(ACL_KEY) {
            Some(Value::Acl(acl)) => Some(acl),
            _ => None,
        }
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.perform(key, FieldOp::Set(SetOp::new(value)))
    }

    /// Set a value that must be stored as a map, even if empty or list-shaped.
    pub fn set_associative(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.perform(key, FieldOp::Set(SetOp::associative(value)))
    }

    pub fn unset(&self, key: &str) -> Result<()> {
        self.perform(key, FieldOp::Delete)
    }

    pub fn increment(&self, key: &str, amount: impl Into<Number>) -> Result<()> {
        self.perform(key, FieldOp::Increment(IncrementOp::new(amount)))
    }

    pub fn decrement(&self, key: &str, amount: i64) -> Result<()> {
        let negated = amount
            .checked_neg()
            .ok_or_else(|| Error::InvalidNumber(amount.to_string()))?;
        self.increment(key, negated)
    }

    pub fn add<V: Into<Value>>(&self, key: &str, values: Vec<V>) -> Result<()> {
        let objects = values.into_iter().map(Into::into).collect();
        self.perform(key, FieldOp::Add(AddOp::new(objects)))
    }

    pub fn add_unique<V: Into<Value>>(&self, key: &str, values: Vec<V>) -> Result<()> {
        let objects = values.into_iter().map(Into::into).collect();
        self.perform(key, FieldOp::AddUnique(AddUniqueOp::new(objects)))
    }

    pub fn remove<V: Into<Value>>(&self, key: &str, values: Vec<V>) -> Result<()> {
        let objects = values.into_iter().map(Into::into).collect();
        self.perform(key, FieldOp::Remove(RemoveOp::new(objects)))
    }

    pub fn set_acl(&self, acl: Acl) -> Result<()> {
        self.set(ACL_KEY, acl)
    }

    /// The relation stored under `key`, or a fresh one bound to this field.
    pub fn relation(&self, key: &str) -> Result<Relation> {
        check_key(key)?;
        let target = self
            .get(key)
            .as_ref()
            .and_then(Value::as_relation)
            .and_then(|r| r.target_class().map(str::to_string));
        Ok(Relation::new(self, key, target))
    }

    /// Record an operation on a field.
    ///
    /// The operation is merged with the field's pending operation and applied
    /// to the estimated value. Nothing changes if either step fails.
    pub fn perform(&self, key: &str, op: FieldOp) -> Result<()> {
        check_key(key)?;

        self.transact(|state| {
            let merged = op.merge_with_previous(state.pending.get(key))?;
            let new_value = op.apply(state.estimated.get(key), self, key)?;

            match new_value {
                Some(value) => state.estimated.insert(key.to_string(), value),
                None => state.estimated.remove(key),
            };
            state.pending.insert(key.to_string(), merged);
            Ok(())
        })
    }

    /// Whether the object has changes not yet confirmed by the server.
    pub fn is_dirty(&self) -> bool {
        let state = self.read();
        !state.pending.is_empty() || !state.in_flight.is_empty()
    }

    pub fn is_key_dirty(&self, key: &str) -> bool {
        let state = self.read();
        state.pending.contains_key(key) || state.in_flight.contains_key(key)
    }

    pub fn dirty_keys(&self) -> Vec<String> {
        let state = self.read();
        let mut keys: Vec<String> = state
            .in_flight
            .keys()
            .chain(state.pending.keys())
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    pub fn pending_op(&self, key: &str) -> Option<FieldOp> {
        self.read().pending.get(key).cloned()
    }

    /// Discard the pending operation on one field.
    pub fn revert(&self, key: &str) -> Result<()> {
        self.transact(|state| {
            state.pending.remove(key);
            state.estimated =
                self.estimate(&state.server_data, &[&state.in_flight, &state.pending])?;
            Ok(())
        })
    }

    /// Discard every pending operation.
    pub fn revert_all(&self) -> Result<()> {
        self.transact(|state| {
            state.pending.clear();
            state.estimated = self.estimate(&state.server_data, &[&state.in_flight])?;
            Ok(())
        })
    }

    /// Encoded pending operations, without starting a save.
    pub fn save_payload(&self) -> Result<Json> {
        let pending = self.read().pending.clone();
        encode_operations(&pending)
    }

    /// Move pending operations in flight and encode them.
    ///
    /// Only one save may be in flight per object. If encoding fails the
    /// operations stay pending.
    pub fn begin_save(&self) -> Result<SaveBatch> {
        self.transact(|state| {
            if !state.in_flight.is_empty() {
                return Err(Error::SaveInProgress(state.class_name.clone()));
            }
            let body = encode_operations(&state.pending)?;
            state.in_flight = std::mem::take(&mut state.pending);

            Ok(SaveBatch {
                class_name: state.class_name.clone(),
                object_id: state.object_id.clone(),
                body,
            })
        })
    }

    /// Fold the in-flight operations into server data and merge the
    /// server's response.
    pub fn finish_save(&self, response: &Map<String, Json>) -> Result<()> {
        let (meta, fields) = self.decode_server_fields(response)?;

        self.transact(|state| {
            let mut server = state.server_data.clone();
            for (key, op) in &state.in_flight {
                apply_into(&mut server, op, self, key)?;
            }
            server.extend(fields.clone());

            state.estimated = self.estimate(&server, &[&state.pending])?;
            state.server_data = server;
            state.in_flight.clear();
            meta.apply(state);
            Ok(())
        })
    }

    /// Return in-flight operations to the pending map after a failed save.
    ///
    /// Operations recorded during the request are merged on top of them.
    /// When a newer operation cannot follow the older one, the pair is
    /// replaced by a `Set` of the value they produce together.
    pub fn abort_save(&self) -> Result<()> {
        self.transact(|state| {
            let mut restored = std::mem::take(&mut state.in_flight);

            for (key, newer) in std::mem::take(&mut state.pending) {
                let merged = match restored.get(&key) {
                    Some(older) => match newer.merge_with_previous(Some(older)) {
                        Err(Error::InvalidMerge { .. }) => {
                            let mut fields = state.server_data.clone();
                            apply_into(&mut fields, older, self, &key)?;
                            apply_into(&mut fields, &newer, self, &key)?;
                            match fields.remove(&key) {
                                Some(value) => FieldOp::Set(SetOp::new(value)),
                                None => FieldOp::Delete,
                            }
                        }
                        merged => merged?,
                    },
                    None => newer,
                };
                restored.insert(key, merged);
            }

            state.estimated = self.estimate(&state.server_data, &[&restored])?;
            state.pending = restored;
            Ok(())
        })
    }

    /// Unsaved objects referenced by pending operations. They must be saved
    /// before this object's operations can be encoded.
    pub fn unsaved_children(&self) -> Vec<ParseObject> {
        let ops: Vec<FieldOp> = self.read().pending.values().cloned().collect();
        let mut found = Vec::new();

        for op in &ops {
            match op {
                FieldOp::Set(set) => collect_unsaved(&set.value, &mut found),
                FieldOp::Add(AddOp { objects })
                | FieldOp::AddUnique(AddUniqueOp { objects })
                | FieldOp::Remove(RemoveOp { objects }) => {
                    objects.iter().for_each(|v| collect_unsaved(v, &mut found))
                }
                FieldOp::Relation(rel) => rel
                    .to_add()
                    .flatten()
                    .iter()
                    .chain(rel.to_remove().flatten().iter())
                    .for_each(|obj| push_unsaved(obj, &mut found)),
                FieldOp::Increment(_) | FieldOp::Delete => {}
            }
        }

        found.retain(|obj| !obj.ptr_eq(self));
        found
    }

    /// Merge fields returned by a fetch or query.
    ///
    /// With `complete` the response replaces server data; otherwise only the
    /// returned keys are updated. Pending operations are re-applied on top.
    pub fn merge_after_fetch(&self, fields: &Map<String, Json>, complete: bool) -> Result<()> {
        let (meta, decoded) = self.decode_server_fields(fields)?;

        self.transact(|state| {
            if complete {
                state.server_data.clear();
                state.data_available = true;
            }
            state.server_data.extend(decoded.clone());
            state.estimated =
                self.estimate(&state.server_data, &[&state.in_flight, &state.pending])?;
            meta.apply(state);
            Ok(())
        })
    }

    /// `{"__type": "Pointer", "className": .., "objectId": ..}`
    pub fn to_pointer(&self) -> Result<Json> {
        let state = self.read();
        let object_id = state
            .object_id
            .clone()
            .ok_or_else(|| Error::UnsavedObject(state.class_name.clone()))?;
        Ok(serde_json::json!({
            "__type": "Pointer",
            "className": state.class_name,
            "objectId": object_id,
        }))
    }

    /// Full `{"__type": "Object", ...}` representation of the estimated data.
    pub fn encode_full(&self) -> Result<Json> {
        let (class_name, object_id, created_at, updated_at, estimated) = {
            let state = self.read();
            (
                state.class_name.clone(),
                state.object_id.clone(),
                state.created_at,
                state.updated_at,
                state.estimated.clone(),
            )
        };

        let mut map = Map::new();
        map.insert("__type".into(), "Object".into());
        map.insert("className".into(), class_name.into());
        if let Some(id) = object_id {
            map.insert("objectId".into(), id.into());
        }
        if let Some(created_at) = created_at {
            map.insert("createdAt".into(), format_date(&created_at).into());
        }
        if let Some(updated_at) = updated_at {
            map.insert("updatedAt".into(), format_date(&updated_at).into());
        }
        for (key, value) in &estimated {
            map.insert(key.clone(), encode(value, true)?);
        }
        Ok(Json::Object(map))
    }

    pub fn downgrade(&self) -> WeakParseObject {
        WeakParseObject {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Same local instance.
    pub fn ptr_eq(&self, other: &ParseObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Same class and same server-assigned objectId. Unsaved objects never
    /// match.
    pub fn has_same_remote_id(&self, other: &ParseObject) -> bool {
        let (class_a, id_a) = {
            let state = self.read();
            (state.class_name.clone(), state.object_id.clone())
        };
        let (class_b, id_b) = {
            let state = other.read();
            (state.class_name.clone(), state.object_id.clone())
        };
        matches!((id_a, id_b), (Some(a), Some(b)) if a == b) && class_a == class_b
    }

    /// Run `step` on a copy of the state and commit the copy if no other
    /// change landed meanwhile, retrying otherwise. No lock is held while
    /// `step` runs, so operations may read this object back.
    fn transact<R>(&self, mut step: impl FnMut(&mut ObjectState) -> Result<R>) -> Result<R> {
        loop {
            let mut draft = self.read().clone();
            let generation = draft.generation;
            let outcome = step(&mut draft)?;

            let mut state = self.write();
            if state.generation == generation {
                draft.generation = generation.wrapping_add(1);
                *state = draft;
                return Ok(outcome);
            }
        }
    }

    /// Apply operation layers, in order, over server data.
    fn estimate(&self, server: &Fields, layers: &[&Operations]) -> Result<Fields> {
        let mut estimated = server.clone();
        for ops in layers {
            for (key, op) in ops.iter() {
                apply_into(&mut estimated, op, self, key)?;
            }
        }
        Ok(estimated)
    }

    fn decode_server_fields(&self, json: &Map<String, Json>) -> Result<(ServerMeta, Fields)> {
        let mut meta = ServerMeta::default();
        let mut fields = Fields::new();

        for (key, raw) in json {
            match key.as_str() {
                "objectId" => meta.object_id = raw.as_str().map(str::to_string),
                "createdAt" => meta.created_at = Some(decode_timestamp(raw)?),
                "updatedAt" => meta.updated_at = Some(decode_timestamp(raw)?),
                "__type" | "className" => {}
                ACL_KEY => {
                    fields.insert(key.clone(), decode_acl(raw)?);
                }
                _ => {
                    let value = match decode(raw)? {
                        Value::Relation(rel) => Value::Relation(rel.bound_to(self, key)),
                        other => other,
                    };
                    fields.insert(key.clone(), value);
                }
            }
        }
        Ok((meta, fields))
    }
}

impl PartialEq for ParseObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ParseObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("ParseObject")
            .field("class_name", &state.class_name)
            .field("object_id", &state.object_id)
            .field("dirty_keys", &state.pending.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() || RESERVED_KEYS.contains(&key) {
        return Err(Error::ReservedKey(key.to_string()));
    }
    Ok(())
}

fn apply_into(fields: &mut Fields, op: &FieldOp, object: &ParseObject, key: &str) -> Result<()> {
    match op.apply(fields.get(key), object, key)? {
        Some(value) => fields.insert(key.to_string(), value),
        None => fields.remove(key),
    };
    Ok(())
}

fn encode_operations(ops: &Operations) -> Result<Json> {
    let mut body = Map::new();
    for (key, op) in ops {
        body.insert(key.clone(), op.encode()?);
    }
    Ok(Json::Object(body))
}

/// `createdAt`/`updatedAt` arrive as bare ISO strings or as Date values.
fn decode_timestamp(raw: &Json) -> Result<DateTime<Utc>> {
    match raw {
        Json::String(iso) => parse_date(iso),
        other => match decode(other)? {
            Value::Date(date) => Ok(date),
            value => Err(Error::InvalidWireValue(format!(
                "expected a date, got {}",
                value.type_name()
            ))),
        },
    }
}

fn collect_unsaved(value: &Value, found: &mut Vec<ParseObject>) {
    match value {
        Value::Pointer(obj) => push_unsaved(obj, found),
        Value::Array(items) => items.iter().for_each(|v| collect_unsaved(v, found)),
        Value::Object(map) => map.values().for_each(|v| collect_unsaved(v, found)),
        _ => {}
    }
}

fn push_unsaved(obj: &ParseObject, found: &mut Vec<ParseObject>) {
    if obj.object_id().is_none() && !found.iter().any(|f| f.ptr_eq(obj)) {
        found.push(obj.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(json: Json) -> Map<String, Json> {
        match json {
            Json::Object(map) => map,
            _ => panic!("expected a JSON object"),
        }
    }

    #[test]
    fn new_object_is_clean() {
        let obj = ParseObject::new("GameScore");
        assert_eq!(obj.class_name(), "GameScore");
        assert!(obj.object_id().is_none());
        assert!(!obj.is_dirty());
        assert!(obj.is_data_available());
    }

    #[test]
    fn set_updates_estimate_and_pending() {
        let obj = ParseObject::new("GameScore");
        obj.set("score", 1337).unwrap();

        assert_eq!(obj.get("score"), Some(Value::from(1337)));
        assert!(obj.is_key_dirty("score"));
        assert_eq!(obj.pending_op("score"), Some(FieldOp::Set(SetOp::new(1337))));
    }

    #[test]
    fn reserved_keys_are_rejected() {
        let obj = ParseObject::new("GameScore");
        assert_eq!(
            obj.set("objectId", "x"),
            Err(Error::ReservedKey("objectId".into()))
        );
        assert_eq!(obj.unset(""), Err(Error::ReservedKey("".into())));
    }

    #[test]
    fn mutators_fold_into_one_pending_op() {
        let obj = ParseObject::new("GameScore");
        obj.increment("score", 1).unwrap();
        obj.increment("score", 2).unwrap();

        assert_eq!(obj.get("score"), Some(Value::from(3)));
        assert_eq!(
            obj.pending_op("score"),
            Some(FieldOp::Increment(IncrementOp::new(3)))
        );

        obj.unset("score").unwrap();
        obj.increment("score", 5).unwrap();
        assert_eq!(obj.pending_op("score"), Some(FieldOp::Set(SetOp::new(5))));
        assert_eq!(obj.get("score"), Some(Value::from(5)));
    }

    #[test]
    fn failed_merge_changes_nothing() {
        let obj = ParseObject::new("GameScore");
        obj.add("tags", vec!["a"]).unwrap();

        assert!(matches!(
            obj.increment("tags", 1),
            Err(Error::InvalidMerge { .. })
        ));
        assert_eq!(obj.get("tags"), Some(Value::from(vec!["a"])));
        assert_eq!(
            obj.pending_op("tags"),
            Some(FieldOp::Add(AddOp::new(vec![Value::from("a")])))
        );
    }

    #[test]
    fn save_round_trip() {
        let obj = ParseObject::new("GameScore");
        obj.set("playerName", "Sean").unwrap();
        obj.increment("score", 10).unwrap();

        let batch = obj.begin_save().unwrap();
        assert!(batch.is_new());
        assert_eq!(
            batch.body,
            json!({"playerName": "Sean", "score": {"__op": "Increment", "amount": 10}})
        );
        assert!(obj.is_dirty());

        obj.finish_save(&fields(json!({
            "objectId": "g1",
            "createdAt": "2024-02-01T12:30:00.000Z"
        })))
        .unwrap();

        assert_eq!(obj.object_id().as_deref(), Some("g1"));
        assert!(!obj.is_dirty());
        assert_eq!(obj.get("score"), Some(Value::from(10)));
        assert_eq!(obj.created_at(), obj.updated_at());
    }

    #[test]
    fn mutation_during_save_stays_pending() {
        let obj = ParseObject::create_without_data("GameScore", "g1");
        obj.merge_after_fetch(&fields(json!({"score": 5})), true).unwrap();
        obj.increment("score", 1).unwrap();

        let _batch = obj.begin_save().unwrap();
        obj.increment("score", 2).unwrap();
        assert_eq!(obj.get("score"), Some(Value::from(8)));
        assert!(matches!(obj.begin_save(), Err(Error::SaveInProgress(_))));

        obj.finish_save(&fields(json!({"updatedAt": "2024-02-01T12:30:00.000Z"})))
            .unwrap();
        assert_eq!(obj.dirty_keys(), vec!["score".to_string()]);
        assert_eq!(
            obj.pending_op("score"),
            Some(FieldOp::Increment(IncrementOp::new(2)))
        );
        assert_eq!(obj.get("score"), Some(Value::from(8)));
    }

    #[test]
    fn aborted_save_folds_ops_back() {
        let obj = ParseObject::create_without_data("GameScore", "g1");
        obj.increment("score", 1).unwrap();
        let _batch = obj.begin_save().unwrap();
        obj.increment("score", 2).unwrap();

        obj.abort_save().unwrap();
        assert_eq!(
            obj.pending_op("score"),
            Some(FieldOp::Increment(IncrementOp::new(3)))
        );
        assert_eq!(obj.get("score"), Some(Value::from(3)));
    }

    #[test]
    fn unencodable_save_is_rolled_back() {
        let obj = ParseObject::new("Post");
        let author = ParseObject::new("User");
        obj.set("author", &author).unwrap();

        assert_eq!(obj.begin_save(), Err(Error::UnsavedObject("User".into())));
        assert!(obj.is_key_dirty("author"));
        assert!(obj.pending_op("author").is_some());
        assert_eq!(obj.unsaved_children(), vec![author]);
    }

    #[test]
    fn fetch_replaces_server_data_and_keeps_pending() {
        let obj = ParseObject::create_without_data("GameScore", "g1");
        assert!(!obj.is_data_available());
        obj.increment("score", 1).unwrap();

        obj.merge_after_fetch(
            &fields(json!({
                "objectId": "g1",
                "score": 41,
                "when": {"__type": "Date", "iso": "2024-02-01T12:30:00.000Z"},
                "ACL": {"*": {"read": true}}
            })),
            true,
        )
        .unwrap();

        assert!(obj.is_data_available());
        assert_eq!(obj.get("score"), Some(Value::from(42)));
        assert!(obj.acl().unwrap().public_read_access());
        assert!(matches!(obj.get("when"), Some(Value::Date(_))));
    }

    #[test]
    fn fetched_relation_is_bound() {
        let obj = ParseObject::from_server(
            "Post",
            &fields(json!({"objectId": "p1", "tags": {"__type": "Relation", "className": "Tag"}})),
        )
        .unwrap();

        let relation = obj.relation("tags").unwrap();
        assert_eq!(relation.target_class(), Some("Tag"));
        let stored = obj.get("tags").unwrap();
        assert_eq!(stored.as_relation().unwrap().parent(), Some(obj.clone()));
    }

    #[test]
    fn relation_add_records_op() {
        let post = ParseObject::create_without_data("Post", "p1");
        let mut tags = post.relation("tags").unwrap();
        tags.add(vec![ParseObject::create_without_data("Tag", "t1")])
            .unwrap();

        assert_eq!(tags.target_class(), Some("Tag"));
        assert_eq!(
            post.save_payload().unwrap(),
            json!({"tags": {"__op": "AddRelation", "objects": [
                {"__type": "Pointer", "className": "Tag", "objectId": "t1"}
            ]}})
        );
        assert_eq!(
            tags.related_to_constraint().unwrap(),
            json!({"$relatedTo": {
                "object": {"__type": "Pointer", "className": "Post", "objectId": "p1"},
                "key": "tags"
            }})
        );
    }

    #[test]
    fn revert_restores_server_value() {
        let obj = ParseObject::from_server("GameScore", &fields(json!({"objectId": "g1", "score": 1})))
            .unwrap();
        obj.set("score", 99).unwrap();
        obj.set("name", "x").unwrap();

        obj.revert("score").unwrap();
        assert_eq!(obj.get("score"), Some(Value::from(1)));
        assert!(obj.is_key_dirty("name"));

        obj.revert_all().unwrap();
        assert!(!obj.is_dirty());
        assert!(!obj.has("name"));
    }

    #[test]
    fn encode_full_includes_metadata() {
        let obj = ParseObject::from_server(
            "GameScore",
            &fields(json!({"objectId": "g1", "createdAt": "2024-02-01T12:30:00.000Z", "score": 1})),
        )
        .unwrap();

        assert_eq!(
            obj.encode_full().unwrap(),
            json!({
                "__type": "Object",
                "className": "GameScore",
                "objectId": "g1",
                "createdAt": "2024-02-01T12:30:00.000Z",
                "updatedAt": "2024-02-01T12:30:00.000Z",
                "score": 1
            })
        );
    }

    #[test]
    fn object_referencing_itself() {
        let obj = ParseObject::create_without_data("Node", "n1");
        obj.add_unique("links", vec![obj.clone()]).unwrap();
        obj.remove("links", vec![obj.clone()]).unwrap_err();

        assert!(obj.unsaved_children().is_empty());
        assert_eq!(obj.get("links"), Some(Value::from(vec![obj.clone()])));
    }

    #[test]
    fn decrement_rejects_unnegatable_amount() {
        let obj = ParseObject::new("GameScore");
        assert_eq!(
            obj.decrement("score", i64::MIN),
            Err(Error::InvalidNumber(i64::MIN.to_string()))
        );
        assert!(!obj.is_dirty());

        obj.decrement("score", 2).unwrap();
        assert_eq!(obj.get("score"), Some(Value::from(-2)));
    }

    #[test]
    fn aborted_save_keeps_unmergeable_ops_as_set() {
        let obj = ParseObject::create_without_data("GameScore", "g1");
        obj.merge_after_fetch(&fields(json!({"score": 5})), true).unwrap();
        obj.increment("score", 1).unwrap();

        let _batch = obj.begin_save().unwrap();
        obj.add("score", vec!["x"]).unwrap();
        let during = obj.get("score");

        obj.abort_save().unwrap();
        let combined = Value::Array(vec![Value::from(6), Value::from("x")]);
        assert_eq!(obj.pending_op("score"), Some(FieldOp::Set(SetOp::new(combined.clone()))));
        assert_eq!(obj.get("score"), Some(combined));
        assert_eq!(obj.get("score"), during);
        assert!(obj.begin_save().is_ok());
    }

    #[test]
    fn aborted_save_lets_delete_absorb_older_op() {
        let obj = ParseObject::create_without_data("GameScore", "g1");
        obj.add("tags", vec!["a"]).unwrap();

        let _batch = obj.begin_save().unwrap();
        obj.remove("tags", vec!["a"]).unwrap();
        obj.unset("tags").unwrap();

        obj.abort_save().unwrap();
        assert_eq!(obj.pending_op("tags"), Some(FieldOp::Delete));
        assert!(!obj.has("tags"));
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        const THREADS: i64 = 4;
        const PER_THREAD: i64 = 2_000;

        let obj = ParseObject::new("GameScore");
        std::thread::scope(|scope| {
            for _ in 0..THREADS {
                let obj = obj.clone();
                scope.spawn(move || {
                    for _ in 0..PER_THREAD {
                        obj.increment("score", 1).unwrap();
                    }
                });
            }
        });

        let total = THREADS * PER_THREAD;
        assert_eq!(
            obj.pending_op("score"),
            Some(FieldOp::Increment(IncrementOp::new(total)))
        );
        assert_eq!(obj.get("score"), Some(Value::from(total)));
    }

    #[test]
    fn concurrent_increments_survive_save_cycles() {
        const THREADS: i64 = 3;
        const PER_THREAD: i64 = 1_000;

        let obj = ParseObject::create_without_data("GameScore", "g1");
        obj.merge_after_fetch(&fields(json!({"score": 0})), true).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..THREADS {
                let obj = obj.clone();
                scope.spawn(move || {
                    for _ in 0..PER_THREAD {
                        obj.increment("score", 1).unwrap();
                    }
                });
            }

            let saver = obj.clone();
            scope.spawn(move || {
                for round in 0..200 {
                    saver.begin_save().unwrap();
                    if round % 3 == 0 {
                        saver.abort_save().unwrap();
                    } else {
                        saver
                            .finish_save(&fields(json!({"updatedAt": "2024-02-01T12:30:00.000Z"})))
                            .unwrap();
                    }
                }
            });
        });

        assert_eq!(obj.get("score"), Some(Value::from(THREADS * PER_THREAD)));
    }
}
