//! Field operations.
//!
//! Every local mutation of an object field is captured as a [`FieldOp`]
//! instead of being written straight into the object. A field holds at most
//! one pending operation: a new mutation is merged with the pending one into
//! a single equivalent replacement. On save the pending operation is encoded
//! into the request body, and once the server accepts it the operation is
//! applied to the last known server value.
//!
//! Merging is not commutative. `Set(5)` after `Increment(3)` is `Set(5)`, while
//! `Increment(3)` after `Set(5)` is `Set(8)`.
//!
//! Operations are immutable. Merge and apply build new values and never touch
//! their inputs.

use crate::{
    encode::{decode, encode, encode_associative, encode_list},
    error::Result,
    value::{add_numbers, Equivalence},
    Error, ParseObject, RelationOp, Value,
};
use serde_json::{json, Number, Value as Json};

/// A pending mutation of a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Set(SetOp),
    Delete,
    Increment(IncrementOp),
    Add(AddOp),
    AddUnique(AddUniqueOp),
    Remove(RemoveOp),
    Relation(RelationOp),
}

impl FieldOp {
    /// Operation name as it appears in the `__op` tag.
    pub fn name(&self) -> &'static str {
        match self {
            FieldOp::Set(_) => "Set",
            FieldOp::Delete => "Delete",
            FieldOp::Increment(_) => "Increment",
            FieldOp::Add(_) => "Add",
            FieldOp::AddUnique(_) => "AddUnique",
            FieldOp::Remove(_) => "Remove",
            FieldOp::Relation(_) => "Relation",
        }
    }

    /// Encode the operation for a save request body.
    pub fn encode(&self) -> Result<Json> {
        match self {
            FieldOp::Set(op) => op.encode(),
            FieldOp::Delete => Ok(json!({"__op": "Delete"})),
            FieldOp::Increment(op) => Ok(op.encode()),
            FieldOp::Add(op) => op.encode(),
            FieldOp::AddUnique(op) => op.encode(),
            FieldOp::Remove(op) => op.encode(),
            FieldOp::Relation(op) => op.encode(),
        }
    }

    /// Compute the field's new value from its previous value.
    ///
    /// `None` in and out means the field is absent.
    pub fn apply(
        &self,
        old: Option<&Value>,
        object: &ParseObject,
        key: &str,
    ) -> Result<Option<Value>> {
        match self {
            FieldOp::Set(op) => Ok(Some(op.apply())),
            FieldOp::Delete => Ok(None),
            FieldOp::Increment(op) => op.apply(old).map(Some),
            FieldOp::Add(op) => Ok(Some(op.apply(old))),
            FieldOp::AddUnique(op) => Ok(Some(op.apply(old))),
            FieldOp::Remove(op) => Ok(Some(op.apply(old))),
            FieldOp::Relation(op) => op.apply(old, object, key).map(Some),
        }
    }

    /// Fold this operation onto the operation already pending for the field.
    pub fn merge_with_previous(&self, previous: Option<&FieldOp>) -> Result<FieldOp> {
        match self {
            FieldOp::Set(_) | FieldOp::Delete => Ok(self.clone()),
            FieldOp::Increment(op) => op.merge_with_previous(previous),
            FieldOp::Add(op) => op.merge_with_previous(previous),
            FieldOp::AddUnique(op) => op.merge_with_previous(previous),
            FieldOp::Remove(op) => op.merge_with_previous(previous),
            FieldOp::Relation(op) => op.merge_with_previous(previous),
        }
    }

    /// Parse the wire form produced by [`FieldOp::encode`].
    ///
    /// Anything without an `__op` tag is a bare value and decodes to a Set.
    pub fn from_wire(json: &Json) -> Result<FieldOp> {
        let Some(tag) = json.get("__op").and_then(Json::as_str) else {
            return Ok(FieldOp::Set(SetOp::new(decode(json)?)));
        };

        let objects = || decode(json.get("objects").unwrap_or(&Json::Null));

        match tag {
            "Delete" => Ok(FieldOp::Delete),
            "Increment" => {
                let amount = json
                    .get("amount")
                    .and_then(Json::as_number)
                    .ok_or_else(|| Error::InvalidWireValue("Increment is missing 'amount'".into()))?;
                Ok(FieldOp::Increment(IncrementOp::new(amount.clone())))
            }
            "Add" => AddOp::from_value(objects()?).map(FieldOp::Add),
            "AddUnique" => AddUniqueOp::from_value(objects()?).map(FieldOp::AddUnique),
            "Remove" => RemoveOp::from_value(objects()?).map(FieldOp::Remove),
            "AddRelation" => {
                let added = list_from_value(objects()?, "AddRelation")?;
                RelationOp::from_values(added, Vec::new()).map(FieldOp::Relation)
            }
            "RemoveRelation" => {
                let removed = list_from_value(objects()?, "RemoveRelation")?;
                RelationOp::from_values(Vec::new(), removed).map(FieldOp::Relation)
            }
            "Batch" => {
                let ops = json
                    .get("ops")
                    .and_then(Json::as_array)
                    .ok_or_else(|| Error::InvalidWireValue("Batch is missing 'ops'".into()))?;
                let mut merged: Option<FieldOp> = None;
                for op in ops {
                    merged = Some(FieldOp::from_wire(op)?.merge_with_previous(merged.as_ref())?);
                }
                merged.ok_or_else(|| Error::InvalidWireValue("empty Batch".into()))
            }
            other => Err(Error::InvalidWireValue(format!("unknown __op '{other}'"))),
        }
    }
}

fn invalid_merge(operation: &'static str, previous: &FieldOp) -> Error {
    Error::InvalidMerge {
        operation,
        previous: previous.name(),
    }
}

fn list_from_value(value: Value, operation: &'static str) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(Error::NotAnArray { operation }),
    }
}

fn concat(mut head: Vec<Value>, tail: &[Value]) -> Vec<Value> {
    head.extend_from_slice(tail);
    head
}

/// Overwrite the field with a value.
#[derive(Debug, Clone, PartialEq)]
pub struct SetOp {
    /// The new field value.
    pub value: Value,
    /// Encode list-shaped values as keyed maps.
    pub is_associative: bool,
}

impl SetOp {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            is_associative: false,
        }
    }

    /// A set whose value always encodes as a JSON object, even when empty.
    pub fn associative(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            is_associative: true,
        }
    }

    pub fn encode(&self) -> Result<Json> {
        if self.is_associative {
            encode_associative(&self.value, true)
        } else {
            encode(&self.value, true)
        }
    }

    pub fn apply(&self) -> Value {
        self.value.clone()
    }

    /// Replace the value, keeping the encoding mode.
    fn with_value(&self, value: Value) -> Self {
        Self {
            value,
            is_associative: self.is_associative,
        }
    }
}

/// Add a number to the field.
#[derive(Debug, Clone, PartialEq)]
pub struct IncrementOp {
    /// Integer or float delta; negative to decrement.
    pub amount: Number,
}

impl Default for IncrementOp {
    fn default() -> Self {
        Self::new(1)
    }
}

impl IncrementOp {
    pub fn new(amount: impl Into<Number>) -> Self {
        Self {
            amount: amount.into(),
        }
    }

    /// Increment by a float amount. Non-finite amounts are rejected.
    pub fn by_float(amount: f64) -> Result<Self> {
        Number::from_f64(amount)
            .map(Self::new)
            .ok_or_else(|| Error::InvalidNumber(amount.to_string()))
    }

    pub fn encode(&self) -> Json {
        json!({"__op": "Increment", "amount": self.amount})
    }

    pub fn apply(&self, old: Option<&Value>) -> Result<Value> {
        match old {
            None | Some(Value::Null) => Ok(Value::Number(self.amount.clone())),
            Some(Value::Number(n)) => add_numbers(n, &self.amount).map(Value::Number),
            Some(other) => Err(Error::TypeConflict {
                found: other.type_name(),
            }),
        }
    }

    pub fn merge_with_previous(&self, previous: Option<&FieldOp>) -> Result<FieldOp> {
        match previous {
            None => Ok(FieldOp::Increment(self.clone())),
            Some(FieldOp::Delete) => Ok(FieldOp::Set(SetOp::new(self.amount.clone()))),
            Some(FieldOp::Set(set)) => {
                let value = self.apply(Some(&set.value))?;
                Ok(FieldOp::Set(set.with_value(value)))
            }
            Some(FieldOp::Increment(prev)) => Ok(FieldOp::Increment(IncrementOp::new(
                add_numbers(&prev.amount, &self.amount)?,
            ))),
            Some(other) => Err(invalid_merge("Increment", other)),
        }
    }
}

/// Append objects to an array field, keeping duplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct AddOp {
    /// Values appended in order.
    pub objects: Vec<Value>,
}

impl AddOp {
    pub fn new(objects: Vec<Value>) -> Self {
        Self { objects }
    }

    /// Build from a dynamic value, which must be an array.
    pub fn from_value(value: Value) -> Result<Self> {
        list_from_value(value, "Add").map(Self::new)
    }

    pub fn encode(&self) -> Result<Json> {
        Ok(json!({"__op": "Add", "objects": encode_list(&self.objects, true)?}))
    }

    pub fn apply(&self, old: Option<&Value>) -> Value {
        match old {
            None | Some(Value::Null) => Value::Array(self.objects.clone()),
            Some(old) => Value::Array(concat(old.clone().into_list(), &self.objects)),
        }
    }

    pub fn merge_with_previous(&self, previous: Option<&FieldOp>) -> Result<FieldOp> {
        match previous {
            None => Ok(FieldOp::Add(self.clone())),
            Some(FieldOp::Delete) => Ok(FieldOp::Set(SetOp::new(self.objects.clone()))),
            Some(FieldOp::Set(set)) => Ok(FieldOp::Set(set.with_value(Value::Array(concat(
                set.value.clone().into_list(),
                &self.objects,
            ))))),
            Some(FieldOp::Add(prev)) => Ok(FieldOp::Set(SetOp::new(concat(
                prev.objects.clone(),
                &self.objects,
            )))),
            Some(other) => Err(invalid_merge("Add", other)),
        }
    }
}

/// Append objects to an array field unless already present.
#[derive(Debug, Clone, PartialEq)]
pub struct AddUniqueOp {
    /// Candidates appended when no equivalent element exists.
    pub objects: Vec<Value>,
}

impl AddUniqueOp {
    pub fn new(objects: Vec<Value>) -> Self {
        Self { objects }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        list_from_value(value, "AddUnique").map(Self::new)
    }

    pub fn encode(&self) -> Result<Json> {
        Ok(json!({"__op": "AddUnique", "objects": encode_list(&self.objects, true)?}))
    }

    pub fn apply(&self, old: Option<&Value>) -> Value {
        let mut list = match old {
            None | Some(Value::Null) => return Value::Array(self.objects.clone()),
            Some(Value::Array(items)) if items.is_empty() => {
                return Value::Array(self.objects.clone())
            }
            Some(old) => old.clone().into_list(),
        };

        for candidate in &self.objects {
            let equivalence = unique_equivalence(candidate);
            if !list.iter().any(|existing| equivalence.matches(existing, candidate)) {
                list.push(candidate.clone());
            }
        }
        Value::Array(list)
    }

    pub fn merge_with_previous(&self, previous: Option<&FieldOp>) -> Result<FieldOp> {
        match previous {
            None => Ok(FieldOp::AddUnique(self.clone())),
            Some(FieldOp::Delete) => Ok(FieldOp::Set(SetOp::new(self.objects.clone()))),
            Some(FieldOp::Set(set)) => Ok(FieldOp::Set(set.with_value(self.apply(Some(&set.value))))),
            Some(FieldOp::AddUnique(prev)) => {
                let merged = self.apply(Some(&Value::Array(prev.objects.clone())));
                Ok(FieldOp::AddUnique(AddUniqueOp::new(merged.into_list())))
            }
            Some(other) => Err(invalid_merge("AddUnique", other)),
        }
    }
}

/// Saved objects dedupe by remote id; everything else by strict equality.
fn unique_equivalence(candidate: &Value) -> Equivalence {
    match candidate {
        Value::Pointer(obj) if obj.object_id().is_some() => Equivalence::SameRemoteId,
        _ => Equivalence::SameInstance,
    }
}

/// Remove objects from an array field.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoveOp {
    /// Every old element matching one of these is dropped.
    pub objects: Vec<Value>,
}

impl RemoveOp {
    pub fn new(objects: Vec<Value>) -> Self {
        Self { objects }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        list_from_value(value, "Remove").map(Self::new)
    }

    pub fn encode(&self) -> Result<Json> {
        Ok(json!({"__op": "Remove", "objects": encode_list(&self.objects, true)?}))
    }

    /// Keep every old element that matches none of the removal candidates.
    pub fn apply(&self, old: Option<&Value>) -> Value {
        let list = match old {
            None => Vec::new(),
            Some(old) => old.clone().into_list(),
        };
        Value::Array(
            list.into_iter()
                .filter(|existing| !self.objects.iter().any(|c| removal_matches(existing, c)))
                .collect(),
        )
    }

    pub fn merge_with_previous(&self, previous: Option<&FieldOp>) -> Result<FieldOp> {
        match previous {
            None => Ok(FieldOp::Remove(self.clone())),
            Some(FieldOp::Delete) => Ok(FieldOp::Delete),
            Some(FieldOp::Set(set)) => Ok(FieldOp::Set(set.with_value(self.apply(Some(&set.value))))),
            Some(FieldOp::Remove(prev)) => Ok(FieldOp::Remove(RemoveOp::new(concat(
                prev.objects.clone(),
                &self.objects,
            )))),
            Some(other) => Err(invalid_merge("Remove", other)),
        }
    }
}

/// Object references with local changes are never removed.
fn removal_matches(existing: &Value, candidate: &Value) -> bool {
    match existing {
        Value::Pointer(obj) => {
            !obj.is_dirty()
                && (Equivalence::SameRemoteId.matches(existing, candidate)
                    || Equivalence::SameInstance.matches(existing, candidate))
        }
        _ => Equivalence::SameInstance.matches(existing, candidate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<Value> {
        items.iter().map(|s| Value::from(*s)).collect()
    }

    fn holder() -> ParseObject {
        ParseObject::new("Holder")
    }

    #[test]
    fn set_overwrites_everything() {
        let set = FieldOp::Set(SetOp::new(5));
        let previous = [
            FieldOp::Delete,
            FieldOp::Increment(IncrementOp::new(3)),
            FieldOp::Add(AddOp::new(strings(&["a"]))),
            FieldOp::Remove(RemoveOp::new(strings(&["a"]))),
            FieldOp::Set(SetOp::new("x")),
        ];
        for prev in &previous {
            assert_eq!(set.merge_with_previous(Some(prev)).unwrap(), set);
        }
    }

    #[test]
    fn set_apply_ignores_old() {
        let op = FieldOp::Set(SetOp::new("new"));
        let applied = op.apply(Some(&Value::from(4)), &holder(), "k").unwrap();
        assert_eq!(applied, Some(Value::from("new")));
    }

    #[test]
    fn associative_set_encodes_map() {
        assert_eq!(
            SetOp::associative(Value::Array(vec![])).encode().unwrap(),
            json!({})
        );
        assert_eq!(SetOp::new(Value::Array(vec![])).encode().unwrap(), json!([]));
    }

    #[test]
    fn delete_wins_and_clears() {
        let op = FieldOp::Delete;
        assert_eq!(
            op.merge_with_previous(Some(&FieldOp::Set(SetOp::new(1)))).unwrap(),
            FieldOp::Delete
        );
        assert_eq!(op.apply(Some(&Value::from(1)), &holder(), "k").unwrap(), None);
        assert_eq!(op.encode().unwrap(), json!({"__op": "Delete"}));
    }

    #[test]
    fn increment_default_is_one() {
        assert_eq!(IncrementOp::default().amount, Number::from(1));
    }

    #[test]
    fn increment_apply() {
        let op = IncrementOp::new(5);
        assert_eq!(op.apply(None).unwrap(), Value::from(5));
        assert_eq!(op.apply(Some(&Value::from(10))).unwrap(), Value::from(15));
        assert_eq!(
            op.apply(Some(&Value::from("ten"))),
            Err(Error::TypeConflict { found: "String" })
        );
    }

    #[test]
    fn increment_merge_rules() {
        let op = IncrementOp::new(1);

        assert_eq!(
            op.merge_with_previous(Some(&FieldOp::Delete)).unwrap(),
            FieldOp::Set(SetOp::new(1))
        );
        assert_eq!(
            op.merge_with_previous(Some(&FieldOp::Set(SetOp::new(12))))
                .unwrap(),
            FieldOp::Set(SetOp::new(13))
        );
        assert_eq!(
            op.merge_with_previous(Some(&FieldOp::Increment(IncrementOp::new(32))))
                .unwrap(),
            FieldOp::Increment(IncrementOp::new(33))
        );
        assert!(matches!(
            op.merge_with_previous(Some(&FieldOp::Add(AddOp::new(vec![])))),
            Err(Error::InvalidMerge {
                operation: "Increment",
                previous: "Add"
            })
        ));
        assert!(matches!(
            op.merge_with_previous(Some(&FieldOp::Set(SetOp::new("x")))),
            Err(Error::TypeConflict { .. })
        ));
    }

    #[test]
    fn increment_float() {
        let op = IncrementOp::by_float(0.5).unwrap();
        assert_eq!(op.apply(Some(&Value::from(1))).unwrap(), Value::from(1.5));
        assert!(IncrementOp::by_float(f64::NAN).is_err());
    }

    #[test]
    fn add_apply_concatenates() {
        let op = AddOp::new(strings(&["b", "b"]));
        assert_eq!(op.apply(None), Value::from(vec!["b", "b"]));
        assert_eq!(
            op.apply(Some(&Value::from(vec!["a", "b"]))),
            Value::from(vec!["a", "b", "b", "b"])
        );
        // scalars are coerced into a single-element list
        assert_eq!(op.apply(Some(&Value::from("a"))), Value::from(vec!["a", "b", "b"]));
    }

    #[test]
    fn add_requires_array() {
        assert_eq!(
            AddOp::from_value(Value::from("x")),
            Err(Error::NotAnArray { operation: "Add" })
        );
        assert_eq!(
            AddUniqueOp::from_value(Value::Null),
            Err(Error::NotAnArray { operation: "AddUnique" })
        );
        assert_eq!(
            RemoveOp::from_value(Value::from(1)),
            Err(Error::NotAnArray { operation: "Remove" })
        );
    }

    #[test]
    fn add_merge_rules() {
        let op = AddOp::new(strings(&["y"]));
        assert_eq!(
            op.merge_with_previous(Some(&FieldOp::Add(AddOp::new(strings(&["x"])))))
                .unwrap(),
            FieldOp::Set(SetOp::new(vec!["x", "y"]))
        );
        assert!(matches!(
            op.merge_with_previous(Some(&FieldOp::Remove(RemoveOp::new(vec![])))),
            Err(Error::InvalidMerge { .. })
        ));
    }

    #[test]
    fn add_unique_skips_existing_values() {
        let op = AddUniqueOp::new(strings(&["b", "c", "c"]));
        assert_eq!(
            op.apply(Some(&Value::from(vec!["a", "b"]))),
            Value::from(vec!["a", "b", "c"])
        );
    }

    #[test]
    fn add_unique_fast_path_keeps_objects() {
        let op = AddUniqueOp::new(strings(&["a", "a"]));
        assert_eq!(op.apply(None), Value::from(vec!["a", "a"]));
        assert_eq!(op.apply(Some(&Value::Array(vec![]))), Value::from(vec!["a", "a"]));
    }

    #[test]
    fn add_unique_matches_saved_objects_by_id() {
        let stored = ParseObject::create_without_data("Item", "i1");
        let fetched_again = ParseObject::create_without_data("Item", "i1");
        let op = AddUniqueOp::new(vec![Value::from(&fetched_again)]);

        let applied = op.apply(Some(&Value::from(vec![stored.clone()])));
        assert_eq!(applied, Value::from(vec![stored]));
    }

    #[test]
    fn add_unique_matches_unsaved_objects_by_instance() {
        let first = ParseObject::new("Item");
        let other = ParseObject::new("Item");
        let op = AddUniqueOp::new(vec![Value::from(&first), Value::from(&other)]);

        let applied = op.apply(Some(&Value::from(vec![first.clone()])));
        assert_eq!(applied, Value::from(vec![first, other]));
    }

    #[test]
    fn add_unique_merge_rules() {
        let op = AddUniqueOp::new(strings(&["b"]));
        assert_eq!(
            op.merge_with_previous(Some(&FieldOp::Delete)).unwrap(),
            FieldOp::Set(SetOp::new(vec!["b"]))
        );
        assert_eq!(
            op.merge_with_previous(Some(&FieldOp::Set(SetOp::new(vec!["a", "b"]))))
                .unwrap(),
            FieldOp::Set(SetOp::new(vec!["a", "b"]))
        );
        assert_eq!(
            op.merge_with_previous(Some(&FieldOp::AddUnique(AddUniqueOp::new(strings(&["a"])))))
                .unwrap(),
            FieldOp::AddUnique(AddUniqueOp::new(strings(&["a", "b"])))
        );
        assert!(op
            .merge_with_previous(Some(&FieldOp::Add(AddOp::new(vec![]))))
            .is_err());
    }

    #[test]
    fn remove_from_absent_is_empty() {
        let op = RemoveOp::new(strings(&["a"]));
        assert_eq!(op.apply(None), Value::Array(vec![]));
        assert_eq!(op.apply(Some(&Value::Array(vec![]))), Value::Array(vec![]));
    }

    #[test]
    fn remove_drops_every_match() {
        let op = RemoveOp::new(strings(&["a", "c"]));
        assert_eq!(
            op.apply(Some(&Value::from(vec!["a", "b", "a", "c", "d"]))),
            Value::from(vec!["b", "d"])
        );
    }

    #[test]
    fn remove_clean_objects_by_id() {
        let stored = ParseObject::create_without_data("Item", "i1");
        let kept = ParseObject::create_without_data("Item", "i2");
        let candidate = ParseObject::create_without_data("Item", "i1");
        let op = RemoveOp::new(vec![Value::from(&candidate)]);

        let applied = op.apply(Some(&Value::from(vec![stored, kept.clone()])));
        assert_eq!(applied, Value::from(vec![kept]));
    }

    #[test]
    fn remove_keeps_dirty_objects() {
        let stored = ParseObject::create_without_data("Item", "i1");
        stored.set("name", "changed").unwrap();
        let op = RemoveOp::new(vec![Value::from(ParseObject::create_without_data("Item", "i1"))]);

        let applied = op.apply(Some(&Value::from(vec![stored.clone()])));
        assert_eq!(applied, Value::from(vec![stored]));
    }

    #[test]
    fn remove_merge_rules() {
        let op = RemoveOp::new(strings(&["b"]));
        assert_eq!(
            op.merge_with_previous(Some(&FieldOp::Delete)).unwrap(),
            FieldOp::Delete
        );
        assert_eq!(
            op.merge_with_previous(Some(&FieldOp::Set(SetOp::new(vec!["a", "b"]))))
                .unwrap(),
            FieldOp::Set(SetOp::new(vec!["a"]))
        );
        assert_eq!(
            op.merge_with_previous(Some(&FieldOp::Remove(RemoveOp::new(strings(&["a"])))))
                .unwrap(),
            FieldOp::Remove(RemoveOp::new(strings(&["a", "b"])))
        );
    }

    #[test]
    fn list_ops_encode_objects() {
        assert_eq!(
            AddOp::new(strings(&["a"])).encode().unwrap(),
            json!({"__op": "Add", "objects": ["a"]})
        );
        assert_eq!(
            RemoveOp::new(vec![Value::from(ParseObject::create_without_data("Item", "i1"))])
                .encode()
                .unwrap(),
            json!({"__op": "Remove", "objects": [
                {"__type": "Pointer", "className": "Item", "objectId": "i1"}
            ]})
        );
    }

    #[test]
    fn wire_round_trip_of_tags() {
        let wire = json!({"__op": "Increment", "amount": 2});
        assert_eq!(
            FieldOp::from_wire(&wire).unwrap(),
            FieldOp::Increment(IncrementOp::new(2))
        );
        assert_eq!(
            FieldOp::from_wire(&json!("plain")).unwrap(),
            FieldOp::Set(SetOp::new("plain"))
        );
        assert_eq!(
            FieldOp::from_wire(&json!({"__op": "Add", "objects": "x"})),
            Err(Error::NotAnArray { operation: "Add" })
        );
        assert!(FieldOp::from_wire(&json!({"__op": "Explode"})).is_err());
    }

    // Property-based tests using proptest
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_numeric_op() -> impl Strategy<Value = FieldOp> {
            prop_oneof![
                (-1000i64..1000).prop_map(|n| FieldOp::Increment(IncrementOp::new(n))),
                (-1000i64..1000).prop_map(|n| FieldOp::Set(SetOp::new(n))),
                Just(FieldOp::Delete),
            ]
        }

        fn arb_word() -> impl Strategy<Value = Value> {
            prop_oneof![Just("a"), Just("b"), Just("c"), Just("d")].prop_map(Value::from)
        }

        proptest! {
            #[test]
            fn prop_increment_folding_is_associative(
                a in -1000i64..1000,
                b in -1000i64..1000,
                c in -1000i64..1000,
            ) {
                let mut pending: Option<FieldOp> = None;
                for amount in [a, b, c] {
                    let op = FieldOp::Increment(IncrementOp::new(amount));
                    pending = Some(op.merge_with_previous(pending.as_ref()).unwrap());
                }
                prop_assert_eq!(pending, Some(FieldOp::Increment(IncrementOp::new(a + b + c))));
            }

            #[test]
            fn prop_merged_op_applies_like_the_sequence(
                start in proptest::option::of(-1000i64..1000),
                ops in proptest::collection::vec(arb_numeric_op(), 1..6),
            ) {
                let holder = ParseObject::new("Holder");
                let start = start.map(Value::from);

                let mut sequential = start.clone();
                let mut merged: Option<FieldOp> = None;
                for op in &ops {
                    sequential = op.apply(sequential.as_ref(), &holder, "n").unwrap();
                    merged = Some(op.merge_with_previous(merged.as_ref()).unwrap());
                }

                let folded = merged.unwrap().apply(start.as_ref(), &holder, "n").unwrap();
                prop_assert_eq!(folded, sequential);
            }

            #[test]
            fn prop_add_unique_is_idempotent(
                start in proptest::collection::vec(arb_word(), 1..6),
                added in proptest::collection::vec(arb_word(), 1..4),
            ) {
                let op = AddUniqueOp::new(added);
                let once = op.apply(Some(&Value::Array(start)));
                let twice = op.apply(Some(&once));
                prop_assert_eq!(twice, once);
            }

            #[test]
            fn prop_remove_leaves_no_candidate(
                start in proptest::collection::vec(arb_word(), 0..8),
                removed in proptest::collection::vec(arb_word(), 1..3),
            ) {
                let op = RemoveOp::new(removed.clone());
                let result = op.apply(Some(&Value::Array(start.clone())));
                let items = result.as_array().unwrap();

                prop_assert!(items.iter().all(|item| !removed.contains(item)));
                let kept = start.iter().filter(|item| !removed.contains(item)).count();
                prop_assert_eq!(items.len(), kept);
            }
        }
    }
}
