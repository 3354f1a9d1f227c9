//! Many-to-many relations.
//!
//! A relation field does not hold its members inline. The field value is a
//! [`Relation`] handle naming the target class, and membership changes are
//! sent as [`RelationOp`] batches of additions and removals.
//!
//! Objects not saved yet have no objectId. They are kept in a separate
//! [`RelationKey::Pending`] bucket and matched by instance until they are
//! saved and can be addressed by id.

use crate::{
    encode::encode_list,
    error::Result,
    object::WeakParseObject,
    ClassName, Error, FieldOp, ObjectId, ParseObject, Value,
};
use serde_json::{json, Value as Json};
use std::collections::BTreeMap;
use std::fmt;

/// Bucket key for an object inside a relation operation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RelationKey {
    /// Saved object, addressed by objectId.
    Identified(ObjectId),
    /// Unsaved object, addressed by instance.
    Pending,
}

impl RelationKey {
    pub fn of(object: &ParseObject) -> Self {
        match object.object_id() {
            Some(id) => RelationKey::Identified(id),
            None => RelationKey::Pending,
        }
    }
}

/// A set of relation members bucketed by [`RelationKey`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationSet {
    identified: BTreeMap<ObjectId, ParseObject>,
    pending: Vec<ParseObject>,
}

impl RelationSet {
    /// A copy of this set with `objects` added.
    pub fn with_added(&self, objects: &[ParseObject]) -> Self {
        let mut next = self.clone();
        for object in objects {
            match RelationKey::of(object) {
                RelationKey::Identified(id) => {
                    // an object may have been saved since it was bucketed as pending
                    next.pending.retain(|p| !p.ptr_eq(object));
                    next.identified.insert(id, object.clone());
                }
                RelationKey::Pending => {
                    if !next.pending.iter().any(|p| p.ptr_eq(object)) {
                        next.pending.push(object.clone());
                    }
                }
            }
        }
        next
    }

    /// A copy of this set with `objects` removed.
    pub fn without(&self, objects: &[ParseObject]) -> Self {
        let mut next = self.clone();
        for object in objects {
            if let RelationKey::Identified(id) = RelationKey::of(object) {
                next.identified.remove(&id);
            }
            next.pending.retain(|p| !p.ptr_eq(object));
        }
        next
    }

    /// All members: saved ones in id order, then unsaved ones in insertion order.
    pub fn flatten(&self) -> Vec<ParseObject> {
        self.identified
            .values()
            .chain(self.pending.iter())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.identified.len() + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Add and remove members of a relation field.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationOp {
    target_class: Option<ClassName>,
    to_add: RelationSet,
    to_remove: RelationSet,
}

impl RelationOp {
    /// Build an operation. All objects must share one class, and there must
    /// be at least one object.
    pub fn new(to_add: Vec<ParseObject>, to_remove: Vec<ParseObject>) -> Result<Self> {
        let mut target_class: Option<ClassName> = None;
        for object in to_add.iter().chain(to_remove.iter()) {
            let class_name = object.class_name();
            match &target_class {
                None => target_class = Some(class_name),
                Some(expected) if *expected != class_name => {
                    return Err(Error::RelationClassMismatch {
                        expected: expected.clone(),
                        found: class_name,
                    })
                }
                Some(_) => {}
            }
        }
        if target_class.is_none() {
            return Err(Error::EmptyRelation);
        }

        Ok(Self {
            target_class,
            to_add: RelationSet::default().with_added(&to_add),
            to_remove: RelationSet::default().with_added(&to_remove),
        })
    }

    /// Build from decoded wire values, which must all be object references.
    pub fn from_values(to_add: Vec<Value>, to_remove: Vec<Value>) -> Result<Self> {
        Self::new(pointers(to_add)?, pointers(to_remove)?)
    }

    pub fn target_class(&self) -> Option<&str> {
        self.target_class.as_deref()
    }

    pub fn to_add(&self) -> &RelationSet {
        &self.to_add
    }

    pub fn to_remove(&self) -> &RelationSet {
        &self.to_remove
    }

    pub fn encode(&self) -> Result<Json> {
        let added = self.to_add.flatten();
        let removed = self.to_remove.flatten();

        let add_op = || -> Result<Json> {
            Ok(json!({"__op": "AddRelation", "objects": encode_objects(&added)?}))
        };
        let remove_op = || -> Result<Json> {
            Ok(json!({"__op": "RemoveRelation", "objects": encode_objects(&removed)?}))
        };

        match (added.is_empty(), removed.is_empty()) {
            (false, false) => Ok(json!({"__op": "Batch", "ops": [add_op()?, remove_op()?]})),
            (true, false) => remove_op(),
            _ => add_op(),
        }
    }

    /// The field value of a relation is the relation handle itself;
    /// membership is tracked by the pending operation.
    pub fn apply(&self, old: Option<&Value>, object: &ParseObject, key: &str) -> Result<Value> {
        match old {
            None | Some(Value::Null) => Ok(Value::Relation(Relation::new(
                object,
                key,
                self.target_class.clone(),
            ))),
            Some(Value::Relation(existing)) => {
                let bound = existing.bound_to(object, key);
                match (&self.target_class, existing.target_class()) {
                    (Some(target), Some(current)) if target != current => {
                        Err(Error::RelationClassMismatch {
                            expected: current.to_string(),
                            found: target.clone(),
                        })
                    }
                    (Some(target), None) => Ok(Value::Relation(bound.with_target(target))),
                    _ => Ok(Value::Relation(bound)),
                }
            }
            Some(other) => Err(Error::InvalidMerge {
                operation: "Relation",
                previous: other.type_name(),
            }),
        }
    }

    pub fn merge_with_previous(&self, previous: Option<&FieldOp>) -> Result<FieldOp> {
        match previous {
            None => Ok(FieldOp::Relation(self.clone())),
            Some(FieldOp::Relation(prev)) => {
                if let (Some(expected), Some(found)) = (&prev.target_class, &self.target_class) {
                    if expected != found {
                        return Err(Error::RelationClassMismatch {
                            expected: expected.clone(),
                            found: found.clone(),
                        });
                    }
                }

                let added = self.to_add.flatten();
                let removed = self.to_remove.flatten();

                let to_add = prev.to_add.with_added(&added).without(&removed);
                let to_remove = prev.to_remove.without(&added).with_added(&removed);

                RelationOp::new(to_add.flatten(), to_remove.flatten()).map(FieldOp::Relation)
            }
            Some(other) => Err(Error::InvalidMerge {
                operation: "Relation",
                previous: other.name(),
            }),
        }
    }
}

fn pointers(values: Vec<Value>) -> Result<Vec<ParseObject>> {
    values
        .into_iter()
        .map(|value| match value {
            Value::Pointer(object) => Ok(object),
            other => Err(Error::InvalidWireValue(format!(
                "relation member must be an object, got {}",
                other.type_name()
            ))),
        })
        .collect()
}

fn encode_objects(objects: &[ParseObject]) -> Result<Json> {
    let values: Vec<Value> = objects.iter().map(Value::from).collect();
    encode_list(&values, true)
}

/// The value stored in a relation field.
///
/// Holds a weak link back to its parent object so that stored relations do
/// not keep their parent alive.
#[derive(Clone)]
pub struct Relation {
    parent: Option<WeakParseObject>,
    key: Option<String>,
    target_class: Option<ClassName>,
}

impl Relation {
    pub fn new(parent: &ParseObject, key: &str, target_class: Option<ClassName>) -> Self {
        Self {
            parent: Some(parent.downgrade()),
            key: Some(key.to_string()),
            target_class,
        }
    }

    /// A relation decoded from the wire, not yet attached to an object field.
    pub fn detached(target_class: Option<ClassName>) -> Self {
        Self {
            parent: None,
            key: None,
            target_class,
        }
    }

    pub fn parent(&self) -> Option<ParseObject> {
        self.parent.as_ref().and_then(WeakParseObject::upgrade)
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn target_class(&self) -> Option<&str> {
        self.target_class.as_deref()
    }

    /// This relation attached to `parent`'s field `key`.
    pub fn bound_to(&self, parent: &ParseObject, key: &str) -> Self {
        Self {
            parent: Some(parent.downgrade()),
            key: Some(key.to_string()),
            target_class: self.target_class.clone(),
        }
    }

    pub fn with_target(&self, target_class: &str) -> Self {
        Self {
            target_class: Some(target_class.to_string()),
            ..self.clone()
        }
    }

    /// Add members. Records the relation operation on the parent object.
    pub fn add(&mut self, objects: Vec<ParseObject>) -> Result<()> {
        let op = RelationOp::new(objects, Vec::new())?;
        self.perform(op)
    }

    /// Remove members. Records the relation operation on the parent object.
    pub fn remove(&mut self, objects: Vec<ParseObject>) -> Result<()> {
        let op = RelationOp::new(Vec::new(), objects)?;
        self.perform(op)
    }

    /// Query constraint selecting the members of this relation.
    pub fn related_to_constraint(&self) -> Result<Json> {
        let (parent, key) = self.attachment()?;
        Ok(json!({"$relatedTo": {"object": parent.to_pointer()?, "key": key}}))
    }

    fn perform(&mut self, op: RelationOp) -> Result<()> {
        let (parent, key) = self.attachment()?;
        let target = op.target_class.clone();
        parent.perform(&key, FieldOp::Relation(op))?;
        if self.target_class.is_none() {
            self.target_class = target;
        }
        Ok(())
    }

    fn attachment(&self) -> Result<(ParseObject, String)> {
        match (self.parent(), &self.key) {
            (Some(parent), Some(key)) => Ok((parent, key.clone())),
            _ => Err(Error::DetachedRelation),
        }
    }
}

impl PartialEq for Relation {
    fn eq(&self, other: &Self) -> bool {
        let same_parent = match (&self.parent, &other.parent) {
            (Some(a), Some(b)) => a.ptr_eq(b),
            (None, None) => true,
            _ => false,
        };
        same_parent && self.key == other.key && self.target_class == other.target_class
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("key", &self.key)
            .field("target_class", &self.target_class)
            .field("attached", &self.parent.is_some())
            .finish()
    }
}
