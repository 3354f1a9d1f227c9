//! Queries over a class.

use crate::client::{expect_object, ParseClient};
use crate::error::{ClientError, Result};
use crate::transport::{Method, Transport};
use parse_engine::encode::encode;
use parse_engine::{ClassName, ParseObject, Relation, Value};
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;

/// A constraint on one key.
#[derive(Debug, Clone)]
enum Condition {
    Equals(Value),
    Operators(BTreeMap<&'static str, Value>),
}

/// Builder for `GET /classes/<className>` queries.
#[derive(Debug, Clone)]
pub struct Query {
    class_name: ClassName,
    conditions: BTreeMap<String, Condition>,
    related_to: Option<Relation>,
    order: Vec<String>,
    limit: Option<usize>,
    skip: Option<usize>,
    include: Vec<String>,
}

impl Query {
    pub fn new(class_name: impl Into<ClassName>) -> Self {
        Self {
            class_name: class_name.into(),
            conditions: BTreeMap::new(),
            related_to: None,
            order: Vec::new(),
            limit: None,
            skip: None,
            include: Vec::new(),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn equal_to(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .insert(key.to_string(), Condition::Equals(value.into()));
        self
    }

    pub fn not_equal_to(self, key: &str, value: impl Into<Value>) -> Self {
        self.operator(key, "$ne", value.into())
    }

    pub fn greater_than(self, key: &str, value: impl Into<Value>) -> Self {
        self.operator(key, "$gt", value.into())
    }

    pub fn less_than(self, key: &str, value: impl Into<Value>) -> Self {
        self.operator(key, "$lt", value.into())
    }

    pub fn contained_in<V: Into<Value>>(self, key: &str, values: Vec<V>) -> Self {
        self.operator(key, "$in", Value::from(values))
    }

    pub fn exists(self, key: &str) -> Self {
        self.operator(key, "$exists", Value::Bool(true))
    }

    pub fn does_not_exist(self, key: &str) -> Self {
        self.operator(key, "$exists", Value::Bool(false))
    }

    /// Restrict results to the members of a relation field.
    pub fn related_to(mut self, relation: &Relation) -> Self {
        self.related_to = Some(relation.clone());
        self
    }

    pub fn ascending(mut self, key: &str) -> Self {
        self.order.push(key.to_string());
        self
    }

    pub fn descending(mut self, key: &str) -> Self {
        self.order.push(format!("-{key}"));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Return the objects pointed to by `key` in full.
    pub fn include(mut self, key: &str) -> Self {
        self.include.push(key.to_string());
        self
    }

    /// An operator replaces an equality constraint on the same key.
    fn operator(mut self, key: &str, op: &'static str, value: Value) -> Self {
        let entry = self
            .conditions
            .entry(key.to_string())
            .or_insert_with(|| Condition::Operators(BTreeMap::new()));
        match entry {
            Condition::Operators(ops) => {
                ops.insert(op, value);
            }
            Condition::Equals(_) => {
                *entry = Condition::Operators(BTreeMap::from([(op, value)]));
            }
        }
        self
    }

    /// The `where` document.
    pub fn where_json(&self) -> Result<Json> {
        let mut map = Map::new();
        for (key, condition) in &self.conditions {
            let encoded = match condition {
                Condition::Equals(value) => encode(value, true)?,
                Condition::Operators(ops) => {
                    let mut constraint = Map::new();
                    for (op, value) in ops {
                        constraint.insert((*op).to_string(), encode(value, true)?);
                    }
                    Json::Object(constraint)
                }
            };
            map.insert(key.clone(), encoded);
        }
        if let Some(relation) = &self.related_to {
            if let Json::Object(constraint) = relation.related_to_constraint()? {
                map.extend(constraint);
            }
        }
        Ok(Json::Object(map))
    }

    /// URL query pairs for a find.
    pub fn params(&self) -> Result<Vec<(String, String)>> {
        let mut params = Vec::new();
        let where_json = self.where_json()?;
        if where_json.as_object().is_some_and(|m| !m.is_empty()) {
            params.push(("where".to_string(), where_json.to_string()));
        }
        if !self.order.is_empty() {
            params.push(("order".to_string(), self.order.join(",")));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(skip) = self.skip {
            params.push(("skip".to_string(), skip.to_string()));
        }
        if !self.include.is_empty() {
            params.push(("include".to_string(), self.include.join(",")));
        }
        Ok(params)
    }

    fn path(&self) -> String {
        format!("classes/{}", self.class_name)
    }
}

impl<T: Transport> ParseClient<T> {
    /// All objects matching the query.
    pub async fn find(&self, query: &Query) -> Result<Vec<ParseObject>> {
        let json = self
            .request(Method::GET, &query.path(), query.params()?, None)
            .await?;
        let results = match expect_object(json)?.remove("results") {
            Some(Json::Array(results)) => results,
            _ => {
                return Err(ClientError::InvalidResponse(
                    "query response has no results".into(),
                ))
            }
        };

        results
            .into_iter()
            .map(|result| {
                let fields = expect_object(result)?;
                Ok(ParseObject::from_server(query.class_name(), &fields)?)
            })
            .collect()
    }

    /// The first matching object.
    pub async fn first(&self, query: &Query) -> Result<Option<ParseObject>> {
        let query = query.clone().limit(1);
        Ok(self.find(&query).await?.into_iter().next())
    }

    /// Number of matching objects, ignoring limit and skip.
    pub async fn count(&self, query: &Query) -> Result<u64> {
        let mut params: Vec<(String, String)> = query
            .params()?
            .into_iter()
            .filter(|(name, _)| !matches!(name.as_str(), "limit" | "skip" | "order" | "include"))
            .collect();
        params.push(("count".to_string(), "1".to_string()));
        params.push(("limit".to_string(), "0".to_string()));

        let json = self
            .request(Method::GET, &query.path(), params, None)
            .await?;
        json.get("count")
            .and_then(Json::as_u64)
            .ok_or_else(|| ClientError::InvalidResponse("count response has no count".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn where_document() {
        let owner = ParseObject::create_without_data("_User", "u1");
        let query = Query::new("GameScore")
            .equal_to("playerName", "Sean Plott")
            .greater_than("score", 1000)
            .less_than("score", 3000)
            .contained_in("level", vec![1, 2])
            .equal_to("owner", &owner)
            .does_not_exist("cheatMode");

        assert_eq!(
            query.where_json().unwrap(),
            json!({
                "playerName": "Sean Plott",
                "score": {"$gt": 1000, "$lt": 3000},
                "level": {"$in": [1, 2]},
                "owner": {"__type": "Pointer", "className": "_User", "objectId": "u1"},
                "cheatMode": {"$exists": false}
            })
        );
    }

    #[test]
    fn operator_replaces_equality() {
        let query = Query::new("GameScore")
            .equal_to("score", 5)
            .not_equal_to("score", 7);
        assert_eq!(query.where_json().unwrap(), json!({"score": {"$ne": 7}}));
    }

    #[test]
    fn params_in_order() {
        let query = Query::new("GameScore")
            .exists("score")
            .descending("score")
            .ascending("playerName")
            .limit(10)
            .skip(20)
            .include("owner");

        assert_eq!(
            query.params().unwrap(),
            vec![
                ("where".to_string(), r#"{"score":{"$exists":true}}"#.to_string()),
                ("order".to_string(), "-score,playerName".to_string()),
                ("limit".to_string(), "10".to_string()),
                ("skip".to_string(), "20".to_string()),
                ("include".to_string(), "owner".to_string()),
            ]
        );
    }

    #[test]
    fn empty_query_has_no_where() {
        assert!(Query::new("GameScore").params().unwrap().is_empty());
    }

    #[test]
    fn related_to_constraint() {
        let post = ParseObject::create_without_data("Post", "p1");
        let likes = post.relation("likes").unwrap();
        let query = Query::new("_User").related_to(&likes);

        assert_eq!(
            query.where_json().unwrap(),
            json!({"$relatedTo": {
                "object": {"__type": "Pointer", "className": "Post", "objectId": "p1"},
                "key": "likes"
            }})
        );
    }

    #[test]
    fn unsaved_pointer_fails_to_encode() {
        let query = Query::new("GameScore").equal_to("owner", ParseObject::new("_User"));
        assert!(query.where_json().is_err());
    }
}
