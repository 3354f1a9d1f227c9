//! Cloud functions, app config and health.

use crate::client::{expect_object, ParseClient};
use crate::error::{ClientError, Result};
use crate::transport::{Method, Transport};
use parse_engine::encode::{decode, decode_map, encode};
use parse_engine::Value;
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;

impl<T: Transport> ParseClient<T> {
    /// Run a cloud function and decode its result.
    ///
    /// Parameters may not contain object references.
    pub async fn run(&self, function: &str, params: &BTreeMap<String, Value>) -> Result<Value> {
        let mut body = Map::new();
        for (key, value) in params {
            body.insert(key.clone(), encode(value, false)?);
        }

        let json = self
            .request(
                Method::POST,
                &format!("functions/{function}"),
                Vec::new(),
                Some(Json::Object(body)),
            )
            .await?;
        match expect_object(json)?.get("result") {
            Some(result) => Ok(decode(result)?),
            None => Ok(Value::Null),
        }
    }

    /// Current app config parameters.
    pub async fn fetch_config(&self) -> Result<BTreeMap<String, Value>> {
        let json = self.request(Method::GET, "config", Vec::new(), None).await?;
        match expect_object(json)?.get("params") {
            Some(Json::Object(params)) => Ok(decode_map(params)?),
            Some(_) | None => Err(ClientError::InvalidResponse(
                "config response has no params".into(),
            )),
        }
    }

    /// Server health status, `"ok"` when the server is ready.
    pub async fn health(&self) -> Result<String> {
        let json = self.request(Method::GET, "health", Vec::new(), None).await?;
        json.get("status")
            .and_then(Json::as_str)
            .map(str::to_string)
            .ok_or_else(|| ClientError::InvalidResponse("health response has no status".into()))
    }
}
