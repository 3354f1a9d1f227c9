//! The Parse REST client.
//!
//! [`ParseClient`] signs requests, turns error bodies into
//! [`ClientError::Api`], and drives the save protocol of [`ParseObject`]:
//! pending operations go in flight with `begin_save`, and the server's answer
//! either folds them into server data (`finish_save`) or returns them to the
//! pending map (`abort_save`).

use crate::config::Config;
use crate::error::{BatchFailure, ClientError, Result};
use crate::transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};
use parse_engine::{ParseObject, SaveBatch};
use serde_json::{json, Map, Value as Json};
use std::sync::{PoisonError, RwLock};

/// Maximum number of sub-requests in one `/batch` call.
pub const BATCH_SIZE: usize = 50;

/// Error code used for malformed entries in a batch response.
const INVALID_JSON: i64 = 107;

/// Client for a single Parse application.
pub struct ParseClient<T = ReqwestTransport> {
    config: Config,
    mount_path: String,
    transport: T,
    installation_id: String,
    use_master_key: bool,
    session_token: RwLock<Option<String>>,
}

impl ParseClient<ReqwestTransport> {
    /// Client over HTTP using the configured timeout.
    pub fn new(config: Config) -> Result<Self> {
        let transport = ReqwestTransport::new(config.timeout)?;
        Self::with_transport(config, transport)
    }

    /// Client configured from `PARSE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(Config::from_env()?)
    }
}

impl<T: Transport> ParseClient<T> {
    pub fn with_transport(config: Config, transport: T) -> Result<Self> {
        let mount_path = config.mount_path()?;
        Ok(Self {
            config,
            mount_path,
            transport,
            installation_id: uuid::Uuid::new_v4().to_string(),
            use_master_key: false,
            session_token: RwLock::new(None),
        })
    }

    /// Send the master key with every request. Has no effect when the
    /// configuration carries no master key.
    pub fn use_master_key(mut self, enabled: bool) -> Self {
        self.use_master_key = enabled;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Random id identifying this client instance to the server.
    pub fn installation_id(&self) -> &str {
        &self.installation_id
    }

    /// Session token of the logged-in user, if any.
    pub fn current_session_token(&self) -> Option<String> {
        self.session_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_session_token(&self, token: Option<String>) {
        *self
            .session_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    // ========================================================================
    // Requests
    // ========================================================================

    fn signed_headers(&self, session_token: Option<&str>) -> Vec<(String, String)> {
        let mut headers = vec![
            ("X-Parse-Application-Id".to_string(), self.config.app_id.clone()),
            ("X-Parse-Installation-Id".to_string(), self.installation_id.clone()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ];
        if let Some(rest_key) = &self.config.rest_key {
            headers.push(("X-Parse-REST-API-Key".to_string(), rest_key.clone()));
        }
        if self.use_master_key {
            if let Some(master_key) = &self.config.master_key {
                headers.push(("X-Parse-Master-Key".to_string(), master_key.clone()));
            }
        }
        if let Some(token) = session_token {
            headers.push(("X-Parse-Session-Token".to_string(), token.to_string()));
        }
        headers
    }

    /// Send a request as the current user.
    pub(crate) async fn request(
        &self,
        method: Method,
        path: &str,
        query: Vec<(String, String)>,
        body: Option<Json>,
    ) -> Result<Json> {
        let token = self.current_session_token();
        self.request_as(method, path, query, body, token.as_deref())
            .await
    }

    /// Send a request with an explicit session token.
    pub(crate) async fn request_as(
        &self,
        method: Method,
        path: &str,
        query: Vec<(String, String)>,
        body: Option<Json>,
        session_token: Option<&str>,
    ) -> Result<Json> {
        let request = HttpRequest {
            method: method.clone(),
            url: self.config.endpoint(path),
            query,
            headers: self.signed_headers(session_token),
            body,
        };

        let response = self.transport.send(request).await?;
        tracing::debug!(%method, path, status = response.status, "parse request");
        interpret_response(path, response)
    }

    // ========================================================================
    // Objects
    // ========================================================================

    /// Save an object. Unsaved objects it references are saved first.
    pub async fn save(&self, object: &ParseObject) -> Result<()> {
        let mut children = Vec::new();
        collect_unsaved(object, &mut Vec::new(), &mut children)?;
        for child in &children {
            self.save_single(child).await?;
        }
        self.save_single(object).await
    }

    /// Save many objects through `/batch`, [`BATCH_SIZE`] at a time.
    ///
    /// Objects the server rejects keep their pending operations and are
    /// reported together in [`ClientError::Aggregate`].
    pub async fn save_all(&self, objects: &[ParseObject]) -> Result<()> {
        let mut children = Vec::new();
        for object in objects {
            collect_unsaved(object, &mut Vec::new(), &mut children)?;
        }
        for child in &children {
            self.save_single(child).await?;
        }

        let mut remaining: Vec<(usize, &ParseObject)> = Vec::new();
        for (index, object) in objects.iter().enumerate() {
            let seen = children.iter().any(|c| c.ptr_eq(object))
                || remaining.iter().any(|(_, o)| o.ptr_eq(object));
            if !seen {
                remaining.push((index, object));
            }
        }

        let mut failures = Vec::new();
        for chunk in remaining.chunks(BATCH_SIZE) {
            self.save_chunk(chunk, &mut failures).await?;
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ClientError::Aggregate(failures))
        }
    }

    /// Reload every field of an object from the server.
    pub async fn fetch(&self, object: &ParseObject) -> Result<()> {
        let path = object_path(object)?;
        let json = self.request(Method::GET, &path, Vec::new(), None).await?;
        object.merge_after_fetch(&expect_object(json)?, true)?;
        Ok(())
    }

    /// Fetch an object by class and id.
    pub async fn get(&self, class_name: &str, object_id: &str) -> Result<ParseObject> {
        let object = ParseObject::create_without_data(class_name, object_id);
        self.fetch(&object).await?;
        Ok(object)
    }

    /// Delete an object on the server.
    pub async fn destroy(&self, object: &ParseObject) -> Result<()> {
        let path = object_path(object)?;
        self.request(Method::DELETE, &path, Vec::new(), None)
            .await?;
        Ok(())
    }

    async fn save_single(&self, object: &ParseObject) -> Result<()> {
        if object.object_id().is_some() && !object.is_dirty() {
            return Ok(());
        }

        let batch = object.begin_save()?;
        let (method, path) = save_route(&batch);
        let outcome = self
            .request(method, &path, Vec::new(), Some(batch.body))
            .await
            .and_then(expect_object)
            .and_then(|fields| Ok(object.finish_save(&fields)?));

        if let Err(e) = &outcome {
            restore_pending(object, e);
        }
        outcome
    }

    async fn save_chunk(
        &self,
        chunk: &[(usize, &ParseObject)],
        failures: &mut Vec<BatchFailure>,
    ) -> Result<()> {
        let mut started: Vec<(usize, &ParseObject)> = Vec::with_capacity(chunk.len());
        let mut requests = Vec::with_capacity(chunk.len());

        for &(index, object) in chunk {
            match object.begin_save() {
                Ok(batch) => {
                    let (method, path) = save_route(&batch);
                    requests.push(json!({
                        "method": method.as_str(),
                        "path": format!("{}/{}", self.mount_path, path),
                        "body": batch.body,
                    }));
                    started.push((index, object));
                }
                Err(e) => {
                    let e = ClientError::from(e);
                    for (_, object) in &started {
                        restore_pending(object, &e);
                    }
                    return Err(e);
                }
            }
        }

        let results = self
            .request(
                Method::POST,
                "batch",
                Vec::new(),
                Some(json!({ "requests": requests })),
            )
            .await
            .and_then(|json| match json {
                Json::Array(items) if items.len() == started.len() => Ok(items),
                other => Err(ClientError::InvalidResponse(format!(
                    "expected {} batch results, got {}",
                    started.len(),
                    other
                ))),
            });

        let results = match results {
            Ok(results) => results,
            Err(e) => {
                for (_, object) in &started {
                    restore_pending(object, &e);
                }
                return Err(e);
            }
        };

        for ((index, object), result) in started.into_iter().zip(results) {
            if let Err(e) = finish_batch_item(object, &result) {
                restore_pending(object, &e);
                let (code, message) = match e {
                    ClientError::Api { code, message } => (code, message),
                    other => (INVALID_JSON, other.to_string()),
                };
                failures.push(BatchFailure {
                    index,
                    class_name: object.class_name(),
                    object_id: object.object_id(),
                    code,
                    message,
                });
            }
        }
        Ok(())
    }
}

/// Turn a raw response into JSON, mapping error bodies to [`ClientError::Api`].
fn interpret_response(path: &str, response: HttpResponse) -> Result<Json> {
    let body = if response.body.trim().is_empty() {
        Json::Null
    } else {
        match serde_json::from_str(&response.body) {
            Ok(json) => json,
            Err(e) if response.is_success() => return Err(e.into()),
            Err(_) => {
                return Err(ClientError::InvalidResponse(format!(
                    "HTTP {}: {}",
                    response.status, response.body
                )))
            }
        }
    };

    if response.is_success() {
        return Ok(body);
    }
    match api_error(&body) {
        Some(ClientError::Api { code, message }) => {
            tracing::warn!(path, code, %message, "parse request failed");
            Err(ClientError::Api { code, message })
        }
        _ => Err(ClientError::InvalidResponse(format!(
            "HTTP {}: {}",
            response.status, body
        ))),
    }
}

/// `{"code": N, "error": "msg"}` as an error.
pub(crate) fn api_error(body: &Json) -> Option<ClientError> {
    let code = body.get("code").and_then(Json::as_i64)?;
    let message = body
        .get("error")
        .and_then(Json::as_str)
        .unwrap_or_default()
        .to_string();
    Some(ClientError::Api { code, message })
}

pub(crate) fn expect_object(json: Json) -> Result<Map<String, Json>> {
    match json {
        Json::Object(map) => Ok(map),
        other => Err(ClientError::InvalidResponse(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

fn finish_batch_item(object: &ParseObject, result: &Json) -> Result<()> {
    if let Some(success) = result.get("success").and_then(Json::as_object) {
        return Ok(object.finish_save(success)?);
    }
    match result.get("error").and_then(api_error) {
        Some(e) => Err(e),
        None => Err(ClientError::InvalidResponse(format!(
            "batch result has neither success nor error: {result}"
        ))),
    }
}

pub(crate) fn restore_pending(object: &ParseObject, cause: &ClientError) {
    tracing::warn!(
        class = %object.class_name(),
        error = %cause,
        "save aborted, pending operations restored"
    );
    if let Err(e) = object.abort_save() {
        tracing::warn!(class = %object.class_name(), error = %e, "could not restore pending operations");
    }
}

fn save_route(batch: &SaveBatch) -> (Method, String) {
    match &batch.object_id {
        Some(id) => (Method::PUT, format!("classes/{}/{}", batch.class_name, id)),
        None => (Method::POST, format!("classes/{}", batch.class_name)),
    }
}

fn object_path(object: &ParseObject) -> Result<String> {
    let class_name = object.class_name();
    let object_id = object
        .object_id()
        .ok_or_else(|| parse_engine::Error::MissingObjectId(class_name.clone()))?;
    Ok(format!("classes/{}/{}", class_name, object_id))
}

/// Depth-first collection of unsaved objects reachable through pending
/// operations, children before parents. `path` holds the objects currently
/// being visited; meeting one of them again is a cycle.
fn collect_unsaved(
    object: &ParseObject,
    path: &mut Vec<ParseObject>,
    ordered: &mut Vec<ParseObject>,
) -> Result<()> {
    path.push(object.clone());
    for child in object.unsaved_children() {
        if path.iter().any(|o| o.ptr_eq(&child)) {
            return Err(ClientError::CircularReference(child.class_name()));
        }
        if ordered.iter().any(|o| o.ptr_eq(&child)) {
            continue;
        }
        collect_unsaved(&child, path, ordered)?;
        ordered.push(child);
    }
    path.pop();
    Ok(())
}
