//! In-memory transport shared by the client integration tests.

#![allow(dead_code)]

use parse_client::{Config, HttpRequest, HttpResponse, ParseClient, Transport};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

pub const CREATED_AT: &str = "2024-02-01T12:30:00.000Z";

/// Records every request and answers with canned responses in order.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    /// Queue the next response.
    pub fn reply(&self, status: u16, body: Value) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(HttpResponse::json(status, &body));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> HttpRequest {
        self.requests().pop().expect("no request was sent")
    }
}

impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> parse_client::Result<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| {
            HttpResponse::json(500, &json!({"code": 1, "error": "no canned response"}))
        }))
    }
}

pub fn config() -> Config {
    Config::new("http://localhost:1337/parse", "test-app")
        .with_rest_key("rest-key")
        .with_master_key("master-key")
}

pub fn client() -> ParseClient<MockTransport> {
    ParseClient::with_transport(config(), MockTransport::default()).unwrap()
}

/// A successful create response.
pub fn created(object_id: &str) -> Value {
    json!({"objectId": object_id, "createdAt": CREATED_AT})
}

/// Query pair value by name.
pub fn query_param<'a>(request: &'a HttpRequest, name: &str) -> Option<&'a str> {
    request
        .query
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}
