//! User sign-up, login and sessions.
//!
//! The session token returned by the server is held by the client and sent
//! as `X-Parse-Session-Token` until [`ParseClient::log_out`]. It is never
//! stored as a field of the user object.

use crate::client::{expect_object, restore_pending, ParseClient};
use crate::error::{ClientError, Result};
use crate::transport::{Method, Transport};
use parse_engine::ParseObject;
use serde_json::{json, Map, Value as Json};

/// Class name of user objects.
pub const USER_CLASS: &str = "_User";

const SESSION_TOKEN_KEY: &str = "sessionToken";

impl<T: Transport> ParseClient<T> {
    /// Create a user on the server and log in as that user.
    ///
    /// `user` must be a new `_User` object with `username` and `password` set.
    pub async fn sign_up(&self, user: &ParseObject) -> Result<()> {
        if user.class_name() != USER_CLASS || user.object_id().is_some() {
            return Err(ClientError::InvalidArgument(format!(
                "sign_up requires a new {USER_CLASS} object"
            )));
        }

        let batch = user.begin_save()?;
        let outcome = self
            .request(Method::POST, "users", Vec::new(), Some(batch.body))
            .await
            .and_then(expect_object)
            .and_then(|mut fields| {
                let token = take_session_token(&mut fields)?;
                user.finish_save(&fields)?;
                Ok(token)
            });

        match outcome {
            Ok(token) => {
                self.set_session_token(Some(token));
                tracing::info!(user = ?user.object_id(), "signed up");
                Ok(())
            }
            Err(e) => {
                restore_pending(user, &e);
                Err(e)
            }
        }
    }

    /// Log in with a username and password.
    pub async fn log_in(&self, username: &str, password: &str) -> Result<ParseObject> {
        let body = json!({"username": username, "password": password});
        let json = self
            .request_as(Method::POST, "login", Vec::new(), Some(body), None)
            .await?;
        let user = self.adopt_session(json)?;
        tracing::info!(username, user = ?user.object_id(), "logged in");
        Ok(user)
    }

    /// Log in with an existing session token.
    ///
    /// The token is validated against `users/me` before it is adopted.
    pub async fn become_user(&self, session_token: &str) -> Result<ParseObject> {
        let mut fields = expect_object(
            self.request_as(Method::GET, "users/me", Vec::new(), None, Some(session_token))
                .await?,
        )?;
        fields.insert(SESSION_TOKEN_KEY.to_string(), session_token.into());
        let user = self.adopt_session(Json::Object(fields))?;
        tracing::info!(user = ?user.object_id(), "session adopted");
        Ok(user)
    }

    /// End the current session on the server and forget the token.
    pub async fn log_out(&self) -> Result<()> {
        let Some(token) = self.current_session_token() else {
            return Err(ClientError::NotLoggedIn);
        };
        self.set_session_token(None);
        self.request_as(Method::POST, "logout", Vec::new(), Some(json!({})), Some(&token))
            .await?;
        tracing::info!("logged out");
        Ok(())
    }

    /// The user behind the current session.
    pub async fn current_user(&self) -> Result<ParseObject> {
        if self.current_session_token().is_none() {
            return Err(ClientError::NotLoggedIn);
        }
        let fields = expect_object(
            self.request(Method::GET, "users/me", Vec::new(), None)
                .await?,
        )?;
        Ok(ParseObject::from_server(USER_CLASS, &without_token(fields))?)
    }

    fn adopt_session(&self, json: Json) -> Result<ParseObject> {
        let mut fields = expect_object(json)?;
        let token = take_session_token(&mut fields)?;
        let user = ParseObject::from_server(USER_CLASS, &fields)?;
        self.set_session_token(Some(token));
        Ok(user)
    }
}

fn take_session_token(fields: &mut Map<String, Json>) -> Result<String> {
    match fields.remove(SESSION_TOKEN_KEY) {
        Some(Json::String(token)) => Ok(token),
        _ => Err(ClientError::InvalidResponse(
            "response has no session token".into(),
        )),
    }
}

fn without_token(mut fields: Map<String, Json>) -> Map<String, Json> {
    fields.remove(SESSION_TOKEN_KEY);
    fields
}
