//! # Parse Client
//!
//! Async REST client for Parse Server, built on the object model of
//! `parse-engine`.
//!
//! The engine records mutations as field operations; this crate signs
//! requests, sends the encoded operations, and folds the server's answers
//! back into the objects.
//!
//! ## Example
//!
//! ```rust,no_run
//! use parse_client::{ClientError, Config, ParseClient, Query};
//! use parse_engine::ParseObject;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ClientError> {
//!     let client = ParseClient::new(
//!         Config::new("http://localhost:1337/parse", "myAppId").with_rest_key("restKey"),
//!     )?;
//!
//!     let score = ParseObject::new("GameScore");
//!     score.set("playerName", "Sean Plott")?;
//!     score.increment("score", 1337)?;
//!     client.save(&score).await?;
//!
//!     let best = client
//!         .first(&Query::new("GameScore").descending("score"))
//!         .await?;
//!     println!("{:?}", best.and_then(|s| s.get("playerName")));
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod cloud;
pub mod config;
pub mod error;
pub mod query;
pub mod transport;
pub mod user;

// Re-export main types at crate root
pub use client::{ParseClient, BATCH_SIZE};
pub use config::{Config, ConfigError};
pub use error::{BatchFailure, ClientError, Result};
pub use query::Query;
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};
pub use user::USER_CLASS;
