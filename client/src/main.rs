//! parse-client - command line access to a Parse Server.
//!
//! Reads its configuration from `PARSE_*` environment variables or a `.env`
//! file and runs one command:
//!
//! ```text
//! parse-client health
//! parse-client get <Class> <objectId>
//! parse-client run <function> [json params]
//! ```

use parse_client::{ClientError, Config, ParseClient};
use parse_engine::encode::{decode_map, encode};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: parse-client <health | get <Class> <objectId> | run <function> [json]>";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parse_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    let use_master_key = config.master_key.is_some();

    tracing::info!("Connecting to {} as {}", config.server_url, config.app_id);
    let client = ParseClient::new(config)?.use_master_key(use_master_key);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let output = match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["health"] => Json::String(client.health().await?),
        ["get", class_name, object_id] => client.get(class_name, object_id).await?.encode_full()?,
        ["run", function] => run(&client, function, None).await?,
        ["run", function, params] => run(&client, function, Some(*params)).await?,
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(client: &ParseClient, function: &str, params: Option<&str>) -> Result<Json, ClientError> {
    let params = match params {
        Some(raw) => match serde_json::from_str(raw)? {
            Json::Object(map) => decode_map(&map)?,
            _ => {
                return Err(ClientError::InvalidArgument(
                    "cloud function params must be a JSON object".into(),
                ))
            }
        },
        None => BTreeMap::new(),
    };

    let result = client.run(function, &params).await?;
    Ok(encode(&result, true)?)
}
