//! Construction of backend network clients.
//!
//! Both connectors verify the server with a ping before returning, so a
//! misconfigured backend fails startup instead of the first request.

use std::time::Duration;

use anyhow::Context;
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use redis::aio::ConnectionManager;
use redis::IntoConnectionInfo;
use tracing::info;

/// Connects a pooled document-store client and pings it.
///
/// # Errors
///
/// Returns an error if the URI is invalid or the server does not answer a
/// ping within `timeout`.
pub async fn connect_mongo(uri: &str, timeout: Duration) -> anyhow::Result<mongodb::Client> {
    let mut options = ClientOptions::parse(uri)
        .await
        .context("invalid mongo uri")?;
    options.connect_timeout = Some(timeout);
    options.server_selection_timeout = Some(timeout);

    let client = mongodb::Client::with_options(options).context("build mongo client")?;
    tokio::time::timeout(
        timeout,
        client.database("admin").run_command(doc! { "ping": 1 }),
    )
    .await
    .with_context(|| format!("mongo ping timed out after {timeout:?}"))?
    .context("mongo ping")?;

    info!("Connected to mongo");
    Ok(client)
}

/// Connects a reconnecting cache connection and pings it.
///
/// `addr` is `host:port`.
///
/// # Errors
///
/// Returns an error if the address is invalid or the server does not answer
/// a ping within `timeout`.
pub async fn connect_redis(
    addr: &str,
    password: Option<&str>,
    db: i64,
    timeout: Duration,
) -> anyhow::Result<ConnectionManager> {
    let mut info = format!("redis://{addr}/{db}")
        .into_connection_info()
        .with_context(|| format!("invalid redis address {addr}"))?;
    info.redis.password = password.map(str::to_string);

    let client = redis::Client::open(info).context("build redis client")?;
    let mut conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
        .await
        .with_context(|| format!("redis connect timed out after {timeout:?}"))?
        .context("redis connect")?;

    let pong: String = tokio::time::timeout(timeout, redis::cmd("PING").query_async(&mut conn))
        .await
        .with_context(|| format!("redis ping timed out after {timeout:?}"))?
        .context("redis ping")?;
    anyhow::ensure!(pong == "PONG", "unexpected redis ping reply {pong:?}");

    info!(addr, db, "Connected to redis");
    Ok(conn)
}
