use redis::Client;
use redis::aio::ConnectionManager;

/// Create a Redis connection manager for rate-limit counters and feed publishing.
pub async fn create_redis_pool(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let client = Client::open(redis_url)?;
    let manager = ConnectionManager::new(client).await?;

    tracing::info!("Connected to Redis");
    Ok(manager)
}

/// Open a bare client, used when a dedicated pub/sub connection is needed.
pub fn open_client(redis_url: &str) -> anyhow::Result<Client> {
    Ok(Client::open(redis_url)?)
}
