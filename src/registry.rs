//! Process-wide cache of Redis clients keyed by endpoint, grounded on
//! the teacher's `RedisBackend::ensure_connection` /
//! `get_tokio_connection_manager` pattern, lifted out of a single
//! backend instance into shared state so `Queue` and `Worker` can
//! cooperate without a direct reference to one another.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

use crate::config::ConnectionOptions;
use crate::error::{JetError, JetResult};

type EndpointKey = (String, u16, Option<String>);

static CLIENTS: Lazy<DashMap<EndpointKey, ConnectionManager>> = Lazy::new(DashMap::new);

fn endpoint_key(options: &ConnectionOptions) -> EndpointKey {
    (
        options.host.clone(),
        options.port,
        options.password.clone(),
    )
}

fn redis_url(options: &ConnectionOptions) -> String {
    match &options.password {
        Some(password) => format!("redis://:{}@{}:{}", password, options.host, options.port),
        None => format!("redis://{}:{}", options.host, options.port),
    }
}

/// `get(options)` returns an existing client or creates one and waits for
/// it to signal readiness. Different option tuples yield different
/// clients; the registry holds no other per-queue state.
pub async fn get(options: &ConnectionOptions) -> JetResult<ConnectionManager> {
    let key = endpoint_key(options);

    if let Some(existing) = CLIENTS.get(&key) {
        debug!(host = %options.host, port = options.port, "reusing cached redis connection");
        return Ok(existing.clone());
    }

    let url = redis_url(options);
    let client = redis::Client::open(url).map_err(JetError::Connection)?;
    let manager = client
        .get_tokio_connection_manager()
        .await
        .map_err(JetError::Connection)?;

    CLIENTS.insert(key, manager.clone());
    info!(host = %options.host, port = options.port, "connected to redis");
    Ok(manager)
}

/// Closes every cached client. Not a database-level singleton reset: a
/// fresh `get` after this re-dials.
pub fn close_all() {
    CLIENTS.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_endpoints_produce_distinct_keys() {
        let a = ConnectionOptions {
            host: "localhost".into(),
            port: 6379,
            password: None,
        };
        let b = ConnectionOptions {
            host: "localhost".into(),
            port: 6380,
            password: None,
        };
        assert_ne!(endpoint_key(&a), endpoint_key(&b));
    }

    #[test]
    fn url_embeds_password_when_present() {
        let options = ConnectionOptions {
            host: "localhost".into(),
            port: 6379,
            password: Some("secret".into()),
        };
        assert_eq!(redis_url(&options), "redis://:secret@localhost:6379");
    }
}
