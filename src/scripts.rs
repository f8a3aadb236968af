//! The two atomic server-side scripts, grounded on the teacher's
//! `redis::Script::new(...).key(...).arg(...).invoke_async(...)` pattern
//! already used for `requeue_job` / `clear_jobs_by_state`.

use once_cell::sync::Lazy;
use redis::{aio::ConnectionManager, Script};

use crate::error::{JetError, JetResult};

/// Pops the tail of `waiting`, pushes it to the head of `active`, stamps
/// `startedAt` on the job hash, and returns the id (or nil).
static MOVE_TO_ACTIVE: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local id = redis.call('RPOP', KEYS[1])
        if not id then
            return false
        end
        redis.call('LPUSH', KEYS[2], id)
        local job_key = ARGV[1] .. id
        if redis.call('EXISTS', job_key) == 1 then
            redis.call('HSET', job_key, 'startedAt', ARGV[2])
        end
        return id
        "#,
    )
});

/// Ranges `delayed` by score in `(-inf, now]`, moving each id into
/// `waiting` and returning the list of promoted ids.
static PROMOTE_DELAYED: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
        if #ids == 0 then
            return {}
        end
        for i = 1, #ids do
            redis.call('ZREM', KEYS[1], ids[i])
            redis.call('LPUSH', KEYS[2], ids[i])
        end
        return ids
        "#,
    )
});

pub async fn move_to_active(
    conn: &mut ConnectionManager,
    waiting_key: &str,
    active_key: &str,
    job_prefix: &str,
    now_ms: i64,
) -> JetResult<Option<String>> {
    let id: Option<String> = MOVE_TO_ACTIVE
        .key(waiting_key)
        .key(active_key)
        .arg(job_prefix)
        .arg(now_ms)
        .invoke_async(conn)
        .await
        .map_err(JetError::Connection)?;
    Ok(id)
}

pub async fn promote_delayed(
    conn: &mut ConnectionManager,
    delayed_key: &str,
    waiting_key: &str,
    now_ms: i64,
) -> JetResult<Vec<String>> {
    let ids: Vec<String> = PROMOTE_DELAYED
        .key(delayed_key)
        .key(waiting_key)
        .arg(now_ms)
        .invoke_async(conn)
        .await
        .map_err(JetError::Connection)?;
    Ok(ids)
}

/// Removes an id from every collection plus its hash, in one pipelined
/// transaction. Idempotent.
pub async fn remove_everywhere(
    conn: &mut ConnectionManager,
    waiting_key: &str,
    active_key: &str,
    delayed_key: &str,
    job_key: &str,
    id: &str,
) -> JetResult<()> {
    redis::pipe()
        .atomic()
        .lrem(waiting_key, 0, id)
        .ignore()
        .lrem(active_key, 0, id)
        .ignore()
        .zrem(delayed_key, id)
        .ignore()
        .del(job_key)
        .ignore()
        .query_async(conn)
        .await
        .map_err(JetError::Connection)?;
    Ok(())
}
