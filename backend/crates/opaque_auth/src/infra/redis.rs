//! Redis Primary Token Tier
//!
//! Each record is a hash at `{prefix}token:{hash}` whose key expires at the
//! eviction time. Compare-and-set operations run as Lua scripts so that a
//! revoke and a concurrent touch on the same token are linearizable.
//!
//! The default prefix is the hash tag `{auth}:`, so a token key and its
//! principal index land in the same slot and the scripts also run on Redis
//! Cluster. The whole tier then lives on one shard. A prefix without a hash
//! tag only works against a standalone server.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use fred::prelude::*;

use crate::domain::entity::TokenRecord;
use crate::domain::repository::{PrimaryTokenTier, RevokeOutcome, TouchOutcome};
use crate::domain::value_object::{PrincipalId, SessionKind, TokenHash};
use crate::error::{AuthError, AuthResult};

/// Insert unless present, then index under the principal.
/// KEYS: token key, principal index key. ARGV: evict_at_ms, hash, field/value pairs...
const PUT_IF_ABSENT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1], unpack(ARGV, 3))
redis.call('PEXPIREAT', KEYS[1], ARGV[1])
redis.call('SADD', KEYS[2], ARGV[2])
if redis.call('PEXPIRETIME', KEYS[2]) < tonumber(ARGV[1]) then
    redis.call('PEXPIREAT', KEYS[2], ARGV[1])
end
return 1
"#;

/// Status codes: 0 not found, 1 touched, 2 revoked, 3 expired.
/// KEYS: token key. ARGV: now_ms, new_expiry_ms, evict_at_ms
const TOUCH: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return {'0'}
end
local f = redis.call('HMGET', KEYS[1], 'revoked', 'expires_at_ms')
if f[1] == '1' then
    return {'2'}
end
local expires = tonumber(f[2])
if tonumber(ARGV[1]) > expires then
    return {'3'}
end
redis.call('HSET', KEYS[1],
    'expires_at_ms', tostring(math.max(expires, tonumber(ARGV[2]))),
    'last_used_ms', ARGV[1])
if redis.call('PEXPIRETIME', KEYS[1]) < tonumber(ARGV[3]) then
    redis.call('PEXPIREAT', KEYS[1], ARGV[3])
end
local out = redis.call('HGETALL', KEYS[1])
table.insert(out, 1, '1')
return out
"#;

/// Status codes: 0 not found, 1 revoked now, 2 already revoked.
/// KEYS: token key. ARGV: now_ms
const REVOKE: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return {'0'}
end
if redis.call('HGET', KEYS[1], 'revoked') == '1' then
    return {'2'}
end
redis.call('HSET', KEYS[1], 'revoked', '1', 'revoked_at_ms', ARGV[1])
local out = redis.call('HGETALL', KEYS[1])
table.insert(out, 1, '1')
return out
"#;

/// Redis connection settings for the primary tier
#[derive(Debug, Clone)]
pub struct RedisTierConfig {
    pub url: String,
    pub key_prefix: String,
}

impl Default for RedisTierConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "{auth}:".to_string(),
        }
    }
}

impl RedisTierConfig {
    /// Whether every key shares one cluster slot
    fn has_hash_tag(&self) -> bool {
        self.key_prefix
            .split_once('{')
            .and_then(|(_, rest)| rest.split_once('}'))
            .is_some_and(|(tag, _)| !tag.is_empty())
    }

    fn token_key(&self, hash: &TokenHash) -> String {
        format!("{}token:{}", self.key_prefix, hash.as_str())
    }

    fn principal_key(&self, principal_id: &PrincipalId) -> String {
        format!("{}principal:{}", self.key_prefix, principal_id)
    }
}

/// Map a Redis failure; every variant denies access upstream
fn from_redis_error(err: fred::error::Error) -> AuthError {
    match err.kind() {
        fred::error::ErrorKind::IO
        | fred::error::ErrorKind::Timeout
        | fred::error::ErrorKind::Canceled => AuthError::StoreUnavailable(err.to_string()),
        _ => AuthError::Internal(format!("Redis error: {err}")),
    }
}

pub struct RedisTokenTier {
    client: Client,
    config: RedisTierConfig,
}

impl RedisTokenTier {
    /// Connect to Redis
    pub async fn new(config: RedisTierConfig) -> AuthResult<Self> {
        let redis_config = Config::from_url(&config.url)
            .map_err(|e| AuthError::Config(format!("Invalid Redis URL: {e}")))?;

        let client = Client::new(
            redis_config,
            None,
            None,
            Some(ReconnectPolicy::new_exponential(0, 1000, 30_000, 2)),
        );
        client.init().await.map_err(from_redis_error)?;

        if !config.has_hash_tag() {
            tracing::warn!(
                key_prefix = %config.key_prefix,
                "Redis key prefix has no hash tag, scripts fail on Redis Cluster"
            );
        }
        tracing::info!(key_prefix = %config.key_prefix, "Redis token tier connected");
        Ok(Self { client, config })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl PrimaryTokenTier for RedisTokenTier {
    async fn put_if_absent(
        &self,
        record: &TokenRecord,
        evict_at: DateTime<Utc>,
    ) -> AuthResult<bool> {
        let mut args = vec![
            evict_at.timestamp_millis().to_string(),
            record.token_hash.as_str().to_string(),
        ];
        args.extend(record_fields(record));

        let inserted: i64 = self
            .client
            .eval(
                PUT_IF_ABSENT,
                vec![
                    self.config.token_key(&record.token_hash),
                    self.config.principal_key(&record.principal_id),
                ],
                args,
            )
            .await
            .map_err(from_redis_error)?;

        Ok(inserted == 1)
    }

    async fn get(&self, hash: &TokenHash, _now: DateTime<Utc>) -> AuthResult<Option<TokenRecord>> {
        let fields: HashMap<String, String> = self
            .client
            .hgetall(self.config.token_key(hash))
            .await
            .map_err(from_redis_error)?;

        if fields.is_empty() {
            return Ok(None);
        }
        record_from_fields(hash, &fields).map(Some)
    }

    async fn touch(
        &self,
        hash: &TokenHash,
        now: DateTime<Utc>,
        new_expiry: DateTime<Utc>,
        evict_at: DateTime<Utc>,
    ) -> AuthResult<TouchOutcome> {
        let reply: Vec<String> = self
            .client
            .eval(
                TOUCH,
                vec![self.config.token_key(hash)],
                vec![
                    now.timestamp_millis().to_string(),
                    new_expiry.timestamp_millis().to_string(),
                    evict_at.timestamp_millis().to_string(),
                ],
            )
            .await
            .map_err(from_redis_error)?;

        match split_reply(&reply)? {
            ("1", fields) => Ok(TouchOutcome::Touched(record_from_fields(hash, &fields)?)),
            ("2", _) => Ok(TouchOutcome::Revoked),
            ("3", _) => Ok(TouchOutcome::Expired),
            _ => Ok(TouchOutcome::NotFound),
        }
    }

    async fn revoke(&self, hash: &TokenHash, now: DateTime<Utc>) -> AuthResult<RevokeOutcome> {
        let reply: Vec<String> = self
            .client
            .eval(
                REVOKE,
                vec![self.config.token_key(hash)],
                vec![now.timestamp_millis().to_string()],
            )
            .await
            .map_err(from_redis_error)?;

        match split_reply(&reply)? {
            ("1", fields) => Ok(RevokeOutcome::Revoked(record_from_fields(hash, &fields)?)),
            ("2", _) => Ok(RevokeOutcome::AlreadyRevoked),
            _ => Ok(RevokeOutcome::NotFound),
        }
    }

    async fn hashes_for_principal(&self, principal_id: &PrincipalId) -> AuthResult<Vec<TokenHash>> {
        let members: Vec<String> = self
            .client
            .smembers(self.config.principal_key(principal_id))
            .await
            .map_err(from_redis_error)?;

        Ok(members
            .into_iter()
            .filter_map(|member| TokenHash::parse(member).ok())
            .collect())
    }
}

/// Flatten a record into HSET field/value pairs; absent options are omitted
fn record_fields(record: &TokenRecord) -> Vec<String> {
    let mut fields = vec![
        "principal_id".to_string(),
        record.principal_id.to_string(),
        "session_kind".to_string(),
        record.session_kind.code().to_string(),
        "created_at_ms".to_string(),
        record.created_at.timestamp_millis().to_string(),
        "expires_at_ms".to_string(),
        record.expires_at.timestamp_millis().to_string(),
        "revoked".to_string(),
        if record.revoked { "1" } else { "0" }.to_string(),
    ];
    let optional = [
        ("session_label", record.session_kind.label().map(str::to_string)),
        (
            "last_used_ms",
            record.last_used_at.map(|t| t.timestamp_millis().to_string()),
        ),
        (
            "revoked_at_ms",
            record.revoked_at.map(|t| t.timestamp_millis().to_string()),
        ),
        ("client_ip", record.client_ip.clone()),
        ("user_agent", record.user_agent.clone()),
    ];
    for (name, value) in optional {
        if let Some(value) = value {
            fields.push(name.to_string());
            fields.push(value);
        }
    }
    fields
}

/// Split a script reply into its status and trailing HGETALL pairs
fn split_reply(reply: &[String]) -> AuthResult<(&str, HashMap<String, String>)> {
    let (status, rest) = reply
        .split_first()
        .ok_or_else(|| AuthError::Internal("Empty Redis script reply".into()))?;
    let fields = rest
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect();
    Ok((status.as_str(), fields))
}

fn record_from_fields(hash: &TokenHash, fields: &HashMap<String, String>) -> AuthResult<TokenRecord> {
    let required = |name: &str| {
        fields
            .get(name)
            .ok_or_else(|| AuthError::Internal(format!("Token hash field missing: {name}")))
    };
    let millis = |name: &str| -> AuthResult<Option<DateTime<Utc>>> {
        fields
            .get(name)
            .map(|raw| {
                raw.parse::<i64>()
                    .ok()
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                    .ok_or_else(|| AuthError::Internal(format!("Invalid {name}: {raw}")))
            })
            .transpose()
    };

    let principal_id = required("principal_id")?
        .parse::<PrincipalId>()
        .map_err(|e| AuthError::Internal(format!("Invalid principal_id: {e}")))?;
    let session_kind =
        SessionKind::from_parts(required("session_kind")?, fields.get("session_label").cloned())
            .ok_or_else(|| AuthError::Internal("Invalid session_kind".into()))?;
    let created_at = millis("created_at_ms")?
        .ok_or_else(|| AuthError::Internal("Token hash field missing: created_at_ms".into()))?;
    let expires_at = millis("expires_at_ms")?
        .ok_or_else(|| AuthError::Internal("Token hash field missing: expires_at_ms".into()))?;

    Ok(TokenRecord {
        token_hash: hash.clone(),
        principal_id,
        session_kind,
        created_at,
        expires_at,
        last_used_at: millis("last_used_ms")?,
        revoked: required("revoked")? == "1",
        revoked_at: millis("revoked_at_ms")?,
        client_ip: fields.get("client_ip").cloned(),
        user_agent: fields.get("user_agent").cloned(),
    })
}
