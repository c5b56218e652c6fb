//! Typed broker operations (spec.md §4.1).
//!
//! `BrokerClient` is the only interface the rest of the fabric uses to talk to the shared,
//! in-memory broker: lists (queues), hashes (metadata), sorted sets (transaction logs), and
//! pub/sub (wakeups, status, coordination events). Every operation is documented as idempotent
//! under retry (spec.md §4.1); implementations must uphold that even when a caller retries an
//! operation whose effect already landed (e.g. retrying `lease_head` must not silently drop a
//! message that was already moved).
//!
//! Blobs are opaque JSON values (spec.md §6 "JSON task blobs"): the broker never interprets
//! their contents, it only moves them between lists atomically. Using `serde_json::Value`
//! (rather than a generic type parameter) keeps the trait object-safe so backends can be
//! swapped behind `Arc<dyn BrokerClient>`.
use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::Result;

/// A single entry in a sorted set, as returned by [`BrokerClient::sorted_set_range`].
#[derive(Clone, Debug, PartialEq)]
pub struct SortedSetEntry {
    pub score: i64,
    pub member: String,
}

/// Typed wrapper over the shared broker's primitives.
///
/// Implementations are `Send + Sync` and expected to be cheaply clonable (an `Arc` handle is the
/// usual shape), since every component in the fabric holds one.
#[async_trait::async_trait]
pub trait BrokerClient: Send + Sync {
    /// Append a value to the tail of a list (spec.md `EnqueueTail`).
    async fn enqueue_tail(&self, list: &str, value: Value) -> Result<()>;

    /// Atomically move the head of `list` to the tail of `processing`, returning the moved value
    /// (spec.md `LeaseHead`). Returns `Ok(None)` if `list` is empty.
    async fn lease_head(&self, list: &str, processing: &str) -> Result<Option<Value>>;

    /// Remove the first occurrence of `value` from `processing` (spec.md `AckFromProcessing`).
    /// A missing match is not an error: acks are best-effort and duplicates must be swallowed
    /// (spec.md §4.2 "Failure semantics").
    async fn ack_from_processing(&self, processing: &str, value: &Value) -> Result<bool>;

    /// Move `value` from `processing` back onto the head of `list` (spec.md
    /// `RequeueFromProcessing`). Returns `false` if `value` was not found in `processing`.
    async fn requeue_from_processing(
        &self,
        processing: &str,
        list: &str,
        value: &Value,
    ) -> Result<bool>;

    /// Remove `value` from `processing` (if present) and append it to `dlq` (spec.md `PushDLQ`).
    async fn push_dlq(&self, processing: &str, dlq: &str, value: &Value) -> Result<()>;

    /// Number of entries currently in `list` (spec.md `ListLen`).
    async fn list_len(&self, list: &str) -> Result<usize>;

    /// Peek, without removing, up to `limit` entries from the head of `list`.
    async fn list_peek(&self, list: &str, limit: usize) -> Result<Vec<Value>>;

    /// Remove a specific value from anywhere in `list` (used for cancelling a pending task and
    /// for Balancer migrations that pull items out of the middle of a home queue).
    async fn list_remove(&self, list: &str, value: &Value) -> Result<bool>;

    /// All metadata entries stored against `processing` (spec.md `ProcessingEntries`), keyed by
    /// task id, as raw JSON strings.
    async fn processing_entries(&self, processing: &str) -> Result<HashMap<String, String>>;

    /// Add a timestamp-scored entry to a sorted set (spec.md `SortedSetAdd`).
    async fn sorted_set_add(&self, set: &str, score: i64, entry: &str) -> Result<()>;

    /// Trim a sorted set down to its `max_n` highest-scored entries (spec.md `SortedSetTrim`).
    async fn sorted_set_trim(&self, set: &str, max_n: usize) -> Result<()>;

    /// Return up to `limit` entries from a sorted set, lowest score first.
    async fn sorted_set_range(&self, set: &str, limit: usize) -> Result<Vec<SortedSetEntry>>;

    /// Current size of a sorted set.
    async fn sorted_set_len(&self, set: &str) -> Result<usize>;

    /// Set a string key with a TTL after which it is considered absent (spec.md `KVSetWithTTL`).
    async fn kv_set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Read a string key set with [`BrokerClient::kv_set_with_ttl`]; `None` once expired.
    async fn kv_get(&self, key: &str) -> Result<Option<String>>;

    /// Delete `key` only if its current value equals `expected` (compare-and-delete).
    async fn kv_delete_if(&self, key: &str, expected: &str) -> Result<bool>;

    /// Set `key` to `value` only if `key` is currently absent (used for exclusive locks).
    async fn kv_set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Write a single field into a hash (spec.md `HashSet`).
    async fn hash_set(&self, hash: &str, field: &str, value: &str) -> Result<()>;

    /// Read all fields of a hash (spec.md `HashGetAll`).
    async fn hash_get_all(&self, hash: &str) -> Result<HashMap<String, String>>;

    /// Remove a field from a hash.
    async fn hash_del(&self, hash: &str, field: &str) -> Result<()>;

    /// Publish a message on a channel (spec.md `PubSub`). Subscribers that are not currently
    /// listening simply miss the message, matching the broker's transient pub/sub semantics.
    async fn publish(&self, channel: &str, message: &str) -> Result<()>;

    /// Subscribe to a channel, receiving a broadcast receiver for future publishes (spec.md
    /// `Subscribe`).
    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<String>>;
}
