//! In-memory broker implementation.
//!
//! Stands in for the production key-value broker (spec.md §6 key schema) the way
//! `TasksFixtureBackend`/`worker::mock` stand in for Kafka in tests: single process,
//! single `tokio::sync::Mutex`-guarded state, but upholding exactly the same atomicity contracts
//! (`lease_head` is an atomic pop-push, `kv_set_if_absent` is a true compare-and-set) as a real
//! broker would, so code written against [`crate::BrokerClient`] is not emulating anything.
use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::Duration;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::Mutex;

use crate::client::BrokerClient;
use crate::client::SortedSetEntry;
use crate::error::Result;
use crate::metrics::BROKER_OPS;

const BROADCAST_CAPACITY: usize = 256;

#[derive(Default)]
struct State {
    lists: HashMap<String, VecDeque<Value>>,
    hashes: HashMap<String, HashMap<String, String>>,
    sorted_sets: HashMap<String, Vec<(i64, String)>>,
    kv: HashMap<String, (String, Option<Instant>)>,
    channels: HashMap<String, broadcast::Sender<String>>,
}

impl State {
    fn list(&mut self, name: &str) -> &mut VecDeque<Value> {
        self.lists.entry(name.to_string()).or_default()
    }

    fn hash(&mut self, name: &str) -> &mut HashMap<String, String> {
        self.hashes.entry(name.to_string()).or_default()
    }

    fn channel(&mut self, name: &str) -> &broadcast::Sender<String> {
        self.channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0)
    }

    fn kv_expired(&self, key: &str) -> bool {
        match self.kv.get(key) {
            None => true,
            Some((_, None)) => false,
            Some((_, Some(expires_at))) => Instant::now() >= *expires_at,
        }
    }
}

/// An in-memory, single-process broker. The default backend for tests and for single-node
/// deployments that do not need a shared external broker.
#[derive(Clone)]
pub struct MemoryBroker {
    state: std::sync::Arc<Mutex<State>>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        MemoryBroker {
            state: std::sync::Arc::new(Mutex::new(State::default())),
        }
    }
}

impl MemoryBroker {
    /// Create a fresh, empty broker.
    pub fn new() -> MemoryBroker {
        MemoryBroker::default()
    }

    fn track(op: &'static str, ok: bool) {
        BROKER_OPS
            .with_label_values(&[op, if ok { "ok" } else { "err" }])
            .inc();
    }
}

#[async_trait::async_trait]
impl BrokerClient for MemoryBroker {
    async fn enqueue_tail(&self, list: &str, value: Value) -> Result<()> {
        let mut state = self.state.lock().await;
        state.list(list).push_back(value);
        MemoryBroker::track("enqueue_tail", true);
        Ok(())
    }

    async fn lease_head(&self, list: &str, processing: &str) -> Result<Option<Value>> {
        let mut state = self.state.lock().await;
        let value = state.list(list).pop_front();
        if let Some(value) = &value {
            state.list(processing).push_back(value.clone());
        }
        MemoryBroker::track("lease_head", true);
        Ok(value)
    }

    async fn ack_from_processing(&self, processing: &str, value: &Value) -> Result<bool> {
        let mut state = self.state.lock().await;
        let found = remove_first(state.list(processing), value);
        MemoryBroker::track("ack_from_processing", true);
        Ok(found)
    }

    async fn requeue_from_processing(
        &self,
        processing: &str,
        list: &str,
        value: &Value,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        let found = remove_first(state.list(processing), value);
        if found {
            state.list(list).push_front(value.clone());
        }
        MemoryBroker::track("requeue_from_processing", true);
        Ok(found)
    }

    async fn push_dlq(&self, processing: &str, dlq: &str, value: &Value) -> Result<()> {
        let mut state = self.state.lock().await;
        remove_first(state.list(processing), value);
        state.list(dlq).push_back(value.clone());
        MemoryBroker::track("push_dlq", true);
        Ok(())
    }

    async fn list_len(&self, list: &str) -> Result<usize> {
        let mut state = self.state.lock().await;
        Ok(state.list(list).len())
    }

    async fn list_peek(&self, list: &str, limit: usize) -> Result<Vec<Value>> {
        let mut state = self.state.lock().await;
        Ok(state.list(list).iter().take(limit).cloned().collect())
    }

    async fn list_remove(&self, list: &str, value: &Value) -> Result<bool> {
        let mut state = self.state.lock().await;
        Ok(remove_first(state.list(list), value))
    }

    async fn processing_entries(&self, processing: &str) -> Result<HashMap<String, String>> {
        let meta_key = format!("{processing}:meta");
        let mut state = self.state.lock().await;
        Ok(state.hash(&meta_key).clone())
    }

    async fn sorted_set_add(&self, set: &str, score: i64, entry: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let members = state.sorted_sets.entry(set.to_string()).or_default();
        members.push((score, entry.to_string()));
        members.sort_by_key(|(score, _)| *score);
        Ok(())
    }

    async fn sorted_set_trim(&self, set: &str, max_n: usize) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(members) = state.sorted_sets.get_mut(set) {
            if members.len() > max_n {
                let excess = members.len() - max_n;
                members.drain(0..excess);
            }
        }
        Ok(())
    }

    async fn sorted_set_range(&self, set: &str, limit: usize) -> Result<Vec<SortedSetEntry>> {
        let state = self.state.lock().await;
        let entries = state
            .sorted_sets
            .get(set)
            .map(|members| {
                members
                    .iter()
                    .take(limit)
                    .map(|(score, member)| SortedSetEntry {
                        score: *score,
                        member: member.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(entries)
    }

    async fn sorted_set_len(&self, set: &str) -> Result<usize> {
        let state = self.state.lock().await;
        Ok(state.sorted_sets.get(set).map(Vec::len).unwrap_or(0))
    }

    async fn kv_set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut state = self.state.lock().await;
        let expires_at = Instant::now() + ttl;
        state
            .kv
            .insert(key.to_string(), (value.to_string(), Some(expires_at)));
        Ok(())
    }

    async fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let mut state = self.state.lock().await;
        if state.kv_expired(key) {
            state.kv.remove(key);
            return Ok(None);
        }
        Ok(state.kv.get(key).map(|(value, _)| value.clone()))
    }

    async fn kv_delete_if(&self, key: &str, expected: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.kv_expired(key) {
            state.kv.remove(key);
            return Ok(false);
        }
        let matches = state
            .kv
            .get(key)
            .map(|(value, _)| value == expected)
            .unwrap_or(false);
        if matches {
            state.kv.remove(key);
        }
        Ok(matches)
    }

    async fn kv_set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut state = self.state.lock().await;
        if !state.kv_expired(key) {
            return Ok(false);
        }
        let expires_at = Instant::now() + ttl;
        state
            .kv
            .insert(key.to_string(), (value.to_string(), Some(expires_at)));
        Ok(true)
    }

    async fn hash_set(&self, hash: &str, field: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.hash(hash).insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_get_all(&self, hash: &str) -> Result<HashMap<String, String>> {
        let mut state = self.state.lock().await;
        Ok(state.hash(hash).clone())
    }

    async fn hash_del(&self, hash: &str, field: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.hash(hash).remove(field);
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        // A publish with no subscribers is not an error: broadcast channels only fail to send
        // when nobody is listening, which is the normal transient pub/sub case (spec.md §4.5).
        let _ = state.channel(channel).send(message.to_string());
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<String>> {
        let mut state = self.state.lock().await;
        Ok(state.channel(channel).subscribe())
    }
}

/// Remove the first element equal to `value` from `list`, returning whether one was found.
fn remove_first(list: &mut VecDeque<Value>, value: &Value) -> bool {
    if let Some(pos) = list.iter().position(|item| item == value) {
        list.remove(pos);
        true
    } else {
        false
    }
}
