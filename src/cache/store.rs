use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use super::ledger::PendingLedger;
use super::tree::{read_from, remove_from, write_into};
use crate::expression::UpdateTarget;
use crate::schema::{Chain, ContainerType, PathElement};
use crate::transport::Record;

/// Cached part of one record.
#[derive(Debug, Clone, PartialEq)]
enum CacheNode {
    /// The whole value at this location is known; `Null` means absent
    Known(Value),
    /// Only some children are known, keyed by element key
    Partial(BTreeMap<String, CacheNode>),
}

impl Default for CacheNode {
    fn default() -> Self {
        Self::Partial(BTreeMap::new())
    }
}

impl CacheNode {
    fn lookup(&self, elements: &[PathElement], in_set: bool) -> Option<Value> {
        match self {
            Self::Known(value) => Some(read_from(value, elements, in_set)),
            Self::Partial(children) => {
                let (element, rest) = elements.split_first()?;
                children
                    .get(&element.key().to_string())?
                    .lookup(rest, element.container() == ContainerType::Set)
            }
        }
    }

    fn store(&mut self, elements: &[PathElement], value: Value, in_set: bool) {
        if elements.is_empty() {
            *self = Self::Known(value);
            return;
        }

        match self {
            Self::Known(known) if value.is_null() => remove_from(known, elements, in_set),
            Self::Known(known) => write_into(known, elements, value, in_set),
            Self::Partial(children) => {
                let (element, rest) = (&elements[0], &elements[1..]);
                children
                    .entry(element.key().to_string())
                    .or_default()
                    .store(rest, value, element.container() == ContainerType::Set);
            }
        }
    }
}

/// In-memory mirror of record fields plus the writes queued against them.
///
/// Not synchronised: one owner drives a store, concurrent use of the same
/// key must be serialised by the caller.
#[derive(Debug, Clone)]
pub struct CacheStore {
    primary_key_name: String,
    entries: HashMap<String, CacheNode>,
    ledgers: HashMap<String, PendingLedger>,
}

impl CacheStore {
    /// Empty store for a table keyed by `primary_key_name`.
    pub fn new(primary_key_name: impl Into<String>) -> Self {
        Self {
            primary_key_name: primary_key_name.into(),
            entries: HashMap::new(),
            ledgers: HashMap::new(),
        }
    }

    /// Cached value at `chain`.
    ///
    /// `(true, Null)` means known to be absent, `(false, Null)` means unknown.
    /// The primary key field answers with `key` itself.
    pub fn get(&self, key: &str, chain: &Chain) -> (bool, Value) {
        if chain.is_single_field(&self.primary_key_name) {
            return (true, Value::String(key.to_string()));
        }
        if chain.is_empty() {
            return (false, Value::Null);
        }

        match self
            .entries
            .get(key)
            .and_then(|entry| entry.lookup(chain.elements(), false))
        {
            Some(value) => (true, value),
            None => (false, Value::Null),
        }
    }

    /// Cache `value` at `chain`; `Null` records the field as absent.
    pub fn put(&mut self, key: &str, chain: &Chain, value: Value) {
        if chain.is_empty() || chain.is_single_field(&self.primary_key_name) {
            return;
        }

        self.entries
            .entry(key.to_string())
            .or_default()
            .store(chain.elements(), value, false);
    }

    /// Cache a whole record; fields it lacks become known absent.
    pub fn put_record(&mut self, key: &str, mut record: Record) {
        let _ = record.remove(&self.primary_key_name);
        let _ = self
            .entries
            .insert(key.to_string(), CacheNode::Known(Value::Object(record)));
    }

    /// Write through to the cache and queue the update.
    pub fn schedule_update(&mut self, key: &str, chain: Chain, value: Value) {
        self.put(key, &chain, value.clone());
        self.ledgers
            .entry(key.to_string())
            .or_default()
            .schedule_update(chain, value);
    }

    /// Record the field as absent and queue the removal.
    pub fn schedule_removal(&mut self, key: &str, chain: Chain) {
        self.put(key, &chain, Value::Null);
        self.ledgers
            .entry(key.to_string())
            .or_default()
            .schedule_removal(chain);
    }

    /// Pending operations of `key`
    pub fn ledger(&self, key: &str) -> Option<&PendingLedger> {
        self.ledgers.get(key).filter(|ledger| !ledger.is_empty())
    }

    /// Keys with pending operations, sorted.
    pub fn pending_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .ledgers
            .iter()
            .filter(|(_, ledger)| !ledger.is_empty())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Detach the pending operations of `key` for committing.
    pub fn take_pending(&mut self, key: &str) -> Option<PendingLedger> {
        self.ledgers.remove(key).filter(|ledger| !ledger.is_empty())
    }

    /// Put back operations that failed to commit.
    ///
    /// Entries queued after the commit started win over re-queued ones.
    pub fn requeue(&mut self, key: &str, updates: Vec<UpdateTarget>, removals: Vec<Chain>) {
        let ledger = self.ledgers.entry(key.to_string()).or_default();
        ledger.requeue_removals(removals);
        ledger.requeue_updates(updates);
    }

    /// Whether anything is cached for `key`
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Drop cached values of `key`; pending operations stay.
    pub fn clear(&mut self, key: &str) {
        let _ = self.entries.remove(key);
    }

    /// Drop every cached value; pending operations stay.
    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    /// Drop pending operations of `key`; cached values stay.
    pub fn clear_pending(&mut self, key: &str) {
        let _ = self.ledgers.remove(key);
    }

    /// Drop every pending operation; cached values stay.
    pub fn clear_all_pending(&mut self) {
        self.ledgers.clear();
    }
}
