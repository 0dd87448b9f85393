//! Write-behind caching.
//!
//! [`CachingTable`] answers reads from a [`CacheStore`] when it can and queues
//! writes in a [`PendingLedger`] until they are committed.

mod ledger;
mod store;
mod tree;

pub use ledger::PendingLedger;
pub use store::CacheStore;

use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::Error;
use crate::expression::navigate;
use crate::path::{ResolvedField, ResolvedTarget, Substitutions};
use crate::schema::Chain;
use crate::table::{read_value, FieldGetter, FieldRemover, FieldSetter, Table};
use crate::transport::{Record, Transport};

/// [`Table`] with a write-behind cache.
///
/// Reads consult the cache first and populate it on a miss, caching absence
/// too. Writes and removals land in the cache immediately and reach the store
/// on [`commit_operations`](Self::commit_operations) or
/// [`commit_all`](Self::commit_all).
#[derive(Debug)]
pub struct CachingTable<S> {
    table: Table<S>,
    store: CacheStore,
}

impl<S: Transport> CachingTable<S> {
    /// Wrap `table` with an empty cache.
    pub fn new(table: Table<S>) -> Self {
        let store = CacheStore::new(&table.settings().primary_key_name);
        Self { table, store }
    }

    /// Underlying table, bypassing the cache
    pub fn table(&self) -> &Table<S> {
        &self.table
    }

    /// Cache and pending operations
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Read one field, from the cache when possible.
    pub async fn get_field(
        &mut self,
        key: &str,
        path: &str,
        substitutions: &Substitutions,
    ) -> Result<Option<Value>, Error> {
        let target = self.table.resolve(path, substitutions)?;
        let fields = target.fields();

        let Some(raw) = self.read_through(key, &fields).await else {
            return Ok(None);
        };

        Ok(assemble(&target, &raw))
    }

    /// Read several named fields, fetching every miss with one store call.
    pub async fn get_multiple_fields(
        &mut self,
        key: &str,
        getters: &HashMap<String, FieldGetter>,
    ) -> Result<HashMap<String, Value>, Error> {
        let targets = getters
            .iter()
            .map(|(name, getter)| {
                self.table
                    .resolve(&getter.field_path, &getter.substitutions)
                    .map(|target| (name.clone(), target))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let fields: Vec<&ResolvedField> = targets.iter().flat_map(|(_, t)| t.fields()).collect();
        let Some(raw) = self.read_through(key, &fields).await else {
            return Ok(HashMap::new());
        };

        let mut values = HashMap::with_capacity(targets.len());
        let mut offset = 0;
        for (name, target) in &targets {
            let count = target.fields().len();
            if let Some(value) = assemble(target, &raw[offset..offset + count]) {
                let _ = values.insert(name.clone(), value);
            }
            offset += count;
        }
        Ok(values)
    }

    /// Queue a write. The cache reflects it at once.
    pub fn update_field(
        &mut self,
        key: &str,
        path: &str,
        substitutions: &Substitutions,
        value: Value,
    ) -> Result<(), Error> {
        for target in self.table.prepare_update(path, substitutions, value)? {
            self.store.schedule_update(key, target.chain, target.value);
        }
        Ok(())
    }

    /// Queue several writes; none is queued unless all resolve and validate.
    pub fn update_multiple_fields(&mut self, key: &str, setters: Vec<FieldSetter>) -> Result<(), Error> {
        let mut targets = Vec::with_capacity(setters.len());
        for setter in setters {
            targets.extend(self.table.prepare_update(
                &setter.field_path,
                &setter.substitutions,
                setter.value_to_set,
            )?);
        }

        for target in targets {
            self.store.schedule_update(key, target.chain, target.value);
        }
        Ok(())
    }

    /// Queue a removal. The cache records the field as absent at once.
    pub fn remove_field(&mut self, key: &str, path: &str, substitutions: &Substitutions) -> Result<(), Error> {
        for chain in self.table.prepare_removal(path, substitutions)? {
            self.store.schedule_removal(key, chain);
        }
        Ok(())
    }

    /// Queue several removals.
    pub fn remove_multiple_fields(&mut self, key: &str, removers: Vec<FieldRemover>) -> Result<(), Error> {
        let mut chains = Vec::with_capacity(removers.len());
        for remover in removers {
            chains.extend(self.table.prepare_removal(&remover.field_path, &remover.substitutions)?);
        }

        for chain in chains {
            self.store.schedule_removal(key, chain);
        }
        Ok(())
    }

    /// Send the pending operations of `key`.
    ///
    /// Removals go first, then updates. A ledger is emptied only when its
    /// batches all succeeded; otherwise its entries are queued again. The
    /// cache is never rolled back.
    pub async fn commit_operations(&mut self, key: &str) -> Result<bool, Error> {
        let Some(ledger) = self.store.take_pending(key) else {
            return Ok(true);
        };
        let (updates, removals) = ledger.into_parts();
        debug!(key, updates = updates.len(), removals = removals.len(), "committing");

        let removed = if removals.is_empty() {
            Ok(true)
        } else {
            self.table.apply_removal(key, removals.clone()).await
        };
        let removals_committed = matches!(removed, Ok(true));

        let updated = if updates.is_empty() {
            Ok(true)
        } else {
            self.table.apply_update(key, updates.clone()).await
        };
        let updates_committed = matches!(updated, Ok(true));

        let requeued_removals = if removals_committed { Vec::new() } else { removals };
        let requeued_updates = if updates_committed { Vec::new() } else { updates };
        if !requeued_removals.is_empty() || !requeued_updates.is_empty() {
            warn!(
                key,
                updates = requeued_updates.len(),
                removals = requeued_removals.len(),
                "commit incomplete, operations queued again"
            );
            self.store.requeue(key, requeued_updates, requeued_removals);
        }

        let removed = removed?;
        let updated = updated?;
        Ok(removed && updated)
    }

    /// Commit every key with pending operations.
    ///
    /// Every key is attempted; the first error is returned after all ran.
    pub async fn commit_all(&mut self) -> Result<bool, Error> {
        let mut committed = true;
        let mut first_error = None;

        for key in self.store.pending_keys() {
            match self.commit_operations(&key).await {
                Ok(success) => committed &= success,
                Err(error) => {
                    warn!(key, %error, "commit failed");
                    committed = false;
                    let _ = first_error.get_or_insert(error);
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(committed),
        }
    }

    /// Drop cached values of `key`, pending operations stay.
    pub fn clear_cached_data(&mut self, key: &str) {
        self.store.clear(key);
    }

    /// Drop every cached value, pending operations stay.
    pub fn clear_all_cached_data(&mut self) {
        self.store.clear_all();
    }

    /// Drop pending operations of `key`, cached values stay.
    pub fn clear_pending_operations(&mut self, key: &str) {
        self.store.clear_pending(key);
    }

    /// Drop every pending operation, cached values stay.
    pub fn clear_all_pending_operations(&mut self) {
        self.store.clear_all_pending();
    }

    /// Replace a whole record and cache it.
    pub async fn put_record(&mut self, record: Record) -> Result<bool, Error> {
        let key = record
            .get(&self.table.settings().primary_key_name)
            .map(|value| match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            });

        let written = self.table.put_record(record.clone()).await?;
        if let (true, Some(key)) = (written, key) {
            self.store.put_record(&key, record);
        }
        Ok(written)
    }

    /// Delete a whole record, evicting its cache entry and pending operations.
    pub async fn delete_record(&mut self, key: &str) -> Result<bool, Error> {
        let deleted = self.table.delete_record(key).await?;
        if deleted {
            self.store.clear(key);
            self.store.clear_pending(key);
        }
        Ok(deleted)
    }

    /// Raw values of `fields`, in order, fetching misses with one read.
    ///
    /// `None` when the read failed; nothing is cached then.
    async fn read_through(&mut self, key: &str, fields: &[&ResolvedField]) -> Option<Vec<(ResolvedField, Value)>> {
        let mut values: Vec<(ResolvedField, Option<Value>)> = fields
            .iter()
            .map(|field| {
                let (found, value) = self.store.get(key, &field.chain);
                ((*field).clone(), found.then_some(value))
            })
            .collect();

        let missing: Vec<&Chain> = values
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(field, _)| &field.chain)
            .collect();

        if !missing.is_empty() {
            let record = self.table.fetch(key, &missing).await?;
            for (field, value) in values.iter_mut().filter(|(_, value)| value.is_none()) {
                let raw = navigate(&record, &field.chain).unwrap_or(Value::Null);
                self.store.put(key, &field.chain, raw.clone());
                *value = Some(raw);
            }
        }

        Some(
            values
                .into_iter()
                .map(|(field, value)| (field, value.unwrap_or(Value::Null)))
                .collect(),
        )
    }
}

/// Build a result from raw values in [`ResolvedTarget::fields`] order.
fn assemble(target: &ResolvedTarget, raw: &[(ResolvedField, Value)]) -> Option<Value> {
    let present = |field: &ResolvedField, value: &Value| {
        let value = (!value.is_null()).then(|| value.clone());
        read_value(&field.handle, &field.chain, value)
    };

    match target {
        ResolvedTarget::Single(_) => raw.first().and_then(|(field, value)| present(field, value)),
        ResolvedTarget::Multi(members) => {
            let found: Map<String, Value> = members
                .iter()
                .zip(raw)
                .filter_map(|((name, _), (field, value))| {
                    present(field, value).map(|value| (name.clone(), value))
                })
                .collect();
            (!found.is_empty()).then_some(Value::Object(found))
        }
    }
}
