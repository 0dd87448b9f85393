//! Schema-aware table engine.
//!
//! [`Table`] resolves field paths against a [`FieldSchema`], validates values,
//! turns writes into size-bounded update batches and executes them through an
//! injected [`Transport`]. Writes that fail because an ancestor map is missing
//! are retried once through the auto-initialiser.

mod gsi;
mod init;
mod operations;
mod types;

pub use gsi::SecondaryIndexAdapter;
pub use types::{
    FieldGetter, FieldRemover, FieldSetter, IndexQuery, QueryMetadata, TableSettings,
};

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::PendingLedger;
use crate::error::{Error, TransportError};
use crate::expression::{ExpressionBuilder, UpdateTarget, WriteBatch};
use crate::path::{self, ResolvedField, ResolvedTarget, Substitutions};
use crate::schema::{Chain, ContainerType, FieldHandle, FieldSchema};
use crate::transport::{PrimaryKey, Record, StoreRequest, StoreResponse, Transport};
use init::AutoInitializer;

/// Field level access to one table.
///
/// Every operation awaits its store calls to completion; a `Table` never
/// does background work.
#[derive(Debug)]
pub struct Table<S> {
    transport: S,
    schema: FieldSchema,
    settings: TableSettings,
    builder: ExpressionBuilder,
}

/// Result of one batch once auto-initialisation had its chance.
#[derive(Debug)]
pub(crate) enum BatchOutcome {
    /// Applied, with the previous values when requested
    Applied(Option<Record>),
    /// Rejected by the store
    Failed,
}

impl BatchOutcome {
    pub(crate) fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

impl<S: Transport> Table<S> {
    /// Create a table over `transport`.
    pub fn new(transport: S, schema: FieldSchema, settings: TableSettings) -> Self {
        Self {
            transport,
            schema,
            builder: ExpressionBuilder::with_ceiling(settings.size_ceiling),
            settings,
        }
    }

    /// Declared fields
    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// Table settings
    pub fn settings(&self) -> &TableSettings {
        &self.settings
    }

    /// Underlying transport
    pub fn transport(&self) -> &S {
        &self.transport
    }

    /// Expression builder configured with this table's ceiling
    pub fn expression_builder(&self) -> &ExpressionBuilder {
        &self.builder
    }

    /// Resolve `path` against this table's schema.
    pub fn resolve(&self, path: &str, substitutions: &Substitutions) -> Result<ResolvedTarget, Error> {
        path::resolve(path, &self.schema, substitutions)
    }

    pub(crate) fn primary_key(&self, key: &str) -> PrimaryKey {
        PrimaryKey::new(&self.settings.primary_key_name, key)
    }

    pub(crate) async fn execute(&self, request: StoreRequest) -> Result<StoreResponse, TransportError> {
        self.transport.execute(request).await
    }

    fn update_request(&self, key: &PrimaryKey, batch: WriteBatch, return_old: bool) -> StoreRequest {
        StoreRequest::UpdateItem {
            table: self.settings.table_name.clone(),
            key: key.clone(),
            batch,
            return_old,
        }
    }

    /// Resolve a write and validate its values.
    ///
    /// A selector group takes an object keyed by member name; members missing
    /// from the object are left untouched. Nothing is written when any value
    /// is rejected.
    pub(crate) fn prepare_update(
        &self,
        path: &str,
        substitutions: &Substitutions,
        value: Value,
    ) -> Result<Vec<UpdateTarget>, Error> {
        match self.resolve(path, substitutions)? {
            ResolvedTarget::Single(field) => Ok(vec![validated_target(field, value)?]),
            ResolvedTarget::Multi(members) => {
                let Value::Object(mut values) = value else {
                    return Err(Error::InvalidPath {
                        path: path.to_string(),
                        reason: "a selector group takes an object keyed by member".to_string(),
                    });
                };

                if let Some(unknown) = values
                    .keys()
                    .find(|name| !members.iter().any(|(member, _)| member == *name))
                {
                    return Err(Error::UnknownField {
                        path: path.to_string(),
                        segment: unknown.clone(),
                    });
                }

                members
                    .into_iter()
                    .filter_map(|(name, field)| values.remove(&name).map(|value| (field, value)))
                    .map(|(field, value)| validated_target(field, value))
                    .collect()
            }
        }
    }

    /// Resolve a removal into the chains to remove.
    pub(crate) fn prepare_removal(
        &self,
        path: &str,
        substitutions: &Substitutions,
    ) -> Result<Vec<Chain>, Error> {
        let chains: Vec<Chain> = match self.resolve(path, substitutions)? {
            ResolvedTarget::Single(field) => vec![field.chain],
            ResolvedTarget::Multi(members) => members.into_iter().map(|(_, f)| f.chain).collect(),
        };

        for chain in &chains {
            ensure_writable(chain)?;
        }
        Ok(chains)
    }

    /// Read the raw values of `chains` with one projected read.
    ///
    /// Returns `None` when the store call failed. A missing record reads as
    /// an empty one.
    pub(crate) async fn fetch(&self, key: &str, chains: &[&Chain]) -> Option<Record> {
        let projection = self.builder.build_projection(chains.iter().copied());
        let request = StoreRequest::GetItem {
            table: self.settings.table_name.clone(),
            key: self.primary_key(key),
            projection: Some(projection),
        };

        match self.execute(request).await {
            Ok(response) => Some(response.into_record().unwrap_or_default()),
            Err(error) => {
                warn!(table = %self.settings.table_name, key, %error, "read failed");
                None
            }
        }
    }

    /// Send update targets, splitting them into batches under the ceiling.
    ///
    /// Overlapping targets are merged first, a later target winning over an
    /// earlier one. Batches run in order and stop at the first failure.
    pub(crate) async fn apply_update(&self, key: &str, targets: Vec<UpdateTarget>) -> Result<bool, Error> {
        let key = self.primary_key(key);
        let batches = self.builder.build_update_batches(coalesce_updates(targets));
        let total = batches.len();
        let mut initialized = Vec::new();

        for (position, batch) in batches.into_iter().enumerate() {
            debug!(
                table = %self.settings.table_name,
                key = %key.value,
                batch = position + 1,
                total,
                size = batch.size(),
                "sending update batch"
            );

            if !self
                .send_update(&key, batch, false, &mut initialized)
                .await?
                .is_applied()
            {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Send removals, splitting them into batches under the ceiling.
    ///
    /// Removals below another removal are dropped first.
    pub(crate) async fn apply_removal(&self, key: &str, chains: Vec<Chain>) -> Result<bool, Error> {
        let key = self.primary_key(key);
        let batches = self.builder.build_removal_batches(coalesce_removals(chains));
        let total = batches.len();
        let mut initialized = Vec::new();

        for (position, batch) in batches.into_iter().enumerate() {
            debug!(
                table = %self.settings.table_name,
                key = %key.value,
                batch = position + 1,
                total,
                size = batch.size(),
                "sending removal batch"
            );

            if !self
                .send_removal(&key, batch, false, &mut initialized)
                .await?
                .is_applied()
            {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Send one update batch, auto-initialising missing ancestors on demand.
    ///
    /// The initialiser writes the requested leaf values itself, so a batch
    /// that needed it is applied once it returns. `initialized` collects the
    /// prefixes created so far by the same write and is not sent again.
    pub(crate) async fn send_update(
        &self,
        key: &PrimaryKey,
        batch: WriteBatch,
        return_old: bool,
        initialized: &mut Vec<Chain>,
    ) -> Result<BatchOutcome, Error> {
        let targets = batch.update_targets();

        match self.execute(self.update_request(key, batch, return_old)).await {
            Ok(response) => Ok(BatchOutcome::Applied(response.into_record())),
            Err(error) if error.is_missing_path() => {
                debug!(key = %key.value, targets = targets.len(), "ancestor missing, initialising");
                let created = AutoInitializer::new(self, key)
                    .initialize_updates(targets, initialized)
                    .await?;
                initialized.extend(created);
                Ok(BatchOutcome::Applied(None))
            }
            Err(error) => {
                warn!(table = %self.settings.table_name, key = %key.value, %error, "update failed");
                Ok(BatchOutcome::Failed)
            }
        }
    }

    /// Send one removal batch; a missing ancestor is initialised and the
    /// removal retried once.
    pub(crate) async fn send_removal(
        &self,
        key: &PrimaryKey,
        batch: WriteBatch,
        return_old: bool,
        initialized: &mut Vec<Chain>,
    ) -> Result<BatchOutcome, Error> {
        let retry = batch.clone();
        let parents: Vec<Chain> = batch
            .consumed_chains
            .iter()
            .filter(|chain| chain.len() > 1)
            .map(|chain| chain.prefix(chain.len() - 1))
            .collect();

        let error = match self.execute(self.update_request(key, batch, return_old)).await {
            Ok(response) => return Ok(BatchOutcome::Applied(response.into_record())),
            Err(error) => error,
        };

        if !error.is_missing_path() || parents.is_empty() {
            warn!(table = %self.settings.table_name, key = %key.value, %error, "removal failed");
            return Ok(BatchOutcome::Failed);
        }

        debug!(key = %key.value, ancestors = parents.len(), "ancestor missing, initialising before removal");
        let created = AutoInitializer::new(self, key)
            .initialize_ancestors(parents, initialized)
            .await?;
        initialized.extend(created);

        match self.execute(self.update_request(key, retry, return_old)).await {
            Ok(response) => Ok(BatchOutcome::Applied(response.into_record())),
            Err(error) => {
                warn!(table = %self.settings.table_name, key = %key.value, %error, "removal retry failed");
                Ok(BatchOutcome::Failed)
            }
        }
    }
}

/// Merge overlapping targets; one request may not address a path twice.
fn coalesce_updates(targets: Vec<UpdateTarget>) -> Vec<UpdateTarget> {
    let mut merged = PendingLedger::default();
    for target in targets {
        merged.schedule_update(target.chain, target.value);
    }
    merged.into_parts().0
}

/// Drop removals covered by another removal.
fn coalesce_removals(chains: Vec<Chain>) -> Vec<Chain> {
    let mut merged = PendingLedger::default();
    for chain in chains {
        merged.schedule_removal(chain);
    }
    merged.into_parts().1
}

/// Run a raw stored value through the field's read validation.
pub(crate) fn read_value(handle: &FieldHandle, chain: &Chain, raw: Option<Value>) -> Option<Value> {
    let (value, valid) = handle.validate_on_read(raw?);
    if !valid {
        warn!(path = %chain, "stored value rejected by validation");
        return None;
    }
    Some(value)
}

fn validated_target(field: ResolvedField, value: Value) -> Result<UpdateTarget, Error> {
    ensure_writable(&field.chain)?;

    let (value, valid) = field.handle.validate_on_write(value);
    if !valid {
        return Err(Error::Validation {
            path: field.chain.joined_path(),
        });
    }
    Ok(UpdateTarget::new(field.chain, value))
}

/// Set members are read through their set, never written one by one.
pub(crate) fn ensure_writable(chain: &Chain) -> Result<(), Error> {
    let inner = &chain.elements()[..chain.len().saturating_sub(1)];
    if inner.iter().any(|e| e.container() == ContainerType::Set) {
        return Err(Error::InvalidPath {
            path: chain.joined_path(),
            reason: "set members cannot be written individually".to_string(),
        });
    }
    Ok(())
}
