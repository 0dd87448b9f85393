use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::warn;

use super::{
    read_value, BatchOutcome, FieldGetter, FieldRemover, FieldSetter, IndexQuery, QueryMetadata,
    SecondaryIndexAdapter, Table,
};
use crate::error::Error;
use crate::expression::navigate;
use crate::path::{ResolvedField, ResolvedTarget, Substitutions};
use crate::schema::{Chain, PathElement};
use crate::transport::{Record, StoreRequest, Transport};

impl<S: Transport> Table<S> {
    /// Read one field.
    ///
    /// For a selector group the result is an object holding the members that
    /// exist. `None` when nothing exists, the stored value fails validation or
    /// the store call failed.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use dynamo_fields::{FieldNode, FieldSchema, Substitutions, Table, TableSettings};
    /// use serde_json::json;
    ///
    /// # async fn example(transport: dynamo_fields::DynamoDbTransport) -> Result<(), dynamo_fields::Error> {
    /// let schema = FieldSchema::builder()
    ///     .field(FieldNode::map(
    ///         "profile",
    ///         FieldSchema::builder().field(FieldNode::scalar("name")).build()?,
    ///     ))
    ///     .build()?;
    /// let table = Table::new(transport, schema, TableSettings::new("accounts", "accountId"));
    ///
    /// let name = table.get_field("acct1", "profile.name", &Substitutions::new()).await?;
    /// assert_eq!(name, Some(json!("Alice")));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get_field(
        &self,
        key: &str,
        path: &str,
        substitutions: &Substitutions,
    ) -> Result<Option<Value>, Error> {
        let target = self.resolve(path, substitutions)?;
        let chains: Vec<&Chain> = target.fields().into_iter().map(|f| &f.chain).collect();

        let Some(record) = self.fetch(key, &chains).await else {
            return Ok(None);
        };

        Ok(extract(&target, &record))
    }

    /// Read several named fields with one store call.
    ///
    /// Every getter is resolved before anything is read. Missing fields are
    /// left out of the result.
    pub async fn get_multiple_fields(
        &self,
        key: &str,
        getters: &HashMap<String, FieldGetter>,
    ) -> Result<HashMap<String, Value>, Error> {
        let targets = getters
            .iter()
            .map(|(name, getter)| {
                self.resolve(&getter.field_path, &getter.substitutions)
                    .map(|target| (name, target))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let chains: Vec<&Chain> = targets
            .iter()
            .flat_map(|(_, target)| target.fields())
            .map(|field| &field.chain)
            .collect();

        let Some(record) = self.fetch(key, &chains).await else {
            return Ok(HashMap::new());
        };

        Ok(targets
            .iter()
            .filter_map(|(name, target)| extract(target, &record).map(|v| ((*name).clone(), v)))
            .collect())
    }

    /// Write one field, creating missing ancestors.
    ///
    /// A selector group takes an object keyed by member. Returns `false` when
    /// the store rejected the write.
    pub async fn update_field(
        &self,
        key: &str,
        path: &str,
        substitutions: &Substitutions,
        value: Value,
    ) -> Result<bool, Error> {
        let targets = self.prepare_update(path, substitutions, value)?;
        self.apply_update(key, targets).await
    }

    /// Write several fields in as few calls as the size ceiling allows.
    ///
    /// Nothing is written unless every setter resolves and validates.
    pub async fn update_multiple_fields(&self, key: &str, setters: Vec<FieldSetter>) -> Result<bool, Error> {
        let mut targets = Vec::with_capacity(setters.len());
        for setter in setters {
            targets.extend(self.prepare_update(
                &setter.field_path,
                &setter.substitutions,
                setter.value_to_set,
            )?);
        }
        self.apply_update(key, targets).await
    }

    /// Write one field and return `(success, previous value)`.
    pub async fn update_field_return_old(
        &self,
        key: &str,
        path: &str,
        substitutions: &Substitutions,
        value: Value,
    ) -> Result<(bool, Option<Value>), Error> {
        let field = self.resolve_single_field(path, substitutions)?;
        let targets = self.prepare_update(path, substitutions, value)?;
        let (batch, _) = self.builder.build_update(targets);

        let outcome = self
            .send_update(&self.primary_key(key), batch, true, &mut Vec::new())
            .await?;
        Ok(match outcome {
            BatchOutcome::Applied(old) => (true, previous(&field, old)),
            BatchOutcome::Failed => (false, None),
        })
    }

    /// Remove one field, or every member of a selector group.
    pub async fn remove_field(&self, key: &str, path: &str, substitutions: &Substitutions) -> Result<bool, Error> {
        let chains = self.prepare_removal(path, substitutions)?;
        self.apply_removal(key, chains).await
    }

    /// Remove several fields.
    pub async fn remove_multiple_fields(&self, key: &str, removers: Vec<FieldRemover>) -> Result<bool, Error> {
        let mut chains = Vec::with_capacity(removers.len());
        for remover in removers {
            chains.extend(self.prepare_removal(&remover.field_path, &remover.substitutions)?);
        }
        self.apply_removal(key, chains).await
    }

    /// Remove one field and return the value it held.
    pub async fn delete_field(
        &self,
        key: &str,
        path: &str,
        substitutions: &Substitutions,
    ) -> Result<Option<Value>, Error> {
        let field = self.resolve_single_field(path, substitutions)?;
        let (batch, _) = self.builder.build_removal(self.prepare_removal(path, substitutions)?);

        match self
            .send_removal(&self.primary_key(key), batch, true, &mut Vec::new())
            .await?
        {
            BatchOutcome::Applied(old) => Ok(previous(&field, old)),
            BatchOutcome::Failed => Ok(None),
        }
    }

    /// Replace a whole record.
    ///
    /// Every attribute other than the primary key must be declared and pass
    /// write validation.
    pub async fn put_record(&self, record: Record) -> Result<bool, Error> {
        let primary_key_name = &self.settings.primary_key_name;
        if !record.contains_key(primary_key_name) {
            return Err(Error::InvalidPath {
                path: primary_key_name.clone(),
                reason: "record has no primary key".to_string(),
            });
        }

        let mut item = Map::with_capacity(record.len());
        for (name, value) in record {
            if name == *primary_key_name {
                let _ = item.insert(name, value);
                continue;
            }

            let field = self.schema.field(&name).ok_or_else(|| Error::UnknownField {
                path: name.clone(),
                segment: name.clone(),
            })?;
            let (value, valid) = field.handle().validate_on_write(value);
            if !valid {
                return Err(Error::Validation { path: name });
            }
            let _ = item.insert(name, value);
        }

        let request = StoreRequest::PutItem {
            table: self.settings.table_name.clone(),
            item,
        };
        match self.execute(request).await {
            Ok(_) => Ok(true),
            Err(error) => {
                warn!(table = %self.settings.table_name, %error, "put failed");
                Ok(false)
            }
        }
    }

    /// Read a whole record; attributes failing read validation are dropped.
    pub async fn get_record(&self, key: &str) -> Result<Option<Record>, Error> {
        let request = StoreRequest::GetItem {
            table: self.settings.table_name.clone(),
            key: self.primary_key(key),
            projection: None,
        };

        let record = match self.execute(request).await {
            Ok(response) => response.into_record(),
            Err(error) => {
                warn!(table = %self.settings.table_name, key, %error, "read failed");
                None
            }
        };

        Ok(record.map(|record| {
            record
                .into_iter()
                .filter_map(|(name, value)| match self.schema.field(&name) {
                    Some(field) => {
                        let chain = Chain::new(vec![PathElement::named(
                            name.clone(),
                            field.container(),
                        )]);
                        read_value(field.handle(), &chain, Some(value)).map(|v| (name, v))
                    }
                    None => Some((name, value)),
                })
                .collect()
        }))
    }

    /// Delete a whole record.
    pub async fn delete_record(&self, key: &str) -> Result<bool, Error> {
        let request = StoreRequest::DeleteItem {
            table: self.settings.table_name.clone(),
            key: self.primary_key(key),
        };

        match self.execute(request).await {
            Ok(_) => Ok(true),
            Err(error) => {
                warn!(table = %self.settings.table_name, key, %error, "delete failed");
                Ok(false)
            }
        }
    }

    /// Read one field from every record matching a secondary index query.
    ///
    /// Results are keyed by primary key value; `None` when nothing matched.
    pub async fn query_field(
        &self,
        query: IndexQuery,
        path: &str,
        substitutions: &Substitutions,
    ) -> Result<(Option<HashMap<String, Value>>, QueryMetadata), Error> {
        let target = self.resolve(path, substitutions)?;
        let chains: Vec<Chain> = target.fields().into_iter().map(|f| f.chain.clone()).collect();

        let (rows, metadata) = match SecondaryIndexAdapter::new(self).query(query, &chains).await {
            Ok(result) => result,
            Err(error) => {
                warn!(table = %self.settings.table_name, %error, "index query failed");
                return Ok((None, QueryMetadata::default()));
            }
        };

        let values = rows.map(|rows| {
            rows.into_iter()
                .filter_map(|(key, row)| extract(&target, &row).map(|value| (key, value)))
                .collect()
        });

        Ok((values, metadata))
    }

    fn resolve_single_field(&self, path: &str, substitutions: &Substitutions) -> Result<ResolvedField, Error> {
        crate::path::resolve_single(path, &self.schema, substitutions)
    }
}

/// Values `target` addresses in `record`, read validated.
fn extract(target: &ResolvedTarget, record: &Record) -> Option<Value> {
    match target {
        ResolvedTarget::Single(field) => {
            read_value(&field.handle, &field.chain, navigate(record, &field.chain))
        }
        ResolvedTarget::Multi(members) => {
            let found: Map<String, Value> = members
                .iter()
                .filter_map(|(name, field)| {
                    read_value(&field.handle, &field.chain, navigate(record, &field.chain))
                        .map(|value| (name.clone(), value))
                })
                .collect();
            (!found.is_empty()).then_some(Value::Object(found))
        }
    }
}

fn previous(field: &ResolvedField, old: Option<Record>) -> Option<Value> {
    let old = old?;
    read_value(&field.handle, &field.chain, navigate(&old, &field.chain))
}
