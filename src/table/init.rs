use futures_util::future::{BoxFuture, FutureExt};
use futures_util::{StreamExt, TryStreamExt};
use serde_json::Value;
use tokio_stream::{self as stream};
use tracing::debug;

use super::Table;
use crate::error::Error;
use crate::expression::{navigate, UpdateTarget};
use crate::schema::Chain;
use crate::transport::{PrimaryKey, StoreRequest, Transport};

/// One prefix to create, with the prefixes below it.
#[derive(Debug)]
struct InitNode {
    chain: Chain,
    /// Value the caller asked for when this prefix is itself a write target
    requested: Option<Value>,
    /// Created earlier during the same write
    existing: bool,
    children: Vec<InitNode>,
}

impl InitNode {
    fn collect_chains(&self, into: &mut Vec<Chain>) {
        into.push(self.chain.clone());
        for child in &self.children {
            child.collect_chains(into);
        }
    }
}

/// Merge every prefix of every target into one tree, sharing common prefixes.
///
/// Prefixes in `existing` are not sent again unless they are write targets.
fn build_tree(targets: Vec<(Chain, Option<Value>)>, existing: &[Chain]) -> Vec<InitNode> {
    let mut roots: Vec<InitNode> = Vec::new();

    for (chain, mut requested) in targets {
        let mut level = &mut roots;

        for depth in 1..=chain.len() {
            let prefix = chain.prefix(depth);
            let position = match level.iter().position(|node| node.chain.same_location(&prefix)) {
                Some(position) => position,
                None => {
                    let known = existing.iter().any(|chain| chain.same_location(&prefix));
                    level.push(InitNode {
                        chain: prefix,
                        requested: None,
                        existing: known,
                        children: Vec::new(),
                    });
                    level.len() - 1
                }
            };

            let node = &mut level[position];
            if depth == chain.len() && requested.is_some() {
                node.requested = requested.take();
            }
            level = &mut node.children;
        }
    }

    roots
}

/// Creates missing ancestors of failed writes.
///
/// Each prefix is written with "set if absent" and its declared default, or
/// with the requested value when the prefix is a write target. Siblings run
/// concurrently; children start only once their parent's call returned.
///
/// Both entry points return every prefix known to exist afterwards, so that
/// later batches of the same write can skip them.
pub(crate) struct AutoInitializer<'a, S> {
    table: &'a Table<S>,
    key: &'a PrimaryKey,
}

impl<'a, S: Transport> AutoInitializer<'a, S> {
    pub(crate) fn new(table: &'a Table<S>, key: &'a PrimaryKey) -> Self {
        Self { table, key }
    }

    /// Create the ancestors of `targets` and write the targets themselves.
    pub(crate) async fn initialize_updates(
        &self,
        targets: Vec<UpdateTarget>,
        existing: &[Chain],
    ) -> Result<Vec<Chain>, Error> {
        let tree = build_tree(
            targets
                .into_iter()
                .map(|target| (target.chain, Some(target.value)))
                .collect(),
            existing,
        );
        self.run_tree(tree).await
    }

    /// Create `chains` and their ancestors with their defaults.
    pub(crate) async fn initialize_ancestors(&self, chains: Vec<Chain>, existing: &[Chain]) -> Result<Vec<Chain>, Error> {
        let tree = build_tree(chains.into_iter().map(|chain| (chain, None)).collect(), existing);
        self.run_tree(tree).await
    }

    async fn run_tree(&self, tree: Vec<InitNode>) -> Result<Vec<Chain>, Error> {
        self.run_level(&tree).await?;

        let mut created = Vec::new();
        for node in &tree {
            node.collect_chains(&mut created);
        }
        Ok(created)
    }

    fn run_level<'b>(&'b self, nodes: &'b [InitNode]) -> BoxFuture<'b, Result<(), Error>> {
        async move {
            if nodes.is_empty() {
                return Ok(());
            }

            let pending: Vec<BoxFuture<'b, Result<(), Error>>> =
                nodes.iter().map(|node| self.run_node(node).boxed()).collect();

            stream::iter(pending)
                .buffer_unordered(nodes.len())
                .try_collect::<Vec<()>>()
                .await
                .map(|_| ())
        }
        .boxed()
    }

    async fn run_node(&self, node: &InitNode) -> Result<(), Error> {
        if node.existing && node.requested.is_none() {
            return self.run_level(&node.children).await;
        }

        let value = match &node.requested {
            Some(value) => value.clone(),
            None => node
                .chain
                .last()
                .map(|element| element.default_value())
                .unwrap_or(Value::Null),
        };

        debug!(key = %self.key.value, path = %node.chain, "initialising if absent");
        let batch = self.table.builder.build_initialize(&node.chain, value);
        self.send(&node.chain, batch).await?;

        if let Some(requested) = &node.requested {
            self.recheck(&node.chain, requested).await?;
        }

        self.run_level(&node.children).await
    }

    /// Overwrite the leaf when it already held another value.
    ///
    /// "Set if absent" keeps whatever a concurrent writer stored first; the
    /// caller's write must still win.
    async fn recheck(&self, chain: &Chain, requested: &Value) -> Result<(), Error> {
        let request = StoreRequest::GetItem {
            table: self.table.settings.table_name.clone(),
            key: self.key.clone(),
            projection: Some(self.table.builder.build_projection([chain])),
        };

        let stored = self
            .table
            .execute(request)
            .await
            .map_err(|source| Error::InitializationFailed {
                path: chain.joined_path(),
                source,
            })?
            .into_record()
            .and_then(|record| navigate(&record, chain));

        if stored.as_ref() == Some(requested) {
            return Ok(());
        }

        debug!(key = %self.key.value, path = %chain, "leaf holds another value, overwriting");
        let (batch, _) = self
            .table
            .builder
            .build_update(vec![UpdateTarget::new(chain.clone(), requested.clone())]);
        self.send(chain, batch).await
    }

    async fn send(&self, chain: &Chain, batch: crate::expression::WriteBatch) -> Result<(), Error> {
        let request = StoreRequest::UpdateItem {
            table: self.table.settings.table_name.clone(),
            key: self.key.clone(),
            batch,
            return_old: false,
        };

        self.table
            .execute(request)
            .await
            .map(|_| ())
            .map_err(|source| Error::InitializationFailed {
                path: chain.joined_path(),
                source,
            })
    }
}
