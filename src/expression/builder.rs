use serde_json::Value;
use std::collections::HashMap;

use crate::schema::{Chain, ContainerType, ElementKey};

/// Hard limit of the store on the size of one update expression, in bytes.
pub const EXPRESSION_SIZE_CEILING: usize = 4000;

/// A value to write at a location.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateTarget {
    /// Where to write
    pub chain: Chain,
    /// What to write
    pub value: Value,
}

impl UpdateTarget {
    /// Pair a chain with a value.
    pub fn new(chain: Chain, value: Value) -> Self {
        Self { chain, value }
    }
}

/// One wire level update or removal request body.
///
/// For every batch actually sent, `expression` plus `alias_table` stay under
/// the builder's ceiling unless the batch holds a single oversized chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    /// `#alias -> attribute name`
    pub alias_table: HashMap<String, String>,
    /// `SET ...` or `REMOVE ...` expression
    pub expression: String,
    /// `:placeholder -> value`, empty for removals
    pub value_table: HashMap<String, Value>,
    /// Chains addressed by this batch, in expression order
    pub consumed_chains: Vec<Chain>,
}

impl WriteBatch {
    /// Whether the batch addresses nothing
    pub fn is_empty(&self) -> bool {
        self.consumed_chains.is_empty()
    }

    /// Serialized size counted against the ceiling.
    pub fn size(&self) -> usize {
        self.expression.len() + alias_bytes(self.alias_table.iter())
    }

    /// Targets of an update batch, chains paired back with their values.
    pub fn update_targets(&self) -> Vec<UpdateTarget> {
        self.consumed_chains
            .iter()
            .enumerate()
            .filter_map(|(i, chain)| {
                self.value_table
                    .get(&value_placeholder(i))
                    .map(|value| UpdateTarget::new(chain.clone(), value.clone()))
            })
            .collect()
    }

    fn push_clause(&mut self, keyword: &str, clause: &str) {
        if self.expression.is_empty() {
            self.expression.push_str(keyword);
            self.expression.push(' ');
        } else {
            self.expression.push_str(", ");
        }
        self.expression.push_str(clause);
    }

    fn size_with(&self, keyword: &str, clause: &str, aliases: &[(String, String)]) -> usize {
        let separator = if self.expression.is_empty() {
            keyword.len() + 1
        } else {
            2
        };
        self.size()
            + separator
            + clause.len()
            + alias_bytes(aliases.iter().map(|(alias, name)| (alias, name)))
    }
}

/// Projection expression for reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    /// `#alias -> attribute name`
    pub alias_table: HashMap<String, String>,
    /// Comma separated document paths
    pub expression: String,
}

/// Pure synthesis of update, removal and projection expressions.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionBuilder {
    ceiling: usize,
}

impl Default for ExpressionBuilder {
    fn default() -> Self {
        Self {
            ceiling: EXPRESSION_SIZE_CEILING,
        }
    }
}

impl ExpressionBuilder {
    /// Builder with a custom size ceiling.
    pub fn with_ceiling(ceiling: usize) -> Self {
        Self { ceiling }
    }

    /// Size ceiling in bytes
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Build one `SET` batch, greedily taking targets while they fit.
    ///
    /// Returns the batch and the targets left for a continuation batch. The
    /// first target is always taken, so every call makes progress.
    pub fn build_update(&self, targets: Vec<UpdateTarget>) -> (WriteBatch, Vec<UpdateTarget>) {
        let mut batch = WriteBatch::default();
        let mut remaining = Vec::new();
        let mut targets = targets.into_iter();
        let mut index = 0;

        while let Some(target) = targets.next() {
            let (path, aliases) = render_path(&target.chain, index);
            let placeholder = value_placeholder(index);
            let clause = format!("{path} = {placeholder}");

            if !batch.is_empty() && batch.size_with("SET", &clause, &aliases) >= self.ceiling {
                remaining.push(target);
                remaining.extend(targets);
                break;
            }

            batch.push_clause("SET", &clause);
            batch.alias_table.extend(aliases);
            let _ = batch.value_table.insert(placeholder, target.value);
            batch.consumed_chains.push(target.chain);
            index += 1;
        }

        (batch, remaining)
    }

    /// Build every batch needed for `targets`, continuation batches last.
    pub fn build_update_batches(&self, targets: Vec<UpdateTarget>) -> Vec<WriteBatch> {
        if targets.is_empty() {
            return Vec::new();
        }

        let (batch, remaining) = self.build_update(targets);
        let mut batches = vec![batch];
        batches.extend(self.build_update_batches(remaining));
        batches
    }

    /// Build one `REMOVE` batch; see [`build_update`](Self::build_update).
    pub fn build_removal(&self, chains: Vec<Chain>) -> (WriteBatch, Vec<Chain>) {
        let mut batch = WriteBatch::default();
        let mut remaining = Vec::new();
        let mut chains = chains.into_iter();
        let mut index = 0;

        while let Some(chain) = chains.next() {
            let (path, aliases) = render_path(&chain, index);

            if !batch.is_empty() && batch.size_with("REMOVE", &path, &aliases) >= self.ceiling {
                remaining.push(chain);
                remaining.extend(chains);
                break;
            }

            batch.push_clause("REMOVE", &path);
            batch.alias_table.extend(aliases);
            batch.consumed_chains.push(chain);
            index += 1;
        }

        (batch, remaining)
    }

    /// Build every removal batch needed for `chains`.
    pub fn build_removal_batches(&self, chains: Vec<Chain>) -> Vec<WriteBatch> {
        if chains.is_empty() {
            return Vec::new();
        }

        let (batch, remaining) = self.build_removal(chains);
        let mut batches = vec![batch];
        batches.extend(self.build_removal_batches(remaining));
        batches
    }

    /// Build a "set if absent" batch for one chain.
    pub fn build_initialize(&self, chain: &Chain, value: Value) -> WriteBatch {
        let (path, aliases) = render_path(chain, 0);
        let placeholder = value_placeholder(0);

        let mut batch = WriteBatch::default();
        batch.push_clause("SET", &format!("{path} = if_not_exists({path}, {placeholder})"));
        batch.alias_table.extend(aliases);
        let _ = batch.value_table.insert(placeholder, value);
        batch.consumed_chains.push(chain.clone());
        batch
    }

    /// Build a projection reading every chain.
    ///
    /// Chains stop at a set element: set members cannot be addressed by the
    /// store and are resolved by [`navigate`](super::navigate) instead. The
    /// store rejects overlapping paths, so a chain already covered by another
    /// one is read through it.
    pub fn build_projection<'a>(&self, chains: impl IntoIterator<Item = &'a Chain>) -> Projection {
        let mut kept: Vec<Chain> = Vec::new();
        for chain in chains {
            let chain = projectable(chain);
            if kept
                .iter()
                .any(|other| other.same_location(&chain) || other.is_ancestor_of(&chain))
            {
                continue;
            }
            kept.retain(|other| !chain.is_ancestor_of(other));
            kept.push(chain);
        }

        let mut projection = Projection::default();
        let mut paths = Vec::with_capacity(kept.len());
        for (index, chain) in kept.iter().enumerate() {
            let (path, aliases) = render_path(chain, index);
            paths.push(path);
            projection.alias_table.extend(aliases);
        }

        projection.expression = paths.join(", ");
        projection
    }
}

/// Chain truncated after its first set element.
fn projectable(chain: &Chain) -> Chain {
    match chain
        .elements()
        .iter()
        .position(|element| element.container() == ContainerType::Set)
    {
        Some(position) => chain.prefix(position + 1),
        None => chain.clone(),
    }
}

/// Alias for segment `segment` of target `target`.
pub fn attribute_alias(target: usize, segment: usize) -> String {
    format!("#t{target}_p{segment}")
}

/// Value placeholder of target `target`.
pub fn value_placeholder(target: usize) -> String {
    format!(":t{target}")
}

/// Render a chain as a document path, aliasing every named segment.
///
/// List positions are rendered as literal `[n]` accessors because the store
/// does not accept placeholders for them.
fn render_path(chain: &Chain, target: usize) -> (String, Vec<(String, String)>) {
    let mut path = String::new();
    let mut aliases = Vec::with_capacity(chain.len());

    for (segment, element) in chain.elements().iter().enumerate() {
        match element.key() {
            ElementKey::Index(index) => path.push_str(&format!("[{index}]")),
            ElementKey::Name(name) => {
                let alias = attribute_alias(target, segment);
                if segment > 0 {
                    path.push('.');
                }
                path.push_str(&alias);
                aliases.push((alias, name.clone()));
            }
        }
    }

    (path, aliases)
}

fn alias_bytes<'a>(entries: impl Iterator<Item = (&'a String, &'a String)>) -> usize {
    entries.map(|(alias, name)| alias.len() + name.len()).sum()
}
