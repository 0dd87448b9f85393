use serde_json::Value;
use std::collections::BTreeMap;

use super::tree::{remove_from, write_into};
use crate::expression::UpdateTarget;
use crate::schema::{Chain, ContainerType, ElementKey, PathElement};

/// Updates and removals queued for one record, keyed by element keys.
///
/// A path is never pending in both maps. Entries below a pending update are
/// folded into that update's value, entries below a pending removal are
/// dropped as superseded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingLedger {
    updates: BTreeMap<Vec<ElementKey>, UpdateTarget>,
    removals: BTreeMap<Vec<ElementKey>, Chain>,
}

impl PendingLedger {
    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.removals.is_empty()
    }

    /// Pending updates in path order
    pub fn updates(&self) -> impl Iterator<Item = &UpdateTarget> {
        self.updates.values()
    }

    /// Pending removals in path order
    pub fn removals(&self) -> impl Iterator<Item = &Chain> {
        self.removals.values()
    }

    /// Whether an update is pending for `chain`
    pub fn has_update(&self, chain: &Chain) -> bool {
        self.updates.contains_key(&chain.keys())
    }

    /// Whether a removal is pending for `chain`
    pub fn has_removal(&self, chain: &Chain) -> bool {
        self.removals.contains_key(&chain.keys())
    }

    /// Queue a write of `value` at `chain`.
    pub fn schedule_update(&mut self, chain: Chain, value: Value) {
        let path = chain.keys();
        let _ = self.removals.remove(&path);
        self.evict_descendants(&chain);

        if let Some(ancestor) = self
            .updates
            .values_mut()
            .find(|pending| pending.chain.is_ancestor_of(&chain))
        {
            let (in_set, relative) = relative_to(&ancestor.chain, &chain);
            write_into(&mut ancestor.value, relative, value, in_set);
            return;
        }

        let _ = self.updates.insert(path, UpdateTarget::new(chain, value));
    }

    /// Queue a removal of `chain`.
    pub fn schedule_removal(&mut self, chain: Chain) {
        let path = chain.keys();
        let _ = self.updates.remove(&path);
        self.evict_descendants(&chain);

        if let Some(ancestor) = self
            .updates
            .values_mut()
            .find(|pending| pending.chain.is_ancestor_of(&chain))
        {
            let (in_set, relative) = relative_to(&ancestor.chain, &chain);
            remove_from(&mut ancestor.value, relative, in_set);
            return;
        }

        if self.removals.values().any(|pending| pending.is_ancestor_of(&chain)) {
            return;
        }

        let _ = self.removals.insert(path, chain);
    }

    /// Split into updates and removals, both in path order.
    pub fn into_parts(self) -> (Vec<UpdateTarget>, Vec<Chain>) {
        (
            self.updates.into_values().collect(),
            self.removals.into_values().collect(),
        )
    }

    /// Put back updates that failed to commit.
    pub(crate) fn requeue_updates(&mut self, targets: Vec<UpdateTarget>) {
        for target in targets {
            let path = target.chain.keys();
            if !self.removals.contains_key(&path) {
                let _ = self.updates.entry(path).or_insert(target);
            }
        }
    }

    /// Put back removals that failed to commit.
    pub(crate) fn requeue_removals(&mut self, chains: Vec<Chain>) {
        for chain in chains {
            let path = chain.keys();
            if !self.updates.contains_key(&path) {
                let _ = self.removals.entry(path).or_insert(chain);
            }
        }
    }

    fn evict_descendants(&mut self, chain: &Chain) {
        self.updates
            .retain(|_, pending| !chain.is_ancestor_of(&pending.chain));
        self.removals.retain(|_, pending| !chain.is_ancestor_of(pending));
    }
}

/// Elements of `chain` below `ancestor`, and whether the first one is a set member.
fn relative_to<'c>(ancestor: &Chain, chain: &'c Chain) -> (bool, &'c [PathElement]) {
    let in_set = ancestor
        .last()
        .map(|element| element.container() == ContainerType::Set)
        .unwrap_or(false);
    (in_set, &chain.elements()[ancestor.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chain(names: &[&str]) -> Chain {
        let last = names.len() - 1;
        Chain::new(
            names
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let container = if i == last {
                        ContainerType::Scalar
                    } else {
                        ContainerType::Map
                    };
                    PathElement::named(*name, container)
                })
                .collect(),
        )
    }

    #[test]
    fn test_update_and_removal_evict_each_other() {
        let mut ledger = PendingLedger::default();
        ledger.schedule_update(chain(&["profile", "name"]), json!("Alice"));
        ledger.schedule_removal(chain(&["profile", "name"]));
        assert!(!ledger.has_update(&chain(&["profile", "name"])));
        assert!(ledger.has_removal(&chain(&["profile", "name"])));

        ledger.schedule_update(chain(&["profile", "name"]), json!("Bob"));
        assert!(ledger.has_update(&chain(&["profile", "name"])));
        assert!(!ledger.has_removal(&chain(&["profile", "name"])));
    }

    #[test]
    fn test_removal_drops_descendant_updates() {
        let mut ledger = PendingLedger::default();
        ledger.schedule_update(chain(&["profile", "name"]), json!("Alice"));
        ledger.schedule_update(chain(&["profile", "age"]), json!(30));
        ledger.schedule_removal(chain(&["profile"]));

        assert_eq!(ledger.updates().count(), 0);
        assert_eq!(ledger.removals().count(), 1);
    }

    #[test]
    fn test_descendant_update_folds_into_pending_ancestor() {
        let mut ledger = PendingLedger::default();
        ledger.schedule_update(chain(&["profile"]), json!({"name": "Alice"}));
        ledger.schedule_update(chain(&["profile", "age"]), json!(30));
        ledger.schedule_removal(chain(&["profile", "name"]));

        let (updates, removals) = ledger.into_parts();
        assert!(removals.is_empty());
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].value, json!({"age": 30}));
    }

    #[test]
    fn test_removal_below_pending_removal_is_superseded() {
        let mut ledger = PendingLedger::default();
        ledger.schedule_removal(chain(&["profile"]));
        ledger.schedule_removal(chain(&["profile", "name"]));
        assert_eq!(ledger.removals().count(), 1);
    }

    #[test]
    fn test_requeue_keeps_newer_entries() {
        let mut ledger = PendingLedger::default();
        ledger.schedule_removal(chain(&["status"]));
        ledger.requeue_updates(vec![UpdateTarget::new(chain(&["status"]), json!(1))]);
        assert!(!ledger.has_update(&chain(&["status"])));
        assert!(ledger.has_removal(&chain(&["status"])));
    }

    #[test]
    fn test_map_keys_with_separators_do_not_collide() {
        let dotted = Chain::new(vec![
            PathElement::named("items", ContainerType::Map),
            PathElement::named("x.name", ContainerType::Map),
        ]);
        let nested = Chain::new(vec![
            PathElement::named("items", ContainerType::Map),
            PathElement::named("x", ContainerType::Map),
            PathElement::named("name", ContainerType::Scalar),
        ]);
        assert_eq!(dotted.joined_path(), nested.joined_path());

        let mut ledger = PendingLedger::default();
        ledger.schedule_update(dotted.clone(), json!({"name": "FIRST"}));
        ledger.schedule_update(nested.clone(), json!("SECOND"));

        assert!(ledger.has_update(&dotted));
        assert!(ledger.has_update(&nested));
        let (updates, _) = ledger.into_parts();
        assert_eq!(updates.len(), 2);
        assert!(updates.iter().any(|t| t.value == json!({"name": "FIRST"})));
        assert!(updates.iter().any(|t| t.value == json!("SECOND")));
    }
}
