use serde_json::{Map, Value};

use crate::schema::{Chain, ContainerType, ElementKey};

/// Read the value a chain addresses out of a fetched record.
///
/// Returns `None` as soon as an element is missing. A set element followed
/// by a member element is not descended into: the store keeps sets as flat
/// collections, so the member's own key is yielded when the set contains it.
pub fn navigate(record: &Map<String, Value>, chain: &Chain) -> Option<Value> {
    let elements = chain.elements();
    let (first, rest) = elements.split_first()?;

    let mut current = match first.key() {
        ElementKey::Name(name) => record.get(name)?,
        ElementKey::Index(_) => return None,
    };

    if first.container() == ContainerType::Set {
        return set_member(current, rest.first().map(|e| e.key()));
    }

    for (position, element) in rest.iter().enumerate() {
        current = match (current, element.key()) {
            (Value::Object(map), ElementKey::Name(name)) => map.get(name)?,
            (Value::Array(items), ElementKey::Index(index)) => items.get(*index)?,
            _ => return None,
        };

        if element.container() == ContainerType::Set {
            return set_member(current, rest.get(position + 1).map(|e| e.key()));
        }
    }

    Some(current.clone())
}

fn set_member(set: &Value, member: Option<&ElementKey>) -> Option<Value> {
    let Some(member) = member else {
        return Some(set.clone());
    };

    let wanted = member.to_string();
    let Value::Array(items) = set else {
        return None;
    };

    items
        .iter()
        .any(|item| match item {
            Value::String(text) => *text == wanted,
            other => other.to_string() == wanted,
        })
        .then(|| Value::String(wanted))
}
