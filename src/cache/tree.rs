//! Edits of nested values addressed by path elements.
//!
//! `in_set` tells that the first element is a member of the set held by
//! `target`; sets are kept as flat arrays of their members.

use serde_json::{Map, Value};

use crate::schema::{ContainerType, ElementKey, PathElement};

/// Value at `elements` below `target`, `Null` when absent.
pub(crate) fn read_from(target: &Value, elements: &[PathElement], in_set: bool) -> Value {
    let Some((element, rest)) = elements.split_first() else {
        return target.clone();
    };

    if in_set {
        let member = element.key().to_string();
        return match target {
            Value::Array(items) if items.iter().any(|item| is_member(item, &member)) => {
                Value::String(member)
            }
            _ => Value::Null,
        };
    }

    let child = match (target, element.key()) {
        (Value::Object(map), ElementKey::Name(name)) => map.get(name),
        (Value::Array(items), ElementKey::Index(index)) => items.get(*index),
        _ => None,
    };

    match child {
        Some(child) => read_from(child, rest, element.container() == ContainerType::Set),
        None => Value::Null,
    }
}

/// Write `value` at `elements` below `target`, creating maps and padding lists.
pub(crate) fn write_into(target: &mut Value, elements: &[PathElement], value: Value, in_set: bool) {
    let Some((element, rest)) = elements.split_first() else {
        *target = value;
        return;
    };

    if in_set {
        edit_member(target, element.key().to_string(), !value.is_null());
        return;
    }

    let child = match element.key() {
        ElementKey::Name(name) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            let Value::Object(map) = target else {
                return;
            };
            map.entry(name.clone()).or_insert(Value::Null)
        }
        ElementKey::Index(index) => {
            if !target.is_array() {
                *target = Value::Array(Vec::new());
            }
            let Value::Array(items) = target else {
                return;
            };
            if items.len() <= *index {
                items.resize(*index + 1, Value::Null);
            }
            &mut items[*index]
        }
    };

    write_into(child, rest, value, element.container() == ContainerType::Set)
}

/// Remove the value at `elements` below `target`. List items shift down.
pub(crate) fn remove_from(target: &mut Value, elements: &[PathElement], in_set: bool) {
    let Some((element, rest)) = elements.split_first() else {
        return;
    };

    if in_set {
        edit_member(target, element.key().to_string(), false);
        return;
    }

    if rest.is_empty() {
        match (target, element.key()) {
            (Value::Object(map), ElementKey::Name(name)) => {
                let _ = map.remove(name);
            }
            (Value::Array(items), ElementKey::Index(index)) if *index < items.len() => {
                let _ = items.remove(*index);
            }
            _ => {}
        }
        return;
    }

    let child = match (target, element.key()) {
        (Value::Object(map), ElementKey::Name(name)) => map.get_mut(name),
        (Value::Array(items), ElementKey::Index(index)) => items.get_mut(*index),
        _ => None,
    };

    if let Some(child) = child {
        remove_from(child, rest, element.container() == ContainerType::Set);
    }
}

fn edit_member(target: &mut Value, member: String, present: bool) {
    if !target.is_array() {
        if !present {
            return;
        }
        *target = Value::Array(Vec::new());
    }
    let Value::Array(items) = target else {
        return;
    };

    let position = items.iter().position(|item| is_member(item, &member));
    match (position, present) {
        (Some(position), false) => {
            let _ = items.remove(position);
        }
        (None, true) => items.push(Value::String(member)),
        _ => {}
    }
}

fn is_member(item: &Value, member: &str) -> bool {
    match item {
        Value::String(text) => text == member,
        other => other.to_string() == member,
    }
}
