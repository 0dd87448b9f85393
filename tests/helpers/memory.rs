/// In-memory store executing the update, removal and projection expressions
/// the crate sends, with DynamoDB's rules for missing document paths.
use dynamo_fields::{Record, StoreRequest, StoreResponse, Transport, TransportError};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Mutex;

type Matcher = Box<dyn Fn(&StoreRequest) -> bool + Send>;
type Action = Box<dyn FnOnce(&mut Tables) + Send>;

/// Table name -> primary key value -> record
pub type Tables = BTreeMap<String, BTreeMap<String, Record>>;

#[derive(Default)]
struct State {
    tables: Tables,
    requests: Vec<StoreRequest>,
    failures: Vec<(Matcher, TransportError)>,
    hooks: Vec<(Matcher, Action)>,
}

/// Store double recording every request
pub struct MemoryTransport {
    primary_key_name: String,
    state: Mutex<State>,
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("primary_key_name", &self.primary_key_name)
            .finish_non_exhaustive()
    }
}

#[allow(dead_code)]
impl MemoryTransport {
    pub fn new(primary_key_name: &str) -> Self {
        Self {
            primary_key_name: primary_key_name.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    /// Store a record directly, bypassing the request log
    pub fn seed(&self, table: &str, record: Value) {
        let Value::Object(record) = record else {
            panic!("seeded record must be an object");
        };
        let key = key_text(&record[&self.primary_key_name]);
        self.state
            .lock()
            .unwrap()
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(key, record);
    }

    /// Current content of a record
    pub fn record(&self, table: &str, key: &str) -> Option<Value> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .and_then(|records| records.get(key))
            .cloned()
            .map(Value::Object)
    }

    /// Every request executed so far
    pub fn requests(&self) -> Vec<StoreRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Number of requests executed so far
    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    /// Forget recorded requests
    pub fn reset_requests(&self) {
        self.state.lock().unwrap().requests.clear();
    }

    /// Update expressions sent so far, in order
    pub fn update_expressions(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter_map(|request| match request {
                StoreRequest::UpdateItem { batch, .. } => Some(batch.expression),
                _ => None,
            })
            .collect()
    }

    /// Update expressions with their aliases replaced by attribute names
    pub fn readable_update_expressions(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter_map(|request| match request {
                StoreRequest::UpdateItem { batch, .. } => {
                    let mut aliases: Vec<(&String, &String)> = batch.alias_table.iter().collect();
                    // Longest first so `#t1_p1` is not rewritten inside `#t1_p10`
                    aliases.sort_by_key(|(alias, _)| std::cmp::Reverse(alias.len()));
                    let mut expression = batch.expression.clone();
                    for (alias, name) in aliases {
                        expression = expression.replace(alias.as_str(), name);
                    }
                    Some(expression)
                }
                _ => None,
            })
            .collect()
    }

    /// Fail the first future request matching `matcher`
    pub fn fail_when(
        &self,
        matcher: impl Fn(&StoreRequest) -> bool + Send + 'static,
        error: TransportError,
    ) {
        self.state
            .lock()
            .unwrap()
            .failures
            .push((Box::new(matcher), error));
    }

    /// Mutate the stored tables right before the first request matching `matcher`
    pub fn before(
        &self,
        matcher: impl Fn(&StoreRequest) -> bool + Send + 'static,
        action: impl FnOnce(&mut Tables) + Send + 'static,
    ) {
        self.state
            .lock()
            .unwrap()
            .hooks
            .push((Box::new(matcher), Box::new(action)));
    }

    fn apply(&self, request: StoreRequest) -> Result<StoreResponse, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());

        if let Some(position) = state.hooks.iter().position(|(matcher, _)| matcher(&request)) {
            let (_, action) = state.hooks.remove(position);
            action(&mut state.tables);
        }

        if let Some(position) = state
            .failures
            .iter()
            .position(|(matcher, _)| matcher(&request))
        {
            let (_, error) = state.failures.remove(position);
            return Err(error);
        }

        match request {
            StoreRequest::GetItem {
                table,
                key,
                projection,
            } => {
                let record = state
                    .tables
                    .get(&table)
                    .and_then(|records| records.get(&key.value))
                    .cloned();
                let record = match (record, projection) {
                    (Some(record), Some(projection)) => {
                        Some(project(&record, &projection.expression, &projection.alias_table)?)
                    }
                    (record, _) => record,
                };
                Ok(StoreResponse::Item(record))
            }
            StoreRequest::PutItem { table, item } => {
                let key = key_text(&item[&self.primary_key_name]);
                state.tables.entry(table).or_default().insert(key, item);
                Ok(StoreResponse::Done)
            }
            StoreRequest::UpdateItem {
                table,
                key,
                batch,
                return_old,
            } => {
                let records = state.tables.entry(table).or_default();
                let current = records.get(&key.value).cloned().unwrap_or_else(|| {
                    let mut record = Map::new();
                    record.insert(key.name.clone(), Value::String(key.value.clone()));
                    record
                });

                let mut updated = Value::Object(current.clone());
                let touched = evaluate(
                    &mut updated,
                    &batch.expression,
                    &batch.alias_table,
                    &batch.value_table,
                )?;

                let Value::Object(updated) = updated else {
                    unreachable!("records stay objects")
                };
                records.insert(key.value.clone(), updated);

                let old = return_old.then(|| {
                    touched
                        .iter()
                        .filter_map(|name| current.get(name).map(|v| (name.clone(), v.clone())))
                        .collect::<Record>()
                });
                Ok(StoreResponse::Attributes(old.filter(|old| !old.is_empty())))
            }
            StoreRequest::DeleteItem { table, key } => {
                if let Some(records) = state.tables.get_mut(&table) {
                    records.remove(&key.value);
                }
                Ok(StoreResponse::Done)
            }
            StoreRequest::Query(query) => {
                let matching: Vec<(&String, &Record)> = state
                    .tables
                    .get(&query.table)
                    .map(|records| {
                        records
                            .iter()
                            .filter(|(_, record)| record.get(&query.key_name) == Some(&query.key_value))
                            .collect()
                    })
                    .unwrap_or_default();

                let start_after = query
                    .exclusive_start_key
                    .as_ref()
                    .and_then(|start| start.get(&self.primary_key_name))
                    .map(key_text);
                let remaining: Vec<(&String, &Record)> = matching
                    .into_iter()
                    .filter(|(key, _)| start_after.as_ref().map(|s| *key > s).unwrap_or(true))
                    .collect();

                let limit = query.limit.map(usize::from).unwrap_or(usize::MAX);
                let page: Vec<(&String, &Record)> = remaining.iter().take(limit).copied().collect();
                let last_evaluated_key = if remaining.len() > page.len() {
                    page.last().map(|(key, _)| {
                        let mut start = Map::new();
                        start.insert(self.primary_key_name.clone(), Value::String((*key).clone()));
                        start
                    })
                } else {
                    None
                };

                let rows = page
                    .iter()
                    .map(|(_, record)| {
                        project(record, &query.projection.expression, &query.projection.alias_table)
                    })
                    .collect::<Result<Vec<Record>, TransportError>>()?;

                Ok(StoreResponse::Rows {
                    count: rows.len(),
                    rows,
                    last_evaluated_key,
                })
            }
        }
    }
}

impl Transport for MemoryTransport {
    fn execute(
        &self,
        request: StoreRequest,
    ) -> impl Future<Output = Result<StoreResponse, TransportError>> + Send {
        let result = self.apply(request);
        async move {
            tokio::task::yield_now().await;
            result
        }
    }
}

fn key_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Name(String),
    Index(usize),
}

fn invalid_path() -> TransportError {
    TransportError::missing_path(
        "The document path provided in the update expression is invalid for update",
    )
}

/// Paths of one expression may neither repeat nor contain each other
fn reject_overlaps(paths: &[Vec<Step>]) -> Result<(), TransportError> {
    for (i, a) in paths.iter().enumerate() {
        for b in &paths[i + 1..] {
            let shared = a.len().min(b.len());
            if a[..shared] == b[..shared] {
                return Err(TransportError::service(
                    "Two document paths overlap with each other; must remove or rewrite one of these paths",
                ));
            }
        }
    }
    Ok(())
}

fn parse_path(text: &str, names: &HashMap<String, String>) -> Result<Vec<Step>, TransportError> {
    let mut steps = Vec::new();
    for part in text.trim().split('.') {
        let (head, mut rest) = match part.find('[') {
            Some(position) => part.split_at(position),
            None => (part, ""),
        };
        let name = names
            .get(head)
            .ok_or_else(|| TransportError::service(format!("unknown alias {head}")))?;
        steps.push(Step::Name(name.clone()));

        while let Some(open) = rest.strip_prefix('[') {
            let close = open
                .find(']')
                .ok_or_else(|| TransportError::service("unterminated index"))?;
            let index = open[..close]
                .parse()
                .map_err(|_| TransportError::service("bad index"))?;
            steps.push(Step::Index(index));
            rest = &open[close + 1..];
        }
    }
    Ok(steps)
}

fn get<'a>(root: &'a Value, steps: &[Step]) -> Option<&'a Value> {
    steps.iter().try_fold(root, |current, step| match (current, step) {
        (Value::Object(map), Step::Name(name)) => map.get(name),
        (Value::Array(items), Step::Index(index)) => items.get(*index),
        _ => None,
    })
}

fn parent_mut<'a>(root: &'a mut Value, steps: &[Step]) -> Option<&'a mut Value> {
    let mut current = root;
    for step in &steps[..steps.len() - 1] {
        current = match (current, step) {
            (Value::Object(map), Step::Name(name)) => map.get_mut(name)?,
            (Value::Array(items), Step::Index(index)) => items.get_mut(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

fn set(root: &mut Value, steps: &[Step], value: Value) -> Result<(), TransportError> {
    let parent = parent_mut(root, steps).ok_or_else(invalid_path)?;
    match (parent, &steps[steps.len() - 1]) {
        (Value::Object(map), Step::Name(name)) => {
            map.insert(name.clone(), value);
        }
        (Value::Array(items), Step::Index(index)) => {
            if *index < items.len() {
                items[*index] = value;
            } else {
                items.push(value);
            }
        }
        _ => return Err(invalid_path()),
    }
    Ok(())
}

fn remove(root: &mut Value, steps: &[Step]) -> Result<(), TransportError> {
    let parent = parent_mut(root, steps).ok_or_else(invalid_path)?;
    match (parent, &steps[steps.len() - 1]) {
        (Value::Object(map), Step::Name(name)) => {
            map.remove(name);
        }
        (Value::Array(items), Step::Index(index)) => {
            if *index < items.len() {
                items.remove(*index);
            }
        }
        _ => return Err(invalid_path()),
    }
    Ok(())
}

/// Split on commas outside parentheses
fn clauses(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0;
    let mut start = 0;
    for (position, character) in text.char_indices() {
        match character {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(text[start..position].trim());
                start = position + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts
}

/// Apply a SET or REMOVE expression; returns the touched top-level attributes
fn evaluate(
    record: &mut Value,
    expression: &str,
    names: &HashMap<String, String>,
    values: &HashMap<String, Value>,
) -> Result<Vec<String>, TransportError> {
    let value_of = |placeholder: &str| {
        values
            .get(placeholder.trim())
            .cloned()
            .ok_or_else(|| TransportError::service(format!("unknown value {placeholder}")))
    };

    let mut touched = Vec::new();
    if let Some(body) = expression.strip_prefix("SET ") {
        let mut parsed = Vec::new();
        for clause in clauses(body) {
            let (path, rhs) = clause
                .split_once(" = ")
                .ok_or_else(|| TransportError::service("malformed SET clause"))?;
            parsed.push((parse_path(path, names)?, rhs));
        }
        let paths: Vec<Vec<Step>> = parsed.iter().map(|(steps, _)| steps.clone()).collect();
        reject_overlaps(&paths)?;

        for (steps, rhs) in parsed {
            let value = match rhs.strip_prefix("if_not_exists(") {
                Some(arguments) => {
                    let arguments = arguments.trim_end_matches(')');
                    let (_, placeholder) = arguments
                        .split_once(',')
                        .ok_or_else(|| TransportError::service("malformed if_not_exists"))?;
                    match get(record, &steps) {
                        Some(existing) => existing.clone(),
                        None => value_of(placeholder)?,
                    }
                }
                None => value_of(rhs)?,
            };

            set(record, &steps, value)?;
            if let Step::Name(name) = &steps[0] {
                touched.push(name.clone());
            }
        }
    } else if let Some(body) = expression.strip_prefix("REMOVE ") {
        let paths = clauses(body)
            .into_iter()
            .map(|clause| parse_path(clause, names))
            .collect::<Result<Vec<_>, _>>()?;
        reject_overlaps(&paths)?;

        for steps in paths {
            remove(record, &steps)?;
            if let Step::Name(name) = &steps[0] {
                touched.push(name.clone());
            }
        }
    } else {
        return Err(TransportError::service(format!(
            "unsupported expression {expression}"
        )));
    }
    Ok(touched)
}

/// Keep the top-level attributes a projection names
fn project(
    record: &Record,
    expression: &str,
    names: &HashMap<String, String>,
) -> Result<Record, TransportError> {
    let paths = clauses(expression)
        .into_iter()
        .map(|path| parse_path(path, names))
        .collect::<Result<Vec<_>, _>>()?;
    reject_overlaps(&paths)?;

    let mut projected = Map::new();
    for steps in paths {
        if let Step::Name(name) = &steps[0] {
            if let Some(value) = record.get(name) {
                projected.insert(name.clone(), value.clone());
            }
        }
    }
    Ok(projected)
}
