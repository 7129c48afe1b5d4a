use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use sheets_codec::Value;
use sheets_template::expr::{self, Outcome, Scope, Val};
use tracing::trace;

use crate::config::SortSpec;
use crate::error::{SheetError, SheetResult};

/// Orders two array items, or explains why they cannot be ordered.
pub type Comparator = Arc<dyn Fn(&Value, &Value) -> Result<Ordering, String> + Send + Sync>;

static COMPARATORS: LazyLock<Mutex<HashMap<String, Comparator>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Build, or fetch from the process-wide cache, the comparator for `spec`.
///
/// `field` only names the offender in errors; the cache is keyed by the
/// spec alone.
pub fn comparator(field: &str, spec: &SortSpec) -> SheetResult<Comparator> {
    let key = serde_json::to_string(spec).map_err(|e| SheetError::validation(field, e.to_string()))?;
    if let Some(found) = COMPARATORS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
    {
        return Ok(Arc::clone(found));
    }

    let built = build(field, spec)?;
    trace!(field, spec = %key, "compiled sort comparator");
    COMPARATORS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(key, Arc::clone(&built));
    Ok(built)
}

/// Sort `items` in place by `spec`.
pub fn sort_values(field: &str, spec: &SortSpec, items: &mut [Value]) -> SheetResult<()> {
    let compare = comparator(field, spec)?;
    let mut failure = None;
    items.sort_by(|a, b| match compare(a, b) {
        Ok(order) => order,
        Err(reason) => {
            failure.get_or_insert(reason);
            Ordering::Equal
        }
    });
    match failure {
        Some(reason) => Err(SheetError::validation(field, reason)),
        None => Ok(()),
    }
}

fn build(field: &str, spec: &SortSpec) -> SheetResult<Comparator> {
    match spec {
        SortSpec::Script(source) => {
            let parsed = expr::parse(source).map_err(|e| {
                SheetError::validation(field, format!("invalid sort expression {source:?}: {e}"))
            })?;
            Ok(Arc::new(move |a: &Value, b: &Value| {
                let scope = PairScope { a, b };
                match expr::evaluate(&parsed, &scope) {
                    Ok(Outcome::Value(Val::Num(n))) => {
                        Ok(n.partial_cmp(&0.0).unwrap_or(Ordering::Equal))
                    }
                    Ok(Outcome::Value(other)) => Err(format!(
                        "sort expression must produce a number, got {other:?}"
                    )),
                    Ok(Outcome::Undefined(name)) => {
                        Err(format!("sort expression references undefined {name:?}"))
                    }
                    Err(e) => Err(format!("sort expression failed: {e}")),
                }
            }))
        }
        SortSpec::Fields(names) => {
            let keys: Vec<(String, bool)> = names.iter().map(|n| (n.clone(), false)).collect();
            Ok(by_fields(keys))
        }
        SortSpec::Directions(directions) => {
            let mut keys = Vec::with_capacity(directions.len());
            for (name, direction) in directions {
                let descending = match direction.to_ascii_uppercase().as_str() {
                    "ASC" => false,
                    "DESC" => true,
                    _ => {
                        return Err(SheetError::validation(
                            field,
                            format!("sort direction for {name:?} must be ASC or DESC, got {direction:?}"),
                        ))
                    }
                };
                keys.push((name.clone(), descending));
            }
            Ok(by_fields(keys))
        }
    }
}

fn by_fields(keys: Vec<(String, bool)>) -> Comparator {
    Arc::new(move |a: &Value, b: &Value| {
        for (name, descending) in &keys {
            let order = compare_optional(member(a, name), member(b, name));
            let order = if *descending { order.reverse() } else { order };
            if order != Ordering::Equal {
                return Ok(order);
            }
        }
        Ok(Ordering::Equal)
    })
}

fn member<'a>(item: &'a Value, name: &str) -> Option<&'a Value> {
    item.as_table().and_then(|table| table.get(name))
}

fn compare_optional(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_values(a, b),
    }
}

/// Total order over field values: numbers numerically, then by kind.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    if let (Some(x), Some(y)) = (number(a), number(b)) {
        return x.total_cmp(&y);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        (Value::Datetime(x), Value::Datetime(y)) => x.to_string().cmp(&y.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Boolean(_) => 0,
        Value::Integer(_) | Value::Float(_) => 1,
        Value::String(_) => 2,
        Value::Datetime(_) => 3,
        Value::Array(_) => 4,
        Value::Table(_) => 5,
    }
}

struct PairScope<'a> {
    a: &'a Value,
    b: &'a Value,
}

impl Scope for PairScope<'_> {
    fn lookup(&self, name: &str) -> Option<Val> {
        match name {
            "a" => Some(Val::from(self.a)),
            "b" => Some(Val::from(self.b)),
            _ => None,
        }
    }
}
