use std::collections::BTreeMap;
use std::sync::Arc;

use sheets_codec::{render_scalar, Record, Value};

type PredicateFn = dyn Fn(Option<&Value>) -> bool + Send + Sync;

/// A test applied to one field of a candidate record.
#[derive(Clone)]
pub enum Criterion {
    /// The field equals this scalar, loosely across representations.
    Equals(Value),
    /// The field is a table matching a nested query.
    Matches(Query),
    /// The field satisfies an in-process predicate.
    Predicate(Arc<PredicateFn>),
}

impl std::fmt::Debug for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Equals(value) => f.debug_tuple("Equals").field(value).finish(),
            Self::Matches(query) => f.debug_tuple("Matches").field(query).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl Criterion {
    fn accepts(&self, value: Option<&Value>) -> bool {
        match self {
            Self::Equals(expected) => value.is_some_and(|v| loose_eq(v, expected)),
            Self::Matches(query) => match value {
                Some(Value::Table(table)) => query.matches_record(table),
                _ => false,
            },
            Self::Predicate(test) => test(value),
        }
    }
}

/// A record filter: every criterion must accept its field.
#[derive(Clone, Debug, Default)]
pub struct Query {
    criteria: BTreeMap<String, Criterion>,
}

impl Query {
    /// The query matching every record.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn equals(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criteria
            .insert(field.into(), Criterion::Equals(value.into()));
        self
    }

    pub fn matches(mut self, field: impl Into<String>, nested: Query) -> Self {
        self.criteria.insert(field.into(), Criterion::Matches(nested));
        self
    }

    pub fn predicate(
        mut self,
        field: impl Into<String>,
        test: impl Fn(Option<&Value>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.criteria
            .insert(field.into(), Criterion::Predicate(Arc::new(test)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// The partial record handed to tree traversal. Predicates are left out
    /// so their components enumerate every candidate.
    pub fn path_hint(&self) -> Record {
        let mut hint = Record::new();
        for (field, criterion) in &self.criteria {
            match criterion {
                Criterion::Equals(value) => {
                    hint.insert(field.clone(), value.clone());
                }
                Criterion::Matches(nested) => {
                    let nested = nested.path_hint();
                    if !nested.is_empty() {
                        hint.insert(field.clone(), Value::Table(nested));
                    }
                }
                Criterion::Predicate(_) => {}
            }
        }
        hint
    }

    pub fn matches_record(&self, record: &Record) -> bool {
        self.criteria
            .iter()
            .all(|(field, criterion)| criterion.accepts(record.get(field)))
    }
}

impl From<Record> for Query {
    /// Tables become nested matches, everything else equality.
    fn from(record: Record) -> Self {
        let criteria = record
            .into_iter()
            .map(|(field, value)| {
                let criterion = match value {
                    Value::Table(nested) => Criterion::Matches(Query::from(nested)),
                    other => Criterion::Equals(other),
                };
                (field, criterion)
            })
            .collect();
        Self { criteria }
    }
}

/// Equality that ignores representation: `2`, `2.0` and `"2"` are equal.
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
            *a as f64 == *b
        }
        (Value::Datetime(_), Value::Datetime(_)) => crate::patch::same_instant(left, right),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loose_eq(x, y))
        }
        (Value::Table(a), Value::Table(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| loose_eq(v, other)))
        }
        (Value::String(s), other) | (other, Value::String(s)) if !other.is_str() => {
            render_scalar(other).is_some_and(|rendered| rendered == *s)
        }
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str) -> Record {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn scalars_compare_loosely() {
        assert!(loose_eq(&Value::from("2"), &Value::from(2)));
        assert!(loose_eq(&Value::from(2), &Value::from(2.0)));
        assert!(loose_eq(&Value::from(true), &Value::from("true")));
        assert!(!loose_eq(&Value::from("02"), &Value::from(2)));
        assert!(!loose_eq(&Value::from("a"), &Value::from("b")));
    }

    #[test]
    fn equality_and_nested_matches() {
        let r = record(
            r#"
            id = 2
            name = "Grace"
            [address]
            city = "Arlington"
            zip = "22201"
            "#,
        );
        assert!(Query::all().matches_record(&r));
        assert!(Query::all().equals("id", "2").matches_record(&r));
        assert!(!Query::all().equals("id", 3).matches_record(&r));
        assert!(Query::all()
            .matches("address", Query::all().equals("city", "Arlington"))
            .matches_record(&r));
        assert!(!Query::all()
            .matches("name", Query::all().equals("city", "Arlington"))
            .matches_record(&r));
        assert!(!Query::all().equals("missing", 1).matches_record(&r));
    }

    #[test]
    fn predicates_see_absent_fields() {
        let r = record(r#"name = "Ada""#);
        let absent = Query::all().predicate("age", |v| v.is_none());
        assert!(absent.matches_record(&r));
        let long = Query::all().predicate("name", |v| {
            v.and_then(Value::as_str).is_some_and(|s| s.len() > 5)
        });
        assert!(!long.matches_record(&r));
    }

    #[test]
    fn hint_omits_predicates() {
        let query = Query::all()
            .equals("id", "1")
            .predicate("name", |_| true)
            .matches("meta", Query::all().predicate("x", |_| true));
        let hint = query.path_hint();
        assert_eq!(hint.len(), 1);
        assert_eq!(hint["id"].as_str(), Some("1"));
    }

    #[test]
    fn record_converts_to_query() {
        let query = Query::from(record(
            r#"
            id = "1"
            [address]
            city = "London"
            "#,
        ));
        let hint = query.path_hint();
        assert_eq!(hint["address"]["city"].as_str(), Some("London"));
        assert!(query.matches_record(&record(
            r#"
            id = 1
            name = "Ada"
            [address]
            city = "London"
            "#
        )));
    }
}
