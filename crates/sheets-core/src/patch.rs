//! JSON-patch style differences between two records.
//!
//! Operations carry the replaced or removed value in `from`, so a
//! consumer can show both sides of a change without the source record.

use serde::Serialize;
use sheets_codec::json::to_json;
use sheets_codec::{Record, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchKind {
    Add,
    Remove,
    Replace,
}

/// One operation turning the source record into the destination record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PatchOp {
    pub op: PatchKind,
    /// JSON pointer to the changed location.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// The previous value at `path`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<serde_json::Value>,
}

/// Compute the operations turning `src` into `dst`.
///
/// Removals and replacements are listed first, walking source keys in
/// reverse order; additions follow in destination order. Tables and
/// arrays of the same shape are compared member by member.
pub fn diff_records(src: &Record, dst: &Record) -> Vec<PatchOp> {
    let mut ops = Vec::new();
    generate(&Container::Table(src), &Container::Table(dst), "", &mut ops);
    ops
}

enum Container<'a> {
    Table(&'a Record),
    Array(&'a [Value]),
}

impl<'a> Container<'a> {
    fn of(value: &'a Value) -> Option<Self> {
        match value {
            Value::Table(table) => Some(Self::Table(table)),
            Value::Array(items) => Some(Self::Array(items)),
            _ => None,
        }
    }

    fn keys(&self) -> Vec<String> {
        match self {
            Self::Table(table) => table.keys().cloned().collect(),
            Self::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        match self {
            Self::Table(table) => table.get(key),
            Self::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Table(table) => table.len(),
            Self::Array(items) => items.len(),
        }
    }

    fn same_kind(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Self::Table(_), Self::Table(_)) | (Self::Array(_), Self::Array(_))
        )
    }
}

fn generate(old: &Container<'_>, new: &Container<'_>, path: &str, ops: &mut Vec<PatchOp>) {
    let mut removed = false;

    for key in old.keys().into_iter().rev() {
        let Some(old_value) = old.get(&key) else {
            continue;
        };
        let pointer = format!("{path}/{}", escape_pointer(&key));
        match new.get(&key) {
            Some(new_value) => match (Container::of(old_value), Container::of(new_value)) {
                (Some(a), Some(b)) if a.same_kind(&b) => generate(&a, &b, &pointer, ops),
                _ if !same_value(old_value, new_value) => ops.push(PatchOp {
                    op: PatchKind::Replace,
                    path: pointer,
                    value: Some(to_json(new_value)),
                    from: Some(to_json(old_value)),
                }),
                _ => {}
            },
            None => {
                removed = true;
                ops.push(PatchOp {
                    op: PatchKind::Remove,
                    path: pointer,
                    value: None,
                    from: Some(to_json(old_value)),
                });
            }
        }
    }

    if !removed && new.len() == old.len() {
        return;
    }

    for key in new.keys() {
        if old.get(&key).is_some() {
            continue;
        }
        if let Some(new_value) = new.get(&key) {
            ops.push(PatchOp {
                op: PatchKind::Add,
                path: format!("{path}/{}", escape_pointer(&key)),
                value: Some(to_json(new_value)),
                from: None,
            });
        }
    }
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Integer(x), Value::Float(y)) | (Value::Float(y), Value::Integer(x)) => {
            *x as f64 == *y
        }
        (Value::Datetime(_), Value::Datetime(_)) => same_instant(a, b),
        _ => a == b,
    }
}

/// Whether two datetimes name the same instant.
///
/// Values without a full date, time and offset fall back to textual
/// equality.
pub(crate) fn same_instant(a: &Value, b: &Value) -> bool {
    match (instant(a), instant(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn instant(value: &Value) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    match value {
        Value::Datetime(dt) => chrono::DateTime::parse_from_rfc3339(&dt.to_string()).ok(),
        _ => None,
    }
}

fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(text: &str) -> Record {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn identical_records_have_no_ops() {
        let r = record("a = 1\nb = [1, 2]\n[c]\nd = \"x\"");
        assert!(diff_records(&r, &r).is_empty());
    }

    #[test]
    fn changed_scalar_is_replace_with_previous_value() {
        let src = record(r#"id = "2"
first_name = "Grace"
last_name = "Hopper""#);
        let dst = record(r#"id = "2"
first_name = "Grace"
last_name = "Hopper-Suffix""#);
        let ops = diff_records(&src, &dst);
        assert_eq!(
            ops,
            vec![PatchOp {
                op: PatchKind::Replace,
                path: "/last_name".into(),
                value: Some(json!("Hopper-Suffix")),
                from: Some(json!("Hopper")),
            }]
        );
        let encoded = serde_json::to_value(&ops[0]).unwrap();
        assert_eq!(
            encoded,
            json!({"op": "replace", "path": "/last_name", "value": "Hopper-Suffix", "from": "Hopper"})
        );
    }

    #[test]
    fn removals_come_before_additions() {
        let src = record("a = 1\nb = 2");
        let dst = record("b = 2\nc = 3");
        let ops = diff_records(&src, &dst);
        let summary: Vec<_> = ops.iter().map(|o| (o.op, o.path.as_str())).collect();
        assert_eq!(summary, [(PatchKind::Remove, "/a"), (PatchKind::Add, "/c")]);
        assert_eq!(ops[0].from, Some(json!(1)));
    }

    #[test]
    fn nested_tables_and_arrays_recurse() {
        let src = record("tags = [\"a\", \"b\"]\n[address]\ncity = \"London\"");
        let dst = record("tags = [\"a\", \"c\", \"d\"]\n[address]\ncity = \"Paris\"");
        let ops = diff_records(&src, &dst);
        let summary: Vec<_> = ops.iter().map(|o| (o.op, o.path.as_str())).collect();
        assert_eq!(
            summary,
            [
                (PatchKind::Replace, "/tags/1"),
                (PatchKind::Add, "/tags/2"),
                (PatchKind::Replace, "/address/city"),
            ]
        );
    }

    #[test]
    fn type_change_replaces_whole_value() {
        let src = record("x = [1]");
        let dst = record("x = { y = 1 }");
        let ops = diff_records(&src, &dst);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op, PatchKind::Replace);
        assert_eq!(ops[0].value, Some(json!({"y": 1})));
    }

    #[test]
    fn datetimes_compare_by_instant() {
        let src = record("at = 2020-01-01T00:00:00Z");
        let same = record("at = 2020-01-01T01:00:00+01:00");
        let later = record("at = 2020-01-02T00:00:00Z");
        assert!(diff_records(&src, &same).is_empty());
        let ops = diff_records(&src, &later);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op, PatchKind::Replace);
        assert_eq!(ops[0].path, "/at");
    }

    #[test]
    fn pointer_segments_are_escaped() {
        let src = record(r#""a/b" = 1"#);
        let dst = record(r#""a/b" = 2"#);
        assert_eq!(diff_records(&src, &dst)[0].path, "/a~1b");
    }
}
