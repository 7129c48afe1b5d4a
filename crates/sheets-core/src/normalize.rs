use std::collections::BTreeMap;

use sheets_codec::{render_scalar, Record, Value};

use crate::config::{FieldSpec, FieldType};
use crate::error::{SheetError, SheetResult};
use crate::query::loose_eq;
use crate::sort::sort_values;

/// Apply defaults, type coercion, enum checks and array sorting for every
/// declared field. Undeclared fields pass through untouched.
///
/// A field whose resolved value is an empty string is dropped.
pub fn normalize(mut record: Record, fields: &BTreeMap<String, FieldSpec>) -> SheetResult<Record> {
    for (name, spec) in fields {
        let Some(value) = record.remove(name).or_else(|| spec.default.clone()) else {
            continue;
        };
        if matches!(&value, Value::String(s) if s.is_empty()) {
            continue;
        }

        let mut value = match spec.field_type {
            Some(field_type) => coerce(name, spec, field_type, value)?,
            None => value,
        };

        if let Some(allowed) = &spec.allowed {
            if !allowed.iter().any(|candidate| loose_eq(candidate, &value)) {
                return Err(SheetError::validation(
                    name,
                    format!("value {} is not one of the allowed values", describe(&value)),
                ));
            }
        }

        if let (Some(sort), Value::Array(items)) = (&spec.sort, &mut value) {
            sort_values(name, sort, items)?;
        }

        record.insert(name.clone(), value);
    }
    Ok(record)
}

fn coerce(field: &str, spec: &FieldSpec, field_type: FieldType, value: Value) -> SheetResult<Value> {
    match field_type {
        FieldType::Number => to_number(field, value),
        FieldType::String => to_string(field, value),
        FieldType::Boolean => to_boolean(field, spec, value),
    }
}

fn to_number(field: &str, value: Value) -> SheetResult<Value> {
    match value {
        Value::Integer(_) | Value::Float(_) => Ok(value),
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                return Ok(Value::Integer(i));
            }
            match trimmed.parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(Value::Float(f)),
                _ => Err(SheetError::validation(
                    field,
                    format!("cannot convert {s:?} to a number"),
                )),
            }
        }
        other => Err(SheetError::validation(
            field,
            format!("cannot convert {} to a number", describe(&other)),
        )),
    }
}

fn to_string(field: &str, value: Value) -> SheetResult<Value> {
    match value {
        Value::String(_) => Ok(value),
        Value::Array(_) | Value::Table(_) => Err(SheetError::validation(
            field,
            format!("cannot convert {} to a string", value.type_str()),
        )),
        scalar => render_scalar(&scalar)
            .map(Value::String)
            .ok_or_else(|| SheetError::validation(field, "cannot convert value to a string")),
    }
}

fn to_boolean(field: &str, spec: &FieldSpec, value: Value) -> SheetResult<Value> {
    let listed = |list: &Option<Vec<Value>>| {
        list.as_ref()
            .is_some_and(|values| values.iter().any(|v| loose_eq(v, &value)))
    };
    if listed(&spec.true_values) {
        return Ok(Value::Boolean(true));
    }
    if listed(&spec.false_values) {
        return Ok(Value::Boolean(false));
    }
    if spec.true_values.is_some() || spec.false_values.is_some() {
        return Err(SheetError::validation(
            field,
            format!("{} is in neither trueValues nor falseValues", describe(&value)),
        ));
    }

    let truth = match &value {
        Value::Boolean(b) => *b,
        Value::Integer(i) => *i != 0,
        Value::Float(f) => *f != 0.0 && !f.is_nan(),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "false" | "0" | "no" | "off" => false,
            _ => true,
        },
        Value::Datetime(_) | Value::Array(_) | Value::Table(_) => true,
    };
    Ok(Value::Boolean(truth))
}

fn describe(value: &Value) -> String {
    render_scalar(value).unwrap_or_else(|| value.type_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SortSpec;
    use proptest::prelude::*;

    fn record(text: &str) -> Record {
        toml::from_str(text).unwrap()
    }

    fn fields(specs: &[(&str, FieldSpec)]) -> BTreeMap<String, FieldSpec> {
        specs
            .iter()
            .map(|(name, spec)| (name.to_string(), spec.clone()))
            .collect()
    }

    #[test]
    fn undeclared_fields_pass_through() {
        let r = record(r#"id = "1"
extra = [1, 2]"#);
        assert_eq!(normalize(r.clone(), &BTreeMap::new()).unwrap(), r);
    }

    #[test]
    fn defaults_fill_absent_fields() {
        let spec = FieldSpec {
            default: Some(Value::from("active")),
            ..FieldSpec::default()
        };
        let out = normalize(record(r#"id = "1""#), &fields(&[("status", spec)])).unwrap();
        assert_eq!(out["status"].as_str(), Some("active"));
    }

    #[test]
    fn empty_strings_are_dropped() {
        let out = normalize(
            record(r#"age = """#),
            &fields(&[("age", FieldSpec::typed(FieldType::Number))]),
        )
        .unwrap();
        assert!(!out.contains_key("age"));
    }

    #[test]
    fn numbers_and_strings_interconvert() {
        let specs = fields(&[
            ("age", FieldSpec::typed(FieldType::Number)),
            ("score", FieldSpec::typed(FieldType::Number)),
            ("id", FieldSpec::typed(FieldType::String)),
        ]);
        let out = normalize(record(r#"age = " 36 "
score = "4.5"
id = 7"#), &specs).unwrap();
        assert_eq!(out["age"], Value::Integer(36));
        assert_eq!(out["score"], Value::Float(4.5));
        assert_eq!(out["id"].as_str(), Some("7"));
    }

    #[test]
    fn unconvertible_number_names_field() {
        let err = normalize(
            record(r#"age = "old""#),
            &fields(&[("age", FieldSpec::typed(FieldType::Number))]),
        )
        .unwrap_err();
        assert!(matches!(err, SheetError::Validation { ref field, .. } if field == "age"));
    }

    #[test]
    fn booleans_use_value_lists_when_given() {
        let spec = FieldSpec {
            field_type: Some(FieldType::Boolean),
            true_values: Some(vec![Value::from("Y")]),
            false_values: Some(vec![Value::from("N")]),
            ..FieldSpec::default()
        };
        let specs = fields(&[("active", spec)]);
        let yes = normalize(record(r#"active = "Y""#), &specs).unwrap();
        assert_eq!(yes["active"], Value::Boolean(true));
        let no = normalize(record(r#"active = "N""#), &specs).unwrap();
        assert_eq!(no["active"], Value::Boolean(false));
        assert!(normalize(record(r#"active = "maybe""#), &specs).is_err());
    }

    #[test]
    fn booleans_fall_back_to_truthiness() {
        let specs = fields(&[("active", FieldSpec::typed(FieldType::Boolean))]);
        let cases = [("\"false\"", false), ("\"x\"", true), ("0", false), ("1", true)];
        for (literal, expected) in cases {
            let out = normalize(record(&format!("active = {literal}")), &specs).unwrap();
            assert_eq!(out["active"], Value::Boolean(expected), "{literal}");
        }
    }

    #[test]
    fn enum_membership_is_checked() {
        let spec = FieldSpec {
            allowed: Some(vec![Value::from("red"), Value::from("green")]),
            ..FieldSpec::default()
        };
        let specs = fields(&[("color", spec)]);
        assert!(normalize(record(r#"color = "red""#), &specs).is_ok());
        let err = normalize(record(r#"color = "blue""#), &specs).unwrap_err();
        assert!(matches!(err, SheetError::Validation { ref field, .. } if field == "color"));
    }

    #[test]
    fn declared_sort_orders_arrays() {
        let spec = FieldSpec {
            sort: Some(SortSpec::Script("a - b".into())),
            ..FieldSpec::default()
        };
        let out = normalize(record("ranks = [3, 1, 2]"), &fields(&[("ranks", spec)])).unwrap();
        assert_eq!(out, record("ranks = [1, 2, 3]"));
    }

    #[test]
    fn configured_direction_map_sorts_by_first_declared_field() {
        let config = crate::config::SheetConfig::from_toml(
            r#"
            path = "${{ id }}"
            [fields.people]
            sort = { rank = "DESC", last = "ASC" }
            "#,
        )
        .unwrap();
        let out = normalize(
            record(
                r#"id = "1"
people = [
    { name = "Ada", last = "Alpha", rank = 1 },
    { name = "Bob", last = "Zulu", rank = 9 },
]"#,
            ),
            &config.fields,
        )
        .unwrap();
        let names: Vec<_> = out["people"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["Bob", "Ada"]);
    }

    proptest! {
        #[test]
        fn normalizing_twice_changes_nothing(n in any::<i64>(), flag in any::<bool>(), pad in " {0,3}") {
            let specs = fields(&[
                ("n", FieldSpec::typed(FieldType::Number)),
                ("flag", FieldSpec::typed(FieldType::Boolean)),
                ("label", FieldSpec::typed(FieldType::String)),
            ]);
            let mut r = Record::new();
            r.insert("n".into(), Value::String(format!("{pad}{n}{pad}")));
            r.insert("flag".into(), Value::Boolean(flag));
            r.insert("label".into(), Value::Integer(n));

            let once = normalize(r, &specs).unwrap();
            prop_assert_eq!(&once["n"], &Value::Integer(n));
            let n_str = n.to_string();
            prop_assert_eq!(once["label"].as_str(), Some(n_str.as_str()));
            let twice = normalize(once.clone(), &specs).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
