use std::collections::BTreeMap;
use std::fmt::Display;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sheets_codec::{Record, Value};

use crate::error::{SheetError, SheetResult};

/// Directory, relative to the options root, holding sheet configs.
pub const CONFIG_DIR: &str = ".gitsheets";

/// Table name the config keys may be nested under.
const CONFIG_TABLE: &str = "gitsheet";

fn default_root() -> String {
    ".".to_string()
}

/// Configuration of one sheet, stored as a record under `.gitsheets/`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SheetConfig {
    /// Directory holding the sheet's records, relative to the data root.
    #[serde(default = "default_root")]
    pub root: String,
    /// Path template records are stored under.
    pub path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldSpec>,
}

impl SheetConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            root: default_root(),
            path: path.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    /// Parse a config file. Keys may sit at top level or under `[gitsheet]`.
    ///
    /// The text is deserialized directly so mapping sort specs keep the
    /// order their fields are declared in.
    pub fn from_toml(text: &str) -> SheetResult<Self> {
        let document: Record = toml::from_str(text).map_err(config_error)?;
        let parsed = if document.contains_key(CONFIG_TABLE) {
            toml::from_str::<ConfigFile>(text).map(|file| file.gitsheet)
        } else {
            toml::from_str::<SheetConfig>(text)
        };
        parsed.map_err(config_error)
    }

    pub fn from_bytes(bytes: &[u8]) -> SheetResult<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| SheetError::Config(format!("config is not utf-8: {e}")))?;
        Self::from_toml(text)
    }

    /// The config file written to disk, nested under `[gitsheet]`.
    pub fn to_toml(&self) -> SheetResult<String> {
        toml::to_string(&ConfigFileRef { gitsheet: self }).map_err(config_error)
    }
}

fn config_error(e: impl Display) -> SheetError {
    SheetError::Config(e.to_string())
}

#[derive(Deserialize)]
struct ConfigFile {
    gitsheet: SheetConfig,
}

#[derive(Serialize)]
struct ConfigFileRef<'a> {
    gitsheet: &'a SheetConfig,
}

/// Declared type of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Number,
    String,
    Boolean,
}

/// Schema of one field.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
    #[serde(default, alias = "true_values", skip_serializing_if = "Option::is_none")]
    pub true_values: Option<Vec<Value>>,
    #[serde(default, alias = "false_values", skip_serializing_if = "Option::is_none")]
    pub false_values: Option<Vec<Value>>,
}

impl FieldSpec {
    pub fn typed(field_type: FieldType) -> Self {
        Self {
            field_type: Some(field_type),
            ..Self::default()
        }
    }
}

/// How an array-valued field is ordered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortSpec {
    /// Comparator expression over `a` and `b`; its sign orders the pair.
    Script(String),
    /// Ascending by each named field in turn.
    Fields(Vec<String>),
    /// Field name to `"ASC"` or `"DESC"`, applied in declaration order.
    Directions(IndexMap<String, String>),
}

/// Where sheet configs and data live inside a workspace tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenOptions {
    /// Directory containing `.gitsheets/`.
    pub root: String,
    /// Extra directory between `root` and each sheet's own root.
    pub prefix: Option<String>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            root: "/".to_string(),
            prefix: None,
        }
    }
}

impl OpenOptions {
    /// Read `GITSHEETS_ROOT` and `GITSHEETS_PREFIX`.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            root: var("GITSHEETS_ROOT")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.root),
            prefix: var("GITSHEETS_PREFIX").filter(|v| !v.is_empty()),
        }
    }

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Path of the config record for `sheet`.
    pub fn config_path(&self, sheet: &str) -> String {
        join_paths(&[&self.root, CONFIG_DIR, &format!("{sheet}.toml")])
    }

    pub fn config_dir(&self) -> String {
        join_paths(&[&self.root, CONFIG_DIR])
    }

    /// Path of a sheet's data root inside the workspace tree.
    pub fn data_root(&self, config: &SheetConfig) -> String {
        join_paths(&[
            &self.root,
            self.prefix.as_deref().unwrap_or(""),
            &config.root,
        ])
    }
}

/// Join path pieces, dropping empty and `.` segments.
pub fn join_paths(parts: &[&str]) -> String {
    parts
        .iter()
        .flat_map(|part| sheets_store::tree::split_path(part))
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> SheetResult<SheetConfig> {
        SheetConfig::from_toml(text)
    }

    #[test]
    fn nested_layout_is_read() {
        let config = parse(
            r#"
            [gitsheet]
            root = "people"
            path = "${{ id }}"

            [gitsheet.fields.age]
            type = "number"
            "#,
        )
        .unwrap();
        assert_eq!(config.root, "people");
        assert_eq!(config.path, "${{ id }}");
        assert_eq!(config.fields["age"].field_type, Some(FieldType::Number));
    }

    #[test]
    fn top_level_layout_defaults_root() {
        let config = parse(r#"path = "{{id}}""#).unwrap();
        assert_eq!(config.root, ".");
        assert!(config.fields.is_empty());
    }

    #[test]
    fn missing_path_is_config_error() {
        assert!(matches!(parse(r#"root = "x""#), Err(SheetError::Config(_))));
        assert!(matches!(parse("gitsheet = 3"), Err(SheetError::Config(_))));
    }

    #[test]
    fn sort_specs_take_three_shapes() {
        let config = parse(
            r#"
            path = "${{ id }}"
            [fields.a]
            sort = "a.rank - b.rank"
            [fields.b]
            sort = ["last", "first"]
            [fields.c.sort]
            rank = "DESC"
            "#,
        )
        .unwrap();
        assert!(matches!(config.fields["a"].sort, Some(SortSpec::Script(_))));
        assert_eq!(
            config.fields["b"].sort,
            Some(SortSpec::Fields(vec!["last".into(), "first".into()]))
        );
        assert!(matches!(config.fields["c"].sort, Some(SortSpec::Directions(_))));
    }

    #[test]
    fn direction_maps_keep_declared_order() {
        let config = parse(
            r#"
            [gitsheet]
            path = "${{ id }}"
            [gitsheet.fields.people]
            sort = { rank = "DESC", last = "ASC", first = "ASC" }
            "#,
        )
        .unwrap();
        let Some(SortSpec::Directions(directions)) = &config.fields["people"].sort else {
            panic!("expected a direction map");
        };
        let keys: Vec<_> = directions.keys().map(String::as_str).collect();
        assert_eq!(keys, ["rank", "last", "first"]);

        let reread = SheetConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(reread, config);
        let Some(SortSpec::Directions(directions)) = &reread.fields["people"].sort else {
            panic!("expected a direction map");
        };
        assert_eq!(directions.get_index(0).map(|(k, _)| k.as_str()), Some("rank"));
    }

    #[test]
    fn invalid_utf8_is_config_error() {
        assert!(matches!(
            SheetConfig::from_bytes(&[0xff, 0xfe]),
            Err(SheetError::Config(_))
        ));
    }

    #[test]
    fn boolean_value_lists_accept_camel_case() {
        let config = parse(
            r#"
            path = "${{ id }}"
            [fields.active]
            type = "boolean"
            trueValues = ["y", "yes"]
            false_values = ["n"]
            "#,
        )
        .unwrap();
        let spec = &config.fields["active"];
        assert_eq!(spec.true_values.as_ref().map(Vec::len), Some(2));
        assert_eq!(spec.false_values.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn written_config_reads_back() {
        let config = SheetConfig::new("${{ id }}")
            .with_root("people")
            .with_field("age", FieldSpec::typed(FieldType::Number));
        let text = config.to_toml().unwrap();
        let document: Record = toml::from_str(&text).unwrap();
        assert!(document.contains_key("gitsheet"));
        assert_eq!(SheetConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn options_place_configs_and_data() {
        let options = OpenOptions::default().with_prefix("data");
        assert_eq!(options.config_path("people"), ".gitsheets/people.toml");
        let config = SheetConfig::new("${{ id }}").with_root("people");
        assert_eq!(options.data_root(&config), "data/people");
        assert_eq!(OpenOptions::default().data_root(&SheetConfig::new("x")), "");
    }

    #[test]
    fn options_read_environment_values() {
        let options = OpenOptions::from_vars(|key| match key {
            "GITSHEETS_ROOT" => Some("/sheets".into()),
            "GITSHEETS_PREFIX" => Some(String::new()),
            _ => None,
        });
        assert_eq!(options.root, "/sheets");
        assert_eq!(options.prefix, None);
        assert_eq!(options.config_dir(), "sheets/.gitsheets");
    }
}
